use crate::fragment::CodeFragment;
use std::fmt::Write as _;

const INDENT: &str = "    ";

/// Indentation-aware source text builder.
#[derive(Debug, Default, Clone)]
pub struct CodeBuilder {
    buffer: String,
    depth: usize,
}

impl CodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, text: impl AsRef<str>) -> &mut Self {
        let text = text.as_ref();
        if text.is_empty() {
            self.buffer.push('\n');
            return self;
        }
        for _ in 0..self.depth {
            self.buffer.push_str(INDENT);
        }
        let _ = writeln!(self.buffer, "{}", text);
        self
    }

    pub fn blank(&mut self) -> &mut Self {
        self.buffer.push('\n');
        self
    }

    /// Writes `header {` and indents.
    pub fn open_block(&mut self, header: impl AsRef<str>) -> &mut Self {
        let header = header.as_ref();
        if header.is_empty() {
            self.line("{");
        } else {
            self.line(format!("{} {{", header));
        }
        self.depth += 1;
        self
    }

    pub fn close_block(&mut self) -> &mut Self {
        self.close_block_with("}")
    }

    /// Dedents and writes `closing`, e.g. `};` or `},`.
    pub fn close_block_with(&mut self, closing: &str) -> &mut Self {
        self.depth = self.depth.saturating_sub(1);
        self.line(closing)
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    pub fn finish(self) -> String {
        self.buffer
    }

    pub fn into_fragment(self, file_name_hint: impl Into<String>, name_hint: impl Into<String>) -> CodeFragment {
        CodeFragment::new(file_name_hint, name_hint, self.buffer)
    }
}
