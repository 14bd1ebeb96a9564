//! Generated code fragments and their collision-free file names.
//!
//! A fragment asks for a file name (`file_name_hint`) and identifies its
//! producer (`name_hint`). Within one output batch:
//!
//! - a hint used by exactly one fragment is kept as is,
//! - a hint shared by several fragments turns into `hint__name` for all of them,
//! - a long name that still collides gets a random suffix and a warning.

use crate::diagnostics::NamedLogger;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Separator between a file name hint and a name hint.
pub const LONG_NAME_SEPARATOR: &str = "__";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeFragment {
    pub file_name_hint: String,
    pub name_hint: String,
    pub bytes: Vec<u8>,
}

impl CodeFragment {
    pub fn new(
        file_name_hint: impl Into<String>,
        name_hint: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            file_name_hint: file_name_hint.into(),
            name_hint: name_hint.into(),
            bytes: content.into(),
        }
    }

    pub fn long_name(&self) -> String {
        format!("{}{}{}", self.file_name_hint, LONG_NAME_SEPARATOR, self.name_hint)
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Ord for CodeFragment {
    fn cmp(&self, other: &Self) -> Ordering {
        self.file_name_hint
            .cmp(&other.file_name_hint)
            .then_with(|| self.name_hint.cmp(&other.name_hint))
            .then_with(|| self.bytes.cmp(&other.bytes))
    }
}

impl PartialOrd for CodeFragment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Final file names for one batch, index-aligned with the fragments.
#[derive(Debug, Clone, Default)]
pub struct ResolvedNames {
    names: Vec<String>,
    generated: HashSet<String>,
}

impl ResolvedNames {
    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// True when `file_name` is produced by this batch. Anything else in a
    /// generated directory is left over from an earlier run.
    pub fn is_file_generated(&self, file_name: &str) -> bool {
        self.generated.contains(file_name)
    }
}

/// Computes one distinct file name per fragment. `extension` (for example
/// `.rs`) is appended to every name.
pub fn resolve_file_names(
    fragments: &[CodeFragment],
    extension: &str,
    logger: &NamedLogger,
) -> ResolvedNames {
    let mut hint_counts: HashMap<&str, usize> = HashMap::new();
    for fragment in fragments {
        *hint_counts.entry(fragment.file_name_hint.as_str()).or_default() += 1;
    }

    let mut resolved = ResolvedNames::default();
    for fragment in fragments {
        let shared = hint_counts
            .get(fragment.file_name_hint.as_str())
            .is_some_and(|&count| count > 1);
        let stem = if shared {
            fragment.long_name()
        } else {
            fragment.file_name_hint.clone()
        };

        let mut file_name = format!("{stem}{extension}");
        if resolved.generated.contains(&file_name) {
            let long = fragment.long_name();
            loop {
                let suffix = uuid::Uuid::new_v4().simple().to_string();
                file_name = format!("{long}{LONG_NAME_SEPARATOR}{suffix}{extension}");
                if !resolved.generated.contains(&file_name) {
                    break;
                }
            }
            logger.warning(format!(
                "Fragment '{}' from '{}' collides with another fragment of the same name, writing it to '{}'",
                fragment.file_name_hint, fragment.name_hint, file_name
            ));
        }

        resolved.generated.insert(file_name.clone());
        resolved.names.push(file_name);
    }

    resolved
}
