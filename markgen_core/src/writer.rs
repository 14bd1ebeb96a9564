//! Materializes fragments on disk.
//!
//! Every file is `HEADER + payload + FOOTER`. A file is only rewritten when
//! its payload differs from the new one, so unchanged outputs keep their
//! modification time and do not trigger rebuilds.

use crate::config::{MarkgenConfig, OutputMode};
use crate::diagnostics::NamedLogger;
use crate::error::{MarkgenError, Result};
use crate::fragment::{CodeFragment, ResolvedNames, resolve_file_names};
use futures::future::try_join_all;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

pub const HEADER: &[u8] = b"// <auto-generated>\n\
// This file was generated by markgen. Manual changes will be overwritten.\n\
// </auto-generated>\n\
#![allow(warnings)]\n\n";

pub const FOOTER: &[u8] = b"\n// </markgen>\n";

pub const EXTENSION: &str = ".rs";

const GITIGNORE: &str = "*\n!.gitignore\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Unchanged,
    Written,
}

/// True when `existing` is a generated file whose payload equals `payload`.
/// Header and footer bytes are not compared.
pub fn payload_matches(existing: &[u8], payload: &[u8]) -> bool {
    existing.len() == HEADER.len() + payload.len() + FOOTER.len()
        && &existing[HEADER.len()..HEADER.len() + payload.len()] == payload
}

/// The payload of a generated file, if it carries the header and footer.
pub fn strip_envelope(bytes: &[u8]) -> Option<&[u8]> {
    bytes.strip_prefix(HEADER)?.strip_suffix(FOOTER)
}

/// Writes `payload` wrapped in the header and footer unless the file
/// already holds the same payload.
pub async fn write_if_changed(path: &Path, payload: &[u8]) -> Result<WriteOutcome> {
    let expected_len = HEADER.len() + payload.len() + FOOTER.len();

    match fs::metadata(path).await {
        Ok(meta) if meta.len() == expected_len as u64 => {
            let mut file = fs::File::open(path).await?;
            let mut existing = Vec::with_capacity(expected_len);
            file.read_to_end(&mut existing).await?;
            if payload_matches(&existing, payload) {
                trace!("Unchanged: {:?}", path);
                return Ok(WriteOutcome::Unchanged);
            }
        }
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .await?;
    file.set_len(expected_len as u64).await?;

    let mut offset = 0u64;
    for part in [HEADER, payload, FOOTER] {
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(part).await?;
        offset += part.len() as u64;
    }
    file.flush().await?;

    debug!("Wrote {:?} ({} bytes)", path, expected_len);
    Ok(WriteOutcome::Written)
}

/// Fragments produced for one project.
#[derive(Debug, Clone)]
pub struct ProjectBatch {
    pub name: String,
    pub directory: PathBuf,
    pub fragments: Vec<CodeFragment>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub written: Vec<PathBuf>,
    pub unchanged: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

impl WriteReport {
    fn record(&mut self, path: PathBuf, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Written => self.written.push(path),
            WriteOutcome::Unchanged => self.unchanged.push(path),
        }
    }

    fn merge(&mut self, other: WriteReport) {
        self.written.extend(other.written);
        self.unchanged.extend(other.unchanged);
        self.removed.extend(other.removed);
    }

    fn sort(&mut self) {
        self.written.sort();
        self.unchanged.sort();
        self.removed.sort();
    }
}

#[derive(Debug, Clone)]
pub struct FragmentWriter {
    mode: OutputMode,
    generated_name: String,
    central_output: PathBuf,
    clear_output: bool,
    logger: NamedLogger,
    cancel: CancellationToken,
}

impl FragmentWriter {
    pub fn new(config: &MarkgenConfig, logger: NamedLogger, cancel: CancellationToken) -> Self {
        Self {
            mode: config.output_mode,
            generated_name: config.generated_name.clone(),
            central_output: config.central_output_path(),
            clear_output: config.clear_output,
            logger,
            cancel,
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(MarkgenError::Cancelled);
        }
        Ok(())
    }

    pub async fn write(&self, mut batches: Vec<ProjectBatch>) -> Result<WriteReport> {
        batches.sort_by(|a, b| a.name.cmp(&b.name));
        info!(
            "Writing {} fragments for {} projects ({:?})",
            batches.iter().map(|b| b.fragments.len()).sum::<usize>(),
            batches.len(),
            self.mode
        );

        let mut report = match self.mode {
            OutputMode::NestedDirectories => {
                let groups = self.group_by_target(&batches, |batch| batch.directory.join(&self.generated_name));
                let jobs = groups
                    .iter()
                    .map(|(dir, batch)| self.write_directory(dir.clone(), &batch.fragments));
                merge_all(try_join_all(jobs).await?)
            }
            OutputMode::CentralDirectory => {
                let groups = self.group_by_target(&batches, |batch| self.central_directory(&batch.name));
                let jobs = groups
                    .iter()
                    .map(|(dir, batch)| self.write_directory(dir.clone(), &batch.fragments));
                merge_all(try_join_all(jobs).await?)
            }
            OutputMode::SingleFilePerProject => {
                let groups = self.group_by_target(&batches, |batch| {
                    batch.directory.join(format!("{}{}", self.generated_name, EXTENSION))
                });
                let jobs = groups.iter().map(|(path, batch)| {
                    let payload = (!batch.fragments.is_empty()).then(|| self.render_batch(batch, false));
                    self.write_single(path.clone(), payload)
                });
                merge_all(try_join_all(jobs).await?)
            }
            OutputMode::SingleFile => {
                let mut payload = Vec::new();
                for batch in batches.iter().filter(|b| !b.fragments.is_empty()) {
                    payload.extend(self.render_batch(batch, true));
                }
                let payload = (!payload.is_empty()).then_some(payload);
                self.write_single(self.single_file_path(), payload).await?
            }
        };

        report.sort();
        info!(
            "Output: {} written, {} unchanged, {} removed",
            report.written.len(),
            report.unchanged.len(),
            report.removed.len()
        );
        Ok(report)
    }

    /// Merges batches that land on the same directory or file, so names are
    /// resolved and stale files cleaned once per target.
    fn group_by_target(
        &self,
        batches: &[ProjectBatch],
        target: impl Fn(&ProjectBatch) -> PathBuf,
    ) -> BTreeMap<PathBuf, ProjectBatch> {
        let mut groups: BTreeMap<PathBuf, ProjectBatch> = BTreeMap::new();
        for batch in batches {
            match groups.entry(target(batch)) {
                Entry::Vacant(slot) => {
                    slot.insert(batch.clone());
                }
                Entry::Occupied(mut slot) => {
                    let message = format!(
                        "Projects {} and {} share the output {:?}",
                        slot.get().name,
                        batch.name,
                        slot.key()
                    );
                    self.logger.warning(message);
                    let merged = slot.get_mut();
                    merged.name = format!("{}, {}", merged.name, batch.name);
                    merged.fragments.extend(batch.fragments.iter().cloned());
                    merged.fragments.sort();
                }
            }
        }
        groups
    }

    /// `<central>/<namespace path>`: each `::` segment becomes a directory.
    fn central_directory(&self, project_name: &str) -> PathBuf {
        project_name
            .split("::")
            .filter(|part| !part.is_empty())
            .fold(self.central_output.clone(), |dir, part| dir.join(part))
    }

    fn single_file_path(&self) -> PathBuf {
        if self.central_output.extension().is_some_and(|e| e == "rs") {
            self.central_output.clone()
        } else {
            PathBuf::from(format!("{}{}", self.central_output.display(), EXTENSION))
        }
    }

    fn render_batch(&self, batch: &ProjectBatch, with_project_banner: bool) -> Vec<u8> {
        let names = resolve_file_names(&batch.fragments, "", &self.logger);
        let mut out = Vec::new();
        if with_project_banner {
            out.extend_from_slice(format!("// ==== project: {} ====\n\n", batch.name).as_bytes());
        }
        for (fragment, name) in batch.fragments.iter().zip(names.names()) {
            out.extend_from_slice(
                format!("// ---- {} ({}) ----\n", name, fragment.name_hint).as_bytes(),
            );
            out.extend_from_slice(&fragment.bytes);
            if !fragment.bytes.ends_with(b"\n") {
                out.push(b'\n');
            }
            out.push(b'\n');
        }
        out
    }

    /// Writes one file, or removes a stale generated one when there is no payload.
    async fn write_single(&self, path: PathBuf, payload: Option<Vec<u8>>) -> Result<WriteReport> {
        self.check_cancelled()?;
        let mut report = WriteReport::default();
        match payload {
            Some(payload) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).await?;
                }
                let outcome = write_if_changed(&path, &payload).await?;
                report.record(path, outcome);
            }
            None => {
                if is_generated_file(&path).await? {
                    fs::remove_file(&path).await?;
                    report.removed.push(path);
                }
            }
        }
        Ok(report)
    }

    async fn write_directory(&self, dir: PathBuf, fragments: &[CodeFragment]) -> Result<WriteReport> {
        self.check_cancelled()?;
        let mut report = WriteReport::default();

        if fragments.is_empty() {
            if fs::try_exists(&dir).await? {
                report.removed = self.remove_stale(&dir, &ResolvedNames::default()).await?;
            }
            return Ok(report);
        }

        fs::create_dir_all(&dir).await?;
        let gitignore = dir.join(".gitignore");
        if !fs::try_exists(&gitignore).await? {
            fs::write(&gitignore, GITIGNORE).await?;
        }

        let names = resolve_file_names(fragments, EXTENSION, &self.logger);
        let writes = fragments.iter().zip(names.names()).map(|(fragment, name)| {
            let path = dir.join(name);
            async move {
                self.check_cancelled()?;
                let outcome = write_if_changed(&path, &fragment.bytes).await?;
                Ok::<_, MarkgenError>((path, outcome))
            }
        });
        for (path, outcome) in try_join_all(writes).await? {
            report.record(path, outcome);
        }

        report.removed = self.remove_stale(&dir, &names).await?;
        Ok(report)
    }

    /// Deletes `.rs` files in `dir` that this run did not produce. Without
    /// `clear_output`, only files carrying the generated header are touched.
    async fn remove_stale(&self, dir: &Path, names: &ResolvedNames) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            self.check_cancelled()?;
            let path = entry.path();
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !file_name.ends_with(EXTENSION) || names.is_file_generated(&file_name) {
                continue;
            }
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if self.clear_output || is_generated_file(&path).await? {
                debug!("Removing stale generated file {:?}", path);
                fs::remove_file(&path).await?;
                removed.push(path);
            }
        }
        Ok(removed)
    }
}

fn merge_all(reports: Vec<WriteReport>) -> WriteReport {
    let mut merged = WriteReport::default();
    for report in reports {
        merged.merge(report);
    }
    merged
}

/// True when `path` exists and starts with the generated header.
async fn is_generated_file(path: &Path) -> Result<bool> {
    let mut file = match fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    let mut prefix = vec![0u8; HEADER.len()];
    match file.read_exact(&mut prefix).await {
        Ok(_) => Ok(prefix == HEADER),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}
