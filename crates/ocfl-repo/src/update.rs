use std::io::Read;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ocfl_inventory::{AddDecision, Inventory, InventoryUpdater};
use ocfl_types::{DigestAlgorithm, HexDigest, VersionInfo, VersionNum};
use parking_lot::Mutex;
use tracing::debug;
use walkdir::WalkDir;

use crate::add_file::AddFileProcessor;
use crate::error::{OcflError, Result};
use crate::lock::LockTable;
use crate::paths::validate_logical_path;

/// Options for a single updater operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Replace an existing logical path instead of failing.
    pub overwrite: bool,
}

impl UpdateOptions {
    pub fn overwrite() -> Self {
        Self { overwrite: true }
    }
}

/// The mutation surface handed to the caller's update closure.
///
/// Methods take `&self`: the closure may fan writes out across threads, and
/// the file-lock table serializes concurrent writers to the same logical
/// path while the inventory updater sits behind its own mutex.
pub struct ObjectUpdater {
    inner: Mutex<InventoryUpdater>,
    processor: AddFileProcessor,
    file_locks: LockTable,
}

impl ObjectUpdater {
    pub(crate) fn new(
        updater: InventoryUpdater,
        processor: AddFileProcessor,
        file_lock_timeout: Duration,
    ) -> Self {
        Self {
            inner: Mutex::new(updater),
            processor,
            file_locks: LockTable::new(file_lock_timeout),
        }
    }

    /// Write bytes to a logical path.
    pub fn write_bytes(
        &self,
        bytes: &[u8],
        logical_path: &str,
        options: UpdateOptions,
    ) -> Result<&Self> {
        self.write_stream(&mut &bytes[..], logical_path, options)
    }

    /// Stream a reader to a logical path.
    pub fn write_stream(
        &self,
        reader: &mut dyn Read,
        logical_path: &str,
        options: UpdateOptions,
    ) -> Result<&Self> {
        validate_logical_path(logical_path)?;
        // Path mapping and constraints run before any bytes move.
        let (content_path, local) = self.processor.content_path_for(logical_path)?;
        // Digest and stage outside the file lock; only the state mutation
        // and the promote/discard decision are serialized.
        let staged = self.processor.stage(reader)?;

        self.file_locks.with_lock(logical_path, || {
            let outcome = self.inner.lock().add_file(
                staged.digest().clone(),
                logical_path,
                content_path,
                options.overwrite,
            )?;
            self.processor.delete_staged(&outcome.garbage);
            match outcome.decision {
                AddDecision::New { .. } => self.processor.promote(staged, &local)?,
                AddDecision::Deduplicated { existing_path } => {
                    debug!(
                        logical_path,
                        existing_path = %existing_path,
                        "content already known; staged copy discarded"
                    );
                    drop(staged);
                }
            }
            Ok(())
        })?;
        Ok(self)
    }

    /// Add a local file or directory tree under a logical destination.
    ///
    /// An empty destination maps a file to its own filename and a
    /// directory's contents to the object root.
    pub fn add_path(
        &self,
        source: &Path,
        destination: &str,
        options: UpdateOptions,
    ) -> Result<&Self> {
        if source.is_file() {
            let logical = if destination.is_empty() {
                source
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| OcflError::InvalidPath {
                        path: source.display().to_string(),
                        reason: "source has no filename".into(),
                    })?
            } else {
                destination.to_string()
            };
            let mut file = std::fs::File::open(source)?;
            self.write_stream(&mut file, &logical, options)?;
        } else if source.is_dir() {
            for entry in WalkDir::new(source).min_depth(1) {
                let entry = entry.map_err(|e| {
                    OcflError::StorageIO(Box::new(std::io::Error::from(e)))
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let rel = entry
                    .path()
                    .strip_prefix(source)
                    .unwrap_or(entry.path())
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                let logical = if destination.is_empty() {
                    rel
                } else {
                    format!("{destination}/{rel}")
                };
                let mut file = std::fs::File::open(entry.path())?;
                self.write_stream(&mut file, &logical, options)?;
            }
        } else {
            return Err(OcflError::NotFound(source.display().to_string()));
        }
        Ok(self)
    }

    /// Remove a logical path from the new version. Removing a missing path
    /// is a no-op.
    pub fn remove_file(&self, logical_path: &str) -> Result<&Self> {
        validate_logical_path(logical_path)?;
        self.file_locks.with_lock(logical_path, || {
            let garbage = self.inner.lock().remove_file(logical_path);
            self.processor.delete_staged(&garbage);
            Ok(())
        })?;
        Ok(self)
    }

    /// Rename a logical path within the new version. No bytes move.
    pub fn rename_file(&self, src: &str, dst: &str, options: UpdateOptions) -> Result<&Self> {
        validate_logical_path(src)?;
        validate_logical_path(dst)?;
        let garbage = self
            .inner
            .lock()
            .rename_file(src, dst, options.overwrite)?;
        self.processor.delete_staged(&garbage);
        Ok(self)
    }

    /// Bind `dst` to the content `src_path` had in `src_version`. No bytes
    /// move.
    pub fn reinstate_file(
        &self,
        src_version: VersionNum,
        src_path: &str,
        dst: &str,
        options: UpdateOptions,
    ) -> Result<&Self> {
        validate_logical_path(src_path)?;
        validate_logical_path(dst)?;
        let garbage =
            self.inner
                .lock()
                .reinstate_file(src_version, src_path, dst, options.overwrite)?;
        self.processor.delete_staged(&garbage);
        Ok(self)
    }

    /// Record an alternate-algorithm digest for a file in the new version.
    pub fn add_fixity(
        &self,
        logical_path: &str,
        algorithm: DigestAlgorithm,
        value: HexDigest,
    ) -> Result<&Self> {
        self.inner.lock().add_fixity(logical_path, algorithm, value)?;
        Ok(self)
    }

    /// Whether the new version currently contains a logical path.
    pub fn contains_file(&self, logical_path: &str) -> bool {
        self.inner.lock().digest_for_path(logical_path).is_some()
    }

    pub(crate) fn finalize(
        self,
        info: VersionInfo,
        created: DateTime<Utc>,
    ) -> Result<Inventory> {
        Ok(self.inner.into_inner().into_inventory(info, created)?)
    }
}

impl std::fmt::Debug for ObjectUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectUpdater")
            .field("head", &self.inner.lock().head())
            .finish()
    }
}
