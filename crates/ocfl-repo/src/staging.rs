use std::path::{Path, PathBuf};

use sha2::{Digest as _, Sha256};
use tempfile::TempDir;

use crate::error::{OcflError, Result};

/// Allocates per-update staging directories under the repository work dir.
///
/// Staging directories are siblings of one another, never nested inside
/// object roots, and are deleted on every exit path: a [`StagingDir`]
/// removes its directory when dropped, whether the update committed,
/// failed, or panicked.
pub struct StagingManager {
    work_dir: PathBuf,
}

impl StagingManager {
    pub fn new(work_dir: impl Into<PathBuf>) -> Result<Self> {
        let work_dir = work_dir.into();
        std::fs::create_dir_all(&work_dir)?;
        Ok(Self { work_dir })
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// A fresh, empty staging directory for an update to `object_id`.
    ///
    /// The directory name carries a hash of the object id so concurrent
    /// updates to different objects never collide and stray directories
    /// can be traced back to an object.
    pub fn create(&self, object_id: &str) -> Result<StagingDir> {
        let id_hash = hex::encode(Sha256::digest(object_id.as_bytes()));
        let temp = tempfile::Builder::new()
            .prefix(&format!("{}-", &id_hash[..8]))
            .tempdir_in(&self.work_dir)
            .map_err(|e| OcflError::StorageIO(Box::new(e)))?;
        Ok(StagingDir { temp })
    }
}

impl std::fmt::Debug for StagingManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingManager")
            .field("work_dir", &self.work_dir)
            .finish()
    }
}

/// A staging directory that deletes itself when dropped.
pub struct StagingDir {
    temp: TempDir,
}

impl StagingDir {
    pub fn path(&self) -> &Path {
        self.temp.path()
    }
}

impl std::fmt::Debug for StagingDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingDir")
            .field("path", &self.temp.path())
            .finish()
    }
}
