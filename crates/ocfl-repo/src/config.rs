use std::time::Duration;

use ocfl_types::DigestAlgorithm;

use crate::error::{OcflError, Result};

/// Repository-wide defaults and tunables.
#[derive(Clone, Debug)]
pub struct OcflConfig {
    /// Primary digest algorithm for newly created objects.
    pub digest_algorithm: DigestAlgorithm,
    /// Version content directory name for newly created objects; `None`
    /// writes no `contentDirectory` key and uses the OCFL default.
    pub content_directory: Option<String>,
    /// Re-digest every staged content file before installing a version.
    pub verify_staging: bool,
    /// Max wait for an object's write lock.
    pub object_lock_timeout: Duration,
    /// Max wait for a logical-path file lock within one update.
    pub file_lock_timeout: Duration,
}

impl Default for OcflConfig {
    fn default() -> Self {
        Self {
            digest_algorithm: DigestAlgorithm::Sha512,
            content_directory: None,
            verify_staging: true,
            object_lock_timeout: Duration::from_secs(10),
            file_lock_timeout: Duration::from_secs(10),
        }
    }
}

impl OcflConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.digest_algorithm.is_primary() {
            return Err(OcflError::Config(format!(
                "{} cannot be used as the primary digest algorithm; use sha512 or sha256",
                self.digest_algorithm
            )));
        }
        if let Some(dir) = &self.content_directory {
            if dir.is_empty() || dir.contains('/') {
                return Err(OcflError::Config(format!(
                    "invalid content directory name: {dir:?}"
                )));
            }
        }
        Ok(())
    }
}
