use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ocfl_digest::Digester;
use ocfl_types::{DigestAlgorithm, HexDigest};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{OcflError, Result};
use crate::paths::{ContentPathConstraints, LogicalPathMapper};

/// Ingests content into the staging area.
///
/// Incoming bytes are streamed to a provisional file while the primary
/// digest accumulates; the updater then decides whether the content is new
/// (promote the provisional file to its content path) or a duplicate
/// (drop it). Path mapping and constraint checks run before any bytes are
/// written to a final location.
pub struct AddFileProcessor {
    /// Local directory staged content lands in.
    staging_content_dir: PathBuf,
    /// Storage-relative prefix of this version's content paths, e.g.
    /// `v2/content`.
    content_prefix: String,
    algorithm: DigestAlgorithm,
    mapper: Arc<dyn LogicalPathMapper>,
    constraints: ContentPathConstraints,
}

/// Content sitting at a provisional path, digest known. Dropping it
/// deletes the provisional file.
pub struct StagedContent {
    temp: NamedTempFile,
    digest: HexDigest,
    len: u64,
}

impl StagedContent {
    pub fn digest(&self) -> &HexDigest {
        &self.digest
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl AddFileProcessor {
    pub fn new(
        staging_content_dir: PathBuf,
        content_prefix: String,
        algorithm: DigestAlgorithm,
        mapper: Arc<dyn LogicalPathMapper>,
        constraints: ContentPathConstraints,
    ) -> Self {
        Self {
            staging_content_dir,
            content_prefix,
            algorithm,
            mapper,
            constraints,
        }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Stream `reader` to a provisional file, computing the primary digest
    /// along the way.
    pub fn stage(&self, reader: &mut dyn Read) -> Result<StagedContent> {
        fs::create_dir_all(&self.staging_content_dir)?;
        let mut temp = tempfile::Builder::new()
            .prefix(".staged-")
            .tempfile_in(&self.staging_content_dir)
            .map_err(|e| OcflError::StorageIO(Box::new(e)))?;
        let mut digester = Digester::new(self.algorithm);
        let mut len = 0u64;
        let mut buf = [0u8; 8192];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            digester.update(&buf[..n]);
            temp.write_all(&buf[..n])?;
            len += n as u64;
        }
        temp.flush()?;
        Ok(StagedContent {
            temp,
            digest: digester.finalize(),
            len,
        })
    }

    /// The storage-relative content path and local staging path a logical
    /// path maps to. Fails with `InvalidPath` before any bytes move.
    pub fn content_path_for(&self, logical_path: &str) -> Result<(String, PathBuf)> {
        let part = self.mapper.to_content_path_part(logical_path);
        let full = format!("{}/{part}", self.content_prefix);
        self.constraints.apply(&full)?;
        Ok((full, self.staging_content_dir.join(&part)))
    }

    /// Move staged content to its final place in the staging tree.
    pub fn promote(&self, staged: StagedContent, local: &Path) -> Result<()> {
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent)?;
        }
        staged
            .temp
            .persist(local)
            .map_err(|e| OcflError::StorageIO(Box::new(e.error)))?;
        Ok(())
    }

    /// Delete staged files whose content paths became garbage. Only paths
    /// under this update's content prefix can be garbage.
    pub fn delete_staged(&self, content_paths: &[String]) {
        let prefix = format!("{}/", self.content_prefix);
        for path in content_paths {
            let Some(rest) = path.strip_prefix(&prefix) else {
                continue;
            };
            let local = self.staging_content_dir.join(rest);
            match fs::remove_file(&local) {
                Ok(()) => debug!(path = %path, "reclaimed staged content"),
                Err(e) => warn!(path = %path, error = %e, "failed to reclaim staged content"),
            }
        }
    }
}

impl std::fmt::Debug for AddFileProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddFileProcessor")
            .field("content_prefix", &self.content_prefix)
            .field("algorithm", &self.algorithm)
            .finish()
    }
}
