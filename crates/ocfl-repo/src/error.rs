use ocfl_digest::DigestError;
use ocfl_inventory::InventoryError;
use ocfl_storage::StorageError;
use thiserror::Error;

/// The error taxonomy the repository reports to callers.
///
/// Leaf-crate errors are folded into these variants so callers can match on
/// what went wrong without caring which layer noticed: a fixity failure is
/// a fixity failure whether the digester or the version writer caught it.
#[derive(Debug, Error)]
pub enum OcflError {
    /// Object, version, or file does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A concurrent writer changed the object between load and install.
    #[error("object {object_id} was modified by a concurrent writer; expected head {expected_head}")]
    ObjectOutOfSync {
        object_id: String,
        expected_head: String,
    },

    /// The destination already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A logical or content path violates path rules.
    #[error("invalid path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// Content bytes do not match their recorded digest.
    #[error("fixity mismatch: {0}")]
    FixityMismatch(String),

    /// The object is in an inconsistent state on storage and needs manual
    /// repair.
    #[error("object {object_id} is corrupt: {reason}")]
    CorruptObject { object_id: String, reason: String },

    /// A lock could not be acquired within its timeout.
    #[error("timed out acquiring lock on {key}")]
    LockTimeout { key: String },

    /// The inventory is structurally invalid.
    #[error("invalid inventory: {0}")]
    InvalidInventory(String),

    /// The repository or its configuration is malformed.
    #[error("repository configuration error: {0}")]
    Config(String),

    /// The repository has been closed.
    #[error("repository is closed")]
    Closed,

    /// Any other storage-level I/O failure.
    #[error("storage I/O error: {0}")]
    StorageIO(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<StorageError> for OcflError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(path) => Self::NotFound(path),
            StorageError::AlreadyExists(path) => Self::AlreadyExists(path),
            other => Self::StorageIO(Box::new(other)),
        }
    }
}

impl From<InventoryError> for OcflError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::PathAlreadyExists(path) => Self::AlreadyExists(path),
            InventoryError::PathConflict { path, existing } => Self::InvalidPath {
                path,
                reason: format!("conflicts with existing path {existing}"),
            },
            InventoryError::FileNotFound(path) => Self::NotFound(path),
            InventoryError::VersionNotFound(num) => Self::NotFound(num.to_string()),
            other => Self::InvalidInventory(other.to_string()),
        }
    }
}

impl From<DigestError> for OcflError {
    fn from(err: DigestError) -> Self {
        match err {
            DigestError::FixityMismatch { .. } => Self::FixityMismatch(err.to_string()),
            DigestError::Io(e) => Self::StorageIO(Box::new(e)),
        }
    }
}

impl From<std::io::Error> for OcflError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageIO(Box::new(err))
    }
}

/// Result alias for repository operations.
pub type Result<T> = std::result::Result<T, OcflError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_not_found_stays_specific() {
        let err: OcflError = StorageError::NotFound("x".into()).into();
        assert!(matches!(err, OcflError::NotFound(_)));
    }

    #[test]
    fn fixity_mismatch_stays_distinguishable_from_io() {
        let err: OcflError = DigestError::FixityMismatch {
            algorithm: ocfl_types::DigestAlgorithm::Sha512,
            expected: ocfl_types::HexDigest::new("aa"),
            actual: ocfl_types::HexDigest::new("bb"),
        }
        .into();
        assert!(matches!(err, OcflError::FixityMismatch(_)));

        let io: OcflError =
            DigestError::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom")).into();
        assert!(matches!(io, OcflError::StorageIO(_)));
    }

    #[test]
    fn path_exists_maps_to_already_exists() {
        let err: OcflError = InventoryError::PathAlreadyExists("p".into()).into();
        assert!(matches!(err, OcflError::AlreadyExists(_)));
    }
}
