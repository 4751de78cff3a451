use chrono::{DateTime, Utc};
use ocfl_types::{TypeError, VersionNum};
use thiserror::Error;

/// Errors from inventory construction, mutation, and serialization.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// A logical path is already bound in the version being staged.
    #[error("logical path already exists in version state: {0}")]
    PathAlreadyExists(String),

    /// A logical path would collide with an existing path as a directory
    /// or file, e.g. adding `a/b` when `a` names a file.
    #[error("logical path {path} conflicts with existing path {existing}")]
    PathConflict { path: String, existing: String },

    /// No file at the named logical path.
    #[error("no file at logical path: {0}")]
    FileNotFound(String),

    /// The referenced version does not exist.
    #[error("version not found: {0}")]
    VersionNotFound(VersionNum),

    /// Version timestamps must be non-decreasing.
    #[error("version created {next} precedes predecessor created {previous}")]
    NonMonotonicTimestamp {
        previous: DateTime<Utc>,
        next: DateTime<Utc>,
    },

    /// The inventory violates a structural invariant.
    #[error("invalid inventory for object {object_id}: {reason}")]
    Invalid { object_id: String, reason: String },

    /// The sidecar file is malformed.
    #[error("malformed inventory sidecar: {0}")]
    InvalidSidecar(String),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("inventory JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias for inventory operations.
pub type InventoryResult<T> = Result<T, InventoryError>;
