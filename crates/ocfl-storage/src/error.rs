use thiserror::Error;

/// Errors from byte-level storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The path does not exist.
    #[error("path not found: {0}")]
    NotFound(String),

    /// The destination of a write or move already exists.
    #[error("path already exists: {0}")]
    AlreadyExists(String),

    /// Best-effort batch deletion left failures behind.
    #[error("failed to delete {} file(s): {failed:?}", failed.len())]
    BatchDelete { failed: Vec<String> },

    /// Any other I/O failure, with the path it occurred on.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    /// Wrap an `io::Error`, promoting not-found and already-exists kinds to
    /// their specific variants.
    pub fn from_io(path: impl Into<String>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path),
            std::io::ErrorKind::AlreadyExists => Self::AlreadyExists(path),
            _ => Self::Io { path, source },
        }
    }
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
