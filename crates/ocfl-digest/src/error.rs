use ocfl_types::{DigestAlgorithm, HexDigest};

/// Errors from digest computation and fixity checks.
#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    /// The computed digest does not match the expected value.
    #[error("{algorithm} fixity check failed: expected {expected}, got {actual}")]
    FixityMismatch {
        algorithm: DigestAlgorithm,
        expected: HexDigest,
        actual: HexDigest,
    },

    /// I/O failure while reading the content being digested.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for digest operations.
pub type DigestResult<T> = Result<T, DigestError>;
