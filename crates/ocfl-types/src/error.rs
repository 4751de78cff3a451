use thiserror::Error;

/// Errors produced by type construction and parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid version number: {0}")]
    InvalidVersionNum(String),

    #[error("invalid revision number: {0}")]
    InvalidRevisionNum(String),

    #[error("unknown digest algorithm: {0}")]
    UnknownDigestAlgorithm(String),

    #[error("invalid {algorithm} digest value: {value}")]
    InvalidDigest { algorithm: String, value: String },
}
