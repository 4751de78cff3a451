//! Streaming digest computation and fixity verification.
//!
//! [`Digester`] computes a digest incrementally under any
//! [`DigestAlgorithm`](ocfl_types::DigestAlgorithm); it also implements
//! [`std::io::Write`] so content can be digested while being copied.
//! [`FixityReader`] wraps any byte stream, digesting everything the consumer
//! reads and failing with [`DigestError::FixityMismatch`] if the result does
//! not match an expected value.

pub mod digester;
pub mod error;
pub mod fixity;

pub use digester::{digest_file, digest_reader, Digester};
pub use error::{DigestError, DigestResult};
pub use fixity::{unwrap_fixity_error, FixityReader};
