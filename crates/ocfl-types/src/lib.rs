//! Foundation types for the OCFL repository engine.
//!
//! This crate provides the vocabulary shared by every other `ocfl-*` crate:
//! version and revision numbers, digest algorithms and values, and the
//! metadata callers attach to versions.
//!
//! # Key Types
//!
//! - [`VersionNum`] — an OCFL version number (`v1`, `v0003`) with a padding
//!   width that is fixed for the lifetime of an object
//! - [`RevisionNum`] — a mutable-HEAD revision number (`r1`, `r2`, …)
//! - [`DigestAlgorithm`] — the algorithms an inventory may reference
//! - [`HexDigest`] — a lowercase-normalized hex digest value
//! - [`VersionInfo`] / [`User`] — caller-supplied commit metadata
//! - [`ObjectVersionId`] — an object identifier plus an optional version anchor

pub mod digest;
pub mod error;
pub mod meta;
pub mod spec;
pub mod version;

pub use digest::{DigestAlgorithm, HexDigest};
pub use error::TypeError;
pub use meta::{ObjectVersionId, User, VersionInfo};
pub use version::{RevisionNum, VersionNum};
