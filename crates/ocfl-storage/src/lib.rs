//! Byte-level storage for the OCFL repository engine.
//!
//! Everything above this crate manipulates an abstract hierarchical
//! namespace of forward-slash-separated relative paths; the [`Storage`]
//! trait is the only way bytes reach disk. Two backends are provided:
//!
//! - [`FsStorage`] — a directory on the local filesystem
//! - [`MemoryStorage`] — a flat in-memory keyspace that emulates
//!   directories, used by tests and shaped like an object store
//!
//! The crate also hosts the storage-layout extensions that map object
//! identifiers to object-root paths ([`StorageLayout`]).
//!
//! # Design Rules
//!
//! 1. Writes are atomic with respect to readers: partial file contents are
//!    never observable.
//! 2. `write` and directory moves never clobber; an existing destination is
//!    an [`StorageError::AlreadyExists`] error.
//! 3. Within-storage moves are rename-equivalent when the backend allows.
//! 4. Batch deletion is best-effort; everything else is all-or-nothing.

pub mod error;
pub mod fs;
pub mod layout;
pub mod listing;
pub mod memory;
pub mod traits;

pub use error::{StorageError, StorageResult};
pub use fs::FsStorage;
pub use layout::{FlatDirectLayout, HashedNTupleLayout, StorageLayout};
pub use listing::{Listing, ListingType};
pub use memory::MemoryStorage;
pub use traits::{ObjectRootIter, Storage};
