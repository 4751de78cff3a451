//! The OCFL repository engine.
//!
//! [`Repository`] composes the inventory model, the staging lifecycle, and
//! a byte-level [`Storage`](ocfl_storage::Storage) backend into the
//! create / update / read / purge contract, including the optional
//! mutable-HEAD extension.
//!
//! An update proceeds as: acquire the object's write lock, load and
//! validate the current inventory, open a staging directory, run the
//! caller's mutations (new bytes are digested, deduplicated, and written
//! into staging), then serialize the successor inventory and install the
//! new version atomically. The staging directory is deleted on every exit
//! path.
//!
//! ```no_run
//! use ocfl_repo::{Repository, UpdateOptions};
//! use ocfl_storage::FsStorage;
//! use ocfl_types::VersionInfo;
//!
//! # fn main() -> ocfl_repo::Result<()> {
//! let repo = Repository::builder()
//!     .storage(FsStorage::new("/var/ocfl/root")?)
//!     .work_dir("/var/ocfl/work")
//!     .build()?;
//!
//! repo.update_object("urn:example:1", VersionInfo::new(), |updater| {
//!     updater.write_bytes(b"hello", "hello.txt", UpdateOptions::default())?;
//!     Ok(())
//! })?;
//! # Ok(())
//! # }
//! ```

pub mod add_file;
pub mod cache;
pub mod clock;
pub mod config;
pub mod details;
pub mod error;
pub mod lock;
pub mod mutable_head;
pub mod paths;
pub mod repo;
pub mod staging;
pub mod store;
pub mod update;

pub use cache::{Cache, MemoryCache, NoOpCache};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::OcflConfig;
pub use details::{FileDetails, ObjectDetails, VersionDetails};
pub use error::{OcflError, Result};
pub use paths::{
    ContentPathConstraints, DirectLogicalPathMapper, LogicalPathMapper,
    PercentEncodingPathMapper,
};
pub use repo::{Repository, RepositoryBuilder};
pub use update::{ObjectUpdater, UpdateOptions};
