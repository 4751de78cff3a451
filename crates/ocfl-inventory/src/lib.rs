//! The OCFL inventory: an object's complete versioned state.
//!
//! An inventory maps content digests to content paths (the manifest) and,
//! per version, content digests to logical paths (the state). The state is
//! inverse-indexed on purpose: one digest owning the set of logical paths
//! that share its content makes deduplication a data-shape property and
//! orphan collection a set difference.
//!
//! # Modules
//!
//! - [`inventory`] / [`version`] — the model and its invariant validation
//! - [`builder`] — copy-on-write construction of successor inventories
//! - [`updater`] — the add/remove/rename/reinstate operations applied while
//!   a version is being staged
//! - [`mutable`] — folding a mutable-HEAD overlay into an immutable version
//! - [`mapper`] — JSON (de)serialization and digest sidecar handling

pub mod builder;
pub mod error;
pub mod inventory;
pub mod mapper;
pub mod mutable;
pub mod updater;
pub mod version;

pub use builder::InventoryBuilder;
pub use error::{InventoryError, InventoryResult};
pub use inventory::Inventory;
pub use mapper::{
    algorithm_from_sidecar_name, format_sidecar, parse_sidecar, sidecar_name, InventoryMapper,
    SerdeInventoryMapper,
};
pub use mutable::fold_mutable_head;
pub use updater::{AddDecision, AddOutcome, InventoryUpdater};
pub use version::Version;
