//! The mutable-HEAD engine: a revision-numbered staging overlay on top of
//! the normal version lifecycle.
//!
//! The engine is part of [`Repository`] rather than a subtype of it; the
//! overlay changes where staged content lands and how it is sealed, not
//! what a repository is.

use ocfl_inventory::{fold_mutable_head, Inventory, InventoryUpdater};
use ocfl_types::{ObjectVersionId, User, VersionInfo};
use tracing::{debug, info};

use crate::error::Result;
use crate::repo::Repository;
use crate::update::ObjectUpdater;

/// Message recorded on the auto-generated empty first version.
const EMPTY_VERSION_MESSAGE: &str = "Auto-generated empty object version.";

impl Repository {
    /// Stage changes into the object's mutable HEAD, creating the overlay
    /// (and, for a new object, an empty `v1`) as needed.
    ///
    /// Each call allocates a new revision; the changes are readable as the
    /// object's HEAD but are not yet part of an immutable version.
    pub fn stage_changes(
        &self,
        object_id: &str,
        info: VersionInfo,
        mutations: impl FnOnce(&ObjectUpdater) -> Result<()>,
    ) -> Result<ObjectVersionId> {
        self.ensure_open()?;
        Self::validate_object_id(object_id)?;
        debug!(object_id, "stage changes");

        self.inner.locks.with_lock(object_id, || {
            let inventory = match self.inner.store.load_inventory(object_id)? {
                Some(inventory) => inventory,
                // If a later step fails, the object with the empty version
                // remains.
                None => self.create_empty_object(object_id)?,
            };
            let updater = InventoryUpdater::copy_state_mutable(&inventory)?;
            self.run_update(object_id, info, updater, mutations)
        })
    }

    /// Seal the mutable HEAD into the immutable version it reserved and
    /// remove the overlay. A no-op returning the current HEAD when the
    /// object has no staged changes.
    pub fn commit_staged_changes(
        &self,
        object_id: &str,
        info: VersionInfo,
    ) -> Result<ObjectVersionId> {
        self.ensure_open()?;
        Self::validate_object_id(object_id)?;
        debug!(object_id, "commit staged changes");

        self.inner.locks.with_lock(object_id, || {
            let inventory = self.require_inventory(object_id)?;
            if !inventory.has_mutable_head() {
                return Ok(ObjectVersionId::version(object_id, inventory.head));
            }

            let created = info.created.unwrap_or_else(|| self.inner.clock.now());
            let folded = fold_mutable_head(&inventory, info, created)?;
            let staging = self.inner.staging.create(object_id)?;
            self.inner
                .store
                .write_inventory_to_staging(&folded, staging.path())?;
            self.inner
                .store
                .commit_mutable_head(&inventory, &folded, staging.path())?;
            Ok(ObjectVersionId::version(object_id, folded.head))
        })
    }

    /// Throw away the mutable HEAD without committing it. A no-op when the
    /// object has no staged changes.
    pub fn purge_staged_changes(&self, object_id: &str) -> Result<()> {
        self.ensure_open()?;
        Self::validate_object_id(object_id)?;
        self.inner
            .locks
            .with_lock(object_id, || self.inner.store.purge_mutable_head(object_id))
    }

    /// Whether the object currently has an uncommitted mutable HEAD.
    pub fn has_staged_changes(&self, object_id: &str) -> Result<bool> {
        self.ensure_open()?;
        Self::validate_object_id(object_id)?;
        Ok(self
            .inner
            .store
            .load_inventory(object_id)?
            .map(|inv| inv.has_mutable_head())
            .unwrap_or(false))
    }

    /// Create and persist an object whose `v1` has no content. Only the
    /// mutable-HEAD path produces such versions.
    fn create_empty_object(&self, object_id: &str) -> Result<Inventory> {
        info!(object_id, "creating object with an empty version");
        let info = VersionInfo::new()
            .with_message(EMPTY_VERSION_MESSAGE)
            .with_user(User::new("ocfl-rs").with_address("https://github.com/ocfl-rs/ocfl-rs"));
        let updater = self.new_object_updater(object_id);
        let staging = self.inner.staging.create(object_id)?;
        let created = self.inner.clock.now();
        let inventory = updater.into_inventory(info, created)?;
        self.write_new_version(&inventory, &staging)?;
        Ok(inventory)
    }
}
