use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use ocfl_digest::Digester;
use ocfl_inventory::{
    algorithm_from_sidecar_name, format_sidecar, parse_sidecar, sidecar_name, Inventory,
    InventoryMapper,
};
use ocfl_storage::{Storage, StorageError, StorageLayout};
use ocfl_types::spec::{
    EXTENSIONS_DIR, EXTENSION_CONFIG_FILE, INVENTORY_FILE, MUTABLE_HEAD_DIR,
    MUTABLE_HEAD_EXT_NAME, OBJECT_NAMASTE_CONTENT, OBJECT_NAMASTE_FILE, OCFL_LAYOUT_FILE,
    ROOT_NAMASTE_CONTENT, ROOT_NAMASTE_FILE,
};
use ocfl_types::{HexDigest, RevisionNum, VersionNum};
use tracing::{debug, error, info, warn};

use crate::cache::Cache;
use crate::error::{OcflError, Result};

const INVENTORY_MEDIA_TYPE: &str = "application/json";

/// The object-aware storage layer: everything between the repository façade
/// and raw bytes.
///
/// Loads and sidecar-verifies inventories, installs new versions
/// atomically, manages the mutable-HEAD overlay on storage, and bootstraps
/// the storage root.
pub struct RepoStore {
    storage: Arc<dyn Storage>,
    layout: Arc<dyn StorageLayout>,
    mapper: Arc<dyn InventoryMapper>,
    cache: Arc<dyn Cache<String, Inventory>>,
}

fn join(base: &str, rest: &str) -> String {
    if base.is_empty() {
        rest.to_string()
    } else {
        format!("{base}/{rest}")
    }
}

impl RepoStore {
    pub fn new(
        storage: Arc<dyn Storage>,
        layout: Arc<dyn StorageLayout>,
        mapper: Arc<dyn InventoryMapper>,
        cache: Arc<dyn Cache<String, Inventory>>,
    ) -> Self {
        Self {
            storage,
            layout,
            mapper,
            cache,
        }
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    /// The object-root path for an id, relative to the storage root.
    pub fn object_root(&self, object_id: &str) -> String {
        self.layout.map_object_id(object_id)
    }

    // ---------------------------------------------------------------
    // Storage root bootstrap
    // ---------------------------------------------------------------

    /// Validate an existing storage root or initialize an empty one.
    pub fn init_root(&self) -> Result<()> {
        if self.storage.file_exists(ROOT_NAMASTE_FILE)? {
            return self.validate_root();
        }
        let listings = match self.storage.list_directory("") {
            Ok(listings) => listings,
            Err(StorageError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        if !listings.is_empty() {
            return Err(OcflError::Config(
                "storage root is non-empty but is not an OCFL storage root".into(),
            ));
        }

        info!(layout = self.layout.extension_name(), "initializing storage root");
        self.storage
            .write(ROOT_NAMASTE_FILE, ROOT_NAMASTE_CONTENT.as_bytes(), None)?;
        let layout_decl = serde_json::json!({
            "extension": self.layout.extension_name(),
            "description": self.layout.description(),
        });
        self.storage.write(
            OCFL_LAYOUT_FILE,
            serde_json::to_vec_pretty(&layout_decl)
                .map_err(|e| OcflError::Config(e.to_string()))?
                .as_slice(),
            Some(INVENTORY_MEDIA_TYPE),
        )?;
        let config_path = format!(
            "{EXTENSIONS_DIR}/{}/{EXTENSION_CONFIG_FILE}",
            self.layout.extension_name()
        );
        self.storage.write(
            &config_path,
            serde_json::to_vec_pretty(&self.layout.config_json())
                .map_err(|e| OcflError::Config(e.to_string()))?
                .as_slice(),
            Some(INVENTORY_MEDIA_TYPE),
        )?;
        Ok(())
    }

    fn validate_root(&self) -> Result<()> {
        let namaste = self.storage.read_to_string(ROOT_NAMASTE_FILE)?;
        if namaste != ROOT_NAMASTE_CONTENT {
            return Err(OcflError::Config(format!(
                "unexpected storage root declaration: {namaste:?}"
            )));
        }
        if self.storage.file_exists(OCFL_LAYOUT_FILE)? {
            let declared: serde_json::Value = serde_json::from_str(
                &self.storage.read_to_string(OCFL_LAYOUT_FILE)?,
            )
            .map_err(|e| OcflError::Config(format!("invalid {OCFL_LAYOUT_FILE}: {e}")))?;
            let extension = declared
                .get("extension")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            if extension != self.layout.extension_name() {
                return Err(OcflError::Config(format!(
                    "storage root uses layout {extension}, repository configured with {}",
                    self.layout.extension_name()
                )));
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Inventory loading
    // ---------------------------------------------------------------

    /// Load the current inventory of an object: the mutable-HEAD inventory
    /// when the overlay exists, the root inventory otherwise. `None` when
    /// the object does not exist.
    pub fn load_inventory(&self, object_id: &str) -> Result<Option<Inventory>> {
        if let Some(inventory) = self.cache.get(&object_id.to_string()) {
            return Ok(Some(inventory));
        }

        let root = self.object_root(object_id);
        let mutable_dir = join(&root, MUTABLE_HEAD_DIR);
        let inventory = if self
            .storage
            .file_exists(&join(&mutable_dir, INVENTORY_FILE))?
        {
            let mut inventory = self.read_verified_inventory(object_id, &mutable_dir)?;
            inventory.mutable_head = true;
            inventory.revision = Some(self.current_revision(&inventory, &root)?);
            inventory
        } else if self.storage.file_exists(&join(&root, INVENTORY_FILE))? {
            self.read_verified_inventory(object_id, &root)?
        } else {
            if self.storage.file_exists(&join(&root, OBJECT_NAMASTE_FILE))? {
                return Err(OcflError::CorruptObject {
                    object_id: object_id.to_string(),
                    reason: "object root exists but has no inventory".into(),
                });
            }
            return Ok(None);
        };

        inventory.validate().map_err(|e| OcflError::CorruptObject {
            object_id: object_id.to_string(),
            reason: e.to_string(),
        })?;
        self.cache.put(object_id.to_string(), inventory.clone());
        Ok(Some(inventory))
    }

    /// Read an inventory and verify it against its digest sidecar.
    fn read_verified_inventory(&self, object_id: &str, dir: &str) -> Result<Inventory> {
        let mut bytes = Vec::new();
        self.storage
            .read(&join(dir, INVENTORY_FILE))?
            .read_to_end(&mut bytes)
            .map_err(|e| OcflError::StorageIO(Box::new(e)))?;
        let inventory = self
            .mapper
            .read(&mut bytes.as_slice())
            .map_err(|e| OcflError::CorruptObject {
                object_id: object_id.to_string(),
                reason: e.to_string(),
            })?;

        let sidecar_path = join(dir, &sidecar_name(inventory.digest_algorithm));
        let expected = parse_sidecar(&self.storage.read_to_string(&sidecar_path)?)
            .map_err(|e| OcflError::CorruptObject {
                object_id: object_id.to_string(),
                reason: e.to_string(),
            })?;
        let actual = Digester::hash(inventory.digest_algorithm, &bytes);
        if actual != expected {
            return Err(OcflError::CorruptObject {
                object_id: object_id.to_string(),
                reason: format!(
                    "inventory digest {actual} does not match sidecar {expected}"
                ),
            });
        }

        if inventory.id != object_id {
            return Err(OcflError::CorruptObject {
                object_id: object_id.to_string(),
                reason: format!("inventory belongs to object {}", inventory.id),
            });
        }
        Ok(inventory)
    }

    /// The highest revision directory present under the mutable HEAD, `r1`
    /// when no revision has content yet.
    fn current_revision(&self, inventory: &Inventory, object_root: &str) -> Result<RevisionNum> {
        let content_dir = join(
            &join(object_root, MUTABLE_HEAD_DIR),
            inventory.content_directory_name(),
        );
        let listings = match self.storage.list_directory(&content_dir) {
            Ok(listings) => listings,
            Err(StorageError::NotFound(_)) => return Ok(RevisionNum::R1),
            Err(e) => return Err(e.into()),
        };
        Ok(listings
            .iter()
            .filter(|l| l.is_directory())
            .filter_map(|l| l.relative.parse::<RevisionNum>().ok())
            .max()
            .unwrap_or(RevisionNum::R1))
    }

    // ---------------------------------------------------------------
    // Staging-side inventory files
    // ---------------------------------------------------------------

    /// Serialize an inventory plus sidecar into a local staging directory.
    pub fn write_inventory_to_staging(
        &self,
        inventory: &Inventory,
        staging: &Path,
    ) -> Result<HexDigest> {
        let bytes = self.mapper.write(inventory)?;
        let digest = Digester::hash(inventory.digest_algorithm, &bytes);
        std::fs::write(staging.join(INVENTORY_FILE), &bytes)?;
        std::fs::write(
            staging.join(sidecar_name(inventory.digest_algorithm)),
            format_sidecar(&digest),
        )?;
        Ok(digest)
    }

    /// Serialize an inventory plus sidecar directly into a storage
    /// directory, replacing whatever is there.
    fn write_inventory_to_storage(&self, inventory: &Inventory, dir: &str) -> Result<()> {
        let bytes = self.mapper.write(inventory)?;
        let digest = Digester::hash(inventory.digest_algorithm, &bytes);
        let inv_path = join(dir, INVENTORY_FILE);
        let sidecar_path = join(dir, &sidecar_name(inventory.digest_algorithm));
        self.storage.delete_file(&inv_path)?;
        self.storage
            .write(&inv_path, &bytes, Some(INVENTORY_MEDIA_TYPE))?;
        self.storage.delete_file(&sidecar_path)?;
        self.storage
            .write(&sidecar_path, format_sidecar(&digest).as_bytes(), None)?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Version installation
    // ---------------------------------------------------------------

    /// Install a staged version. The staging directory holds the version
    /// contents: `inventory.json`, its sidecar, and the content directory
    /// (if the version has content).
    pub fn store_new_version(&self, inventory: &Inventory, staging: &Path) -> Result<()> {
        if inventory.has_mutable_head() {
            self.store_mutable_version(inventory, staging)?;
        } else if inventory.head == VersionNum::V1 {
            self.store_first_version(inventory, staging)?;
        } else {
            self.store_successor_version(inventory, staging)?;
        }
        self.cache.put(inventory.id.clone(), inventory.clone());
        Ok(())
    }

    fn store_first_version(&self, inventory: &Inventory, staging: &Path) -> Result<()> {
        let root = self.object_root(&inventory.id);
        debug!(object_id = %inventory.id, %root, "installing first version");

        self.storage.create_directories(&root)?;
        let namaste = join(&root, OBJECT_NAMASTE_FILE);
        self.storage
            .write(&namaste, OBJECT_NAMASTE_CONTENT.as_bytes(), None)
            .map_err(|e| self.map_concurrent(&inventory.id, inventory.head, e))?;

        let version_dir = join(&root, &inventory.head.to_string());
        self.storage
            .move_directory_into(staging, &version_dir)
            .map_err(|e| self.map_concurrent(&inventory.id, inventory.head, e))?;

        if let Err(e) = self.copy_inventory_to_root(inventory, &version_dir, &root) {
            warn!(object_id = %inventory.id, error = %e, "first-version install failed; removing object root");
            if let Err(rollback) = self.storage.delete_directory(&root) {
                error!(object_id = %inventory.id, error = %rollback, "rollback failed");
                return Err(OcflError::CorruptObject {
                    object_id: inventory.id.clone(),
                    reason: format!("failed install and failed rollback: {e}; {rollback}"),
                });
            }
            return Err(e);
        }
        info!(object_id = %inventory.id, "created object");
        Ok(())
    }

    fn store_successor_version(&self, inventory: &Inventory, staging: &Path) -> Result<()> {
        let root = self.object_root(&inventory.id);
        let Some(expected) = inventory.head.previous() else {
            return Err(OcflError::InvalidInventory(
                "successor version has no predecessor".into(),
            ));
        };

        if self
            .storage
            .file_exists(&join(&join(&root, MUTABLE_HEAD_DIR), INVENTORY_FILE))?
        {
            return Err(OcflError::AlreadyExists(format!(
                "object {} has an uncommitted mutable HEAD; commit or purge it first",
                inventory.id
            )));
        }

        let on_storage = self.read_verified_inventory(&inventory.id, &root)?;
        if on_storage.head != expected {
            return Err(OcflError::ObjectOutOfSync {
                object_id: inventory.id.clone(),
                expected_head: expected.to_string(),
            });
        }

        let version_dir = join(&root, &inventory.head.to_string());
        debug!(object_id = %inventory.id, version = %inventory.head, "installing version");
        self.storage
            .move_directory_into(staging, &version_dir)
            .map_err(|e| self.map_concurrent(&inventory.id, expected, e))?;

        if let Err(e) = self.copy_inventory_to_root(inventory, &version_dir, &root) {
            warn!(object_id = %inventory.id, version = %inventory.head, error = %e,
                "install failed after version move; rolling back");
            if let Err(rollback) = self.storage.delete_directory(&version_dir) {
                error!(object_id = %inventory.id, error = %rollback, "rollback failed; manual repair required");
                return Err(OcflError::CorruptObject {
                    object_id: inventory.id.clone(),
                    reason: format!("failed install and failed rollback: {e}; {rollback}"),
                });
            }
            return Err(e);
        }
        Ok(())
    }

    fn copy_inventory_to_root(
        &self,
        inventory: &Inventory,
        version_dir: &str,
        root: &str,
    ) -> Result<()> {
        let sidecar = sidecar_name(inventory.digest_algorithm);
        self.remove_stale_sidecars(root, &sidecar)?;
        self.storage
            .copy_file_internal(&join(version_dir, INVENTORY_FILE), &join(root, INVENTORY_FILE))?;
        self.storage
            .copy_file_internal(&join(version_dir, &sidecar), &join(root, &sidecar))?;
        Ok(())
    }

    /// Sidecar algorithm never changes today, but a stale sidecar under a
    /// different algorithm would shadow the real one on load.
    fn remove_stale_sidecars(&self, root: &str, keep: &str) -> Result<()> {
        let listings = match self.storage.list_directory(root) {
            Ok(listings) => listings,
            Err(StorageError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for listing in listings {
            if listing.is_file()
                && listing.relative != keep
                && algorithm_from_sidecar_name(&listing.relative).is_some()
            {
                self.storage.delete_file(&join(root, &listing.relative))?;
            }
        }
        Ok(())
    }

    fn map_concurrent(
        &self,
        object_id: &str,
        expected_head: VersionNum,
        err: StorageError,
    ) -> OcflError {
        match err {
            StorageError::AlreadyExists(_) => OcflError::ObjectOutOfSync {
                object_id: object_id.to_string(),
                expected_head: expected_head.to_string(),
            },
            other => other.into(),
        }
    }

    // ---------------------------------------------------------------
    // Mutable HEAD
    // ---------------------------------------------------------------

    fn store_mutable_version(&self, inventory: &Inventory, staging: &Path) -> Result<()> {
        let root = self.object_root(&inventory.id);
        let head_dir = join(&root, MUTABLE_HEAD_DIR);
        let Some(revision) = inventory.revision else {
            return Err(OcflError::InvalidInventory(
                "mutable inventory without a revision number".into(),
            ));
        };

        let head_exists = self
            .storage
            .file_exists(&join(&head_dir, INVENTORY_FILE))?;
        if revision == RevisionNum::R1 && head_exists {
            return Err(OcflError::ObjectOutOfSync {
                object_id: inventory.id.clone(),
                expected_head: inventory.head.to_string(),
            });
        }
        if revision != RevisionNum::R1 && !head_exists {
            return Err(OcflError::ObjectOutOfSync {
                object_id: inventory.id.clone(),
                expected_head: inventory.head.to_string(),
            });
        }

        debug!(object_id = %inventory.id, %revision, "staging mutable HEAD revision");
        self.storage.create_directories(&head_dir)?;

        let content_dir = inventory.content_directory_name();
        let staged_revision = staging.join(content_dir).join(revision.to_string());
        let mut installed_revision = None;
        if staged_revision.is_dir() {
            let target = join(&join(&head_dir, content_dir), &revision.to_string());
            self.storage
                .move_directory_into(&staged_revision, &target)
                .map_err(|e| self.map_concurrent(&inventory.id, inventory.head, e))?;
            installed_revision = Some(target);
        }

        if let Err(e) = self.write_inventory_to_storage(inventory, &head_dir) {
            warn!(object_id = %inventory.id, %revision, error = %e,
                "mutable HEAD inventory update failed; rolling back revision");
            if let Some(target) = installed_revision {
                if let Err(rollback) = self.storage.delete_directory(&target) {
                    error!(object_id = %inventory.id, error = %rollback, "rollback failed");
                    return Err(OcflError::CorruptObject {
                        object_id: inventory.id.clone(),
                        reason: format!("failed stage and failed rollback: {e}; {rollback}"),
                    });
                }
            }
            return Err(e);
        }
        Ok(())
    }

    /// Fold the on-storage mutable HEAD into the immutable version the
    /// folded inventory describes.
    pub fn commit_mutable_head(
        &self,
        mutable: &Inventory,
        folded: &Inventory,
        staging: &Path,
    ) -> Result<()> {
        let root = self.object_root(&folded.id);
        let head_dir = join(&root, MUTABLE_HEAD_DIR);
        if !self.storage.file_exists(&join(&head_dir, INVENTORY_FILE))? {
            return Err(OcflError::NotFound(format!(
                "object {} has no mutable HEAD to commit",
                folded.id
            )));
        }

        let version_dir = join(&root, &folded.head.to_string());
        self.storage
            .move_directory_internal(&head_dir, &version_dir)
            .map_err(|e| self.map_concurrent(&folded.id, folded.head, e))?;

        let result = self.finish_mutable_commit(folded, staging, &root, &version_dir);
        if let Err(e) = result {
            warn!(object_id = %folded.id, error = %e, "mutable HEAD commit failed; restoring overlay");
            if let Err(rollback) = self.restore_mutable_head(mutable, &head_dir, &version_dir) {
                error!(object_id = %folded.id, error = %rollback, "rollback failed; manual repair required");
                return Err(OcflError::CorruptObject {
                    object_id: folded.id.clone(),
                    reason: format!("failed commit and failed rollback: {e}; {rollback}"),
                });
            }
            return Err(e);
        }

        // The overlay's parent extension dir is gone once empty.
        self.storage
            .delete_empty_dirs_down(&join(&root, &format!("{EXTENSIONS_DIR}/{MUTABLE_HEAD_EXT_NAME}")))?;
        self.storage
            .delete_empty_dirs_down(&join(&root, EXTENSIONS_DIR))?;
        self.cache.put(folded.id.clone(), folded.clone());
        info!(object_id = %folded.id, version = %folded.head, "committed mutable HEAD");
        Ok(())
    }

    fn finish_mutable_commit(
        &self,
        folded: &Inventory,
        staging: &Path,
        root: &str,
        version_dir: &str,
    ) -> Result<()> {
        // Replace the overlay inventory with the folded one.
        self.storage.delete_file(&join(version_dir, INVENTORY_FILE))?;
        self.storage.copy_file_into(
            &staging.join(INVENTORY_FILE),
            &join(version_dir, INVENTORY_FILE),
            Some(INVENTORY_MEDIA_TYPE),
        )?;
        let sidecar = sidecar_name(folded.digest_algorithm);
        self.storage.delete_file(&join(version_dir, &sidecar))?;
        self.storage.copy_file_into(
            &staging.join(&sidecar),
            &join(version_dir, &sidecar),
            None,
        )?;

        self.cleanup_unreferenced_files(folded, version_dir)?;
        self.copy_inventory_to_root(folded, version_dir, root)?;
        Ok(())
    }

    /// Files staged in superseded revisions may no longer be referenced by
    /// the folded manifest; drop them so the version holds exactly its
    /// content.
    fn cleanup_unreferenced_files(&self, folded: &Inventory, version_dir: &str) -> Result<()> {
        let prefix = format!("{}/", folded.head);
        let referenced: std::collections::BTreeSet<&str> = folded
            .manifest
            .values()
            .flatten()
            .filter_map(|p| p.strip_prefix(&prefix))
            .collect();
        let sidecar = sidecar_name(folded.digest_algorithm);

        let mut garbage = Vec::new();
        for listing in self.storage.list_recursive(version_dir)? {
            if !listing.is_file() {
                continue;
            }
            if listing.relative == INVENTORY_FILE || listing.relative == sidecar {
                continue;
            }
            if !referenced.contains(listing.relative.as_str()) {
                garbage.push(join(version_dir, &listing.relative));
            }
        }
        if !garbage.is_empty() {
            debug!(count = garbage.len(), "removing unreferenced mutable HEAD files");
            self.storage.delete_files(&garbage)?;
        }
        let content_dir = join(version_dir, folded.content_directory_name());
        self.storage.delete_empty_dirs_down(&content_dir)?;
        Ok(())
    }

    fn restore_mutable_head(
        &self,
        mutable: &Inventory,
        head_dir: &str,
        version_dir: &str,
    ) -> Result<()> {
        self.storage
            .move_directory_internal(version_dir, head_dir)?;
        self.write_inventory_to_storage(mutable, head_dir)?;
        Ok(())
    }

    /// Delete the mutable-HEAD overlay without committing it.
    pub fn purge_mutable_head(&self, object_id: &str) -> Result<()> {
        let root = self.object_root(object_id);
        let ext_dir = join(&root, &format!("{EXTENSIONS_DIR}/{MUTABLE_HEAD_EXT_NAME}"));
        info!(object_id, "purging mutable HEAD");
        self.storage.delete_directory(&ext_dir)?;
        self.storage
            .delete_empty_dirs_down(&join(&root, EXTENSIONS_DIR))?;
        self.cache.invalidate(&object_id.to_string());
        Ok(())
    }

    // ---------------------------------------------------------------
    // Reads, existence, purge
    // ---------------------------------------------------------------

    /// Open a content path of an object for reading.
    pub fn read_content(
        &self,
        inventory: &Inventory,
        content_path: &str,
    ) -> Result<Box<dyn Read + Send>> {
        let root = self.object_root(&inventory.id);
        Ok(self.storage.read(&join(&root, content_path))?)
    }

    pub fn contains_object(&self, object_id: &str) -> Result<bool> {
        let root = self.object_root(object_id);
        Ok(self.storage.file_exists(&join(&root, OBJECT_NAMASTE_FILE))?)
    }

    /// Erase an object's root directory unconditionally, then clean up any
    /// layout directories left empty.
    pub fn purge_object(&self, object_id: &str) -> Result<()> {
        let root = self.object_root(object_id);
        info!(object_id, %root, "purging object");
        self.storage.delete_directory(&root)?;
        if let Some((parent, _)) = root.rsplit_once('/') {
            self.storage.delete_empty_dirs_up(parent)?;
        }
        self.cache.invalidate(&object_id.to_string());
        Ok(())
    }

    /// The ids of every object in the repository, by walking object roots.
    pub fn list_object_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for root in self.storage.iterate_objects()? {
            let root = root?;
            let mut bytes = Vec::new();
            self.storage
                .read(&join(&root, INVENTORY_FILE))?
                .read_to_end(&mut bytes)
                .map_err(|e| OcflError::StorageIO(Box::new(e)))?;
            let inventory = self.mapper.read(&mut bytes.as_slice())?;
            ids.push(inventory.id);
        }
        Ok(ids)
    }

    pub fn invalidate_cache(&self, object_id: &str) {
        self.cache.invalidate(&object_id.to_string());
    }
}

impl std::fmt::Debug for RepoStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoStore")
            .field("layout", &self.layout.extension_name())
            .finish()
    }
}
