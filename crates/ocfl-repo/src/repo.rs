use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ocfl_digest::{digest_file, unwrap_fixity_error, FixityReader};
use ocfl_inventory::{
    Inventory, InventoryMapper, InventoryUpdater, SerdeInventoryMapper,
};
use ocfl_storage::{HashedNTupleLayout, Storage, StorageLayout};
use ocfl_types::spec::MUTABLE_HEAD_DIR;
use ocfl_types::{ObjectVersionId, VersionInfo, VersionNum};
use tracing::debug;
use walkdir::WalkDir;

/// A readable stream that can also be `Debug`-printed, used as the return
/// type of [`Repo::read_file`] so error results are `unwrap_err`-able.
pub trait ReadDebug: Read + std::fmt::Debug {}
impl<T: Read + std::fmt::Debug> ReadDebug for T {}

use crate::add_file::AddFileProcessor;
use crate::cache::{Cache, NoOpCache};
use crate::clock::{Clock, SystemClock};
use crate::config::OcflConfig;
use crate::details::{FileDetails, ObjectDetails, VersionDetails};
use crate::error::{OcflError, Result};
use crate::lock::LockTable;
use crate::paths::{ContentPathConstraints, DirectLogicalPathMapper, LogicalPathMapper};
use crate::staging::{StagingDir, StagingManager};
use crate::store::RepoStore;
use crate::update::{ObjectUpdater, UpdateOptions};

/// An OCFL repository over a storage backend.
///
/// Cheap to clone; clones share the same lock table, cache, and backend.
/// Thread-safe: updates to different objects run concurrently, updates to
/// the same object serialize on its write lock.
#[derive(Clone)]
pub struct Repository {
    pub(crate) inner: Arc<RepoInner>,
}

pub(crate) struct RepoInner {
    pub(crate) store: RepoStore,
    pub(crate) staging: StagingManager,
    pub(crate) locks: LockTable,
    pub(crate) config: OcflConfig,
    pub(crate) path_mapper: Arc<dyn LogicalPathMapper>,
    pub(crate) constraints: ContentPathConstraints,
    pub(crate) clock: Arc<dyn Clock>,
    closed: AtomicBool,
}

impl Repository {
    pub fn builder() -> RepositoryBuilder {
        RepositoryBuilder::default()
    }

    /// Stop accepting operations. Idempotent; in-flight operations finish.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(OcflError::Closed)
        } else {
            Ok(())
        }
    }

    pub(crate) fn validate_object_id(object_id: &str) -> Result<()> {
        if object_id.is_empty() {
            return Err(OcflError::InvalidPath {
                path: String::new(),
                reason: "object id must not be empty".into(),
            });
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------

    /// Create or update an object by applying `mutations` on top of the
    /// current HEAD state.
    pub fn update_object(
        &self,
        object_id: &str,
        info: VersionInfo,
        mutations: impl FnOnce(&ObjectUpdater) -> Result<()>,
    ) -> Result<ObjectVersionId> {
        self.ensure_open()?;
        Self::validate_object_id(object_id)?;
        debug!(object_id, "update object");

        self.inner.locks.with_lock(object_id, || {
            let updater = match self.inner.store.load_inventory(object_id)? {
                Some(inv) if inv.has_mutable_head() => {
                    return Err(OcflError::AlreadyExists(format!(
                        "object {object_id} has an uncommitted mutable HEAD; commit or purge it first"
                    )))
                }
                Some(inv) => InventoryUpdater::copy_state(&inv)?,
                None => self.new_object_updater(object_id),
            };
            self.run_update(object_id, info, updater, mutations)
        })
    }

    /// Create or replace an object's state with the contents of a local
    /// file or directory.
    pub fn put_object(
        &self,
        object_id: &str,
        source: &Path,
        info: VersionInfo,
    ) -> Result<ObjectVersionId> {
        self.ensure_open()?;
        Self::validate_object_id(object_id)?;
        debug!(object_id, source = %source.display(), "put object");

        self.inner.locks.with_lock(object_id, || {
            let updater = match self.inner.store.load_inventory(object_id)? {
                Some(inv) if inv.has_mutable_head() => {
                    return Err(OcflError::AlreadyExists(format!(
                        "object {object_id} has an uncommitted mutable HEAD; commit or purge it first"
                    )))
                }
                Some(inv) => InventoryUpdater::blank_state(&inv)?,
                None => self.new_object_updater(object_id),
            };
            self.run_update(object_id, info, updater, |updater| {
                updater.add_path(source, "", UpdateOptions::default())?;
                Ok(())
            })
        })
    }

    /// Erase an object from the repository. Purging a missing object is a
    /// no-op.
    pub fn purge_object(&self, object_id: &str) -> Result<()> {
        self.ensure_open()?;
        Self::validate_object_id(object_id)?;
        self.inner
            .locks
            .with_lock(object_id, || self.inner.store.purge_object(object_id))
    }

    // ---------------------------------------------------------------
    // Reads (no write lock)
    // ---------------------------------------------------------------

    pub fn contains_object(&self, object_id: &str) -> Result<bool> {
        self.ensure_open()?;
        Self::validate_object_id(object_id)?;
        self.inner.store.contains_object(object_id)
    }

    /// Open one file of one version (HEAD when `version` is `None`) for
    /// streaming reads.
    ///
    /// The stream verifies fixity: a consumer that reads to end-of-stream
    /// gets an `InvalidData` error if the stored bytes do not match the
    /// manifest digest.
    pub fn read_file(
        &self,
        object_id: &str,
        version: Option<VersionNum>,
        logical_path: &str,
    ) -> Result<Box<dyn ReadDebug + Send>> {
        self.ensure_open()?;
        Self::validate_object_id(object_id)?;
        let inventory = self.require_inventory(object_id)?;
        let version_num = version.unwrap_or(inventory.head);
        if inventory.version(version_num).is_none() {
            return Err(OcflError::NotFound(format!("{object_id} {version_num}")));
        }
        let digest = inventory
            .digest_for_logical_path(Some(version_num), logical_path)
            .ok_or_else(|| {
                OcflError::NotFound(format!("{object_id} {version_num} {logical_path}"))
            })?;
        let content_path = inventory.content_path(digest).ok_or_else(|| {
            OcflError::CorruptObject {
                object_id: object_id.to_string(),
                reason: format!("digest {digest} has no content path"),
            }
        })?;
        let stream = self.inner.store.read_content(&inventory, content_path)?;
        Ok(Box::new(FixityReader::new(
            stream,
            inventory.digest_algorithm,
            digest.clone(),
        )))
    }

    /// Read one file fully into memory, fixity-checked.
    pub fn read_file_to_vec(
        &self,
        object_id: &str,
        version: Option<VersionNum>,
        logical_path: &str,
    ) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.read_file(object_id, version, logical_path)?
            .read_to_end(&mut out)
            .map_err(|e| OcflError::from(unwrap_fixity_error(e)))?;
        Ok(out)
    }

    /// Every version of an object.
    pub fn describe_object(&self, object_id: &str) -> Result<ObjectDetails> {
        self.ensure_open()?;
        Self::validate_object_id(object_id)?;
        let inventory = self.require_inventory(object_id)?;
        Ok(ObjectDetails::from_inventory(&inventory))
    }

    /// One version of an object (HEAD when `version` is `None`).
    pub fn describe_version(
        &self,
        object_id: &str,
        version: Option<VersionNum>,
    ) -> Result<VersionDetails> {
        self.ensure_open()?;
        Self::validate_object_id(object_id)?;
        let inventory = self.require_inventory(object_id)?;
        let version_num = version.unwrap_or(inventory.head);
        VersionDetails::from_inventory(&inventory, version_num)
            .ok_or_else(|| OcflError::NotFound(format!("{object_id} {version_num}")))
    }

    /// The files of one version (HEAD when `version` is `None`).
    pub fn list_files(
        &self,
        object_id: &str,
        version: Option<VersionNum>,
    ) -> Result<Vec<FileDetails>> {
        Ok(self.describe_version(object_id, version)?.files)
    }

    /// The ids of every object in the repository. Finite snapshot; order
    /// follows the storage walk.
    pub fn list_object_ids(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        self.inner.store.list_object_ids()
    }

    // ---------------------------------------------------------------
    // Internals shared with the mutable-HEAD engine
    // ---------------------------------------------------------------

    pub(crate) fn require_inventory(&self, object_id: &str) -> Result<Inventory> {
        self.inner
            .store
            .load_inventory(object_id)?
            .ok_or_else(|| OcflError::NotFound(object_id.to_string()))
    }

    pub(crate) fn new_object_updater(&self, object_id: &str) -> InventoryUpdater {
        InventoryUpdater::new_object(
            object_id,
            self.inner.config.digest_algorithm,
            self.inner.config.content_directory.clone(),
        )
    }

    /// Stage mutations into a scratch dir, finish the successor inventory,
    /// and install it. The staging dir is deleted on every exit path when
    /// it drops.
    pub(crate) fn run_update(
        &self,
        object_id: &str,
        info: VersionInfo,
        updater: InventoryUpdater,
        mutations: impl FnOnce(&ObjectUpdater) -> Result<()>,
    ) -> Result<ObjectVersionId> {
        let staging = self.inner.staging.create(object_id)?;
        let content_dir = updater.content_directory_name().to_string();

        let (content_prefix, local_content) = match updater.revision() {
            Some(revision) => (
                format!("{MUTABLE_HEAD_DIR}/{content_dir}/{revision}"),
                staging
                    .path()
                    .join(&content_dir)
                    .join(revision.to_string()),
            ),
            None => (
                format!("{}/{content_dir}", updater.head()),
                staging.path().join(&content_dir),
            ),
        };

        let processor = AddFileProcessor::new(
            local_content,
            content_prefix,
            updater.digest_algorithm(),
            Arc::clone(&self.inner.path_mapper),
            self.inner.constraints,
        );
        let updater = ObjectUpdater::new(
            updater,
            processor,
            self.inner.config.file_lock_timeout,
        );

        mutations(&updater)?;

        let created = info.created.unwrap_or_else(|| self.inner.clock.now());
        let inventory = updater.finalize(info, created)?;
        self.write_new_version(&inventory, &staging)?;
        Ok(ObjectVersionId::version(object_id, inventory.head))
    }

    /// Serialize the inventory into staging, verify the staged content,
    /// and hand the version to the storage layer.
    pub(crate) fn write_new_version(
        &self,
        inventory: &Inventory,
        staging: &StagingDir,
    ) -> Result<()> {
        prune_empty_dirs(staging.path())?;
        self.inner
            .store
            .write_inventory_to_staging(inventory, staging.path())?;
        if self.inner.config.verify_staging {
            self.verify_staging(inventory, staging.path())?;
        }
        self.inner.store.store_new_version(inventory, staging.path())
    }

    /// Re-digest every content file this version introduces and compare
    /// against the manifest.
    fn verify_staging(&self, inventory: &Inventory, staging: &Path) -> Result<()> {
        let strip_prefix = if inventory.has_mutable_head() {
            format!("{MUTABLE_HEAD_DIR}/")
        } else {
            format!("{}/", inventory.head)
        };

        for (digest, content_paths) in &inventory.manifest {
            for content_path in content_paths {
                let Some(rest) = content_path.strip_prefix(&strip_prefix) else {
                    continue;
                };
                let local = staging.join(rest);
                if !local.is_file() {
                    // Content of earlier mutable revisions is already on
                    // storage, not in this staging dir.
                    if inventory.has_mutable_head() {
                        continue;
                    }
                    return Err(OcflError::CorruptObject {
                        object_id: inventory.id.clone(),
                        reason: format!("staged content missing: {content_path}"),
                    });
                }
                let actual = digest_file(inventory.digest_algorithm, &local)?;
                if &actual != digest {
                    return Err(OcflError::FixityMismatch(format!(
                        "staged {content_path}: expected {digest}, got {actual}"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Remove empty directories under `staging`, the staged `content/` dir
/// included: a version with no content must not install a content dir.
fn prune_empty_dirs(staging: &Path) -> Result<()> {
    for entry in WalkDir::new(staging).min_depth(1).contents_first(true) {
        let entry = entry.map_err(|e| {
            OcflError::StorageIO(Box::new(std::io::Error::from(e)))
        })?;
        if entry.file_type().is_dir() {
            // Fails on non-empty dirs, which is exactly the filter needed.
            let _ = std::fs::remove_dir(entry.path());
        }
    }
    Ok(())
}

/// Assembles a [`Repository`] from a storage backend plus optional
/// collaborators; everything but `storage` and `work_dir` has a default.
pub struct RepositoryBuilder {
    storage: Option<Arc<dyn Storage>>,
    layout: Arc<dyn StorageLayout>,
    inventory_mapper: Arc<dyn InventoryMapper>,
    cache: Arc<dyn Cache<String, Inventory>>,
    path_mapper: Arc<dyn LogicalPathMapper>,
    constraints: ContentPathConstraints,
    clock: Arc<dyn Clock>,
    work_dir: Option<PathBuf>,
    config: OcflConfig,
}

impl Default for RepositoryBuilder {
    fn default() -> Self {
        Self {
            storage: None,
            layout: Arc::new(HashedNTupleLayout::default()),
            inventory_mapper: Arc::new(SerdeInventoryMapper),
            cache: Arc::new(NoOpCache),
            path_mapper: Arc::new(DirectLogicalPathMapper),
            constraints: ContentPathConstraints::None,
            clock: Arc::new(SystemClock),
            work_dir: None,
            config: OcflConfig::default(),
        }
    }
}

impl RepositoryBuilder {
    pub fn storage(mut self, storage: impl Storage + 'static) -> Self {
        self.storage = Some(Arc::new(storage));
        self
    }

    pub fn storage_arc(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn layout(mut self, layout: impl StorageLayout + 'static) -> Self {
        self.layout = Arc::new(layout);
        self
    }

    pub fn inventory_mapper(mut self, mapper: impl InventoryMapper + 'static) -> Self {
        self.inventory_mapper = Arc::new(mapper);
        self
    }

    pub fn inventory_cache(mut self, cache: impl Cache<String, Inventory> + 'static) -> Self {
        self.cache = Arc::new(cache);
        self
    }

    pub fn logical_path_mapper(mut self, mapper: impl LogicalPathMapper + 'static) -> Self {
        self.path_mapper = Arc::new(mapper);
        self
    }

    pub fn content_path_constraints(mut self, constraints: ContentPathConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn clock_arc(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Scratch directory for staging; must not sit inside an object root.
    pub fn work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(work_dir.into());
        self
    }

    pub fn config(mut self, config: OcflConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Repository> {
        let storage = self
            .storage
            .ok_or_else(|| OcflError::Config("a storage backend is required".into()))?;
        let work_dir = self
            .work_dir
            .ok_or_else(|| OcflError::Config("a work dir is required".into()))?;
        self.config.validate()?;

        let store = RepoStore::new(
            storage,
            self.layout,
            self.inventory_mapper,
            self.cache,
        );
        store.init_root()?;

        Ok(Repository {
            inner: Arc::new(RepoInner {
                store,
                staging: StagingManager::new(work_dir)?,
                locks: LockTable::new(self.config.object_lock_timeout),
                config: self.config,
                path_mapper: self.path_mapper,
                constraints: self.constraints,
                clock: self.clock,
                closed: AtomicBool::new(false),
            }),
        })
    }
}

impl std::fmt::Debug for RepositoryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryBuilder")
            .field("has_storage", &self.storage.is_some())
            .field("work_dir", &self.work_dir)
            .finish()
    }
}
