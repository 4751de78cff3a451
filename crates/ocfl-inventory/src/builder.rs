use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use ocfl_types::spec::INVENTORY_TYPE;
use ocfl_types::{DigestAlgorithm, HexDigest, RevisionNum, VersionInfo, VersionNum};

use crate::error::{InventoryError, InventoryResult};
use crate::inventory::{FixityBlock, Inventory};
use crate::version::Version;

/// Copy-on-write construction of a successor inventory.
///
/// A builder is seeded from the predecessor inventory (or from nothing for
/// a new object) and accumulates manifest and fixity additions while the
/// updater assembles the new version's state. [`InventoryBuilder::build`]
/// garbage-collects manifest entries no version references any longer,
/// enforces timestamp monotonicity, and validates the result.
pub struct InventoryBuilder {
    id: String,
    digest_algorithm: DigestAlgorithm,
    content_directory: Option<String>,
    /// The version number being built.
    head: VersionNum,
    /// Completed versions carried over from the predecessor.
    versions: BTreeMap<VersionNum, Version>,
    manifest: BTreeMap<HexDigest, BTreeSet<String>>,
    fixity: FixityBlock,
    mutable_head: bool,
    revision: Option<RevisionNum>,
}

impl InventoryBuilder {
    /// Builder for the first version of a new object.
    pub fn new_object(
        id: impl Into<String>,
        digest_algorithm: DigestAlgorithm,
        content_directory: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            digest_algorithm,
            content_directory,
            head: VersionNum::V1,
            versions: BTreeMap::new(),
            manifest: BTreeMap::new(),
            fixity: BTreeMap::new(),
            mutable_head: false,
            revision: None,
        }
    }

    /// Builder for the immutable successor of an existing inventory.
    pub fn from_previous(inventory: &Inventory) -> InventoryResult<Self> {
        Ok(Self {
            id: inventory.id.clone(),
            digest_algorithm: inventory.digest_algorithm,
            content_directory: inventory.content_directory.clone(),
            head: inventory.head.next()?,
            versions: inventory.versions.clone(),
            manifest: inventory.manifest.clone(),
            fixity: inventory.fixity.clone().unwrap_or_default(),
            mutable_head: false,
            revision: None,
        })
    }

    /// Builder for the next mutable-HEAD revision.
    ///
    /// On an inventory without a mutable HEAD this reserves the next
    /// version number and revision `r1`. On an inventory that already has
    /// one, the head version is *replaced* and the revision increments;
    /// manifest entries from earlier revisions are retained.
    pub fn mutable_overlay(inventory: &Inventory) -> InventoryResult<Self> {
        let (head, versions, revision) = if inventory.has_mutable_head() {
            let mut versions = inventory.versions.clone();
            versions.remove(&inventory.head);
            (
                inventory.head,
                versions,
                inventory.next_revision_num(),
            )
        } else {
            (
                inventory.head.next()?,
                inventory.versions.clone(),
                RevisionNum::R1,
            )
        };
        Ok(Self {
            id: inventory.id.clone(),
            digest_algorithm: inventory.digest_algorithm,
            content_directory: inventory.content_directory.clone(),
            head,
            versions,
            manifest: inventory.manifest.clone(),
            fixity: inventory.fixity.clone().unwrap_or_default(),
            mutable_head: true,
            revision: Some(revision),
        })
    }

    pub fn head(&self) -> VersionNum {
        self.head
    }

    pub fn revision(&self) -> Option<RevisionNum> {
        self.revision
    }

    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest_algorithm
    }

    pub fn content_directory_name(&self) -> &str {
        self.content_directory
            .as_deref()
            .unwrap_or(ocfl_types::spec::DEFAULT_CONTENT_DIR)
    }

    /// A prior version carried over from the predecessor.
    pub fn version(&self, num: VersionNum) -> Option<&Version> {
        self.versions.get(&num)
    }

    pub fn contains_digest(&self, digest: &HexDigest) -> bool {
        self.manifest.contains_key(digest)
    }

    /// The first manifest content path for a digest.
    pub fn content_path(&self, digest: &HexDigest) -> Option<&String> {
        self.manifest.get(digest)?.iter().next()
    }

    pub fn add_manifest_entry(&mut self, digest: HexDigest, content_path: String) {
        self.manifest.entry(digest).or_default().insert(content_path);
    }

    /// Remove a digest from the manifest entirely.
    pub fn remove_manifest_digest(&mut self, digest: &HexDigest) {
        self.manifest.remove(digest);
    }

    pub fn add_fixity(
        &mut self,
        algorithm: DigestAlgorithm,
        digest: HexDigest,
        content_path: String,
    ) {
        self.fixity
            .entry(algorithm)
            .or_default()
            .entry(digest)
            .or_default()
            .insert(content_path);
    }

    /// Finish the successor inventory around the given state.
    pub fn build(
        mut self,
        state: BTreeMap<HexDigest, BTreeSet<String>>,
        info: VersionInfo,
        created: DateTime<Utc>,
    ) -> InventoryResult<Inventory> {
        if let Some((_, last)) = self.versions.iter().next_back() {
            if created < last.created {
                return Err(InventoryError::NonMonotonicTimestamp {
                    previous: last.created,
                    next: created,
                });
            }
        }

        let mut versions = self.versions;
        versions.insert(self.head, Version::new(created, info, state));

        // Garbage-collect manifest entries: a digest no version's state
        // references is dropped unless a fixity block pins one of its
        // content paths.
        let referenced: BTreeSet<&HexDigest> =
            versions.values().flat_map(|v| v.state.keys()).collect();
        let pinned: BTreeSet<&String> = self.fixity.values().flatten().flat_map(|(_, p)| p).collect();
        let orphans: Vec<HexDigest> = self
            .manifest
            .iter()
            .filter(|(digest, paths)| {
                !referenced.contains(digest) && paths.iter().all(|p| !pinned.contains(p))
            })
            .map(|(digest, _)| digest.clone())
            .collect();
        for digest in &orphans {
            self.manifest.remove(digest);
        }

        // Drop fixity entries whose content paths left the manifest.
        let manifest_paths: BTreeSet<String> =
            self.manifest.values().flatten().cloned().collect();
        for digests in self.fixity.values_mut() {
            digests.retain(|_, paths| {
                paths.retain(|p| manifest_paths.contains(p));
                !paths.is_empty()
            });
        }
        self.fixity.retain(|_, digests| !digests.is_empty());

        let inventory = Inventory {
            id: self.id,
            type_uri: INVENTORY_TYPE.into(),
            digest_algorithm: self.digest_algorithm,
            head: self.head,
            content_directory: self.content_directory,
            fixity: (!self.fixity.is_empty()).then_some(self.fixity),
            manifest: self.manifest,
            versions,
            mutable_head: self.mutable_head,
            revision: self.revision,
        };
        inventory.validate()?;
        Ok(inventory)
    }
}
