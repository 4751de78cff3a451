use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use ocfl_types::{DigestAlgorithm, HexDigest, RevisionNum, VersionInfo, VersionNum};

use crate::builder::InventoryBuilder;
use crate::error::{InventoryError, InventoryResult};
use crate::inventory::Inventory;

/// What `add_file` decided to do with the incoming content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddDecision {
    /// The digest is new; the content path was entered into the manifest
    /// and the staged bytes must be kept.
    New { content_path: String },
    /// The digest is already in the manifest; the staged bytes are
    /// redundant and must be discarded.
    Deduplicated { existing_path: String },
}

/// The result of a state mutation: the decision plus any staged content
/// paths that became garbage (e.g. an overwritten same-version file).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddOutcome {
    pub decision: AddDecision,
    pub garbage: Vec<String>,
}

/// Applies logical mutations to a working successor state.
///
/// The updater owns the successor's state map and the builder accumulating
/// manifest changes. Content staged during this update is tracked so that
/// removing or overwriting a file added moments earlier also reclaims its
/// staged bytes.
pub struct InventoryUpdater {
    builder: InventoryBuilder,
    state: BTreeMap<HexDigest, BTreeSet<String>>,
    /// Digest -> content path for content first staged in this update.
    staged: BTreeMap<HexDigest, String>,
}

impl InventoryUpdater {
    /// Updater for the first version of a new object.
    pub fn new_object(
        id: impl Into<String>,
        digest_algorithm: DigestAlgorithm,
        content_directory: Option<String>,
    ) -> Self {
        Self {
            builder: InventoryBuilder::new_object(id, digest_algorithm, content_directory),
            state: BTreeMap::new(),
            staged: BTreeMap::new(),
        }
    }

    /// Successor whose initial state is empty; used when the new version
    /// fully replaces the old state.
    pub fn blank_state(inventory: &Inventory) -> InventoryResult<Self> {
        Ok(Self {
            builder: InventoryBuilder::from_previous(inventory)?,
            state: BTreeMap::new(),
            staged: BTreeMap::new(),
        })
    }

    /// Successor whose initial state is a copy of HEAD's state.
    pub fn copy_state(inventory: &Inventory) -> InventoryResult<Self> {
        Ok(Self {
            builder: InventoryBuilder::from_previous(inventory)?,
            state: Self::head_state(inventory),
            staged: BTreeMap::new(),
        })
    }

    /// Like [`copy_state`](Self::copy_state), but reserving the next
    /// mutable-HEAD revision instead of sealing an immutable version.
    pub fn copy_state_mutable(inventory: &Inventory) -> InventoryResult<Self> {
        Ok(Self {
            builder: InventoryBuilder::mutable_overlay(inventory)?,
            state: Self::head_state(inventory),
            staged: BTreeMap::new(),
        })
    }

    fn head_state(inventory: &Inventory) -> BTreeMap<HexDigest, BTreeSet<String>> {
        inventory
            .head_version()
            .map(|v| v.state.clone())
            .unwrap_or_default()
    }

    /// The version number being built.
    pub fn head(&self) -> VersionNum {
        self.builder.head()
    }

    /// The mutable-HEAD revision being built, when in mutable mode.
    pub fn revision(&self) -> Option<RevisionNum> {
        self.builder.revision()
    }

    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.builder.digest_algorithm()
    }

    pub fn content_directory_name(&self) -> &str {
        self.builder.content_directory_name()
    }

    pub fn contains_digest(&self, digest: &HexDigest) -> bool {
        self.builder.contains_digest(digest)
    }

    /// The digest currently bound to a logical path in the working state.
    pub fn digest_for_path(&self, logical_path: &str) -> Option<&HexDigest> {
        self.state
            .iter()
            .find(|(_, paths)| paths.contains(logical_path))
            .map(|(digest, _)| digest)
    }

    /// Bind `logical_path` to content with the given digest.
    ///
    /// When the digest is not yet in the manifest, `content_path` is
    /// entered and the staged bytes must be kept; otherwise the existing
    /// content path wins and the staged bytes are discarded.
    pub fn add_file(
        &mut self,
        digest: HexDigest,
        logical_path: &str,
        content_path: String,
        overwrite: bool,
    ) -> InventoryResult<AddOutcome> {
        let garbage = self.prepare_binding(logical_path, overwrite)?;

        let decision = match self.builder.content_path(&digest).cloned() {
            Some(existing_path) => AddDecision::Deduplicated { existing_path },
            None => {
                self.builder
                    .add_manifest_entry(digest.clone(), content_path.clone());
                self.staged.insert(digest.clone(), content_path.clone());
                AddDecision::New { content_path }
            }
        };

        self.state
            .entry(digest)
            .or_default()
            .insert(logical_path.to_string());
        Ok(AddOutcome { decision, garbage })
    }

    /// Remove a logical path from the working state. Removing a path that
    /// does not exist is a no-op. Returns staged content paths that became
    /// garbage.
    pub fn remove_file(&mut self, logical_path: &str) -> Vec<String> {
        self.unbind(logical_path)
    }

    /// Rebind the content at `src` to `dst`. No content path is created.
    pub fn rename_file(
        &mut self,
        src: &str,
        dst: &str,
        overwrite: bool,
    ) -> InventoryResult<Vec<String>> {
        let digest = self
            .digest_for_path(src)
            .cloned()
            .ok_or_else(|| InventoryError::FileNotFound(src.to_string()))?;
        // Moving a path onto itself would otherwise unbind it below.
        if src == dst {
            return Ok(Vec::new());
        }
        let garbage = self.prepare_binding(dst, overwrite)?;
        if let Some(paths) = self.state.get_mut(&digest) {
            paths.remove(src);
        }
        self.state
            .entry(digest)
            .or_default()
            .insert(dst.to_string());
        Ok(garbage)
    }

    /// Bind `dst` to the content `src_path` had in `src_version`.
    pub fn reinstate_file(
        &mut self,
        src_version: VersionNum,
        src_path: &str,
        dst: &str,
        overwrite: bool,
    ) -> InventoryResult<Vec<String>> {
        let digest = self
            .builder
            .version(src_version)
            .ok_or(InventoryError::VersionNotFound(src_version))?
            .digest_for_path(src_path)
            .cloned()
            .ok_or_else(|| InventoryError::FileNotFound(src_path.to_string()))?;
        let garbage = self.prepare_binding(dst, overwrite)?;
        self.state
            .entry(digest)
            .or_default()
            .insert(dst.to_string());
        Ok(garbage)
    }

    /// Record an alternate-algorithm digest for the content at a logical
    /// path. Supplying the primary algorithm is a cross-check, not a fixity
    /// entry.
    pub fn add_fixity(
        &mut self,
        logical_path: &str,
        algorithm: DigestAlgorithm,
        value: HexDigest,
    ) -> InventoryResult<()> {
        let digest = self
            .digest_for_path(logical_path)
            .cloned()
            .ok_or_else(|| InventoryError::FileNotFound(logical_path.to_string()))?;

        if algorithm == self.builder.digest_algorithm() {
            if value != digest {
                return Err(InventoryError::Invalid {
                    object_id: String::new(),
                    reason: format!(
                        "fixity digest for {logical_path} does not match its {algorithm} digest"
                    ),
                });
            }
            return Ok(());
        }

        value.validate_for(algorithm)?;
        let content_path = self
            .builder
            .content_path(&digest)
            .cloned()
            .ok_or_else(|| InventoryError::FileNotFound(logical_path.to_string()))?;
        self.builder.add_fixity(algorithm, value, content_path);
        Ok(())
    }

    /// Finish the successor inventory.
    pub fn into_inventory(
        self,
        info: VersionInfo,
        created: DateTime<Utc>,
    ) -> InventoryResult<Inventory> {
        self.builder.build(self.state, info, created)
    }

    /// Clear the way for binding `logical_path`: error on conflicts, unbind
    /// an exact match when overwriting.
    fn prepare_binding(
        &mut self,
        logical_path: &str,
        overwrite: bool,
    ) -> InventoryResult<Vec<String>> {
        if let Some(conflict) = self.tree_conflict(logical_path) {
            return Err(InventoryError::PathConflict {
                path: logical_path.to_string(),
                existing: conflict,
            });
        }
        if self.digest_for_path(logical_path).is_some() {
            if !overwrite {
                return Err(InventoryError::PathAlreadyExists(logical_path.to_string()));
            }
            return Ok(self.unbind(logical_path));
        }
        Ok(Vec::new())
    }

    /// An existing path that would make `logical_path` both a file and a
    /// directory.
    fn tree_conflict(&self, logical_path: &str) -> Option<String> {
        let as_dir = format!("{logical_path}/");
        self.state
            .values()
            .flatten()
            .find(|existing| {
                existing.starts_with(&as_dir) || logical_path.starts_with(&format!("{existing}/"))
            })
            .cloned()
    }

    fn unbind(&mut self, logical_path: &str) -> Vec<String> {
        let Some(digest) = self.digest_for_path(logical_path).cloned() else {
            return Vec::new();
        };
        if let Some(paths) = self.state.get_mut(&digest) {
            paths.remove(logical_path);
            if paths.is_empty() {
                self.state.remove(&digest);
            }
        }
        // Content first staged in this update and no longer referenced can
        // be reclaimed from staging; committed content stays put.
        if !self.state.contains_key(&digest) {
            if let Some(content_path) = self.staged.remove(&digest) {
                self.builder.remove_manifest_digest(&digest);
                return vec![content_path];
            }
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn digest(byte: u8) -> HexDigest {
        HexDigest::new(format!("{:0128x}", byte))
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap()
    }

    fn v1_inventory() -> Inventory {
        let mut updater = InventoryUpdater::new_object("o1", DigestAlgorithm::Sha512, None);
        updater
            .add_file(digest(1), "a.txt", "v1/content/a.txt".into(), false)
            .unwrap();
        updater
            .add_file(digest(2), "dir/b.txt", "v1/content/dir/b.txt".into(), false)
            .unwrap();
        updater.into_inventory(VersionInfo::new(), at(1)).unwrap()
    }

    #[test]
    fn add_file_new_digest_enters_manifest() {
        let mut updater = InventoryUpdater::new_object("o1", DigestAlgorithm::Sha512, None);
        let outcome = updater
            .add_file(digest(1), "f.txt", "v1/content/f.txt".into(), false)
            .unwrap();
        assert_eq!(
            outcome.decision,
            AddDecision::New {
                content_path: "v1/content/f.txt".into()
            }
        );
        assert!(outcome.garbage.is_empty());
    }

    #[test]
    fn add_file_dedups_against_manifest() {
        let inv = v1_inventory();
        let mut updater = InventoryUpdater::copy_state(&inv).unwrap();
        let outcome = updater
            .add_file(digest(1), "another.txt", "v2/content/another.txt".into(), false)
            .unwrap();
        assert_eq!(
            outcome.decision,
            AddDecision::Deduplicated {
                existing_path: "v1/content/a.txt".into()
            }
        );
        let v2 = updater.into_inventory(VersionInfo::new(), at(2)).unwrap();
        // Single content path backs both logical paths.
        assert_eq!(v2.manifest.get(&digest(1)).unwrap().len(), 1);
        assert_eq!(
            v2.head_version().unwrap().state.get(&digest(1)).unwrap().len(),
            2
        );
    }

    #[test]
    fn add_file_dedups_within_one_version() {
        let mut updater = InventoryUpdater::new_object("o1", DigestAlgorithm::Sha512, None);
        updater
            .add_file(digest(1), "p1", "v1/content/p1".into(), false)
            .unwrap();
        let outcome = updater
            .add_file(digest(1), "p2", "v1/content/p2".into(), false)
            .unwrap();
        assert_eq!(
            outcome.decision,
            AddDecision::Deduplicated {
                existing_path: "v1/content/p1".into()
            }
        );
    }

    #[test]
    fn add_existing_path_requires_overwrite() {
        let inv = v1_inventory();
        let mut updater = InventoryUpdater::copy_state(&inv).unwrap();
        let err = updater
            .add_file(digest(3), "a.txt", "v2/content/a.txt".into(), false)
            .unwrap_err();
        assert!(matches!(err, InventoryError::PathAlreadyExists(_)));

        let outcome = updater
            .add_file(digest(3), "a.txt", "v2/content/a.txt".into(), true)
            .unwrap();
        assert!(matches!(outcome.decision, AddDecision::New { .. }));
    }

    #[test]
    fn overwriting_freshly_staged_content_reclaims_it() {
        let mut updater = InventoryUpdater::new_object("o1", DigestAlgorithm::Sha512, None);
        updater
            .add_file(digest(1), "f", "v1/content/f".into(), false)
            .unwrap();
        let outcome = updater
            .add_file(digest(2), "f", "v1/content/f".into(), true)
            .unwrap();
        assert_eq!(outcome.garbage, vec!["v1/content/f".to_string()]);
        let inv = updater.into_inventory(VersionInfo::new(), at(1)).unwrap();
        assert!(!inv.contains_digest(&digest(1)));
    }

    #[test]
    fn tree_conflicts_are_rejected() {
        let inv = v1_inventory();
        let mut updater = InventoryUpdater::copy_state(&inv).unwrap();
        let err = updater
            .add_file(digest(3), "dir/b.txt/nested", "v2/content/x".into(), false)
            .unwrap_err();
        assert!(matches!(err, InventoryError::PathConflict { .. }));
        let err = updater
            .add_file(digest(3), "dir", "v2/content/dir".into(), false)
            .unwrap_err();
        assert!(matches!(err, InventoryError::PathConflict { .. }));
    }

    #[test]
    fn remove_file_is_noop_on_missing_path() {
        let inv = v1_inventory();
        let mut updater = InventoryUpdater::copy_state(&inv).unwrap();
        assert!(updater.remove_file("missing").is_empty());
    }

    #[test]
    fn remove_of_committed_content_keeps_manifest() {
        let inv = v1_inventory();
        let mut updater = InventoryUpdater::copy_state(&inv).unwrap();
        assert!(updater.remove_file("a.txt").is_empty());
        let v2 = updater.into_inventory(VersionInfo::new(), at(2)).unwrap();
        // v1 still references the digest, so it survives collection.
        assert!(v2.contains_digest(&digest(1)));
        assert!(!v2.head_version().unwrap().contains_path("a.txt"));
    }

    #[test]
    fn remove_of_staged_content_reclaims_it() {
        let mut updater = InventoryUpdater::new_object("o1", DigestAlgorithm::Sha512, None);
        updater
            .add_file(digest(1), "f", "v1/content/f".into(), false)
            .unwrap();
        let garbage = updater.remove_file("f");
        assert_eq!(garbage, vec!["v1/content/f".to_string()]);
        let inv = updater.into_inventory(VersionInfo::new(), at(1)).unwrap();
        assert!(inv.manifest.is_empty());
    }

    #[test]
    fn rename_rebinds_without_new_content() {
        let inv = v1_inventory();
        let mut updater = InventoryUpdater::copy_state(&inv).unwrap();
        updater.rename_file("a.txt", "renamed.txt", false).unwrap();
        let v2 = updater.into_inventory(VersionInfo::new(), at(2)).unwrap();
        let head = v2.head_version().unwrap();
        assert!(head.contains_path("renamed.txt"));
        assert!(!head.contains_path("a.txt"));
        assert_eq!(
            v2.manifest.get(&digest(1)).unwrap().iter().next().unwrap(),
            "v1/content/a.txt"
        );
    }

    #[test]
    fn rename_missing_source_fails() {
        let inv = v1_inventory();
        let mut updater = InventoryUpdater::copy_state(&inv).unwrap();
        assert!(matches!(
            updater.rename_file("missing", "x", false),
            Err(InventoryError::FileNotFound(_))
        ));
    }

    #[test]
    fn rename_onto_itself_is_noop() {
        let inv = v1_inventory();
        let mut updater = InventoryUpdater::copy_state(&inv).unwrap();
        updater.rename_file("a.txt", "a.txt", true).unwrap();
        assert!(updater.digest_for_path("a.txt").is_some());
    }

    #[test]
    fn reinstate_pulls_from_prior_version() {
        let inv = v1_inventory();
        let mut updater = InventoryUpdater::copy_state(&inv).unwrap();
        updater.remove_file("a.txt");
        let v2 = updater.into_inventory(VersionInfo::new(), at(2)).unwrap();

        let mut updater = InventoryUpdater::copy_state(&v2).unwrap();
        updater
            .reinstate_file(VersionNum::V1, "a.txt", "restored.txt", false)
            .unwrap();
        let v3 = updater.into_inventory(VersionInfo::new(), at(3)).unwrap();
        assert_eq!(
            v3.head_version().unwrap().digest_for_path("restored.txt"),
            Some(&digest(1))
        );
    }

    #[test]
    fn reinstate_unknown_version_fails() {
        let inv = v1_inventory();
        let mut updater = InventoryUpdater::copy_state(&inv).unwrap();
        assert!(matches!(
            updater.reinstate_file("v9".parse().unwrap(), "a.txt", "x", false),
            Err(InventoryError::VersionNotFound(_))
        ));
    }

    #[test]
    fn add_fixity_records_alternate_digest() {
        let inv = v1_inventory();
        let mut updater = InventoryUpdater::copy_state(&inv).unwrap();
        let md5 = HexDigest::new(format!("{:032x}", 5));
        updater
            .add_fixity("a.txt", DigestAlgorithm::Md5, md5.clone())
            .unwrap();
        let v2 = updater.into_inventory(VersionInfo::new(), at(2)).unwrap();
        let fixity = v2.fixity.as_ref().unwrap();
        assert!(fixity[&DigestAlgorithm::Md5][&md5].contains("v1/content/a.txt"));
    }

    #[test]
    fn add_fixity_primary_algorithm_cross_checks() {
        let inv = v1_inventory();
        let mut updater = InventoryUpdater::copy_state(&inv).unwrap();
        updater
            .add_fixity("a.txt", DigestAlgorithm::Sha512, digest(1))
            .unwrap();
        assert!(updater
            .add_fixity("a.txt", DigestAlgorithm::Sha512, digest(9))
            .is_err());
    }

    #[test]
    fn blank_state_starts_empty() {
        let inv = v1_inventory();
        let updater = InventoryUpdater::blank_state(&inv).unwrap();
        assert!(updater.digest_for_path("a.txt").is_none());
    }

    #[test]
    fn copy_state_mutable_reserves_revision() {
        let inv = v1_inventory();
        let updater = InventoryUpdater::copy_state_mutable(&inv).unwrap();
        assert_eq!(updater.revision(), Some(RevisionNum::R1));
        assert_eq!(updater.head(), "v2".parse().unwrap());
        assert!(updater.digest_for_path("a.txt").is_some());
    }
}
