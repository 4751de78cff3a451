use std::collections::{BTreeMap, BTreeSet};

use ocfl_types::spec::{DEFAULT_CONTENT_DIR, INVENTORY_TYPE, MUTABLE_HEAD_DIR};
use ocfl_types::{DigestAlgorithm, HexDigest, RevisionNum, VersionNum};
use serde::{Deserialize, Serialize};

use crate::error::{InventoryError, InventoryResult};
use crate::version::Version;

/// Fixity block: alternate-algorithm digests keyed by digest then content
/// path.
pub type FixityBlock = BTreeMap<DigestAlgorithm, BTreeMap<HexDigest, BTreeSet<String>>>;

/// The complete in-memory state of one object.
///
/// Field order matches the conventional key order of OCFL inventory JSON;
/// all maps are `BTreeMap`s so serialization is deterministic and the
/// inventory digest is reproducible.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    pub id: String,
    #[serde(rename = "type")]
    pub type_uri: String,
    pub digest_algorithm: DigestAlgorithm,
    pub head: VersionNum,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_directory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixity: Option<FixityBlock>,
    pub manifest: BTreeMap<HexDigest, BTreeSet<String>>,
    pub versions: BTreeMap<VersionNum, Version>,

    /// True when this inventory describes a mutable HEAD overlay. Never
    /// serialized; set by the storage layer based on where the inventory
    /// was loaded from.
    #[serde(skip)]
    pub mutable_head: bool,
    /// The current mutable-HEAD revision, when one exists.
    #[serde(skip)]
    pub revision: Option<RevisionNum>,
}

impl Inventory {
    /// The version content directory name, defaulting to `content`.
    pub fn content_directory_name(&self) -> &str {
        self.content_directory
            .as_deref()
            .unwrap_or(DEFAULT_CONTENT_DIR)
    }

    pub fn version(&self, num: VersionNum) -> Option<&Version> {
        self.versions.get(&num)
    }

    /// The HEAD version record. `None` only on malformed inventories.
    pub fn head_version(&self) -> Option<&Version> {
        self.versions.get(&self.head)
    }

    /// The digest a logical path is bound to in the given version (HEAD
    /// when `None`).
    pub fn digest_for_logical_path(
        &self,
        version: Option<VersionNum>,
        logical_path: &str,
    ) -> Option<&HexDigest> {
        self.version(version.unwrap_or(self.head))?
            .digest_for_path(logical_path)
    }

    /// The first manifest content path recorded for a digest.
    pub fn content_path(&self, digest: &HexDigest) -> Option<&String> {
        self.manifest.get(digest)?.iter().next()
    }

    pub fn contains_digest(&self, digest: &HexDigest) -> bool {
        self.manifest.contains_key(digest)
    }

    pub fn has_mutable_head(&self) -> bool {
        self.mutable_head
    }

    /// The next version number, preserving padding width.
    pub fn next_version_num(&self) -> InventoryResult<VersionNum> {
        Ok(self.head.next()?)
    }

    /// The next mutable-HEAD revision number.
    pub fn next_revision_num(&self) -> RevisionNum {
        self.revision
            .map(|r| r.next())
            .unwrap_or(RevisionNum::R1)
    }

    /// Validate every structural invariant an inventory must satisfy before
    /// it may be written to storage.
    pub fn validate(&self) -> InventoryResult<()> {
        if self.id.is_empty() {
            return self.invalid("object id is empty");
        }
        if self.type_uri != INVENTORY_TYPE {
            return self.invalid(format!("unsupported inventory type: {}", self.type_uri));
        }
        if !self.digest_algorithm.is_primary() {
            return self.invalid(format!(
                "digest algorithm {} may not anchor an inventory",
                self.digest_algorithm
            ));
        }

        self.validate_version_sequence()?;
        self.validate_manifest()?;
        self.validate_states()?;
        self.validate_fixity()?;
        Ok(())
    }

    fn validate_version_sequence(&self) -> InventoryResult<()> {
        if self.versions.len() as u64 != self.head.num() {
            return self.invalid(format!(
                "expected {} versions up to {}, found {}",
                self.head.num(),
                self.head,
                self.versions.len()
            ));
        }
        for n in 1..=self.head.num() {
            let num = VersionNum::with_width(n, self.head.width())?;
            if !self.versions.contains_key(&num) {
                return self.invalid(format!("missing version {num}"));
            }
        }
        Ok(())
    }

    fn validate_manifest(&self) -> InventoryResult<()> {
        let mut seen_paths: BTreeSet<&str> = BTreeSet::new();
        for (digest, paths) in &self.manifest {
            if digest.validate_for(self.digest_algorithm).is_err() {
                return self.invalid(format!(
                    "manifest digest {digest} is not a valid {} value",
                    self.digest_algorithm
                ));
            }
            if paths.is_empty() {
                return self.invalid(format!("manifest digest {digest} has no content paths"));
            }
            for path in paths {
                if !seen_paths.insert(path) {
                    return self.invalid(format!(
                        "content path {path} appears under multiple digests"
                    ));
                }
                self.validate_content_path_location(path)?;
            }
        }
        Ok(())
    }

    /// A content path must live under `v{N}/content/` with `N <= head`, or
    /// under the mutable-HEAD content directory when this inventory has a
    /// mutable HEAD.
    fn validate_content_path_location(&self, path: &str) -> InventoryResult<()> {
        if path.is_empty() || path.starts_with('/') || path.ends_with('/') {
            return self.invalid(format!("malformed content path: {path}"));
        }
        if path
            .split('/')
            .any(|seg| seg.is_empty() || seg == "." || seg == "..")
        {
            return self.invalid(format!("malformed content path: {path}"));
        }

        let content_dir = self.content_directory_name();
        if self.mutable_head {
            let mutable_prefix = format!("{MUTABLE_HEAD_DIR}/{content_dir}/");
            if path.starts_with(&mutable_prefix) {
                return Ok(());
            }
        }

        let mut segments = path.split('/');
        let version_seg = segments.next().unwrap_or_default();
        let dir_seg = segments.next().unwrap_or_default();
        let version: VersionNum = version_seg
            .parse()
            .map_err(|_| self.invalid_err(format!("content path {path} is not under a version")))?;
        if version > self.head {
            return self.invalid(format!(
                "content path {path} is under {version}, beyond head {}",
                self.head
            ));
        }
        if dir_seg != content_dir || segments.next().is_none() {
            return self.invalid(format!(
                "content path {path} is not under a {content_dir} directory"
            ));
        }
        Ok(())
    }

    fn validate_states(&self) -> InventoryResult<()> {
        for (num, version) in &self.versions {
            let mut seen: BTreeSet<&str> = BTreeSet::new();
            for (digest, paths) in &version.state {
                if !self.manifest.contains_key(digest) {
                    return self.invalid(format!(
                        "state digest {digest} in {num} is missing from the manifest"
                    ));
                }
                for path in paths {
                    if !seen.insert(path) {
                        return self.invalid(format!(
                            "logical path {path} appears under multiple digests in {num}"
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn validate_fixity(&self) -> InventoryResult<()> {
        let Some(fixity) = &self.fixity else {
            return Ok(());
        };
        let manifest_paths: BTreeSet<&str> = self
            .manifest
            .values()
            .flatten()
            .map(String::as_str)
            .collect();
        for (algorithm, digests) in fixity {
            for (digest, paths) in digests {
                if digest.validate_for(*algorithm).is_err() {
                    return self.invalid(format!(
                        "fixity digest {digest} is not a valid {algorithm} value"
                    ));
                }
                for path in paths {
                    if !manifest_paths.contains(path.as_str()) {
                        return self.invalid(format!(
                            "fixity references unknown content path {path}"
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn invalid<T>(&self, reason: impl Into<String>) -> InventoryResult<T> {
        Err(self.invalid_err(reason))
    }

    fn invalid_err(&self, reason: impl Into<String>) -> InventoryError {
        InventoryError::Invalid {
            object_id: self.id.clone(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ocfl_types::VersionInfo;

    fn digest(byte: u8) -> HexDigest {
        HexDigest::new(format!("{:0128x}", byte))
    }

    fn minimal() -> Inventory {
        let mut manifest = BTreeMap::new();
        manifest.insert(
            digest(1),
            BTreeSet::from(["v1/content/f.txt".to_string()]),
        );
        let mut state = BTreeMap::new();
        state.insert(digest(1), BTreeSet::from(["f.txt".to_string()]));
        let mut versions = BTreeMap::new();
        versions.insert(
            VersionNum::V1,
            Version::new(
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                VersionInfo::new(),
                state,
            ),
        );
        Inventory {
            id: "o1".into(),
            type_uri: INVENTORY_TYPE.into(),
            digest_algorithm: DigestAlgorithm::Sha512,
            head: VersionNum::V1,
            content_directory: None,
            fixity: None,
            manifest,
            versions,
            mutable_head: false,
            revision: None,
        }
    }

    #[test]
    fn minimal_inventory_validates() {
        minimal().validate().unwrap();
    }

    #[test]
    fn version_gap_is_invalid() {
        let mut inv = minimal();
        inv.head = "v2".parse().unwrap();
        assert!(inv.validate().is_err());
    }

    #[test]
    fn state_digest_must_be_in_manifest() {
        let mut inv = minimal();
        inv.versions
            .get_mut(&VersionNum::V1)
            .unwrap()
            .state
            .insert(digest(9), BTreeSet::from(["ghost.txt".to_string()]));
        assert!(inv.validate().is_err());
    }

    #[test]
    fn content_path_beyond_head_is_invalid() {
        let mut inv = minimal();
        inv.manifest.insert(
            digest(2),
            BTreeSet::from(["v2/content/late.txt".to_string()]),
        );
        let err = inv.validate().unwrap_err();
        assert!(err.to_string().contains("beyond head"));
    }

    #[test]
    fn duplicate_content_path_is_invalid() {
        let mut inv = minimal();
        inv.manifest.insert(
            digest(2),
            BTreeSet::from(["v1/content/f.txt".to_string()]),
        );
        assert!(inv.validate().is_err());
    }

    #[test]
    fn non_primary_algorithm_is_invalid() {
        let mut inv = minimal();
        inv.digest_algorithm = DigestAlgorithm::Md5;
        assert!(inv.validate().is_err());
    }

    #[test]
    fn mutable_head_content_paths_validate_only_when_flagged() {
        let mut inv = minimal();
        let path = format!("{MUTABLE_HEAD_DIR}/content/r1/new.txt");
        inv.manifest.insert(digest(3), BTreeSet::from([path]));
        assert!(inv.validate().is_err());
        inv.mutable_head = true;
        inv.validate().unwrap();
    }

    #[test]
    fn fixity_paths_must_exist_in_manifest() {
        let mut inv = minimal();
        let mut md5s = BTreeMap::new();
        md5s.insert(
            HexDigest::new(format!("{:032x}", 7)),
            BTreeSet::from(["v1/content/unknown".to_string()]),
        );
        inv.fixity = Some(BTreeMap::from([(DigestAlgorithm::Md5, md5s)]));
        assert!(inv.validate().is_err());
    }

    #[test]
    fn serde_shape_matches_ocfl() {
        let inv = minimal();
        let json = serde_json::to_value(&inv).unwrap();
        assert_eq!(json["type"], INVENTORY_TYPE);
        assert_eq!(json["digestAlgorithm"], "sha512");
        assert_eq!(json["head"], "v1");
        assert!(json.get("contentDirectory").is_none());
        assert!(json.get("mutable_head").is_none());
        let back: Inventory = serde_json::from_value(json).unwrap();
        assert_eq!(back, inv);
    }
}
