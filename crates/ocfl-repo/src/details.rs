use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ocfl_inventory::Inventory;
use ocfl_types::{DigestAlgorithm, HexDigest, User, VersionNum};

/// One file of one version, as reported to callers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileDetails {
    pub logical_path: String,
    /// Content path relative to the object root.
    pub content_path: String,
    pub digest: HexDigest,
    pub algorithm: DigestAlgorithm,
}

/// A version as reported to callers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionDetails {
    pub object_id: String,
    pub version_num: VersionNum,
    pub created: DateTime<Utc>,
    pub message: Option<String>,
    pub user: Option<User>,
    /// True when this version is an uncommitted mutable HEAD.
    pub mutable: bool,
    pub files: Vec<FileDetails>,
}

impl VersionDetails {
    /// Extract the details of `num` from an inventory, or `None` if the
    /// version does not exist.
    pub fn from_inventory(inventory: &Inventory, num: VersionNum) -> Option<Self> {
        let version = inventory.version(num)?;
        let mut files = Vec::with_capacity(version.file_count());
        for (digest, paths) in &version.state {
            let content_path = inventory.content_path(digest)?.clone();
            for path in paths {
                files.push(FileDetails {
                    logical_path: path.clone(),
                    content_path: content_path.clone(),
                    digest: digest.clone(),
                    algorithm: inventory.digest_algorithm,
                });
            }
        }
        files.sort_by(|a, b| a.logical_path.cmp(&b.logical_path));
        Some(Self {
            object_id: inventory.id.clone(),
            version_num: num,
            created: version.created,
            message: version.message.clone(),
            user: version.user.clone(),
            mutable: inventory.has_mutable_head() && num == inventory.head,
            files,
        })
    }
}

/// An object as reported to callers: every version's details.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectDetails {
    pub id: String,
    pub digest_algorithm: DigestAlgorithm,
    pub head: VersionNum,
    pub versions: BTreeMap<VersionNum, VersionDetails>,
}

impl ObjectDetails {
    pub fn from_inventory(inventory: &Inventory) -> Self {
        let versions = inventory
            .versions
            .keys()
            .filter_map(|num| {
                VersionDetails::from_inventory(inventory, *num).map(|d| (*num, d))
            })
            .collect();
        Self {
            id: inventory.id.clone(),
            digest_algorithm: inventory.digest_algorithm,
            head: inventory.head,
            versions,
        }
    }

    pub fn head_version(&self) -> Option<&VersionDetails> {
        self.versions.get(&self.head)
    }
}
