use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use ocfl_types::{HexDigest, User, VersionInfo};
use serde::{Deserialize, Serialize};

/// One version of an object: commit metadata plus the version's state.
///
/// The state is inverse-indexed: a content digest maps to the set of
/// logical paths whose content is that digest. A logical path appears under
/// exactly one digest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub created: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    pub state: BTreeMap<HexDigest, BTreeSet<String>>,
}

impl Version {
    /// Assemble a version from commit metadata and a finished state.
    pub fn new(
        created: DateTime<Utc>,
        info: VersionInfo,
        state: BTreeMap<HexDigest, BTreeSet<String>>,
    ) -> Self {
        Self {
            created,
            message: info.message,
            user: info.user,
            state,
        }
    }

    /// The digest a logical path is bound to, if any.
    pub fn digest_for_path(&self, logical_path: &str) -> Option<&HexDigest> {
        self.state
            .iter()
            .find(|(_, paths)| paths.contains(logical_path))
            .map(|(digest, _)| digest)
    }

    pub fn contains_path(&self, logical_path: &str) -> bool {
        self.digest_for_path(logical_path).is_some()
    }

    /// All logical paths in this version, in order.
    pub fn logical_paths(&self) -> impl Iterator<Item = &str> {
        self.state.values().flatten().map(String::as_str)
    }

    /// Number of logical paths in this version.
    pub fn file_count(&self) -> usize {
        self.state.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }
}
