use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::version::VersionNum;

/// The agent recorded on a version: a name and an optional address
/// (typically a `mailto:` or https URI).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: None,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }
}

/// Caller-supplied metadata for a new version.
///
/// `created` overrides the repository clock when set; otherwise the version
/// is stamped at commit time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VersionInfo {
    pub message: Option<String>,
    pub user: Option<User>,
    pub created: Option<DateTime<Utc>>,
}

impl VersionInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_created(mut self, created: DateTime<Utc>) -> Self {
        self.created = Some(created);
        self
    }
}

/// An object identifier plus an optional version anchor.
///
/// `version: None` means HEAD, whatever that is at resolution time.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectVersionId {
    pub object_id: String,
    pub version: Option<VersionNum>,
}

impl ObjectVersionId {
    /// Address the HEAD of an object.
    pub fn head(object_id: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            version: None,
        }
    }

    /// Address a specific version of an object.
    pub fn version(object_id: impl Into<String>, version: VersionNum) -> Self {
        Self {
            object_id: object_id.into(),
            version: Some(version),
        }
    }
}

impl std::fmt::Display for ObjectVersionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.version {
            Some(v) => write!(f, "{} {}", self.object_id, v),
            None => write!(f, "{} HEAD", self.object_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_info_builders() {
        let info = VersionInfo::new()
            .with_message("initial load")
            .with_user(User::new("alice").with_address("mailto:alice@example.org"));
        assert_eq!(info.message.as_deref(), Some("initial load"));
        assert_eq!(info.user.as_ref().unwrap().name, "alice");
        assert!(info.created.is_none());
    }

    #[test]
    fn user_serde_omits_missing_address() {
        let json = serde_json::to_string(&User::new("bob")).unwrap();
        assert_eq!(json, "{\"name\":\"bob\"}");
    }

    #[test]
    fn object_version_id_display() {
        let head = ObjectVersionId::head("o1");
        assert_eq!(head.to_string(), "o1 HEAD");
        let pinned = ObjectVersionId::version("o1", "v2".parse().unwrap());
        assert_eq!(pinned.to_string(), "o1 v2");
    }
}
