use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

/// Maps an object identifier to its object-root path under the storage root.
///
/// Each implementation corresponds to a registered OCFL storage-layout
/// extension; the extension name and configuration are written into the
/// storage root so other tooling can resolve the same mapping.
pub trait StorageLayout: Send + Sync {
    /// Registered extension name, e.g. `0004-hashed-n-tuple-storage-layout`.
    fn extension_name(&self) -> &'static str;

    /// One-line human description for `ocfl_layout.json`.
    fn description(&self) -> &'static str;

    /// The object-root path for `object_id`, relative to the storage root.
    fn map_object_id(&self, object_id: &str) -> String;

    /// The extension configuration, serialized into the extension dir.
    fn config_json(&self) -> serde_json::Value;
}

/// `0002-flat-direct-storage-layout`: the object id is the path.
///
/// Only safe for ids that are themselves valid single-segment filenames;
/// ids containing `/` would nest objects and must not be used with this
/// layout.
#[derive(Clone, Copy, Debug, Default)]
pub struct FlatDirectLayout;

impl StorageLayout for FlatDirectLayout {
    fn extension_name(&self) -> &'static str {
        "0002-flat-direct-storage-layout"
    }

    fn description(&self) -> &'static str {
        "Object ids are used directly as object root directory names"
    }

    fn map_object_id(&self, object_id: &str) -> String {
        object_id.to_string()
    }

    fn config_json(&self) -> serde_json::Value {
        serde_json::json!({ "extensionName": self.extension_name() })
    }
}

/// `0004-hashed-n-tuple-storage-layout` configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashedNTupleConfig {
    pub extension_name: String,
    pub digest_algorithm: String,
    pub tuple_size: usize,
    pub number_of_tuples: usize,
    pub short_object_root: bool,
}

/// `0004-hashed-n-tuple-storage-layout`: sha-256 the id, split the digest
/// into tuples, encapsulate under the full digest. Defaults to 3 tuples of
/// 3 characters.
#[derive(Clone, Copy, Debug)]
pub struct HashedNTupleLayout {
    tuple_size: usize,
    number_of_tuples: usize,
}

impl HashedNTupleLayout {
    pub fn new(tuple_size: usize, number_of_tuples: usize) -> Self {
        Self {
            tuple_size,
            number_of_tuples,
        }
    }
}

impl Default for HashedNTupleLayout {
    fn default() -> Self {
        Self::new(3, 3)
    }
}

impl StorageLayout for HashedNTupleLayout {
    fn extension_name(&self) -> &'static str {
        "0004-hashed-n-tuple-storage-layout"
    }

    fn description(&self) -> &'static str {
        "Object roots are distributed by hashed-n-tuple digest prefixes"
    }

    fn map_object_id(&self, object_id: &str) -> String {
        let digest = hex::encode(Sha256::digest(object_id.as_bytes()));
        let mut parts = Vec::with_capacity(self.number_of_tuples + 1);
        for i in 0..self.number_of_tuples {
            let start = i * self.tuple_size;
            parts.push(&digest[start..start + self.tuple_size]);
        }
        parts.push(&digest);
        parts.join("/")
    }

    fn config_json(&self) -> serde_json::Value {
        serde_json::to_value(HashedNTupleConfig {
            extension_name: self.extension_name().to_string(),
            digest_algorithm: "sha256".to_string(),
            tuple_size: self.tuple_size,
            number_of_tuples: self.number_of_tuples,
            short_object_root: false,
        })
        .expect("layout config serializes")
    }
}
