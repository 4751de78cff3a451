use std::io::Read;

use ocfl_types::spec::{INVENTORY_FILE, SIDECAR_PREFIX};
use ocfl_types::{DigestAlgorithm, HexDigest};

use crate::error::{InventoryError, InventoryResult};
use crate::inventory::Inventory;

/// Serializes inventories to and from their JSON representation.
///
/// Implementations must be deterministic: serializing the same inventory
/// twice must produce identical bytes, or the sidecar digest would drift.
pub trait InventoryMapper: Send + Sync {
    fn read(&self, reader: &mut dyn Read) -> InventoryResult<Inventory>;

    fn write(&self, inventory: &Inventory) -> InventoryResult<Vec<u8>>;
}

/// The serde_json mapper: pretty-printed, keys in `BTreeMap` order.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerdeInventoryMapper;

impl InventoryMapper for SerdeInventoryMapper {
    fn read(&self, reader: &mut dyn Read) -> InventoryResult<Inventory> {
        Ok(serde_json::from_reader(reader)?)
    }

    fn write(&self, inventory: &Inventory) -> InventoryResult<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(inventory)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

/// The sidecar filename for a digest algorithm, e.g. `inventory.json.sha512`.
pub fn sidecar_name(algorithm: DigestAlgorithm) -> String {
    format!("{SIDECAR_PREFIX}{algorithm}")
}

/// Render sidecar contents: `"{digest}  inventory.json\n"`.
pub fn format_sidecar(digest: &HexDigest) -> String {
    format!("{digest}  {INVENTORY_FILE}\n")
}

/// Extract the digest from sidecar contents. Any whitespace run separates
/// the digest from the filename.
pub fn parse_sidecar(content: &str) -> InventoryResult<HexDigest> {
    let digest = content
        .split_whitespace()
        .next()
        .ok_or_else(|| InventoryError::InvalidSidecar("empty sidecar".into()))?;
    if digest.is_empty() || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(InventoryError::InvalidSidecar(format!(
            "not a hex digest: {digest}"
        )));
    }
    Ok(HexDigest::new(digest))
}

/// The algorithm implied by a sidecar filename, if it is one.
pub fn algorithm_from_sidecar_name(name: &str) -> Option<DigestAlgorithm> {
    let suffix = name.strip_prefix(SIDECAR_PREFIX)?;
    DigestAlgorithm::from_ocfl_name(suffix).ok()
}
