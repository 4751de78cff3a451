use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use ocfl_types::spec::MUTABLE_HEAD_DIR;
use ocfl_types::{HexDigest, VersionInfo};

use crate::error::{InventoryError, InventoryResult};
use crate::inventory::Inventory;
use crate::version::Version;

/// Fold a mutable-HEAD overlay into the immutable version it reserved.
///
/// Manifest and fixity paths under the overlay are rewritten to live under
/// `v{head}/` (the revision segment is kept), and the head version record
/// takes its metadata from the commit call rather than from any individual
/// stage call. The result is an ordinary immutable inventory.
pub fn fold_mutable_head(
    inventory: &Inventory,
    info: VersionInfo,
    created: DateTime<Utc>,
) -> InventoryResult<Inventory> {
    if !inventory.has_mutable_head() {
        return Err(InventoryError::Invalid {
            object_id: inventory.id.clone(),
            reason: "object has no mutable HEAD to commit".into(),
        });
    }

    let old_prefix = format!("{MUTABLE_HEAD_DIR}/");
    let new_prefix = format!("{}/", inventory.head);
    let rewrite = |path: &String| -> String {
        match path.strip_prefix(&old_prefix) {
            Some(rest) => format!("{new_prefix}{rest}"),
            None => path.clone(),
        }
    };

    let manifest: BTreeMap<HexDigest, BTreeSet<String>> = inventory
        .manifest
        .iter()
        .map(|(digest, paths)| (digest.clone(), paths.iter().map(&rewrite).collect()))
        .collect();

    let fixity = inventory.fixity.as_ref().map(|fixity| {
        fixity
            .iter()
            .map(|(algo, digests)| {
                (
                    *algo,
                    digests
                        .iter()
                        .map(|(digest, paths)| {
                            (digest.clone(), paths.iter().map(&rewrite).collect())
                        })
                        .collect(),
                )
            })
            .collect()
    });

    let mut versions = inventory.versions.clone();
    let state = inventory
        .head_version()
        .map(|v| v.state.clone())
        .unwrap_or_default();
    versions.insert(inventory.head, Version::new(created, info, state));

    let folded = Inventory {
        id: inventory.id.clone(),
        type_uri: inventory.type_uri.clone(),
        digest_algorithm: inventory.digest_algorithm,
        head: inventory.head,
        content_directory: inventory.content_directory.clone(),
        fixity,
        manifest,
        versions,
        mutable_head: false,
        revision: None,
    };
    folded.validate()?;
    Ok(folded)
}
