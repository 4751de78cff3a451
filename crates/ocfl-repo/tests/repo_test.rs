//! End-to-end tests over real storage backends.

use std::collections::BTreeSet;
use std::path::Path;
use std::thread;

use chrono::{TimeZone, Utc};
use ocfl_digest::Digester;
use ocfl_repo::{
    ContentPathConstraints, FixedClock, MemoryCache, OcflError, PercentEncodingPathMapper,
    Repository, UpdateOptions,
};
use ocfl_storage::{FlatDirectLayout, FsStorage, HashedNTupleLayout, MemoryStorage};
use ocfl_types::{DigestAlgorithm, User, VersionInfo, VersionNum};

fn flat_repo(base: &Path) -> Repository {
    Repository::builder()
        .storage(FsStorage::new(base.join("root")).unwrap())
        .layout(FlatDirectLayout)
        .work_dir(base.join("work"))
        .build()
        .unwrap()
}

fn sha512(data: &[u8]) -> String {
    Digester::hash(DigestAlgorithm::Sha512, data).to_string()
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn scenario_create_and_read() {
    let base = tempfile::tempdir().unwrap();
    let repo = flat_repo(base.path());

    let id = repo
        .update_object("o1", VersionInfo::new().with_message("initial"), |u| {
            u.write_bytes(b"hello", "f.txt", UpdateOptions::default())?;
            Ok(())
        })
        .unwrap();
    assert_eq!(id.version, Some(VersionNum::V1));

    let object_root = base.path().join("root/o1");
    assert_eq!(
        std::fs::read(object_root.join("v1/content/f.txt")).unwrap(),
        b"hello"
    );
    assert_eq!(
        std::fs::read_to_string(object_root.join("0=ocfl_object_1.1")).unwrap(),
        "ocfl_object_1.1\n"
    );

    let inventory = read_json(&object_root.join("inventory.json"));
    let manifest = &inventory["manifest"][sha512(b"hello")];
    assert_eq!(manifest, &serde_json::json!(["v1/content/f.txt"]));

    let sidecar = std::fs::read_to_string(object_root.join("inventory.json.sha512")).unwrap();
    let inv_bytes = std::fs::read(object_root.join("inventory.json")).unwrap();
    assert_eq!(sidecar, format!("{}  inventory.json\n", sha512(&inv_bytes)));

    assert_eq!(repo.read_file_to_vec("o1", None, "f.txt").unwrap(), b"hello");
}

#[test]
fn scenario_dedup_across_versions() {
    let base = tempfile::tempdir().unwrap();
    let repo = flat_repo(base.path());

    repo.update_object("o1", VersionInfo::new(), |u| {
        u.write_bytes(b"a", "p1", UpdateOptions::default())?;
        Ok(())
    })
    .unwrap();
    repo.update_object("o1", VersionInfo::new(), |u| {
        u.write_bytes(b"a", "p2", UpdateOptions::default())?;
        Ok(())
    })
    .unwrap();

    let object_root = base.path().join("root/o1");
    let inventory = read_json(&object_root.join("inventory.json"));
    assert_eq!(
        inventory["manifest"][sha512(b"a")],
        serde_json::json!(["v1/content/p1"])
    );
    assert!(
        !object_root.join("v2/content").exists(),
        "no bytes may be stored under v2/content"
    );
    assert_eq!(repo.read_file_to_vec("o1", None, "p1").unwrap(), b"a");
    assert_eq!(repo.read_file_to_vec("o1", None, "p2").unwrap(), b"a");
}

#[test]
fn scenario_dedup_within_one_version() {
    let base = tempfile::tempdir().unwrap();
    let repo = flat_repo(base.path());

    repo.update_object("o1", VersionInfo::new(), |u| {
        u.write_bytes(b"same", "p1", UpdateOptions::default())?;
        u.write_bytes(b"same", "p2", UpdateOptions::default())?;
        Ok(())
    })
    .unwrap();

    let inventory = read_json(&base.path().join("root/o1/inventory.json"));
    let paths = inventory["manifest"][sha512(b"same")].as_array().unwrap();
    assert_eq!(paths.len(), 1);
    assert_eq!(repo.read_file_to_vec("o1", None, "p2").unwrap(), b"same");
}

#[test]
fn scenario_rename() {
    let base = tempfile::tempdir().unwrap();
    let repo = flat_repo(base.path());

    repo.update_object("o1", VersionInfo::new(), |u| {
        u.write_bytes(b"x", "p1", UpdateOptions::default())?;
        Ok(())
    })
    .unwrap();
    repo.update_object("o1", VersionInfo::new(), |u| {
        u.rename_file("p1", "p2", UpdateOptions::default())?;
        Ok(())
    })
    .unwrap();

    let object_root = base.path().join("root/o1");
    assert!(!object_root.join("v2/content").exists());
    assert_eq!(repo.read_file_to_vec("o1", None, "p2").unwrap(), b"x");
    assert!(matches!(
        repo.read_file("o1", None, "p1").unwrap_err(),
        OcflError::NotFound(_)
    ));
    // v1 still serves the original name.
    assert_eq!(
        repo.read_file_to_vec("o1", Some(VersionNum::V1), "p1").unwrap(),
        b"x"
    );
}

#[test]
fn scenario_remove_all() {
    let base = tempfile::tempdir().unwrap();
    let repo = flat_repo(base.path());

    repo.update_object("o1", VersionInfo::new(), |u| {
        u.write_bytes(b"y", "p1", UpdateOptions::default())?;
        Ok(())
    })
    .unwrap();
    repo.update_object("o1", VersionInfo::new(), |u| {
        u.remove_file("p1")?;
        Ok(())
    })
    .unwrap();

    let object_root = base.path().join("root/o1");
    assert!(!object_root.join("v2/content").exists());
    assert!(object_root.join("v2/inventory.json").exists());

    let details = repo.describe_version("o1", None).unwrap();
    assert_eq!(details.version_num, "v2".parse().unwrap());
    assert!(details.files.is_empty());
}

#[test]
fn scenario_concurrent_update() {
    let base = tempfile::tempdir().unwrap();
    let repo = flat_repo(base.path());
    repo.update_object("o1", VersionInfo::new(), |u| {
        u.write_bytes(b"base", "base.txt", UpdateOptions::default())?;
        Ok(())
    })
    .unwrap();

    let handles: Vec<_> = (0..2)
        .map(|i| {
            let repo = repo.clone();
            thread::spawn(move || {
                repo.update_object("o1", VersionInfo::new(), |u| {
                    u.write_bytes(format!("writer {i}").as_bytes(), &format!("w{i}"), UpdateOptions::default())?;
                    Ok(())
                })
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert!(successes >= 1, "at least one writer must win");
    for result in &results {
        if let Err(e) = result {
            assert!(matches!(e, OcflError::ObjectOutOfSync { .. }));
        }
    }
    // Head moved one past the original per successful writer.
    let details = repo.describe_object("o1").unwrap();
    assert_eq!(details.head.num(), 1 + successes as u64);
}

#[test]
fn external_writer_is_detected() {
    let base = tempfile::tempdir().unwrap();
    let repo = flat_repo(base.path());
    repo.update_object("o1", VersionInfo::new(), |u| {
        u.write_bytes(b"1", "f", UpdateOptions::default())?;
        Ok(())
    })
    .unwrap();

    // Another process already installed v2.
    std::fs::create_dir_all(base.path().join("root/o1/v2")).unwrap();

    let err = repo
        .update_object("o1", VersionInfo::new(), |u| {
            u.write_bytes(b"2", "g", UpdateOptions::default())?;
            Ok(())
        })
        .unwrap_err();
    assert!(matches!(err, OcflError::ObjectOutOfSync { .. }));
}

#[test]
fn prior_versions_are_immutable() {
    let base = tempfile::tempdir().unwrap();
    let repo = flat_repo(base.path());

    repo.update_object("o1", VersionInfo::new(), |u| {
        u.write_bytes(b"original", "f", UpdateOptions::default())?;
        Ok(())
    })
    .unwrap();
    let object_root = base.path().join("root/o1");
    let v1_inventory = std::fs::read(object_root.join("v1/inventory.json")).unwrap();
    let v1_content = std::fs::read(object_root.join("v1/content/f")).unwrap();

    repo.update_object("o1", VersionInfo::new(), |u| {
        u.write_bytes(b"updated", "f", UpdateOptions::overwrite())?;
        u.write_bytes(b"more", "g", UpdateOptions::default())?;
        Ok(())
    })
    .unwrap();

    assert_eq!(
        std::fs::read(object_root.join("v1/inventory.json")).unwrap(),
        v1_inventory
    );
    assert_eq!(std::fs::read(object_root.join("v1/content/f")).unwrap(), v1_content);
    assert_eq!(
        repo.read_file_to_vec("o1", Some(VersionNum::V1), "f").unwrap(),
        b"original"
    );
    assert_eq!(repo.read_file_to_vec("o1", None, "f").unwrap(), b"updated");
}

#[test]
fn stored_bytes_match_manifest_digests() {
    let base = tempfile::tempdir().unwrap();
    let repo = flat_repo(base.path());

    repo.update_object("o1", VersionInfo::new(), |u| {
        u.write_bytes(b"alpha", "a", UpdateOptions::default())?;
        u.write_bytes(b"beta", "dir/b", UpdateOptions::default())?;
        Ok(())
    })
    .unwrap();
    repo.update_object("o1", VersionInfo::new(), |u| {
        u.write_bytes(b"gamma", "c", UpdateOptions::default())?;
        Ok(())
    })
    .unwrap();

    let object_root = base.path().join("root/o1");
    let inventory = read_json(&object_root.join("inventory.json"));
    let manifest = inventory["manifest"].as_object().unwrap();
    assert!(!manifest.is_empty());
    for (digest, paths) in manifest {
        for path in paths.as_array().unwrap() {
            let stored = std::fs::read(object_root.join(path.as_str().unwrap())).unwrap();
            assert_eq!(&sha512(&stored), digest, "fixity of {path}");
        }
    }
}

#[test]
fn corrupted_content_fails_fixity_on_read() {
    let base = tempfile::tempdir().unwrap();
    let repo = flat_repo(base.path());

    repo.update_object("o1", VersionInfo::new(), |u| {
        u.write_bytes(b"pristine", "f", UpdateOptions::default())?;
        Ok(())
    })
    .unwrap();

    // Tamper with the stored bytes behind the repository's back.
    std::fs::write(base.path().join("root/o1/v1/content/f"), b"tampered").unwrap();

    let err = repo.read_file_to_vec("o1", None, "f").unwrap_err();
    assert!(matches!(err, OcflError::FixityMismatch(_)));
}

#[test]
fn reinstate_restores_old_content() {
    let base = tempfile::tempdir().unwrap();
    let repo = flat_repo(base.path());

    repo.update_object("o1", VersionInfo::new(), |u| {
        u.write_bytes(b"v1 bytes", "doc.txt", UpdateOptions::default())?;
        Ok(())
    })
    .unwrap();
    repo.update_object("o1", VersionInfo::new(), |u| {
        u.write_bytes(b"v2 bytes", "doc.txt", UpdateOptions::overwrite())?;
        Ok(())
    })
    .unwrap();
    repo.update_object("o1", VersionInfo::new(), |u| {
        u.reinstate_file(VersionNum::V1, "doc.txt", "restored.txt", UpdateOptions::default())?;
        Ok(())
    })
    .unwrap();

    assert_eq!(
        repo.read_file_to_vec("o1", None, "restored.txt").unwrap(),
        b"v1 bytes"
    );
    assert_eq!(
        repo.read_file_to_vec("o1", None, "doc.txt").unwrap(),
        b"v2 bytes"
    );
    // No new bytes were written for the reinstated file.
    assert!(!base.path().join("root/o1/v3/content").exists());
}

#[test]
fn put_object_replaces_state() {
    let base = tempfile::tempdir().unwrap();
    let repo = flat_repo(base.path());

    let source1 = tempfile::tempdir().unwrap();
    std::fs::write(source1.path().join("keep.txt"), b"keep").unwrap();
    std::fs::write(source1.path().join("drop.txt"), b"drop").unwrap();
    repo.put_object("o1", source1.path(), VersionInfo::new()).unwrap();

    let source2 = tempfile::tempdir().unwrap();
    std::fs::write(source2.path().join("keep.txt"), b"keep").unwrap();
    repo.put_object("o1", source2.path(), VersionInfo::new()).unwrap();

    let files: BTreeSet<String> = repo
        .list_files("o1", None)
        .unwrap()
        .into_iter()
        .map(|f| f.logical_path)
        .collect();
    assert_eq!(files, BTreeSet::from(["keep.txt".to_string()]));
    assert_eq!(
        repo.read_file_to_vec("o1", Some(VersionNum::V1), "drop.txt").unwrap(),
        b"drop"
    );
}

#[test]
fn scenario_purge() {
    let base = tempfile::tempdir().unwrap();
    let repo = flat_repo(base.path());

    repo.update_object("o1", VersionInfo::new(), |u| {
        u.write_bytes(b"x", "f", UpdateOptions::default())?;
        Ok(())
    })
    .unwrap();
    assert!(repo.contains_object("o1").unwrap());
    assert_eq!(repo.list_object_ids().unwrap(), vec!["o1".to_string()]);

    repo.purge_object("o1").unwrap();
    assert!(!base.path().join("root/o1").exists());
    assert!(!repo.contains_object("o1").unwrap());
    assert!(repo.list_object_ids().unwrap().is_empty());
    // Purging again is a no-op.
    repo.purge_object("o1").unwrap();
}

#[test]
fn purge_cleans_hashed_layout_parents() {
    let base = tempfile::tempdir().unwrap();
    let repo = Repository::builder()
        .storage(FsStorage::new(base.path().join("root")).unwrap())
        .layout(HashedNTupleLayout::default())
        .work_dir(base.path().join("work"))
        .build()
        .unwrap();

    repo.update_object("o1", VersionInfo::new(), |u| {
        u.write_bytes(b"x", "f", UpdateOptions::default())?;
        Ok(())
    })
    .unwrap();
    assert_eq!(repo.read_file_to_vec("o1", None, "f").unwrap(), b"x");

    repo.purge_object("o1").unwrap();
    // Only the root bootstrap files remain.
    let leftovers: BTreeSet<String> = std::fs::read_dir(base.path().join("root"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        leftovers,
        BTreeSet::from([
            "0=ocfl_1.1".to_string(),
            "ocfl_layout.json".to_string(),
            "extensions".to_string(),
        ])
    );
}

#[test]
fn scenario_mutable_head_fold() {
    let base = tempfile::tempdir().unwrap();
    let repo = flat_repo(base.path());
    repo.update_object("o1", VersionInfo::new(), |u| {
        u.write_bytes(b"base", "base.txt", UpdateOptions::default())?;
        Ok(())
    })
    .unwrap();

    for i in 1..=3u32 {
        let id = repo
            .stage_changes("o1", VersionInfo::new(), |u| {
                u.write_bytes(
                    format!("staged {i}").as_bytes(),
                    &format!("staged-{i}.txt"),
                    UpdateOptions::default(),
                )?;
                Ok(())
            })
            .unwrap();
        assert_eq!(id.version, Some("v2".parse().unwrap()));
        assert!(repo.has_staged_changes("o1").unwrap());
        // Staged changes are readable as HEAD before commit.
        assert_eq!(
            repo.read_file_to_vec("o1", None, &format!("staged-{i}.txt")).unwrap(),
            format!("staged {i}").as_bytes()
        );
    }

    let object_root = base.path().join("root/o1");
    assert!(object_root
        .join("extensions/0005-mutable-head-0.1/head/inventory.json")
        .exists());

    let id = repo
        .commit_staged_changes("o1", VersionInfo::new().with_message("seal"))
        .unwrap();
    assert_eq!(id.version, Some("v2".parse().unwrap()));

    assert!(!object_root.join("extensions").exists());
    assert!(!repo.has_staged_changes("o1").unwrap());

    let details = repo.describe_object("o1").unwrap();
    assert_eq!(details.head.num(), 2);
    let files: BTreeSet<String> = details.head_version().unwrap().files.iter()
        .map(|f| f.logical_path.clone())
        .collect();
    assert_eq!(
        files,
        BTreeSet::from([
            "base.txt".to_string(),
            "staged-1.txt".to_string(),
            "staged-2.txt".to_string(),
            "staged-3.txt".to_string(),
        ])
    );
    for i in 1..=3u32 {
        assert_eq!(
            repo.read_file_to_vec("o1", None, &format!("staged-{i}.txt")).unwrap(),
            format!("staged {i}").as_bytes()
        );
    }

    // Committing with nothing staged is a no-op.
    let id = repo.commit_staged_changes("o1", VersionInfo::new()).unwrap();
    assert_eq!(id.version, Some("v2".parse().unwrap()));
}

#[test]
fn stage_changes_on_missing_object_creates_empty_v1() {
    let base = tempfile::tempdir().unwrap();
    let repo = flat_repo(base.path());

    repo.stage_changes("o1", VersionInfo::new(), |u| {
        u.write_bytes(b"staged", "f.txt", UpdateOptions::default())?;
        Ok(())
    })
    .unwrap();

    let object_root = base.path().join("root/o1");
    assert!(object_root.join("v1/inventory.json").exists());
    assert!(!object_root.join("v1/content").exists());

    let v1 = repo.describe_version("o1", Some(VersionNum::V1)).unwrap();
    assert!(v1.files.is_empty());
    assert_eq!(
        v1.message.as_deref(),
        Some("Auto-generated empty object version.")
    );

    repo.commit_staged_changes("o1", VersionInfo::new()).unwrap();
    let details = repo.describe_object("o1").unwrap();
    assert_eq!(details.head.num(), 2);
    assert_eq!(repo.read_file_to_vec("o1", None, "f.txt").unwrap(), b"staged");
}

#[test]
fn purge_staged_changes_discards_overlay() {
    let base = tempfile::tempdir().unwrap();
    let repo = flat_repo(base.path());
    repo.update_object("o1", VersionInfo::new(), |u| {
        u.write_bytes(b"base", "base.txt", UpdateOptions::default())?;
        Ok(())
    })
    .unwrap();

    repo.stage_changes("o1", VersionInfo::new(), |u| {
        u.write_bytes(b"staged", "staged.txt", UpdateOptions::default())?;
        Ok(())
    })
    .unwrap();
    assert!(repo.has_staged_changes("o1").unwrap());

    repo.purge_staged_changes("o1").unwrap();
    assert!(!repo.has_staged_changes("o1").unwrap());
    assert!(!base.path().join("root/o1/extensions").exists());

    let details = repo.describe_object("o1").unwrap();
    assert_eq!(details.head.num(), 1);
    assert!(matches!(
        repo.read_file("o1", None, "staged.txt").unwrap_err(),
        OcflError::NotFound(_)
    ));
}

#[test]
fn update_object_refuses_uncommitted_mutable_head() {
    let base = tempfile::tempdir().unwrap();
    let repo = flat_repo(base.path());
    repo.stage_changes("o1", VersionInfo::new(), |u| {
        u.write_bytes(b"staged", "f", UpdateOptions::default())?;
        Ok(())
    })
    .unwrap();

    let err = repo
        .update_object("o1", VersionInfo::new(), |u| {
            u.write_bytes(b"x", "g", UpdateOptions::default())?;
            Ok(())
        })
        .unwrap_err();
    assert!(matches!(err, OcflError::AlreadyExists(_)));
}

#[test]
fn staged_revisions_accumulate_dedup() {
    let base = tempfile::tempdir().unwrap();
    let repo = flat_repo(base.path());

    repo.stage_changes("o1", VersionInfo::new(), |u| {
        u.write_bytes(b"payload", "first", UpdateOptions::default())?;
        Ok(())
    })
    .unwrap();
    // Identical bytes in a later revision bind to the r1 content path.
    repo.stage_changes("o1", VersionInfo::new(), |u| {
        u.write_bytes(b"payload", "second", UpdateOptions::default())?;
        Ok(())
    })
    .unwrap();
    repo.commit_staged_changes("o1", VersionInfo::new()).unwrap();

    let inventory = read_json(&base.path().join("root/o1/inventory.json"));
    let paths = inventory["manifest"][sha512(b"payload")].as_array().unwrap();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0], "v2/content/r1/first");
    assert_eq!(repo.read_file_to_vec("o1", None, "second").unwrap(), b"payload");
}

#[test]
fn windows_safe_logical_paths() {
    let base = tempfile::tempdir().unwrap();
    let repo = Repository::builder()
        .storage(FsStorage::new(base.path().join("root")).unwrap())
        .layout(FlatDirectLayout)
        .logical_path_mapper(PercentEncodingPathMapper)
        .content_path_constraints(ContentPathConstraints::Windows)
        .work_dir(base.path().join("work"))
        .build()
        .unwrap();

    let logical = "tricky/<bad>:path?.txt";
    repo.update_object("o1", VersionInfo::new(), |u| {
        u.write_bytes(b"1", logical, UpdateOptions::default())?;
        Ok(())
    })
    .unwrap();

    assert_eq!(repo.read_file_to_vec("o1", None, logical).unwrap(), b"1");
    let mapped = base
        .path()
        .join("root/o1/v1/content/tricky/%3cbad%3e%3apath%3f.txt");
    assert!(mapped.exists(), "expected percent-encoded content path");
}

#[test]
fn invalid_logical_paths_are_rejected_before_writing() {
    let base = tempfile::tempdir().unwrap();
    let repo = flat_repo(base.path());

    let err = repo
        .update_object("o1", VersionInfo::new(), |u| {
            u.write_bytes(b"x", "../escape", UpdateOptions::default())?;
            Ok(())
        })
        .unwrap_err();
    assert!(matches!(err, OcflError::InvalidPath { .. }));
    // The failed update left nothing behind.
    assert!(!repo.contains_object("o1").unwrap());
}

#[test]
fn memory_storage_end_to_end() {
    let base = tempfile::tempdir().unwrap();
    let storage = MemoryStorage::new();
    let repo = Repository::builder()
        .storage(storage)
        .layout(FlatDirectLayout)
        .inventory_cache(MemoryCache::new())
        .work_dir(base.path().join("work"))
        .build()
        .unwrap();

    repo.update_object("o1", VersionInfo::new(), |u| {
        u.write_bytes(b"in memory", "f.txt", UpdateOptions::default())?;
        Ok(())
    })
    .unwrap();
    repo.update_object("o1", VersionInfo::new(), |u| {
        u.rename_file("f.txt", "g.txt", UpdateOptions::default())?;
        Ok(())
    })
    .unwrap();

    assert_eq!(repo.read_file_to_vec("o1", None, "g.txt").unwrap(), b"in memory");
    assert_eq!(repo.list_object_ids().unwrap(), vec!["o1".to_string()]);

    repo.stage_changes("o1", VersionInfo::new(), |u| {
        u.write_bytes(b"staged", "s.txt", UpdateOptions::default())?;
        Ok(())
    })
    .unwrap();
    repo.commit_staged_changes("o1", VersionInfo::new()).unwrap();
    assert_eq!(repo.describe_object("o1").unwrap().head.num(), 3);
    assert_eq!(repo.read_file_to_vec("o1", None, "s.txt").unwrap(), b"staged");
}

#[test]
fn fixed_clock_and_version_info_are_recorded() {
    let base = tempfile::tempdir().unwrap();
    let t1 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let repo = Repository::builder()
        .storage(FsStorage::new(base.path().join("root")).unwrap())
        .layout(FlatDirectLayout)
        .clock(FixedClock::new(t1))
        .work_dir(base.path().join("work"))
        .build()
        .unwrap();

    let info = VersionInfo::new()
        .with_message("ingest")
        .with_user(User::new("alice").with_address("mailto:alice@example.org"));
    repo.update_object("o1", info, |u| {
        u.write_bytes(b"x", "f", UpdateOptions::default())?;
        Ok(())
    })
    .unwrap();

    let details = repo.describe_version("o1", None).unwrap();
    assert_eq!(details.created, t1);
    assert_eq!(details.message.as_deref(), Some("ingest"));
    assert_eq!(details.user.as_ref().unwrap().name, "alice");

    let inventory = read_json(&base.path().join("root/o1/inventory.json"));
    assert_eq!(inventory["versions"]["v1"]["message"], "ingest");
}

#[test]
fn reopened_repository_reads_existing_objects() {
    let base = tempfile::tempdir().unwrap();
    {
        let repo = flat_repo(base.path());
        repo.update_object("o1", VersionInfo::new(), |u| {
            u.write_bytes(b"persisted", "f", UpdateOptions::default())?;
            Ok(())
        })
        .unwrap();
    }
    let repo = flat_repo(base.path());
    assert_eq!(repo.read_file_to_vec("o1", None, "f").unwrap(), b"persisted");
    repo.update_object("o1", VersionInfo::new(), |u| {
        u.write_bytes(b"again", "g", UpdateOptions::default())?;
        Ok(())
    })
    .unwrap();
    assert_eq!(repo.describe_object("o1").unwrap().head.num(), 2);
}

#[test]
fn mismatched_layout_is_rejected_on_open() {
    let base = tempfile::tempdir().unwrap();
    flat_repo(base.path());

    let err = Repository::builder()
        .storage(FsStorage::new(base.path().join("root")).unwrap())
        .layout(HashedNTupleLayout::default())
        .work_dir(base.path().join("work"))
        .build()
        .unwrap_err();
    assert!(matches!(err, OcflError::Config(_)));
}

#[test]
fn closed_repository_rejects_operations() {
    let base = tempfile::tempdir().unwrap();
    let repo = flat_repo(base.path());
    repo.close();
    repo.close(); // idempotent

    let err = repo
        .update_object("o1", VersionInfo::new(), |_| Ok(()))
        .unwrap_err();
    assert!(matches!(err, OcflError::Closed));
    assert!(matches!(
        repo.read_file("o1", None, "f").unwrap_err(),
        OcflError::Closed
    ));
}

#[test]
fn concurrent_updates_to_different_objects() {
    let base = tempfile::tempdir().unwrap();
    let repo = flat_repo(base.path());

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let repo = repo.clone();
            thread::spawn(move || {
                let id = format!("obj-{i}");
                repo.update_object(&id, VersionInfo::new(), |u| {
                    u.write_bytes(format!("content {i}").as_bytes(), "f", UpdateOptions::default())?;
                    Ok(())
                })
                .unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let mut ids = repo.list_object_ids().unwrap();
    ids.sort();
    assert_eq!(ids.len(), 4);
    for i in 0..4 {
        assert_eq!(
            repo.read_file_to_vec(&format!("obj-{i}"), None, "f").unwrap(),
            format!("content {i}").as_bytes()
        );
    }
}

#[test]
fn parallel_writes_within_one_update() {
    let base = tempfile::tempdir().unwrap();
    let repo = flat_repo(base.path());

    repo.update_object("o1", VersionInfo::new(), |u| {
        thread::scope(|scope| {
            for i in 0..8 {
                scope.spawn(move || {
                    u.write_bytes(
                        format!("body {i}").as_bytes(),
                        &format!("f{i}"),
                        UpdateOptions::default(),
                    )
                    .unwrap();
                });
            }
        });
        Ok(())
    })
    .unwrap();

    assert_eq!(repo.list_files("o1", None).unwrap().len(), 8);
    for i in 0..8 {
        assert_eq!(
            repo.read_file_to_vec("o1", None, &format!("f{i}")).unwrap(),
            format!("body {i}").as_bytes()
        );
    }
}

#[test]
fn failed_update_leaves_object_untouched() {
    let base = tempfile::tempdir().unwrap();
    let repo = flat_repo(base.path());
    repo.update_object("o1", VersionInfo::new(), |u| {
        u.write_bytes(b"v1", "f", UpdateOptions::default())?;
        Ok(())
    })
    .unwrap();

    let err = repo
        .update_object("o1", VersionInfo::new(), |u| {
            u.write_bytes(b"doomed", "g", UpdateOptions::default())?;
            Err(OcflError::NotFound("caller bailed".into()))
        })
        .unwrap_err();
    assert!(matches!(err, OcflError::NotFound(_)));

    let details = repo.describe_object("o1").unwrap();
    assert_eq!(details.head.num(), 1);
    assert!(!base.path().join("root/o1/v2").exists());
    // Staging was cleaned up.
    let work_entries: Vec<_> = std::fs::read_dir(base.path().join("work")).unwrap().collect();
    assert!(work_entries.is_empty(), "staging directories must not survive");
}

#[test]
fn object_lock_serializes_same_object() {
    let base = tempfile::tempdir().unwrap();
    let repo = flat_repo(base.path());

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let repo = repo.clone();
            thread::spawn(move || {
                repo.update_object("same", VersionInfo::new(), |u| {
                    u.write_bytes(
                        format!("{i}").as_bytes(),
                        &format!("f{i}"),
                        UpdateOptions::default(),
                    )?;
                    Ok(())
                })
            })
        })
        .collect();
    let ok = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(Result::is_ok)
        .count();
    assert!(ok >= 1);
    let details = repo.describe_object("same").unwrap();
    assert_eq!(details.head.num(), ok as u64);
}
