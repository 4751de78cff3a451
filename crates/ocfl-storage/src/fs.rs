use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Component, Path, PathBuf};

use ocfl_types::spec::OBJECT_NAMASTE_PREFIX;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{StorageError, StorageResult};
use crate::listing::Listing;
use crate::traits::{ObjectRootIter, ReadDebug, Storage};

/// Filesystem-backed storage rooted at a directory.
///
/// Relative forward-slash paths are resolved against the root. Writes go
/// through a temp file in the destination directory followed by a rename,
/// so readers never observe partial contents. Moves are plain renames with
/// a copy-and-delete fallback for cross-device sources.
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Create storage over `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StorageError::from_io(root.display().to_string(), e))?;
        Ok(Self { root })
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(path);
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return Err(StorageError::Io {
                path: path.into(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "path escapes storage root"),
            });
        }
        Ok(self.root.join(relative))
    }

    fn relative_of(&self, full: &Path) -> String {
        let rel = full.strip_prefix(&self.root).unwrap_or(full);
        path_to_string(rel)
    }
}

fn path_to_string(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_dir_empty(path: &Path) -> io::Result<bool> {
    Ok(fs::read_dir(path)?.next().is_none())
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Move a directory by rename, falling back to copy-and-delete when the
/// rename fails (typically a cross-device source).
fn move_dir(src: &Path, dst: &Path) -> io::Result<()> {
    if dst.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            dst.display().to_string(),
        ));
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(e),
        Err(e) => {
            debug!(error = %e, "rename failed; falling back to copy");
            copy_dir_recursive(src, dst)?;
            fs::remove_dir_all(src)
        }
    }
}

impl Storage for FsStorage {
    fn list_directory(&self, directory: &str) -> StorageResult<Vec<Listing>> {
        let full = self.resolve(directory)?;
        let entries =
            fs::read_dir(&full).map_err(|e| StorageError::from_io(directory, e))?;
        let mut listings = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::from_io(directory, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry
                .file_type()
                .map_err(|e| StorageError::from_io(directory, e))?;
            listings.push(if file_type.is_file() {
                Listing::file(name)
            } else if file_type.is_dir() {
                Listing::directory(name)
            } else {
                Listing::other(name)
            });
        }
        Ok(listings)
    }

    fn list_recursive(&self, directory: &str) -> StorageResult<Vec<Listing>> {
        let full = self.resolve(directory)?;
        if !full.is_dir() {
            return Err(StorageError::NotFound(directory.into()));
        }
        let mut listings = Vec::new();
        for entry in WalkDir::new(&full).min_depth(1) {
            let entry = entry.map_err(|e| StorageError::Io {
                path: directory.into(),
                source: e.into(),
            })?;
            let rel = path_to_string(entry.path().strip_prefix(&full).unwrap_or(entry.path()));
            if entry.file_type().is_file() {
                listings.push(Listing::file(rel));
            } else if entry.file_type().is_dir() {
                let empty = is_dir_empty(entry.path())
                    .map_err(|e| StorageError::from_io(rel.clone(), e))?;
                if empty {
                    listings.push(Listing::directory(rel));
                }
            } else {
                listings.push(Listing::other(rel));
            }
        }
        Ok(listings)
    }

    fn iterate_objects(&self) -> StorageResult<ObjectRootIter> {
        Ok(Box::new(FsObjectIter {
            root: self.root.clone(),
            stack: vec![self.root.clone()],
        }))
    }

    fn file_exists(&self, path: &str) -> StorageResult<bool> {
        Ok(self.resolve(path)?.is_file())
    }

    fn read(&self, path: &str) -> StorageResult<Box<dyn ReadDebug + Send>> {
        let full = self.resolve(path)?;
        let file = File::open(full).map_err(|e| StorageError::from_io(path, e))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn write(&self, path: &str, content: &[u8], _media_type: Option<&str>) -> StorageResult<()> {
        let full = self.resolve(path)?;
        if full.exists() {
            return Err(StorageError::AlreadyExists(path.into()));
        }
        let parent = full
            .parent()
            .ok_or_else(|| StorageError::NotFound(path.into()))?;
        fs::create_dir_all(parent).map_err(|e| StorageError::from_io(path, e))?;
        let mut temp = tempfile::Builder::new()
            .prefix(".ocfl-write-")
            .tempfile_in(parent)
            .map_err(|e| StorageError::from_io(path, e))?;
        temp.write_all(content)
            .map_err(|e| StorageError::from_io(path, e))?;
        temp.persist_noclobber(&full)
            .map_err(|e| StorageError::from_io(path, e.error))?;
        Ok(())
    }

    fn create_directories(&self, path: &str) -> StorageResult<()> {
        let full = self.resolve(path)?;
        fs::create_dir_all(full).map_err(|e| StorageError::from_io(path, e))
    }

    fn copy_directory_out_of(&self, source: &str, destination: &Path) -> StorageResult<()> {
        let full = self.resolve(source)?;
        if !full.is_dir() {
            return Err(StorageError::NotFound(source.into()));
        }
        copy_dir_recursive(&full, destination).map_err(|e| StorageError::from_io(source, e))
    }

    fn copy_file_into(
        &self,
        source: &Path,
        destination: &str,
        _media_type: Option<&str>,
    ) -> StorageResult<()> {
        let full = self.resolve(destination)?;
        let parent = full
            .parent()
            .ok_or_else(|| StorageError::NotFound(destination.into()))?;
        fs::create_dir_all(parent).map_err(|e| StorageError::from_io(destination, e))?;
        let temp = tempfile::Builder::new()
            .prefix(".ocfl-copy-")
            .tempfile_in(parent)
            .map_err(|e| StorageError::from_io(destination, e))?;
        fs::copy(source, temp.path())
            .map_err(|e| StorageError::from_io(source.display().to_string(), e))?;
        temp.persist(&full)
            .map_err(|e| StorageError::from_io(destination, e.error))?;
        Ok(())
    }

    fn copy_file_internal(&self, source: &str, destination: &str) -> StorageResult<()> {
        let src = self.resolve(source)?;
        self.copy_file_into(&src, destination, None)
    }

    fn move_directory_into(&self, source: &Path, destination: &str) -> StorageResult<()> {
        let dst = self.resolve(destination)?;
        move_dir(source, &dst).map_err(|e| StorageError::from_io(destination, e))
    }

    fn move_directory_internal(&self, source: &str, destination: &str) -> StorageResult<()> {
        let src = self.resolve(source)?;
        let dst = self.resolve(destination)?;
        if !src.is_dir() {
            return Err(StorageError::NotFound(source.into()));
        }
        move_dir(&src, &dst).map_err(|e| StorageError::from_io(destination, e))
    }

    fn delete_file(&self, path: &str) -> StorageResult<()> {
        let full = self.resolve(path)?;
        match fs::remove_file(full) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::from_io(path, e)),
        }
    }

    fn delete_directory(&self, path: &str) -> StorageResult<()> {
        let full = self.resolve(path)?;
        match fs::remove_dir_all(full) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::from_io(path, e)),
        }
    }

    fn delete_empty_dirs_down(&self, path: &str) -> StorageResult<()> {
        let full = self.resolve(path)?;
        if !full.is_dir() {
            return Ok(());
        }
        for entry in WalkDir::new(&full).contents_first(true) {
            let entry = entry.map_err(|e| StorageError::Io {
                path: path.into(),
                source: e.into(),
            })?;
            if entry.file_type().is_dir()
                && is_dir_empty(entry.path()).unwrap_or(false)
            {
                // A concurrent writer may repopulate the dir; losing that
                // race is fine, removal is opportunistic.
                let _ = fs::remove_dir(entry.path());
            }
        }
        Ok(())
    }

    fn delete_empty_dirs_up(&self, path: &str) -> StorageResult<()> {
        let mut current = self.resolve(path)?;
        while current != self.root {
            if !current.is_dir() || !is_dir_empty(&current).unwrap_or(false) {
                break;
            }
            fs::remove_dir(&current)
                .map_err(|e| StorageError::from_io(self.relative_of(&current), e))?;
            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for FsStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsStorage").field("root", &self.root).finish()
    }
}

/// Depth-first search for object roots. Does not descend into a directory
/// once its namaste file is found, so object contents are never scanned.
struct FsObjectIter {
    root: PathBuf,
    stack: Vec<PathBuf>,
}

impl Iterator for FsObjectIter {
    type Item = StorageResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(dir) = self.stack.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    return Some(Err(StorageError::from_io(
                        dir.display().to_string(),
                        e,
                    )))
                }
            };
            let mut subdirs = Vec::new();
            let mut is_object_root = false;
            for entry in entries {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        return Some(Err(StorageError::from_io(
                            dir.display().to_string(),
                            e,
                        )))
                    }
                };
                let name = entry.file_name().to_string_lossy().into_owned();
                match entry.file_type() {
                    Ok(ft) if ft.is_file() && name.starts_with(OBJECT_NAMASTE_PREFIX) => {
                        is_object_root = true;
                    }
                    Ok(ft) if ft.is_dir() => subdirs.push(entry.path()),
                    _ => {}
                }
            }
            if is_object_root {
                let rel = dir
                    .strip_prefix(&self.root)
                    .map(path_to_string)
                    .unwrap_or_default();
                return Some(Ok(rel));
            }
            self.stack.extend(subdirs);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::ListingType;

    fn storage() -> (tempfile::TempDir, FsStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path()).unwrap();
        (dir, storage)
    }

    #[test]
    fn write_and_read_roundtrip() {
        let (_dir, storage) = storage();
        storage.write("a/b/file.txt", b"contents", None).unwrap();
        assert!(storage.file_exists("a/b/file.txt").unwrap());
        assert_eq!(storage.read_to_string("a/b/file.txt").unwrap(), "contents");
    }

    #[test]
    fn write_refuses_to_clobber() {
        let (_dir, storage) = storage();
        storage.write("f", b"1", None).unwrap();
        let err = storage.write("f", b"2", None).unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
        assert_eq!(storage.read_to_string("f").unwrap(), "1");
    }

    #[test]
    fn read_missing_is_not_found() {
        let (_dir, storage) = storage();
        assert!(matches!(
            storage.read("missing").unwrap_err(),
            StorageError::NotFound(_)
        ));
    }

    #[test]
    fn parent_traversal_is_rejected() {
        let (_dir, storage) = storage();
        assert!(storage.write("../escape", b"x", None).is_err());
    }

    #[test]
    fn list_directory_reports_types() {
        let (_dir, storage) = storage();
        storage.write("d/file", b"x", None).unwrap();
        storage.create_directories("d/sub").unwrap();
        let mut listings = storage.list_directory("d").unwrap();
        listings.sort();
        assert_eq!(listings, vec![Listing::file("file"), Listing::directory("sub")]);
    }

    #[test]
    fn list_directory_missing_is_not_found() {
        let (_dir, storage) = storage();
        assert!(matches!(
            storage.list_directory("nope").unwrap_err(),
            StorageError::NotFound(_)
        ));
    }

    #[test]
    fn list_recursive_reports_files_and_empty_dirs_only() {
        let (_dir, storage) = storage();
        storage.write("t/a/f1", b"1", None).unwrap();
        storage.write("t/a/b/f2", b"2", None).unwrap();
        storage.create_directories("t/empty").unwrap();
        let mut listings = storage.list_recursive("t").unwrap();
        listings.sort();
        assert_eq!(
            listings,
            vec![
                Listing::file("a/b/f2"),
                Listing::file("a/f1"),
                Listing::directory("empty"),
            ]
        );
        assert!(!listings.iter().any(|l| l.relative == "a" && l.kind == ListingType::Directory));
    }

    #[test]
    fn move_directory_internal_renames() {
        let (_dir, storage) = storage();
        storage.write("src/f", b"x", None).unwrap();
        storage.move_directory_internal("src", "dst/inner").unwrap();
        assert!(storage.file_exists("dst/inner/f").unwrap());
        assert!(!storage.file_exists("src/f").unwrap());
    }

    #[test]
    fn move_directory_refuses_existing_destination() {
        let (_dir, storage) = storage();
        storage.write("src/f", b"x", None).unwrap();
        storage.create_directories("dst").unwrap();
        let err = storage.move_directory_internal("src", "dst").unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
    }

    #[test]
    fn move_directory_into_from_local() {
        let (_dir, storage) = storage();
        let local = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(local.path().join("v1/content")).unwrap();
        std::fs::write(local.path().join("v1/content/f"), b"x").unwrap();
        storage
            .move_directory_into(&local.path().join("v1"), "obj/v1")
            .unwrap();
        assert!(storage.file_exists("obj/v1/content/f").unwrap());
    }

    #[test]
    fn copy_file_internal_replaces_destination() {
        let (_dir, storage) = storage();
        storage.write("a", b"new", None).unwrap();
        storage.write("b", b"old", None).unwrap();
        storage.copy_file_internal("a", "b").unwrap();
        assert_eq!(storage.read_to_string("b").unwrap(), "new");
    }

    #[test]
    fn delete_file_is_idempotent() {
        let (_dir, storage) = storage();
        storage.write("f", b"x", None).unwrap();
        storage.delete_file("f").unwrap();
        storage.delete_file("f").unwrap();
        assert!(!storage.file_exists("f").unwrap());
    }

    #[test]
    fn delete_files_collects_failures() {
        let (_dir, storage) = storage();
        storage.write("ok", b"x", None).unwrap();
        // Deleting missing files is fine, so this batch fully succeeds.
        storage
            .delete_files(&["ok".into(), "missing".into()])
            .unwrap();
    }

    #[test]
    fn delete_empty_dirs_down_prunes_tree() {
        let (_dir, storage) = storage();
        storage.create_directories("t/a/b").unwrap();
        storage.create_directories("t/c").unwrap();
        storage.write("t/keep/f", b"x", None).unwrap();
        storage.delete_empty_dirs_down("t").unwrap();
        assert!(storage.file_exists("t/keep/f").unwrap());
        let listings = storage.list_directory("t").unwrap();
        assert_eq!(listings, vec![Listing::directory("keep")]);
    }

    #[test]
    fn delete_empty_dirs_up_stops_at_occupied_parent() {
        let (_dir, storage) = storage();
        storage.create_directories("a/b/c").unwrap();
        storage.write("a/f", b"x", None).unwrap();
        storage.delete_empty_dirs_up("a/b/c").unwrap();
        assert!(matches!(
            storage.list_directory("a/b"),
            Err(StorageError::NotFound(_))
        ));
        assert!(storage.file_exists("a/f").unwrap());
    }

    #[test]
    fn iterate_objects_finds_namaste_roots() {
        let (_dir, storage) = storage();
        storage
            .write("x/y/obj1/0=ocfl_object_1.1", b"ocfl_object_1.1\n", None)
            .unwrap();
        storage
            .write("obj2/0=ocfl_object_1.1", b"ocfl_object_1.1\n", None)
            .unwrap();
        storage.write("x/y/obj1/v1/content/f", b"x", None).unwrap();
        let mut roots: Vec<String> = storage
            .iterate_objects()
            .unwrap()
            .collect::<StorageResult<_>>()
            .unwrap();
        roots.sort();
        assert_eq!(roots, vec!["obj2".to_string(), "x/y/obj1".to_string()]);
    }

    #[test]
    fn copy_directory_out_of_storage() {
        let (_dir, storage) = storage();
        storage.write("src/a/f", b"data", None).unwrap();
        let local = tempfile::tempdir().unwrap();
        let dst = local.path().join("out");
        storage.copy_directory_out_of("src", &dst).unwrap();
        assert_eq!(std::fs::read(dst.join("a/f")).unwrap(), b"data");
    }
}
