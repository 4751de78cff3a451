use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::path::Path;

use ocfl_types::spec::OBJECT_NAMASTE_PREFIX;
use parking_lot::RwLock;

use crate::error::{StorageError, StorageResult};
use crate::listing::Listing;
use crate::traits::{ObjectRootIter, ReadDebug, Storage};

#[derive(Clone)]
struct MemoryFile {
    content: Vec<u8>,
    media_type: Option<String>,
}

/// In-memory storage over a flat keyspace.
///
/// Directories are implicit in the keys, the way an object store's prefixes
/// are; `create_directories` tracks explicitly created empty directories so
/// listings behave like the filesystem backend. Intended for tests and as a
/// stand-in for an object-store backend.
#[derive(Default)]
pub struct MemoryStorage {
    files: RwLock<BTreeMap<String, MemoryFile>>,
    empty_dirs: RwLock<BTreeSet<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// The advisory media type recorded for a file, if any.
    pub fn media_type(&self, path: &str) -> Option<String> {
        self.files.read().get(path).and_then(|f| f.media_type.clone())
    }

    /// All file paths currently stored, sorted.
    pub fn all_paths(&self) -> Vec<String> {
        self.files.read().keys().cloned().collect()
    }

    fn dir_exists(&self, dir: &str) -> bool {
        if dir.is_empty() {
            return true;
        }
        let prefix = format!("{dir}/");
        self.files.read().keys().any(|k| k.starts_with(&prefix))
            || self
                .empty_dirs
                .read()
                .iter()
                .any(|d| d == dir || d.starts_with(&prefix))
    }

    /// Direct children of `dir`, reconstructed from the keyspace.
    fn children(&self, dir: &str) -> Vec<Listing> {
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{dir}/")
        };
        let mut names: BTreeMap<String, bool> = BTreeMap::new();
        for key in self.files.read().keys() {
            if let Some(rest) = key.strip_prefix(&prefix) {
                match rest.split_once('/') {
                    Some((first, _)) => {
                        names.insert(first.to_string(), true);
                    }
                    None => {
                        names.insert(rest.to_string(), false);
                    }
                }
            }
        }
        for d in self.empty_dirs.read().iter() {
            if let Some(rest) = d.strip_prefix(&prefix) {
                if !rest.is_empty() {
                    let first = rest.split('/').next().unwrap_or(rest);
                    names.insert(first.to_string(), true);
                }
            }
        }
        names
            .into_iter()
            .map(|(name, is_dir)| {
                if is_dir {
                    Listing::directory(name)
                } else {
                    Listing::file(name)
                }
            })
            .collect()
    }

    /// A file at `path` makes every ancestor directory non-empty; drop any
    /// stale markers.
    fn clear_markers_for_file(&self, path: &str) {
        self.empty_dirs
            .write()
            .retain(|d| !path.starts_with(&format!("{d}/")));
    }
}

impl Storage for MemoryStorage {
    fn list_directory(&self, directory: &str) -> StorageResult<Vec<Listing>> {
        if !self.dir_exists(directory) {
            return Err(StorageError::NotFound(directory.into()));
        }
        Ok(self.children(directory))
    }

    fn list_recursive(&self, directory: &str) -> StorageResult<Vec<Listing>> {
        if !self.dir_exists(directory) {
            return Err(StorageError::NotFound(directory.into()));
        }
        let prefix = if directory.is_empty() {
            String::new()
        } else {
            format!("{directory}/")
        };
        let mut listings: Vec<Listing> = self
            .files
            .read()
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix).map(Listing::file))
            .collect();
        for d in self.empty_dirs.read().iter() {
            if let Some(rest) = d.strip_prefix(&prefix) {
                if !rest.is_empty() {
                    listings.push(Listing::directory(rest));
                }
            }
        }
        listings.sort();
        Ok(listings)
    }

    fn iterate_objects(&self) -> StorageResult<ObjectRootIter> {
        // The keyspace is snapshotted up front; single-pass and finite.
        let roots: Vec<String> = self
            .files
            .read()
            .keys()
            .filter_map(|key| {
                let (dir, name) = match key.rsplit_once('/') {
                    Some((dir, name)) => (dir, name),
                    None => ("", key.as_str()),
                };
                name.starts_with(OBJECT_NAMASTE_PREFIX)
                    .then(|| dir.to_string())
            })
            .collect();
        Ok(Box::new(roots.into_iter().map(Ok)))
    }

    fn file_exists(&self, path: &str) -> StorageResult<bool> {
        Ok(self.files.read().contains_key(path))
    }

    fn read(&self, path: &str) -> StorageResult<Box<dyn ReadDebug + Send>> {
        let files = self.files.read();
        let file = files
            .get(path)
            .ok_or_else(|| StorageError::NotFound(path.into()))?;
        Ok(Box::new(Cursor::new(file.content.clone())))
    }

    fn write(&self, path: &str, content: &[u8], media_type: Option<&str>) -> StorageResult<()> {
        let mut files = self.files.write();
        if files.contains_key(path) {
            return Err(StorageError::AlreadyExists(path.into()));
        }
        files.insert(
            path.to_string(),
            MemoryFile {
                content: content.to_vec(),
                media_type: media_type.map(String::from),
            },
        );
        drop(files);
        self.clear_markers_for_file(path);
        Ok(())
    }

    fn create_directories(&self, path: &str) -> StorageResult<()> {
        if !path.is_empty() && !self.dir_exists(path) {
            self.empty_dirs.write().insert(path.to_string());
        }
        Ok(())
    }

    fn copy_directory_out_of(&self, source: &str, destination: &Path) -> StorageResult<()> {
        let listings = self.list_recursive(source)?;
        for listing in listings {
            let local = destination.join(&listing.relative);
            if listing.is_file() {
                let key = format!("{source}/{}", listing.relative);
                let content = self
                    .files
                    .read()
                    .get(&key)
                    .map(|f| f.content.clone())
                    .ok_or_else(|| StorageError::NotFound(key.clone()))?;
                if let Some(parent) = local.parent() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| StorageError::from_io(listing.relative.clone(), e))?;
                }
                std::fs::write(&local, content)
                    .map_err(|e| StorageError::from_io(listing.relative.clone(), e))?;
            } else {
                std::fs::create_dir_all(&local)
                    .map_err(|e| StorageError::from_io(listing.relative.clone(), e))?;
            }
        }
        Ok(())
    }

    fn copy_file_into(
        &self,
        source: &Path,
        destination: &str,
        media_type: Option<&str>,
    ) -> StorageResult<()> {
        let content = std::fs::read(source)
            .map_err(|e| StorageError::from_io(source.display().to_string(), e))?;
        self.files.write().insert(
            destination.to_string(),
            MemoryFile {
                content,
                media_type: media_type.map(String::from),
            },
        );
        self.clear_markers_for_file(destination);
        Ok(())
    }

    fn copy_file_internal(&self, source: &str, destination: &str) -> StorageResult<()> {
        let mut files = self.files.write();
        let file = files
            .get(source)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(source.into()))?;
        files.insert(destination.to_string(), file);
        drop(files);
        self.clear_markers_for_file(destination);
        Ok(())
    }

    fn move_directory_into(&self, source: &Path, destination: &str) -> StorageResult<()> {
        if self.dir_exists(destination) {
            return Err(StorageError::AlreadyExists(destination.into()));
        }
        for entry in walkdir::WalkDir::new(source).min_depth(1) {
            let entry = entry.map_err(|e| StorageError::Io {
                path: destination.into(),
                source: e.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(source)
                .unwrap_or(entry.path())
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            self.copy_file_into(entry.path(), &format!("{destination}/{rel}"), None)?;
        }
        std::fs::remove_dir_all(source)
            .map_err(|e| StorageError::from_io(source.display().to_string(), e))?;
        Ok(())
    }

    fn move_directory_internal(&self, source: &str, destination: &str) -> StorageResult<()> {
        if !self.dir_exists(source) {
            return Err(StorageError::NotFound(source.into()));
        }
        if self.dir_exists(destination) {
            return Err(StorageError::AlreadyExists(destination.into()));
        }
        let src_prefix = format!("{source}/");
        let mut files = self.files.write();
        let moved: Vec<String> = files
            .keys()
            .filter(|k| k.starts_with(&src_prefix))
            .cloned()
            .collect();
        for key in moved {
            let file = files.remove(&key).expect("key listed above");
            let new_key = format!("{destination}/{}", &key[src_prefix.len()..]);
            files.insert(new_key, file);
        }
        drop(files);
        let mut dirs = self.empty_dirs.write();
        let moved_dirs: Vec<String> = dirs
            .iter()
            .filter(|d| *d == source || d.starts_with(&src_prefix))
            .cloned()
            .collect();
        for dir in moved_dirs {
            dirs.remove(&dir);
            let rest = dir.strip_prefix(source).unwrap_or("");
            dirs.insert(format!("{destination}{rest}"));
        }
        drop(dirs);
        self.clear_markers_for_file(destination);
        Ok(())
    }

    fn delete_file(&self, path: &str) -> StorageResult<()> {
        self.files.write().remove(path);
        Ok(())
    }

    fn delete_directory(&self, path: &str) -> StorageResult<()> {
        let prefix = format!("{path}/");
        self.files.write().retain(|k, _| !k.starts_with(&prefix));
        self.empty_dirs
            .write()
            .retain(|d| d != path && !d.starts_with(&prefix));
        Ok(())
    }

    fn delete_empty_dirs_down(&self, path: &str) -> StorageResult<()> {
        // Only explicitly created empty dirs have any presence here.
        let prefix = format!("{path}/");
        self.empty_dirs
            .write()
            .retain(|d| d != path && !d.starts_with(&prefix));
        Ok(())
    }

    fn delete_empty_dirs_up(&self, path: &str) -> StorageResult<()> {
        let mut current = path.to_string();
        loop {
            if self
                .files
                .read()
                .keys()
                .any(|k| k.starts_with(&format!("{current}/")))
            {
                break;
            }
            self.empty_dirs.write().remove(&current);
            match current.rsplit_once('/') {
                Some((parent, _)) => current = parent.to_string(),
                None => break,
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("file_count", &self.files.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_roundtrip() {
        let storage = MemoryStorage::new();
        storage.write("a/b", b"data", Some("text/plain")).unwrap();
        assert_eq!(storage.read_to_string("a/b").unwrap(), "data");
        assert_eq!(storage.media_type("a/b").as_deref(), Some("text/plain"));
    }

    #[test]
    fn write_refuses_to_clobber() {
        let storage = MemoryStorage::new();
        storage.write("f", b"1", None).unwrap();
        assert!(matches!(
            storage.write("f", b"2", None).unwrap_err(),
            StorageError::AlreadyExists(_)
        ));
    }

    #[test]
    fn implicit_directories_list() {
        let storage = MemoryStorage::new();
        storage.write("obj/v1/content/f", b"x", None).unwrap();
        let listings = storage.list_directory("obj").unwrap();
        assert_eq!(listings, vec![Listing::directory("v1")]);
    }

    #[test]
    fn explicit_empty_dirs_survive_listing() {
        let storage = MemoryStorage::new();
        storage.create_directories("t/empty").unwrap();
        storage.write("t/f", b"x", None).unwrap();
        let mut listings = storage.list_recursive("t").unwrap();
        listings.sort();
        assert_eq!(
            listings,
            vec![Listing::file("f"), Listing::directory("empty")]
        );
    }

    #[test]
    fn move_directory_internal_moves_subtree() {
        let storage = MemoryStorage::new();
        storage.write("src/a/f", b"x", None).unwrap();
        storage.move_directory_internal("src", "dst").unwrap();
        assert!(storage.file_exists("dst/a/f").unwrap());
        assert!(!storage.file_exists("src/a/f").unwrap());
        assert!(matches!(
            storage.list_directory("src"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn iterate_objects_scans_keys() {
        let storage = MemoryStorage::new();
        storage
            .write("deep/obj/0=ocfl_object_1.1", b"ocfl_object_1.1\n", None)
            .unwrap();
        storage.write("deep/obj/v1/content/f", b"x", None).unwrap();
        let roots: Vec<String> = storage
            .iterate_objects()
            .unwrap()
            .collect::<StorageResult<_>>()
            .unwrap();
        assert_eq!(roots, vec!["deep/obj".to_string()]);
    }

    #[test]
    fn delete_directory_removes_subtree() {
        let storage = MemoryStorage::new();
        storage.write("d/a", b"1", None).unwrap();
        storage.write("d/b/c", b"2", None).unwrap();
        storage.write("keep", b"3", None).unwrap();
        storage.delete_directory("d").unwrap();
        assert!(!storage.file_exists("d/a").unwrap());
        assert!(storage.file_exists("keep").unwrap());
    }
}
