use std::io::Read;
use std::path::Path;

use tracing::warn;

use crate::error::{StorageError, StorageResult};
use crate::listing::Listing;

/// A readable stream that can also be `Debug`-printed, used as the return
/// type of [`Storage::read`] so error results are `unwrap_err`-able.
pub trait ReadDebug: Read + std::fmt::Debug {}
impl<T: Read + std::fmt::Debug> ReadDebug for T {}

/// A lazy, finite, single-pass iterator over object-root paths.
pub type ObjectRootIter = Box<dyn Iterator<Item = StorageResult<String>> + Send>;

/// Byte-level operations over a hierarchical namespace.
///
/// Paths are forward-slash-separated strings relative to the storage root;
/// `""` addresses the root itself. Implementations must be safe to share
/// across threads.
///
/// All implementations must satisfy these invariants:
/// - `write` is atomic with respect to readers and fails with
///   [`StorageError::AlreadyExists`] when the destination exists.
/// - Directory moves fail with `AlreadyExists` when the destination exists
///   and should be rename-equivalent when the backend allows.
/// - Failures surface as [`StorageError::Io`] unless a more specific
///   variant applies.
pub trait Storage: Send + Sync {
    /// List one level of a directory. Fails with `NotFound` if it does not
    /// exist.
    fn list_directory(&self, directory: &str) -> StorageResult<Vec<Listing>>;

    /// List a directory tree: files and *empty* directories only. Non-empty
    /// directories are implied by their contents.
    fn list_recursive(&self, directory: &str) -> StorageResult<Vec<Listing>>;

    /// Iterate the paths of every object root under the storage root. An
    /// object root is any directory containing a `0=ocfl_object_*` namaste
    /// file. The iterator is finite and not restartable; behavior is
    /// undefined if the repository is mutated during iteration.
    fn iterate_objects(&self) -> StorageResult<ObjectRootIter>;

    fn file_exists(&self, path: &str) -> StorageResult<bool>;

    /// Open a file for streaming reads.
    fn read(&self, path: &str) -> StorageResult<Box<dyn ReadDebug + Send>>;

    fn read_to_string(&self, path: &str) -> StorageResult<String> {
        let mut out = String::new();
        self.read(path)?
            .read_to_string(&mut out)
            .map_err(|e| StorageError::from_io(path, e))?;
        Ok(out)
    }

    /// Write a file. The media type is advisory; filesystem backends ignore
    /// it.
    fn write(&self, path: &str, content: &[u8], media_type: Option<&str>) -> StorageResult<()>;

    /// Create a directory and any missing parents. Idempotent.
    fn create_directories(&self, path: &str) -> StorageResult<()>;

    /// Copy a directory tree out of storage to a local destination.
    fn copy_directory_out_of(&self, source: &str, destination: &Path) -> StorageResult<()>;

    /// Copy a local file into storage, replacing any existing destination.
    fn copy_file_into(
        &self,
        source: &Path,
        destination: &str,
        media_type: Option<&str>,
    ) -> StorageResult<()>;

    /// Copy a file within storage, replacing any existing destination.
    fn copy_file_internal(&self, source: &str, destination: &str) -> StorageResult<()>;

    /// Move a local directory into storage.
    fn move_directory_into(&self, source: &Path, destination: &str) -> StorageResult<()>;

    /// Move a directory within storage.
    fn move_directory_internal(&self, source: &str, destination: &str) -> StorageResult<()>;

    /// Delete a file. Deleting a missing file is not an error.
    fn delete_file(&self, path: &str) -> StorageResult<()>;

    /// Best-effort batch delete: failures are logged, collected, and
    /// reported together after every path has been attempted.
    fn delete_files(&self, paths: &[String]) -> StorageResult<()> {
        let mut failed = Vec::new();
        for path in paths {
            if let Err(e) = self.delete_file(path) {
                warn!(path = %path, error = %e, "failed to delete file");
                failed.push(path.clone());
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(StorageError::BatchDelete { failed })
        }
    }

    /// Delete a directory tree. Deleting a missing directory is not an
    /// error.
    fn delete_directory(&self, path: &str) -> StorageResult<()>;

    /// Delete every empty directory at or below `path`, including `path`
    /// itself if it ends up empty.
    fn delete_empty_dirs_down(&self, path: &str) -> StorageResult<()>;

    /// Delete `path` if it is an empty directory, then each parent that
    /// becomes empty, stopping below the storage root.
    fn delete_empty_dirs_up(&self, path: &str) -> StorageResult<()>;
}
