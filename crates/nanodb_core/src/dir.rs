//! Database directory management.
//!
//! This module handles the file system layout for NanoDB:
//!
//! ```text
//! <db_path>/
//! ├─ LOCK                  # Advisory lock, held while the database is open
//! ├─ MANIFEST              # Collection name → segment file mapping
//! └─ collections/
//!    └─ col-000001.log     # Append-only segment per collection
//! ```

use crate::error::{CoreError, CoreResult};
use crate::manifest::Manifest;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const MANIFEST_FILE: &str = "MANIFEST";
const MANIFEST_TEMP: &str = "MANIFEST.tmp";
const LOCK_FILE: &str = "LOCK";
const COLLECTIONS_DIR: &str = "collections";

/// An open database directory.
///
/// Holds an exclusive lock on `LOCK` for as long as it lives, so only one
/// `DatabaseDir` (in this process or any other) can own a path at a time.
#[derive(Debug)]
pub struct DatabaseDir {
    path: PathBuf,
    /// Lock file handle; dropping it releases the lock.
    _lock_file: File,
}

impl DatabaseDir {
    /// Opens or creates a database directory and takes its lock.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - The lock is held elsewhere ([`CoreError::AlreadyOpen`])
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_format(format!(
                    "database directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(CoreError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::AlreadyOpen {
                path: path.to_path_buf(),
            });
        }

        fs::create_dir_all(path.join(COLLECTIONS_DIR))?;

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the MANIFEST file.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.path.join(MANIFEST_FILE)
    }

    /// Returns the directory holding collection segments.
    #[must_use]
    pub fn collections_dir(&self) -> PathBuf {
        self.path.join(COLLECTIONS_DIR)
    }

    /// Returns the path of a segment file, e.g. `collections/col-000001.log`.
    #[must_use]
    pub fn segment_path(&self, segment_id: u64) -> PathBuf {
        self.collections_dir()
            .join(format!("col-{segment_id:06}.log"))
    }

    /// Loads the manifest from disk.
    ///
    /// Returns `None` if there is no manifest yet (new database).
    pub fn load_manifest(&self) -> CoreResult<Option<Manifest>> {
        let manifest_path = self.manifest_path();
        if !manifest_path.exists() {
            return Ok(None);
        }

        let data = fs::read(&manifest_path)?;
        if data.is_empty() {
            return Ok(None);
        }

        Ok(Some(Manifest::decode(&data)?))
    }

    /// Saves the manifest atomically.
    ///
    /// Writes a temporary file, syncs it, renames it over `MANIFEST`, then
    /// syncs the directory so the rename itself is durable.
    pub fn save_manifest(&self, manifest: &Manifest) -> CoreResult<()> {
        let temp_path = self.path.join(MANIFEST_TEMP);

        let mut file = File::create(&temp_path)?;
        file.write_all(&manifest.encode())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, self.manifest_path())?;
        sync_directory(&self.path)
    }
}

/// Syncs a directory so that entries created or renamed in it are durable.
#[cfg(unix)]
pub(crate) fn sync_directory(path: &Path) -> CoreResult<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

/// NTFS journals metadata; there is no directory handle to sync.
#[cfg(not(unix))]
pub(crate) fn sync_directory(_path: &Path) -> CoreResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_layout() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("new_db");

        let dir = DatabaseDir::open(&db_path, true).unwrap();
        assert!(db_path.join("LOCK").exists());
        assert!(dir.collections_dir().is_dir());
        assert_eq!(dir.collections_dir(), db_path.join("collections"));
    }

    #[test]
    fn open_fails_if_not_exists_and_no_create() {
        let temp = tempdir().unwrap();
        let result = DatabaseDir::open(&temp.path().join("nonexistent"), false);
        assert!(matches!(result, Err(CoreError::InvalidFormat { .. })));
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("locked_db");

        let _dir1 = DatabaseDir::open(&db_path, true).unwrap();
        let result = DatabaseDir::open(&db_path, true);
        assert!(matches!(result, Err(CoreError::AlreadyOpen { path }) if path == db_path));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("reopen_db");

        drop(DatabaseDir::open(&db_path, true).unwrap());
        DatabaseDir::open(&db_path, true).unwrap();
    }

    #[test]
    fn manifest_round_trip() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("manifest_db");
        let dir = DatabaseDir::open(&db_path, true).unwrap();

        assert!(dir.load_manifest().unwrap().is_none());

        let mut manifest = Manifest::new();
        manifest.get_or_create_collection("users");
        manifest.get_or_create_collection("posts");
        dir.save_manifest(&manifest).unwrap();

        let loaded = dir.load_manifest().unwrap().unwrap();
        assert_eq!(loaded.collections.get("users"), Some(&1));
        assert_eq!(loaded.collections.get("posts"), Some(&2));
        assert!(!db_path.join(MANIFEST_TEMP).exists());
    }

    #[test]
    fn paths_are_correct() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("paths_db");
        let dir = DatabaseDir::open(&db_path, true).unwrap();

        assert_eq!(dir.manifest_path(), db_path.join("MANIFEST"));
        assert_eq!(
            dir.segment_path(7),
            db_path.join("collections").join("col-000007.log")
        );
    }
}
