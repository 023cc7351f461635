//! Database facade.

use crate::collection::Collection;
use crate::config::Config;
use crate::dir::DatabaseDir;
use crate::error::{CoreError, CoreResult};
use crate::manifest::Manifest;
use crate::segment::SegmentFile;
use nanodb_storage::InMemoryBackend;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Longest accepted collection name, in bytes.
pub const MAX_COLLECTION_NAME_LEN: usize = 255;

/// The main database handle.
///
/// A database is a directory holding one segment file per collection plus a
/// manifest naming them. Collections are loaded on first use and stay
/// loaded until the database is closed.
///
/// # Opening a Database
///
/// ```no_run
/// use nanodb_core::Database;
/// use nanodb_codec::doc;
/// use std::path::Path;
///
/// let db = Database::open(Path::new("my_database"))?;
/// let users = db.collection("users")?;
/// let id = users.insert(doc! { "name" => "Kichu", "role" => "Dev" })?;
/// assert!(users.find_by_id(id)?.is_some());
/// db.close()?;
/// # Ok::<(), nanodb_core::CoreError>(())
/// ```
///
/// Only one handle may own a directory at a time; a second open of the same
/// path fails with [`CoreError::AlreadyOpen`] until the first is closed.
pub struct Database {
    config: Config,
    path: Option<PathBuf>,
    /// Holds the directory lock. `None` for in-memory databases and after
    /// close.
    dir: Mutex<Option<DatabaseDir>>,
    manifest: Mutex<Manifest>,
    collections: RwLock<HashMap<String, Collection>>,
    is_open: RwLock<bool>,
}

impl Database {
    /// Opens a database from a directory path with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another handle has the database open (`AlreadyOpen`)
    /// - The manifest is damaged or from a newer version (`InvalidFormat`)
    /// - I/O errors occur
    pub fn open(path: &Path) -> CoreResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens a database from a directory path with custom configuration.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open).
    pub fn open_with_config(path: &Path, config: Config) -> CoreResult<Self> {
        let dir = DatabaseDir::open(path, config.create_if_missing)?;

        let manifest = match dir.load_manifest()? {
            Some(manifest) => manifest,
            None => {
                let manifest = Manifest::new();
                dir.save_manifest(&manifest)?;
                manifest
            }
        };

        info!(
            path = %path.display(),
            collections = manifest.collections.len(),
            "opened database"
        );

        Ok(Self {
            config,
            path: Some(path.to_path_buf()),
            dir: Mutex::new(Some(dir)),
            manifest: Mutex::new(manifest),
            collections: RwLock::new(HashMap::new()),
            is_open: RwLock::new(true),
        })
    }

    /// Opens a database that lives only in memory.
    ///
    /// Nothing is written to disk and everything is gone once the handle
    /// is closed. Useful for tests.
    #[must_use]
    pub fn open_in_memory() -> Self {
        Self::open_in_memory_with_config(Config::default())
    }

    /// Opens an in-memory database with custom configuration.
    #[must_use]
    pub fn open_in_memory_with_config(config: Config) -> Self {
        Self {
            config,
            path: None,
            dir: Mutex::new(None),
            manifest: Mutex::new(Manifest::new()),
            collections: RwLock::new(HashMap::new()),
            is_open: RwLock::new(true),
        }
    }

    /// Returns a collection, creating it if it doesn't exist.
    ///
    /// The first call for a name loads the collection from its segment
    /// (or registers a new one in the manifest before returning it).
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The name is empty, longer than 255 bytes or contains control
    ///   characters (`InvalidCollectionName`)
    /// - The database is closed (`EngineClosed`)
    /// - The segment holds a damaged record (`CorruptRecord`)
    /// - I/O errors occur
    pub fn collection(&self, name: &str) -> CoreResult<Collection> {
        validate_collection_name(name)?;
        self.ensure_open()?;

        if let Some(collection) = self.collections.read().get(name) {
            return Ok(collection.clone());
        }

        let mut collections = self.collections.write();
        // close() may have started while we waited for the lock.
        self.ensure_open()?;
        if let Some(collection) = collections.get(name) {
            return Ok(collection.clone());
        }

        let collection = Collection::open(name, self.open_segment(name)?, self.config.clone())?;
        collections.insert(name.to_string(), collection.clone());
        Ok(collection)
    }

    /// Creates a collection, or returns it if it already exists.
    ///
    /// # Errors
    ///
    /// Same as [`collection`](Self::collection).
    pub fn create_collection(&self, name: &str) -> CoreResult<Collection> {
        self.collection(name)
    }

    /// Returns the names of all collections, sorted.
    ///
    /// Includes collections created in earlier sessions that have not been
    /// loaded yet.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EngineClosed`] if the database is closed.
    pub fn list_collections(&self) -> CoreResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self
            .manifest
            .lock()
            .collection_names()
            .map(str::to_string)
            .collect())
    }

    /// Closes the database.
    ///
    /// New calls fail with [`CoreError::EngineClosed`] from here on. Each
    /// loaded collection is closed after its in-flight operations finish,
    /// the manifest is saved, and the directory lock is released.
    /// Closing an already closed database does nothing.
    ///
    /// # Errors
    ///
    /// Returns the first error hit while syncing segments or saving the
    /// manifest. Every collection is still closed and the lock released.
    pub fn close(&self) -> CoreResult<()> {
        {
            let mut is_open = self.is_open.write();
            if !*is_open {
                return Ok(());
            }
            *is_open = false;
        }

        let collections = std::mem::take(&mut *self.collections.write());
        let mut first_error = None;
        for (name, collection) in collections {
            if let Err(err) = collection.close() {
                warn!(collection = %name, error = %err, "failed to flush collection on close");
                first_error.get_or_insert(err);
            }
        }

        let manifest = self.manifest.lock();
        if let Some(dir) = self.dir.lock().take() {
            if let Err(err) = dir.save_manifest(&manifest) {
                warn!(error = %err, "failed to save manifest on close");
                first_error.get_or_insert(err);
            }
        }

        match &self.path {
            Some(path) => info!(path = %path.display(), "closed database"),
            None => info!("closed in-memory database"),
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Checks if the database is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.is_open.read()
    }

    /// Returns the database directory, or `None` for in-memory databases.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns database configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if *self.is_open.read() {
            Ok(())
        } else {
            Err(CoreError::EngineClosed)
        }
    }

    /// Opens the segment for `name`, registering the collection first if
    /// it is new. Called with the collection registry write-locked.
    fn open_segment(&self, name: &str) -> CoreResult<SegmentFile> {
        let mut manifest = self.manifest.lock();
        let (segment_id, created) = manifest.get_or_create_collection(name);

        let dir = self.dir.lock();
        let Some(dir) = dir.as_ref() else {
            return Ok(SegmentFile::with_backend(
                name,
                Box::new(InMemoryBackend::new()),
                false,
            ));
        };

        if created {
            if let Err(err) = dir.save_manifest(&manifest) {
                manifest.collections.remove(name);
                return Err(err);
            }
            debug!(collection = name, segment_id, "created collection");
        }

        SegmentFile::open(name, &dir.segment_path(segment_id), self.config.sync_on_write)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("is_open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "error closing database on drop");
        }
    }
}

/// Checks that `name` can be used as a collection name.
///
/// # Errors
///
/// Returns [`CoreError::InvalidCollectionName`] if the name is empty, longer
/// than [`MAX_COLLECTION_NAME_LEN`] bytes, or contains control characters.
pub fn validate_collection_name(name: &str) -> CoreResult<()> {
    if name.is_empty() {
        return Err(CoreError::invalid_collection_name(name, "name is empty"));
    }
    if name.len() > MAX_COLLECTION_NAME_LEN {
        return Err(CoreError::invalid_collection_name(
            name,
            "name is longer than 255 bytes",
        ));
    }
    if name.chars().any(char::is_control) {
        return Err(CoreError::invalid_collection_name(
            name,
            "name contains control characters",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nanodb_codec::{doc, Value};
    use std::sync::mpsc;
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn open_in_memory() {
        let db = Database::open_in_memory();
        assert!(db.is_open());
        assert!(db.path().is_none());

        let users = db.collection("users").unwrap();
        users.insert(doc! { "name" => "Kichu" }).unwrap();
        assert_eq!(db.list_collections().unwrap(), vec!["users"]);
    }

    #[test]
    fn collection_handles_share_state() {
        let db = Database::open_in_memory();
        let a = db.collection("users").unwrap();
        let b = db.create_collection("users").unwrap();
        a.insert(doc! { "n" => 1 }).unwrap();
        assert_eq!(b.len().unwrap(), 1);
    }

    #[test]
    fn collections_are_independent() {
        let db = Database::open_in_memory();
        let users = db.collection("users").unwrap();
        let posts = db.collection("posts").unwrap();
        users.insert(doc! {}).unwrap();
        users.insert(doc! {}).unwrap();
        let first_post = posts.insert(doc! {}).unwrap();
        assert_eq!(first_post.as_u64(), 1);
        assert_eq!(
            db.list_collections().unwrap(),
            vec!["posts".to_string(), "users".to_string()]
        );
    }

    #[test]
    fn names_are_validated() {
        let db = Database::open_in_memory();
        let too_long = "x".repeat(256);
        for bad in ["", "a\nb", "tab\there", too_long.as_str()] {
            assert!(
                matches!(
                    db.collection(bad),
                    Err(CoreError::InvalidCollectionName { .. })
                ),
                "accepted {bad:?}"
            );
        }
        db.collection(&"x".repeat(255)).unwrap();
        db.collection("Users").unwrap();
        db.collection("users").unwrap();
        db.collection("名前").unwrap();
        assert_eq!(db.list_collections().unwrap().len(), 4);
    }

    #[test]
    fn reopen_restores_collections() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("db");

        {
            let db = Database::open(&path).unwrap();
            let users = db.collection("users").unwrap();
            users.insert(doc! { "name" => "Kichu", "role" => "Dev" }).unwrap();
            users.insert(doc! { "name" => "Anu", "role" => "Ops" }).unwrap();
            users.delete_by_id(crate::DocumentId::new(1).unwrap()).unwrap();
            db.collection("empty").unwrap();
            db.close().unwrap();
        }

        let db = Database::open(&path).unwrap();
        assert_eq!(db.list_collections().unwrap(), vec!["empty", "users"]);
        let users = db.collection("users").unwrap();
        let all = users.find(&doc! {}, 0, 0).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].get("name"), Some(&Value::from("Anu")));
        assert_eq!(users.insert(doc! {}).unwrap().as_u64(), 3);
    }

    #[test]
    fn second_open_is_rejected() {
        let temp = tempdir().unwrap();
        let db = Database::open(temp.path()).unwrap();

        assert!(matches!(
            Database::open(temp.path()),
            Err(CoreError::AlreadyOpen { .. })
        ));

        db.close().unwrap();
        Database::open(temp.path()).unwrap();
    }

    #[test]
    fn missing_directory_without_create() {
        let temp = tempdir().unwrap();
        let config = Config::new().create_if_missing(false);
        assert!(Database::open_with_config(&temp.path().join("nope"), config).is_err());
    }

    #[test]
    fn close_is_idempotent_and_final() {
        let db = Database::open_in_memory();
        let users = db.collection("users").unwrap();

        db.close().unwrap();
        db.close().unwrap();
        assert!(!db.is_open());

        assert!(matches!(db.collection("users"), Err(CoreError::EngineClosed)));
        assert!(matches!(db.list_collections(), Err(CoreError::EngineClosed)));
        assert!(matches!(users.insert(doc! {}), Err(CoreError::EngineClosed)));
    }

    #[test]
    fn drop_releases_lock() {
        let temp = tempdir().unwrap();
        {
            let db = Database::open(temp.path()).unwrap();
            db.collection("users").unwrap().insert(doc! { "v" => 1 }).unwrap();
        }
        let db = Database::open(temp.path()).unwrap();
        assert_eq!(db.collection("users").unwrap().len().unwrap(), 1);
    }

    #[test]
    fn close_waits_for_in_flight_batch() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("db");
        let db = Database::open(&path).unwrap();
        let users = db.collection("users").unwrap();
        let (started_tx, started_rx) = mpsc::channel();

        let writer = thread::spawn(move || {
            // Documents are produced while the batch holds the write lock.
            let docs = (0..5_000i64).map(move |n| {
                if n == 0 {
                    started_tx.send(()).unwrap();
                }
                doc! { "n" => n }
            });
            users.insert_many(docs)
        });

        started_rx.recv().unwrap();
        db.close().unwrap();

        let outcome = writer.join().unwrap().unwrap();
        assert!(outcome.is_complete());
        assert_eq!(outcome.len(), 5_000);

        let db = Database::open(&path).unwrap();
        let users = db.collection("users").unwrap();
        assert_eq!(users.len().unwrap(), 5_000);
        assert_eq!(users.insert(doc! {}).unwrap().as_u64(), 5_001);
    }
}
