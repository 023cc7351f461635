//! Test fixtures and database helpers.
//!
//! Provides convenience functions for setting up test databases
//! and common test scenarios.

use nanodb_codec::{doc, Document};
use nanodb_core::{Config, Database};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Name of the collection used by the 50,000 record benchmark scenario.
pub const BENCHMARK_COLLECTION: &str = "benchmark_users";

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    config: Config,
    /// Kept alive so the directory outlives the database.
    temp_dir: Option<TempDir>,
}

impl TestDatabase {
    /// Creates a new in-memory test database.
    pub fn memory() -> Self {
        Self {
            db: Database::open_in_memory(),
            config: Config::default(),
            temp_dir: None,
        }
    }

    /// Creates a new database in a fresh temporary directory.
    pub fn file() -> Self {
        Self::file_with_config(Config::default())
    }

    /// Creates a new file-backed database with custom configuration.
    pub fn file_with_config(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open_with_config(&temp_dir.path().join("db"), config.clone())
            .expect("Failed to open file database");
        Self {
            db,
            config,
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the database path if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.db.path().map(Path::to_path_buf)
    }

    /// Closes the database and opens the same directory again.
    ///
    /// # Panics
    ///
    /// Panics for in-memory databases, which cannot be reopened.
    pub fn reopen(self) -> Self {
        let path = self.path().expect("in-memory databases cannot be reopened");
        let Self {
            db,
            config,
            temp_dir,
        } = self;
        db.close().expect("Failed to close database");
        drop(db);

        let db = Database::open_with_config(&path, config.clone())
            .expect("Failed to reopen database");
        Self {
            db,
            config,
            temp_dir,
        }
    }

    /// Segment files in the database directory, sorted by name.
    pub fn segment_files(&self) -> Vec<PathBuf> {
        let path = self.path().expect("in-memory databases have no files");
        let mut files: Vec<PathBuf> = fs::read_dir(path.join("collections"))
            .expect("Failed to list segment directory")
            .map(|entry| entry.expect("Failed to read directory entry").path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "log"))
            .collect();
        files.sort();
        files
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a temporary in-memory database.
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let db = TestDatabase::memory();
    f(&db)
}

/// Runs a test with a temporary file-backed database.
pub fn with_file_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let db = TestDatabase::file();
    f(&db)
}

/// The document inserted in the basic usage scenario.
pub fn kichu() -> Document {
    doc! { "name" => "Kichu", "role" => "Dev" }
}

/// Document `index` of the benchmark scenario.
pub fn benchmark_user(index: i64) -> Document {
    doc! { "name" => "User", "index" => index }
}
