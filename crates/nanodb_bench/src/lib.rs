//! Benchmark utilities.

use nanodb_codec::{doc, Document};
use nanodb_core::{Collection, Database, DocumentId};
use rand::Rng;
use tempfile::TempDir;

/// Collection the workload runs against.
pub const COLLECTION: &str = "benchmark_users";

/// A user document as the workload inserts it.
pub fn user(index: i64) -> Document {
    doc! { "name" => "User", "index" => index }
}

/// The update applied to random users.
pub fn renamed_user() -> Document {
    doc! { "name" => "Updated User", "index" => 999 }
}

/// A file-backed database in a fresh temporary directory.
///
/// The directory is removed when the returned guard drops, after the
/// database itself.
pub fn temp_database() -> (Database, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(&dir.path().join("bench.db")).unwrap();
    (db, dir)
}

/// Inserts `count` users and returns their ids in insertion order.
pub fn populate(users: &Collection, count: usize) -> Vec<DocumentId> {
    (0..count as i64)
        .map(|i| users.insert(user(i)).unwrap())
        .collect()
}

/// Picks a random id from a non-empty slice.
pub fn random_id(ids: &[DocumentId]) -> DocumentId {
    ids[rand::thread_rng().gen_range(0..ids.len())]
}

/// Removes and returns a random id, moving the last id into its slot.
pub fn take_random_id(ids: &mut Vec<DocumentId>) -> DocumentId {
    let idx = rand::thread_rng().gen_range(0..ids.len());
    ids.swap_remove(idx)
}
