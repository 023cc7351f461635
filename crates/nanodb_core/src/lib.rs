//! # NanoDB Core
//!
//! Embedded document storage engine for NanoDB.
//!
//! This crate provides:
//! - Identifier allocation (ids are never reused within a collection)
//! - Append-only segment files with checksummed records and compaction
//! - Collection engine with equality filters, limit/skip and shallow updates
//! - Database facade with directory locking and a persistent manifest
//!
//! ## Example
//!
//! ```no_run
//! use nanodb_codec::doc;
//! use nanodb_core::Database;
//! use std::path::Path;
//!
//! let db = Database::open(Path::new("data"))?;
//! let users = db.collection("users")?;
//!
//! users.insert(doc! { "name" => "Kichu", "role" => "Dev" })?;
//! let devs = users.find(&doc! { "role" => "Dev" }, 0, 0)?;
//! assert_eq!(devs.len(), 1);
//!
//! db.close()?;
//! # Ok::<(), nanodb_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collection;
mod config;
mod database;
mod dir;
mod error;
mod id;
mod manifest;
pub mod query;
pub mod segment;

pub use collection::{BatchFailure, BatchOutcome, Collection, CollectionStats, Find};
pub use config::Config;
pub use database::{validate_collection_name, Database, MAX_COLLECTION_NAME_LEN};
pub use error::{CoreError, CoreResult};
pub use id::{DocumentId, IdAllocator, ID_FIELD};
pub use segment::CompactionStats;
