//! # NanoDB Storage
//!
//! Byte-store backends underneath NanoDB's collection segments.
//!
//! A backend is an **opaque, append-oriented byte store**. It knows nothing
//! about records, documents or collections; `nanodb_core` owns every file
//! format decision and only asks a backend to append, read back, flush and
//! truncate bytes.
//!
//! ## Available Backends
//!
//! - [`FileBackend`] - one OS file per segment, survives restarts
//! - [`InMemoryBackend`] - volatile, for tests and scratch databases
//!
//! ## Example
//!
//! ```rust
//! use nanodb_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"record").unwrap();
//! assert_eq!(backend.read_at(offset, 6).unwrap(), b"record");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
