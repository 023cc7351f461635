//! # NanoDB Testkit
//!
//! Test utilities for NanoDB.
//!
//! This crate provides:
//! - Test fixtures: temporary databases that can be closed and reopened
//! - Property-based test generators using proptest
//! - A `tracing` subscriber for tests
//!
//! The end-to-end tests for the whole workspace live in this crate's
//! `tests/` directory.
//!
//! ## Usage
//!
//! ```
//! use nanodb_testkit::prelude::*;
//! use nanodb_codec::doc;
//!
//! with_temp_db(|db| {
//!     let users = db.collection("users").unwrap();
//!     users.insert(doc! { "name" => "Kichu" }).unwrap();
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod logging;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::*;
}

pub use fixtures::*;
pub use generators::*;
pub use logging::*;
