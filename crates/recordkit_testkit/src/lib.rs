//! # recordkit Testkit
//!
//! Test utilities for recordkit.
//!
//! This crate provides:
//! - Sales order fixtures: entities, request payloads, a search spec, and the
//!   status lifecycle
//! - [`TestDatabase`], an in-memory database that records audit entries
//! - [`CountingStore`], a store that counts every call
//! - Property-based test generators using proptest
//! - Tracing initialisation for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use recordkit_testkit::prelude::*;
//!
//! #[test]
//! fn creates_orders() {
//!     let db = TestDatabase::new();
//!     let created = db.seed(sample_order("SO000001", "Acme", 2));
//!     assert_ne!(created.audit.id, 0);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod counting;
pub mod fixtures;
pub mod generators;
pub mod logging;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::counting::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::*;
    pub use recordkit_core::Entity;
}

pub use counting::*;
pub use fixtures::*;
pub use generators::*;
pub use logging::*;
