//! # recordkit Store
//!
//! The storage capability consumed by the recordkit engine.
//!
//! A store holds **tables of rows**. A row is a JSON object keyed by column
//! name and always carries a numeric `id` column assigned by the store. The
//! engine never talks to a concrete backend; it only sees the traits below.
//!
//! ## Design Principles
//!
//! - Queries are plain data ([`Query`], [`Predicate`]), evaluated by the backend
//! - `id` is store-assigned, monotonic per table, and never reused
//! - One writer at a time; transactions are all-or-nothing
//! - Must be `Send + Sync` so a store can be shared across request threads
//!
//! ## Available Backends
//!
//! - [`InMemoryStore`] - For testing and embedding
//!
//! ## Example
//!
//! ```rust
//! use recordkit_store::{Executor, InMemoryStore, Query};
//! use serde_json::json;
//!
//! let store = InMemoryStore::new();
//! let row = json!({"order_id": "SO1", "status": 0});
//! let stored = store.insert("sales_order", row.as_object().unwrap().clone()).unwrap();
//! assert_eq!(stored["id"], 1);
//!
//! let found = store.first("sales_order", &Query::new().eq("id", 1)).unwrap();
//! assert_eq!(found["order_id"], "SO1");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod executor;
mod memory;
mod pattern;
mod query;
mod types;

pub use error::{StoreError, StoreResult};
pub use executor::{Executor, Store, Transaction};
pub use memory::{InMemoryStore, InMemoryTransaction, StoreConfig};
pub use pattern::like;
pub use query::{
    cell, compare_values, fingerprint, is_empty_value, loose_eq, render_cell, OrderBy, Predicate,
    Query, Row, ID_COLUMN,
};
pub use types::{TransactionId, TransactionState};
