//! # recordkit Core
//!
//! A generic active-record engine for business entities.
//!
//! This crate provides:
//! - [`Model`]: create, update, soft delete, loads, fresh reads, and lists
//!   for any [`Entity`], with one-to-many association children
//! - [`Condition`] and [`make_condition`] for composable search filters
//! - Business-code and composite-key uniqueness checks, single and batch
//! - [`RequestScope`]: the actor, deadline, entity registry, memoized values,
//!   and the single ambient transaction of one request
//! - [`StateMachine`] lifecycles fired through [`Model::event_execution`]
//! - An audit trail of every mutation through an [`AuditSink`]
//!
//! Storage is reached only through the [`recordkit_store`] traits.
//!
//! ## Example
//!
//! ```rust,ignore
//! use recordkit_core::{Database, Model};
//!
//! let db = Database::open_in_memory();
//! let scope = db.request().actor("u1", "Alice").build();
//! let order = Model::new(&scope, SalesOrder::default());
//! order.set_data(&create_request)?;
//! order.business_code_cannot_repeat("order_id", create_request.order_id.clone())?;
//! let created = scope.run_in_transaction(|_| order.create())?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod audit;
mod condition;
mod config;
mod database;
mod entity;
mod error;
mod lifecycle;
mod model;
mod registry;
mod scope;

pub use audit::{
    AuditEntry, AuditError, AuditSink, MemoryAuditSink, TracingAuditSink, KIND_CREATE,
    KIND_DELETE, KIND_UPDATE,
};
pub use condition::{
    escape_like, make_condition, parse_order, validate_column, Condition, SearchField,
    SearchKind, SearchSpec,
};
pub use config::Config;
pub use database::Database;
pub use entity::{
    Association, AuditFields, Entity, LocalTime, CREATE_ONLY_COLUMNS, DELETED_AT_COLUMN,
    UPDATE_ONLY_COLUMNS,
};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use lifecycle::{
    after_every_event, AfterEventHook, Callback, FireOutcome, HookPoint, Hooks, StateMachine,
    Transition, TransitionEvent,
};
pub use model::{Model, Preload, Preloads};
pub use registry::{EntityRef, EntityRegistry, IdentityKey};
pub use scope::{Actor, Connection, RequestScope, ScopeBuilder};
