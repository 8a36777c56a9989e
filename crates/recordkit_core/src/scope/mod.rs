//! Per-request state.
//!
//! A [`RequestScope`] lives for one inbound request. It carries the actor,
//! the deadline and cancellation flag, the entity registry, the single
//! transaction slot, and memoized per-request values. Nothing in it outlives
//! the request.

mod transaction;
mod values;

pub use transaction::Connection;
use transaction::TxSlot;

use crate::audit::{AuditEntry, AuditSink};
use crate::config::Config;
use crate::entity::LocalTime;
use crate::error::{EngineError, EngineResult};
use crate::registry::EntityRegistry;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use recordkit_store::Store;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// The user on whose behalf a request runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    /// User id.
    pub id: String,
    /// User display name.
    pub name: String,
}

impl Actor {
    /// Creates an actor.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

type MemoCell = Arc<OnceCell<Arc<dyn Any + Send + Sync>>>;

/// State of one logical request.
pub struct RequestScope {
    id: Uuid,
    store: Arc<dyn Store>,
    config: Arc<Config>,
    audit: Option<Arc<dyn AuditSink>>,
    actor: Option<Actor>,
    deadline: Option<Instant>,
    cancelled: AtomicBool,
    registry: EntityRegistry,
    transaction: Mutex<TxSlot>,
    values: Mutex<HashMap<String, MemoCell>>,
    now: OnceCell<LocalTime>,
}

impl RequestScope {
    /// Returns the request id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the actor, if any.
    #[must_use]
    pub fn actor(&self) -> Option<&Actor> {
        self.actor.as_ref()
    }

    /// Returns the actor, failing if it is absent or blank.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MissingActor`] naming `operation`.
    pub fn require_actor(&self, operation: &'static str) -> EngineResult<&Actor> {
        match &self.actor {
            Some(actor) if !actor.id.trim().is_empty() && !actor.name.trim().is_empty() => {
                Ok(actor)
            }
            _ => Err(EngineError::MissingActor { operation }),
        }
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the entity registry of this request.
    #[must_use]
    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Returns the deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Marks the request cancelled.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        tracing::debug!(request_id = %self.id, "request cancelled");
    }

    /// Returns true once cancelled or past the deadline.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fails if the request was cancelled or its deadline passed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Cancelled`].
    pub fn ensure_active(&self) -> EngineResult<()> {
        if self.is_cancelled() {
            return Err(EngineError::Cancelled {
                request_id: self.id,
            });
        }
        Ok(())
    }

    /// Returns the request's current time, fixed at first use.
    pub fn now(&self) -> LocalTime {
        *self.now.get_or_init(LocalTime::now)
    }

    /// Records an audit entry if a sink is configured.
    pub(crate) fn record_audit(
        &self,
        table: &str,
        entity_id: u64,
        kind: &str,
        label: &str,
        before: Value,
        after: Value,
    ) -> EngineResult<()> {
        let Some(sink) = &self.audit else {
            return Ok(());
        };
        let (operator_id, operator_name) = self
            .actor
            .as_ref()
            .map(|a| (a.id.clone(), a.name.clone()))
            .unwrap_or_default();
        let entry = AuditEntry {
            request_id: self.id,
            table: table.to_string(),
            entity_id,
            kind: kind.to_string(),
            label: label.to_string(),
            operator_id,
            operator_name,
            before,
            after,
            at: self.now(),
        };
        match sink.record(&entry) {
            Ok(()) => Ok(()),
            Err(err) if self.config.audit_failures_fatal => Err(err.into()),
            Err(err) => {
                tracing::warn!(
                    request_id = %self.id,
                    table,
                    id = entity_id,
                    kind,
                    error = %err,
                    "audit entry dropped"
                );
                Ok(())
            }
        }
    }
}

impl fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestScope")
            .field("id", &self.id)
            .field("actor", &self.actor)
            .field("deadline", &self.deadline)
            .field("in_transaction", &self.in_transaction())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Builder for a [`RequestScope`], obtained from [`crate::Database::request`].
#[must_use]
pub struct ScopeBuilder {
    store: Arc<dyn Store>,
    config: Arc<Config>,
    audit: Option<Arc<dyn AuditSink>>,
    id: Option<Uuid>,
    actor: Option<Actor>,
    deadline: Option<Instant>,
    now: Option<LocalTime>,
}

impl ScopeBuilder {
    pub(crate) fn new(
        store: Arc<dyn Store>,
        config: Arc<Config>,
        audit: Option<Arc<dyn AuditSink>>,
    ) -> Self {
        Self {
            store,
            config,
            audit,
            id: None,
            actor: None,
            deadline: None,
            now: None,
        }
    }

    /// Sets the actor.
    pub fn actor(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.actor = Some(Actor::new(id, name));
        self
    }

    /// Sets an absolute deadline.
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets the deadline relative to now.
    pub fn timeout(self, timeout: Duration) -> Self {
        self.deadline(Instant::now() + timeout)
    }

    /// Pins the request's current time.
    pub fn now(mut self, now: LocalTime) -> Self {
        self.now = Some(now);
        self
    }

    /// Uses a caller-supplied request id instead of a random one.
    pub fn request_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    /// Builds the scope.
    pub fn build(self) -> Arc<RequestScope> {
        let now = OnceCell::new();
        if let Some(pinned) = self.now {
            let _ = now.set(pinned);
        }
        let id = self.id.unwrap_or_else(Uuid::new_v4);
        tracing::trace!(request_id = %id, "request scope opened");
        Arc::new(RequestScope {
            id,
            registry: EntityRegistry::new(self.config.registry_ttl, self.deadline),
            store: self.store,
            config: self.config,
            audit: self.audit,
            actor: self.actor,
            deadline: self.deadline,
            cancelled: AtomicBool::new(false),
            transaction: Mutex::new(TxSlot::Idle),
            values: Mutex::new(HashMap::new()),
            now,
        })
    }
}
