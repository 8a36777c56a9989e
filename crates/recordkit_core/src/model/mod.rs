//! The generic active-record engine.
//!
//! A [`Model`] binds one entity instance, registered in the request's
//! [`crate::EntityRegistry`], to the CRUD, search, uniqueness, and lifecycle
//! operations. Every storage call goes through [`RequestScope::tx`], so a
//! model joins the request's ambient transaction automatically.
//!
//! ```rust,ignore
//! let scope = db.request().actor("u1", "Alice").build();
//! let mut order = Model::new(&scope, SalesOrder::default());
//! order.set_data(&dto)?;
//! scope.run_in_transaction(|_| order.create())?;
//! ```

mod crud;
mod data;
mod load;
mod unique;

use crate::condition::{parse_order, Condition};
use crate::entity::{Entity, DELETED_AT_COLUMN};
use crate::error::{EngineError, EngineResult};
use crate::lifecycle::StateMachine;
use crate::registry::{EntityRef, IdentityKey};
use crate::scope::{Connection, RequestScope};
use parking_lot::Mutex;
use recordkit_store::{Executor, OrderBy, Query, StoreResult};
use std::fmt;
use std::sync::Arc;

/// One named association to eager-load, with an optional narrowing condition.
#[derive(Debug, Clone)]
pub struct Preload {
    /// Association name as declared by [`Entity::associations`].
    pub name: String,
    /// Extra condition applied to the child query.
    pub condition: Option<Condition>,
}

/// The associations to eager-load, in order.
#[derive(Debug, Clone, Default)]
pub struct Preloads(Vec<Preload>);

impl Preloads {
    /// Creates an empty preload list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an association.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>) -> Self {
        self.0.push(Preload {
            name: name.into(),
            condition: None,
        });
        self
    }

    /// Adds an association narrowed by `condition`.
    #[must_use]
    pub fn with_condition(mut self, name: impl Into<String>, condition: Condition) -> Self {
        self.0.push(Preload {
            name: name.into(),
            condition: Some(condition),
        });
        self
    }

    /// Returns true if nothing is preloaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates the preloads in order.
    pub fn iter(&self) -> impl Iterator<Item = &Preload> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ModelOptions {
    pub(crate) default_condition: Option<Condition>,
    pub(crate) permission_conditions: Vec<Condition>,
    pub(crate) preloads: Preloads,
    pub(crate) custom_order: Vec<OrderBy>,
}

/// The engine bound to one registered entity of type `T`.
pub struct Model<T: Entity> {
    pub(crate) scope: Arc<RequestScope>,
    pub(crate) key: IdentityKey,
    pub(crate) options: ModelOptions,
    pub(crate) machine: Option<StateMachine<T>>,
    /// Image of the entity at its last load or save.
    pub(crate) loaded: Mutex<Option<T>>,
}

impl<T: Entity> Model<T> {
    /// Registers `entity` in the scope and binds a model to it.
    pub fn new(scope: &Arc<RequestScope>, entity: T) -> Self {
        let (key, _) = scope.registry().register(entity);
        tracing::trace!(table = T::TABLE, key = %key, request_id = %scope.id(), "model bound");
        Self {
            scope: Arc::clone(scope),
            key,
            options: ModelOptions::default(),
            machine: None,
            loaded: Mutex::new(None),
        }
    }

    /// Adds permission conditions, applied after the default condition.
    #[must_use]
    pub fn with_permission_conditions(mut self, conditions: Vec<Condition>) -> Self {
        self.options.permission_conditions = conditions;
        self
    }

    /// Sets the associations `list` eager-loads.
    #[must_use]
    pub fn with_preloads(mut self, preloads: Preloads) -> Self {
        self.options.preloads = preloads;
        self
    }

    /// Sets a custom order, e.g. `"order_id desc, id"`, for list reads.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidColumn`] if the order is malformed.
    pub fn with_custom_order(mut self, order: &str) -> EngineResult<Self> {
        self.options.custom_order = parse_order(order)?;
        Ok(self)
    }

    /// Sets the condition applied before every other list/count condition.
    #[must_use]
    pub fn with_default_condition(mut self, condition: Condition) -> Self {
        self.options.default_condition = Some(condition);
        self
    }

    /// Registers another entity in the same scope and binds a sibling model
    /// with the same options (no state machine).
    #[must_use]
    pub fn bind(&self, entity: T) -> Self {
        let mut sibling = Self::new(&self.scope, entity);
        sibling.options = self.options.clone();
        sibling
    }

    /// Returns the identity key of the bound entity.
    #[must_use]
    pub fn key(&self) -> IdentityKey {
        self.key
    }

    /// Returns the request scope.
    #[must_use]
    pub fn scope(&self) -> &Arc<RequestScope> {
        &self.scope
    }

    /// Returns the entity table.
    #[must_use]
    pub fn table(&self) -> &'static str {
        T::TABLE
    }

    /// Returns the registered instance.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotRegistered`] if the entry expired or was
    /// removed.
    pub fn entity(&self) -> EngineResult<EntityRef<T>> {
        self.scope.registry().get(self.key)
    }

    /// Returns a clone of the registered instance.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotRegistered`] if the entry expired or was
    /// removed.
    pub fn snapshot(&self) -> EngineResult<T> {
        Ok(self.entity()?.read().clone())
    }

    /// Returns the open transaction, or the autocommit store.
    #[must_use]
    pub fn tx(&self) -> Connection {
        self.scope.tx()
    }

    /// Returns true while the request has an open transaction.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.scope.in_transaction()
    }

    /// Runs [`Entity::validate`] on the registered instance.
    ///
    /// # Errors
    ///
    /// Propagates the hook's error.
    pub fn validate(&self) -> EngineResult<()> {
        self.entity()?.read().validate()
    }

    /// Runs [`Entity::repair`] on the registered instance.
    ///
    /// # Errors
    ///
    /// Propagates the hook's error.
    pub fn repair(&self) -> EngineResult<()> {
        self.entity()?.write().repair()
    }

    /// Runs [`Entity::complete`] on the registered instance.
    ///
    /// # Errors
    ///
    /// Propagates the hook's error.
    pub fn complete(&self) -> EngineResult<()> {
        self.entity()?.write().complete()
    }

    /// Query over live (not soft-deleted) rows.
    pub(crate) fn base_query(&self) -> Query {
        Query::new().is_null(DELETED_AT_COLUMN)
    }

    /// Default, permission, then caller conditions.
    pub(crate) fn filtered_query(&self, conditions: &[Condition]) -> Query {
        let query = match &self.options.default_condition {
            Some(default) => default.apply(self.base_query()),
            None => self.base_query(),
        };
        let query = crate::condition::apply_all(query, &self.options.permission_conditions);
        crate::condition::apply_all(query, conditions)
    }

    /// Runs one storage call on the current connection.
    pub(crate) fn with_store<R>(
        &self,
        operation: &'static str,
        table: &str,
        f: impl FnOnce(&dyn Executor) -> StoreResult<R>,
    ) -> EngineResult<R> {
        self.scope.ensure_active()?;
        let connection = self.scope.tx();
        f(connection.executor()).map_err(|e| EngineError::storage(operation, table, e))
    }

    pub(crate) fn remember(&self, entity: &T) {
        *self.loaded.lock() = Some(entity.clone());
    }
}

impl<T: Entity> fmt::Debug for Model<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("table", &T::TABLE)
            .field("key", &self.key)
            .field("request_id", &self.scope.id())
            .field("state_machine", &self.machine)
            .finish_non_exhaustive()
    }
}
