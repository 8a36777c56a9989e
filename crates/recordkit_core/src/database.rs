//! Entry point: a store, a configuration, and an optional audit sink.

use crate::audit::AuditSink;
use crate::config::Config;
use crate::scope::ScopeBuilder;
use recordkit_store::{InMemoryStore, Store};
use std::fmt;
use std::sync::Arc;

/// A handle shared by every request.
///
/// Cloning is cheap; clones share the store and the audit sink.
#[derive(Clone)]
pub struct Database {
    store: Arc<dyn Store>,
    config: Arc<Config>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl Database {
    /// Wraps `store` with the default configuration.
    ///
    /// # Example
    ///
    /// ```rust
    /// use recordkit_core::Database;
    /// use recordkit_store::InMemoryStore;
    ///
    /// let db = Database::open(InMemoryStore::new());
    /// let scope = db.request().actor("u1", "Alice").build();
    /// assert!(!scope.in_transaction());
    /// ```
    pub fn open(store: impl Store + 'static) -> Self {
        Self::open_with_config(store, Config::default())
    }

    /// Wraps `store` with a custom configuration.
    ///
    /// ```rust
    /// use recordkit_core::{Config, Database};
    /// use recordkit_store::InMemoryStore;
    ///
    /// let db = Database::open_with_config(InMemoryStore::new(), Config::new().batch_limit(50));
    /// assert_eq!(db.config().batch_limit, 50);
    /// ```
    pub fn open_with_config(store: impl Store + 'static, config: Config) -> Self {
        Self::from_shared(Arc::new(store), config)
    }

    /// Wraps an already shared store.
    pub fn from_shared(store: Arc<dyn Store>, config: Config) -> Self {
        tracing::debug!(?config, "database opened");
        Self {
            store,
            config: Arc::new(config),
            audit: None,
        }
    }

    /// Opens a fresh in-memory database.
    #[must_use]
    pub fn open_in_memory() -> Self {
        Self::open(InMemoryStore::new())
    }

    /// Sends audit entries to `sink`.
    #[must_use]
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Starts building a request scope.
    pub fn request(&self) -> ScopeBuilder {
        ScopeBuilder::new(
            Arc::clone(&self.store),
            Arc::clone(&self.config),
            self.audit.clone(),
        )
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.config)
            .field("audit", &self.audit.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;

    #[test]
    fn requests_share_the_store() {
        let store = InMemoryStore::new();
        let db = Database::open(store.clone());
        let a = db.request().build();
        let b = db.request().build();
        assert_ne!(a.id(), b.id());
        a.tx()
            .executor()
            .insert("t", serde_json::Map::new())
            .unwrap();
        assert_eq!(store.raw_rows("t").len(), 1);
        assert_eq!(b.tx().executor().count("t", &recordkit_store::Query::new()).unwrap(), 1);
    }

    #[test]
    fn audit_sink_is_optional() {
        let db = Database::open_in_memory();
        assert!(format!("{db:?}").contains("audit: false"));
        let db = db.with_audit_sink(Arc::new(MemoryAuditSink::new()));
        assert!(format!("{db:?}").contains("audit: true"));
    }
}
