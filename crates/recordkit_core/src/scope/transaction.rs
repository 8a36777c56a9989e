//! The ambient transaction of a request.
//!
//! At most one transaction is registered per [`RequestScope`]. Engine calls
//! reach storage through [`RequestScope::tx`], so everything inside
//! [`RequestScope::run_in_transaction`] joins the open transaction.

use super::RequestScope;
use crate::error::{EngineError, EngineResult};
use parking_lot::Mutex;
use recordkit_store::{Executor, Store, Transaction};
use std::fmt;
use std::sync::Arc;

/// The storage connection an engine call runs on.
#[derive(Clone)]
pub enum Connection {
    /// The request's open transaction.
    Transaction(Arc<dyn Transaction>),
    /// The store itself, committing each write immediately.
    Autocommit(Arc<dyn Store>),
}

impl Connection {
    /// Returns the connection as an executor.
    #[must_use]
    pub fn executor(&self) -> &dyn Executor {
        match self {
            Self::Transaction(tx) => tx.as_executor(),
            Self::Autocommit(store) => store.as_executor(),
        }
    }

    /// Returns true for a transaction connection.
    #[must_use]
    pub fn is_transaction(&self) -> bool {
        matches!(self, Self::Transaction(_))
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transaction(tx) => f.debug_tuple("Transaction").field(&tx.id()).finish(),
            Self::Autocommit(_) => f.write_str("Autocommit"),
        }
    }
}

/// The transaction slot of a request.
pub(super) enum TxSlot {
    Idle,
    /// Reserved while `begin` waits for the store.
    Opening,
    Open(Arc<dyn Transaction>),
}

/// Resets the transaction slot on every exit path.
struct SlotGuard<'a>(&'a Mutex<TxSlot>);

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        *self.0.lock() = TxSlot::Idle;
    }
}

impl RequestScope {
    /// Runs `f` inside a new transaction.
    ///
    /// Commits when `f` returns `Ok`; rolls back and returns the error when
    /// it returns `Err`. The slot is cleared afterwards, including on panic,
    /// in which case dropping the transaction rolls it back.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NestedTransaction`] without opening anything if
    /// a transaction is already registered, [`EngineError::Cancelled`] if the
    /// request is no longer active, the closure's error, or a storage error
    /// from begin or commit.
    pub fn run_in_transaction<R, F>(&self, f: F) -> EngineResult<R>
    where
        F: FnOnce(&dyn Transaction) -> EngineResult<R>,
    {
        self.ensure_active()?;
        {
            let mut slot = self.transaction.lock();
            if !matches!(*slot, TxSlot::Idle) {
                return Err(EngineError::NestedTransaction {
                    request_id: self.id,
                });
            }
            *slot = TxSlot::Opening;
        }
        let _guard = SlotGuard(&self.transaction);
        let tx = self
            .store
            .begin()
            .map_err(|e| EngineError::storage("begin", "transaction", e))?;
        *self.transaction.lock() = TxSlot::Open(Arc::clone(&tx));
        tracing::debug!(txid = %tx.id(), request_id = %self.id, "transaction opened");

        match f(tx.as_ref()) {
            Ok(value) => {
                tx.commit()
                    .map_err(|e| EngineError::storage("commit", "transaction", e))?;
                tracing::debug!(txid = %tx.id(), request_id = %self.id, "transaction committed");
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback() {
                    tracing::warn!(
                        txid = %tx.id(),
                        request_id = %self.id,
                        error = %rollback,
                        "rollback failed"
                    );
                }
                tracing::debug!(
                    txid = %tx.id(),
                    request_id = %self.id,
                    error = %err,
                    "transaction rolled back"
                );
                Err(err)
            }
        }
    }

    /// Returns the open transaction, or the autocommit store.
    #[must_use]
    pub fn tx(&self) -> Connection {
        match &*self.transaction.lock() {
            TxSlot::Open(tx) => Connection::Transaction(Arc::clone(tx)),
            TxSlot::Idle | TxSlot::Opening => Connection::Autocommit(Arc::clone(&self.store)),
        }
    }

    /// Returns true while a transaction is registered or being opened.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        !matches!(*self.transaction.lock(), TxSlot::Idle)
    }
}
