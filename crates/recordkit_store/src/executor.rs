//! Store capability traits.

use crate::error::{StoreError, StoreResult};
use crate::query::{cell, fingerprint, Query, Row, ID_COLUMN};
use crate::types::{TransactionId, TransactionState};
use std::sync::Arc;

/// Operations that run against either a store (autocommit) or an open
/// transaction.
///
/// # Invariants
///
/// - `insert` assigns a fresh, never reused `id` when the row carries none
/// - `save` keeps the stored values of every `preserve` column
/// - `first` reports [`StoreError::NotFound`] when nothing matches
/// - Implementations must be `Send + Sync`
pub trait Executor: Send + Sync {
    /// Returns every row of `table` matching `query`.
    ///
    /// A table that was never written is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be evaluated.
    fn find(&self, table: &str, query: &Query) -> StoreResult<Vec<Row>>;

    /// Counts rows of `table` matching `query`, ignoring pagination.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be evaluated.
    fn count(&self, table: &str, query: &Query) -> StoreResult<u64>;

    /// Inserts a row and returns it as stored, `id` included.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateKey`] if the row names a taken `id`, or
    /// [`StoreError::InvalidRow`] if `id` is not an unsigned integer.
    fn insert(&self, table: &str, row: Row) -> StoreResult<Row>;

    /// Upserts a row by `id`, keeping the stored values of `preserve`.
    ///
    /// A row without an `id` (or with `id` 0) is inserted. Rows tombstoned by
    /// [`delete`](Executor::delete) stay tombstoned.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidRow`] if `id` is not an unsigned integer,
    /// or [`StoreError::NotFound`] if the stored row was tombstoned.
    fn save(&self, table: &str, row: Row, preserve: &[&str]) -> StoreResult<Row>;

    /// Merges `tombstone` into every row whose `id` is listed.
    ///
    /// Returns the number of rows touched.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying write fails.
    fn delete(&self, table: &str, ids: &[u64], tombstone: &Row) -> StoreResult<u64>;

    /// Returns the first matching row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no row matches.
    fn first(&self, table: &str, query: &Query) -> StoreResult<Row> {
        self.find(table, &query.clone().limit(1))?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::not_found(table))
    }

    /// Returns the identifiers of matching rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be evaluated.
    fn find_ids(&self, table: &str, query: &Query) -> StoreResult<Vec<u64>> {
        Ok(self
            .find(table, query)?
            .iter()
            .filter_map(|row| cell(row, ID_COLUMN).as_u64())
            .collect())
    }

    /// Returns `(id, key)` for every matching row, where the key is the
    /// [`fingerprint`] of `columns` joined by `delimiter` (null renders as
    /// empty).
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be evaluated.
    fn fingerprints(
        &self,
        table: &str,
        columns: &[String],
        delimiter: &str,
        query: &Query,
    ) -> StoreResult<Vec<(u64, String)>> {
        Ok(self
            .find(table, query)?
            .iter()
            .filter_map(|row| {
                let id = cell(row, ID_COLUMN).as_u64()?;
                let key = fingerprint(columns.iter().map(|c| cell(row, unqualified(c))), delimiter);
                Some((id, key))
            })
            .collect())
    }
}

/// A store that can open transactions.
pub trait Store: Executor {
    /// Opens a transaction.
    ///
    /// Blocks while another writer holds the store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockTimeout`] if the store is configured with a
    /// lock timeout and it elapses.
    fn begin(&self) -> StoreResult<Arc<dyn Transaction>>;

    /// Returns this store as an autocommit executor.
    fn as_executor(&self) -> &dyn Executor;
}

/// An open storage transaction.
///
/// Dropping an active transaction rolls it back.
pub trait Transaction: Executor {
    /// Returns the transaction identifier.
    fn id(&self) -> TransactionId;

    /// Returns the transaction state.
    fn state(&self) -> TransactionState;

    /// Returns true while the transaction accepts operations.
    fn is_active(&self) -> bool {
        self.state() == TransactionState::Active
    }

    /// Publishes every write made in this transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TransactionClosed`] if already finished.
    fn commit(&self) -> StoreResult<()>;

    /// Discards every write made in this transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TransactionClosed`] if already finished.
    fn rollback(&self) -> StoreResult<()>;

    /// Returns this transaction as an executor.
    fn as_executor(&self) -> &dyn Executor;
}

fn unqualified(column: &str) -> &str {
    column.rsplit_once('.').map_or(column, |(_, name)| name)
}
