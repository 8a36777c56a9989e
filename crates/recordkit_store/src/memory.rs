//! In-memory relational store.

use crate::error::{StoreError, StoreResult};
use crate::executor::{Executor, Store, Transaction};
use crate::query::{Query, Row, ID_COLUMN};
use crate::types::{TransactionId, TransactionState};
use parking_lot::{Condvar, Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Configuration for [`InMemoryStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreConfig {
    /// How long a writer waits for the write lock. `None` waits forever.
    pub lock_timeout: Option<Duration>,
}

impl StoreConfig {
    /// Sets the write lock timeout.
    #[must_use]
    pub const fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, Default)]
struct Table {
    rows: BTreeMap<u64, Row>,
    /// Highest identifier ever assigned.
    last_id: u64,
    /// Rows tombstoned by `delete`; `save` refuses them.
    tombstoned: BTreeSet<u64>,
}

type Tables = HashMap<String, Table>;

struct Shared {
    tables: RwLock<Tables>,
    writer: Mutex<Option<TransactionId>>,
    released: Condvar,
    next_txid: AtomicU64,
    config: StoreConfig,
}

impl Shared {
    fn acquire(&self, owner: TransactionId) -> StoreResult<()> {
        let started = Instant::now();
        let mut holder = self.writer.lock();
        while holder.is_some() {
            match self.config.lock_timeout {
                None => self.released.wait(&mut holder),
                Some(timeout) => {
                    let waited = started.elapsed();
                    if waited >= timeout {
                        return Err(StoreError::LockTimeout { waited });
                    }
                    let _ = self.released.wait_for(&mut holder, timeout - waited);
                }
            }
        }
        *holder = Some(owner);
        Ok(())
    }

    fn release(&self) {
        *self.writer.lock() = None;
        self.released.notify_one();
    }
}

/// Releases the writer gate when an autocommit write finishes.
struct WriteGuard<'a>(&'a Shared);

impl<'a> WriteGuard<'a> {
    fn acquire(shared: &'a Shared) -> StoreResult<Self> {
        shared.acquire(TransactionId::AUTOCOMMIT)?;
        Ok(Self(shared))
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// An in-memory store of tables.
///
/// Suitable for unit tests, integration tests, and embedding where no
/// persistence is needed.
///
/// # Concurrency
///
/// One writer at a time. A transaction holds the write lock from `begin`
/// until it commits, rolls back, or is dropped, and works on a private copy
/// of the tables. Readers outside the transaction see committed data only.
///
/// # Example
///
/// ```rust
/// use recordkit_store::{Executor, InMemoryStore, Query, Store, Transaction};
/// use serde_json::json;
///
/// let store = InMemoryStore::new();
/// let tx = store.begin().unwrap();
/// tx.insert("sales_order", json!({"order_id": "SO1"}).as_object().unwrap().clone())
///     .unwrap();
/// assert_eq!(store.count("sales_order", &Query::new()).unwrap(), 0);
///
/// tx.commit().unwrap();
/// assert_eq!(store.count("sales_order", &Query::new()).unwrap(), 1);
/// ```
#[derive(Clone)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

impl InMemoryStore {
    /// Creates an empty store with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Creates an empty store with the given configuration.
    #[must_use]
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: RwLock::new(Tables::new()),
                writer: Mutex::new(None),
                released: Condvar::new(),
                next_txid: AtomicU64::new(1),
                config,
            }),
        }
    }

    /// Returns every committed row of `table`, soft-deleted rows included.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn raw_rows(&self, table: &str) -> Vec<Row> {
        self.shared
            .tables
            .read()
            .get(table)
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns true while a transaction holds the write lock.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.shared.writer.lock().is_some()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.shared.tables.read();
        f.debug_struct("InMemoryStore")
            .field("tables", &tables.len())
            .field("writer", &*self.shared.writer.lock())
            .finish()
    }
}

impl Executor for InMemoryStore {
    fn find(&self, table: &str, query: &Query) -> StoreResult<Vec<Row>> {
        find(&self.shared.tables.read(), table, query)
    }

    fn count(&self, table: &str, query: &Query) -> StoreResult<u64> {
        count(&self.shared.tables.read(), table, query)
    }

    fn insert(&self, table: &str, row: Row) -> StoreResult<Row> {
        let _guard = WriteGuard::acquire(&self.shared)?;
        insert(&mut self.shared.tables.write(), table, row)
    }

    fn save(&self, table: &str, row: Row, preserve: &[&str]) -> StoreResult<Row> {
        let _guard = WriteGuard::acquire(&self.shared)?;
        save(&mut self.shared.tables.write(), table, row, preserve)
    }

    fn delete(&self, table: &str, ids: &[u64], tombstone: &Row) -> StoreResult<u64> {
        let _guard = WriteGuard::acquire(&self.shared)?;
        Ok(delete(&mut self.shared.tables.write(), table, ids, tombstone))
    }
}

impl Store for InMemoryStore {
    fn begin(&self) -> StoreResult<Arc<dyn Transaction>> {
        let id = TransactionId::new(self.shared.next_txid.fetch_add(1, Ordering::SeqCst));
        self.shared.acquire(id)?;
        let working = self.shared.tables.read().clone();
        tracing::debug!(txid = %id, "transaction started");
        Ok(Arc::new(InMemoryTransaction {
            id,
            shared: Arc::clone(&self.shared),
            inner: Mutex::new(TxInner {
                state: TransactionState::Active,
                working,
            }),
        }))
    }

    fn as_executor(&self) -> &dyn Executor {
        self
    }
}

struct TxInner {
    state: TransactionState,
    working: Tables,
}

/// A transaction over an [`InMemoryStore`].
pub struct InMemoryTransaction {
    id: TransactionId,
    shared: Arc<Shared>,
    inner: Mutex<TxInner>,
}

impl InMemoryTransaction {
    fn with_working<R>(&self, f: impl FnOnce(&mut Tables) -> StoreResult<R>) -> StoreResult<R> {
        let mut inner = self.inner.lock();
        if inner.state.is_finished() {
            return Err(StoreError::TransactionClosed { txid: self.id });
        }
        f(&mut inner.working)
    }

    fn finish(&self, publish: bool) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if inner.state != TransactionState::Active {
            return Err(StoreError::TransactionClosed { txid: self.id });
        }
        let working = std::mem::take(&mut inner.working);
        if publish {
            *self.shared.tables.write() = working;
            inner.state = TransactionState::Committed;
        } else {
            inner.state = TransactionState::RolledBack;
        }
        self.shared.release();
        Ok(())
    }
}

impl fmt::Debug for InMemoryTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryTransaction")
            .field("id", &self.id)
            .field("state", &self.inner.lock().state)
            .finish()
    }
}

impl Executor for InMemoryTransaction {
    fn find(&self, table: &str, query: &Query) -> StoreResult<Vec<Row>> {
        self.with_working(|tables| find(tables, table, query))
    }

    fn count(&self, table: &str, query: &Query) -> StoreResult<u64> {
        self.with_working(|tables| count(tables, table, query))
    }

    fn insert(&self, table: &str, row: Row) -> StoreResult<Row> {
        self.with_working(|tables| insert(tables, table, row))
    }

    fn save(&self, table: &str, row: Row, preserve: &[&str]) -> StoreResult<Row> {
        self.with_working(|tables| save(tables, table, row, preserve))
    }

    fn delete(&self, table: &str, ids: &[u64], tombstone: &Row) -> StoreResult<u64> {
        self.with_working(|tables| Ok(delete(tables, table, ids, tombstone)))
    }
}

impl Transaction for InMemoryTransaction {
    fn id(&self) -> TransactionId {
        self.id
    }

    fn state(&self) -> TransactionState {
        self.inner.lock().state
    }

    fn commit(&self) -> StoreResult<()> {
        self.finish(true)?;
        tracing::debug!(txid = %self.id, "transaction committed");
        Ok(())
    }

    fn rollback(&self) -> StoreResult<()> {
        self.finish(false)?;
        tracing::debug!(txid = %self.id, "transaction rolled back");
        Ok(())
    }

    fn as_executor(&self) -> &dyn Executor {
        self
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if inner.state == TransactionState::Active {
            inner.state = TransactionState::RolledBack;
            self.shared.release();
            tracing::debug!(txid = %self.id, "transaction dropped without commit");
        }
    }
}

fn row_id(table: &str, row: &Row) -> StoreResult<u64> {
    match row.get(ID_COLUMN) {
        None | Some(Value::Null) => Ok(0),
        Some(value) => value.as_u64().ok_or_else(|| {
            StoreError::invalid_row(table, format!("id must be an unsigned integer, got {value}"))
        }),
    }
}

fn find(tables: &Tables, table: &str, query: &Query) -> StoreResult<Vec<Row>> {
    let Some(t) = tables.get(table) else {
        return Ok(Vec::new());
    };
    let rows = query.select(table, t.rows.values())?;
    tracing::trace!(table, matched = rows.len(), "find");
    Ok(rows.into_iter().cloned().collect())
}

fn count(tables: &Tables, table: &str, query: &Query) -> StoreResult<u64> {
    let Some(t) = tables.get(table) else {
        return Ok(0);
    };
    let unpaged = query.clone().clear_pagination();
    let mut n = 0u64;
    for row in t.rows.values() {
        if unpaged.matches(table, row)? {
            n += 1;
        }
    }
    Ok(n)
}

fn insert(tables: &mut Tables, table: &str, mut row: Row) -> StoreResult<Row> {
    let requested = row_id(table, &row)?;
    let t = tables.entry(table.to_string()).or_default();
    let id = if requested == 0 {
        t.last_id + 1
    } else if t.rows.contains_key(&requested) {
        return Err(StoreError::DuplicateKey {
            table: table.to_string(),
            id: requested,
        });
    } else {
        requested
    };
    t.last_id = t.last_id.max(id);
    row.insert(ID_COLUMN.to_string(), Value::from(id));
    t.rows.insert(id, row.clone());
    tracing::trace!(table, id, "row inserted");
    Ok(row)
}

fn save(tables: &mut Tables, table: &str, mut row: Row, preserve: &[&str]) -> StoreResult<Row> {
    let id = row_id(table, &row)?;
    let Some(t) = tables.get(table) else {
        return insert(tables, table, row);
    };
    if t.tombstoned.contains(&id) {
        return Err(StoreError::not_found(table));
    }
    let Some(existing) = t.rows.get(&id) else {
        return insert(tables, table, row);
    };
    for column in preserve {
        match existing.get(*column) {
            Some(value) => row.insert((*column).to_string(), value.clone()),
            None => row.remove(*column),
        };
    }
    row.insert(ID_COLUMN.to_string(), Value::from(id));
    if let Some(t) = tables.get_mut(table) {
        t.rows.insert(id, row.clone());
    }
    tracing::trace!(table, id, "row saved");
    Ok(row)
}

fn delete(tables: &mut Tables, table: &str, ids: &[u64], tombstone: &Row) -> u64 {
    let Some(t) = tables.get_mut(table) else {
        return 0;
    };
    let mut touched = 0;
    for id in ids {
        if let Some(row) = t.rows.get_mut(id) {
            for (column, value) in tombstone {
                row.insert(column.clone(), value.clone());
            }
            t.tombstoned.insert(*id);
            touched += 1;
        }
    }
    tracing::trace!(table, touched, "rows tombstoned");
    touched
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn insert_assigns_monotonic_ids() {
        let store = InMemoryStore::new();
        let a = store.insert("t", row(json!({"name": "a"}))).unwrap();
        let b = store.insert("t", row(json!({"name": "b", "id": 0}))).unwrap();
        assert_eq!(a["id"], 1);
        assert_eq!(b["id"], 2);
    }

    #[test]
    fn insert_rejects_taken_id() {
        let store = InMemoryStore::new();
        store.insert("t", row(json!({"id": 5}))).unwrap();
        let err = store.insert("t", row(json!({"id": 5}))).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { id: 5, .. }));
        assert_eq!(store.insert("t", row(json!({}))).unwrap()["id"], 6);
    }

    #[test]
    fn insert_rejects_non_integer_id() {
        let store = InMemoryStore::new();
        let err = store.insert("t", row(json!({"id": "x"}))).unwrap_err();
        assert!(matches!(err, StoreError::InvalidRow { .. }));
    }

    #[test]
    fn ids_are_not_reused_after_delete() {
        let store = InMemoryStore::new();
        store.insert("t", row(json!({}))).unwrap();
        store.delete("t", &[1], &row(json!({"deleted_at": "x"}))).unwrap();
        assert_eq!(store.insert("t", row(json!({}))).unwrap()["id"], 2);
    }

    #[test]
    fn save_preserves_listed_columns() {
        let store = InMemoryStore::new();
        store
            .insert("t", row(json!({"name": "a", "created_at": "2024-01-01 00:00:00"})))
            .unwrap();
        let saved = store
            .save(
                "t",
                row(json!({"id": 1, "name": "b", "created_at": null})),
                &["created_at"],
            )
            .unwrap();
        assert_eq!(saved["name"], "b");
        assert_eq!(saved["created_at"], "2024-01-01 00:00:00");
    }

    #[test]
    fn save_without_id_inserts() {
        let store = InMemoryStore::new();
        let saved = store.save("t", row(json!({"name": "a"})), &[]).unwrap();
        assert_eq!(saved["id"], 1);
        assert_eq!(store.count("t", &Query::new()).unwrap(), 1);
    }

    #[test]
    fn delete_merges_tombstone() {
        let store = InMemoryStore::new();
        for _ in 0..3 {
            store.insert("t", row(json!({"deleted_at": null}))).unwrap();
        }
        let touched = store
            .delete("t", &[1, 3, 9], &row(json!({"deleted_at": "now"})))
            .unwrap();
        assert_eq!(touched, 2);
        let live = store.count("t", &Query::new().is_null("deleted_at")).unwrap();
        assert_eq!(live, 1);
        assert_eq!(store.raw_rows("t").len(), 3);
    }

    #[test]
    fn tombstoned_rows_cannot_be_saved_back() {
        let store = InMemoryStore::new();
        store.insert("t", row(json!({"name": "a", "deleted_at": null}))).unwrap();
        store.delete("t", &[1], &row(json!({"deleted_at": "now"}))).unwrap();

        let err = store
            .save("t", row(json!({"id": 1, "name": "b", "deleted_at": null})), &[])
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.raw_rows("t")[0]["deleted_at"], "now");
        assert_eq!(store.raw_rows("t")[0]["name"], "a");

        let tx = store.begin().unwrap();
        assert!(tx.save("t", row(json!({"id": 1})), &[]).unwrap_err().is_not_found());
        tx.rollback().unwrap();
    }

    #[test]
    fn unknown_table_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.find("missing", &Query::new()).unwrap().is_empty());
        assert!(store.first("missing", &Query::new()).unwrap_err().is_not_found());
    }

    #[test]
    fn count_ignores_pagination() {
        let store = InMemoryStore::new();
        for _ in 0..4 {
            store.insert("t", row(json!({}))).unwrap();
        }
        assert_eq!(store.count("t", &Query::new().limit(1).offset(2)).unwrap(), 4);
    }

    #[test]
    fn transaction_commit_publishes() {
        let store = InMemoryStore::new();
        let tx = store.begin().unwrap();
        tx.insert("t", row(json!({"name": "a"}))).unwrap();
        assert_eq!(tx.count("t", &Query::new()).unwrap(), 1);
        assert_eq!(store.count("t", &Query::new()).unwrap(), 0);
        tx.commit().unwrap();
        assert_eq!(store.count("t", &Query::new()).unwrap(), 1);
        assert!(!store.is_locked());
    }

    #[test]
    fn transaction_rollback_discards() {
        let store = InMemoryStore::new();
        let tx = store.begin().unwrap();
        tx.insert("t", row(json!({}))).unwrap();
        tx.rollback().unwrap();
        assert_eq!(store.count("t", &Query::new()).unwrap(), 0);
        assert_eq!(tx.state(), TransactionState::RolledBack);
    }

    #[test]
    fn finished_transaction_rejects_operations() {
        let store = InMemoryStore::new();
        let tx = store.begin().unwrap();
        tx.commit().unwrap();
        assert!(matches!(
            tx.insert("t", row(json!({}))),
            Err(StoreError::TransactionClosed { .. })
        ));
        assert!(tx.commit().is_err());
    }

    #[test]
    fn dropped_transaction_releases_lock() {
        let store = InMemoryStore::new();
        {
            let tx = store.begin().unwrap();
            tx.insert("t", row(json!({}))).unwrap();
            assert!(store.is_locked());
        }
        assert!(!store.is_locked());
        assert_eq!(store.count("t", &Query::new()).unwrap(), 0);
    }

    #[test]
    fn writer_times_out_while_transaction_open() {
        let config = StoreConfig::default().lock_timeout(Duration::from_millis(20));
        let store = InMemoryStore::with_config(config);
        let _tx = store.begin().unwrap();
        let err = store.insert("t", row(json!({}))).unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout { .. }));
    }

    #[test]
    fn writers_wait_for_commit() {
        let store = InMemoryStore::new();
        let tx = store.begin().unwrap();
        tx.insert("t", row(json!({}))).unwrap();

        let writer = {
            let store = store.clone();
            thread::spawn(move || store.insert("t", row(json!({}))).unwrap())
        };
        thread::sleep(Duration::from_millis(20));
        tx.commit().unwrap();

        let inserted = writer.join().unwrap();
        assert_eq!(inserted["id"], 2);
        assert_eq!(store.count("t", &Query::new()).unwrap(), 2);
    }

    #[test]
    fn transaction_ids_increase() {
        let store = InMemoryStore::new();
        let a = store.begin().unwrap();
        let a_id = a.id();
        a.commit().unwrap();
        let b = store.begin().unwrap();
        assert!(b.id() > a_id);
    }

    #[test]
    fn fingerprints_join_columns() {
        let store = InMemoryStore::new();
        store.insert("t", row(json!({"a": "A", "b": null}))).unwrap();
        let prints = store
            .fingerprints("t", &["a".to_string(), "t.b".to_string()], ",", &Query::new())
            .unwrap();
        assert_eq!(prints, vec![(1, "A,".to_string())]);
    }
}
