//! A store wrapper that counts calls.
//!
//! Used to assert how many queries an engine operation issues, e.g. that an
//! oversized batch check fails before touching storage.

use recordkit_store::{
    Executor, InMemoryStore, Query, Row, Store, StoreResult, Transaction, TransactionId,
    TransactionState,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Per-operation call counters.
#[derive(Debug, Default)]
pub struct CallCounts {
    find: AtomicUsize,
    count: AtomicUsize,
    insert: AtomicUsize,
    save: AtomicUsize,
    delete: AtomicUsize,
    begin: AtomicUsize,
}

impl CallCounts {
    /// Number of `find` calls, including those behind `first`, `find_ids`,
    /// and `fingerprints`.
    pub fn finds(&self) -> usize {
        self.find.load(Ordering::SeqCst)
    }

    /// Number of `count` calls.
    pub fn counts(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Number of `insert` calls.
    pub fn inserts(&self) -> usize {
        self.insert.load(Ordering::SeqCst)
    }

    /// Number of `save` calls.
    pub fn saves(&self) -> usize {
        self.save.load(Ordering::SeqCst)
    }

    /// Number of `delete` calls.
    pub fn deletes(&self) -> usize {
        self.delete.load(Ordering::SeqCst)
    }

    /// Number of transactions opened.
    pub fn begins(&self) -> usize {
        self.begin.load(Ordering::SeqCst)
    }

    /// Reads of any kind.
    pub fn queries(&self) -> usize {
        self.finds() + self.counts()
    }

    /// Writes of any kind.
    pub fn writes(&self) -> usize {
        self.inserts() + self.saves() + self.deletes()
    }

    /// Resets every counter to zero.
    pub fn reset(&self) {
        for counter in [
            &self.find,
            &self.count,
            &self.insert,
            &self.save,
            &self.delete,
            &self.begin,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
    }
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::SeqCst);
}

/// An [`InMemoryStore`] that counts every call, transactions included.
#[derive(Debug, Clone, Default)]
pub struct CountingStore {
    inner: InMemoryStore,
    calls: Arc<CallCounts>,
}

impl CountingStore {
    /// Wraps a fresh in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps `inner`.
    #[must_use]
    pub fn wrap(inner: InMemoryStore) -> Self {
        Self {
            inner,
            calls: Arc::default(),
        }
    }

    /// Returns the shared counters.
    #[must_use]
    pub fn calls(&self) -> Arc<CallCounts> {
        Arc::clone(&self.calls)
    }

    /// Returns the wrapped store.
    #[must_use]
    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }
}

/// Forwards to `target`, counting each call in `calls`.
fn counted_find(
    calls: &CallCounts,
    target: &dyn Executor,
    table: &str,
    query: &Query,
) -> StoreResult<Vec<Row>> {
    bump(&calls.find);
    target.find(table, query)
}

impl Executor for CountingStore {
    fn find(&self, table: &str, query: &Query) -> StoreResult<Vec<Row>> {
        counted_find(&self.calls, &self.inner, table, query)
    }

    fn count(&self, table: &str, query: &Query) -> StoreResult<u64> {
        bump(&self.calls.count);
        self.inner.count(table, query)
    }

    fn insert(&self, table: &str, row: Row) -> StoreResult<Row> {
        bump(&self.calls.insert);
        self.inner.insert(table, row)
    }

    fn save(&self, table: &str, row: Row, preserve: &[&str]) -> StoreResult<Row> {
        bump(&self.calls.save);
        self.inner.save(table, row, preserve)
    }

    fn delete(&self, table: &str, ids: &[u64], tombstone: &Row) -> StoreResult<u64> {
        bump(&self.calls.delete);
        self.inner.delete(table, ids, tombstone)
    }
}

impl Store for CountingStore {
    fn begin(&self) -> StoreResult<Arc<dyn Transaction>> {
        bump(&self.calls.begin);
        let inner = self.inner.begin()?;
        Ok(Arc::new(CountingTransaction {
            inner,
            calls: Arc::clone(&self.calls),
        }))
    }

    fn as_executor(&self) -> &dyn Executor {
        self
    }
}

/// A transaction of a [`CountingStore`].
struct CountingTransaction {
    inner: Arc<dyn Transaction>,
    calls: Arc<CallCounts>,
}

impl Executor for CountingTransaction {
    fn find(&self, table: &str, query: &Query) -> StoreResult<Vec<Row>> {
        counted_find(&self.calls, self.inner.as_executor(), table, query)
    }

    fn count(&self, table: &str, query: &Query) -> StoreResult<u64> {
        bump(&self.calls.count);
        self.inner.count(table, query)
    }

    fn insert(&self, table: &str, row: Row) -> StoreResult<Row> {
        bump(&self.calls.insert);
        self.inner.insert(table, row)
    }

    fn save(&self, table: &str, row: Row, preserve: &[&str]) -> StoreResult<Row> {
        bump(&self.calls.save);
        self.inner.save(table, row, preserve)
    }

    fn delete(&self, table: &str, ids: &[u64], tombstone: &Row) -> StoreResult<u64> {
        bump(&self.calls.delete);
        self.inner.delete(table, ids, tombstone)
    }
}

impl Transaction for CountingTransaction {
    fn id(&self) -> TransactionId {
        self.inner.id()
    }

    fn state(&self) -> TransactionState {
        self.inner.state()
    }

    fn commit(&self) -> StoreResult<()> {
        self.inner.commit()
    }

    fn rollback(&self) -> StoreResult<()> {
        self.inner.rollback()
    }

    fn as_executor(&self) -> &dyn Executor {
        self
    }
}
