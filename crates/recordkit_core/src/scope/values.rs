//! Per-request memoized values.

use super::{MemoCell, RequestScope};
use crate::error::{EngineError, EngineResult};
use once_cell::sync::OnceCell;
use std::any::Any;
use std::sync::Arc;

impl RequestScope {
    fn memo_cell(&self, key: &str) -> MemoCell {
        let mut values = self.values.lock();
        Arc::clone(
            values
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new())),
        )
    }

    /// Returns the value memoized under `key`, computing it with `f` first if
    /// needed.
    ///
    /// Concurrent callers with the same key run `f` at most once; the others
    /// wait for its result. A failed computation is not cached.
    ///
    /// # Errors
    ///
    /// Propagates the error of `f`, and returns
    /// [`EngineError::InvalidArgument`] if `key` holds another type.
    pub fn memoize<T, F>(&self, key: &str, f: F) -> EngineResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> EngineResult<T>,
    {
        let cell = self.memo_cell(key);
        let stored = cell.get_or_try_init(|| {
            tracing::trace!(request_id = %self.id, key, "computing memoized value");
            f().map(|value| Arc::new(value) as Arc<dyn Any + Send + Sync>)
        })?;
        downcast(key, stored)
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set_value<T: Send + Sync + 'static>(&self, key: &str, value: T) {
        let cell = OnceCell::with_value(Arc::new(value) as Arc<dyn Any + Send + Sync>);
        self.values.lock().insert(key.to_string(), Arc::new(cell));
    }

    /// Returns the value under `key`, if present and of type `T`.
    #[must_use]
    pub fn get_value<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<T> {
        let cell = self.values.lock().get(key).cloned()?;
        cell.get().and_then(|v| v.downcast_ref::<T>().cloned())
    }
}

fn downcast<T: Clone + 'static>(key: &str, stored: &Arc<dyn Any + Send + Sync>) -> EngineResult<T> {
    stored.downcast_ref::<T>().cloned().ok_or_else(|| {
        EngineError::invalid_argument(format!("request value {key:?} holds a different type"))
    })
}

#[cfg(test)]
mod tests {
    use super::super::ScopeBuilder;
    use crate::config::Config;
    use crate::error::EngineError;
    use recordkit_store::InMemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn scope() -> Arc<super::RequestScope> {
        ScopeBuilder::new(Arc::new(InMemoryStore::new()), Arc::new(Config::default()), None).build()
    }

    #[test]
    fn memoize_runs_once_under_contention() {
        let scope = scope();
        let calls = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let scope = Arc::clone(&scope);
                let calls = Arc::clone(&calls);
                thread::spawn(move || {
                    scope
                        .memoize("customers", || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(10));
                            Ok(vec!["c1".to_string()])
                        })
                        .unwrap()
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), vec!["c1".to_string()]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_memoize_is_retried() {
        let scope = scope();
        let first: Result<u32, _> =
            scope.memoize("n", || Err(EngineError::invalid_argument("not yet")));
        assert!(first.is_err());
        assert_eq!(scope.memoize("n", || Ok(3u32)).unwrap(), 3);
        assert_eq!(scope.memoize("n", || Ok(4u32)).unwrap(), 3);
    }

    #[test]
    fn set_and_get_values() {
        let scope = scope();
        assert_eq!(scope.get_value::<u32>("k"), None);
        scope.set_value("k", 1u32);
        scope.set_value("k", 2u32);
        assert_eq!(scope.get_value::<u32>("k"), Some(2));
        assert_eq!(scope.get_value::<String>("k"), None);
        assert_eq!(scope.memoize("k", || Ok(9u32)).unwrap(), 2);
    }

    #[test]
    fn memoize_type_mismatch_is_an_error() {
        let scope = scope();
        scope.set_value("k", 1u32);
        assert!(scope.memoize("k", || Ok(String::new())).is_err());
    }
}
