//! Request-scoped entity identity cache.
//!
//! Every entity bound to a [`crate::Model`] lives here under an
//! [`IdentityKey`], so later calls in the same request see the same instance
//! without re-querying. Entries expire at the request deadline, or after the
//! configured TTL when the request has none.

use crate::error::{EngineError, EngineResult};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A shared, lockable entity instance.
pub type EntityRef<T> = Arc<RwLock<T>>;

/// Handle of one registered instance within one request scope.
///
/// Keys are allocated from a per-registry counter and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IdentityKey(u64);

impl IdentityKey {
    /// Returns the raw key value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Slot {
    value: Arc<dyn Any + Send + Sync>,
    expires_at: Instant,
}

impl Slot {
    fn typed<T: Send + Sync + 'static>(&self) -> Option<EntityRef<T>> {
        Arc::clone(&self.value).downcast::<RwLock<T>>().ok()
    }
}

#[derive(Default)]
struct Inner {
    next: u64,
    slots: HashMap<IdentityKey, Slot>,
}

/// The identity cache of one request.
pub struct EntityRegistry {
    inner: Mutex<Inner>,
    ttl: Duration,
    deadline: Option<Instant>,
}

impl EntityRegistry {
    /// Creates an empty registry.
    ///
    /// Entries expire at `deadline` if given, otherwise `ttl` after insertion.
    #[must_use]
    pub fn new(ttl: Duration, deadline: Option<Instant>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            ttl,
            deadline,
        }
    }

    fn expiry(&self) -> Instant {
        self.deadline.unwrap_or_else(|| Instant::now() + self.ttl)
    }

    fn slot<T: Send + Sync + 'static>(&self, instance: EntityRef<T>) -> Slot {
        Slot {
            value: instance,
            expires_at: self.expiry(),
        }
    }

    /// Registers a new instance under a fresh key.
    pub fn register<T: Send + Sync + 'static>(&self, instance: T) -> (IdentityKey, EntityRef<T>) {
        let shared = Arc::new(RwLock::new(instance));
        let slot = self.slot(Arc::clone(&shared));
        let mut inner = self.inner.lock();
        inner.next += 1;
        let key = IdentityKey(inner.next);
        inner.slots.insert(key, slot);
        tracing::trace!(key = key.0, "entity registered");
        (key, shared)
    }

    /// Stores `instance` under `key`, replacing any previous entry.
    pub fn put<T: Send + Sync + 'static>(&self, key: IdentityKey, instance: EntityRef<T>) {
        let slot = self.slot(instance);
        let mut inner = self.inner.lock();
        inner.next = inner.next.max(key.0);
        inner.slots.insert(key, slot);
    }

    /// Returns the live instance under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotRegistered`] if the entry is missing,
    /// expired, or holds another type.
    pub fn get<T: Send + Sync + 'static>(&self, key: IdentityKey) -> EngineResult<EntityRef<T>> {
        let inner = self.inner.lock();
        Self::live(&inner, key)
            .and_then(|slot| slot.typed::<T>())
            .ok_or(EngineError::NotRegistered { key: key.0 })
    }

    /// Returns the live instance under `key`, computing and storing it first
    /// if there is none.
    ///
    /// `f` runs while the registry is locked, so concurrent callers never
    /// both compute.
    ///
    /// # Errors
    ///
    /// Propagates the error of `f`, and returns
    /// [`EngineError::NotRegistered`] if the entry holds another type.
    pub fn get_or_insert_with<T, F>(&self, key: IdentityKey, f: F) -> EngineResult<EntityRef<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> EngineResult<T>,
    {
        let mut inner = self.inner.lock();
        if let Some(slot) = Self::live(&inner, key) {
            return slot
                .typed()
                .ok_or(EngineError::NotRegistered { key: key.0 });
        }
        let shared = Arc::new(RwLock::new(f()?));
        let slot = self.slot(Arc::clone(&shared));
        inner.next = inner.next.max(key.0);
        inner.slots.insert(key, slot);
        Ok(shared)
    }

    /// Removes the entry under `key`. Returns true if one was present.
    pub fn remove(&self, key: IdentityKey) -> bool {
        self.inner.lock().slots.remove(&key).is_some()
    }

    /// Drops every expired entry and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let before = inner.slots.len();
        inner.slots.retain(|_, slot| slot.expires_at > now);
        let purged = before - inner.slots.len();
        if purged > 0 {
            tracing::debug!(purged, "expired registry entries purged");
        }
        purged
    }

    /// Returns the number of entries, expired ones included until purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Expired slots are hidden here and dropped by [`Self::purge_expired`].
    fn live(inner: &Inner, key: IdentityKey) -> Option<&Slot> {
        inner
            .slots
            .get(&key)
            .filter(|slot| slot.expires_at > Instant::now())
    }
}

impl fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("entries", &self.len())
            .field("ttl", &self.ttl)
            .field("deadline", &self.deadline)
            .finish()
    }
}
