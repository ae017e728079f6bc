//! Keyed registry of object pools.
//!
//! Pools of different item types live side by side, stored type-erased and
//! recovered by downcasting. [`PoolHandle`] remembers the item type so the
//! common path needs no turbofish. Pools may also be keyed by their item
//! type alone ([`PoolRegistry::spawn_type`]), in which case a default pool is
//! registered on first use.

use std::any::{type_name, Any};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use tracing::{debug, error, warn};

use crate::core::pool::{ObjectPool, PoolStats, Pooled, DEFAULT_POOL_MAX};
use crate::core::SchedulerError;
use crate::util::ids::PoolId;

/// Type-erased view of an [`ObjectPool`].
trait ErasedPool {
    fn tick(&mut self);
    fn clear(&mut self);
    fn stats(&self) -> PoolStats;
    fn is_warming(&self) -> bool;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: 'static> ErasedPool for ObjectPool<T> {
    fn tick(&mut self) {
        ObjectPool::tick(self);
    }

    fn clear(&mut self) {
        ObjectPool::clear(self);
    }

    fn stats(&self) -> PoolStats {
        ObjectPool::stats(self)
    }

    fn is_warming(&self) -> bool {
        ObjectPool::is_warming(self)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Typed reference to a registered pool.
pub struct PoolHandle<T> {
    key: Rc<str>,
    pool: PoolId,
    _item: PhantomData<fn() -> T>,
}

impl<T> PoolHandle<T> {
    /// Key the pool was registered under.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Identity of the registered pool.
    #[must_use]
    pub const fn pool_id(&self) -> PoolId {
        self.pool
    }
}

impl<T> Clone for PoolHandle<T> {
    fn clone(&self) -> Self {
        Self {
            key: Rc::clone(&self.key),
            pool: self.pool,
            _item: PhantomData,
        }
    }
}

impl<T> fmt::Debug for PoolHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolHandle")
            .field("key", &self.key)
            .field("item", &type_name::<T>())
            .finish()
    }
}

/// Registry of pools keyed by string.
///
/// Cloning yields another handle to the same registry. While a pool's
/// factory, helper or disposer runs, that pool is checked out of the
/// registry: the callback may use any other pool (composite objects), but
/// lookups of its own key report it as unknown until the callback returns.
#[derive(Clone, Default)]
pub struct PoolRegistry {
    pools: Rc<RefCell<HashMap<String, Box<dyn ErasedPool>>>>,
}

/// A pool taken out of the registry map. Put back on drop, unwinding
/// included.
struct Checkout<'a> {
    registry: &'a PoolRegistry,
    key: &'a str,
    pool: Option<Box<dyn ErasedPool>>,
}

impl Checkout<'_> {
    fn typed<T: 'static>(&mut self) -> Option<&mut ObjectPool<T>> {
        self.pool.as_mut()?.as_any_mut().downcast_mut::<ObjectPool<T>>()
    }
}

impl Drop for Checkout<'_> {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            self.registry.restore(self.key, pool);
        }
    }
}

impl PoolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pool under its key.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::DuplicatePool`] if the key is taken.
    pub fn register<T: 'static>(&self, pool: ObjectPool<T>) -> Result<PoolHandle<T>, SchedulerError> {
        let mut pools = self.pools.borrow_mut();
        if pools.contains_key(pool.key()) {
            error!(pool = %pool.key(), "pool already registered");
            return Err(SchedulerError::DuplicatePool(pool.key().to_string()));
        }
        let handle = PoolHandle {
            key: Rc::from(pool.key()),
            pool: pool.id(),
            _item: PhantomData,
        };
        debug!(pool = %pool.key(), max = pool.max(), min = pool.min(), "pool registered");
        pools.insert(pool.key().to_string(), Box::new(pool));
        Ok(handle)
    }

    /// Key used for pools registered by item type.
    #[must_use]
    pub fn type_key<T: 'static>() -> &'static str {
        type_name::<T>()
    }

    /// Register a default pool for `T` under [`type_key`](Self::type_key):
    /// `T::default()` as factory, [`DEFAULT_POOL_MAX`] free slots, no
    /// warm-up. Register an [`ObjectPool`] under the same key to customize.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::DuplicatePool`] if `T` already has a pool.
    pub fn register_type<T: Default + 'static>(&self) -> Result<PoolHandle<T>, SchedulerError> {
        self.register(ObjectPool::new(
            Self::type_key::<T>(),
            || Ok(T::default()),
            DEFAULT_POOL_MAX,
            0,
        ))
    }

    /// Whether `T` has a type-keyed pool.
    #[must_use]
    pub fn has_type_pool<T: 'static>(&self) -> bool {
        self.has_pool(Self::type_key::<T>())
    }

    /// Spawn from the type-keyed pool of `T`, registering a default one
    /// first if needed.
    ///
    /// # Errors
    ///
    /// Fails if the key holds a pool of another item type or the factory
    /// failed.
    pub fn spawn_type<T: Default + 'static>(&self) -> Result<Pooled<T>, SchedulerError> {
        let key = Self::type_key::<T>();
        if !self.has_pool(key) {
            debug!(pool = %key, "registering default pool on first spawn");
            self.register_type::<T>()?;
        }
        self.spawn_by_key(key)
    }

    /// Recycle an item into the type-keyed pool of `T`.
    pub fn recycle_type<T: 'static>(&self, item: Pooled<T>) -> bool {
        self.recycle(Self::type_key::<T>(), item)
    }

    /// Remove the type-keyed pool of `T`, disposing its free items.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::UnknownPool`] if `T` has no pool.
    pub fn clear_type_pool<T: 'static>(&self) -> Result<(), SchedulerError> {
        self.clear_pool(Self::type_key::<T>())
    }

    /// Whether a pool is registered under `key`.
    #[must_use]
    pub fn has_pool(&self, key: &str) -> bool {
        self.pools.borrow().contains_key(key)
    }

    /// All registered keys, sorted.
    #[must_use]
    pub fn pool_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.pools.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Run `f` against the typed pool registered under `key`. The pool is
    /// checked out while `f` runs.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::UnknownPool`] or [`SchedulerError::PoolTypeMismatch`].
    pub fn with_pool<T: 'static, R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut ObjectPool<T>) -> R,
    ) -> Result<R, SchedulerError> {
        let Some(mut checkout) = self.checkout(key) else {
            error!(pool = %key, "unknown pool");
            return Err(SchedulerError::UnknownPool(key.to_string()));
        };
        let Some(pool) = checkout.typed::<T>() else {
            error!(pool = %key, expected = type_name::<T>(), "pool item type mismatch");
            return Err(SchedulerError::PoolTypeMismatch {
                key: key.to_string(),
                expected: type_name::<T>(),
            });
        };
        Ok(f(pool))
    }

    /// Spawn from the pool behind `handle`.
    ///
    /// # Errors
    ///
    /// Fails if the pool was cleared or its factory failed.
    pub fn spawn<T: 'static>(&self, handle: &PoolHandle<T>) -> Result<Pooled<T>, SchedulerError> {
        self.spawn_by_key(handle.key())
    }

    /// Spawn from the pool registered under `key`.
    ///
    /// # Errors
    ///
    /// Fails for unknown keys, a type mismatch, or a failing factory.
    pub fn spawn_by_key<T: 'static>(&self, key: &str) -> Result<Pooled<T>, SchedulerError> {
        self.with_pool(key, ObjectPool::<T>::spawn)?
    }

    /// Recycle an item into the pool registered under `key`.
    ///
    /// Returns `false` when the item was not pooled (unknown pool, foreign
    /// item, or free list full).
    pub fn recycle<T: 'static>(&self, key: &str, item: Pooled<T>) -> bool {
        self.with_pool(key, |pool: &mut ObjectPool<T>| pool.recycle(item))
            .unwrap_or(false)
    }

    /// Remove the pool registered under `key`, disposing its free items.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::UnknownPool`] if nothing is registered.
    pub fn clear_pool(&self, key: &str) -> Result<(), SchedulerError> {
        let removed = self.pools.borrow_mut().remove(key);
        match removed {
            Some(mut pool) => {
                pool.clear();
                debug!(pool = %key, "pool cleared");
                Ok(())
            }
            None => {
                error!(pool = %key, "clear of unknown pool");
                Err(SchedulerError::UnknownPool(key.to_string()))
            }
        }
    }

    /// Remove and clear every pool.
    pub fn clear_pools(&self) {
        let pools = std::mem::take(&mut *self.pools.borrow_mut());
        for (_, mut pool) in pools {
            pool.clear();
        }
    }

    /// Free-list size of the pool under `key`.
    #[must_use]
    pub fn pool_count(&self, key: &str) -> Option<usize> {
        self.pools.borrow().get(key).map(|p| p.stats().pooled)
    }

    /// Outstanding items of the pool under `key`.
    #[must_use]
    pub fn used_count(&self, key: &str) -> Option<usize> {
        self.pools.borrow().get(key).map(|p| p.stats().used)
    }

    /// Whether the pool under `key` is still warming up.
    #[must_use]
    pub fn is_warming(&self, key: &str) -> bool {
        self.pools.borrow().get(key).is_some_and(|p| p.is_warming())
    }

    /// Number of pools that still want warm-up ticks.
    #[must_use]
    pub fn warming_count(&self) -> usize {
        self.pools.borrow().values().filter(|p| p.is_warming()).count()
    }

    /// Advance warm-up of every warming pool by one item, in key order.
    pub fn tick(&self) {
        let mut warming: Vec<String> = self
            .pools
            .borrow()
            .iter()
            .filter(|(_, pool)| pool.is_warming())
            .map(|(key, _)| key.clone())
            .collect();
        warming.sort();
        for key in &warming {
            // A factory may have cleared a pool later in the list.
            if let Some(mut checkout) = self.checkout(key) {
                if let Some(pool) = checkout.pool.as_mut() {
                    pool.tick();
                }
            }
        }
    }

    /// Snapshot of every pool, sorted by key.
    #[must_use]
    pub fn stats(&self) -> Vec<PoolStats> {
        let mut stats: Vec<PoolStats> = self.pools.borrow().values().map(|p| p.stats()).collect();
        stats.sort_by(|a, b| a.key.cmp(&b.key));
        stats
    }

    /// Number of registered pools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.borrow().len()
    }

    /// Whether no pools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pools.borrow().is_empty()
    }
}

impl PoolRegistry {
    fn checkout<'a>(&'a self, key: &'a str) -> Option<Checkout<'a>> {
        let pool = self.pools.borrow_mut().remove(key)?;
        Some(Checkout {
            registry: self,
            key,
            pool: Some(pool),
        })
    }

    fn restore(&self, key: &str, pool: Box<dyn ErasedPool>) {
        let displaced = {
            let mut pools = self.pools.borrow_mut();
            if pools.contains_key(key) {
                Some(pool)
            } else {
                pools.insert(key.to_string(), pool);
                None
            }
        };
        if let Some(mut pool) = displaced {
            warn!(pool = %key, "pool re-registered while in use; clearing the previous one");
            pool.clear();
        }
    }
}

impl fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("keys", &self.pool_keys())
            .finish()
    }
}
