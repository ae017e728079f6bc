//! Bounded object pool with background warm-up.
//!
//! A pool keeps a free list of reusable instances. [`ObjectPool::spawn`]
//! hands out an item wrapped in [`Pooled`], which remembers the pool and the
//! item identity so [`ObjectPool::recycle`] can reject foreign or stale items.
//! The free list is capped at `max`; items recycled beyond that are disposed.
//!
//! When the free list holds fewer than `min` items the pool is *warming*:
//! every [`ObjectPool::tick`] creates one instance until `min` is reached.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::core::{guard, AppResult, SchedulerError};
use crate::util::ids::{ItemId, PoolId};

/// Default free-list capacity.
pub const DEFAULT_POOL_MAX: usize = 10;

/// Factory producing fresh pool items.
pub type PoolFactory<T> = Box<dyn FnMut() -> AppResult<T>>;

/// Disposer invoked for items that leave the pool for good.
pub type PoolDisposer<T> = Box<dyn FnMut(T)>;

/// Reset hook for pooled items.
///
/// `init` sees the first instance the pool ever creates and can record it as
/// the baseline; `set` restores an item to that baseline whenever it is
/// handed out again.
pub trait PoolHelper<T> {
    /// Record defaults from the first real instance.
    fn init(&mut self, item: &T);
    /// Reset an item before it is handed out again.
    fn set(&mut self, item: &mut T);
}

/// An item handed out by a pool.
///
/// Dereferences to the item. Give it back with [`ObjectPool::recycle`].
pub struct Pooled<T> {
    pool: PoolId,
    id: ItemId,
    value: T,
}

impl<T> Pooled<T> {
    /// Identity of the item within its pool.
    #[must_use]
    pub const fn id(&self) -> ItemId {
        self.id
    }

    /// Pool that produced the item.
    #[must_use]
    pub const fn pool_id(&self) -> PoolId {
        self.pool
    }
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled")
            .field("pool", &self.pool)
            .field("id", &self.id)
            .field("value", &self.value)
            .finish()
    }
}

/// Snapshot of a pool's occupancy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Pool key.
    pub key: String,
    /// Items sitting in the free list.
    pub pooled: usize,
    /// Items currently handed out.
    pub used: usize,
    /// Free-list capacity.
    pub max: usize,
    /// Warm-up target.
    pub min: usize,
    /// Whether background warm-up is running.
    pub warming: bool,
}

/// Pool of reusable `T` instances.
pub struct ObjectPool<T> {
    id: PoolId,
    key: String,
    max: usize,
    min: usize,
    factory: PoolFactory<T>,
    disposer: Option<PoolDisposer<T>>,
    helper: Option<Box<dyn PoolHelper<T>>>,
    helper_initialized: bool,
    free: VecDeque<(ItemId, T)>,
    used: BTreeSet<ItemId>,
    next_item: u64,
    warming: bool,
    isolate_panics: bool,
}

impl<T> ObjectPool<T> {
    /// Create a pool. `min` is clamped to `max`; a non-zero `min` starts
    /// warm-up right away.
    pub fn new<F>(key: impl Into<String>, factory: F, max: usize, min: usize) -> Self
    where
        F: FnMut() -> AppResult<T> + 'static,
    {
        let key = key.into();
        let min = if min > max {
            warn!(pool = %key, min, max, "pool min exceeds max; clamping");
            max
        } else {
            min
        };
        Self {
            id: PoolId::next(),
            key,
            max,
            min,
            factory: Box::new(factory),
            disposer: None,
            helper: None,
            helper_initialized: false,
            free: VecDeque::new(),
            used: BTreeSet::new(),
            next_item: 0,
            warming: min > 0,
            isolate_panics: true,
        }
    }

    /// Attach a disposer.
    #[must_use]
    pub fn with_disposer<D>(mut self, disposer: D) -> Self
    where
        D: FnMut(T) + 'static,
    {
        self.disposer = Some(Box::new(disposer));
        self
    }

    /// Attach a reset helper.
    #[must_use]
    pub fn with_helper<H>(mut self, helper: H) -> Self
    where
        H: PoolHelper<T> + 'static,
    {
        self.helper = Some(Box::new(helper));
        self
    }

    /// Whether a panicking factory during warm-up is contained.
    #[must_use]
    pub const fn with_panic_isolation(mut self, isolate: bool) -> Self {
        self.isolate_panics = isolate;
        self
    }

    /// Pool key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Pool identity.
    #[must_use]
    pub const fn id(&self) -> PoolId {
        self.id
    }

    /// Free-list capacity.
    #[must_use]
    pub const fn max(&self) -> usize {
        self.max
    }

    /// Warm-up target.
    #[must_use]
    pub const fn min(&self) -> usize {
        self.min
    }

    /// Items in the free list.
    #[must_use]
    pub fn pool_count(&self) -> usize {
        self.free.len()
    }

    /// Items currently handed out.
    #[must_use]
    pub fn used_count(&self) -> usize {
        self.used.len()
    }

    /// Whether warm-up still wants ticks.
    #[must_use]
    pub const fn is_warming(&self) -> bool {
        self.warming
    }

    /// Hand out an item, reusing a free one when available.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Factory`] if a fresh instance was needed and
    /// the factory failed. Nothing is tracked in that case.
    pub fn spawn(&mut self) -> Result<Pooled<T>, SchedulerError> {
        let (id, value) = if let Some((id, mut value)) = self.free.pop_front() {
            if let Some(helper) = self.helper.as_mut() {
                helper.set(&mut value);
            }
            if self.free.len() < self.min {
                self.start_warming();
            }
            (id, value)
        } else {
            let value = self.create()?;
            (self.next_item_id(), value)
        };

        self.used.insert(id);
        Ok(Pooled {
            pool: self.id,
            id,
            value,
        })
    }

    /// Return an item to the pool.
    ///
    /// Returns `true` if the item went back into the free list. Returns
    /// `false` if the free list was full (the item is disposed) or if the item
    /// is not outstanding from this pool (the item is dropped untouched).
    pub fn recycle(&mut self, item: Pooled<T>) -> bool {
        if item.pool != self.id || !self.used.remove(&item.id) {
            warn!(pool = %self.key, item = item.id.get(), "recycle of item not outstanding from this pool");
            return false;
        }
        if self.free.len() < self.max {
            self.free.push_back((item.id, item.value));
            return true;
        }
        self.dispose(item.value);
        false
    }

    /// Visit the identities of every outstanding item.
    pub fn every(&self, mut visitor: impl FnMut(ItemId)) {
        for id in &self.used {
            visitor(*id);
        }
    }

    /// Dispose every free item, forget outstanding ones and stop warm-up.
    pub fn clear(&mut self) {
        let free = std::mem::take(&mut self.free);
        for (_, value) in free {
            self.dispose(value);
        }
        self.used.clear();
        self.warming = false;
    }

    /// One warm-up step: create a single instance while below `min`.
    pub fn tick(&mut self) {
        if !self.warming {
            return;
        }
        if self.free.len() >= self.min {
            self.warming = false;
            return;
        }

        let isolate = self.isolate_panics;
        match guard::invoke(isolate, "pool factory", || self.create()) {
            Some(Ok(value)) => {
                let id = self.next_item_id();
                self.free.push_back((id, value));
            }
            Some(Err(e)) => {
                error!(pool = %self.key, error = %e, "warm-up factory failed; stopping warm-up");
                self.warming = false;
                return;
            }
            None => {
                self.warming = false;
                return;
            }
        }

        if self.free.len() >= self.min {
            self.warming = false;
            debug!(pool = %self.key, pooled = self.free.len(), "warm-up finished");
        }
    }

    /// Occupancy snapshot.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            key: self.key.clone(),
            pooled: self.free.len(),
            used: self.used.len(),
            max: self.max,
            min: self.min,
            warming: self.warming,
        }
    }

    fn start_warming(&mut self) {
        if !self.warming {
            debug!(pool = %self.key, "warm-up started");
            self.warming = true;
        }
    }

    fn next_item_id(&mut self) -> ItemId {
        self.next_item += 1;
        ItemId::new(self.next_item)
    }

    fn create(&mut self) -> Result<T, SchedulerError> {
        let mut value = (self.factory)().map_err(|e| SchedulerError::Factory {
            key: self.key.clone(),
            reason: format!("{e:#}"),
        })?;
        if let Some(helper) = self.helper.as_mut() {
            if self.helper_initialized {
                helper.set(&mut value);
            } else {
                helper.init(&value);
                self.helper_initialized = true;
            }
        }
        Ok(value)
    }

    fn dispose(&mut self, value: T) {
        if let Some(disposer) = self.disposer.as_mut() {
            disposer(value);
        }
    }
}

impl<T> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("key", &self.key)
            .field("max", &self.max)
            .field("min", &self.min)
            .field("pooled", &self.free.len())
            .field("used", &self.used.len())
            .field("warming", &self.warming)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[derive(Debug, Default)]
    struct Bullet {
        speed: u32,
    }

    struct SpeedReset {
        baseline: Option<u32>,
        inits: Rc<Cell<u32>>,
        sets: Rc<Cell<u32>>,
    }

    impl PoolHelper<Bullet> for SpeedReset {
        fn init(&mut self, item: &Bullet) {
            self.baseline = Some(item.speed);
            self.inits.set(self.inits.get() + 1);
        }

        fn set(&mut self, item: &mut Bullet) {
            item.speed = self.baseline.unwrap_or_default();
            self.sets.set(self.sets.get() + 1);
        }
    }

    fn bullets(max: usize, min: usize) -> ObjectPool<Bullet> {
        ObjectPool::new("bullet", || Ok(Bullet { speed: 3 }), max, min)
    }

    #[test]
    fn spawn_creates_then_reuses() {
        let mut pool = bullets(4, 0);
        let a = pool.spawn().unwrap();
        let id = a.id();
        assert_eq!(pool.used_count(), 1);
        assert!(pool.recycle(a));
        assert_eq!(pool.pool_count(), 1);

        let b = pool.spawn().unwrap();
        assert_eq!(b.id(), id);
        assert_eq!(pool.pool_count(), 0);
    }

    #[test]
    fn recycle_beyond_max_disposes() {
        let disposed = Rc::new(Cell::new(0));
        let counter = Rc::clone(&disposed);
        let mut pool = bullets(2, 0).with_disposer(move |_| counter.set(counter.get() + 1));

        let items: Vec<_> = (0..3).map(|_| pool.spawn().unwrap()).collect();
        let results: Vec<bool> = items.into_iter().map(|i| pool.recycle(i)).collect();

        assert_eq!(results, vec![true, true, false]);
        assert_eq!(pool.pool_count(), 2);
        assert_eq!(disposed.get(), 1);
    }

    #[test]
    fn recycle_rejects_foreign_items() {
        let mut a = bullets(4, 0);
        let mut b = bullets(4, 0);
        let item = a.spawn().unwrap();
        assert!(!b.recycle(item));
        assert_eq!(b.pool_count(), 0);
        assert_eq!(a.used_count(), 1);
    }

    #[test]
    fn recycle_after_clear_is_rejected() {
        let mut pool = bullets(4, 0);
        let item = pool.spawn().unwrap();
        pool.clear();
        assert!(!pool.recycle(item));
        assert_eq!(pool.pool_count(), 0);
    }

    #[test]
    fn helper_init_once_then_set() {
        let inits = Rc::new(Cell::new(0));
        let sets = Rc::new(Cell::new(0));
        let mut pool = bullets(2, 0).with_helper(SpeedReset {
            baseline: None,
            inits: Rc::clone(&inits),
            sets: Rc::clone(&sets),
        });

        let mut first = pool.spawn().unwrap();
        first.speed = 99;
        let second = pool.spawn().unwrap();
        assert_eq!(inits.get(), 1);
        assert_eq!(sets.get(), 1);

        pool.recycle(first);
        let reused = pool.spawn().unwrap();
        assert_eq!(reused.speed, 3);
        assert_eq!(inits.get(), 1);
        assert_eq!(sets.get(), 2);
        drop(second);
    }

    #[test]
    fn factory_error_leaves_no_state() {
        let mut pool: ObjectPool<Bullet> =
            ObjectPool::new("broken", || Err(anyhow::anyhow!("no ammo")), 4, 0);
        let err = pool.spawn().unwrap_err();
        assert!(matches!(err, SchedulerError::Factory { .. }));
        assert_eq!(pool.used_count(), 0);
        assert_eq!(pool.pool_count(), 0);
    }

    #[test]
    fn warm_up_one_item_per_tick() {
        let mut pool = bullets(20, 3);
        assert!(pool.is_warming());
        pool.tick();
        assert_eq!(pool.pool_count(), 1);
        pool.tick();
        pool.tick();
        assert_eq!(pool.pool_count(), 3);
        assert!(!pool.is_warming());
        pool.tick();
        assert_eq!(pool.pool_count(), 3);
    }

    #[test]
    fn spawning_below_min_restarts_warm_up() {
        let mut pool = bullets(20, 2);
        pool.tick();
        pool.tick();
        assert!(!pool.is_warming());
        let item = pool.spawn().unwrap();
        assert!(pool.is_warming());
        pool.tick();
        assert_eq!(pool.pool_count(), 2);
        drop(item);
    }

    #[test]
    fn clear_disposes_free_items_and_halts_warm_up() {
        let disposed = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&disposed);
        let mut pool = bullets(10, 5).with_disposer(move |b: Bullet| sink.borrow_mut().push(b.speed));
        pool.tick();
        pool.tick();
        let _out = pool.spawn().unwrap();
        pool.clear();
        assert_eq!(disposed.borrow().len(), 1);
        assert_eq!(pool.used_count(), 0);
        assert!(!pool.is_warming());
    }

    #[test]
    fn every_visits_only_outstanding() {
        let mut pool = bullets(10, 0);
        let a = pool.spawn().unwrap();
        let b = pool.spawn().unwrap();
        pool.recycle(a);
        let mut seen = Vec::new();
        pool.every(|id| seen.push(id));
        assert_eq!(seen, vec![b.id()]);
    }

    #[test]
    fn panicking_factory_during_warm_up_stops_warming() {
        let mut pool: ObjectPool<Bullet> =
            ObjectPool::new("panicky", || panic!("factory exploded"), 4, 2);
        pool.tick();
        assert!(!pool.is_warming());
        assert_eq!(pool.pool_count(), 0);
    }

    #[test]
    fn min_is_clamped_to_max() {
        let pool = bullets(2, 5);
        assert_eq!(pool.min(), 2);
    }
}
