//! Builders to construct object pools and register them from configuration.

use crate::config::{PoolConfig, SchedulerConfig};
use crate::core::pool::{ObjectPool, PoolHelper, DEFAULT_POOL_MAX};
use crate::core::registry::{PoolHandle, PoolRegistry};
use crate::core::{AppResult, SchedulerError};

/// Fluent construction of an [`ObjectPool`].
pub struct PoolBuilder<T> {
    key: String,
    max: usize,
    min: usize,
    isolate_panics: bool,
    factory: Box<dyn FnMut() -> AppResult<T>>,
    disposer: Option<Box<dyn FnMut(T)>>,
    helper: Option<Box<dyn PoolHelper<T>>>,
}

impl<T: 'static> PoolBuilder<T> {
    /// Start a pool under `key` producing items with `factory`.
    pub fn new(key: impl Into<String>, factory: impl FnMut() -> AppResult<T> + 'static) -> Self {
        Self {
            key: key.into(),
            max: DEFAULT_POOL_MAX,
            min: 0,
            isolate_panics: true,
            factory: Box::new(factory),
            disposer: None,
            helper: None,
        }
    }

    /// Free-list capacity.
    #[must_use]
    pub const fn with_max(mut self, max: usize) -> Self {
        self.max = max;
        self
    }

    /// Warm-up target.
    #[must_use]
    pub const fn with_min(mut self, min: usize) -> Self {
        self.min = min;
        self
    }

    /// Take `max` and `min` from a pool configuration.
    #[must_use]
    pub const fn with_config(mut self, cfg: &PoolConfig) -> Self {
        self.max = cfg.max;
        self.min = cfg.min;
        self
    }

    /// Disposer for items leaving the pool.
    #[must_use]
    pub fn with_disposer(mut self, disposer: impl FnMut(T) + 'static) -> Self {
        self.disposer = Some(Box::new(disposer));
        self
    }

    /// Reset helper applied on creation and re-spawn.
    #[must_use]
    pub fn with_helper(mut self, helper: impl PoolHelper<T> + 'static) -> Self {
        self.helper = Some(Box::new(helper));
        self
    }

    /// Whether warm-up contains a panicking factory.
    #[must_use]
    pub const fn with_panic_isolation(mut self, isolate: bool) -> Self {
        self.isolate_panics = isolate;
        self
    }

    /// Build the pool without registering it.
    #[must_use]
    pub fn build(self) -> ObjectPool<T> {
        let mut pool = ObjectPool::new(self.key, self.factory, self.max, self.min)
            .with_panic_isolation(self.isolate_panics);
        if let Some(disposer) = self.disposer {
            pool = pool.with_disposer(disposer);
        }
        if let Some(helper) = self.helper {
            pool = pool.with_helper(BoxedHelper(helper));
        }
        pool
    }

    /// Build the pool and register it.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::DuplicatePool`] if the key is already registered.
    pub fn register(self, registry: &PoolRegistry) -> Result<PoolHandle<T>, SchedulerError> {
        registry.register(self.build())
    }
}

struct BoxedHelper<T>(Box<dyn PoolHelper<T>>);

impl<T> PoolHelper<T> for BoxedHelper<T> {
    fn init(&mut self, item: &T) {
        self.0.init(item);
    }

    fn set(&mut self, item: &mut T) {
        self.0.set(item);
    }
}

/// Register every pool declared in `cfg`.
///
/// `resolve` is asked for a builder for each configured key; the configured
/// sizing is applied on top of whatever the builder sets. Keys are registered
/// in sorted order.
///
/// # Errors
///
/// Fails on invalid configuration, on the first resolver error, or on a
/// duplicate key. Pools registered before the failure stay registered.
pub fn register_configured_pools<T, F>(
    cfg: &SchedulerConfig,
    registry: &PoolRegistry,
    mut resolve: F,
) -> Result<Vec<PoolHandle<T>>, SchedulerError>
where
    T: 'static,
    F: FnMut(&str, &PoolConfig) -> Result<PoolBuilder<T>, SchedulerError>,
{
    cfg.validate().map_err(SchedulerError::InvalidConfig)?;

    let mut keys: Vec<&String> = cfg.pools.keys().collect();
    keys.sort();

    let mut handles = Vec::with_capacity(keys.len());
    for key in keys {
        let pool_cfg = &cfg.pools[key];
        let builder = resolve(key, pool_cfg)?.with_config(pool_cfg);
        handles.push(builder.register(registry)?);
    }
    Ok(handles)
}
