//! Tests for pool builders

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use tick_scheduler::builders::{register_configured_pools, PoolBuilder};
use tick_scheduler::config::{PoolConfig, SchedulerConfig};
use tick_scheduler::core::{PoolHelper, PoolRegistry, SchedulerError};

#[derive(Debug, Default)]
struct Enemy {
    hp: u32,
}

struct HpReset {
    baseline: u32,
}

impl PoolHelper<Enemy> for HpReset {
    fn init(&mut self, item: &Enemy) {
        self.baseline = item.hp;
    }

    fn set(&mut self, item: &mut Enemy) {
        item.hp = self.baseline;
    }
}

#[test]
fn test_builder_applies_sizing_and_hooks() {
    let registry = PoolRegistry::new();
    let disposed = Rc::new(Cell::new(0));
    let sink = Rc::clone(&disposed);

    let handle = PoolBuilder::new("enemy", || Ok(Enemy { hp: 100 }))
        .with_max(1)
        .with_disposer(move |_| sink.set(sink.get() + 1))
        .with_helper(HpReset { baseline: 0 })
        .register(&registry)
        .unwrap();

    let mut a = registry.spawn(&handle).unwrap();
    let b = registry.spawn(&handle).unwrap();
    a.hp = 3;
    assert!(registry.recycle(handle.key(), a));
    assert!(!registry.recycle(handle.key(), b));
    assert_eq!(disposed.get(), 1);

    let again = registry.spawn(&handle).unwrap();
    assert_eq!(again.hp, 100);
}

#[test]
fn test_builder_with_config_sets_min() {
    let pool = PoolBuilder::new("enemy", || Ok(Enemy::default()))
        .with_config(&PoolConfig { max: 8, min: 3 })
        .build();
    assert_eq!(pool.max(), 8);
    assert_eq!(pool.min(), 3);
    assert!(pool.is_warming());
}

#[test]
fn test_register_configured_pools() {
    let mut pools = HashMap::new();
    pools.insert("small".to_string(), PoolConfig { max: 2, min: 1 });
    pools.insert("large".to_string(), PoolConfig { max: 50, min: 0 });
    let cfg = SchedulerConfig {
        pools,
        ..SchedulerConfig::default()
    };

    let registry = PoolRegistry::new();
    let handles = register_configured_pools(&cfg, &registry, |key, _| {
        let label = key.to_string();
        Ok(PoolBuilder::new(key, move || Ok(label.clone())))
    })
    .unwrap();

    let keys: Vec<&str> = handles.iter().map(|h| h.key()).collect();
    assert_eq!(keys, vec!["large", "small"]);
    assert_eq!(registry.pool_keys(), vec!["large".to_string(), "small".to_string()]);
    assert!(registry.is_warming("small"));
    assert!(!registry.is_warming("large"));

    let item = registry.spawn(&handles[1]).unwrap();
    assert_eq!(item.as_str(), "small");
}

#[test]
fn test_register_configured_pools_propagates_resolver_error() {
    let mut pools = HashMap::new();
    pools.insert("unknown".to_string(), PoolConfig::default());
    let cfg = SchedulerConfig {
        pools,
        ..SchedulerConfig::default()
    };

    let registry = PoolRegistry::new();
    let err = register_configured_pools::<String, _>(&cfg, &registry, |key, _| {
        Err(SchedulerError::UnknownPool(key.to_string()))
    })
    .unwrap_err();
    assert!(matches!(err, SchedulerError::UnknownPool(_)));
    assert!(registry.is_empty());
}

#[test]
fn test_register_configured_pools_rejects_invalid_config() {
    let mut pools = HashMap::new();
    pools.insert("bad".to_string(), PoolConfig { max: 1, min: 4 });
    let cfg = SchedulerConfig {
        pools,
        ..SchedulerConfig::default()
    };

    let registry = PoolRegistry::new();
    let err = register_configured_pools(&cfg, &registry, |key, _| {
        Ok(PoolBuilder::new(key, || Ok(0u8)))
    })
    .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidConfig(_)));
}
