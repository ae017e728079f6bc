//! Tests for configuration validation

use std::io::Write;

use tick_scheduler::config::{DriverConfig, PoolConfig, SchedulerConfig};

#[test]
fn test_defaults() {
    let cfg = SchedulerConfig::default();
    assert_eq!(cfg.weight_per_frame, 5);
    assert!(cfg.isolate_panics);
    assert_eq!(cfg.driver.tick_hz, 60);
    assert_eq!(cfg.driver.max_dt_ms, 250);
    assert!(cfg.pools.is_empty());
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_pool_config_validation() {
    let valid = PoolConfig { max: 20, min: 5 };
    assert!(valid.validate().is_ok());
}

#[test]
fn test_pool_config_min_above_max() {
    let invalid = PoolConfig { max: 2, min: 5 };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_pool_config_zero_max() {
    let invalid = PoolConfig { max: 0, min: 0 };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_driver_config_validation() {
    let zero_rate = DriverConfig {
        tick_hz: 0,
        ..DriverConfig::default()
    };
    assert!(zero_rate.validate().is_err());

    let bad_scale = DriverConfig {
        time_scale: f32::NAN,
        ..DriverConfig::default()
    };
    assert!(bad_scale.validate().is_err());

    let paused = DriverConfig {
        time_scale: 0.0,
        ..DriverConfig::default()
    };
    assert!(paused.validate().is_ok());
}

#[test]
fn test_driver_period() {
    let cfg = DriverConfig {
        tick_hz: 4,
        ..DriverConfig::default()
    };
    assert_eq!(cfg.period().as_millis(), 250);
}

#[test]
fn test_scheduler_config_from_json() {
    let json = r#"{
        "weight_per_frame": 8,
        "pools": {
            "bullet": { "max": 20, "min": 5 },
            "enemy": { "min": 2 }
        }
    }"#;

    let cfg = SchedulerConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.weight_per_frame, 8);
    assert!(cfg.isolate_panics);
    assert_eq!(cfg.pools.len(), 2);
    assert_eq!(cfg.pools["bullet"], PoolConfig { max: 20, min: 5 });
    assert_eq!(cfg.pools["enemy"].max, 10);
}

#[test]
fn test_scheduler_config_rejects_invalid_pool() {
    let json = r#"{ "pools": { "bullet": { "max": 1, "min": 3 } } }"#;
    let err = SchedulerConfig::from_json_str(json).unwrap_err();
    assert!(err.contains("bullet"));
}

#[test]
fn test_scheduler_config_rejects_zero_budget() {
    let err = SchedulerConfig::from_json_str(r#"{ "weight_per_frame": 0 }"#).unwrap_err();
    assert!(err.contains("weight_per_frame"));
}

#[test]
fn test_scheduler_config_parse_error() {
    let err = SchedulerConfig::from_json_str("{ not json").unwrap_err();
    assert!(err.starts_with("parse error"));
}

#[test]
fn test_scheduler_config_from_file() {
    let path = std::env::temp_dir().join(format!("tick_scheduler_cfg_{}.json", std::process::id()));
    {
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{ "driver": {{ "tick_hz": 30 }} }}"#).unwrap();
    }
    let cfg = SchedulerConfig::from_json_file(&path).unwrap();
    assert_eq!(cfg.driver.tick_hz, 30);
    assert_eq!(cfg.driver.max_dt_ms, 250);
    std::fs::remove_file(&path).unwrap();

    assert!(SchedulerConfig::from_json_file(&path).is_err());
}
