//! Tests for error types

use tick_scheduler::core::SchedulerError;

#[test]
fn test_duplicate_pool_error() {
    let err = SchedulerError::DuplicatePool("bullet".to_string());
    assert_eq!(format!("{}", err), "pool already registered: bullet");
}

#[test]
fn test_unknown_pool_error() {
    let err = SchedulerError::UnknownPool("missing".to_string());
    assert_eq!(format!("{}", err), "unknown pool: missing");
}

#[test]
fn test_type_mismatch_error() {
    let err = SchedulerError::PoolTypeMismatch {
        key: "bullet".to_string(),
        expected: "u32",
    };
    assert_eq!(format!("{}", err), "pool `bullet` does not hold items of type u32");
}

#[test]
fn test_factory_error() {
    let err = SchedulerError::Factory {
        key: "bullet".to_string(),
        reason: "out of memory".to_string(),
    };
    assert_eq!(
        format!("{}", err),
        "factory failed for pool `bullet`: out of memory"
    );
}

#[test]
fn test_invalid_config_error() {
    let err = SchedulerError::InvalidConfig("tick_hz must be greater than 0".to_string());
    assert_eq!(
        format!("{}", err),
        "invalid configuration: tick_hz must be greater than 0"
    );
}
