//! Configuration models for the scheduler, its driver and named pools.

pub mod scheduler;

pub use scheduler::{DriverConfig, PoolConfig, SchedulerConfig};
