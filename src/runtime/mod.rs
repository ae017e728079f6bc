//! Runtime adapters that drive the scheduler from a host loop.

pub mod tick_driver;

pub use tick_driver::{run_blocking, TickDriver};
