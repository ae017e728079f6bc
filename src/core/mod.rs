//! Core scheduling services: pools, timers, triggers and tasks.

pub mod counter;
pub mod error;
pub(crate) mod guard;
pub mod pool;
pub mod registry;
pub mod scheduler;
pub mod task;
pub mod time;
pub mod timer;
pub mod trigger;

pub use counter::RateCounter;
pub use error::{AppResult, SchedulerError};
pub use pool::{ObjectPool, PoolHelper, PoolStats, Pooled};
pub use registry::{PoolHandle, PoolRegistry};
pub use scheduler::{Scheduler, SchedulerStats};
pub use task::{
    chain_step, step, AsyncStep, ChainStep, Continuation, ProgressFn, SafeTaskSender, StepHandle,
    TaskQueue,
};
pub use time::{FrameClock, FrameTime};
pub use timer::{Timer, TimerService};
pub use trigger::TriggerDispatcher;
