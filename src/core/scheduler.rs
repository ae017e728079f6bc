//! The per-frame entry point owning every service.

use std::cell::Cell;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::SchedulerConfig;
use crate::core::pool::PoolStats;
use crate::core::registry::PoolRegistry;
use crate::core::task::TaskQueue;
use crate::core::time::FrameTime;
use crate::core::timer::TimerService;
use crate::core::trigger::TriggerDispatcher;
use crate::core::SchedulerError;

/// Serializable snapshot of scheduler occupancy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Ticks processed so far.
    pub frame: u64,
    /// Tasks waiting in the FIFO and its pending buffer.
    pub pending_tasks: usize,
    /// Tasks waiting in the thread-safe buffer.
    pub pending_safe_tasks: usize,
    /// Current per-frame task budget.
    pub weight_per_frame: u32,
    /// Bound timers.
    pub timers: usize,
    /// Bound triggers.
    pub triggers: usize,
    /// Whether the trigger dispatcher wants ticks.
    pub triggers_subscribed: bool,
    /// Per-pool occupancy, sorted by key.
    pub pools: Vec<PoolStats>,
}

/// Owns the pool registry, timers, triggers and tasks, and advances them
/// from one host-supplied tick.
///
/// Each tick runs, in order: timers, triggers, tasks, pool warm-up. Service
/// handles returned by the accessors are cheap clones sharing state with the
/// scheduler and may be captured by callbacks.
pub struct Scheduler {
    config: SchedulerConfig,
    pools: PoolRegistry,
    timers: TimerService,
    triggers: TriggerDispatcher,
    tasks: TaskQueue,
    frame: Cell<u64>,
}

impl Scheduler {
    /// Build a scheduler from validated configuration.
    ///
    /// Pools named in the configuration are not registered here; see
    /// [`crate::builders::register_configured_pools`].
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidConfig`] if validation fails.
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;
        debug!(
            weight_per_frame = config.weight_per_frame,
            isolate_panics = config.isolate_panics,
            pools = config.pools.len(),
            "scheduler created"
        );
        Ok(Self::from_validated(config))
    }

    fn from_validated(config: SchedulerConfig) -> Self {
        let isolate = config.isolate_panics;
        Self {
            pools: PoolRegistry::new(),
            timers: TimerService::new(isolate),
            triggers: TriggerDispatcher::new(isolate),
            tasks: TaskQueue::new(config.weight_per_frame, isolate),
            frame: Cell::new(0),
            config,
        }
    }

    /// Advance every service by one frame.
    pub fn tick(&self, time: FrameTime) {
        let frame = self.frame.get() + 1;
        self.frame.set(frame);
        trace!(frame, scaled = time.scaled, unscaled = time.unscaled, "tick");

        self.timers.tick(time);
        if self.triggers.is_subscribed() {
            self.triggers.tick();
        }
        self.tasks.tick();
        if self.pools.warming_count() > 0 {
            self.pools.tick();
        }
    }

    /// Advance by explicit scaled and unscaled deltas, in seconds.
    pub fn tick_secs(&self, scaled: f32, unscaled: f32) {
        self.tick(FrameTime::new(scaled, unscaled));
    }

    /// Configuration the scheduler was built from.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Keyed object pools.
    #[must_use]
    pub const fn pools(&self) -> &PoolRegistry {
        &self.pools
    }

    /// Timer service.
    #[must_use]
    pub const fn timers(&self) -> &TimerService {
        &self.timers
    }

    /// Trigger dispatcher.
    #[must_use]
    pub const fn triggers(&self) -> &TriggerDispatcher {
        &self.triggers
    }

    /// Task queue.
    #[must_use]
    pub const fn tasks(&self) -> &TaskQueue {
        &self.tasks
    }

    /// Ticks processed so far.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame.get()
    }

    /// Occupancy snapshot.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            frame: self.frame.get(),
            pending_tasks: self.tasks.pending_len(),
            pending_safe_tasks: self.tasks.safe_pending_len(),
            weight_per_frame: self.tasks.weight_per_frame(),
            timers: self.timers.len(),
            triggers: self.triggers.len(),
            triggers_subscribed: self.triggers.is_subscribed(),
            pools: self.pools.stats(),
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::from_validated(SchedulerConfig::default())
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("frame", &self.frame.get())
            .field("pools", &self.pools)
            .field("timers", &self.timers)
            .field("triggers", &self.triggers)
            .field("tasks", &self.tasks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::timer::Timer;
    use std::rc::Rc;

    #[test]
    fn rejects_invalid_config() {
        let config = SchedulerConfig {
            weight_per_frame: 0,
            ..SchedulerConfig::default()
        };
        assert!(matches!(
            Scheduler::new(config),
            Err(SchedulerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn task_pushed_by_timer_runs_in_the_same_tick() {
        let scheduler = Scheduler::default();
        let order: Rc<std::cell::RefCell<Vec<&str>>> = Rc::default();

        let tasks = scheduler.tasks().clone();
        let sink = Rc::clone(&order);
        scheduler.timers().bind(Timer::new(0.0, move |_| {
            sink.borrow_mut().push("timer");
            let inner = Rc::clone(&sink);
            tasks.push_task(move || inner.borrow_mut().push("task"), 1);
        }));

        scheduler.tick_secs(0.016, 0.016);
        assert_eq!(*order.borrow(), vec!["timer", "task"]);
        scheduler.tick_secs(0.016, 0.016);
        assert_eq!(*order.borrow(), vec!["timer", "task"]);
        assert_eq!(scheduler.frame(), 2);
    }

    #[test]
    fn stats_serialize() {
        let scheduler = Scheduler::default();
        scheduler.tasks().push_task(|| {}, 1);
        let stats = scheduler.stats();
        assert_eq!(stats.pending_tasks, 1);
        assert_eq!(stats.weight_per_frame, 5);
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"pending_tasks\":1"));
    }
}
