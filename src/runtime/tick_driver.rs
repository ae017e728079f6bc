//! Fixed-rate host loop on a tokio interval.

use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::{DriverConfig, SchedulerConfig};
use crate::core::time::FrameClock;
use crate::core::{AppResult, Scheduler};

/// Drives a [`Scheduler`] at a fixed rate, measuring real elapsed time
/// between ticks.
///
/// The scheduler is `!Send`, so the futures returned here must run on a
/// current-thread runtime or inside a `LocalSet`.
#[derive(Debug, Clone)]
pub struct TickDriver {
    period: Duration,
    clock: FrameClock,
}

impl TickDriver {
    /// Create a driver from host loop settings.
    #[must_use]
    pub fn new(cfg: &DriverConfig) -> Self {
        Self {
            period: cfg.period(),
            clock: FrameClock::new(cfg.max_dt(), cfg.time_scale),
        }
    }

    /// Create a driver from the scheduler's own configuration.
    #[must_use]
    pub fn for_scheduler(scheduler: &Scheduler) -> Self {
        Self::new(&scheduler.config().driver)
    }

    /// Interval between ticks.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Clock producing frame times.
    #[must_use]
    pub const fn clock(&self) -> &FrameClock {
        &self.clock
    }

    /// Mutable clock access, e.g. to change the time scale between runs.
    pub fn clock_mut(&mut self) -> &mut FrameClock {
        &mut self.clock
    }

    /// Tick `scheduler` until `stop` returns true. `stop` is checked before
    /// every tick. Returns the number of ticks run.
    pub async fn run_until(
        &mut self,
        scheduler: &Scheduler,
        mut stop: impl FnMut(&Scheduler) -> bool,
    ) -> u64 {
        let mut interval = time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately and only anchors the clock.
        interval.tick().await;
        let mut last = Instant::now();

        debug!(period = ?self.period, "tick driver started");
        let mut ticks = 0u64;
        while !stop(scheduler) {
            interval.tick().await;
            let now = Instant::now();
            let frame = self.clock.advance(now.duration_since(last));
            last = now;
            scheduler.tick(frame);
            ticks += 1;
        }
        debug!(ticks, "tick driver stopped");
        ticks
    }

    /// Tick `scheduler` exactly `frames` times.
    pub async fn run_frames(&mut self, scheduler: &Scheduler, frames: u64) -> u64 {
        let mut remaining = frames;
        self.run_until(scheduler, move |_| {
            if remaining == 0 {
                return true;
            }
            remaining -= 1;
            false
        })
        .await
    }
}

/// Build a current-thread runtime and drive `scheduler` on it until `stop`
/// returns true.
///
/// # Errors
///
/// Fails if the runtime cannot be built.
pub fn run_blocking(
    config: &SchedulerConfig,
    scheduler: &Scheduler,
    stop: impl FnMut(&Scheduler) -> bool,
) -> AppResult<u64> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let mut driver = TickDriver::new(&config.driver);
    let ticks = runtime.block_on(driver.run_until(scheduler, stop));
    info!(ticks, "blocking tick loop finished");
    Ok(ticks)
}
