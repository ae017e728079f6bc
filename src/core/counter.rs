//! Periodic rate reporting on top of [`TimerService`].

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::core::timer::{Timer, TimerService};
use crate::util::ids::TimerId;

/// Accumulates values and reports the running total once per period,
/// resetting it afterwards. Useful for frames-per-second style counters.
pub struct RateCounter {
    total: Rc<Cell<i64>>,
    timers: TimerService,
    timer: Option<TimerId>,
}

impl RateCounter {
    /// Create a stopped counter reporting through `timers`.
    #[must_use]
    pub fn new(timers: &TimerService) -> Self {
        Self {
            total: Rc::new(Cell::new(0)),
            timers: timers.clone(),
            timer: None,
        }
    }

    /// Add `value` to the current period.
    pub fn add(&self, value: i64) {
        self.total.set(self.total.get() + value);
    }

    /// Total accumulated in the current period.
    #[must_use]
    pub fn current(&self) -> i64 {
        self.total.get()
    }

    /// Start reporting every `period` seconds. A running report is replaced.
    pub fn start(&mut self, period: f32, unscaled: bool, mut on_report: impl FnMut(i64) + 'static) {
        self.stop();
        let total = Rc::clone(&self.total);
        let id = self.timers.bind(
            Timer::new(period, move |_| on_report(total.replace(0)))
                .forever()
                .unscaled(unscaled),
        );
        self.timer = Some(id);
    }

    /// Whether periodic reporting is active.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Stop reporting. The accumulated total is kept.
    pub fn stop(&mut self) {
        if let Some(id) = self.timer.take() {
            self.timers.unbind(id);
        }
    }
}

impl Drop for RateCounter {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for RateCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateCounter")
            .field("current", &self.current())
            .field("timer", &self.timer)
            .finish_non_exhaustive()
    }
}
