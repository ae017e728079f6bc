//! Delayed and repeating callbacks advanced by the frame delta.
//!
//! Binds and unbinds are staged and applied at the start of the next
//! [`TimerService::tick`], so callbacks may bind or unbind any timer
//! (including their own) without disturbing the pass in progress.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace, warn};

use crate::core::guard;
use crate::core::time::FrameTime;
use crate::util::ids::TimerId;

/// Description of a timer to bind.
///
/// Defaults: fire once, no delay, scaled time.
pub struct Timer {
    duration: f32,
    delay: f32,
    repeat: u32,
    unscaled: bool,
    on_fire: Box<dyn FnMut(u32)>,
    on_complete: Option<Box<dyn FnOnce()>>,
}

impl Timer {
    /// Fire `on_fire` after `duration` seconds. The callback receives how
    /// many times the timer has fired, starting at 1.
    pub fn new(duration: f32, on_fire: impl FnMut(u32) + 'static) -> Self {
        Self {
            duration,
            delay: 0.0,
            repeat: 1,
            unscaled: false,
            on_fire: Box::new(on_fire),
            on_complete: None,
        }
    }

    /// Single-shot timer that only cares about completion.
    pub fn once(duration: f32, on_complete: impl FnOnce() + 'static) -> Self {
        let mut pending = Some(on_complete);
        Self::new(duration, move |_| {
            if let Some(f) = pending.take() {
                f();
            }
        })
    }

    /// Fire `n` times; `0` repeats forever.
    #[must_use]
    pub const fn repeat(mut self, n: u32) -> Self {
        self.repeat = n;
        self
    }

    /// Repeat until unbound.
    #[must_use]
    pub const fn forever(self) -> Self {
        self.repeat(0)
    }

    /// Extra seconds before the first fire.
    #[must_use]
    pub const fn delay(mut self, secs: f32) -> Self {
        self.delay = secs;
        self
    }

    /// Count down with unscaled time.
    #[must_use]
    pub const fn unscaled(mut self, unscaled: bool) -> Self {
        self.unscaled = unscaled;
        self
    }

    /// Callback run after the last fire.
    #[must_use]
    pub fn on_complete(mut self, f: impl FnOnce() + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("duration", &self.duration)
            .field("delay", &self.delay)
            .field("repeat", &self.repeat)
            .field("unscaled", &self.unscaled)
            .finish_non_exhaustive()
    }
}

struct TimerEntry {
    id: TimerId,
    duration: f32,
    remain: f32,
    repeat: u32,
    count: u32,
    unscaled: bool,
    on_fire: Box<dyn FnMut(u32)>,
    on_complete: Option<Box<dyn FnOnce()>>,
}

impl TimerEntry {
    fn new(id: TimerId, timer: Timer) -> Self {
        Self {
            id,
            duration: timer.duration,
            remain: timer.duration + timer.delay,
            repeat: timer.repeat,
            count: 0,
            unscaled: timer.unscaled,
            on_fire: timer.on_fire,
            on_complete: timer.on_complete,
        }
    }

    /// Advance by `dt`; returns true once the timer is finished.
    fn advance(&mut self, dt: f32, isolate: bool) -> bool {
        self.remain -= dt;
        if self.remain > 0.0 {
            return false;
        }

        self.count += 1;
        let count = self.count;
        let on_fire = &mut self.on_fire;
        guard::invoke(isolate, "timer on_fire", || on_fire(count));
        // Overshoot carries into the next period.
        self.remain += self.duration;

        match self.repeat {
            0 => false,
            1 => {
                if let Some(done) = self.on_complete.take() {
                    guard::invoke(isolate, "timer on_complete", done);
                }
                true
            }
            _ => {
                self.repeat -= 1;
                false
            }
        }
    }
}

struct TimerState {
    live: Vec<TimerEntry>,
    staged: Vec<TimerEntry>,
    unbinds: VecDeque<TimerId>,
    bound: HashSet<TimerId>,
    // Completed during the previous pass.
    retired: HashSet<TimerId>,
    isolate_panics: bool,
}

/// Timer service. Cloning yields another handle to the same service.
#[derive(Clone)]
pub struct TimerService {
    state: Rc<RefCell<TimerState>>,
}

impl TimerService {
    /// Create an empty service.
    #[must_use]
    pub fn new(isolate_panics: bool) -> Self {
        Self {
            state: Rc::new(RefCell::new(TimerState {
                live: Vec::new(),
                staged: Vec::new(),
                unbinds: VecDeque::new(),
                bound: HashSet::new(),
                retired: HashSet::new(),
                isolate_panics,
            })),
        }
    }

    /// Bind a timer. It starts counting on the next tick.
    pub fn bind(&self, timer: Timer) -> TimerId {
        let id = TimerId::next();
        let mut state = self.state.borrow_mut();
        state.bound.insert(id);
        state.staged.push(TimerEntry::new(id, timer));
        trace!(timer_id = %id, "timer bound");
        id
    }

    /// Stage removal of a timer. Applied at the start of the next tick.
    pub fn unbind(&self, id: TimerId) {
        self.state.borrow_mut().unbinds.push_back(id);
    }

    /// Whether `id` is bound and has not completed.
    #[must_use]
    pub fn is_bound(&self, id: TimerId) -> bool {
        self.state.borrow().bound.contains(&id)
    }

    /// Number of bound timers, staged ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.borrow().bound.len()
    }

    /// Whether no timers are bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every timer without firing or completing it.
    pub fn clear(&self) {
        let (live, staged) = {
            let mut state = self.state.borrow_mut();
            state.bound.clear();
            state.retired.clear();
            state.unbinds.clear();
            (
                std::mem::take(&mut state.live),
                std::mem::take(&mut state.staged),
            )
        };
        debug!(dropped = live.len() + staged.len(), "timers cleared");
    }

    /// Advance every timer by one frame.
    ///
    /// Removed timers are dropped after the service is released, so a
    /// closure may own values whose `Drop` uses this service.
    pub fn tick(&self, time: FrameTime) {
        let mut released = Vec::new();
        let taken = {
            let mut state = self.state.borrow_mut();
            let staged = std::mem::take(&mut state.staged);
            state.live.extend(staged);

            while let Some(id) = state.unbinds.pop_front() {
                if state.bound.remove(&id) {
                    if let Some(at) = state.live.iter().position(|entry| entry.id == id) {
                        released.push(state.live.remove(at));
                    }
                    trace!(timer_id = %id, "timer unbound");
                } else if state.retired.contains(&id) {
                    trace!(timer_id = %id, "unbind of completed timer");
                } else {
                    warn!(timer_id = %id, "unbind of unknown timer");
                }
            }
            state.retired.clear();

            if state.live.is_empty() {
                None
            } else {
                Some((std::mem::take(&mut state.live), state.isolate_panics))
            }
        };
        drop(released);
        let Some((mut live, isolate)) = taken else {
            return;
        };

        // The state is not borrowed here; callbacks may use this service.
        let mut finished = Vec::new();
        live.retain_mut(|entry| {
            let done = entry.advance(time.delta(entry.unscaled), isolate);
            if done {
                finished.push(entry.id);
            }
            !done
        });

        let cleared = {
            let mut state = self.state.borrow_mut();
            for id in finished {
                state.bound.remove(&id);
                state.retired.insert(id);
                trace!(timer_id = %id, "timer completed");
            }
            // A callback may have cleared the service mid-pass.
            let (mut kept, cleared): (Vec<_>, Vec<_>) = live
                .into_iter()
                .partition(|entry| state.bound.contains(&entry.id));
            kept.append(&mut state.live);
            state.live = kept;
            cleared
        };
        drop(cleared);
    }
}

impl Default for TimerService {
    fn default() -> Self {
        Self::new(true)
    }
}

impl fmt::Debug for TimerService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerService")
            .field("bound", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::counter::RateCounter;
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<u32>>, impl FnMut(u32) + 'static) {
        let fired = Rc::new(Cell::new(0));
        let sink = Rc::clone(&fired);
        (fired, move |_| sink.set(sink.get() + 1))
    }

    #[test]
    fn fires_once_by_default() {
        let timers = TimerService::default();
        let (fired, on_fire) = counter();
        let id = timers.bind(Timer::new(1.0, on_fire));

        timers.tick(FrameTime::uniform(0.5));
        assert_eq!(fired.get(), 0);
        timers.tick(FrameTime::uniform(0.5));
        assert_eq!(fired.get(), 1);
        assert!(!timers.is_bound(id));
        timers.tick(FrameTime::uniform(5.0));
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn delay_postpones_first_fire() {
        let timers = TimerService::default();
        let (fired, on_fire) = counter();
        timers.bind(Timer::new(1.0, on_fire).delay(1.0));
        timers.tick(FrameTime::uniform(1.5));
        assert_eq!(fired.get(), 0);
        timers.tick(FrameTime::uniform(0.5));
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn overshoot_carries_over() {
        let timers = TimerService::default();
        let (fired, on_fire) = counter();
        timers.bind(Timer::new(1.0, on_fire).forever());
        // 1.25 fires and leaves 0.75 of the next period.
        timers.tick(FrameTime::uniform(1.25));
        assert_eq!(fired.get(), 1);
        timers.tick(FrameTime::uniform(0.75));
        assert_eq!(fired.get(), 2);
    }

    #[test]
    fn unscaled_timers_ignore_time_scale() {
        let timers = TimerService::default();
        let (scaled, a) = counter();
        let (unscaled, b) = counter();
        timers.bind(Timer::new(1.0, a));
        timers.bind(Timer::new(1.0, b).unscaled(true));
        timers.tick(FrameTime::new(0.0, 1.0));
        assert_eq!(scaled.get(), 0);
        assert_eq!(unscaled.get(), 1);
    }

    #[test]
    fn zero_duration_forever_fires_every_tick() {
        let timers = TimerService::default();
        let (fired, on_fire) = counter();
        timers.bind(Timer::new(0.0, on_fire).forever());
        for _ in 0..4 {
            timers.tick(FrameTime::uniform(0.016));
        }
        assert_eq!(fired.get(), 4);
    }

    #[test]
    fn unbind_is_applied_on_next_tick() {
        let timers = TimerService::default();
        let (fired, on_fire) = counter();
        let id = timers.bind(Timer::new(0.0, on_fire).forever());
        timers.tick(FrameTime::uniform(0.1));
        timers.unbind(id);
        assert!(timers.is_bound(id));
        timers.tick(FrameTime::uniform(0.1));
        assert_eq!(fired.get(), 1);
        assert!(!timers.is_bound(id));
    }

    #[test]
    fn bind_inside_callback_starts_next_tick() {
        let timers = TimerService::default();
        let (inner_fired, inner) = counter();
        let handle = timers.clone();
        let mut inner = Some(inner);
        timers.bind(Timer::new(0.0, move |_| {
            if let Some(cb) = inner.take() {
                handle.bind(Timer::new(0.0, cb));
            }
        }));
        timers.tick(FrameTime::uniform(0.1));
        assert_eq!(inner_fired.get(), 0);
        timers.tick(FrameTime::uniform(0.1));
        assert_eq!(inner_fired.get(), 1);
    }

    #[test]
    fn once_runs_completion_callback() {
        let timers = TimerService::default();
        let done = Rc::new(Cell::new(false));
        let flag = Rc::clone(&done);
        timers.bind(Timer::once(0.2, move || flag.set(true)));
        timers.tick(FrameTime::uniform(0.3));
        assert!(done.get());
        assert!(timers.is_empty());
    }

    #[test]
    fn panicking_callback_does_not_stop_other_timers() {
        let timers = TimerService::default();
        let (fired, on_fire) = counter();
        timers.bind(Timer::new(0.1, |_| panic!("bad timer")));
        timers.bind(Timer::new(0.1, on_fire));
        timers.tick(FrameTime::uniform(0.2));
        assert_eq!(fired.get(), 1);
        assert!(timers.is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let timers = TimerService::default();
        let (fired, on_fire) = counter();
        timers.bind(Timer::new(0.1, on_fire));
        timers.clear();
        timers.tick(FrameTime::uniform(1.0));
        assert_eq!(fired.get(), 0);
        assert!(timers.is_empty());
    }

    #[test]
    fn unbinding_a_timer_that_owns_a_rate_counter() {
        let timers = TimerService::default();
        let mut counter = RateCounter::new(&timers);
        counter.start(1.0, false, |_| {});
        let id = timers.bind(Timer::new(1.0, move |_| counter.add(1)).forever());
        timers.tick(FrameTime::uniform(0.5));
        assert_eq!(timers.len(), 2);

        // Dropping the closure drops the counter, which stages its own unbind.
        timers.unbind(id);
        timers.tick(FrameTime::uniform(0.5));
        assert!(!timers.is_bound(id));
        assert_eq!(timers.len(), 1);
        timers.tick(FrameTime::uniform(0.5));
        assert!(timers.is_empty());
    }

    #[test]
    fn clearing_mid_pass_releases_owned_counters() {
        let timers = TimerService::default();
        let mut counter = RateCounter::new(&timers);
        counter.start(5.0, false, |_| {});
        let handle = timers.clone();
        timers.bind(Timer::new(0.1, move |_| handle.clear()));
        timers.bind(Timer::new(1.0, move |_| counter.add(1)).forever());
        timers.tick(FrameTime::uniform(0.2));
        assert!(timers.is_empty());
        timers.tick(FrameTime::uniform(0.2));
        assert!(timers.is_empty());
    }

    #[test]
    fn callback_may_unbind_another_timer() {
        let timers = TimerService::default();
        let (fired, on_fire) = counter();
        let victim = timers.bind(Timer::new(0.0, on_fire).forever());
        let handle = timers.clone();
        timers.bind(Timer::new(0.15, move |_| handle.unbind(victim)));

        timers.tick(FrameTime::uniform(0.1));
        assert_eq!(fired.get(), 1);
        // Fires again in the pass that stages the unbind.
        timers.tick(FrameTime::uniform(0.1));
        assert_eq!(fired.get(), 2);
        assert!(timers.is_bound(victim));
        timers.tick(FrameTime::uniform(0.1));
        timers.tick(FrameTime::uniform(0.1));
        assert_eq!(fired.get(), 2);
        assert!(!timers.is_bound(victim));
        assert!(timers.is_empty());
    }

    #[test]
    fn self_unbind_in_final_fire_is_quiet() {
        let timers = TimerService::default();
        let (fired, mut on_fire) = counter();
        let handle = timers.clone();
        let own: Rc<Cell<Option<TimerId>>> = Rc::default();
        let slot = Rc::clone(&own);
        let id = timers.bind(Timer::new(0.1, move |n| {
            on_fire(n);
            if let Some(id) = slot.get() {
                handle.unbind(id);
            }
        }));
        own.set(Some(id));

        timers.tick(FrameTime::uniform(0.2));
        assert_eq!(fired.get(), 1);
        assert!(!timers.is_bound(id));
        {
            let state = timers.state.borrow();
            assert!(state.retired.contains(&id));
            assert_eq!(state.unbinds.len(), 1);
        }
        timers.tick(FrameTime::uniform(0.2));
        let state = timers.state.borrow();
        assert!(state.unbinds.is_empty());
        assert!(state.retired.is_empty());
        assert!(timers.is_empty());
    }
}
