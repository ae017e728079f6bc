//! Weighted FIFO of deferred work plus async combinators.
//!
//! Tasks pushed with [`TaskQueue::push_task`] land in a pending buffer and
//! join the FIFO at the start of the next tick. Each tick then runs tasks in
//! arrival order while the consumed weight is below the per-frame budget;
//! the task that crosses the budget still runs to completion.
//!
//! The combinators ([`TaskQueue::push_async_tasks`],
//! [`TaskQueue::push_singleton_async_tasks`], [`TaskQueue::push_task_queue`])
//! start their steps right away and finish when the steps report back through
//! their continuation handles. Nothing here blocks.
//!
//! [`TaskQueue::push_safe_task`] and [`SafeTaskSender`] are the only entry
//! points usable from other threads. Their buffer is swapped out under a
//! short lock and drained after the FIFO, with the lock released.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::core::guard;

/// Default per-frame weight budget.
pub const DEFAULT_WEIGHT_PER_FRAME: u32 = 5;

/// A fan-out step. It must eventually call [`Continuation::complete`].
pub type AsyncStep = Box<dyn FnOnce(Continuation)>;

/// A sequential step. It must eventually call [`StepHandle::complete`].
pub type ChainStep = Box<dyn FnOnce(StepHandle)>;

/// Progress callback for sequential chains, fed values in `0.0..=1.0`.
pub type ProgressFn = Box<dyn FnMut(f32)>;

type SafeTask = Box<dyn FnOnce() + Send>;
type SafeBuffer = Arc<Mutex<Vec<SafeTask>>>;

/// Box a closure as an [`AsyncStep`].
pub fn step(f: impl FnOnce(Continuation) + 'static) -> AsyncStep {
    Box::new(f)
}

/// Box a closure as a [`ChainStep`].
pub fn chain_step(f: impl FnOnce(StepHandle) + 'static) -> ChainStep {
    Box::new(f)
}

struct FanIn {
    remaining: Cell<usize>,
    on_complete: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl FanIn {
    fn arrive(&self) {
        let left = self.remaining.get().saturating_sub(1);
        self.remaining.set(left);
        if left == 0 {
            let done = self.on_complete.borrow_mut().take();
            if let Some(done) = done {
                done();
            }
        }
    }
}

/// Completion handle given to each fan-out step.
///
/// Consumed by [`Continuation::complete`], so it can only be called once.
/// Dropping it without completing leaves the group pending forever.
pub struct Continuation {
    fan_in: Option<Rc<FanIn>>,
}

impl Continuation {
    /// Report this step as finished.
    pub fn complete(mut self) {
        if let Some(fan_in) = self.fan_in.take() {
            fan_in.arrive();
        }
    }
}

impl Drop for Continuation {
    fn drop(&mut self) {
        if self.fan_in.is_some() {
            warn!("continuation dropped without completing; group will never finish");
        }
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("pending", &self.fan_in.is_some())
            .finish()
    }
}

struct Chain {
    steps: RefCell<VecDeque<ChainStep>>,
    total: usize,
    index: Cell<usize>,
    on_progress: RefCell<Option<ProgressFn>>,
    on_complete: RefCell<Option<Box<dyn FnOnce()>>>,
    driving: Cell<bool>,
    ready: Cell<bool>,
}

impl Chain {
    fn report(&self, value: f32) {
        if let Some(progress) = self.on_progress.borrow_mut().as_mut() {
            progress(value);
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn fraction(&self, partial: f32) -> f32 {
        (self.index.get() as f32 + partial.clamp(0.0, 1.0)) / self.total as f32
    }

    fn advance(self: &Rc<Self>) {
        self.index.set(self.index.get() + 1);
        self.report(self.fraction(0.0));
        self.ready.set(true);
        // A step completing synchronously returns into the running loop.
        if !self.driving.get() {
            self.drive();
        }
    }

    fn drive(self: &Rc<Self>) {
        self.driving.set(true);
        while self.ready.replace(false) {
            let next = self.steps.borrow_mut().pop_front();
            match next {
                Some(step) => step(StepHandle {
                    chain: Some(Rc::clone(self)),
                }),
                None => {
                    let done = self.on_complete.borrow_mut().take();
                    if let Some(done) = done {
                        done();
                    }
                }
            }
        }
        self.driving.set(false);
    }
}

/// Handle given to each step of a sequential chain.
pub struct StepHandle {
    chain: Option<Rc<Chain>>,
}

impl StepHandle {
    /// Report partial progress of the current step, `0.0..=1.0`.
    pub fn progress(&self, partial: f32) {
        if let Some(chain) = &self.chain {
            chain.report(chain.fraction(partial));
        }
    }

    /// Finish the current step and start the next one.
    pub fn complete(mut self) {
        if let Some(chain) = self.chain.take() {
            chain.advance();
        }
    }
}

impl Drop for StepHandle {
    fn drop(&mut self) {
        if let Some(chain) = &self.chain {
            warn!(step = chain.index.get(), total = chain.total, "chain step dropped without completing");
        }
    }
}

impl fmt::Debug for StepHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepHandle")
            .field("step", &self.chain.as_ref().map(|c| c.index.get()))
            .finish()
    }
}

/// Cloneable, thread-safe handle for pushing work onto the tick thread.
#[derive(Clone)]
pub struct SafeTaskSender {
    buffer: SafeBuffer,
}

impl SafeTaskSender {
    /// Queue `action` to run after the FIFO on the next tick.
    pub fn push(&self, action: impl FnOnce() + Send + 'static) {
        self.buffer.lock().push(Box::new(action));
    }
}

impl fmt::Debug for SafeTaskSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafeTaskSender")
            .field("pending", &self.buffer.lock().len())
            .finish()
    }
}

struct Task {
    action: Box<dyn FnOnce()>,
    weight: u32,
}

struct TaskState {
    incoming: Vec<Task>,
    fifo: VecDeque<Task>,
    weight_per_frame: u32,
    singletons: HashMap<String, Vec<Box<dyn FnOnce()>>>,
    isolate_panics: bool,
}

/// Task queue. Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct TaskQueue {
    state: Rc<RefCell<TaskState>>,
    safe: SafeBuffer,
}

impl TaskQueue {
    /// Create an empty queue with the given per-frame budget.
    #[must_use]
    pub fn new(weight_per_frame: u32, isolate_panics: bool) -> Self {
        Self {
            state: Rc::new(RefCell::new(TaskState {
                incoming: Vec::new(),
                fifo: VecDeque::new(),
                weight_per_frame: weight_per_frame.max(1),
                singletons: HashMap::new(),
                isolate_panics,
            })),
            safe: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Change the per-frame budget. Values below 1 are raised to 1.
    pub fn set_weight_per_frame(&self, weight: u32) {
        if weight == 0 {
            warn!("weight_per_frame of 0 raised to 1");
        }
        self.state.borrow_mut().weight_per_frame = weight.max(1);
    }

    /// Current per-frame budget.
    #[must_use]
    pub fn weight_per_frame(&self) -> u32 {
        self.state.borrow().weight_per_frame
    }

    /// Queue `action` with a cost of `weight` (at least 1).
    pub fn push_task(&self, action: impl FnOnce() + 'static, weight: u32) {
        self.state.borrow_mut().incoming.push(Task {
            action: Box::new(action),
            weight: weight.max(1),
        });
    }

    /// Start every step now; run `on_complete` once all have completed.
    ///
    /// With no steps `on_complete` runs before this returns.
    pub fn push_async_tasks(&self, on_complete: impl FnOnce() + 'static, steps: Vec<AsyncStep>) {
        if steps.is_empty() {
            on_complete();
            return;
        }
        let fan_in = Rc::new(FanIn {
            remaining: Cell::new(steps.len()),
            on_complete: RefCell::new(Some(Box::new(on_complete))),
        });
        for step in steps {
            step(Continuation {
                fan_in: Some(Rc::clone(&fan_in)),
            });
        }
    }

    /// Like [`push_async_tasks`](Self::push_async_tasks), but callers sharing
    /// `tag` while a run is in flight join that run instead of starting one.
    /// Every joined `on_complete` fires when the run finishes; the tag is then
    /// free again.
    pub fn push_singleton_async_tasks(
        &self,
        tag: impl Into<String>,
        on_complete: impl FnOnce() + 'static,
        steps: Vec<AsyncStep>,
    ) {
        let tag = tag.into();
        {
            let mut state = self.state.borrow_mut();
            if let Some(waiters) = state.singletons.get_mut(&tag) {
                waiters.push(Box::new(on_complete));
                trace!(%tag, joined = waiters.len(), "joined in-flight singleton run");
                return;
            }
            state.singletons.insert(tag.clone(), vec![Box::new(on_complete)]);
        }

        let state = Rc::clone(&self.state);
        self.push_async_tasks(
            move || {
                let waiters = state.borrow_mut().singletons.remove(&tag).unwrap_or_default();
                debug!(%tag, waiters = waiters.len(), "singleton run finished");
                for done in waiters {
                    done();
                }
            },
            steps,
        );
    }

    /// Run `steps` one after another. `on_progress` receives `0.0` up front,
    /// `index / total` after each step and `(index + partial) / total` for
    /// partial reports.
    pub fn push_task_queue(
        &self,
        on_complete: Option<Box<dyn FnOnce()>>,
        mut on_progress: Option<ProgressFn>,
        steps: Vec<ChainStep>,
    ) {
        if let Some(progress) = on_progress.as_mut() {
            progress(0.0);
        }
        let chain = Rc::new(Chain {
            total: steps.len(),
            steps: RefCell::new(steps.into()),
            index: Cell::new(0),
            on_progress: RefCell::new(on_progress),
            on_complete: RefCell::new(on_complete),
            driving: Cell::new(false),
            ready: Cell::new(true),
        });
        chain.drive();
    }

    /// Queue `action` from any thread.
    pub fn push_safe_task(&self, action: impl FnOnce() + Send + 'static) {
        self.safe.lock().push(Box::new(action));
    }

    /// A sender that can be moved to other threads.
    #[must_use]
    pub fn safe_sender(&self) -> SafeTaskSender {
        SafeTaskSender {
            buffer: Arc::clone(&self.safe),
        }
    }

    /// Tasks waiting in the pending buffer and the FIFO.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        let state = self.state.borrow();
        state.incoming.len() + state.fifo.len()
    }

    /// Tasks waiting in the thread-safe buffer.
    #[must_use]
    pub fn safe_pending_len(&self) -> usize {
        self.safe.lock().len()
    }

    /// Number of singleton tags with a run in flight.
    #[must_use]
    pub fn singleton_count(&self) -> usize {
        self.state.borrow().singletons.len()
    }

    /// Migrate pending tasks, run the budgeted FIFO, then the safe buffer.
    pub fn tick(&self) {
        let (budget, isolate) = {
            let mut state = self.state.borrow_mut();
            let incoming = std::mem::take(&mut state.incoming);
            state.fifo.extend(incoming);
            (state.weight_per_frame, state.isolate_panics)
        };

        let mut spent: u32 = 0;
        let mut ran = 0usize;
        while spent < budget {
            let next = self.state.borrow_mut().fifo.pop_front();
            let Some(task) = next else {
                break;
            };
            spent = spent.saturating_add(task.weight);
            ran += 1;
            guard::invoke(isolate, "task", task.action);
        }

        let safe = std::mem::take(&mut *self.safe.lock());
        let safe_count = safe.len();
        for action in safe {
            guard::invoke(isolate, "safe task", action);
        }

        if ran > 0 || safe_count > 0 {
            trace!(ran, spent, safe = safe_count, "task tick");
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new(DEFAULT_WEIGHT_PER_FRAME, true)
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("weight_per_frame", &self.weight_per_frame())
            .field("pending", &self.pending_len())
            .field("safe_pending", &self.safe_pending_len())
            .finish_non_exhaustive()
    }
}
