//! Priority-ordered condition/action dispatch.
//!
//! Triggers are kept sorted by descending priority; equal priorities keep
//! bind order. Each tick walks a snapshot of that list. A trigger whose
//! condition holds runs its action and raises the pass watermark to its
//! priority; the pass stops at the first remaining trigger whose priority is
//! below the watermark. Triggers sharing the fired priority still run.
//!
//! The dispatcher only wants ticks while it holds at least one trigger (see
//! [`TriggerDispatcher::is_subscribed`]).

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, error, trace, warn};

use crate::core::{guard, SchedulerError};
use crate::util::ids::TriggerId;

type Condition = Rc<RefCell<Box<dyn FnMut() -> bool>>>;

struct TriggerEntry {
    id: TriggerId,
    condition: RefCell<Option<Condition>>,
    action: RefCell<Box<dyn FnMut()>>,
    priority: Cell<i32>,
    once: bool,
    removed: Cell<bool>,
}

struct TriggerState {
    live: Vec<Rc<TriggerEntry>>,
    by_id: HashMap<TriggerId, Rc<TriggerEntry>>,
    subscribed: bool,
    isolate_panics: bool,
}

impl TriggerState {
    fn insert_sorted(&mut self, entry: Rc<TriggerEntry>) {
        let priority = entry.priority.get();
        let at = self.live.partition_point(|e| e.priority.get() >= priority);
        self.live.insert(at, entry);
    }

    /// Detach `id`. The caller drops the returned entry once the state is
    /// released.
    fn remove(&mut self, id: TriggerId) -> Option<Rc<TriggerEntry>> {
        let entry = self.by_id.remove(&id)?;
        entry.removed.set(true);
        self.live.retain(|e| e.id != id);
        if self.live.is_empty() && self.subscribed {
            self.subscribed = false;
            debug!("trigger dispatcher unsubscribed from tick");
        }
        Some(entry)
    }
}

/// Trigger dispatcher. Cloning yields another handle to the same dispatcher.
#[derive(Clone)]
pub struct TriggerDispatcher {
    state: Rc<RefCell<TriggerState>>,
}

impl TriggerDispatcher {
    /// Create an empty dispatcher.
    #[must_use]
    pub fn new(isolate_panics: bool) -> Self {
        Self {
            state: Rc::new(RefCell::new(TriggerState {
                live: Vec::new(),
                by_id: HashMap::new(),
                subscribed: false,
                isolate_panics,
            })),
        }
    }

    /// Bind `action` to run on every tick where `condition` holds.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::DuplicateTrigger`] if `id` is already bound; the
    /// dispatcher is left untouched.
    pub fn bind(
        &self,
        id: TriggerId,
        condition: impl FnMut() -> bool + 'static,
        action: impl FnMut() + 'static,
        priority: i32,
    ) -> Result<(), SchedulerError> {
        self.insert(id, Some(boxed_condition(condition)), Box::new(action), priority, false)
    }

    /// Bind `action` with no condition: it runs on every tick it is reached.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::DuplicateTrigger`] if `id` is already bound.
    pub fn bind_always(
        &self,
        id: TriggerId,
        action: impl FnMut() + 'static,
        priority: i32,
    ) -> Result<(), SchedulerError> {
        self.insert(id, None, Box::new(action), priority, false)
    }

    /// Bind under a freshly generated id and return it.
    pub fn bind_generated(
        &self,
        condition: impl FnMut() -> bool + 'static,
        action: impl FnMut() + 'static,
        priority: i32,
    ) -> TriggerId {
        let id = TriggerId::new();
        // A fresh v4 id cannot collide with a bound one.
        let _ = self.insert(id, Some(boxed_condition(condition)), Box::new(action), priority, false);
        id
    }

    /// Bind a trigger that removes itself after its first successful fire.
    pub fn bind_once(
        &self,
        condition: impl FnMut() -> bool + 'static,
        action: impl FnMut() + 'static,
        priority: i32,
    ) -> TriggerId {
        let id = TriggerId::new();
        let _ = self.insert(id, Some(boxed_condition(condition)), Box::new(action), priority, true);
        id
    }

    /// Unconditional [`bind_once`](Self::bind_once): fires on the first tick
    /// it is reached.
    pub fn bind_once_always(&self, action: impl FnMut() + 'static, priority: i32) -> TriggerId {
        let id = TriggerId::new();
        let _ = self.insert(id, None, Box::new(action), priority, true);
        id
    }

    /// Replace the condition and priority of a bound trigger.
    ///
    /// Returns `false` (and logs) if `id` is not bound.
    pub fn set_condition(
        &self,
        id: TriggerId,
        condition: impl FnMut() -> bool + 'static,
        priority: i32,
    ) -> bool {
        self.replace_condition(id, Some(boxed_condition(condition)), priority)
    }

    /// Drop the condition of a bound trigger so it always holds, and set its
    /// priority.
    ///
    /// Returns `false` (and logs) if `id` is not bound.
    pub fn set_always(&self, id: TriggerId, priority: i32) -> bool {
        self.replace_condition(id, None, priority)
    }

    /// Remove a trigger immediately. Returns `false` (and logs) if unknown.
    pub fn unbind(&self, id: TriggerId) -> bool {
        let removed = self.state.borrow_mut().remove(id);
        if removed.is_none() {
            warn!(trigger_id = %id, "unbind of unknown trigger");
        }
        removed.is_some()
    }

    /// Remove every trigger and stop receiving ticks.
    pub fn clear(&self) {
        let (live, _by_id) = {
            let mut state = self.state.borrow_mut();
            state.subscribed = false;
            (
                std::mem::take(&mut state.live),
                std::mem::take(&mut state.by_id),
            )
        };
        for entry in &live {
            entry.removed.set(true);
        }
        debug!(dropped = live.len(), "triggers cleared");
    }

    /// Whether `id` is bound.
    #[must_use]
    pub fn contains(&self, id: TriggerId) -> bool {
        self.state.borrow().by_id.contains_key(&id)
    }

    /// Number of bound triggers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.borrow().live.len()
    }

    /// Whether no triggers are bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the dispatcher currently wants ticks.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.state.borrow().subscribed
    }

    /// Bound priorities in dispatch order.
    #[must_use]
    pub fn priorities(&self) -> Vec<i32> {
        self.state
            .borrow()
            .live
            .iter()
            .map(|e| e.priority.get())
            .collect()
    }

    /// Run one dispatch pass.
    pub fn tick(&self) {
        let (snapshot, isolate) = {
            let state = self.state.borrow();
            if !state.subscribed {
                return;
            }
            (state.live.clone(), state.isolate_panics)
        };

        let mut watermark: Option<i32> = None;
        let mut fired_once = Vec::new();

        for entry in &snapshot {
            // Unbound by an earlier action in this pass.
            if entry.removed.get() {
                continue;
            }
            let priority = entry.priority.get();
            if watermark.is_some_and(|w| priority < w) {
                break;
            }

            let condition = entry.condition.borrow().clone();
            let satisfied = match condition {
                None => true,
                Some(condition) => {
                    let mut check = condition.borrow_mut();
                    guard::invoke(isolate, "trigger condition", || (*check)()).unwrap_or(false)
                }
            };
            if !satisfied {
                continue;
            }

            {
                let mut action = entry.action.borrow_mut();
                guard::invoke(isolate, "trigger action", || (*action)());
            }
            trace!(trigger_id = %entry.id, priority, "trigger fired");
            watermark = Some(priority);
            if entry.once {
                fired_once.push(entry.id);
            }
        }

        if !fired_once.is_empty() {
            let removed: Vec<_> = {
                let mut state = self.state.borrow_mut();
                fired_once.into_iter().filter_map(|id| state.remove(id)).collect()
            };
            drop(removed);
        }
    }

    fn replace_condition(&self, id: TriggerId, condition: Option<Condition>, priority: i32) -> bool {
        let previous = {
            let mut state = self.state.borrow_mut();
            let Some(entry) = state.by_id.get(&id).cloned() else {
                warn!(trigger_id = %id, "set_condition on unknown trigger");
                return false;
            };
            let previous = entry.condition.replace(condition);
            if entry.priority.get() != priority {
                entry.priority.set(priority);
                state.live.retain(|e| e.id != id);
                state.insert_sorted(entry);
            }
            previous
        };
        // The old condition may own values that call back into the dispatcher.
        drop(previous);
        true
    }

    fn insert(
        &self,
        id: TriggerId,
        condition: Option<Condition>,
        action: Box<dyn FnMut()>,
        priority: i32,
        once: bool,
    ) -> Result<(), SchedulerError> {
        let mut state = self.state.borrow_mut();
        if state.by_id.contains_key(&id) {
            error!(trigger_id = %id, "trigger already bound");
            return Err(SchedulerError::DuplicateTrigger(id.to_string()));
        }
        let entry = Rc::new(TriggerEntry {
            id,
            condition: RefCell::new(condition),
            action: RefCell::new(action),
            priority: Cell::new(priority),
            once,
            removed: Cell::new(false),
        });
        state.by_id.insert(id, Rc::clone(&entry));
        state.insert_sorted(entry);
        if !state.subscribed {
            state.subscribed = true;
            debug!("trigger dispatcher subscribed to tick");
        }
        Ok(())
    }
}

fn boxed_condition(condition: impl FnMut() -> bool + 'static) -> Condition {
    Rc::new(RefCell::new(Box::new(condition)))
}

impl Default for TriggerDispatcher {
    fn default() -> Self {
        Self::new(true)
    }
}

impl fmt::Debug for TriggerDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerDispatcher")
            .field("len", &self.len())
            .field("subscribed", &self.is_subscribed())
            .finish_non_exhaustive()
    }
}
