//! # Tick Scheduler
//!
//! A cooperative, tick-driven scheduling core for frame-based hosts such as
//! game loops.
//!
//! One external tick, fired once per frame with the elapsed time, drives four
//! independent services:
//!
//! - **TaskQueue**: weighted FIFO of deferred work with a per-frame budget,
//!   plus fan-out/fan-in, sequential chains with progress, singleton
//!   coalescing and a thread-safe injection channel.
//! - **TimerService**: delayed and repeating callbacks on scaled or unscaled
//!   time.
//! - **TriggerDispatcher**: condition/action pairs polled each tick in
//!   priority order.
//! - **PoolRegistry**: keyed object pools that warm up to a minimum size one
//!   item per tick.
//!
//! Nothing blocks and nothing spawns threads. Work that does not fit in one
//! frame is sliced across ticks.
//!
//! ## Quick start
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use tick_scheduler::core::{Scheduler, Timer};
//!
//! let scheduler = Scheduler::default();
//! let fired = Rc::new(Cell::new(0));
//! let sink = Rc::clone(&fired);
//! scheduler
//!     .timers()
//!     .bind(Timer::new(0.5, move |_| sink.set(sink.get() + 1)).repeat(2));
//!
//! for _ in 0..4 {
//!     scheduler.tick_secs(0.25, 0.25);
//! }
//! assert_eq!(fired.get(), 2);
//! ```
//!
//! ## Threading
//!
//! Every service is single-threaded (`!Send`) and must be used from the
//! thread that ticks it. The only cross-thread entry point is
//! [`core::TaskQueue::push_safe_task`] / [`core::SafeTaskSender`].
//!
//! With the default `tokio-runtime` feature, [`runtime::TickDriver`] runs a
//! fixed-rate host loop on a current-thread tokio runtime.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling services: pools, timers, triggers and tasks.
pub mod core;
/// Configuration models for the scheduler, its driver and named pools.
pub mod config;
/// Builders to construct scheduler components from configuration.
pub mod builders;
/// Runtime adapters that drive the scheduler from a host loop.
#[cfg(feature = "tokio-runtime")]
pub mod runtime;
/// Shared utilities.
pub mod util;
