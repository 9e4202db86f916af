//! Cooperative scheduler
//!
//! This module provides the single-threaded event loop every sequent
//! primitive is driven by: a FIFO microtask queue for settlement
//! propagation and one-shot virtual-time timers for deadlines and delays.
//!
//! Virtual time makes every run fully deterministic: `run()` drains all
//! microtasks, jumps straight to the next timer's fire time, fires it, and
//! repeats until no work remains. No wall-clock sleeps are involved.

use serde::Serialize;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::error::Error;

type Callback = Box<dyn FnOnce()>;

/// Opaque handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

struct Timer {
    id: u64,
    /// Virtual time at which the timer fires, in milliseconds.
    fire_at: u64,
    callback: Callback,
}

/// Result of running the scheduler to completion via [`Scheduler::run`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunResult {
    /// Total number of microtasks that were dequeued and processed.
    pub microtasks_processed: usize,
    /// Total number of timers that fired.
    pub timers_fired: usize,
    /// Number of full loop iterations (each iteration = drain microtasks +
    /// at most one timer).
    pub iterations: usize,
    /// The virtual time when the scheduler went idle.
    pub final_time: u64,
}

/// Runtime statistics for the scheduler. Counters never decrease.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStats {
    /// Total microtasks processed across all ticks.
    pub total_microtasks: u64,
    /// Total timers fired across all ticks.
    pub total_timers: u64,
    /// Total number of loop ticks.
    pub total_ticks: u64,
    /// Maximum microtasks drained in a single tick.
    pub max_microtasks_per_tick: u64,
}

struct EventLoop {
    microtasks: VecDeque<Callback>,
    timers: Vec<Timer>,
    virtual_time: u64,
    next_timer_id: u64,
    /// Maximum microtasks to drain per tick (starvation protection).
    max_microtasks_per_tick: usize,
    stats: SchedulerStats,
    /// Rejections that settled without any subscriber observing them.
    unhandled: Vec<Error>,
}

/// Cheap-to-clone handle to the event loop.
///
/// The scheduler is an explicitly constructed, passed-in dependency; there
/// is no process-wide default instance. Futures, timers and queues capture
/// a clone of the handle they were created with.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<RefCell<EventLoop>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Create a new scheduler at virtual time zero.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(EventLoop {
                microtasks: VecDeque::new(),
                timers: Vec::new(),
                virtual_time: 0,
                next_timer_id: 1,
                max_microtasks_per_tick: 10_000,
                stats: SchedulerStats::default(),
                unhandled: Vec::new(),
            })),
        }
    }

    /// Current virtual time in milliseconds.
    pub fn now(&self) -> u64 {
        self.inner.borrow().virtual_time
    }

    /// Enqueue a microtask. Microtasks run in FIFO order, always on a later
    /// turn than the code that enqueued them.
    pub fn enqueue(&self, callback: impl FnOnce() + 'static) {
        self.inner.borrow_mut().microtasks.push_back(Box::new(callback));
    }

    /// Schedule a one-shot timer `delay` milliseconds from now.
    pub fn set_timer(&self, delay: u64, callback: impl FnOnce() + 'static) -> TimerId {
        let mut el = self.inner.borrow_mut();
        let id = el.next_timer_id;
        el.next_timer_id += 1;
        let fire_at = el.virtual_time + delay;
        el.timers.push(Timer {
            id,
            fire_at,
            callback: Box::new(callback),
        });
        TimerId(id)
    }

    /// Cancel a timer. Cancelled timers never fire; cancelling an already
    /// fired or unknown timer is a no-op.
    pub fn cancel_timer(&self, id: TimerId) {
        self.inner.borrow_mut().timers.retain(|timer| timer.id != id.0);
    }

    /// Check if there are queued microtasks.
    pub fn has_pending_microtasks(&self) -> bool {
        !self.inner.borrow().microtasks.is_empty()
    }

    /// Check if there are live timers.
    pub fn has_pending_timers(&self) -> bool {
        !self.inner.borrow().timers.is_empty()
    }

    /// Check if the scheduler has any pending work.
    pub fn has_pending_work(&self) -> bool {
        self.has_pending_microtasks() || self.has_pending_timers()
    }

    /// Drain queued microtasks up to the per-tick budget. Microtasks
    /// enqueued by a running microtask are processed in the same drain,
    /// budget permitting. Returns the number processed.
    pub fn drain_microtasks(&self) -> usize {
        let mut processed: usize = 0;
        loop {
            let task = {
                let mut el = self.inner.borrow_mut();
                if processed >= el.max_microtasks_per_tick {
                    break;
                }
                el.microtasks.pop_front()
            };
            match task {
                Some(callback) => {
                    callback();
                    processed += 1;
                }
                None => break,
            }
        }
        let mut el = self.inner.borrow_mut();
        el.stats.total_microtasks += processed as u64;
        if processed as u64 > el.stats.max_microtasks_per_tick {
            el.stats.max_microtasks_per_tick = processed as u64;
        }
        processed
    }

    /// Remove and return the callback of the earliest timer due at the
    /// current virtual time, ties broken by scheduling order.
    fn pop_due_timer(&self) -> Option<Callback> {
        let mut el = self.inner.borrow_mut();
        let now = el.virtual_time;
        let index = el
            .timers
            .iter()
            .enumerate()
            .filter(|(_, timer)| timer.fire_at <= now)
            .min_by_key(|(_, timer)| (timer.fire_at, timer.id))
            .map(|(index, _)| index);
        index.map(|index| el.timers.remove(index).callback)
    }

    /// Advance virtual time to the next live timer and return its callback.
    fn advance_to_next_timer(&self) -> Option<Callback> {
        let next = self.inner.borrow().timers.iter().map(|timer| timer.fire_at).min();
        match next {
            Some(fire_at) => {
                self.inner.borrow_mut().virtual_time = fire_at;
                self.pop_due_timer()
            }
            None => None,
        }
    }

    /// Run one loop iteration: drain microtasks, then fire at most one
    /// timer, advancing virtual time if nothing is due yet. Returns `false`
    /// when the iteration found no work at all.
    pub fn tick(&self) -> bool {
        let drained = self.drain_microtasks();
        let timer = self.pop_due_timer().or_else(|| self.advance_to_next_timer());
        self.inner.borrow_mut().stats.total_ticks += 1;
        match timer {
            Some(callback) => {
                callback();
                self.inner.borrow_mut().stats.total_timers += 1;
                true
            }
            None => drained > 0,
        }
    }

    /// Run the scheduler to completion following the standard algorithm:
    ///   1. Drain all microtasks (budget-bounded per tick)
    ///   2. If a timer is pending, fire the earliest one, advancing virtual
    ///      time if needed
    ///   3. Repeat from step 1
    ///   4. Stop when no microtasks and no timers remain
    pub fn run(&self) -> RunResult {
        let mut result = RunResult::default();
        loop {
            let drained = self.drain_microtasks();
            result.microtasks_processed += drained;

            let timer = self.pop_due_timer().or_else(|| self.advance_to_next_timer());
            self.inner.borrow_mut().stats.total_ticks += 1;

            if let Some(callback) = timer {
                callback();
                result.timers_fired += 1;
                result.iterations += 1;
                self.inner.borrow_mut().stats.total_timers += 1;
                continue;
            }

            if !self.has_pending_microtasks() {
                break;
            }
            result.iterations += 1;
        }
        result.final_time = self.now();
        result
    }

    /// Set the maximum number of microtasks to drain per tick.
    pub fn set_microtask_budget(&self, limit: usize) {
        self.inner.borrow_mut().max_microtasks_per_tick = limit;
    }

    /// Get the current microtask budget.
    pub fn microtask_budget(&self) -> usize {
        self.inner.borrow().max_microtasks_per_tick
    }

    /// Get a snapshot of the scheduler statistics.
    pub fn stats(&self) -> SchedulerStats {
        self.inner.borrow().stats.clone()
    }

    /// Record a rejection that settled without any subscriber. Unobserved
    /// rejections are collected here instead of aborting the host.
    pub(crate) fn report_unhandled(&self, error: Error) {
        tracing::debug!(error = %error, "unhandled rejection");
        self.inner.borrow_mut().unhandled.push(error);
    }

    /// Get and clear the unobserved rejections collected so far.
    pub fn take_unhandled(&self) -> Vec<Error> {
        std::mem::take(&mut self.inner.borrow_mut().unhandled)
    }
}
