//! Sequential task queue
//!
//! [`TaskQueue`] executes zero-argument task factories strictly one at a
//! time, in FIFO push order, regardless of how the produced futures settle.
//! A queue starts paused, can be paused and resumed at will, and shuts down
//! either gracefully (`close` drains everything) or abruptly (`terminate`
//! discards pending tasks and waits only for the in-flight one).
//!
//! Task failures are isolated: a factory failing synchronously, a rejected
//! execution, or a per-task timeout all reject that task's completion
//! future and the queue moves on.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use serde::Serialize;
use tracing::{debug, trace};

use crate::error::Error;
use crate::future::{Chained, Future};
use crate::scheduler::Scheduler;
use crate::timer;

/// A zero-argument factory producing a task's execution future. Failing
/// synchronously (returning `Err`) is recorded as a rejected execution.
type TaskFactory<T> = Box<dyn FnOnce() -> Result<Future<T>, Error>>;

/// Running counters of a queue. Monotonic; `completed` counts both
/// outcomes, while `rejected` counts only pushes refused by a closed queue
/// (a task failing during execution is `completed` but not `successful`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub enqueued: u64,
    pub completed: u64,
    pub successful: u64,
    pub rejected: u64,
    pub discarded: u64,
}

/// Queue construction options.
#[derive(Debug, Clone, Default)]
pub struct QueueOptions {
    /// Cosmetic name attached to the queue's log events.
    pub name: Option<String>,
}

/// Per-task options.
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    /// Cosmetic name attached to the task's log events; defaults to
    /// `"Task #{id}"`.
    pub name: Option<String>,
    /// Deadline in milliseconds for the task's execution future.
    pub timeout: Option<u64>,
}

struct Task<T: Clone + 'static> {
    id: u64,
    name: String,
    factory: TaskFactory<T>,
    timeout: Option<u64>,
    completion: Future<T>,
}

struct CurrentTask<T: Clone + 'static> {
    id: u64,
    name: String,
    completion: Future<T>,
}

struct State<T: Clone + 'static> {
    pending: VecDeque<Task<T>>,
    current: Option<CurrentTask<T>>,
    statistics: Statistics,
    paused: bool,
    closed: bool,
    name: String,
}

/// FIFO sequential executor of asynchronous tasks. Handles are cheap to
/// clone and share the same queue.
pub struct TaskQueue<T: Clone + 'static> {
    state: Rc<RefCell<State<T>>>,
    scheduler: Scheduler,
}

impl<T: Clone + 'static> Clone for TaskQueue<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<T: Clone + 'static> TaskQueue<T> {
    /// Create a paused queue.
    pub fn new(scheduler: &Scheduler, options: QueueOptions) -> Self {
        Self {
            state: Rc::new(RefCell::new(State {
                pending: VecDeque::new(),
                current: None,
                statistics: Statistics::default(),
                paused: true,
                closed: false,
                name: options.name.unwrap_or_else(|| "task-queue".to_string()),
            })),
            scheduler: scheduler.clone(),
        }
    }

    /// Create a queue and start it immediately.
    pub fn started(scheduler: &Scheduler, options: QueueOptions) -> Self {
        let queue = Self::new(scheduler, options);
        queue.start();
        queue
    }

    /// Set the name that turns up in this queue's log events. Cosmetic
    /// only.
    pub fn set_name(&self, name: impl Into<String>) {
        self.state.borrow_mut().name = name.into();
    }

    /// Add a task to the queue. Returns the task's completion future, which
    /// settles with the execution outcome once the task has run.
    ///
    /// A closed queue refuses the push: the factory is never invoked, the
    /// `rejected` counter increments, and an already-rejected future is
    /// returned.
    pub fn push<F>(&self, factory: F, options: TaskOptions) -> Future<T>
    where
        F: FnOnce() -> Result<Future<T>, Error> + 'static,
    {
        let completion;
        {
            let mut state = self.state.borrow_mut();
            if state.closed {
                state.statistics.rejected += 1;
                debug!(queue = %state.name, "refusing task: queue is closed");
                return Future::rejected(
                    &self.scheduler,
                    Error::rejected("Can't enqueue task: queue is closed"),
                );
            }
            state.statistics.enqueued += 1;
            let id = state.statistics.enqueued;
            let name = options
                .name
                .unwrap_or_else(|| format!("Task #{}", id));
            completion = Future::new(&self.scheduler);
            debug!(queue = %state.name, task = %name, id, "registering task");
            state.pending.push_back(Task {
                id,
                name,
                factory: Box::new(factory),
                timeout: options.timeout,
                completion: completion.clone(),
            });
        }
        self.proceed();
        completion
    }

    /// Start (or resume) processing.
    pub fn start(&self) -> &Self {
        {
            let mut state = self.state.borrow_mut();
            debug!(queue = %state.name, "starting queue processing");
            state.paused = false;
        }
        self.proceed();
        self
    }

    /// Pause processing until `start()` is called again. The in-flight task
    /// is not cancelled; only the next pickup is prevented. The returned
    /// future settles once the in-flight task finishes (immediately when
    /// idle).
    pub fn pause(&self) -> Future<()> {
        let current = {
            let mut state = self.state.borrow_mut();
            debug!(queue = %state.name, "pausing queue processing");
            state.paused = true;
            state.current.as_ref().map(|task| task.completion.clone())
        };
        match current {
            Some(completion) => {
                completion.then(|_| Chained::Value(()), |_| Chained::Value(()))
            }
            None => Future::resolved(&self.scheduler, ()),
        }
    }

    /// Close the queue for new pushes and wait for every task present at
    /// close time, including the in-flight one, to drain. Settles with a
    /// statistics snapshot taken after the final completion.
    pub fn close(&self) -> Future<Statistics> {
        let last = {
            let mut state = self.state.borrow_mut();
            debug!(queue = %state.name, "shutting down queue");
            state.closed = true;
            state
                .pending
                .back()
                .map(|task| task.completion.clone())
                .or_else(|| state.current.as_ref().map(|task| task.completion.clone()))
        };
        match last {
            Some(completion) => {
                let queue = self.clone();
                let result = Future::new(&self.scheduler);
                let settled = result.clone();
                completion.subscribe(move |_| {
                    settled.resolve(queue.statistics());
                });
                result
            }
            None => Future::resolved(&self.scheduler, self.statistics()),
        }
    }

    /// Abruptly close the queue: discard every pending task, then wait only
    /// for the in-flight one.
    ///
    /// Discarded factories are never invoked and their completion futures
    /// are left forever pending; await a completion only together with the
    /// queue's own shutdown future.
    pub fn terminate(&self) -> Future<Statistics> {
        {
            let mut state = self.state.borrow_mut();
            debug!(
                queue = %state.name,
                discarding = state.pending.len(),
                "terminating queue"
            );
            state.statistics.discarded += state.pending.len() as u64;
            while let Some(task) = state.pending.pop_front() {
                trace!(queue = %state.name, task = %task.name, id = task.id, "discarding task");
            }
        }
        self.close()
    }

    /// Snapshot of the queue's counters.
    pub fn statistics(&self) -> Statistics {
        self.state.borrow().statistics
    }

    /// Count of pending (not-yet-started) tasks.
    pub fn len(&self) -> usize {
        self.state.borrow().pending.len()
    }

    /// Whether no tasks are pending.
    pub fn is_empty(&self) -> bool {
        self.state.borrow().pending.is_empty()
    }

    /// Whether processing is paused.
    pub fn is_paused(&self) -> bool {
        self.state.borrow().paused
    }

    /// Whether the queue refuses new pushes.
    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    /// Pick up the next task if nothing prevents it. Exactly one task may
    /// be current at a time; settlement callbacks re-enter here to drain
    /// the queue.
    fn proceed(&self) {
        let task = {
            let mut state = self.state.borrow_mut();
            if state.paused || state.current.is_some() || state.pending.is_empty() {
                return;
            }
            let Some(task) = state.pending.pop_front() else {
                return;
            };
            state.current = Some(CurrentTask {
                id: task.id,
                name: task.name.clone(),
                completion: task.completion.clone(),
            });
            debug!(queue = %state.name, task = %task.name, id = task.id, "executing task");
            task
        };
        // factory runs outside the state borrow so it may push safely
        let execution = match (task.factory)() {
            Ok(future) => future,
            Err(reason) => Future::rejected(&self.scheduler, reason),
        };
        let guarded = timer::timeout(&self.scheduler, execution, task.timeout);
        let queue = self.clone();
        guarded
            .future()
            .subscribe(move |outcome| queue.complete(outcome));
    }

    /// Bookkeeping after the current task settles: update counters, settle
    /// the completion future identically, clear the current slot and try
    /// the next pickup.
    fn complete(&self, outcome: Result<T, Error>) {
        let completion = {
            let mut state = self.state.borrow_mut();
            let Some(current) = state.current.take() else {
                return;
            };
            state.statistics.completed += 1;
            match &outcome {
                Ok(_) => {
                    state.statistics.successful += 1;
                    debug!(
                        queue = %state.name,
                        task = %current.name,
                        id = current.id,
                        "task has completed successfully"
                    );
                }
                Err(reason) => {
                    debug!(
                        queue = %state.name,
                        task = %current.name,
                        id = current.id,
                        error = %reason,
                        "task has rejected"
                    );
                }
            }
            current.completion
        };
        match outcome {
            Ok(value) => {
                completion.resolve(value);
            }
            Err(reason) => {
                completion.reject(reason);
            }
        }
        self.proceed();
    }
}
