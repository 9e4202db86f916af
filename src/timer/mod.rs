//! Cancellable time-bounded futures
//!
//! Three wrappers over [`Future`] and the scheduler's virtual-time timers:
//! [`timeout`] races an operation against a deadline, [`delay`] defers a
//! computation, and [`throttle`] puts a floor under how early a future may
//! be observed to settle. Each wrapper exposes an explicit `cancel` with
//! silent and loud modes.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::trace;

use crate::error::Error;
use crate::future::{Future, Thenable};
use crate::scheduler::{Scheduler, TimerId};

const CANCELLED_MESSAGE: &str = "Operation has been cancelled";

/// A future guarded by a deadline. Produced by [`timeout`] and friends.
pub struct Timeout<T: Clone + 'static> {
    future: Future<T>,
    timer: Rc<Cell<Option<TimerId>>>,
    scheduler: Scheduler,
}

/// Race `source` against a deadline of `ms` milliseconds, rejecting with a
/// timeout error whose message defaults to `"Timeout of {ms} ms has
/// exceeded"`. Whichever settles first wins.
///
/// With `ms == None` the source is passed through unguarded and `cancel`
/// is a no-op, so callers can treat every task uniformly.
pub fn timeout<T: Clone + 'static>(
    scheduler: &Scheduler,
    source: Future<T>,
    ms: Option<u64>,
) -> Timeout<T> {
    guard(scheduler, source, ms, None, None)
}

/// Like [`timeout`], with a custom rejection message.
pub fn timeout_with_message<T: Clone + 'static>(
    scheduler: &Scheduler,
    source: Future<T>,
    ms: Option<u64>,
    message: impl Into<String>,
) -> Timeout<T> {
    guard(scheduler, source, ms, Some(message.into()), None)
}

/// Like [`timeout`], with a custom expiration handler. On expiry the
/// handler receives the wrapper and the timeout error it would have been
/// rejected with, and may settle the wrapper however it likes.
pub fn timeout_with_handler<T: Clone + 'static>(
    scheduler: &Scheduler,
    source: Future<T>,
    ms: Option<u64>,
    handler: impl FnOnce(&Future<T>, Error) + 'static,
) -> Timeout<T> {
    guard(scheduler, source, ms, None, Some(Box::new(handler)))
}

type ExpiryHandler<T> = Box<dyn FnOnce(&Future<T>, Error)>;

fn guard<T: Clone + 'static>(
    scheduler: &Scheduler,
    source: Future<T>,
    ms: Option<u64>,
    message: Option<String>,
    handler: Option<ExpiryHandler<T>>,
) -> Timeout<T> {
    let Some(ms) = ms else {
        // pass-through: the wrapper settles exactly as the source does,
        // and cancel() finds nothing to clear or reject
        let wrapper = Future::new(scheduler);
        wrapper.resolve_with(&source);
        return Timeout {
            future: wrapper,
            timer: Rc::new(Cell::new(None)),
            scheduler: scheduler.clone(),
        };
    };

    let wrapper = Future::new(scheduler);
    let timer = Rc::new(Cell::new(None));

    {
        let wrapper = wrapper.clone();
        let timer = timer.clone();
        let scheduler = scheduler.clone();
        source.subscribe(move |outcome| {
            if let Some(id) = timer.take() {
                scheduler.cancel_timer(id);
            }
            match outcome {
                Ok(value) => {
                    wrapper.resolve(value);
                }
                Err(reason) => {
                    wrapper.reject(reason);
                }
            }
        });
    }

    let handler = handler.unwrap_or_else(|| {
        Box::new(|future: &Future<T>, error: Error| {
            future.reject(error);
        })
    });
    let id = {
        let wrapper = wrapper.clone();
        let timer = timer.clone();
        scheduler.set_timer(ms, move || {
            timer.set(None);
            let message =
                message.unwrap_or_else(|| format!("Timeout of {} ms has exceeded", ms));
            trace!(ms, "deadline elapsed");
            handler(&wrapper, Error::timeout(message));
        })
    };
    timer.set(Some(id));

    Timeout {
        future: wrapper,
        timer,
        scheduler: scheduler.clone(),
    }
}

impl<T: Clone + 'static> Timeout<T> {
    /// The settlement handle of the guarded operation.
    pub fn future(&self) -> &Future<T> {
        &self.future
    }

    /// Clear the pending deadline. Unless `silent`, additionally reject the
    /// wrapper with a cancellation error. A pass-through wrapper ignores
    /// both effects.
    pub fn cancel(&self, silent: bool) {
        if let Some(id) = self.timer.take() {
            trace!(silent, "cancelling deadline");
            self.scheduler.cancel_timer(id);
        }
        if !silent {
            self.future.reject(Error::cancelled(CANCELLED_MESSAGE));
        }
    }
}

impl<T: Clone + 'static> Thenable<T> for Timeout<T> {
    fn subscribe(
        self: Box<Self>,
        on_fulfilled: Box<dyn FnOnce(T)>,
        on_rejected: Box<dyn FnOnce(Error)>,
    ) {
        Box::new(self.future.clone()).subscribe(on_fulfilled, on_rejected);
    }
}

type DelayedCallback<T> = Box<dyn FnOnce() -> Result<T, Error>>;

/// A deferred computation. Produced by [`delay`] and [`delay_unit`].
pub struct Delay<T: Clone + 'static> {
    future: Future<T>,
    timer: Rc<Cell<Option<TimerId>>>,
    callback: Rc<RefCell<Option<DelayedCallback<T>>>>,
    scheduler: Scheduler,
}

/// Run `callback` after `ms` milliseconds, resolving with its output. An
/// `Err` from the callback rejects instead.
pub fn delay<T, F>(scheduler: &Scheduler, ms: u64, callback: F) -> Delay<T>
where
    T: Clone + 'static,
    F: FnOnce() -> Result<T, Error> + 'static,
{
    let future = Future::new(scheduler);
    let slot: Rc<RefCell<Option<DelayedCallback<T>>>> =
        Rc::new(RefCell::new(Some(Box::new(callback))));
    let timer = Rc::new(Cell::new(None));
    let id = {
        let future = future.clone();
        let slot = slot.clone();
        let timer = timer.clone();
        scheduler.set_timer(ms, move || {
            timer.set(None);
            run_delayed(&future, &slot);
        })
    };
    timer.set(Some(id));
    Delay {
        future,
        timer,
        callback: slot,
        scheduler: scheduler.clone(),
    }
}

/// [`delay`] without a computation: an empty future resolving after `ms`.
pub fn delay_unit(scheduler: &Scheduler, ms: u64) -> Delay<()> {
    delay(scheduler, ms, || Ok(()))
}

fn run_delayed<T: Clone + 'static>(
    future: &Future<T>,
    slot: &Rc<RefCell<Option<DelayedCallback<T>>>>,
) {
    if let Some(callback) = slot.borrow_mut().take() {
        match callback() {
            Ok(value) => {
                future.resolve(value);
            }
            Err(reason) => {
                future.reject(reason);
            }
        }
    }
}

impl<T: Clone + 'static> Delay<T> {
    /// The settlement handle of the deferred computation.
    pub fn future(&self) -> &Future<T> {
        &self.future
    }

    /// Clear the pending timer. Silent cancellation runs the callback
    /// immediately; loud cancellation rejects with a cancellation error and
    /// the callback never runs.
    pub fn cancel(&self, silent: bool) {
        if let Some(id) = self.timer.take() {
            trace!(silent, "cancelling delay");
            self.scheduler.cancel_timer(id);
        }
        if silent {
            run_delayed(&self.future, &self.callback);
        } else {
            self.callback.borrow_mut().take();
            self.future.reject(Error::cancelled(CANCELLED_MESSAGE));
        }
    }
}

impl<T: Clone + 'static> Thenable<T> for Delay<T> {
    fn subscribe(
        self: Box<Self>,
        on_fulfilled: Box<dyn FnOnce(T)>,
        on_rejected: Box<dyn FnOnce(Error)>,
    ) {
        Box::new(self.future.clone()).subscribe(on_fulfilled, on_rejected);
    }
}

/// A future with a settlement floor. Produced by [`throttle`].
pub struct Throttle<T: Clone + 'static> {
    future: Future<T>,
    gate: Delay<()>,
}

/// Resolve to `source`'s eventual outcome, but not before `ms` milliseconds
/// have elapsed. A floor, not a ceiling: slow futures are unaffected, fast
/// ones are held back.
pub fn throttle<T: Clone + 'static>(
    scheduler: &Scheduler,
    source: Future<T>,
    ms: u64,
) -> Throttle<T> {
    let gate = delay_unit(scheduler, ms);
    let result = Future::new(scheduler);
    {
        let result = result.clone();
        gate.future().subscribe(move |outcome| match outcome {
            Ok(()) => {
                result.resolve_with(&source);
            }
            Err(reason) => {
                result.reject(reason);
            }
        });
    }
    Throttle { future: result, gate }
}

impl<T: Clone + 'static> Throttle<T> {
    /// The settlement handle of the throttled operation.
    pub fn future(&self) -> &Future<T> {
        &self.future
    }

    /// Delegates to the underlying delay: silent cancellation lifts the
    /// floor immediately, loud cancellation rejects the wrapper.
    pub fn cancel(&self, silent: bool) {
        self.gate.cancel(silent);
    }
}

impl<T: Clone + 'static> Thenable<T> for Throttle<T> {
    fn subscribe(
        self: Box<Self>,
        on_fulfilled: Box<dyn FnOnce(T)>,
        on_rejected: Box<dyn FnOnce(Error)>,
    ) {
        Box::new(self.future.clone()).subscribe(on_fulfilled, on_rejected);
    }
}
