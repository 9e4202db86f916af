//! Deferred futures
//!
//! [`Future`] is a single-assignment, externally-settleable container for an
//! eventual value or failure. It follows the Promises/A+ contract for
//! `then`-style chaining: settlement is observed on a later scheduler turn
//! than the settling call, subscribers fire in registration order, and
//! resolution with another future or any then-shaped object adopts that
//! object's outcome through a guarded resolution procedure.
//!
//! Settlement is always at-most-once: the first `resolve`/`reject` wins and
//! every later attempt is a no-op.

pub mod cancellation;
pub mod race;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::Error;
use crate::scheduler::Scheduler;

use race::Race;

/// Settlement state of a [`Future`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Not yet settled.
    Pending,
    /// Transient: chasing an adopted thenable's own resolution. Refuses
    /// direct external settlement.
    Resolving,
    /// Settled with a value.
    Fulfilled,
    /// Settled with a failure.
    Rejected,
}

/// What a continuation hands back: an immediate value, a failure, or
/// another future whose outcome the derived future adopts.
pub enum Chained<T: Clone + 'static> {
    Value(T),
    Rejected(Error),
    Deferred(Future<T>),
}

/// Any then-shaped object: something that can report a single settlement to
/// a pair of callbacks.
///
/// A conforming implementation invokes exactly one of the callbacks,
/// exactly once. [`Future::adopt`] tolerates implementations that do not by
/// gating both callbacks through a shared one-place [`Race`].
pub trait Thenable<T> {
    fn subscribe(
        self: Box<Self>,
        on_fulfilled: Box<dyn FnOnce(T)>,
        on_rejected: Box<dyn FnOnce(Error)>,
    );
}

type Reaction<T> = Box<dyn FnOnce(Result<T, Error>)>;

struct Shared<T: Clone + 'static> {
    status: Status,
    /// Fulfillment value or rejection reason. Never both; immutable once
    /// the status leaves `Pending`.
    identity: Option<Result<T, Error>>,
    /// Subscribers awaiting settlement, in registration order.
    queue: Vec<Reaction<T>>,
    /// Coalesces propagation: at most one flush is scheduled at a time.
    propagation_scheduled: bool,
    /// Whether any subscriber ever observed this future.
    handled: bool,
    /// Whether an unobserved rejection was already reported.
    reported: bool,
}

/// A resolvable/rejectable deferred value with `then`-chaining.
///
/// Handles are cheap to clone and share the same underlying state; cloning
/// does not fork the future.
pub struct Future<T: Clone + 'static> {
    shared: Rc<RefCell<Shared<T>>>,
    scheduler: Scheduler,
}

impl<T: Clone + 'static> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<T: Clone + 'static> Future<T> {
    /// Create a new pending future driven by the given scheduler.
    pub fn new(scheduler: &Scheduler) -> Self {
        Self {
            shared: Rc::new(RefCell::new(Shared {
                status: Status::Pending,
                identity: None,
                queue: Vec::new(),
                propagation_scheduled: false,
                handled: false,
                reported: false,
            })),
            scheduler: scheduler.clone(),
        }
    }

    /// Create a pending future, synchronously handing the new instance to
    /// `resolver` for external settlement wiring.
    pub fn with_resolver(scheduler: &Scheduler, resolver: impl FnOnce(&Future<T>)) -> Self {
        let future = Self::new(scheduler);
        resolver(&future);
        future
    }

    /// The scheduler this future propagates through.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Create an already-fulfilled future.
    pub fn resolved(scheduler: &Scheduler, value: T) -> Self {
        let future = Self::new(scheduler);
        future.resolve(value);
        future
    }

    /// Create an already-rejected future.
    pub fn rejected(scheduler: &Scheduler, reason: Error) -> Self {
        let future = Self::new(scheduler);
        future.reject(reason);
        future
    }

    /// Adapt any thenable into a future, giving callers an externally
    /// settleable handle on it. The wrapper counts as the source's
    /// observer: a rejecting source that nobody ever subscribes to is not
    /// reported as unhandled.
    pub fn wrap<X>(scheduler: &Scheduler, thenable: X) -> Self
    where
        X: Thenable<T> + 'static,
    {
        let future = Self::new(scheduler);
        future.shared.borrow_mut().handled = true;
        future.adopt(thenable);
        future
    }

    /// Resolve when every input fulfills, preserving positional order;
    /// reject with the first rejection.
    pub fn all(scheduler: &Scheduler, futures: Vec<Future<T>>) -> Future<Vec<T>> {
        let result: Future<Vec<T>> = Future::new(scheduler);
        let count = futures.len();
        if count == 0 {
            result.resolve(Vec::new());
            return result;
        }
        let slots: Rc<RefCell<Vec<Option<T>>>> = Rc::new(RefCell::new(vec![None; count]));
        let remaining = Rc::new(RefCell::new(count));
        for (index, future) in futures.into_iter().enumerate() {
            let result = result.clone();
            let slots = slots.clone();
            let remaining = remaining.clone();
            future.subscribe(move |outcome| match outcome {
                Ok(value) => {
                    slots.borrow_mut()[index] = Some(value);
                    let mut left = remaining.borrow_mut();
                    *left -= 1;
                    if *left == 0 {
                        let values = slots.borrow_mut().drain(..).flatten().collect();
                        result.resolve(values);
                    }
                }
                Err(reason) => {
                    result.reject(reason);
                }
            });
        }
        result
    }

    /// Settle with the first input to settle, fulfilled or rejected.
    pub fn race(scheduler: &Scheduler, futures: Vec<Future<T>>) -> Future<T> {
        let result = Future::new(scheduler);
        for future in futures {
            let result = result.clone();
            future.subscribe(move |outcome| result.settle(outcome));
        }
        result
    }

    /// One-shot settlement. No-op once the status has left `Pending` or
    /// `Resolving`; used by the adoption path to finish a `Resolving`
    /// future.
    fn settle(&self, outcome: Result<T, Error>) {
        {
            let mut shared = self.shared.borrow_mut();
            if matches!(shared.status, Status::Fulfilled | Status::Rejected) {
                return;
            }
            shared.status = match outcome {
                Ok(_) => Status::Fulfilled,
                Err(_) => Status::Rejected,
            };
            shared.identity = Some(outcome);
        }
        self.schedule_propagation();
    }

    /// Fulfill with `value`. First call wins; later calls (and calls while
    /// adopting a thenable) are no-ops. Returns the handle for chaining.
    pub fn resolve(&self, value: T) -> &Self {
        if self.status() == Status::Pending {
            self.settle(Ok(value));
        }
        self
    }

    /// Alias of [`Future::resolve`].
    pub fn fulfill(&self, value: T) -> &Self {
        self.resolve(value)
    }

    /// Reject with `reason`. Same one-shot discipline as `resolve`, no
    /// unwrapping of any kind.
    pub fn reject(&self, reason: Error) -> &Self {
        if self.status() == Status::Pending {
            self.settle(Err(reason));
        }
        self
    }

    /// Resolve by adopting another future's outcome.
    ///
    /// Self-resolution rejects with a type error; a settled source is
    /// copied immediately; a pending source is chased through the
    /// `Resolving` state, during which direct `resolve`/`reject` calls are
    /// refused.
    pub fn resolve_with(&self, source: &Future<T>) -> &Self {
        if self.status() != Status::Pending {
            return self;
        }
        if Rc::ptr_eq(&self.shared, &source.shared) {
            return self.reject(Error::type_error("can't resolve future with itself"));
        }
        match source.identity() {
            Some(outcome) => self.settle(outcome),
            None => {
                self.shared.borrow_mut().status = Status::Resolving;
                let target = self.clone();
                source.subscribe(move |outcome| target.settle(outcome));
            }
        }
        self
    }

    /// Resolve by adopting a foreign thenable (Promises/A+ §2.3).
    ///
    /// The thenable's `subscribe` is invoked exactly once, with both
    /// callbacks gated through a shared one-place [`Race`]: a misbehaving
    /// implementation can neither settle this future twice nor settle it
    /// both ways.
    pub fn adopt<X>(&self, thenable: X)
    where
        X: Thenable<T> + 'static,
    {
        if self.status() != Status::Pending {
            return;
        }
        self.shared.borrow_mut().status = Status::Resolving;
        let race = Race::new(1);
        let fulfilled = self.clone();
        let rejected = self.clone();
        let mut win_fulfill = race.racer(move |value: T| fulfilled.settle(Ok(value)));
        let mut win_reject = race.racer(move |reason: Error| rejected.settle(Err(reason)));
        Box::new(thenable).subscribe(
            Box::new(move |value| {
                win_fulfill(value);
            }),
            Box::new(move |reason| {
                win_reject(reason);
            }),
        );
    }

    /// Low-level subscription: `reaction` receives the settled outcome on a
    /// later scheduler turn than settlement, in registration order.
    /// Subscribing marks this future's rejection as observed.
    pub fn subscribe(&self, reaction: impl FnOnce(Result<T, Error>) + 'static) {
        let settled = {
            let mut shared = self.shared.borrow_mut();
            shared.handled = true;
            shared.queue.push(Box::new(reaction));
            matches!(shared.status, Status::Fulfilled | Status::Rejected)
        };
        if settled {
            self.schedule_propagation();
        }
    }

    /// Full `then` form: a fulfillment and a rejection handler, each
    /// producing the derived future's continuation. Handler outputs flow
    /// through the resolution procedure, so a returned future is adopted.
    pub fn then<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Future<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Chained<U> + 'static,
        R: FnOnce(Error) -> Chained<U> + 'static,
    {
        let target: Future<U> = Future::new(&self.scheduler);
        let chained = target.clone();
        self.subscribe(move |outcome| {
            let step = match outcome {
                Ok(value) => on_fulfilled(value),
                Err(reason) => on_rejected(reason),
            };
            chained.follow(step);
        });
        target
    }

    /// Map the fulfillment value; a rejection is re-raised on the derived
    /// future untouched.
    pub fn map<U, F>(&self, f: F) -> Future<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> U + 'static,
    {
        self.then(move |value| Chained::Value(f(value)), Chained::Rejected)
    }

    /// Handle a rejection; a fulfillment value passes through untouched.
    pub fn catch<R>(&self, on_rejected: R) -> Future<T>
    where
        R: FnOnce(Error) -> Chained<T> + 'static,
    {
        self.then(Chained::Value, on_rejected)
    }

    /// Run `f` on either outcome, passing the settlement through.
    pub fn finally(&self, f: impl FnOnce() + 'static) -> Future<T> {
        let target = Future::new(&self.scheduler);
        let chained = target.clone();
        self.subscribe(move |outcome| {
            f();
            chained.settle(outcome);
        });
        target
    }

    /// Apply a continuation's output to this (pending) future.
    fn follow(&self, step: Chained<T>) {
        match step {
            Chained::Value(value) => self.settle(Ok(value)),
            Chained::Rejected(reason) => self.settle(Err(reason)),
            Chained::Deferred(future) => {
                self.resolve_with(&future);
            }
        }
    }

    fn schedule_propagation(&self) {
        {
            let mut shared = self.shared.borrow_mut();
            if shared.propagation_scheduled {
                return;
            }
            shared.propagation_scheduled = true;
        }
        let this = self.clone();
        self.scheduler.enqueue(move || this.propagate());
    }

    /// Flush subscribers registered before this turn. A rejection that
    /// reaches a flush with nobody ever subscribed is reported to the
    /// scheduler instead of crashing the host.
    fn propagate(&self) {
        let (staged, outcome) = {
            let mut shared = self.shared.borrow_mut();
            shared.propagation_scheduled = false;
            if !matches!(shared.status, Status::Fulfilled | Status::Rejected) {
                return;
            }
            let outcome = match shared.identity.clone() {
                Some(outcome) => outcome,
                None => return,
            };
            (std::mem::take(&mut shared.queue), outcome)
        };
        if staged.is_empty() {
            if let Err(reason) = &outcome {
                let report = {
                    let mut shared = self.shared.borrow_mut();
                    let report = !shared.handled && !shared.reported;
                    shared.reported = shared.reported || report;
                    report
                };
                if report {
                    self.scheduler.report_unhandled(reason.clone());
                }
            }
            return;
        }
        for reaction in staged {
            reaction(outcome.clone());
        }
    }

    fn identity(&self) -> Option<Result<T, Error>> {
        self.shared.borrow().identity.clone()
    }

    /// Current status. Valid at any time.
    pub fn status(&self) -> Status {
        self.shared.borrow().status
    }

    /// Exact status comparison.
    pub fn has_status(&self, status: Status) -> bool {
        self.status() == status
    }

    /// `true` while unsettled, including the transient `Resolving` state.
    pub fn is_pending(&self) -> bool {
        matches!(self.status(), Status::Pending | Status::Resolving)
    }

    /// `true` once settled with a value.
    pub fn is_fulfilled(&self) -> bool {
        self.has_status(Status::Fulfilled)
    }

    /// `true` once settled with a failure.
    pub fn is_rejected(&self) -> bool {
        self.has_status(Status::Rejected)
    }

    /// `true` once settled either way.
    pub fn is_resolved(&self) -> bool {
        !self.is_pending()
    }

    /// Fulfillment value, if settled with one. `None` while pending.
    pub fn value(&self) -> Option<T> {
        match self.identity() {
            Some(Ok(value)) => Some(value),
            _ => None,
        }
    }

    /// Rejection reason, if settled with one. `None` while pending.
    pub fn error(&self) -> Option<Error> {
        match self.identity() {
            Some(Err(reason)) => Some(reason),
            _ => None,
        }
    }
}

impl<T: Clone + fmt::Debug + 'static> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.shared.borrow();
        write!(f, "Future <{:?}", shared.status)?;
        match &shared.identity {
            Some(Ok(value)) => write!(f, ":{:?}", value)?,
            Some(Err(reason)) => write!(f, ":{}", reason)?,
            None => {}
        }
        write!(f, ">")
    }
}

impl<T: Clone + 'static> Thenable<T> for Future<T> {
    fn subscribe(
        self: Box<Self>,
        on_fulfilled: Box<dyn FnOnce(T)>,
        on_rejected: Box<dyn FnOnce(Error)>,
    ) {
        Future::subscribe(&self, move |outcome| match outcome {
            Ok(value) => on_fulfilled(value),
            Err(reason) => on_rejected(reason),
        });
    }
}
