//! Cooperative cancellation tokens
//!
//! A [`CancellationToken`] is a future specialization carrying a boolean
//! cancellation flag and a fan-in dependency relation: cancelling a
//! depended-upon token cancels all of its dependents, transitively.
//!
//! Cancellation is cooperative. Cancelling settles the token's internal
//! future so code awaiting it observes the signal; it never preempts work
//! already in flight.

use std::cell::Cell;
use std::rc::Rc;

use super::Future;
use crate::scheduler::Scheduler;

/// A composable cancellation signal. Handles are cheap to clone and share
/// the same underlying state.
#[derive(Clone)]
pub struct CancellationToken {
    future: Future<()>,
    flag: Rc<Cell<bool>>,
}

impl CancellationToken {
    /// Create a token that additionally cancels whenever any of
    /// `dependencies` cancels.
    pub fn new(scheduler: &Scheduler, dependencies: &[CancellationToken]) -> Self {
        let token = Self {
            future: Future::new(scheduler),
            flag: Rc::new(Cell::new(false)),
        };
        for dependency in dependencies {
            token.add_dependency(dependency);
        }
        token
    }

    /// Whether this token has been cancelled. Reflects `cancel()` calls
    /// synchronously; dependency-propagated cancellation lands a turn
    /// later.
    pub fn is_cancelled(&self) -> bool {
        self.flag.get()
    }

    /// Cancel this token. Idempotent.
    pub fn cancel(&self) {
        tracing::trace!("cancellation requested");
        self.future.resolve(());
        self.flag.set(true);
    }

    /// Run `callback` once cancellation occurs, on a later scheduler turn.
    pub fn on_cancelled(&self, callback: impl FnOnce() + 'static) {
        self.future.subscribe(move |_| callback());
    }

    /// Register that when `token` cancels, this token cancels too.
    /// Self-references are skipped. Cycles are not detected: a dependency
    /// cycle simply cancels every token in it once, since settlement is
    /// idempotent.
    pub fn add_dependency(&self, token: &CancellationToken) {
        if Rc::ptr_eq(&self.flag, &token.flag) {
            return;
        }
        let dependent = self.clone();
        token.on_cancelled(move || dependent.cancel());
    }
}
