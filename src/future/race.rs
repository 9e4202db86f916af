//! First-N-wins gate
//!
//! A [`Race`] limits how many of a set of competing callbacks may actually
//! execute. The resolution procedure uses a one-place race to guarantee a
//! foreign thenable cannot settle a future twice, or both ways.

use std::cell::Cell;
use std::rc::Rc;

struct Inner {
    places: usize,
    winners: Cell<usize>,
}

/// A quota shared by any number of racers. Each racer forwards to its
/// wrapped function only while fewer than `places` invocations across all
/// racers of this instance have won; afterwards it is a no-op.
#[derive(Clone)]
pub struct Race {
    inner: Rc<Inner>,
}

impl Race {
    /// Create a race with the given number of places.
    pub fn new(places: usize) -> Self {
        Self {
            inner: Rc::new(Inner {
                places,
                winners: Cell::new(0),
            }),
        }
    }

    /// Wrap `f` in a gate sharing this race's quota. The wrapper returns
    /// `Some(result)` if the call won a place and `None` once the quota is
    /// exhausted.
    pub fn racer<A, R>(&self, mut f: impl FnMut(A) -> R + 'static) -> impl FnMut(A) -> Option<R> + 'static {
        let inner = self.inner.clone();
        move |argument| {
            if inner.winners.get() >= inner.places {
                return None;
            }
            inner.winners.set(inner.winners.get() + 1);
            Some(f(argument))
        }
    }

    /// How many calls have won so far.
    pub fn winners(&self) -> usize {
        self.inner.winners.get()
    }

    /// The configured quota.
    pub fn places(&self) -> usize {
        self.inner.places
    }
}

impl Default for Race {
    fn default() -> Self {
        Self::new(1)
    }
}
