//! Integration tests for the timer wrappers: deadline racing, deferred
//! computations, settlement floors, and the silent/loud cancellation modes.

mod common;

use sequent::{delay, delay_unit, throttle, timeout, timeout_with_handler, timeout_with_message};
use sequent::{Error, Future, Scheduler};
use std::cell::Cell;
use std::rc::Rc;

mod deadlines {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_source_settling_first_wins() {
        common::init_tracing();
        let scheduler = Scheduler::new();
        let source = Future::new(&scheduler);
        let guarded = timeout(&scheduler, source.clone(), Some(100));
        source.resolve(5);
        scheduler.run();
        assert_eq!(guarded.future().value(), Some(5));
    }

    #[test]
    fn test_deadline_rejects_with_default_message() {
        let scheduler = Scheduler::new();
        let never: Future<i32> = Future::new(&scheduler);
        let guarded = timeout(&scheduler, never, Some(50));
        let result = scheduler.run();
        assert_eq!(result.final_time, 50);
        assert_eq!(
            guarded.future().error(),
            Some(Error::timeout("Timeout of 50 ms has exceeded"))
        );
    }

    #[test]
    fn test_zero_deadline_rejects_without_advancing_time() {
        let scheduler = Scheduler::new();
        let never: Future<i32> = Future::new(&scheduler);
        let guarded = timeout(&scheduler, never, Some(0));
        let result = scheduler.run();
        assert_eq!(result.final_time, 0);
        assert_eq!(
            guarded.future().error(),
            Some(Error::timeout("Timeout of 0 ms has exceeded"))
        );
    }

    #[test]
    fn test_deadline_rejects_with_custom_message() {
        let scheduler = Scheduler::new();
        let never: Future<i32> = Future::new(&scheduler);
        let guarded = timeout_with_message(&scheduler, never, Some(10), "call took too long");
        scheduler.run();
        assert_eq!(
            guarded.future().error(),
            Some(Error::timeout("call took too long"))
        );
    }

    #[test]
    fn test_custom_handler_may_resolve_instead() {
        let scheduler = Scheduler::new();
        let never: Future<i32> = Future::new(&scheduler);
        let guarded = timeout_with_handler(&scheduler, never, Some(10), |future, _error| {
            future.resolve(-1);
        });
        scheduler.run();
        assert_eq!(guarded.future().value(), Some(-1));
    }

    #[test]
    fn test_settled_source_clears_the_timer() {
        let scheduler = Scheduler::new();
        let source = Future::new(&scheduler);
        let guarded = timeout(&scheduler, source.clone(), Some(1_000));
        source.resolve(1);
        let result = scheduler.run();
        // no deadline left to advance time to
        assert_eq!(result.final_time, 0);
        assert_eq!(guarded.future().value(), Some(1));
    }

    #[test]
    fn test_source_rejection_passes_through() {
        let scheduler = Scheduler::new();
        let source: Future<i32> = Future::new(&scheduler);
        let guarded = timeout(&scheduler, source.clone(), Some(100));
        source.reject(Error::other("upstream failed"));
        scheduler.run();
        assert_eq!(guarded.future().error(), Some(Error::other("upstream failed")));
    }

    #[test]
    fn test_no_deadline_passes_the_source_through() {
        let scheduler = Scheduler::new();
        let source = Future::new(&scheduler);
        let guarded = timeout(&scheduler, source.clone(), None);
        source.resolve(3);
        let result = scheduler.run();
        assert_eq!(result.final_time, 0);
        assert_eq!(guarded.future().value(), Some(3));
    }

    #[test]
    fn test_cancel_without_deadline_is_a_no_op() {
        let scheduler = Scheduler::new();
        let source = Future::new(&scheduler);
        let guarded = timeout(&scheduler, source.clone(), None);
        guarded.cancel(false);
        source.resolve(3);
        scheduler.run();
        assert_eq!(guarded.future().value(), Some(3));
    }

    #[test]
    fn test_loud_cancel_rejects_with_cancellation() {
        let scheduler = Scheduler::new();
        let never: Future<i32> = Future::new(&scheduler);
        let guarded = timeout(&scheduler, never, Some(100));
        guarded.cancel(false);
        let result = scheduler.run();
        assert_eq!(result.final_time, 0);
        assert_eq!(
            guarded.future().error(),
            Some(Error::cancelled("Operation has been cancelled"))
        );
    }

    #[test]
    fn test_silent_cancel_keeps_waiting_for_the_source() {
        let scheduler = Scheduler::new();
        let source = Future::new(&scheduler);
        let guarded = timeout(&scheduler, source.clone(), Some(10));
        guarded.cancel(true);
        let result = scheduler.run();
        // the deadline is gone but the source subscription survives
        assert_eq!(result.final_time, 0);
        assert!(guarded.future().is_pending());
        source.resolve(8);
        scheduler.run();
        assert_eq!(guarded.future().value(), Some(8));
    }
}

mod delays {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_callback_runs_at_the_deadline() {
        let scheduler = Scheduler::new();
        let deferred = delay(&scheduler, 25, || Ok(7));
        let result = scheduler.run();
        assert_eq!(result.final_time, 25);
        assert_eq!(deferred.future().value(), Some(7));
    }

    #[test]
    fn test_callback_failure_rejects() {
        let scheduler = Scheduler::new();
        let deferred: sequent::Delay<i32> =
            delay(&scheduler, 5, || Err(Error::other("computation failed")));
        scheduler.run();
        assert_eq!(
            deferred.future().error(),
            Some(Error::other("computation failed"))
        );
    }

    #[test]
    fn test_unit_delay_resolves_empty() {
        let scheduler = Scheduler::new();
        let deferred = delay_unit(&scheduler, 40);
        let result = scheduler.run();
        assert_eq!(result.final_time, 40);
        assert_eq!(deferred.future().value(), Some(()));
    }

    #[test]
    fn test_silent_cancel_runs_the_callback_immediately() {
        let scheduler = Scheduler::new();
        let deferred = delay(&scheduler, 1_000, || Ok(11));
        deferred.cancel(true);
        let result = scheduler.run();
        assert_eq!(result.final_time, 0);
        assert_eq!(deferred.future().value(), Some(11));
    }

    #[test]
    fn test_loud_cancel_never_runs_the_callback() {
        let scheduler = Scheduler::new();
        let ran = Rc::new(Cell::new(false));
        let deferred = {
            let ran = ran.clone();
            delay(&scheduler, 1_000, move || {
                ran.set(true);
                Ok(11)
            })
        };
        deferred.cancel(false);
        scheduler.run();
        assert!(!ran.get());
        assert_eq!(
            deferred.future().error(),
            Some(Error::cancelled("Operation has been cancelled"))
        );
    }

    #[test]
    fn test_cancel_after_firing_is_a_no_op() {
        let scheduler = Scheduler::new();
        let deferred = delay(&scheduler, 5, || Ok(1));
        scheduler.run();
        deferred.cancel(false);
        scheduler.run();
        assert_eq!(deferred.future().value(), Some(1));
    }
}

mod throttling {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fast_source_is_held_to_the_floor() {
        let scheduler = Scheduler::new();
        let source = Future::resolved(&scheduler, 4);
        let throttled = throttle(&scheduler, source, 50);
        let result = scheduler.run();
        assert_eq!(result.final_time, 50);
        assert_eq!(throttled.future().value(), Some(4));
    }

    #[test]
    fn test_slow_source_is_unaffected() {
        let scheduler = Scheduler::new();
        let deferred = delay(&scheduler, 80, || Ok(4));
        let throttled = throttle(&scheduler, deferred.future().clone(), 50);
        let result = scheduler.run();
        assert_eq!(result.final_time, 80);
        assert_eq!(throttled.future().value(), Some(4));
    }

    #[test]
    fn test_silent_cancel_lifts_the_floor() {
        let scheduler = Scheduler::new();
        let source = Future::resolved(&scheduler, 4);
        let throttled = throttle(&scheduler, source, 1_000);
        throttled.cancel(true);
        let result = scheduler.run();
        assert_eq!(result.final_time, 0);
        assert_eq!(throttled.future().value(), Some(4));
    }

    #[test]
    fn test_loud_cancel_rejects_the_result() {
        let scheduler = Scheduler::new();
        let source = Future::resolved(&scheduler, 4);
        let throttled = throttle(&scheduler, source, 1_000);
        throttled.cancel(false);
        scheduler.run();
        assert_eq!(
            throttled.future().error(),
            Some(Error::cancelled("Operation has been cancelled"))
        );
    }

    #[test]
    fn test_source_rejection_propagates_after_the_floor() {
        let scheduler = Scheduler::new();
        let source: Future<i32> = Future::rejected(&scheduler, Error::other("broken"));
        let throttled = throttle(&scheduler, source, 30);
        let result = scheduler.run();
        assert_eq!(result.final_time, 30);
        assert_eq!(throttled.future().error(), Some(Error::other("broken")));
    }
}
