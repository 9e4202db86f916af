//! Sequent: deferred futures and sequential task queues
//!
//! Sequent is a small toolkit for single-threaded, cooperative concurrency:
//! an externally settleable [`Future`] with Promises/A+-style `then`
//! semantics, a [`CancellationToken`] with fan-in propagation, cancellable
//! [`timer`] wrappers, and a strictly sequential [`TaskQueue`], all driven
//! by one deterministic virtual-time [`Scheduler`].
//!
//! There is no parallelism anywhere: "concurrency" here means interleaving
//! of continuations on the scheduler's microtask queue, which is what makes
//! every run reproducible and every ordering testable.
//!
//! # Quick Start
//!
//! ```
//! use sequent::{Future, QueueOptions, Scheduler, TaskOptions, TaskQueue};
//!
//! let scheduler = Scheduler::new();
//! let queue = TaskQueue::started(&scheduler, QueueOptions::default());
//!
//! let worker = scheduler.clone();
//! let completion = queue.push(
//!     move || Ok(Future::resolved(&worker, 42)),
//!     TaskOptions::default(),
//! );
//!
//! scheduler.run();
//! assert_eq!(completion.value(), Some(42));
//! ```
//!
//! # Module Overview
//!
//! | Category | Modules |
//! |----------|---------|
//! | **Core** | [`future`], [`scheduler`], [`error`](Error) |
//! | **Composition** | [`future::race`], [`future::cancellation`] |
//! | **Time** | [`timer`] |
//! | **Execution** | [`queue`] |

pub mod future;
pub mod queue;
pub mod scheduler;
pub mod timer;

mod error;

pub use error::{Error, Result};
pub use future::cancellation::CancellationToken;
pub use future::race::Race;
pub use future::{Chained, Future, Status, Thenable};
pub use queue::{QueueOptions, Statistics, TaskOptions, TaskQueue};
pub use scheduler::{RunResult, Scheduler, SchedulerStats, TimerId};
pub use timer::{
    delay, delay_unit, throttle, timeout, timeout_with_handler, timeout_with_message, Delay,
    Throttle, Timeout,
};

/// Sequent version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
