//! Filament - Building Blocks for Structured Asynchronous Systems Code
//!
//! Four tightly-coupled subsystems, in dependency order:
//!
//! - [`ring`]: a lock-free bounded MPMC ring buffer with a
//!   reserve/commit/acquire/release protocol over per-slot states.
//! - [`promise`]: a single-shot, thread-safe future/promise pair with
//!   callback attachment, blocking waits, a monadic surface, and
//!   `all`/`all_settled`/`any`/`race` combinators.
//! - [`task`]: stackless tasks over `async` bodies, driven inline by
//!   whichever thread settles the awaited future — no executor — with a
//!   cancellation chain and source-location tracebacks.
//! - [`channel`]: a bounded MPMC channel over the ring buffer with blocking
//!   and non-blocking variants, close-on-last-drop, and classifiable
//!   disconnection errors.
//!
//! They are tied together by the [`error`] taxonomy: error-code enums bound
//! to process-stable categories, classifiable into portable conditions.
//!
//! # Example
//!
//! ```
//! use filament_rs::channel::{channel, ChannelError};
//! use filament_rs::error::Condition;
//!
//! let (sender, receiver) = channel::<u64>(8);
//! sender.try_send(42).unwrap();
//! assert_eq!(receiver.try_receive(), Ok(42));
//!
//! // Disconnection is a classifiable condition, whichever code carries it.
//! drop(sender);
//! let error = receiver.try_receive().unwrap_err();
//! assert_eq!(error, Condition::from(ChannelError::Disconnected));
//! ```

pub mod channel;
pub mod error;
pub mod event;
mod invariants;
pub mod metrics;
pub mod promise;
pub mod ring;
pub mod task;

pub use channel::{
    channel, ChannelError, ReceiveError, Receiver, SendError, Sender, TryReceiveError,
    TrySendError,
};
pub use error::{Category, Code, Condition, Errc};
pub use event::Event;
pub use metrics::MetricsSnapshot;
pub use promise::{Future, FutureSet, Promise, WaitError};
pub use ring::RingBuffer;
pub use task::{CancelError, Cancellable, Task, TaskContext, TaskSet};

/// Poison-tolerant mutex lock: a panicking peer must not wedge the channel
/// or a task driver, so poisoning is absorbed rather than propagated.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
