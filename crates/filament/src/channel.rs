//! Bounded MPMC channel over the lock-free ring buffer.
//!
//! [`channel`] returns a `(Sender, Receiver)` pair of reference-counted
//! handles to a shared core. Fast paths go straight to the ring; blocking
//! variants park on per-role condition variables and are woken by the
//! opposite role after every successful transfer. Dropping the last handle
//! of either role closes the channel; values already in the ring stay
//! receivable until drained.

use crate::invariants::debug_assert_counter_nonzero;
use crate::lock;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::ring::RingBuffer;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

const SENDER: usize = 0;
const RECEIVER: usize = 1;

crate::define_error_code! {
    /// Outcome of [`Sender::try_send`].
    pub enum TrySendError("filament::channel::Sender::try_send") {
        Disconnected = 1 => "sending on a disconnected channel",
        Full = 2 => "sending on a full channel" [crate::error::Errc::WouldBlock],
    }
}

crate::define_error_code! {
    /// Outcome of [`Sender::send`].
    pub enum SendError("filament::channel::Sender::send") {
        Disconnected = 1 => "sending on a disconnected channel",
        Timeout = 2 => "timed out waiting on send operation" [crate::error::Errc::TimedOut],
    }
}

crate::define_error_code! {
    /// Outcome of [`Receiver::try_receive`].
    pub enum TryReceiveError("filament::channel::Receiver::try_receive") {
        Disconnected = 1 => "receiving on an empty and disconnected channel",
        Empty = 2 => "receiving on an empty channel" [crate::error::Errc::WouldBlock],
    }
}

crate::define_error_code! {
    /// Outcome of [`Receiver::receive`].
    pub enum ReceiveError("filament::channel::Receiver::receive") {
        Disconnected = 1 => "channel is empty and disconnected",
        Timeout = 2 => "timed out waiting on receive operation" [crate::error::Errc::TimedOut],
    }
}

crate::define_error_condition! {
    /// Portable classification of channel failures: callers can match
    /// disconnection without knowing which of the four operation-specific
    /// codes produced it.
    pub enum ChannelError("filament::channel") {
        Disconnected = 1 => "channel disconnected" [|code: crate::error::Code| {
            code == crate::error::Code::from(TrySendError::Disconnected)
                || code == crate::error::Code::from(SendError::Disconnected)
                || code == crate::error::Code::from(TryReceiveError::Disconnected)
                || code == crate::error::Code::from(ReceiveError::Disconnected)
        }],
    }
}

struct WaitState {
    /// Per-role "somebody is parked" flags; cleared under the mutex before
    /// the matching condvar is notified, so wakeups are never wasted on
    /// roles with no waiter.
    waiting: [bool; 2],
}

struct ChannelCore<T> {
    buffer: RingBuffer<T>,
    closed: AtomicBool,
    wait_state: Mutex<WaitState>,
    available: [Condvar; 2],
    /// Live handle counts per role; the last handle of a role to drop
    /// closes the channel.
    counters: [AtomicUsize; 2],
    metrics: Metrics,
}

impl<T> ChannelCore<T> {
    fn new(capacity: usize) -> Self {
        Self {
            buffer: RingBuffer::new(capacity),
            closed: AtomicBool::new(false),
            wait_state: Mutex::new(WaitState {
                waiting: [false, false],
            }),
            available: [Condvar::new(), Condvar::new()],
            counters: [AtomicUsize::new(1), AtomicUsize::new(1)],
            metrics: Metrics::new(),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Wakes `role` if (and only if) it is parked.
    fn trigger(&self, role: usize) {
        {
            let mut state = lock(&self.wait_state);
            if !state.waiting[role] {
                return;
            }
            state.waiting[role] = false;
        }
        self.available[role].notify_all();
    }

    /// Idempotent: the first close wins and wakes both roles.
    fn close(&self) {
        {
            let _state = lock(&self.wait_state);
            if self.closed.swap(true, Ordering::AcqRel) {
                return;
            }
        }
        self.trigger(SENDER);
        self.trigger(RECEIVER);
    }
}

/// Creates a bounded channel of the given capacity.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn channel<T: Send>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    let core = Arc::new(ChannelCore::new(capacity));
    (
        Sender {
            core: Arc::clone(&core),
        },
        Receiver { core },
    )
}

/// Producing handle. Clone freely; the channel closes when the last sender
/// (or last receiver) is dropped.
pub struct Sender<T> {
    core: Arc<ChannelCore<T>>,
}

impl<T: Send> Sender<T> {
    /// Non-blocking send.
    pub fn try_send(&self, value: T) -> Result<(), TrySendError> {
        if self.core.is_closed() {
            return Err(TrySendError::Disconnected);
        }
        if self.core.buffer.push(value).is_err() {
            return Err(TrySendError::Full);
        }
        self.core.metrics.add_sent();
        self.core.trigger(RECEIVER);
        Ok(())
    }

    /// Blocks until the value is accepted, the channel closes, or `timeout`
    /// elapses (`None` waits indefinitely). Each wakeup re-attempts the
    /// transfer with the caller's full timeout.
    pub fn send(&self, value: T, timeout: Option<Duration>) -> Result<(), SendError> {
        if self.core.is_closed() {
            return Err(SendError::Disconnected);
        }

        let mut value = value;
        loop {
            match self.core.buffer.push(value) {
                Ok(()) => {
                    self.core.metrics.add_sent();
                    self.core.trigger(RECEIVER);
                    return Ok(());
                }
                Err(rejected) => value = rejected,
            }

            let mut state = lock(&self.core.wait_state);
            if self.core.is_closed() {
                return Err(SendError::Disconnected);
            }
            // The full condition may have cleared between the failed push
            // and the lock.
            if !self.core.buffer.is_full() {
                continue;
            }
            state.waiting[SENDER] = true;
            self.core.metrics.add_send_wait();

            match timeout {
                None => {
                    let _state = self.core.available[SENDER]
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(timeout) => {
                    let (_state, result) = self.core.available[SENDER]
                        .wait_timeout(state, timeout)
                        .unwrap_or_else(PoisonError::into_inner);
                    if result.timed_out() {
                        return Err(SendError::Timeout);
                    }
                }
            }
        }
    }

    /// Closes the channel for every handle.
    pub fn close(&self) {
        self.core.close();
    }

    pub fn len(&self) -> usize {
        self.core.buffer.len()
    }

    pub fn capacity(&self) -> usize {
        self.core.buffer.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.core.buffer.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.core.buffer.is_full()
    }

    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.core.metrics.snapshot()
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        self.core.counters[SENDER].fetch_add(1, Ordering::Relaxed);
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        let previous = self.core.counters[SENDER].fetch_sub(1, Ordering::AcqRel);
        debug_assert_counter_nonzero!(SENDER, previous);
        if previous == 1 {
            self.core.close();
        }
    }
}

/// Consuming handle. Clone freely; the channel closes when the last
/// receiver (or last sender) is dropped.
pub struct Receiver<T> {
    core: Arc<ChannelCore<T>>,
}

impl<T: Send> Receiver<T> {
    /// Non-blocking receive. Reports `Disconnected` only once the channel
    /// is closed *and* drained; pending values are always delivered first.
    pub fn try_receive(&self) -> Result<T, TryReceiveError> {
        match self.core.buffer.pop() {
            Some(value) => {
                self.core.metrics.add_received();
                self.core.trigger(SENDER);
                Ok(value)
            }
            None => Err(if self.core.is_closed() {
                TryReceiveError::Disconnected
            } else {
                TryReceiveError::Empty
            }),
        }
    }

    /// Blocks until a value arrives, the channel closes empty, or `timeout`
    /// elapses (`None` waits indefinitely).
    pub fn receive(&self, timeout: Option<Duration>) -> Result<T, ReceiveError> {
        loop {
            if let Some(value) = self.core.buffer.pop() {
                self.core.metrics.add_received();
                self.core.trigger(SENDER);
                return Ok(value);
            }

            let mut state = lock(&self.core.wait_state);
            // A producer may have slipped in between the failed pop and the
            // lock.
            if !self.core.buffer.is_empty() {
                continue;
            }
            if self.core.is_closed() {
                return Err(ReceiveError::Disconnected);
            }
            state.waiting[RECEIVER] = true;
            self.core.metrics.add_receive_wait();

            match timeout {
                None => {
                    let _state = self.core.available[RECEIVER]
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(timeout) => {
                    let (_state, result) = self.core.available[RECEIVER]
                        .wait_timeout(state, timeout)
                        .unwrap_or_else(PoisonError::into_inner);
                    if result.timed_out() {
                        return Err(ReceiveError::Timeout);
                    }
                }
            }
        }
    }

    /// Closes the channel for every handle.
    pub fn close(&self) {
        self.core.close();
    }

    pub fn len(&self) -> usize {
        self.core.buffer.len()
    }

    pub fn capacity(&self) -> usize {
        self.core.buffer.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.core.buffer.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.core.buffer.is_full()
    }

    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.core.metrics.snapshot()
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        self.core.counters[RECEIVER].fetch_add(1, Ordering::Relaxed);
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        let previous = self.core.counters[RECEIVER].fetch_sub(1, Ordering::AcqRel);
        debug_assert_counter_nonzero!(RECEIVER, previous);
        if previous == 1 {
            self.core.close();
        }
    }
}
