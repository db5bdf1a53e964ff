use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for channel traffic.
///
/// Updated with relaxed atomics on the send/receive fast paths; read out as
/// a [`MetricsSnapshot`]. Counts are monotone and may be mutually stale the
/// way the ring's `len` is — they are for dashboards, not accounting.
#[derive(Debug, Default)]
pub struct Metrics {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    send_waits: AtomicU64,
    receive_waits: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn add_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_send_wait(&self) {
        self.send_waits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_receive_wait(&self) {
        self.receive_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            send_waits: self.send_waits.load(Ordering::Relaxed),
            receive_waits: self.receive_waits.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of a channel's [`Metrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Values accepted by the ring.
    pub messages_sent: u64,
    /// Values handed to receivers.
    pub messages_received: u64,
    /// Times a sender parked on the full-ring condvar.
    pub send_waits: u64,
    /// Times a receiver parked on the empty-ring condvar.
    pub receive_waits: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_into_snapshot() {
        let metrics = Metrics::new();
        metrics.add_sent();
        metrics.add_sent();
        metrics.add_received();
        metrics.add_send_wait();

        let snap = metrics.snapshot();
        assert_eq!(snap.messages_sent, 2);
        assert_eq!(snap.messages_received, 1);
        assert_eq!(snap.send_waits, 1);
        assert_eq!(snap.receive_waits, 0);
    }
}
