//! Loom models of the crate's two synchronization protocols.
//!
//! Run with: `cargo test --features loom --test loom_tests --release`
//!
//! Loom exhaustively explores thread interleavings, so the protocols are
//! modelled in isolation with small state spaces rather than through the
//! full types: the ring's per-slot state handshake, and the promise core's
//! two-bit settlement lattice.

#![cfg(feature = "loom")]

use loom::cell::UnsafeCell;
use loom::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use loom::sync::Arc;
use loom::thread;

const IDLE: u8 = 0;
const RESERVING: u8 = 1;
const VALID: u8 = 2;
const CONSUMING: u8 = 3;

/// Two producers race for the same slot: the IDLE -> RESERVING edge admits
/// exactly one.
#[test]
fn slot_reservation_is_mutually_exclusive() {
    loom::model(|| {
        let state = Arc::new(AtomicU8::new(IDLE));
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let state = Arc::clone(&state);
                let winners = Arc::clone(&winners);
                thread::spawn(move || {
                    if state
                        .compare_exchange(IDLE, RESERVING, Ordering::Acquire, Ordering::Relaxed)
                        .is_ok()
                    {
                        winners.fetch_add(1, Ordering::Relaxed);
                        state.store(VALID, Ordering::Release);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::Relaxed), 1);
    });
}

/// A committed payload is visible to the consumer that acquires the slot:
/// the release store of VALID publishes the preceding cell write.
#[test]
fn commit_publishes_the_payload() {
    loom::model(|| {
        struct Slot {
            state: AtomicU8,
            value: UnsafeCell<u64>,
        }
        unsafe impl Send for Slot {}
        unsafe impl Sync for Slot {}

        let slot = Arc::new(Slot {
            state: AtomicU8::new(IDLE),
            value: UnsafeCell::new(0),
        });

        let producer = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || {
                assert!(slot
                    .state
                    .compare_exchange(IDLE, RESERVING, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok());
                slot.value.with_mut(|value| unsafe { *value = 7 });
                slot.state.store(VALID, Ordering::Release);
            })
        };

        // The consumer only reads after winning VALID -> CONSUMING; if the
        // commit has not happened yet in this interleaving, it simply skips.
        if slot
            .state
            .compare_exchange(VALID, CONSUMING, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            let observed = slot.value.with(|value| unsafe { *value });
            assert_eq!(observed, 7);
            slot.state.store(IDLE, Ordering::Release);
        }

        producer.join().unwrap();
    });
}

const PENDING: u8 = 0;
const ONLY_CALLBACK: u8 = 1;
const ONLY_RESULT: u8 = 2;
const DONE: u8 = 3;

/// The settlement lattice: whichever of {result, callback} arrives second
/// completes DONE and triggers — exactly one side, in every interleaving.
#[test]
fn settlement_lattice_triggers_exactly_once() {
    loom::model(|| {
        let state = Arc::new(AtomicU8::new(PENDING));
        let triggers = Arc::new(AtomicUsize::new(0));

        let producer = {
            let state = Arc::clone(&state);
            let triggers = Arc::clone(&triggers);
            thread::spawn(move || {
                if state
                    .compare_exchange(PENDING, ONLY_RESULT, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    // Consumer got there first; this side owns the trigger.
                    state.store(DONE, Ordering::Release);
                    triggers.fetch_add(1, Ordering::Relaxed);
                }
            })
        };

        if state
            .compare_exchange(PENDING, ONLY_CALLBACK, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            state.store(DONE, Ordering::Release);
            triggers.fetch_add(1, Ordering::Relaxed);
        }

        producer.join().unwrap();

        assert_eq!(state.load(Ordering::Acquire), DONE);
        assert_eq!(triggers.load(Ordering::Relaxed), 1);
    });
}
