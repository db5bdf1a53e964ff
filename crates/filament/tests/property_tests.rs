//! Property-based tests for the ring buffer, channel, and combinators.
//!
//! Single-threaded drivers over arbitrary operation sequences; the
//! concurrency-sensitive protocols get their own treatment in
//! `loom_tests.rs` and the threaded scenarios in `integration_tests.rs`.

use filament_rs::channel::{channel, TryReceiveError};
use filament_rs::promise::{self, Future};
use filament_rs::ring::RingBuffer;
use proptest::prelude::*;

proptest! {
    /// The ring never reports more items than its capacity, and under a
    /// single thread its length tracks the push/pop balance exactly.
    #[test]
    fn ring_len_is_bounded_and_exact(
        ops in prop::collection::vec(prop::bool::ANY, 1..200),
        capacity in 1usize..16,
    ) {
        let ring = RingBuffer::new(capacity);
        let mut expected_len = 0usize;

        for is_push in ops {
            if is_push {
                match ring.push(0u32) {
                    Ok(()) => expected_len += 1,
                    Err(_) => prop_assert_eq!(expected_len, capacity, "push refused below capacity"),
                }
            } else {
                match ring.pop() {
                    Some(_) => expected_len -= 1,
                    None => prop_assert_eq!(expected_len, 0, "pop refused on non-empty ring"),
                }
            }

            prop_assert!(ring.len() <= capacity);
            prop_assert_eq!(ring.len(), expected_len);
            prop_assert_eq!(ring.is_empty(), expected_len == 0);
            prop_assert_eq!(ring.is_full(), expected_len == capacity);
        }
    }

    /// Values come out in the order they went in.
    #[test]
    fn ring_is_fifo(values in prop::collection::vec(any::<u64>(), 0..64)) {
        let ring = RingBuffer::new(64);

        for value in &values {
            prop_assert!(ring.push(*value).is_ok());
        }
        for value in &values {
            prop_assert_eq!(ring.pop(), Some(*value));
        }
        prop_assert_eq!(ring.pop(), None);
    }

    /// FIFO survives wraparound: interleave fills and drains at arbitrary
    /// chunk sizes against a model queue.
    #[test]
    fn ring_matches_model_queue_across_laps(
        chunks in prop::collection::vec(1usize..5, 1..50),
        capacity in 2usize..8,
    ) {
        let ring = RingBuffer::new(capacity);
        let mut model = std::collections::VecDeque::new();
        let mut next = 0u64;

        for (round, chunk) in chunks.into_iter().enumerate() {
            if round % 2 == 0 {
                for _ in 0..chunk {
                    match ring.push(next) {
                        Ok(()) => model.push_back(next),
                        Err(value) => prop_assert_eq!(value, next),
                    }
                    next += 1;
                }
            } else {
                for _ in 0..chunk {
                    prop_assert_eq!(ring.pop(), model.pop_front());
                }
            }
        }

        while let Some(expected) = model.pop_front() {
            prop_assert_eq!(ring.pop(), Some(expected));
        }
        prop_assert_eq!(ring.pop(), None);
    }

    /// Sent values round-trip through the channel in order.
    #[test]
    fn channel_roundtrip_is_fifo(values in prop::collection::vec(any::<u64>(), 0..32)) {
        let (sender, receiver) = channel(values.len().max(1));

        for value in &values {
            prop_assert_eq!(sender.try_send(*value), Ok(()));
        }
        for value in &values {
            prop_assert_eq!(receiver.try_receive(), Ok(*value));
        }
        prop_assert_eq!(receiver.try_receive(), Err(TryReceiveError::Empty));
    }

    /// However many times the channel is closed, the observable state is
    /// the same as after one close.
    #[test]
    fn channel_close_is_idempotent(closes in 1usize..5, pending in 0u64..4) {
        let (sender, receiver) = channel(8);
        for value in 0..pending {
            prop_assert_eq!(sender.try_send(value), Ok(()));
        }

        for _ in 0..closes {
            sender.close();
        }

        prop_assert!(sender.is_closed());
        prop_assert!(receiver.is_closed());
        for value in 0..pending {
            prop_assert_eq!(receiver.try_receive(), Ok(value));
        }
        prop_assert_eq!(receiver.try_receive(), Err(TryReceiveError::Disconnected));
    }

    /// `all_settled` resolves with every outcome, in input order, whatever
    /// the mix of successes and failures.
    #[test]
    fn all_settled_preserves_outcome_order(outcomes in prop::collection::vec(prop::bool::ANY, 0..16)) {
        let futures: Vec<Future<usize, usize>> = outcomes
            .iter()
            .enumerate()
            .map(|(index, succeed)| {
                if *succeed {
                    promise::resolved(index)
                } else {
                    promise::rejected(index)
                }
            })
            .collect();

        let expected: Vec<Result<usize, usize>> = outcomes
            .iter()
            .enumerate()
            .map(|(index, succeed)| if *succeed { Ok(index) } else { Err(index) })
            .collect();

        prop_assert_eq!(promise::all_settled(futures).get(), Ok(expected));
    }
}
