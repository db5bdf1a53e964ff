use crate::invariants::{debug_assert_bounded_len, debug_assert_slot_transition};
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use crossbeam_utils::{Backoff, CachePadded};

// =============================================================================
// SYNCHRONIZATION STRATEGY
// =============================================================================
//
// Multi-producer/multi-consumer over a fixed slot array, without locks:
//
// ## Counters
//
// `head` (next index to consume) and `tail` (next index to produce) advance
// by compare-exchange modulo `M`, the largest multiple of the slot count `n`
// not exceeding `usize::MAX`. Because `M % n == 0`, `counter % n` keeps
// addressing the same slot sequence after the counter wraps.
//
// A successful CAS on `tail` (resp. `head`) hands the winning producer
// (consumer) a unique index; producers never contend with other producers
// for a slot, and likewise for consumers.
//
// ## Per-slot states
//
// Each slot carries its own `AtomicU8` cycling strictly
//
//     IDLE -> RESERVING -> VALID -> CONSUMING -> IDLE
//
// The slot state serializes the *payload*: a producer that won an index may
// still observe the previous consumer mid-`CONSUMING` on that slot after a
// counter lap, so it spins `IDLE -> RESERVING` before touching the cell.
// The `RESERVING -> VALID` store is release, so a consumer that acquires
// `VALID` observes the payload write; `CONSUMING -> IDLE` is release for the
// symmetric reason.
//
// ## Queries
//
// `len`/`is_empty`/`is_full` read the two counters with acquire ordering and
// may be stale by one in-flight operation; they are heuristics, not
// linearizable snapshots.
// =============================================================================

const IDLE: u8 = 0;
const RESERVING: u8 = 1;
const VALID: u8 = 2;
const CONSUMING: u8 = 3;

/// Lock-free bounded MPMC ring buffer.
///
/// The interface is a four-call protocol — [`reserve`](RingBuffer::reserve),
/// [`commit`](RingBuffer::commit), [`acquire`](RingBuffer::acquire),
/// [`release`](RingBuffer::release) — rather than plain enqueue/dequeue, so
/// producers and consumers can construct and consume payloads in place and
/// skip a copy for large or move-only types. [`push`](RingBuffer::push) and
/// [`pop`](RingBuffer::pop) fuse the protocol for the common case.
///
/// Neither side ever blocks: a full ring fails `reserve`, an empty ring
/// fails `acquire`. Waiting belongs to the layer above (see
/// [`channel`](crate::channel)).
pub struct RingBuffer<T> {
    /// Next index to consume.
    head: CachePadded<AtomicUsize>,
    /// Next index to produce.
    tail: CachePadded<AtomicUsize>,
    /// Per-slot state machines.
    states: Box<[AtomicU8]>,
    /// Payload cells, initialized exactly while their state is `VALID`
    /// (or mid-write in `RESERVING` / mid-read in `CONSUMING`).
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    /// Largest multiple of `slots.len()` representable in `usize`.
    modulo: usize,
    /// User-visible capacity; one slot is kept vacant by the fullness rule.
    capacity: usize,
}

// Safety: the slot protocol gives whichever thread holds RESERVING/CONSUMING
// exclusive access to the payload cell, so sharing the ring only requires
// the payloads themselves to be sendable.
unsafe impl<T: Send> Send for RingBuffer<T> {}
unsafe impl<T: Send> Sync for RingBuffer<T> {}

impl<T> RingBuffer<T> {
    /// Creates a ring that holds up to `capacity` elements.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");

        // One extra slot keeps `(tail + 1) % n == head % n` distinguishable
        // from empty while still admitting `capacity` elements.
        let n = capacity + 1;
        let states = (0..n).map(|_| AtomicU8::new(IDLE)).collect();
        let slots = (0..n)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            states,
            slots,
            modulo: usize::MAX - (usize::MAX % n),
            capacity,
        }
    }

    #[inline]
    fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Maximum number of elements the ring holds.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of elements; stale by at most one operation.
    #[inline]
    pub fn len(&self) -> usize {
        let n = self.slot_count();
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        let len = (tail % n + n - head % n) % n;
        debug_assert_bounded_len!(len, self.capacity);
        len
    }

    /// True when no element is available; stale by at most one operation.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    /// True when no slot is available; stale by at most one operation.
    #[inline]
    pub fn is_full(&self) -> bool {
        let n = self.slot_count();
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        (tail + 1) % n == head % n
    }

    // ---------------------------------------------------------------------
    // PRODUCER PROTOCOL
    // ---------------------------------------------------------------------

    /// Claims a slot for writing. Returns `None` when the ring is full.
    ///
    /// The returned index must be written with [`write`](RingBuffer::write)
    /// and then published with [`commit`](RingBuffer::commit); until then the
    /// slot is invisible to consumers, and abandoning it stalls whichever
    /// consumer eventually claims that index.
    pub fn reserve(&self) -> Option<usize> {
        let n = self.slot_count();
        let mut index = self.tail.load(Ordering::Acquire);

        loop {
            if self.is_full() {
                return None;
            }
            match self.tail.compare_exchange_weak(
                index,
                (index + 1) % self.modulo,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => index = actual,
            }
        }

        let slot = index % n;

        // The previous consumer of this slot (one lap behind) may still be
        // releasing it; it holds the slot for only the instructions between
        // its counter CAS and its state store, so back off lightly until the
        // slot returns to IDLE.
        let backoff = Backoff::new();
        while self.states[slot]
            .compare_exchange_weak(IDLE, RESERVING, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            backoff.snooze();
        }

        Some(slot)
    }

    /// Writes the payload of a reserved slot.
    ///
    /// # Safety
    ///
    /// `index` must have been returned by [`reserve`](RingBuffer::reserve) on
    /// this ring and not yet committed; the caller is the sole accessor of
    /// the cell while the slot is `RESERVING`.
    pub unsafe fn write(&self, index: usize, value: T) {
        // SAFETY: per the contract above the cell is vacant and exclusively
        // owned by the caller.
        unsafe { (*self.slots[index].get()).write(value) };
    }

    /// Publishes a written slot to consumers (`RESERVING -> VALID`).
    pub fn commit(&self, index: usize) {
        let observed = self.states[index].swap(VALID, Ordering::Release);
        debug_assert_slot_transition!(index, observed, RESERVING, VALID);
    }

    // ---------------------------------------------------------------------
    // CONSUMER PROTOCOL
    // ---------------------------------------------------------------------

    /// Claims a slot for reading. Returns `None` when the ring is empty.
    ///
    /// The returned index must be read with [`read`](RingBuffer::read) and
    /// then returned to the pool with [`release`](RingBuffer::release).
    pub fn acquire(&self) -> Option<usize> {
        let n = self.slot_count();
        let mut index = self.head.load(Ordering::Acquire);

        loop {
            if self.is_empty() {
                return None;
            }
            match self.head.compare_exchange_weak(
                index,
                (index + 1) % self.modulo,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => index = actual,
            }
        }

        let slot = index % n;

        // The producer that won this index may still be writing; wait for
        // its commit.
        let backoff = Backoff::new();
        while self.states[slot]
            .compare_exchange_weak(VALID, CONSUMING, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            backoff.snooze();
        }

        Some(slot)
    }

    /// Moves the payload out of an acquired slot.
    ///
    /// # Safety
    ///
    /// `index` must have been returned by [`acquire`](RingBuffer::acquire) on
    /// this ring and not yet released; the caller is the sole accessor of
    /// the cell while the slot is `CONSUMING`, and must call this exactly
    /// once per acquisition.
    pub unsafe fn read(&self, index: usize) -> T {
        // SAFETY: the slot was published via commit's release store, which
        // our acquire on VALID synchronized with; the cell is initialized
        // and exclusively owned by the caller.
        unsafe { (*self.slots[index].get()).assume_init_read() }
    }

    /// Returns a consumed slot to the pool (`CONSUMING -> IDLE`).
    pub fn release(&self, index: usize) {
        let observed = self.states[index].swap(IDLE, Ordering::Release);
        debug_assert_slot_transition!(index, observed, CONSUMING, IDLE);
    }

    // ---------------------------------------------------------------------
    // FUSED CONVENIENCES
    // ---------------------------------------------------------------------

    /// Reserves, writes, and commits in one call.
    ///
    /// Hands the value back when the ring is full, so callers can retry
    /// without cloning.
    pub fn push(&self, value: T) -> Result<(), T> {
        let Some(index) = self.reserve() else {
            return Err(value);
        };
        // SAFETY: `reserve` granted exclusive write access to `index`.
        unsafe { self.write(index, value) };
        self.commit(index);
        Ok(())
    }

    /// Acquires, reads, and releases in one call.
    pub fn pop(&self) -> Option<T> {
        let index = self.acquire()?;
        // SAFETY: `acquire` granted exclusive read access to `index`.
        let value = unsafe { self.read(index) };
        self.release(index);
        Some(value)
    }
}

impl<T> Drop for RingBuffer<T> {
    fn drop(&mut self) {
        // Committed-but-unconsumed payloads still own resources.
        for (index, state) in self.states.iter_mut().enumerate() {
            if *state.get_mut() == VALID {
                // SAFETY: VALID slots hold an initialized payload and we
                // have exclusive access through &mut self.
                unsafe {
                    self.slots[index].get_mut().assume_init_drop();
                }
            }
        }
    }
}
