//! Debug assertion macros for the crate's state-machine invariants.
//!
//! Active only in debug builds, so release builds pay nothing. Each macro
//! names the invariant it checks so a violation message points straight at
//! the broken protocol step.

/// Assert that a ring slot observed the state a transition expects.
///
/// Invariant: slot states cycle strictly
/// `IDLE -> RESERVING -> VALID -> CONSUMING -> IDLE`.
macro_rules! debug_assert_slot_transition {
    ($slot:expr, $observed:expr, $expected:expr, $next:expr) => {
        debug_assert!(
            $observed == $expected,
            "slot {} transition violated: observed state {} but {} -> {} requires {}",
            $slot,
            $observed,
            $expected,
            $next,
            $expected
        )
    };
}

/// Assert that the ring never holds more items than its capacity.
///
/// Invariant: `0 <= len <= capacity`.
macro_rules! debug_assert_bounded_len {
    ($len:expr, $capacity:expr) => {
        debug_assert!(
            $len <= $capacity,
            "bounded length violated: len {} exceeds capacity {}",
            $len,
            $capacity
        )
    };
}

/// Assert that a promise core moved along a legal edge of its lattice.
///
/// Invariant: `PENDING -> ONLY_RESULT | ONLY_CALLBACK`, and either of those
/// only to `DONE`.
macro_rules! debug_assert_state_transition {
    ($from:expr, $to:expr, $ok:expr) => {
        debug_assert!(
            $ok,
            "promise state lattice violated: no edge from {} to {}",
            $from,
            $to
        )
    };
}

/// Assert that a channel role's handle counter was positive before a drop.
macro_rules! debug_assert_counter_nonzero {
    ($role:expr, $previous:expr) => {
        debug_assert!(
            $previous > 0,
            "handle counter underflow for channel role {}",
            $role
        )
    };
}

pub(crate) use debug_assert_bounded_len;
pub(crate) use debug_assert_counter_nonzero;
pub(crate) use debug_assert_slot_transition;
pub(crate) use debug_assert_state_transition;
