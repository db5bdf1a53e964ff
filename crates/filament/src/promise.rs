//! Single-shot future/promise pair.
//!
//! A [`Promise`] is the write end, a [`Future`] the read end of exactly one
//! `Result<T, E>`. The shared core is a mutex-free state machine:
//!
//! ```text
//!             PENDING
//!            /       \
//!   ONLY_RESULT   ONLY_CALLBACK      (whichever side arrives first)
//!            \       /
//!              DONE                  (whichever side arrives second
//!                                     invokes the callback, exactly once)
//! ```
//!
//! Blocking waiters park on a one-shot [`Event`]; callback consumers are
//! resumed synchronously on whichever thread completes the `DONE` edge.

use crate::event::Event;
use crate::invariants::debug_assert_state_transition;
use crate::lock;
use std::any::Any;
use std::cell::UnsafeCell;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const PENDING: u8 = 0;
const ONLY_CALLBACK: u8 = 1;
const ONLY_RESULT: u8 = 2;
const DONE: u8 = 3;

type Callback<T, E> = Box<dyn FnOnce(Result<T, E>) + Send>;

crate::define_error_code! {
    /// Failure of a bounded [`Future::wait`].
    pub enum WaitError("filament::promise::Future::wait") {
        Timeout = 1 => "timed out waiting for the promise to settle" [crate::error::Errc::TimedOut],
    }
}

struct Core<T, E> {
    state: AtomicU8,
    /// Claimed by the producer before it writes `result`; a second claim is
    /// a contract violation and panics instead of racing.
    result_claimed: AtomicBool,
    /// Claimed by the consumer before it writes `callback`; same rule.
    callback_claimed: AtomicBool,
    event: Event,
    result: UnsafeCell<Option<Result<T, E>>>,
    callback: UnsafeCell<Option<Callback<T, E>>>,
}

// Safety: the claim flags make each cell single-writer, and the state
// lattice orders every cross-thread read after the release store that
// published the corresponding write.
unsafe impl<T: Send, E: Send> Send for Core<T, E> {}
unsafe impl<T: Send, E: Send> Sync for Core<T, E> {}

impl<T, E> Core<T, E> {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(PENDING),
            result_claimed: AtomicBool::new(false),
            callback_claimed: AtomicBool::new(false),
            event: Event::new(),
            result: UnsafeCell::new(None),
            callback: UnsafeCell::new(None),
        }
    }

    fn has_result(&self) -> bool {
        let state = self.state.load(Ordering::Acquire);
        state == ONLY_RESULT || state == DONE
    }

    fn settle(&self, result: Result<T, E>) {
        assert!(
            !self.result_claimed.swap(true, Ordering::AcqRel),
            "promise settled twice"
        );
        // SAFETY: the claim above makes this thread the cell's only writer,
        // and no reader looks at it before observing the state store below.
        unsafe { *self.result.get() = Some(result) };

        if let Err(observed) =
            self.state
                .compare_exchange(PENDING, ONLY_RESULT, Ordering::AcqRel, Ordering::Acquire)
        {
            // The consumer won the first edge; this side completes DONE and
            // owns the trigger.
            debug_assert_state_transition!(observed, DONE, observed == ONLY_CALLBACK);
            self.state.store(DONE, Ordering::Release);
            self.event.set();
            self.trigger();
            return;
        }

        self.event.set();
    }

    fn install(&self, callback: Callback<T, E>) {
        assert!(
            !self.callback_claimed.swap(true, Ordering::AcqRel),
            "future callback installed twice"
        );
        // SAFETY: single writer per the claim above; the producer reads the
        // cell only after observing DONE, which this thread publishes below.
        unsafe { *self.callback.get() = Some(callback) };

        if let Err(observed) =
            self.state
                .compare_exchange(PENDING, ONLY_CALLBACK, Ordering::AcqRel, Ordering::Acquire)
        {
            // The result is already in place; this side completes DONE and
            // owns the trigger.
            debug_assert_state_transition!(observed, DONE, observed == ONLY_RESULT);
            self.state.store(DONE, Ordering::Release);
            self.trigger();
        }
    }

    /// Invokes the callback with the result. Called exactly once, by the
    /// thread that completed the `DONE` transition.
    fn trigger(&self) {
        // SAFETY: at DONE both cells are written and published; the unique
        // trigger right makes this thread their only remaining accessor.
        let callback = unsafe { (*self.callback.get()).take() };
        let result = unsafe { (*self.result.get()).take() };
        let (Some(callback), Some(result)) = (callback, result) else {
            unreachable!("DONE promise core is missing its callback or result");
        };
        callback(result);
    }
}

/// Write end of a single-shot result.
pub struct Promise<T, E> {
    core: Arc<Core<T, E>>,
    retrieved: AtomicBool,
}

impl<T: Send + 'static, E: Send + 'static> Promise<T, E> {
    pub fn new() -> Self {
        Self {
            core: Arc::new(Core::new()),
            retrieved: AtomicBool::new(false),
        }
    }

    /// Stores a success value, wakes blocking waiters, and — if a callback
    /// is already installed — invokes it synchronously on this thread.
    ///
    /// # Panics
    ///
    /// Panics if the promise was already resolved or rejected.
    pub fn resolve(&self, value: T) {
        self.core.settle(Ok(value));
    }

    /// Stores an error; otherwise identical to [`resolve`](Promise::resolve).
    ///
    /// # Panics
    ///
    /// Panics if the promise was already resolved or rejected.
    pub fn reject(&self, error: E) {
        self.core.settle(Err(error));
    }

    /// True once a result has been stored, regardless of callback state.
    pub fn is_fulfilled(&self) -> bool {
        self.core.has_result()
    }

    /// Returns the read end. There is exactly one.
    ///
    /// # Panics
    ///
    /// Panics on the second call.
    pub fn get_future(&self) -> Future<T, E> {
        assert!(
            !self.retrieved.swap(true, Ordering::AcqRel),
            "future already retrieved from this promise"
        );
        Future {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: Send + 'static, E: Send + 'static> Default for Promise<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Read end of a single-shot result.
///
/// Deliberately not `Clone`: a single consumer either blocks ([`wait`]
/// [`Future::wait`] / [`get`](Future::get)), polls ([`is_ready`]
/// [`Future::is_ready`] / [`result`](Future::result)), or hands the core a
/// continuation ([`set_callback`](Future::set_callback) and the monadic
/// methods, all of which consume the future).
pub struct Future<T, E> {
    core: Arc<Core<T, E>>,
}

impl<T: Send + 'static, E: Send + 'static> Future<T, E> {
    /// True once the promise has settled.
    pub fn is_ready(&self) -> bool {
        self.core.has_result()
    }

    /// Borrows the settled result, or `None` while pending.
    pub fn result(&self) -> Option<&Result<T, E>> {
        if !self.core.has_result() {
            return None;
        }
        // SAFETY: after settlement the producer never writes the cell
        // again, and the consumer-side operations that move the value out
        // (`get`, `set_callback`) consume the future, which this
        // outstanding borrow forbids.
        unsafe { (*self.core.result.get()).as_ref() }
    }

    /// Blocks the calling thread until the promise settles or `timeout`
    /// elapses (`None` waits indefinitely).
    pub fn wait(&self, timeout: Option<Duration>) -> Result<(), WaitError> {
        if self.core.has_result() {
            return Ok(());
        }
        match timeout {
            None => {
                self.core.event.wait();
                Ok(())
            }
            Some(timeout) => {
                if self.core.event.wait_timeout(timeout) {
                    Ok(())
                } else {
                    Err(WaitError::Timeout)
                }
            }
        }
    }

    /// Blocks until settled, then moves the result out.
    pub fn get(self) -> Result<T, E> {
        if !self.core.has_result() {
            self.core.event.wait();
        }
        // SAFETY: the producer published the result before the state/event
        // we just observed, and consuming `self` rules out an installed
        // callback, so the cell is still occupied and exclusively ours.
        let result = unsafe { (*self.core.result.get()).take() };
        match result {
            Some(result) => result,
            None => unreachable!("settled future holds a result"),
        }
    }

    /// Installs the one-shot completion callback.
    ///
    /// If the result is already present, `f` runs synchronously on this
    /// thread before the call returns; otherwise it will run on whichever
    /// thread settles the promise. Either way it runs exactly once.
    pub fn set_callback<F>(self, f: F)
    where
        F: FnOnce(Result<T, E>) + Send + 'static,
    {
        self.core.install(Box::new(f));
    }

    // ---------------------------------------------------------------------
    // MONADIC SURFACE — built on set_callback with an intermediate promise
    // ---------------------------------------------------------------------

    /// Maps the success value; errors pass through.
    pub fn map<U, F>(self, f: F) -> Future<U, E>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let (promise, future) = pair();
        self.set_callback(move |result| match result {
            Ok(value) => promise.resolve(f(value)),
            Err(error) => promise.reject(error),
        });
        future
    }

    /// Chains on success. The callback may return a `Result` (settles the
    /// next future directly) or another `Future` (chained). Errors skip the
    /// callback and propagate.
    pub fn then<R, F>(self, f: F) -> Future<R::Value, E>
    where
        R: Chain<E>,
        F: FnOnce(T) -> R + Send + 'static,
    {
        let (promise, future) = pair();
        self.set_callback(move |result| match result {
            Ok(value) => f(value).forward(promise),
            Err(error) => promise.reject(error),
        });
        future
    }

    /// Maps the error; success values pass through.
    pub fn map_err<F2, F>(self, f: F) -> Future<T, F2>
    where
        F2: Send + 'static,
        F: FnOnce(E) -> F2 + Send + 'static,
    {
        let (promise, future) = pair();
        self.set_callback(move |result| match result {
            Ok(value) => promise.resolve(value),
            Err(error) => promise.reject(f(error)),
        });
        future
    }

    /// Chains on error; success values skip the callback and pass through.
    pub fn or_else<R, F>(self, f: F) -> Future<T, R::Error>
    where
        R: ChainErr<T>,
        F: FnOnce(E) -> R + Send + 'static,
    {
        let (promise, future) = pair();
        self.set_callback(move |result| match result {
            Ok(value) => promise.resolve(value),
            Err(error) => f(error).forward(promise),
        });
        future
    }

    /// Runs `f` when the future settles, then forwards the result untouched.
    pub fn finally<F>(self, f: F) -> Future<T, E>
    where
        F: FnOnce() + Send + 'static,
    {
        let (promise, future) = pair();
        self.set_callback(move |result| {
            f();
            match result {
                Ok(value) => promise.resolve(value),
                Err(error) => promise.reject(error),
            }
        });
        future
    }

    /// The two-callback variant: [`then`](Future::then) composed with
    /// [`or_else`](Future::or_else).
    pub fn then_or_else<R1, R2, F1, F2>(
        self,
        on_value: F1,
        on_error: F2,
    ) -> Future<R1::Value, R2::Error>
    where
        R1: Chain<E>,
        R2: ChainErr<R1::Value>,
        F1: FnOnce(T) -> R1 + Send + 'static,
        F2: FnOnce(E) -> R2 + Send + 'static,
    {
        self.then(on_value).or_else(on_error)
    }
}

/// Values a [`Future::then`] callback may return: settle the next future
/// from a `Result`, or splice in another `Future`.
pub trait Chain<E: Send + 'static> {
    type Value: Send + 'static;
    fn forward(self, promise: Promise<Self::Value, E>);
}

impl<U: Send + 'static, E: Send + 'static> Chain<E> for Result<U, E> {
    type Value = U;

    fn forward(self, promise: Promise<U, E>) {
        match self {
            Ok(value) => promise.resolve(value),
            Err(error) => promise.reject(error),
        }
    }
}

impl<U: Send + 'static, E: Send + 'static> Chain<E> for Future<U, E> {
    type Value = U;

    fn forward(self, promise: Promise<U, E>) {
        self.set_callback(move |result| match result {
            Ok(value) => promise.resolve(value),
            Err(error) => promise.reject(error),
        });
    }
}

/// Values a [`Future::or_else`] callback may return.
pub trait ChainErr<T: Send + 'static> {
    type Error: Send + 'static;
    fn forward(self, promise: Promise<T, Self::Error>);
}

impl<T: Send + 'static, F: Send + 'static> ChainErr<T> for Result<T, F> {
    type Error = F;

    fn forward(self, promise: Promise<T, F>) {
        match self {
            Ok(value) => promise.resolve(value),
            Err(error) => promise.reject(error),
        }
    }
}

impl<T: Send + 'static, F: Send + 'static> ChainErr<T> for Future<T, F> {
    type Error = F;

    fn forward(self, promise: Promise<T, F>) {
        self.set_callback(move |result| match result {
            Ok(value) => promise.resolve(value),
            Err(error) => promise.reject(error),
        });
    }
}

// -------------------------------------------------------------------------
// FREE CONSTRUCTORS
// -------------------------------------------------------------------------

/// Creates a connected promise/future pair.
pub fn pair<T: Send + 'static, E: Send + 'static>() -> (Promise<T, E>, Future<T, E>) {
    let promise = Promise::new();
    let future = promise.get_future();
    (promise, future)
}

/// A future that is already resolved with `value`.
pub fn resolved<T: Send + 'static, E: Send + 'static>(value: T) -> Future<T, E> {
    let (promise, future) = pair();
    promise.resolve(value);
    future
}

/// A future that is already rejected with `error`.
pub fn rejected<T: Send + 'static, E: Send + 'static>(error: E) -> Future<T, E> {
    let (promise, future) = pair();
    promise.reject(error);
    future
}

/// Hands a fresh promise to `f` and returns its future; the usual way to
/// adapt a callback-style producer.
pub fn with<T, E, F>(f: F) -> Future<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
    F: FnOnce(Promise<T, E>),
{
    let (promise, future) = pair();
    f(promise);
    future
}

// -------------------------------------------------------------------------
// COMBINATORS OVER HOMOGENEOUS COLLECTIONS
// -------------------------------------------------------------------------

struct JoinContext<Out, Slots, E> {
    promise: Promise<Out, E>,
    remaining: AtomicUsize,
    rejected: AtomicBool,
    slots: Mutex<Slots>,
}

struct SettleContext<Out, Slots> {
    promise: Promise<Out, Infallible>,
    remaining: AtomicUsize,
    slots: Mutex<Slots>,
}

struct PickContext<T, E> {
    promise: Promise<T, Vec<E>>,
    remaining: AtomicUsize,
    resolved: AtomicBool,
    errors: Mutex<Vec<Option<E>>>,
}

struct RaceContext<T, E> {
    promise: Promise<T, E>,
    settled: AtomicBool,
}

/// Resolves with every value, in input order, once all inputs succeed;
/// rejects with the first error and leaves the rest to settle unobserved.
///
/// An empty input resolves immediately with an empty vector.
pub fn all<T, E, I>(futures: I) -> Future<Vec<T>, E>
where
    T: Send + 'static,
    E: Send + 'static,
    I: IntoIterator<Item = Future<T, E>>,
{
    let futures: Vec<_> = futures.into_iter().collect();
    let (promise, future) = pair();
    if futures.is_empty() {
        promise.resolve(Vec::new());
        return future;
    }

    let context = Arc::new(JoinContext {
        promise,
        remaining: AtomicUsize::new(futures.len()),
        rejected: AtomicBool::new(false),
        slots: Mutex::new((0..futures.len()).map(|_| None).collect::<Vec<Option<T>>>()),
    });

    for (index, child) in futures.into_iter().enumerate() {
        let context = Arc::clone(&context);
        child.set_callback(move |result| match result {
            Err(error) => {
                if !context.rejected.swap(true, Ordering::AcqRel) {
                    context.promise.reject(error);
                }
            }
            Ok(value) => {
                lock(&context.slots)[index] = Some(value);
                // Failures never decrement, so zero remaining means every
                // child resolved and nobody rejected.
                if context.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    let slots = std::mem::take(&mut *lock(&context.slots));
                    context.promise.resolve(slots.into_iter().flatten().collect());
                }
            }
        });
    }

    future
}

/// Always resolves, with every child's outcome in input order.
pub fn all_settled<T, E, I>(futures: I) -> Future<Vec<Result<T, E>>, Infallible>
where
    T: Send + 'static,
    E: Send + 'static,
    I: IntoIterator<Item = Future<T, E>>,
{
    let futures: Vec<_> = futures.into_iter().collect();
    let (promise, future) = pair();
    if futures.is_empty() {
        promise.resolve(Vec::new());
        return future;
    }

    let context = Arc::new(SettleContext {
        promise,
        remaining: AtomicUsize::new(futures.len()),
        slots: Mutex::new(
            (0..futures.len())
                .map(|_| None)
                .collect::<Vec<Option<Result<T, E>>>>(),
        ),
    });

    for (index, child) in futures.into_iter().enumerate() {
        let context = Arc::clone(&context);
        child.set_callback(move |result| {
            lock(&context.slots)[index] = Some(result);
            if context.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                let slots = std::mem::take(&mut *lock(&context.slots));
                context.promise.resolve(slots.into_iter().flatten().collect());
            }
        });
    }

    future
}

/// Resolves with the first value; rejects with every error, in input order,
/// only when all inputs fail.
///
/// An empty input rejects immediately with an empty error vector.
pub fn any<T, E, I>(futures: I) -> Future<T, Vec<E>>
where
    T: Send + 'static,
    E: Send + 'static,
    I: IntoIterator<Item = Future<T, E>>,
{
    let futures: Vec<_> = futures.into_iter().collect();
    let (promise, future) = pair();
    if futures.is_empty() {
        promise.reject(Vec::new());
        return future;
    }

    let context = Arc::new(PickContext {
        promise,
        remaining: AtomicUsize::new(futures.len()),
        resolved: AtomicBool::new(false),
        errors: Mutex::new((0..futures.len()).map(|_| None).collect()),
    });

    for (index, child) in futures.into_iter().enumerate() {
        let context = Arc::clone(&context);
        child.set_callback(move |result| match result {
            Ok(value) => {
                if !context.resolved.swap(true, Ordering::AcqRel) {
                    context.promise.resolve(value);
                }
            }
            Err(error) => {
                lock(&context.errors)[index] = Some(error);
                // Successes never decrement, so zero remaining means every
                // child failed.
                if context.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    let errors = std::mem::take(&mut *lock(&context.errors));
                    context.promise.reject(errors.into_iter().flatten().collect());
                }
            }
        });
    }

    future
}

/// Settles with the first result to arrive, value or error, and ignores the
/// rest.
///
/// A race over an empty input never settles.
pub fn race<T, E, I>(futures: I) -> Future<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
    I: IntoIterator<Item = Future<T, E>>,
{
    let (promise, future) = pair();
    let context = Arc::new(RaceContext {
        promise,
        settled: AtomicBool::new(false),
    });

    for child in futures {
        let context = Arc::clone(&context);
        child.set_callback(move |result| {
            if context.settled.swap(true, Ordering::AcqRel) {
                return;
            }
            match result {
                Ok(value) => context.promise.resolve(value),
                Err(error) => context.promise.reject(error),
            }
        });
    }

    future
}

// -------------------------------------------------------------------------
// COMBINATORS OVER HETEROGENEOUS TUPLES
// -------------------------------------------------------------------------

/// Opaque carrier for the winner of a heterogeneous [`FutureSet::any`] /
/// [`FutureSet::race`]; downcast it at the call site, where the set of
/// possible types is known.
pub type AnyValue = Box<dyn Any + Send>;

/// Combinators over a tuple of futures with distinct value types and a
/// common error type. Implemented for tuples of arity 1 through 6; use the
/// iterator-based functions for homogeneous collections (they keep the
/// typed value where `any`/`race` here must fall back to [`AnyValue`]).
pub trait FutureSet {
    type All;
    type AllSettled;
    type Any;
    type Race;

    /// Tuple of all values, or the first error.
    fn all(self) -> Self::All;
    /// Tuple of every outcome; never rejects.
    fn all_settled(self) -> Self::AllSettled;
    /// First value as an [`AnyValue`], or every error.
    fn any(self) -> Self::Any;
    /// First settlement as an [`AnyValue`] or the error.
    fn race(self) -> Self::Race;
}

pub(crate) trait TupleAssemble {
    type Values;
    fn assemble(self) -> Self::Values;
}

macro_rules! impl_future_set {
    ($(($T:ident, $idx:tt)),+) => {
        impl<$($T),+> TupleAssemble for ($(Option<$T>,)+) {
            type Values = ($($T,)+);

            fn assemble(self) -> Self::Values {
                (
                    $(
                        match self.$idx {
                            Some(value) => value,
                            None => unreachable!("combinator slot left unfilled"),
                        },
                    )+
                )
            }
        }

        impl<E: Send + 'static, $($T: Send + 'static),+> FutureSet for ($(Future<$T, E>,)+) {
            type All = Future<($($T,)+), E>;
            type AllSettled = Future<($(Result<$T, E>,)+), Infallible>;
            type Any = Future<AnyValue, Vec<E>>;
            type Race = Future<AnyValue, E>;

            fn all(self) -> Self::All {
                let (promise, future) = pair();
                let count = [$($idx),+].len();
                let context = Arc::new(JoinContext {
                    promise,
                    remaining: AtomicUsize::new(count),
                    rejected: AtomicBool::new(false),
                    slots: Mutex::new(<($(Option<$T>,)+)>::default()),
                });

                $(
                    {
                        let context = Arc::clone(&context);
                        self.$idx.set_callback(move |result| match result {
                            Err(error) => {
                                if !context.rejected.swap(true, Ordering::AcqRel) {
                                    context.promise.reject(error);
                                }
                            }
                            Ok(value) => {
                                lock(&context.slots).$idx = Some(value);
                                if context.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                                    let slots = std::mem::take(&mut *lock(&context.slots));
                                    context.promise.resolve(slots.assemble());
                                }
                            }
                        });
                    }
                )+

                future
            }

            fn all_settled(self) -> Self::AllSettled {
                let (promise, future) = pair();
                let count = [$($idx),+].len();
                let context = Arc::new(SettleContext {
                    promise,
                    remaining: AtomicUsize::new(count),
                    slots: Mutex::new(<($(Option<Result<$T, E>>,)+)>::default()),
                });

                $(
                    {
                        let context = Arc::clone(&context);
                        self.$idx.set_callback(move |result| {
                            lock(&context.slots).$idx = Some(result);
                            if context.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                                let slots = std::mem::take(&mut *lock(&context.slots));
                                context.promise.resolve(slots.assemble());
                            }
                        });
                    }
                )+

                future
            }

            fn any(self) -> Self::Any {
                let (promise, future) = pair();
                let count = [$($idx),+].len();
                let context = Arc::new(PickContext {
                    promise,
                    remaining: AtomicUsize::new(count),
                    resolved: AtomicBool::new(false),
                    errors: Mutex::new((0..count).map(|_| None).collect()),
                });

                $(
                    {
                        let context = Arc::clone(&context);
                        self.$idx.set_callback(move |result| match result {
                            Ok(value) => {
                                if !context.resolved.swap(true, Ordering::AcqRel) {
                                    context.promise.resolve(Box::new(value) as AnyValue);
                                }
                            }
                            Err(error) => {
                                lock(&context.errors)[$idx] = Some(error);
                                if context.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                                    let errors = std::mem::take(&mut *lock(&context.errors));
                                    context
                                        .promise
                                        .reject(errors.into_iter().flatten().collect());
                                }
                            }
                        });
                    }
                )+

                future
            }

            fn race(self) -> Self::Race {
                let (promise, future) = pair();
                let context = Arc::new(RaceContext {
                    promise,
                    settled: AtomicBool::new(false),
                });

                $(
                    {
                        let context = Arc::clone(&context);
                        self.$idx.set_callback(move |result| {
                            if context.settled.swap(true, Ordering::AcqRel) {
                                return;
                            }
                            match result {
                                Ok(value) => context.promise.resolve(Box::new(value) as AnyValue),
                                Err(error) => context.promise.reject(error),
                            }
                        });
                    }
                )+

                future
            }
        }
    };
}

impl_future_set!((T0, 0));
impl_future_set!((T0, 0), (T1, 1));
impl_future_set!((T0, 0), (T1, 1), (T2, 2));
impl_future_set!((T0, 0), (T1, 1), (T2, 2), (T3, 3));
impl_future_set!((T0, 0), (T1, 1), (T2, 2), (T3, 3), (T4, 4));
impl_future_set!((T0, 0), (T1, 1), (T2, 2), (T3, 3), (T4, 4), (T5, 5));

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Condition;
    use crate::error::Errc;
    use std::sync::atomic::AtomicU32;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum TestError {
        Io,
        Parse,
    }

    #[test]
    fn resolve_then_get() {
        let (promise, future) = pair::<i32, TestError>();
        promise.resolve(7);
        assert!(promise.is_fulfilled());
        assert_eq!(future.get(), Ok(7));
    }

    #[test]
    fn callback_after_resolve_fires_synchronously_once() {
        let (promise, future) = pair::<i32, TestError>();
        promise.resolve(42);

        let seen = Arc::new(AtomicU32::new(0));
        let recorded = Arc::new(AtomicU32::new(0));
        {
            let seen = Arc::clone(&seen);
            let recorded = Arc::clone(&recorded);
            future.set_callback(move |result| {
                seen.fetch_add(1, Ordering::SeqCst);
                recorded.store(result.expect("resolved") as u32, Ordering::SeqCst);
            });
        }

        // set_callback returned, so the callback already ran on this thread.
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(recorded.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn callback_before_resolve_fires_on_settlement() {
        let (promise, future) = pair::<i32, TestError>();
        let seen = Arc::new(AtomicU32::new(0));
        {
            let seen = Arc::clone(&seen);
            future.set_callback(move |result| {
                assert_eq!(result, Ok(5));
                seen.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(seen.load(Ordering::SeqCst), 0);
        promise.resolve(5);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn result_borrows_without_consuming() {
        let (promise, future) = pair::<i32, TestError>();
        assert!(!future.is_ready());
        assert!(future.result().is_none());

        promise.reject(TestError::Io);
        assert!(future.is_ready());
        assert_eq!(future.result(), Some(&Err(TestError::Io)));
        // Still consumable afterwards.
        assert_eq!(future.get(), Err(TestError::Io));
    }

    #[test]
    fn wait_times_out_then_classifies() {
        let (_promise, future) = pair::<i32, TestError>();
        let error = future
            .wait(Some(Duration::from_millis(5)))
            .expect_err("nothing settles this promise");
        assert_eq!(error, WaitError::Timeout);
        assert_eq!(error, Condition::from(Errc::TimedOut));
    }

    #[test]
    #[should_panic(expected = "promise settled twice")]
    fn double_settle_panics() {
        let (promise, _future) = pair::<i32, TestError>();
        promise.resolve(1);
        promise.reject(TestError::Io);
    }

    #[test]
    #[should_panic(expected = "future already retrieved")]
    fn second_get_future_panics() {
        let promise = Promise::<i32, TestError>::new();
        let _first = promise.get_future();
        let _second = promise.get_future();
    }

    #[test]
    fn map_and_map_err_chain() {
        let future = resolved::<i32, TestError>(10)
            .map(|v| v * 2)
            .map_err(|_| TestError::Parse);
        assert_eq!(future.get(), Ok(20));

        let future = rejected::<i32, TestError>(TestError::Io).map(|v| v * 2);
        assert_eq!(future.get(), Err(TestError::Io));
    }

    #[test]
    fn then_accepts_results_and_futures() {
        let future = resolved::<i32, TestError>(3).then(|v| Ok(v + 1));
        assert_eq!(future.get(), Ok(4));

        let future = resolved::<i32, TestError>(3).then(|v| resolved::<i32, TestError>(v * 10));
        assert_eq!(future.get(), Ok(30));

        let future =
            resolved::<i32, TestError>(3).then(|_| Err::<i32, TestError>(TestError::Parse));
        assert_eq!(future.get(), Err(TestError::Parse));
    }

    #[test]
    fn or_else_recovers_and_rethrows() {
        let future = rejected::<i32, TestError>(TestError::Io).or_else(|_| Ok::<i32, TestError>(0));
        assert_eq!(future.get(), Ok(0));

        let future = rejected::<i32, TestError>(TestError::Io)
            .or_else(|_| rejected::<i32, TestError>(TestError::Parse));
        assert_eq!(future.get(), Err(TestError::Parse));

        // Success skips the handler.
        let future = resolved::<i32, TestError>(9).or_else(|_| Ok::<i32, TestError>(0));
        assert_eq!(future.get(), Ok(9));
    }

    #[test]
    fn finally_runs_on_both_paths() {
        let ran = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&ran);
        let future = resolved::<i32, TestError>(1).finally(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(future.get(), Ok(1));

        let counter = Arc::clone(&ran);
        let future = rejected::<i32, TestError>(TestError::Io).finally(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(future.get(), Err(TestError::Io));

        assert_eq!(ran.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn then_or_else_dispatches_by_outcome() {
        let future = resolved::<i32, TestError>(2)
            .then_or_else(|v| Ok(v * 5), |_| Ok::<i32, TestError>(-1));
        assert_eq!(future.get(), Ok(10));

        let future = rejected::<i32, TestError>(TestError::Io)
            .then_or_else(|v| Ok(v * 5), |_| Ok::<i32, TestError>(-1));
        assert_eq!(future.get(), Ok(-1));
    }

    #[test]
    fn all_resolves_in_input_order() {
        let (p1, f1) = pair::<i32, TestError>();
        let (p2, f2) = pair::<i32, TestError>();
        let (p3, f3) = pair::<i32, TestError>();

        let combined = all(vec![f1, f2, f3]);
        // Settle out of order.
        p3.resolve(3);
        p1.resolve(1);
        assert!(!combined.is_ready());
        p2.resolve(2);

        assert_eq!(combined.get(), Ok(vec![1, 2, 3]));
    }

    #[test]
    fn all_rejects_with_first_error() {
        let (p1, f1) = pair::<i32, TestError>();
        let (p2, f2) = pair::<i32, TestError>();

        let combined = all(vec![f1, f2]);
        p2.reject(TestError::Io);
        assert_eq!(combined.result(), Some(&Err(TestError::Io)));
        // The straggler settles unobserved.
        p1.resolve(1);
    }

    #[test]
    fn all_of_nothing_resolves_empty() {
        let combined = all(Vec::<Future<i32, TestError>>::new());
        assert_eq!(combined.get(), Ok(Vec::new()));
    }

    #[test]
    fn all_settled_never_rejects() {
        let (p1, f1) = pair::<i32, TestError>();
        let (p2, f2) = pair::<i32, TestError>();

        let combined = all_settled(vec![f1, f2]);
        p1.resolve(1);
        p2.reject(TestError::Parse);

        assert_eq!(combined.get(), Ok(vec![Ok(1), Err(TestError::Parse)]));
    }

    #[test]
    fn any_takes_first_value() {
        let (p1, f1) = pair::<i32, TestError>();
        let (p2, f2) = pair::<i32, TestError>();

        let combined = any(vec![f1, f2]);
        p1.reject(TestError::Io);
        assert!(!combined.is_ready());
        p2.resolve(22);

        assert_eq!(combined.get(), Ok(22));
    }

    #[test]
    fn any_collects_all_errors() {
        let (p1, f1) = pair::<i32, TestError>();
        let (p2, f2) = pair::<i32, TestError>();

        let combined = any(vec![f1, f2]);
        p2.reject(TestError::Parse);
        p1.reject(TestError::Io);

        assert_eq!(combined.get(), Err(vec![TestError::Io, TestError::Parse]));
    }

    #[test]
    fn race_takes_first_settlement() {
        let (p1, f1) = pair::<i32, TestError>();
        let (p2, f2) = pair::<i32, TestError>();

        let combined = race(vec![f1, f2]);
        p2.reject(TestError::Io);
        p1.resolve(1);

        assert_eq!(combined.get(), Err(TestError::Io));
    }

    #[test]
    fn tuple_all_preserves_heterogeneous_types() {
        let f1 = resolved::<i32, TestError>(1);
        let f2 = resolved::<String, TestError>("two".to_string());
        let f3 = resolved::<(), TestError>(());

        let combined = (f1, f2, f3).all();
        assert_eq!(combined.get(), Ok((1, "two".to_string(), ())));
    }

    #[test]
    fn tuple_all_short_circuits_on_error() {
        let (p1, f1) = pair::<i32, TestError>();
        let f2 = rejected::<String, TestError>(TestError::Io);

        let combined = (f1, f2).all();
        assert_eq!(combined.result(), Some(&Err(TestError::Io)));
        p1.resolve(1);
    }

    #[test]
    fn tuple_all_settled_keeps_every_outcome() {
        let f1 = resolved::<i32, TestError>(1);
        let f2 = rejected::<String, TestError>(TestError::Parse);

        let combined = (f1, f2).all_settled();
        assert_eq!(combined.get(), Ok((Ok(1), Err(TestError::Parse))));
    }

    #[test]
    fn tuple_any_yields_downcastable_winner() {
        let (p1, f1) = pair::<i32, TestError>();
        let f2 = rejected::<String, TestError>(TestError::Io);

        let combined = (f1, f2).any();
        p1.resolve(31);

        let winner = combined.get().expect("one child resolved");
        assert_eq!(winner.downcast::<i32>().ok().map(|v| *v), Some(31));
    }

    #[test]
    fn tuple_race_settles_with_first() {
        let (p1, f1) = pair::<i32, TestError>();
        let f2 = resolved::<String, TestError>("fast".to_string());

        let combined = (f1, f2).race();
        let winner = combined.get().expect("second child resolved first");
        assert_eq!(
            winner.downcast::<String>().ok().map(|v| *v),
            Some("fast".to_string())
        );
        p1.resolve(1);
    }
}
