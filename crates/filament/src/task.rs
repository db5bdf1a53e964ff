//! Stackless tasks over the promise layer.
//!
//! A [`Task`] wraps an `async` body and drives it *inline*: there is no
//! executor, no queue, no thread pool. The body runs on the constructing
//! thread until its first suspension; afterwards, whichever thread settles
//! the awaited future resumes it via the future's callback. Thread-safety
//! of the promise core is what makes that cross-thread resumption sound.
//!
//! Suspension points go through a [`TaskContext`] handle, which keeps the
//! task's [frame](TaskContext) bookkeeping current: the chain of frames —
//! one per nested await — carries the cancellation marks, the leaf cancel
//! thunk, and the `#[track_caller]` source locations that
//! [`Task::traceback`] reports.

use crate::error::Code;
use crate::lock;
use crate::promise::{self, AnyValue, Future, FutureSet, Promise};
use std::convert::Infallible;
use std::future::Future as RustFuture;
use std::panic::Location;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Wake, Waker};

crate::define_error_code! {
    /// Failure of [`Task::cancel`].
    pub enum CancelError("filament::task::Task::cancel") {
        NotSupported = 1 => "cancellation is not supported at the current suspension point" [crate::error::Errc::NotSupported],
    }
}

/// Callable installed at a suspension point. Invoked (at most once) by
/// [`Task::cancel`]; it must settle the awaited future, conventionally with
/// an "operation canceled" error.
pub type CancelFn = Box<dyn FnOnce() -> Result<(), Code> + Send>;

/// A future paired with the thunk that settles it early on cancellation.
pub struct Cancellable<T, E> {
    pub future: Future<T, E>,
    pub cancel: CancelFn,
}

impl<T, E> Cancellable<T, E> {
    pub fn new<F>(future: Future<T, E>, cancel: F) -> Self
    where
        F: FnOnce() -> Result<(), Code> + Send + 'static,
    {
        Self {
            future,
            cancel: Box::new(cancel),
        }
    }
}

/// One node in a task's chain of nested suspension points.
///
/// The task owns the head frame; each `ctx.task(..)` await links the inner
/// task's head as `next`. Parent-to-child edges are strong and there is no
/// back edge, so the chain cannot cycle.
#[derive(Default)]
struct Frame {
    cancelled: AtomicBool,
    links: Mutex<FrameLinks>,
}

#[derive(Default)]
struct FrameLinks {
    next: Option<Arc<Frame>>,
    location: Option<&'static Location<'static>>,
    cancel: Option<CancelFn>,
}

impl Frame {
    fn begin_await(
        &self,
        next: Option<Arc<Frame>>,
        location: &'static Location<'static>,
        cancel: Option<CancelFn>,
    ) {
        let mut links = lock(&self.links);
        links.next = next;
        links.location = Some(location);
        links.cancel = cancel;
    }

    fn clear(&self) {
        let mut links = lock(&self.links);
        links.next = None;
        links.location = None;
        links.cancel = None;
    }
}

const IDLE: u8 = 0;
const POLLING: u8 = 1;
const REPOLL: u8 = 2;

struct Driver<T, E> {
    frame: Arc<Frame>,
    /// IDLE / POLLING / REPOLL. A wake that lands mid-poll records REPOLL
    /// instead of re-entering, so synchronous callback delivery (a future
    /// that settles during `set_callback`) cannot deadlock on `body`.
    poll_state: AtomicU8,
    body: Mutex<Option<Pin<Box<dyn RustFuture<Output = Result<T, E>> + Send>>>>,
    promise: Promise<T, E>,
}

struct DriverWaker<T, E>(Arc<Driver<T, E>>);

impl<T: Send + 'static, E: Send + 'static> Wake for DriverWaker<T, E> {
    fn wake(self: Arc<Self>) {
        Driver::drive(&self.0);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        Driver::drive(&self.0);
    }
}

impl<T: Send + 'static, E: Send + 'static> Driver<T, E> {
    fn drive(this: &Arc<Self>) {
        if this
            .poll_state
            .compare_exchange(IDLE, POLLING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // A poll is in flight somewhere; ask it for one more round.
            let _ = this.poll_state.compare_exchange(
                POLLING,
                REPOLL,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            return;
        }

        loop {
            let completed = {
                let mut body = lock(&this.body);
                let Some(future) = body.as_mut() else {
                    // Finished earlier; a late wake has nothing to do.
                    this.poll_state.store(IDLE, Ordering::Release);
                    return;
                };
                let waker = Waker::from(Arc::new(DriverWaker(Arc::clone(this))));
                let mut cx = Context::from_waker(&waker);
                match future.as_mut().poll(&mut cx) {
                    Poll::Ready(result) => {
                        *body = None;
                        Some(result)
                    }
                    Poll::Pending => None,
                }
            };

            match completed {
                Some(result) => {
                    // Tracebacks are empty once the task is done.
                    this.frame.clear();
                    this.poll_state.store(IDLE, Ordering::Release);
                    match result {
                        Ok(value) => this.promise.resolve(value),
                        Err(error) => this.promise.reject(error),
                    }
                    return;
                }
                None => {
                    if this
                        .poll_state
                        .compare_exchange(POLLING, IDLE, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return;
                    }
                    // A wake arrived mid-poll; retake the claim and loop.
                    this.poll_state.store(POLLING, Ordering::Release);
                }
            }
        }
    }
}

/// Handle to a running (or finished) task: completion, cancellation, and
/// traceback.
pub struct Task<T, E> {
    driver: Arc<Driver<T, E>>,
}

impl<T: Send + 'static, E: Send + 'static> Task<T, E> {
    /// Starts a task. The body receives the [`TaskContext`] it must await
    /// through, and runs inline until its first suspension.
    pub fn new<F, Fut>(body: F) -> Self
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: RustFuture<Output = Result<T, E>> + Send + 'static,
    {
        let frame = Arc::new(Frame::default());
        let future = body(TaskContext {
            frame: Arc::clone(&frame),
        });
        let driver = Arc::new(Driver {
            frame,
            poll_state: AtomicU8::new(IDLE),
            body: Mutex::new(Some(Box::pin(future))),
            promise: Promise::new(),
        });
        Driver::drive(&driver);
        Task { driver }
    }

    /// A task that is already settled with `result`.
    pub fn ready(result: Result<T, E>) -> Self {
        let driver = Arc::new(Driver {
            frame: Arc::new(Frame::default()),
            poll_state: AtomicU8::new(IDLE),
            body: Mutex::new(None),
            promise: Promise::new(),
        });
        match result {
            Ok(value) => driver.promise.resolve(value),
            Err(error) => driver.promise.reject(error),
        }
        Task { driver }
    }

    /// Marks every frame in the chain cancelled, then fires the leaf's
    /// cancel thunk (once; it is cleared on use).
    ///
    /// Fails with [`CancelError::NotSupported`] when the current leaf has no
    /// thunk — the chain stays marked, so a body polling
    /// [`TaskContext::cancelled`] can still short-circuit at its next
    /// suspension point. Never blocks.
    pub fn cancel(&self) -> Result<(), Code> {
        let mut frame = Arc::clone(&self.driver.frame);
        frame.cancelled.store(true, Ordering::Release);

        loop {
            let next = lock(&frame.links).next.clone();
            match next {
                Some(inner) => {
                    inner.cancelled.store(true, Ordering::Release);
                    frame = inner;
                }
                None => break,
            }
        }

        let thunk = lock(&frame.links).cancel.take();
        match thunk {
            Some(thunk) => thunk(),
            None => Err(CancelError::NotSupported.into()),
        }
    }

    /// True once the task's promise has settled.
    pub fn done(&self) -> bool {
        self.driver.promise.is_fulfilled()
    }

    /// True once [`cancel`](Task::cancel) has marked the task.
    pub fn cancelled(&self) -> bool {
        self.driver.frame.cancelled.load(Ordering::Acquire)
    }

    /// The future for the task's eventual result. There is exactly one.
    ///
    /// # Panics
    ///
    /// Panics on the second call.
    pub fn future(&self) -> Future<T, E> {
        self.driver.promise.get_future()
    }

    /// Call sites of the active awaits, outermost first. Empty once the
    /// task is done.
    pub fn traceback(&self) -> Vec<&'static Location<'static>> {
        let mut trace = Vec::new();
        let mut frame = Arc::clone(&self.driver.frame);
        loop {
            let links = lock(&frame.links);
            let Some(location) = links.location else {
                break;
            };
            trace.push(location);
            let next = links.next.clone();
            drop(links);
            match next {
                Some(inner) => frame = inner,
                None => break,
            }
        }
        trace
    }

    // ---------------------------------------------------------------------
    // MONADIC SURFACE — mirrors the future's, but stays in task space so
    // cancellation keeps flowing through the frame chain.
    // ---------------------------------------------------------------------

    /// Chains on success; the callback may return a `Result` or another
    /// `Task` (which is awaited). Errors skip the callback and propagate.
    pub fn and_then<R, F>(self, f: F) -> Task<R::Value, E>
    where
        R: IntoTask<E>,
        F: FnOnce(T) -> R + Send + 'static,
    {
        Task::new(move |ctx| async move {
            let value = ctx.task(self).await?;
            ctx.task(f(value).into_task()).await
        })
    }

    /// Maps the success value; errors pass through.
    pub fn map<U, F>(self, f: F) -> Task<U, E>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        Task::new(move |ctx| async move { ctx.task(self).await.map(f) })
    }

    /// Chains on error; successes skip the callback and pass through.
    pub fn or_else<R, F>(self, f: F) -> Task<T, R::Error>
    where
        R: IntoTaskErr<T>,
        F: FnOnce(E) -> R + Send + 'static,
    {
        Task::new(move |ctx| async move {
            match ctx.task(self).await {
                Ok(value) => Ok(value),
                Err(error) => ctx.task(f(error).into_task()).await,
            }
        })
    }

    /// Maps the error; successes pass through.
    pub fn map_err<F2, F>(self, f: F) -> Task<T, F2>
    where
        F2: Send + 'static,
        F: FnOnce(E) -> F2 + Send + 'static,
    {
        Task::new(move |ctx| async move { ctx.task(self).await.map_err(f) })
    }
}

/// Values an [`Task::and_then`] callback may return.
pub trait IntoTask<E: Send + 'static> {
    type Value: Send + 'static;
    fn into_task(self) -> Task<Self::Value, E>;
}

impl<U: Send + 'static, E: Send + 'static> IntoTask<E> for Result<U, E> {
    type Value = U;

    fn into_task(self) -> Task<U, E> {
        Task::ready(self)
    }
}

impl<U: Send + 'static, E: Send + 'static> IntoTask<E> for Task<U, E> {
    type Value = U;

    fn into_task(self) -> Task<U, E> {
        self
    }
}

/// Values an [`Task::or_else`] callback may return.
pub trait IntoTaskErr<T: Send + 'static> {
    type Error: Send + 'static;
    fn into_task(self) -> Task<T, Self::Error>;
}

impl<T: Send + 'static, F: Send + 'static> IntoTaskErr<T> for Result<T, F> {
    type Error = F;

    fn into_task(self) -> Task<T, F> {
        Task::ready(self)
    }
}

impl<T: Send + 'static, F: Send + 'static> IntoTaskErr<T> for Task<T, F> {
    type Error = F;

    fn into_task(self) -> Task<T, F> {
        self
    }
}

/// The suspension-point handle passed to a task body.
///
/// Awaiting through the context is what keeps cancellation and tracebacks
/// working: each method records the call site on the task's frame and wires
/// the frame links for the await it returns.
#[derive(Clone)]
pub struct TaskContext {
    frame: Arc<Frame>,
}

impl TaskContext {
    /// Awaits a nested task; the inner task's frame chain becomes part of
    /// this task's, so cancellation reaches its leaf.
    #[track_caller]
    pub fn task<U, E2>(&self, task: Task<U, E2>) -> Awaiter<U, E2>
    where
        U: Send + 'static,
        E2: Send + 'static,
    {
        self.frame.begin_await(
            Some(Arc::clone(&task.driver.frame)),
            Location::caller(),
            None,
        );
        Awaiter::new(task.future())
    }

    /// Awaits a bare future. No cancel thunk: a `cancel` that reaches this
    /// leaf reports "not supported" and leaves the chain marked.
    #[track_caller]
    pub fn future<U, E2>(&self, future: Future<U, E2>) -> Awaiter<U, E2>
    where
        U: Send + 'static,
        E2: Send + 'static,
    {
        self.frame.begin_await(None, Location::caller(), None);
        Awaiter::new(future)
    }

    /// Awaits a future with a cancel thunk installed at this leaf.
    #[track_caller]
    pub fn cancellable<U, E2>(&self, cancellable: Cancellable<U, E2>) -> Awaiter<U, E2>
    where
        U: Send + 'static,
        E2: Send + 'static,
    {
        self.frame
            .begin_await(None, Location::caller(), Some(cancellable.cancel));
        Awaiter::new(cancellable.future)
    }

    /// True once this task has been marked by [`Task::cancel`]. Returns
    /// immediately; bodies poll it between awaits to short-circuit
    /// cooperatively.
    pub fn cancelled(&self) -> bool {
        self.frame.cancelled.load(Ordering::Acquire)
    }
}

/// Adapter that suspends a task body on a promise-layer [`Future`].
pub struct Awaiter<T, E> {
    future: Option<Future<T, E>>,
    outcome: Arc<Mutex<Option<Result<T, E>>>>,
}

impl<T, E> Awaiter<T, E> {
    fn new(future: Future<T, E>) -> Self {
        Self {
            future: Some(future),
            outcome: Arc::new(Mutex::new(None)),
        }
    }
}

impl<T: Send + 'static, E: Send + 'static> RustFuture for Awaiter<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Some(outcome) = lock(&this.outcome).take() {
            return Poll::Ready(outcome);
        }

        if let Some(future) = this.future.take() {
            if future.is_ready() {
                return Poll::Ready(future.get());
            }
            let outcome = Arc::clone(&this.outcome);
            let waker = cx.waker().clone();
            future.set_callback(move |result| {
                *lock(&outcome) = Some(result);
                waker.wake();
            });
        }

        Poll::Pending
    }
}

/// Adapts an external future into a task (awaiting it as the sole
/// suspension point). Such a task cannot service `cancel`.
pub fn from_future<T, E>(future: Future<T, E>) -> Task<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    Task::new(move |ctx| async move { ctx.future(future).await })
}

/// Adapts a cancellable into a task; `cancel` fires its thunk.
pub fn from_cancellable<T, E>(cancellable: Cancellable<T, E>) -> Task<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    Task::new(move |ctx| async move { ctx.cancellable(cancellable).await })
}

// -------------------------------------------------------------------------
// COMBINATORS — the future combinators plus child cancellation
// -------------------------------------------------------------------------

/// Type-erased view of a child task for the combinators' cancellation path.
trait TaskHandle: Send + Sync {
    fn done(&self) -> bool;
    fn cancel(&self) -> Result<(), Code>;
}

impl<T: Send + 'static, E: Send + 'static> TaskHandle for Task<T, E> {
    fn done(&self) -> bool {
        Task::done(self)
    }

    fn cancel(&self) -> Result<(), Code> {
        Task::cancel(self)
    }
}

#[derive(Clone, Copy)]
enum CancelRemaining {
    OnError,
    OnSuccess,
    Always,
    Never,
}

fn cancel_not_done(handles: &[Arc<dyn TaskHandle>]) -> Result<(), Code> {
    let mut first_error = None;
    for handle in handles {
        if handle.done() {
            continue;
        }
        if let Err(error) = handle.cancel() {
            first_error.get_or_insert(error);
        }
    }
    match first_error {
        None => Ok(()),
        Some(error) => Err(error),
    }
}

/// Shared shape of every task combinator: await the combined future through
/// a cancellable whose thunk cancels the not-yet-done children, then — once
/// the decisive result is in — cancel whichever children are still running.
fn combine<T, E>(
    combined: Future<T, E>,
    handles: Vec<Arc<dyn TaskHandle>>,
    when: CancelRemaining,
) -> Task<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    Task::new(move |ctx| async move {
        let thunk_handles = handles.clone();
        let result = ctx
            .cancellable(Cancellable::new(combined, move || {
                cancel_not_done(&thunk_handles)
            }))
            .await;

        let cancel_rest = match when {
            CancelRemaining::Always => true,
            CancelRemaining::OnError => result.is_err(),
            CancelRemaining::OnSuccess => result.is_ok(),
            CancelRemaining::Never => false,
        };
        if cancel_rest {
            // Losing children get their thunks fired; failures here cannot
            // change the decisive result.
            let _ = cancel_not_done(&handles);
        }

        result
    })
}

fn split<T, E>(tasks: Vec<Task<T, E>>) -> (Vec<Future<T, E>>, Vec<Arc<dyn TaskHandle>>)
where
    T: Send + 'static,
    E: Send + 'static,
{
    let mut futures = Vec::with_capacity(tasks.len());
    let mut handles: Vec<Arc<dyn TaskHandle>> = Vec::with_capacity(tasks.len());
    for task in tasks {
        futures.push(task.future());
        handles.push(Arc::new(task));
    }
    (futures, handles)
}

/// Task form of [`promise::all`]: rejecting cancels the remaining children.
pub fn all<T, E>(tasks: Vec<Task<T, E>>) -> Task<Vec<T>, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    let (futures, handles) = split(tasks);
    combine(promise::all(futures), handles, CancelRemaining::OnError)
}

/// Task form of [`promise::all_settled`]: never rejects, never cancels on
/// its own (only through [`Task::cancel`] on the combined task).
pub fn all_settled<T, E>(tasks: Vec<Task<T, E>>) -> Task<Vec<Result<T, E>>, Infallible>
where
    T: Send + 'static,
    E: Send + 'static,
{
    let (futures, handles) = split(tasks);
    combine(
        promise::all_settled(futures),
        handles,
        CancelRemaining::Never,
    )
}

/// Task form of [`promise::any`]: the first value cancels the remaining
/// children.
pub fn any<T, E>(tasks: Vec<Task<T, E>>) -> Task<T, Vec<E>>
where
    T: Send + 'static,
    E: Send + 'static,
{
    let (futures, handles) = split(tasks);
    combine(promise::any(futures), handles, CancelRemaining::OnSuccess)
}

/// Task form of [`promise::race`]: the first settlement cancels the rest.
pub fn race<T, E>(tasks: Vec<Task<T, E>>) -> Task<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    let (futures, handles) = split(tasks);
    combine(promise::race(futures), handles, CancelRemaining::Always)
}

/// Combinators over a tuple of tasks with distinct value types and a common
/// error type. Implemented for tuples of arity 1 through 6; see
/// [`FutureSet`] for the value-shape rules ([`AnyValue`] carries the
/// heterogeneous `any`/`race` winner).
pub trait TaskSet {
    type All;
    type AllSettled;
    type Any;
    type Race;

    fn all(self) -> Self::All;
    fn all_settled(self) -> Self::AllSettled;
    fn any(self) -> Self::Any;
    fn race(self) -> Self::Race;
}

macro_rules! impl_task_set {
    ($(($T:ident, $t:ident)),+) => {
        impl<E: Send + 'static, $($T: Send + 'static),+> TaskSet for ($(Task<$T, E>,)+) {
            type All = Task<($($T,)+), E>;
            type AllSettled = Task<($(Result<$T, E>,)+), Infallible>;
            type Any = Task<AnyValue, Vec<E>>;
            type Race = Task<AnyValue, E>;

            fn all(self) -> Self::All {
                let ($($t,)+) = self;
                let combined = ($($t.future(),)+).all();
                let handles: Vec<Arc<dyn TaskHandle>> = vec![$(Arc::new($t)),+];
                combine(combined, handles, CancelRemaining::OnError)
            }

            fn all_settled(self) -> Self::AllSettled {
                let ($($t,)+) = self;
                let combined = ($($t.future(),)+).all_settled();
                let handles: Vec<Arc<dyn TaskHandle>> = vec![$(Arc::new($t)),+];
                combine(combined, handles, CancelRemaining::Never)
            }

            fn any(self) -> Self::Any {
                let ($($t,)+) = self;
                let combined = ($($t.future(),)+).any();
                let handles: Vec<Arc<dyn TaskHandle>> = vec![$(Arc::new($t)),+];
                combine(combined, handles, CancelRemaining::OnSuccess)
            }

            fn race(self) -> Self::Race {
                let ($($t,)+) = self;
                let combined = ($($t.future(),)+).race();
                let handles: Vec<Arc<dyn TaskHandle>> = vec![$(Arc::new($t)),+];
                combine(combined, handles, CancelRemaining::Always)
            }
        }
    };
}

impl_task_set!((T0, t0));
impl_task_set!((T0, t0), (T1, t1));
impl_task_set!((T0, t0), (T1, t1), (T2, t2));
impl_task_set!((T0, t0), (T1, t1), (T2, t2), (T3, t3));
impl_task_set!((T0, t0), (T1, t1), (T2, t2), (T3, t3), (T4, t4));
impl_task_set!((T0, t0), (T1, t1), (T2, t2), (T3, t3), (T4, t4), (T5, t5));
