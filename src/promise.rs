use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::cell::{forward, Cell, Outcome};
use crate::executor::{Builder, Config};
use crate::Error;

/// Where a promise is in its lifecycle. `Fulfilled` and `Rejected` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Pending,
    Fulfilled,
    Rejected,
}

/// The eventual outcome of a computation running on another thread.
///
/// A `Promise` settles exactly once, either fulfilled with a `T` or rejected
/// with an [`Error`]. Clones share the same outcome, and any number of threads
/// may [`wait`](Promise::wait) on it. A promise is also a [`Future`], so it can
/// be `.await`ed from async code.
///
/// # Examples
///
/// ```
/// use promise_chain::Promise;
///
/// let promise = Promise::spawn(|| Ok(10))
///     .then(|x| x * 2)
///     .then(|x| x + 5);
/// assert_eq!(promise.wait().unwrap(), 25);
/// ```
pub struct Promise<T> {
    cell: Arc<Cell<T>>,
    config: Arc<Config>,
}

/// The settling side handed to an executor. Cloning it lets nested work
/// settle the promise later; only the first settlement counts.
pub struct Resolver<T> {
    cell: Arc<Cell<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            config: self.config.clone(),
        }
    }
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("state", &state_of(&self.cell))
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("state", &state_of(&self.cell))
            .finish()
    }
}

fn state_of<T>(cell: &Cell<T>) -> State {
    match cell.get() {
        None => State::Pending,
        Some(Ok(_)) => State::Fulfilled,
        Some(Err(_)) => State::Rejected,
    }
}

fn settle<T>(cell: &Cell<T>, outcome: Outcome<T>) -> Result<(), Outcome<T>> {
    let fulfilled = outcome.is_ok();
    match cell.settle(outcome) {
        Ok(()) => {
            tracing::trace!(fulfilled, "promise settled");
            Ok(())
        }
        Err(outcome) => {
            tracing::debug!(fulfilled, "promise already settled, ignoring");
            Err(outcome)
        }
    }
}

// `T::clone` is user code; a panicking clone rejects instead of unwinding
// through whoever settled the parent.
fn clone_outcome<T: Clone>(outcome: &Outcome<T>) -> Outcome<T> {
    panic::catch_unwind(AssertUnwindSafe(|| outcome.clone())).unwrap_or_else(|payload| {
        let err = Error::from_panic(payload);
        tracing::warn!(error = %err, "cloning a settled value panicked");
        Err(err)
    })
}

impl<T> Resolver<T> {
    /// Fulfills the promise with `value`. Does nothing if it already settled.
    pub fn resolve(&self, value: T) {
        let _ = settle(&self.cell, Ok(value));
    }

    /// Rejects the promise with `err`. Does nothing if it already settled.
    pub fn reject(&self, err: Error) {
        let _ = settle(&self.cell, Err(err));
    }

    /// Resolves on `Ok`, rejects on `Err`.
    pub fn settle(&self, outcome: Result<T, Error>) {
        let _ = settle(&self.cell, outcome);
    }

    /// Like [`resolve`](Resolver::resolve), but hands `value` back when the
    /// promise had already settled.
    pub fn try_resolve(&self, value: T) -> Result<(), T> {
        settle(&self.cell, Ok(value)).map_err(|outcome| match outcome {
            Ok(value) => value,
            Err(_) => unreachable!("cell handed back a different outcome"),
        })
    }

    /// Like [`reject`](Resolver::reject), but hands `err` back when the
    /// promise had already settled.
    pub fn try_reject(&self, err: Error) -> Result<(), Error> {
        settle(&self.cell, Err(err)).map_err(|outcome| match outcome {
            Err(err) => err,
            Ok(_) => unreachable!("cell handed back a different outcome"),
        })
    }

    pub fn is_settled(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<T> Promise<T> {
    pub(crate) fn with_config(config: Arc<Config>) -> Self {
        Self {
            cell: Arc::new(Cell::new()),
            config,
        }
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    /// Returns a builder to configure the threads the promise chain runs on.
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// A promise without an executor, settled from the outside through
    /// [`resolve`](Promise::resolve), [`reject`](Promise::reject) or a
    /// [`Resolver`].
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_chain::Promise;
    /// use std::thread;
    ///
    /// let promise = Promise::<String>::pending();
    /// let resolver = promise.resolver();
    /// let task = thread::spawn(move || resolver.resolve("🍓".into()));
    /// assert_eq!(promise.wait().unwrap(), "🍓");
    /// task.join().expect("The task thread has panicked");
    /// ```
    pub fn pending() -> Self {
        Self::with_config(Arc::default())
    }

    /// An already fulfilled promise.
    pub fn resolved(value: T) -> Self {
        Self {
            cell: Arc::new(Cell::settled(Ok(value))),
            config: Arc::default(),
        }
    }

    /// An already rejected promise.
    pub fn rejected(err: Error) -> Self {
        Self {
            cell: Arc::new(Cell::settled(Err(err))),
            config: Arc::default(),
        }
    }

    /// A handle that can settle this promise from anywhere.
    pub fn resolver(&self) -> Resolver<T> {
        Resolver {
            cell: self.cell.clone(),
        }
    }

    /// Fulfills the promise with `value`. The first settlement wins; later
    /// calls are silently ignored.
    pub fn resolve(&self, value: T) {
        self.resolver().resolve(value);
    }

    /// Rejects the promise with `err`. The first settlement wins; later calls
    /// are silently ignored.
    pub fn reject(&self, err: Error) {
        self.resolver().reject(err);
    }

    pub fn try_resolve(&self, value: T) -> Result<(), T> {
        self.resolver().try_resolve(value)
    }

    pub fn try_reject(&self, err: Error) -> Result<(), Error> {
        self.resolver().try_reject(err)
    }

    pub fn state(&self) -> State {
        state_of(&self.cell)
    }

    pub fn is_settled(&self) -> bool {
        self.state() != State::Pending
    }
}

impl<T> Promise<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Runs `executor` on a new thread and returns the promise it settles.
    ///
    /// The executor receives a [`Resolver`]. If it panics before settling,
    /// the promise is rejected with [`Error::Panic`]. If it returns without
    /// settling, the promise stays pending until something else settles it.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_chain::{Error, Promise};
    ///
    /// let promise = Promise::<i32>::new(|resolver| resolver.reject(Error::msg("fail")));
    /// assert_eq!(promise.wait().unwrap_err().to_string(), "fail");
    /// ```
    pub fn new<F>(executor: F) -> Self
    where
        F: FnOnce(Resolver<T>) + Send + 'static,
    {
        Builder::new().spawn_executor(executor)
    }

    /// Runs `f` on a new thread; the promise resolves with its `Ok` value or
    /// rejects with its `Err`.
    pub fn spawn<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<T, Error> + Send + 'static,
    {
        Builder::new().spawn(f)
    }

    /// Blocks the current thread until the promise settles.
    ///
    /// Every call, from any thread, returns the same outcome. Never panics.
    pub fn wait(&self) -> Result<T, Error> {
        self.cell.wait().clone()
    }

    /// The outcome if the promise has settled, without blocking.
    pub fn try_get(&self) -> Option<Result<T, Error>> {
        self.cell.get().cloned()
    }

    /// Transforms the fulfilled value with `f` on a new thread.
    ///
    /// A rejection passes through to the returned promise untouched and `f`
    /// is never called. A panic in `f` rejects the returned promise.
    pub fn then<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let child = Promise::with_config(self.config.clone());
        let resolver = child.resolver();
        let config = self.config.clone();
        self.cell.on_settle(move |outcome| match clone_outcome(outcome) {
            Ok(value) => config.execute(resolver, move |resolver| resolver.resolve(f(value))),
            Err(err) => forward(move || resolver.reject(err)),
        });
        child
    }

    /// Like [`then`](Promise::then), but `f` returns another promise whose
    /// outcome the returned promise adopts.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_chain::Promise;
    ///
    /// let promise = Promise::spawn(|| Ok(2))
    ///     .then_promise(|v| Promise::spawn(move || Ok(v * v)));
    /// assert_eq!(promise.wait().unwrap(), 4);
    /// ```
    pub fn then_promise<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> Promise<U> + Send + 'static,
    {
        let child = Promise::with_config(self.config.clone());
        let resolver = child.resolver();
        let config = self.config.clone();
        self.cell.on_settle(move |outcome| match clone_outcome(outcome) {
            Ok(value) => config.execute(resolver, move |resolver| {
                let nested = f(value);
                nested.cell.on_settle(move |outcome| {
                    let outcome = clone_outcome(outcome);
                    forward(move || resolver.settle(outcome));
                });
            }),
            Err(err) => forward(move || resolver.reject(err)),
        });
        child
    }

    /// Handles a rejection with `f` on a new thread.
    ///
    /// `Ok` from `f` recovers, `Err` replaces the error. A fulfilled value
    /// passes through untouched and `f` is never called.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_chain::{Error, Promise};
    ///
    /// let promise = Promise::<i32>::spawn(|| Err(Error::msg("fail")))
    ///     .catch(|_| Ok(100));
    /// assert_eq!(promise.wait().unwrap(), 100);
    /// ```
    pub fn catch<F>(&self, f: F) -> Promise<T>
    where
        F: FnOnce(Error) -> Result<T, Error> + Send + 'static,
    {
        let child = Promise::with_config(self.config.clone());
        let resolver = child.resolver();
        let config = self.config.clone();
        self.cell.on_settle(move |outcome| match clone_outcome(outcome) {
            Ok(value) => forward(move || resolver.resolve(value)),
            Err(err) => config.execute(resolver, move |resolver| resolver.settle(f(err))),
        });
        child
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::pending()
    }
}

impl<T: Clone> Future for Promise<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.cell.poll_outcome(cx).map(Clone::clone)
    }
}
