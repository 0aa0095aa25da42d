//! Executor threads. Every `Promise::new` and every combinator link runs its
//! user code through [`Config::execute`], which owns the thread spawn and the
//! panic boundary.
//!
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use crate::{Error, Promise, Resolver};

#[derive(Debug, Clone, Default)]
pub(crate) struct Config {
    name: Option<String>,
    stack_size: Option<usize>,
}

impl Config {
    fn thread_builder(&self) -> thread::Builder {
        let mut builder = thread::Builder::new();
        if let Some(name) = self.name.clone() {
            builder = builder.name(name);
        }
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }
        builder
    }

    /// Runs `task` on a fresh thread. A panic inside `task`, or a thread that
    /// cannot be spawned, rejects through `resolver`.
    pub(crate) fn execute<T, F>(&self, resolver: Resolver<T>, task: F)
    where
        T: Send + Sync + 'static,
        F: FnOnce(Resolver<T>) + Send + 'static,
    {
        let fallback = resolver.clone();
        let spawned = self.thread_builder().spawn(move || {
            tracing::trace!(thread = ?thread::current().name(), "executor starting");
            invoke(resolver, task);
        });
        if let Err(err) = spawned {
            tracing::warn!(%err, "failed to spawn executor thread");
            fallback.reject(Error::Spawn(Arc::new(err)));
        }
    }
}

fn invoke<T, F>(resolver: Resolver<T>, task: F)
where
    F: FnOnce(Resolver<T>),
{
    let fallback = resolver.clone();
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || task(resolver))) {
        let err = Error::from_panic(payload);
        tracing::warn!(error = %err, "executor panicked, rejecting promise");
        fallback.reject(err);
    }
}

/// Configures the threads a promise chain runs on.
///
/// The configuration sticks to the promise: every promise derived from it
/// with `then`, `then_promise` or `catch` spawns its threads the same way.
///
/// # Examples
///
/// ```
/// use promise_chain::Promise;
/// use std::thread;
///
/// let promise = Promise::<()>::builder()
///     .name("fetch")
///     .spawn(|| Ok(thread::current().name().map(String::from)))
///     .then(|name| (name, thread::current().name().map(String::from)));
/// let names = promise.wait().unwrap();
/// assert_eq!(names.0.as_deref(), Some("fetch"));
/// assert_eq!(names.1.as_deref(), Some("fetch"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names the executor threads.
    pub fn name<N: Into<String>>(self, name: N) -> Self {
        Self {
            config: Config {
                name: Some(name.into()),
                ..self.config
            },
        }
    }

    /// Sets the stack size, in bytes, of the executor threads.
    pub fn stack_size(self, size: usize) -> Self {
        Self {
            config: Config {
                stack_size: Some(size),
                ..self.config
            },
        }
    }

    /// Builds a promise and runs `executor` on its own thread, like
    /// [`Promise::new`].
    pub fn spawn_executor<T, F>(self, executor: F) -> Promise<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(Resolver<T>) + Send + 'static,
    {
        let promise = Promise::with_config(Arc::new(self.config));
        promise.config().execute(promise.resolver(), executor);
        promise
    }

    /// Builds a promise settled by the result of `f`, like [`Promise::spawn`].
    pub fn spawn<T, F>(self, f: F) -> Promise<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Result<T, Error> + Send + 'static,
    {
        self.spawn_executor(move |resolver| resolver.settle(f()))
    }
}
