//! Thread-backed promises.
//!
//! A [`Promise`] is the eventual outcome of a computation running on its own
//! thread. It settles once, can be waited on from any number of threads, and
//! chains with [`then`](Promise::then), [`then_promise`](Promise::then_promise)
//! and [`catch`](Promise::catch). A panic in user code never escapes: it
//! rejects the promise with [`Error::Panic`].
//!
//! # Examples
//!
//! ```
//! use promise_chain::{await_promise, spawn, Error};
//!
//! let promise = spawn(|| Err::<i32, _>(Error::msg("fail")))
//!     .catch(|_| Ok(100))
//!     .then(|x| x + 1);
//! assert_eq!(await_promise(&promise).unwrap(), 101);
//! ```
//!
use std::any::Any;
use std::io;
use std::sync::Arc;

mod cell;
mod executor;
mod promise;

pub use executor::Builder;
pub use promise::{Promise, Resolver, State};

/// Why a promise was rejected. Cheap to clone, so every waiter gets a copy.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// An application error made from a message.
    #[error("{0}")]
    Message(Arc<str>),
    /// An application error wrapping another error.
    #[error("{0}")]
    Source(Arc<dyn std::error::Error + Send + Sync>),
    /// A panic caught while running an executor or a callback.
    #[error("panicked: {0}")]
    Panic(Arc<str>),
    /// The operating system refused to start an executor thread.
    #[error("failed to spawn executor thread: {0}")]
    Spawn(Arc<io::Error>),
}

impl Error {
    pub fn msg<M: std::fmt::Display>(message: M) -> Self {
        Error::Message(message.to_string().into())
    }

    pub fn new<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Source(Arc::new(err))
    }

    /// Whether this error came from a contained panic rather than from a
    /// rejection.
    pub fn is_panic(&self) -> bool {
        matches!(self, Error::Panic(_))
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_string(),
            Err(payload) => match payload.downcast::<String>() {
                Ok(message) => *message,
                Err(_) => "Box<dyn Any>".to_string(),
            },
        };
        Error::Panic(message.into())
    }
}

impl From<&str> for Error {
    fn from(message: &str) -> Self {
        Error::msg(message)
    }
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Error::Message(message.into())
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::new(err)
    }
}

/// Runs `f` on a new thread and returns a promise for its result.
///
/// Same as [`Promise::spawn`].
pub fn spawn<T, F>(f: F) -> Promise<T>
where
    T: Clone + Send + Sync + 'static,
    F: FnOnce() -> Result<T, Error> + Send + 'static,
{
    Promise::spawn(f)
}

/// Blocks until `promise` settles. Same as [`Promise::wait`].
pub fn await_promise<T>(promise: &Promise<T>) -> Result<T, Error>
where
    T: Clone + Send + Sync + 'static,
{
    promise.wait()
}
