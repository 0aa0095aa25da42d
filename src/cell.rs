//! The settlement cell backing every promise. It holds the single-fire
//! outcome and lets any number of threads or tasks wait for it.
//!
use std::cell::RefCell;
use std::collections::VecDeque;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::task::{Context, Poll, Waker};

use crate::Error;

pub(crate) type Outcome<T> = Result<T, Error>;

type Continuation<T> = Box<dyn FnOnce(&Outcome<T>) + Send>;

type Forward = Box<dyn FnOnce()>;

thread_local! {
    // `Some` while this thread is draining forwards.
    static FORWARDS: RefCell<Option<VecDeque<Forward>>> = const { RefCell::new(None) };
}

/// Runs `job`, which settles another cell, without growing the stack.
///
/// A forward issued while this thread is already draining is queued and run
/// by the outermost call once the current job returns, so settling a long
/// chain of pass-through links takes constant stack depth.
pub(crate) fn forward<F>(job: F)
where
    F: FnOnce() + 'static,
{
    let job = FORWARDS.with(|forwards| match forwards.borrow_mut().as_mut() {
        Some(queue) => {
            queue.push_back(Box::new(job));
            None
        }
        None => Some(job),
    });
    let Some(job) = job else {
        return;
    };

    FORWARDS.with(|forwards| *forwards.borrow_mut() = Some(VecDeque::new()));
    let mut next: Option<Forward> = Some(Box::new(job));
    while let Some(job) = next {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
            tracing::warn!(
                error = %Error::from_panic(payload),
                "forwarding an outcome panicked"
            );
        }
        next = FORWARDS.with(|forwards| {
            forwards
                .borrow_mut()
                .as_mut()
                .and_then(VecDeque::pop_front)
        });
    }
    FORWARDS.with(|forwards| *forwards.borrow_mut() = None);
}

pub(crate) struct Cell<T> {
    outcome: OnceLock<Outcome<T>>,
    pending: Mutex<Pending<T>>,
    settled: Condvar,
}

struct Pending<T> {
    wakers: Vec<Waker>,
    continuations: Vec<Continuation<T>>,
}

impl<T> Default for Pending<T> {
    fn default() -> Self {
        Self {
            wakers: vec![],
            continuations: vec![],
        }
    }
}

impl<T> Cell<T> {
    pub(crate) fn new() -> Self {
        Self {
            outcome: OnceLock::new(),
            pending: Mutex::new(Pending::default()),
            settled: Condvar::new(),
        }
    }

    pub(crate) fn settled(outcome: Outcome<T>) -> Self {
        Self {
            outcome: OnceLock::from(outcome),
            pending: Mutex::new(Pending::default()),
            settled: Condvar::new(),
        }
    }

    // No user code ever runs while the guard is held, so a poisoned lock
    // still protects consistent data.
    fn lock(&self) -> MutexGuard<'_, Pending<T>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn get(&self) -> Option<&Outcome<T>> {
        self.outcome.get()
    }

    /// Moves the cell out of pending. Hands `outcome` back when the cell was
    /// already settled.
    pub(crate) fn settle(&self, outcome: Outcome<T>) -> Result<(), Outcome<T>> {
        let mut pending = self.lock();
        self.outcome.set(outcome)?;
        let Pending {
            wakers,
            continuations,
        } = mem::take(&mut *pending);
        drop(pending);

        self.settled.notify_all();
        for waker in wakers {
            waker.wake();
        }
        if !continuations.is_empty() {
            if let Some(outcome) = self.outcome.get() {
                for continuation in continuations {
                    continuation(outcome);
                }
            }
        }
        Ok(())
    }

    /// Blocks the calling thread until the cell is settled.
    pub(crate) fn wait(&self) -> &Outcome<T> {
        if let Some(outcome) = self.outcome.get() {
            return outcome;
        }
        let guard = self.lock();
        let guard = self
            .settled
            .wait_while(guard, |_| self.outcome.get().is_none())
            .unwrap_or_else(PoisonError::into_inner);
        drop(guard);
        self.outcome
            .get()
            .unwrap_or_else(|| unreachable!("condvar released before settlement"))
    }

    pub(crate) fn poll_outcome(&self, cx: &mut Context<'_>) -> Poll<&Outcome<T>> {
        if let Some(outcome) = self.outcome.get() {
            return Poll::Ready(outcome);
        }
        let mut pending = self.lock();
        // Settlement may have raced in before we took the guard.
        if let Some(outcome) = self.outcome.get() {
            return Poll::Ready(outcome);
        }
        let waker = cx.waker();
        if !pending.wakers.iter().any(|w| w.will_wake(waker)) {
            pending.wakers.push(waker.clone());
        }
        Poll::Pending
    }

    /// Runs `continuation` once the cell settles, or right away on this
    /// thread when it already has.
    pub(crate) fn on_settle<F>(&self, continuation: F)
    where
        F: FnOnce(&Outcome<T>) + Send + 'static,
    {
        let mut pending = self.lock();
        if self.outcome.get().is_none() {
            pending.continuations.push(Box::new(continuation));
            return;
        }
        drop(pending);
        if let Some(outcome) = self.outcome.get() {
            continuation(outcome);
        }
    }
}
