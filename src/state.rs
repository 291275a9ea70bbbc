//! The settlement core shared by a promise and its producers.
//!
//! A `Cell` owns the settlement state and the queue of callbacks registered
//! while it was pending. It is only ever mutated through `Cell::settle` and
//! `Cell::register`; both release the lock before any callback runs, so a
//! continuation may freely register on or settle the cell that invoked it.
//!
//! Callbacks fire through the per-thread trampoline, so settling or abandoning
//! a long chain does not grow the stack with its length.
use crate::{callback::Callback, trampoline};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// The settlement state of a promise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State<T, E> {
    Pending,
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> State<T, E> {
    pub fn is_pending(&self) -> bool {
        matches!(self, State::Pending)
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(self, State::Fulfilled(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, State::Rejected(_))
    }
}

impl<T: Clone, E: Clone> State<T, E> {
    fn outcome(&self) -> Option<Result<T, E>> {
        match self {
            State::Pending => None,
            State::Fulfilled(value) => Some(Ok(value.clone())),
            State::Rejected(error) => Some(Err(error.clone())),
        }
    }
}

impl<T, E> From<Result<T, E>> for State<T, E> {
    fn from(outcome: Result<T, E>) -> Self {
        match outcome {
            Ok(value) => State::Fulfilled(value),
            Err(error) => State::Rejected(error),
        }
    }
}

/// Callbacks never run while a lock is held, so a poisoned mutex only means
/// a panic inside one of the short critical sections below; the data is still
/// consistent.
pub(crate) fn lock<X>(mutex: &Mutex<X>) -> MutexGuard<'_, X> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner<T, E> {
    state: State<T, E>,
    callbacks: VecDeque<Callback<T, E>>,
    producers: usize,
}

impl<T, E> Inner<T, E> {
    /// Pending with nobody left to settle it.
    fn is_abandoned(&self) -> bool {
        self.producers == 0 && self.state.is_pending()
    }
}

enum Admission<T, E> {
    Queued,
    Ready(Callback<T, E>, Result<T, E>),
    Refused(Callback<T, E>),
}

pub(crate) struct Cell<T, E> {
    inner: Mutex<Inner<T, E>>,
}

impl<T, E> Cell<T, E> {
    pub(crate) fn new(state: State<T, E>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state,
                callbacks: VecDeque::new(),
                producers: 0,
            }),
        }
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&State<T, E>) -> R) -> R {
        f(&lock(&self.inner).state)
    }

    fn attach_producer(&self) {
        lock(&self.inner).producers += 1;
    }
}

impl<T: 'static, E: 'static> Cell<T, E> {
    fn detach_producer(&self) {
        let orphaned = {
            let mut inner = lock(&self.inner);
            inner.producers = inner.producers.saturating_sub(1);
            if inner.is_abandoned() {
                std::mem::take(&mut inner.callbacks)
            } else {
                return;
            }
        };
        if !orphaned.is_empty() {
            tracing::debug!(
                callbacks = orphaned.len(),
                "promise abandoned while pending, dropping its callbacks"
            );
            // Dropping them may abandon the next promise down the chain.
            trampoline::run(move || drop(orphaned));
        }
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Cell<T, E> {
    /// Moves a pending cell to its final state and drains the queue. Any
    /// settlement after the first is ignored.
    pub(crate) fn settle(&self, outcome: Result<T, E>) {
        {
            let mut inner = lock(&self.inner);
            if !inner.state.is_pending() {
                tracing::trace!("ignoring settlement of an already settled promise");
                return;
            }
            inner.state = outcome.into();
            tracing::trace!(
                fulfilled = inner.state.is_fulfilled(),
                callbacks = inner.callbacks.len(),
                "promise settled"
            );
        }
        self.drain();
    }

    /// Queues `callback` while the cell is pending. On a settled cell it fires
    /// on the calling thread before this returns, never through another
    /// thread's drain. When called from inside a running callback it fires
    /// right after that callback, still within the outermost call.
    pub(crate) fn register(&self, callback: Callback<T, E>) {
        let admission = {
            let mut inner = lock(&self.inner);
            match inner.state.outcome() {
                Some(outcome) => Admission::Ready(callback, outcome),
                None if inner.producers == 0 => Admission::Refused(callback),
                None => {
                    inner.callbacks.push_back(callback);
                    Admission::Queued
                }
            }
        };
        match admission {
            Admission::Queued => {}
            Admission::Ready(callback, outcome) => {
                trampoline::run(move || callback.fire(outcome))
            }
            Admission::Refused(callback) => {
                tracing::debug!("registration on an abandoned promise dropped");
                trampoline::run(move || drop(callback));
            }
        }
    }

    /// Fires the callbacks queued while pending, oldest first.
    fn drain(&self) {
        loop {
            let (callback, outcome) = {
                let mut inner = lock(&self.inner);
                let Some(outcome) = inner.state.outcome() else {
                    return;
                };
                let Some(callback) = inner.callbacks.pop_front() else {
                    return;
                };
                (callback, outcome)
            };
            trampoline::run(move || callback.fire(outcome));
        }
    }
}

/// The settling side of a promise. Producers can be cloned and sent to other
/// threads; the first `resolve`/`reject` wins and the rest are no-ops.
///
/// Once every producer of a pending promise is dropped the promise can never
/// settle, so its queued callbacks are released.
///
/// # Examples
///
/// ```
/// use promise_chain::Promise;
/// use std::thread;
///
/// let (producer, promise) = Promise::<String>::pending();
/// let task = thread::spawn(move || producer.resolve("🍓".into()));
/// task.join().expect("The task thread has panicked");
/// assert_eq!(promise.state(), promise_chain::State::Fulfilled("🍓".to_string()));
/// ```
pub struct Producer<T: 'static, E: 'static> {
    cell: Arc<Cell<T, E>>,
}

impl<T: 'static, E: 'static> Producer<T, E> {
    pub(crate) fn attach(cell: Arc<Cell<T, E>>) -> Self {
        cell.attach_producer();
        Self { cell }
    }

    pub fn is_settled(&self) -> bool {
        self.cell.with_state(|state| !state.is_pending())
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Producer<T, E> {
    pub fn resolve(&self, value: T) {
        self.cell.settle(Ok(value))
    }

    pub fn reject(&self, error: E) {
        self.cell.settle(Err(error))
    }

    pub fn settle(&self, outcome: Result<T, E>) {
        self.cell.settle(outcome)
    }
}

impl<T: 'static, E: 'static> Clone for Producer<T, E> {
    fn clone(&self) -> Self {
        Self::attach(Arc::clone(&self.cell))
    }
}

impl<T: 'static, E: 'static> Drop for Producer<T, E> {
    fn drop(&mut self) {
        self.cell.detach_producer();
    }
}

impl<T: 'static, E: 'static> std::fmt::Debug for Producer<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("settled", &self.is_settled())
            .finish()
    }
}
