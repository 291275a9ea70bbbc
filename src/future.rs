//! Awaiting a promise.
//!
//! A `Promise` turns into a [`Settled`] future through `IntoFuture`. The
//! future registers a single callback on the promise and wakes its task once
//! that callback runs. If the promise is abandoned (every producer dropped
//! while pending) the callback is dropped unfired and the future resolves to
//! [`Error::ProducerDropped`].
//!
//! # Examples
//!
//! ```
//! use promise_chain::Promise;
//! use futures::executor::block_on;
//! use std::thread;
//!
//! let (producer, promise) = Promise::<String>::pending();
//! let task1 = thread::spawn(move || block_on(async {
//!     promise.await
//! }));
//! producer.resolve("Hi".into());
//! assert_eq!(task1.join().expect("The task1 thread has panicked."), Ok("Hi".to_string()));
//! ```
use crate::{callback::Callback, state::lock, Error, Promise};
use std::{
    future::{Future, IntoFuture},
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll, Waker},
};

#[derive(Debug)]
enum WakerState {
    Fresh,
    Tainted,
}

#[derive(Debug)]
struct Slot<T, E> {
    outcome: Option<Result<T, E>>,
    waker: Result<Waker, WakerState>,
}

/// Future returned by awaiting a [`Promise`].
#[derive(Debug)]
pub struct Settled<T, E> {
    slot: Arc<Mutex<Slot<T, E>>>,
}

/// Lives inside the callback. Dropping it, fired or not, wakes the waiting
/// task; an empty slot at that point means the promise was abandoned.
struct Notifier<T, E> {
    slot: Arc<Mutex<Slot<T, E>>>,
}

impl<T, E> Notifier<T, E> {
    fn deliver(self, outcome: Result<T, E>) {
        lock(&self.slot).outcome = Some(outcome);
    }
}

impl<T, E> Drop for Notifier<T, E> {
    fn drop(&mut self) {
        let waker = std::mem::replace(&mut lock(&self.slot).waker, Err(WakerState::Tainted));
        if let Ok(waker) = waker {
            waker.wake()
        }
    }
}

impl<T, E> IntoFuture for Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + From<Error> + 'static,
{
    type Output = Result<T, E>;
    type IntoFuture = Settled<T, E>;

    fn into_future(self) -> Self::IntoFuture {
        let slot = Arc::new(Mutex::new(Slot {
            outcome: None,
            waker: Err(WakerState::Fresh),
        }));
        let notifier = Notifier { slot: slot.clone() };
        self.register(Callback::settled(move |outcome| notifier.deliver(outcome)));
        Settled { slot }
    }
}

impl<T, E: From<Error>> Future for Settled<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = lock(&self.slot);
        match slot.outcome.take() {
            Some(outcome) => Poll::Ready(outcome),
            None => match std::mem::replace(&mut slot.waker, Ok(cx.waker().clone())) {
                Err(WakerState::Tainted) => Poll::Ready(Err(Error::ProducerDropped.into())),
                _ => Poll::Pending,
            },
        }
    }
}
