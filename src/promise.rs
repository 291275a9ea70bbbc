use crate::{
    callback::Callback,
    state::{Cell, Producer, State},
    Error,
};
use std::{fmt, sync::Arc};

/// Settles the promise handed to an initializer with a value.
pub type Resolve<T> = Arc<dyn Fn(T) + Send + Sync>;
/// Settles the promise handed to an initializer with an error.
pub type Reject<E> = Arc<dyn Fn(E) + Send + Sync>;

/// A value of type `T`, or an error of type `E`, that becomes known later.
///
/// `Promise` is a cheap handle: clones observe the same settlement. Handlers
/// returning `Err` reject the promise they produce, so failures travel down a
/// chain until a `catch` takes them.
///
/// Rust has no overloading, so each combinator comes in three forms:
///
/// | handler returns | `then`         | `catch`         | `finally`         |
/// |-----------------|----------------|-----------------|-------------------|
/// | a value         | `then`         | `catch`         | `finally`         |
/// | a promise       | `then_promise` | `catch_promise` | `finally_promise` |
/// | nothing         | `then_do`      | `catch_do`      | `finally_do`      |
///
/// # Examples
///
/// ```
/// use promise_chain::{Error, Promise};
/// use std::sync::mpsc::channel;
///
/// let (tx, rx) = channel();
/// Promise::<i32>::rejected(Error::rejected("Fail!"))
///     .catch(|_| Ok(42))
///     .then_do(move |n| tx.send(n).unwrap());
/// assert_eq!(rx.recv().unwrap(), 42);
/// ```
pub struct Promise<T, E = Error> {
    cell: Arc<Cell<T, E>>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.cell
            .with_state(|state| f.debug_struct("Promise").field("state", state).finish())
    }
}

impl<T, E> Promise<T, E> {
    fn settled(state: State<T, E>) -> Self {
        Self {
            cell: Arc::new(Cell::new(state)),
        }
    }

    /// A promise that is already fulfilled with `value`.
    pub fn fulfilled(value: T) -> Self {
        Self::settled(State::Fulfilled(value))
    }

    /// A promise that is already rejected with `error`.
    pub fn rejected(error: E) -> Self {
        Self::settled(State::Rejected(error))
    }

    /// A pending promise and the producer that settles it.
    pub fn pending() -> (Producer<T, E>, Self)
    where
        T: 'static,
        E: 'static,
    {
        let promise = Self::settled(State::Pending);
        (Producer::attach(Arc::clone(&promise.cell)), promise)
    }

    pub fn is_pending(&self) -> bool {
        self.cell.with_state(State::is_pending)
    }

    pub fn is_fulfilled(&self) -> bool {
        self.cell.with_state(State::is_fulfilled)
    }

    pub fn is_rejected(&self) -> bool {
        self.cell.with_state(State::is_rejected)
    }

    /// Identity of the underlying cell, comparable across value types.
    fn address(&self) -> usize {
        Arc::as_ptr(&self.cell).cast::<()>() as usize
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Runs `initializer` right away with the entry points that settle the
    /// new promise. They may be called now, or cloned and called later from
    /// any thread. An `Err` returned by the initializer rejects the promise.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_chain::{Error, Promise};
    ///
    /// let promise = Promise::<i32>::new(|_, _| Err(Error::rejected("Fail!")));
    /// assert!(promise.is_rejected());
    /// ```
    pub fn new<F>(initializer: F) -> Self
    where
        F: FnOnce(Resolve<T>, Reject<E>) -> Result<(), E>,
    {
        let (producer, promise) = Self::pending();
        let rejecter = producer.clone();
        let resolve: Resolve<T> = Arc::new(move |value| producer.resolve(value));
        let reject: Reject<E> = Arc::new(move |error| rejecter.reject(error));
        if let Err(error) = initializer(resolve, reject) {
            promise.cell.settle(Err(error));
        }
        promise
    }

    pub fn state(&self) -> State<T, E> {
        self.cell.with_state(State::clone)
    }

    pub(crate) fn register(&self, callback: Callback<T, E>) {
        self.cell.register(callback)
    }

    /// Settles `producer` the way this promise settles, unless this promise
    /// is the one the handler was attached to.
    fn forward(&self, origin: usize, producer: Producer<T, E>)
    where
        E: From<Error>,
    {
        if self.address() == origin {
            tracing::debug!("handler returned the promise it was attached to");
            producer.reject(Error::InvalidHandler.into());
            return;
        }
        let rejecter = producer.clone();
        self.register(Callback::new(
            move |value| producer.resolve(value),
            move |error| rejecter.reject(error),
        ));
    }

    /// Transforms the value once fulfilled. Rejections pass through.
    pub fn then<U, F>(&self, handler: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U, E> + Send + 'static,
    {
        let (producer, derived) = Promise::pending();
        let rejecter = producer.clone();
        self.register(Callback::new(
            move |value| producer.settle(handler(value)),
            move |error| rejecter.reject(error),
        ));
        derived
    }

    /// Continues with the promise `handler` returns once fulfilled.
    /// Returning `self` rejects with [`Error::InvalidHandler`].
    pub fn then_promise<U, F>(&self, handler: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<Promise<U, E>, E> + Send + 'static,
        E: From<Error>,
    {
        let origin = self.address();
        let (producer, derived) = Promise::pending();
        let rejecter = producer.clone();
        self.register(Callback::new(
            move |value| match handler(value) {
                Ok(next) => next.forward(origin, producer),
                Err(error) => producer.reject(error),
            },
            move |error| rejecter.reject(error),
        ));
        derived
    }

    /// Observes the value. Rejections are ignored by this registration.
    pub fn then_do<F>(&self, handler: F) -> &Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.register(Callback::new(handler, |_| {}));
        self
    }

    /// Replaces a rejection with the value `handler` returns. Values pass
    /// through.
    pub fn catch<F>(&self, handler: F) -> Self
    where
        F: FnOnce(E) -> Result<T, E> + Send + 'static,
    {
        let (producer, derived) = Self::pending();
        let resolver = producer.clone();
        self.register(Callback::new(
            move |value| resolver.resolve(value),
            move |error| producer.settle(handler(error)),
        ));
        derived
    }

    /// Recovers from a rejection with the promise `handler` returns.
    /// Returning `self` rejects with [`Error::InvalidHandler`].
    pub fn catch_promise<F>(&self, handler: F) -> Self
    where
        F: FnOnce(E) -> Result<Self, E> + Send + 'static,
        E: From<Error>,
    {
        let origin = self.address();
        let (producer, derived) = Self::pending();
        let resolver = producer.clone();
        self.register(Callback::new(
            move |value| resolver.resolve(value),
            move |error| match handler(error) {
                Ok(next) => next.forward(origin, producer),
                Err(error) => producer.reject(error),
            },
        ));
        derived
    }

    /// Observes the error. Values are ignored by this registration.
    pub fn catch_do<F>(&self, handler: F) -> &Self
    where
        F: FnOnce(E) + Send + 'static,
    {
        self.register(Callback::new(|_| {}, handler));
        self
    }

    /// Runs `handler` on either outcome and fulfills with what it returns.
    /// The receiver's value or error is discarded.
    pub fn finally<U, F>(&self, handler: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce() -> Result<U, E> + Send + 'static,
    {
        let (producer, derived) = Promise::pending();
        self.register(Callback::settled(move |_| producer.settle(handler())));
        derived
    }

    /// Runs `handler` on either outcome and continues with the promise it
    /// returns, discarding the receiver's value or error.
    pub fn finally_promise<U, F>(&self, handler: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce() -> Result<Promise<U, E>, E> + Send + 'static,
        E: From<Error>,
    {
        let origin = self.address();
        let (producer, derived) = Promise::pending();
        self.register(Callback::settled(move |_| match handler() {
            Ok(next) => next.forward(origin, producer),
            Err(error) => producer.reject(error),
        }));
        derived
    }

    /// Runs `handler` on either outcome. The settlement is left as it is.
    pub fn finally_do<F>(&self, handler: F) -> &Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.register(Callback::settled(move |_| handler()));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::Promise;
    use crate::{Error, State};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc::channel,
        Arc,
    };

    fn fail() -> Error {
        Error::rejected("Fail!")
    }

    #[test]
    fn test_init_fulfilled() {
        let promise = Promise::<i32>::fulfilled(0);
        assert!(promise.is_fulfilled());
        assert!(!promise.is_pending());
        let (tx, rx) = channel();
        promise.then_do(move |v| tx.send(v).unwrap());
        assert_eq!(rx.try_recv(), Ok(0));
    }

    #[test]
    fn test_init_rejected() {
        let promise = Promise::<i32>::rejected(fail());
        assert!(promise.is_rejected());
        let (tx, rx) = channel();
        promise
            .then_do(|_| panic!("fulfilled a rejected promise"))
            .catch_do(move |e| tx.send(e).unwrap());
        assert_eq!(rx.try_recv(), Ok(fail()));
    }

    #[test]
    fn test_initializer_settles_synchronously() {
        let resolved = Promise::<i32>::new(|resolve, _| {
            resolve(0);
            Ok(())
        });
        assert_eq!(resolved.state(), State::Fulfilled(0));

        let rejected = Promise::<i32>::new(|_, reject| {
            reject(fail());
            Ok(())
        });
        assert_eq!(rejected.state(), State::Rejected(fail()));

        let raised = Promise::<i32>::new(|_, _| Err(fail()));
        assert_eq!(raised.state(), State::Rejected(fail()));
    }

    #[test]
    fn test_settles_once() {
        let promise = Promise::<i32>::new(|resolve, reject| {
            resolve(1);
            resolve(2);
            reject(fail());
            Ok(())
        });
        assert_eq!(promise.state(), State::Fulfilled(1));

        let count = Arc::new(AtomicUsize::new(0));
        let (producer, promise) = Promise::<i32>::pending();
        let seen = count.clone();
        promise.then_do(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        producer.resolve(1);
        producer.resolve(2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(promise.state(), State::Fulfilled(1));
    }

    #[test]
    fn test_raise_after_resolve_keeps_value() {
        let promise = Promise::<i32>::new(|resolve, _| {
            resolve(5);
            Err(fail())
        });
        assert_eq!(promise.state(), State::Fulfilled(5));
    }

    #[test]
    fn test_then_error_passes_through() {
        let promise = Promise::<i32>::rejected(fail())
            .then(|n| Ok(n + 1))
            .then(|n| Ok(n.to_string()));
        assert_eq!(promise.state(), State::Rejected(fail()));
    }

    #[test]
    fn test_catch_value_passes_through() {
        let promise = Promise::<i32>::fulfilled(3).catch(|_| Ok(0));
        assert_eq!(promise.state(), State::Fulfilled(3));
        let promise = Promise::<i32>::fulfilled(3).catch_promise(|_| Ok(Promise::fulfilled(0)));
        assert_eq!(promise.state(), State::Fulfilled(3));
    }

    #[test]
    fn test_catch_raise_rejects() {
        let promise = Promise::<i32>::rejected(fail()).catch(|_| Err(Error::rejected("again")));
        assert_eq!(promise.state(), State::Rejected(Error::rejected("again")));
    }

    #[test]
    fn test_then_promise_adopts_pending() {
        let (producer, inner) = Promise::<i32>::pending();
        let outer = Promise::<i32>::fulfilled(1).then_promise(move |_| Ok(inner));
        assert!(outer.is_pending());
        producer.reject(fail());
        assert_eq!(outer.state(), State::Rejected(fail()));
    }

    #[test]
    fn test_promise_forms_raise_rejects() {
        let derived = Promise::<i32>::fulfilled(1)
            .then_promise(|_| Err::<Promise<i32>, _>(Error::rejected("then")));
        assert_eq!(derived.state(), State::Rejected(Error::rejected("then")));

        let derived =
            Promise::<i32>::rejected(fail()).catch_promise(|_| Err(Error::rejected("catch")));
        assert_eq!(derived.state(), State::Rejected(Error::rejected("catch")));

        let derived = Promise::<i32>::rejected(fail())
            .finally_promise(|| Err::<Promise<i32>, _>(Error::rejected("finally")));
        assert_eq!(derived.state(), State::Rejected(Error::rejected("finally")));
    }

    #[test]
    fn test_finally_promise_adopts_rejection() {
        let (producer, inner) = Promise::<&str>::pending();
        let derived = Promise::<i32>::fulfilled(1).finally_promise(move || Ok(inner));
        assert!(derived.is_pending());
        producer.reject(Error::rejected("inner"));
        assert_eq!(derived.state(), State::Rejected(Error::rejected("inner")));
    }

    #[test]
    fn test_finally_replaces_settlement() {
        let promise = Promise::<i32>::rejected(fail()).finally(|| Ok("done"));
        assert_eq!(promise.state(), State::Fulfilled("done"));
        let promise = Promise::<i32>::fulfilled(1).finally(|| Err::<(), _>(fail()));
        assert_eq!(promise.state(), State::Rejected(fail()));
    }

    #[test]
    fn test_finally_do_keeps_settlement() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let promise = Promise::<i32>::rejected(fail());
        let same = promise.finally_do(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(same.state(), State::Rejected(fail()));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_handler() {
        let promise = Promise::<i32>::fulfilled(42);
        let same = promise.clone();
        let derived = promise.then_promise(move |_| Ok(same));
        assert_eq!(derived.state(), State::Rejected(Error::InvalidHandler));

        let promise = Promise::<i32>::rejected(fail());
        let same = promise.clone();
        let derived = promise.catch_promise(move |_| Ok(same));
        assert_eq!(derived.state(), State::Rejected(Error::InvalidHandler));

        let promise = Promise::<i32>::fulfilled(42);
        let same = promise.clone();
        let derived = promise.finally_promise(move || Ok(same));
        assert_eq!(derived.state(), State::Rejected(Error::InvalidHandler));
    }

    #[test]
    fn test_debug_shows_state() {
        let promise = Promise::<i32>::fulfilled(7);
        assert_eq!(format!("{:?}", promise), "Promise { state: Fulfilled(7) }");
    }
}
