/// A one-shot continuation over the owning promise's outcome. It runs at most
/// once, when that promise settles.
pub(crate) struct Callback<T, E>(Box<dyn FnOnce(Result<T, E>) + Send>);

impl<T: 'static, E: 'static> Callback<T, E> {
    /// A pair of continuations: exactly one of them runs.
    pub(crate) fn new(
        on_fulfill: impl FnOnce(T) + Send + 'static,
        on_reject: impl FnOnce(E) + Send + 'static,
    ) -> Self {
        Self::settled(move |outcome| match outcome {
            Ok(value) => on_fulfill(value),
            Err(error) => on_reject(error),
        })
    }

    /// A single continuation that sees the whole outcome.
    pub(crate) fn settled(handler: impl FnOnce(Result<T, E>) + Send + 'static) -> Self {
        Self(Box::new(handler))
    }

    pub(crate) fn fire(self, outcome: Result<T, E>) {
        (self.0)(outcome)
    }
}
