use crate::{callback::Callback, state::lock, Promise};
use std::sync::{Arc, Mutex};

/// Results gathered so far by one `Promise::all` call.
struct Gather<T> {
    slots: Vec<Option<T>>,
    remaining: usize,
}

impl<T> Gather<T> {
    fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| None).collect(),
            remaining: len,
        }
    }

    /// Stores the value for `index`, handing back every value once the last
    /// slot is filled.
    fn fill(&mut self, index: usize, value: T) -> Option<Vec<T>> {
        if self.slots[index].replace(value).is_none() {
            self.remaining -= 1;
        }
        if self.remaining > 0 {
            return None;
        }
        self.slots.iter_mut().map(Option::take).collect()
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Fulfills with every value, in input order, once all `promises` have
    /// fulfilled, or rejects with the first error seen. Later results are
    /// dropped. An empty input fulfills right away with an empty `Vec`.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_chain::Promise;
    ///
    /// let all = Promise::<&str>::all([Promise::fulfilled("foo"), Promise::fulfilled("bar")]);
    /// assert_eq!(all.state(), promise_chain::State::Fulfilled(vec!["foo", "bar"]));
    /// ```
    pub fn all<I>(promises: I) -> Promise<Vec<T>, E>
    where
        I: IntoIterator<Item = Promise<T, E>>,
    {
        let promises: Vec<_> = promises.into_iter().collect();
        if promises.is_empty() {
            return Promise::fulfilled(Vec::new());
        }

        let (producer, aggregate) = Promise::pending();
        let gather = Arc::new(Mutex::new(Gather::new(promises.len())));
        for (index, promise) in promises.iter().enumerate() {
            let resolver = producer.clone();
            let rejecter = producer.clone();
            let gather = gather.clone();
            promise.register(Callback::new(
                move |value| {
                    if resolver.is_settled() {
                        return;
                    }
                    let finished = lock(&gather).fill(index, value);
                    if let Some(values) = finished {
                        tracing::trace!(count = values.len(), "all promises fulfilled");
                        resolver.resolve(values);
                    }
                },
                move |error| rejecter.reject(error),
            ));
        }
        aggregate
    }
}
