//! A promise holds a value, or an error, that becomes known at some later
//! point. Handlers chained with `then`, `catch` and `finally` run once the
//! promise settles, and `Promise::all` gathers many promises into one.
//!
//! Nothing here spawns threads or owns an executor. Whoever holds the
//! `resolve`/`reject` entry points settles the promise, from whatever thread
//! they like.
//!
//! # Examples
//!
//! ```
//! use promise_chain::{Error, Promise};
//! use std::sync::mpsc::channel;
//!
//! let (tx, rx) = channel();
//! Promise::<i32>::new(|resolve, _reject| {
//!     resolve(20);
//!     Ok(())
//! })
//! .then(|n| Ok(n + 1))
//! .then(|n| Ok(n * 2))
//! .then_do(move |n| tx.send(n).unwrap())
//! .catch_do(|e: Error| panic!("unexpected {e}"));
//! assert_eq!(rx.recv().unwrap(), 42);
//! ```
mod all;
mod callback;
pub mod future;
mod promise;
mod state;
mod trampoline;

pub use future::Settled;
pub use promise::{Promise, Reject, Resolve};
pub use state::{Producer, State};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A handler returned the very promise it was registered on.
    #[error("invalid handler: it returned the promise it was attached to")]
    InvalidHandler,
    /// Every producer was dropped before the promise settled.
    #[error("producer dropped before settling the promise")]
    ProducerDropped,
    #[error("{0}")]
    Rejected(String),
}

impl Error {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Error::Rejected(reason.into())
    }
}
