//! Signals
//!
//! The primitive under [`Future`](crate::Future): one delivery that is either a
//! streamed item, a successful terminal result or a terminal rejection.
//! [`Callback`] is a plain signal sink that can travel inside messages.

use crate::error::ActorError;
use crate::future::Future;
use std::fmt;
use std::sync::Arc;

/// One delivery on a completion channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal<T> {
    /// Streamed item, more will follow
    Next(T),
    /// Terminal success
    Resolved(T),
    /// Terminal failure
    Rejected(ActorError),
}

impl<T> Signal<T> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Signal::Next(_))
    }

    /// Terminal settlement carried by this signal
    pub fn settlement(&self) -> Option<Result<T, ActorError>>
    where
        T: Clone,
    {
        match self {
            Signal::Next(_) => None,
            Signal::Resolved(value) => Some(Ok(value.clone())),
            Signal::Rejected(error) => Some(Err(error.clone())),
        }
    }

    pub fn error(&self) -> Option<&ActorError> {
        match self {
            Signal::Rejected(error) => Some(error),
            _ => None,
        }
    }
}

impl<T> From<Result<T, ActorError>> for Signal<T> {
    fn from(result: Result<T, ActorError>) -> Self {
        match result {
            Ok(value) => Signal::Resolved(value),
            Err(error) => Signal::Rejected(error),
        }
    }
}

/// Clonable signal sink passed to other actors or the blocking pool
pub struct Callback<T> {
    sink: Arc<dyn Fn(Signal<T>) + Send + Sync>,
}

impl<T: Send + 'static> Callback<T> {
    /// Callback that runs `f` on whichever thread completes it
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Signal<T>) + Send + Sync + 'static,
    {
        Self { sink: Arc::new(f) }
    }

    pub fn complete(&self, signal: Signal<T>) {
        (self.sink)(signal);
    }

    pub fn stream(&self, value: T) {
        self.complete(Signal::Next(value));
    }

    pub fn resolve(&self, value: T) {
        self.complete(Signal::Resolved(value));
    }

    pub fn reject(&self, error: ActorError) {
        self.complete(Signal::Rejected(error));
    }
}

impl<T> Clone for Callback<T> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<T> fmt::Debug for Callback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback").finish_non_exhaustive()
    }
}

impl<T: Clone + Send + 'static> From<Future<T>> for Callback<T> {
    fn from(future: Future<T>) -> Self {
        Callback::new(move |signal| {
            future.complete(signal);
        })
    }
}
