//! Runtime Error Types
//!
//! Failures that travel through the runtime: rejected futures, refused
//! enqueues and handler failures. Errors are `Clone` so one rejection can be
//! delivered to every subscriber of a future.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, ActorError>;

/// Main runtime error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActorError {
    /// Target actor had already stopped, the call was never invoked
    #[error("Dead letter: {message} sent to stopped actor {target}")]
    DeadLetter { target: String, message: String },

    /// Sender opted into fail-fast and the target queue stayed full
    #[error("Blocked: {queue} queue of {target} is full")]
    Blocked { target: String, queue: String },

    /// Non-blocking offer found the queue full
    #[error("Mailbox full: {target}")]
    MailboxFull { target: String },

    /// Handler reported a failure
    #[error("Invocation failed: {0}")]
    Failure(String),

    /// Handler panicked, the dispatcher survived
    #[error("Handler panicked: {0}")]
    Panicked(String),

    /// Await gave up waiting
    #[error("Timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Runtime service could not be reached (blocking pool, timer, shut down scheduler)
    #[error("Unavailable: {0}")]
    Unavailable(String),
}

impl ActorError {
    /// Create a dead letter error
    pub fn dead_letter(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DeadLetter {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create a blocked error
    pub fn blocked(target: impl Into<String>, queue: impl Into<String>) -> Self {
        Self::Blocked {
            target: target.into(),
            queue: queue.into(),
        }
    }

    /// Create a mailbox full error
    pub fn mailbox_full(target: impl Into<String>) -> Self {
        Self::MailboxFull {
            target: target.into(),
        }
    }

    /// Create a failure error
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure(message.into())
    }

    /// Create an unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Build a panic error from a caught unwind payload
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked(message)
    }

    pub fn is_dead_letter(&self) -> bool {
        matches!(self, Self::DeadLetter { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Check if retrying the same call could succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Blocked { .. } | Self::MailboxFull { .. } | Self::Timeout(_)
        )
    }
}

/// What an actor handler reports back to its dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Message handled
    Success,
    /// Handler failed; rejects the linked future or is logged
    Failure(ActorError),
    /// Actor terminates itself; a lifecycle transition, not an error
    ActorStopped,
}

impl Outcome {
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure(ActorError::failure(message))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl<E: std::fmt::Display> From<std::result::Result<(), E>> for Outcome {
    fn from(result: std::result::Result<(), E>) -> Self {
        match result {
            Ok(()) => Outcome::Success,
            Err(e) => Outcome::Failure(ActorError::failure(e.to_string())),
        }
    }
}
