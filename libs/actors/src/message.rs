//! Reified Calls
//!
//! A [`CallEntry`] is one invocation travelling through a queue: the target,
//! the message variant standing in for method identity and arguments, who
//! sent it, which lane it rides and the caller-side completion to reject if
//! the call can never succeed.

use crate::actor::Actor;
use crate::context::Context;
use crate::error::ActorError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Unique actor identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId {
    id: Uuid,
}

impl ActorId {
    /// Create new actor ID
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    /// Create from UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self { id }
    }

    /// Get UUID
    pub fn uuid(&self) -> Uuid {
        self.id
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor-{}", self.id.simple())
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the actor that issued a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderInfo {
    pub id: ActorId,
    pub name: Arc<str>,
    /// Sender prefers a `Blocked` error over waiting on a full queue
    pub fail_fast: bool,
}

/// Opaque routing token attached by a transport to remote-originated calls
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationToken(Bytes);

impl CorrelationToken {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Queue a call is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lane {
    /// Ordinary mailbox
    Mailbox,
    /// Priority queue for continuations, serviced first
    Callback,
}

impl Lane {
    pub fn as_str(self) -> &'static str {
        match self {
            Lane::Mailbox => "mailbox",
            Lane::Callback => "callback",
        }
    }
}

/// Continuation run against an actor's state on its own thread
pub type Continuation<A> = Box<dyn FnOnce(&mut A, &mut Context<'_, A>) + Send>;

/// What the receiver is asked to do
pub enum Payload<A: Actor> {
    /// One variant of the actor's message enum
    Message(A::Message),
    /// A continuation bound to this actor
    Callback(Continuation<A>),
    /// Stop after everything queued ahead of this entry
    Stop,
}

impl<A: Actor> Payload<A> {
    pub fn name(&self) -> &'static str {
        match self {
            Payload::Message(message) => A::message_name(message),
            Payload::Callback(_) => "callback",
            Payload::Stop => "stop",
        }
    }
}

/// Caller-side completion linked to a call, rejected when the call cannot complete
pub trait Link: Send {
    /// `call` describes the failed invocation for anyone who logs the rejection
    fn reject(self: Box<Self>, error: ActorError, call: String);
}

/// One reified invocation
pub struct CallEntry<A: Actor> {
    pub(crate) payload: Payload<A>,
    pub(crate) sender: Option<SenderInfo>,
    pub(crate) receiver: ActorId,
    pub(crate) lane: Lane,
    pub(crate) link: Option<Box<dyn Link>>,
    pub(crate) correlation: Option<CorrelationToken>,
}

impl<A: Actor> CallEntry<A> {
    pub fn new(receiver: ActorId, payload: Payload<A>, lane: Lane) -> Self {
        Self {
            payload,
            sender: None,
            receiver,
            lane,
            link: None,
            correlation: None,
        }
    }

    pub fn with_sender(mut self, sender: Option<SenderInfo>) -> Self {
        self.sender = sender;
        self
    }

    pub fn with_correlation(mut self, token: CorrelationToken) -> Self {
        self.correlation = Some(token);
        self
    }

    /// Link the caller-side completion; only the first link is kept
    pub fn link(&mut self, completion: Box<dyn Link>) -> bool {
        if self.link.is_some() {
            return false;
        }
        self.link = Some(completion);
        true
    }

    pub fn receiver(&self) -> ActorId {
        self.receiver
    }

    pub fn sender(&self) -> Option<&SenderInfo> {
        self.sender.as_ref()
    }

    pub fn lane(&self) -> Lane {
        self.lane
    }

    pub fn is_callback(&self) -> bool {
        self.lane == Lane::Callback
    }

    pub fn has_link(&self) -> bool {
        self.link.is_some()
    }

    pub fn correlation(&self) -> Option<&CorrelationToken> {
        self.correlation.as_ref()
    }

    /// Human readable description for logs
    pub fn describe(&self) -> String {
        describe_call(
            self.payload.name(),
            &self.receiver,
            self.sender.as_ref(),
            self.lane,
        )
    }

    /// Reject the linked completion, if any
    pub(crate) fn reject(self, error: ActorError) {
        if self.link.is_none() {
            return;
        }
        let call = self.describe();
        if let Some(link) = self.link {
            link.reject(error, call);
        }
    }
}

pub(crate) fn describe_call(
    name: &str,
    receiver: &ActorId,
    sender: Option<&SenderInfo>,
    lane: Lane,
) -> String {
    match sender {
        Some(sender) => format!(
            "{} -> {} from {} ({}) via {}",
            name,
            receiver,
            sender.name,
            sender.id,
            lane.as_str()
        ),
        None => format!("{} -> {} from external via {}", name, receiver, lane.as_str()),
    }
}

impl<A: Actor> fmt::Debug for CallEntry<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallEntry")
            .field("payload", &self.payload.name())
            .field("receiver", &self.receiver)
            .field("sender", &self.sender)
            .field("lane", &self.lane)
            .field("linked", &self.link.is_some())
            .field("correlation", &self.correlation)
            .finish()
    }
}
