//! Actors and Actor Handles
//!
//! An actor is plain state plus a closed message enum. The runtime pairs it
//! with an [`ActorShared`] record (queues, stopped flag, owning dispatcher)
//! that producers reach through [`ActorRef`], while the state itself lives in
//! an [`ActorCell`] owned by exactly one dispatcher thread at a time.

use crate::context::{ambient, Context};
use crate::dispatcher::{DispatcherId, Polled, Schedulable};
use crate::error::{ActorError, Outcome};
use crate::future::Future;
use crate::mailbox::QueuePair;
use crate::message::{describe_call, ActorId, CallEntry, Continuation, Lane, Payload, SenderInfo};
use crate::scheduler::Scheduler;
use crate::status::ActorStatus;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Behaviour of an actor: one handler over a closed set of messages
pub trait Actor: Send + Sized + 'static {
    /// One variant per operation the actor offers
    type Message: Send + 'static;

    /// Handle one message
    fn receive(&mut self, message: Self::Message, ctx: &mut Context<'_, Self>) -> Outcome;

    /// Called on the owning dispatcher before the first message
    fn started(&mut self, _ctx: &mut Context<'_, Self>) {}

    /// Called once after the actor stops
    fn stopped(&mut self) {}

    /// Name of a message variant, used in logs and dead-letter records
    fn message_name(_message: &Self::Message) -> &'static str {
        "message"
    }
}

/// Options for spawning an actor
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    /// Display name, defaults to the actor id
    pub name: Option<String>,
    /// Per-queue capacity, defaults to the configured capacity
    pub queue_capacity: Option<usize>,
    /// Run on a dedicated, isolated dispatcher thread
    pub dedicated: bool,
    /// Fail fast with `Blocked` instead of waiting on full target queues
    pub fail_fast: bool,
}

impl SpawnOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    pub fn dedicated(mut self) -> Self {
        self.dedicated = true;
        self
    }

    pub fn fail_fast(mut self) -> Self {
        self.fail_fast = true;
        self
    }
}

/// State of an actor reachable from any thread
pub struct ActorShared<A: Actor> {
    id: ActorId,
    name: Arc<str>,
    pub(crate) queues: QueuePair<A>,
    stopped: AtomicBool,
    fail_fast: AtomicBool,
    dispatcher: AtomicU64,
    scheduler: Scheduler,
}

impl<A: Actor> ActorShared<A> {
    pub(crate) fn new(name: Option<String>, capacity: usize, fail_fast: bool, scheduler: Scheduler) -> Self {
        let id = ActorId::new();
        let name: Arc<str> = match name {
            Some(name) => name.into(),
            None => id.to_string().into(),
        };
        Self {
            id,
            name,
            queues: QueuePair::new(capacity),
            stopped: AtomicBool::new(false),
            fail_fast: AtomicBool::new(fail_fast),
            dispatcher: AtomicU64::new(0),
            scheduler,
        }
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub(crate) fn mark_stopped(&self) -> bool {
        !self.stopped.swap(true, Ordering::AcqRel)
    }

    pub fn fail_fast(&self) -> bool {
        self.fail_fast.load(Ordering::Relaxed)
    }

    pub fn set_fail_fast(&self, fail_fast: bool) {
        self.fail_fast.store(fail_fast, Ordering::Relaxed);
    }

    pub(crate) fn dispatcher_id(&self) -> DispatcherId {
        self.dispatcher.load(Ordering::Acquire)
    }

    pub(crate) fn set_dispatcher(&self, id: DispatcherId) {
        self.dispatcher.store(id, Ordering::Release);
    }

    pub(crate) fn sender_info(&self) -> SenderInfo {
        SenderInfo {
            id: self.id,
            name: Arc::clone(&self.name),
            fail_fast: self.fail_fast(),
        }
    }

    /// Queue a continuation on this actor's callback lane
    pub(crate) fn post_continuation(&self, continuation: Continuation<A>) -> Result<(), ActorError> {
        let entry = CallEntry::new(self.id, Payload::Callback(continuation), Lane::Callback)
            .with_sender(ambient::current_sender());
        self.scheduler.put(self, entry)
    }

    pub fn status(&self) -> ActorStatus {
        ActorStatus {
            id: self.id,
            name: self.name.to_string(),
            mailbox_len: self.queues.mailbox_len(),
            callback_len: self.queues.callback_len(),
            capacity: self.queues.capacity(),
            load_percent: self.queues.load_percent(),
            stopped: self.is_stopped(),
            dispatcher: self.dispatcher_id(),
        }
    }
}

impl<A: Actor> ambient::CallbackSink for ActorShared<A> {
    fn actor_id(&self) -> ActorId {
        self.id
    }

    fn sender_info(&self) -> SenderInfo {
        ActorShared::sender_info(self)
    }

    fn post(&self, task: Box<dyn FnOnce() + Send>) -> Result<(), ActorError> {
        self.post_continuation(Box::new(move |_: &mut A, _: &mut Context<'_, A>| task()))
    }
}

/// Clonable handle used to send calls to an actor
pub struct ActorRef<A: Actor> {
    shared: Arc<ActorShared<A>>,
}

impl<A: Actor> Clone for ActorRef<A> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<A: Actor> ActorRef<A> {
    pub(crate) fn from_shared(shared: Arc<ActorShared<A>>) -> Self {
        Self { shared }
    }

    pub(crate) fn shared(&self) -> &Arc<ActorShared<A>> {
        &self.shared
    }

    pub fn id(&self) -> ActorId {
        self.shared.id()
    }

    pub fn name(&self) -> &str {
        self.shared.name()
    }

    /// Fire-and-forget send; waits while the mailbox is full
    pub fn tell(&self, message: A::Message) -> Result<(), ActorError> {
        self.send_from(ambient::current_sender(), message, Lane::Mailbox)
    }

    /// Send on the callback lane, serviced ahead of ordinary mail
    pub fn tell_priority(&self, message: A::Message) -> Result<(), ActorError> {
        self.send_from(ambient::current_sender(), message, Lane::Callback)
    }

    /// Single non-blocking offer, `MailboxFull` if there is no room
    pub fn try_tell(&self, message: A::Message) -> Result<(), ActorError> {
        let entry = CallEntry::new(self.id(), Payload::Message(message), Lane::Mailbox)
            .with_sender(ambient::current_sender());
        self.shared.scheduler.try_put(&self.shared, entry)
    }

    /// Send a request whose message carries the reply future
    pub fn ask<T, F>(&self, build: F) -> Future<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce(Future<T>) -> A::Message,
    {
        self.ask_from(ambient::current_sender(), build)
    }

    /// Ask the actor to stop once everything queued before this request is handled
    pub fn stop(&self) -> Result<(), ActorError> {
        let entry = CallEntry::new(self.id(), Payload::Stop, Lane::Mailbox)
            .with_sender(ambient::current_sender());
        self.shared.scheduler.put(&self.shared, entry)
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }

    pub fn set_fail_fast(&self, fail_fast: bool) {
        self.shared.set_fail_fast(fail_fast);
    }

    /// Point-in-time queue snapshot
    pub fn status(&self) -> ActorStatus {
        self.shared.status()
    }

    pub(crate) fn send_from(
        &self,
        sender: Option<SenderInfo>,
        message: A::Message,
        lane: Lane,
    ) -> Result<(), ActorError> {
        self.shared.scheduler.enqueue_call(sender, self, message, lane)
    }

    pub(crate) fn ask_from<T, F>(&self, sender: Option<SenderInfo>, build: F) -> Future<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce(Future<T>) -> A::Message,
    {
        let reply = Future::new();
        let mut entry = CallEntry::new(self.id(), Payload::Message(build(reply.clone())), Lane::Mailbox)
            .with_sender(sender);
        entry.link(Box::new(reply.clone()));
        // A refused enqueue has already rejected the reply
        let _ = self.shared.scheduler.put(&self.shared, entry);
        reply
    }
}

impl<A: Actor> fmt::Debug for ActorRef<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRef")
            .field("id", &self.shared.id())
            .field("name", &self.shared.name())
            .finish()
    }
}

impl<A: Actor> PartialEq for ActorRef<A> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl<A: Actor> Eq for ActorRef<A> {}

/// Actor state owned by the dispatcher currently running it
pub(crate) struct ActorCell<A: Actor> {
    actor: A,
    shared: Arc<ActorShared<A>>,
    started: bool,
    finished: bool,
}

impl<A: Actor> ActorCell<A> {
    pub(crate) fn new(actor: A, shared: Arc<ActorShared<A>>) -> Self {
        Self {
            actor,
            shared,
            started: false,
            finished: false,
        }
    }

    fn start(&mut self) {
        self.started = true;
        let _ambient = ambient::enter(self.shared.clone());
        let mut ctx = Context::new(&self.shared, None, None);
        let actor = &mut self.actor;
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| actor.started(&mut ctx))) {
            let error = ActorError::from_panic(panic.as_ref());
            warn!(actor = %self.shared.id(), error = %error, "Start hook panicked");
        }
        if ctx.stop_requested {
            self.shared.mark_stopped();
        }
    }
}

impl<A: Actor> Schedulable for ActorCell<A> {
    fn id(&self) -> ActorId {
        self.shared.id()
    }

    fn name(&self) -> &str {
        self.shared.name()
    }

    fn attach(&mut self, dispatcher: DispatcherId) {
        self.shared.set_dispatcher(dispatcher);
    }

    fn poll_once(&mut self) -> Polled {
        if !self.started {
            self.start();
        }
        if self.shared.is_stopped() {
            return Polled::Stopped;
        }

        let Some(entry) = self.shared.queues.pop() else {
            return Polled::Idle;
        };

        let CallEntry {
            payload,
            sender,
            receiver,
            lane,
            link,
            correlation,
        } = entry;
        let call_name = payload.name();

        let _ambient = ambient::enter(self.shared.clone());
        let mut ctx = Context::new(&self.shared, sender, correlation);
        let started = Instant::now();
        let actor = &mut self.actor;

        let result = catch_unwind(AssertUnwindSafe(|| match payload {
            Payload::Message(message) => actor.receive(message, &mut ctx),
            Payload::Callback(continuation) => {
                continuation(actor, &mut ctx);
                Outcome::Success
            }
            Payload::Stop => Outcome::ActorStopped,
        }));

        let metrics = self.shared.scheduler().metrics();
        metrics.record_message_handled(started.elapsed());

        let outcome = result.unwrap_or_else(|panic| {
            metrics.record_panic();
            Outcome::Failure(ActorError::from_panic(panic.as_ref()))
        });

        match outcome {
            Outcome::Success => {}
            Outcome::Failure(error) => {
                metrics.record_failure();
                let call = describe_call(call_name, &receiver, ctx.sender(), lane);
                match link {
                    Some(link) => link.reject(error, call),
                    None => warn!(call = %call, error = %error, "Unhandled invocation failure"),
                }
            }
            Outcome::ActorStopped => ctx.stop_requested = true,
        }

        if ctx.stop_requested {
            self.shared.mark_stopped();
            return Polled::Stopped;
        }
        Polled::Processed {
            isolate: ctx.isolate_requested,
        }
    }

    fn load_percent(&self) -> u32 {
        self.shared.queues.load_percent()
    }

    fn queued(&self) -> usize {
        self.shared.queues.len()
    }

    fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }

    fn shutdown(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.shared.mark_stopped();

        for entry in self.shared.queues.drain() {
            self.shared.scheduler().dead_letter(&self.shared, entry);
        }

        if self.started {
            let actor = &mut self.actor;
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| actor.stopped())) {
                let error = ActorError::from_panic(panic.as_ref());
                warn!(actor = %self.shared.id(), error = %error, "Stop hook panicked");
            }
        }
        debug!(actor = %self.shared.id(), name = %self.shared.name(), "Actor stopped");
    }
}
