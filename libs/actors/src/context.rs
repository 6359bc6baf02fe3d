//! Invocation Context
//!
//! Every handler invocation receives a [`Context`] carrying the identity of
//! the running actor and of the caller, plus the operations that need that
//! identity: sending with the right sender, binding continuations to this
//! actor, spawning children, stopping and isolation.

use crate::actor::{Actor, ActorRef, ActorShared, SpawnOptions};
use crate::error::ActorError;
use crate::future::Future;
use crate::message::{ActorId, CorrelationToken, Lane, SenderInfo};
use crate::scheduler::Scheduler;
use crate::signal::{Callback, Signal};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Per-invocation context handed to [`Actor::receive`]
pub struct Context<'a, A: Actor> {
    shared: &'a Arc<ActorShared<A>>,
    sender: Option<SenderInfo>,
    correlation: Option<CorrelationToken>,
    pub(crate) stop_requested: bool,
    pub(crate) isolate_requested: bool,
}

impl<'a, A: Actor> Context<'a, A> {
    pub(crate) fn new(
        shared: &'a Arc<ActorShared<A>>,
        sender: Option<SenderInfo>,
        correlation: Option<CorrelationToken>,
    ) -> Self {
        Self {
            shared,
            sender,
            correlation,
            stop_requested: false,
            isolate_requested: false,
        }
    }

    pub fn id(&self) -> ActorId {
        self.shared.id()
    }

    pub fn name(&self) -> &str {
        self.shared.name()
    }

    /// Handle to the running actor
    pub fn myself(&self) -> ActorRef<A> {
        ActorRef::from_shared(Arc::clone(self.shared))
    }

    /// Actor that sent the current call, `None` for external callers
    pub fn sender(&self) -> Option<&SenderInfo> {
        self.sender.as_ref()
    }

    /// Transport token of a remote-originated call
    pub fn correlation(&self) -> Option<&CorrelationToken> {
        self.correlation.as_ref()
    }

    pub fn scheduler(&self) -> &Scheduler {
        self.shared.scheduler()
    }

    /// Stop after the current invocation; queued calls become dead letters
    pub fn stop(&mut self) {
        self.stop_requested = true;
    }

    /// Move this actor onto its own dispatcher thread after this invocation
    pub fn isolate(&mut self) {
        self.isolate_requested = true;
    }

    /// Prefer `Blocked` errors over waiting when a target queue stays full
    pub fn set_fail_fast(&self, fail_fast: bool) {
        self.shared.set_fail_fast(fail_fast);
    }

    pub fn tell<B: Actor>(&self, target: &ActorRef<B>, message: B::Message) -> Result<(), ActorError> {
        target.send_from(Some(self.shared.sender_info()), message, Lane::Mailbox)
    }

    /// Send on the callback lane, ahead of the target's ordinary mail
    pub fn tell_priority<B: Actor>(
        &self,
        target: &ActorRef<B>,
        message: B::Message,
    ) -> Result<(), ActorError> {
        target.send_from(Some(self.shared.sender_info()), message, Lane::Callback)
    }

    /// Send a request carrying a reply future; the future is rejected if the
    /// call becomes a dead letter or the handler fails
    pub fn ask<B, T, F>(&self, target: &ActorRef<B>, build: F) -> Future<T>
    where
        B: Actor,
        T: Clone + Send + 'static,
        F: FnOnce(Future<T>) -> B::Message,
    {
        target.ask_from(Some(self.shared.sender_info()), build)
    }

    /// Run `f` against this actor's state once `future` settles
    pub fn then<T, F>(&self, future: &Future<T>, f: F)
    where
        T: Clone + Send + 'static,
        F: FnOnce(&mut A, &mut Context<'_, A>, Result<T, ActorError>) + Send + 'static,
    {
        let shared = Arc::clone(self.shared);
        future.on_settled_inline(move |result| {
            let continuation = move |actor: &mut A, ctx: &mut Context<'_, A>| f(actor, ctx, result);
            if let Err(e) = shared.post_continuation(Box::new(continuation)) {
                debug!(actor = %shared.id(), error = %e, "Continuation not delivered");
            }
        });
    }

    /// Signal sink that runs `handler` on this actor for every delivery
    pub fn callback<T, F>(&self, handler: F) -> Callback<T>
    where
        T: Send + 'static,
        F: FnMut(&mut A, &mut Context<'_, A>, Signal<T>) + Send + 'static,
    {
        let shared = Arc::clone(self.shared);
        let handler = Arc::new(Mutex::new(handler));
        Callback::new(move |signal| {
            let handler = Arc::clone(&handler);
            let posted = shared.post_continuation(Box::new(move |actor: &mut A, ctx: &mut Context<'_, A>| {
                let mut handler = handler.lock();
                (*handler)(actor, ctx, signal)
            }));
            if let Err(e) = posted {
                debug!(actor = %shared.id(), error = %e, "Callback not delivered");
            }
        })
    }

    /// Run `f` on this actor after `delay`
    pub fn delayed<F>(&self, delay: Duration, f: F) -> Result<(), ActorError>
    where
        F: FnOnce(&mut A, &mut Context<'_, A>) + Send + 'static,
    {
        let shared = Arc::clone(self.shared);
        self.scheduler().delayed(delay, move || {
            if let Err(e) = shared.post_continuation(Box::new(f)) {
                debug!(actor = %shared.id(), error = %e, "Delayed call not delivered");
            }
        })
    }

    /// Off-load blocking work; subscribe to the result with [`then`](Self::then)
    pub fn run_blocking<T, F>(&self, f: F) -> Future<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> Result<T, ActorError> + Send + 'static,
    {
        self.scheduler().run_blocking(f)
    }

    /// Spawn a child actor on this actor's dispatcher
    pub fn spawn<B: Actor>(&self, actor: B) -> Result<ActorRef<B>, ActorError> {
        self.spawn_with(actor, SpawnOptions::default())
    }

    pub fn spawn_with<B: Actor>(&self, actor: B, options: SpawnOptions) -> Result<ActorRef<B>, ActorError> {
        self.scheduler()
            .spawn_on(actor, options, Some(self.shared.dispatcher_id()))
    }
}

/// Thread-local record of the actor being serviced.
///
/// Futures and actor handles consult it so that subscriptions and sends made
/// inside a handler pick up the running actor's affinity and identity
/// without the caller passing a [`Context`] around. It is an internal detail:
/// dispatchers set it around each invocation and restore the previous value
/// afterwards, which keeps nested cooperative awaits correct.
pub(crate) mod ambient {
    use super::*;
    use std::cell::RefCell;

    /// Something that can run closures on an actor's own thread
    pub(crate) trait CallbackSink: Send + Sync {
        fn actor_id(&self) -> ActorId;

        fn sender_info(&self) -> SenderInfo;

        /// Enqueue `task` on the actor's callback lane
        fn post(&self, task: Box<dyn FnOnce() + Send>) -> Result<(), ActorError>;
    }

    thread_local! {
        static CURRENT: RefCell<Option<Arc<dyn CallbackSink>>> = const { RefCell::new(None) };
    }

    /// Restores the previously current actor on drop
    pub(crate) struct AmbientGuard {
        previous: Option<Arc<dyn CallbackSink>>,
    }

    pub(crate) fn enter(sink: Arc<dyn CallbackSink>) -> AmbientGuard {
        let previous = CURRENT.with(|current| current.borrow_mut().replace(sink));
        AmbientGuard { previous }
    }

    impl Drop for AmbientGuard {
        fn drop(&mut self) {
            let previous = self.previous.take();
            CURRENT.with(|current| *current.borrow_mut() = previous);
        }
    }

    pub(crate) fn current_sink() -> Option<Arc<dyn CallbackSink>> {
        CURRENT.with(|current| current.borrow().clone())
    }

    pub(crate) fn current_sender() -> Option<SenderInfo> {
        CURRENT.with(|current| current.borrow().as_ref().map(|sink| sink.sender_info()))
    }
}

/// Actor currently being serviced on this thread, if any
pub fn current_actor() -> Option<ActorId> {
    ambient::current_sink().map(|sink| sink.actor_id())
}
