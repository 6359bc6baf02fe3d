//! Scheduler
//!
//! Owns the dispatcher pool and is the only path by which a call reaches an
//! actor's queues. It places new actors on dispatchers according to the
//! configured policy, performs the backpressured enqueue, keeps the
//! dead-letter log and moves actors between dispatchers when one of them
//! asks to split, consolidate, retire or isolate.
//!
//! ## Placement Policies
//! - **Single**: every shared actor lives on one dispatcher thread
//! - **Elastic**: the least loaded dispatcher under the load hint is reused,
//!   otherwise a new one is started up to `max_dispatchers`
//!
//! Dedicated (isolated) dispatchers sit outside both policies: they own one
//! actor and never receive others.
//!
//! ## Backpressure
//!
//! A full queue never drops a call. The producer backs off through the shared
//! [`BackOffStrategy`] and retries until the target has room or stops, in
//! which case the call becomes a dead letter. Past the sleeping threshold a
//! fail-fast sender gets [`ActorError::Blocked`]; everyone else keeps
//! waiting, with one warning per stalled attempt.
//!
//! # Lock Ordering
//!
//! Pool changes (placement, hand-off, rebalance, retire) all happen under the
//! `dispatchers` lock so a dispatcher can never retire while an actor is
//! being handed to it. The `dead_letters` lock is a leaf and is never held
//! while acquiring another.
//!
//! Dispatcher threads hold a clone of the scheduler, so the pool stays alive
//! until [`Scheduler::shutdown`] is called.

use crate::actor::{Actor, ActorCell, ActorRef, ActorShared, SpawnOptions};
use crate::backoff::{BackOffStrategy, Clock, SystemClock};
use crate::dispatcher::{active_dispatchers, DispatcherHandle, DispatcherId, LocalDispatcher, Schedulable};
use crate::error::ActorError;
use crate::future::Future;
use crate::message::{ActorId, CallEntry, CorrelationToken, Lane, Payload, SenderInfo};
use crate::metrics::RuntimeMetrics;
use crate::signal::Callback;
use crate::status::{DeadLetter, SchedulerStatus};
use crate::timer;
use parking_lot::Mutex;
use runtime_config::defaults;
use runtime_config::{DispatcherPolicyKind, RuntimeConfig};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

static NEXT_DISPATCHER_ID: AtomicU64 = AtomicU64::new(1);

/// How shared actors are spread across dispatcher threads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherPolicy {
    Single,
    Elastic { max_dispatchers: usize },
}

impl DispatcherPolicy {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        match config.dispatcher.policy {
            DispatcherPolicyKind::Single => DispatcherPolicy::Single,
            DispatcherPolicyKind::Elastic => DispatcherPolicy::Elastic {
                max_dispatchers: config.effective_max_dispatchers().max(1),
            },
        }
    }
}

struct SchedulerInner {
    config: RuntimeConfig,
    backoff: BackOffStrategy,
    clock: Arc<dyn Clock>,
    policy: DispatcherPolicy,
    queue_capacity: usize,
    dispatchers: Mutex<Vec<Arc<DispatcherHandle>>>,
    dead_letters: Mutex<VecDeque<DeadLetter>>,
    metrics: RuntimeMetrics,
    shut_down: AtomicBool,
}

/// Handle to the runtime: cheap to clone, shared by every actor it spawns
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RuntimeConfig, clock: Arc<dyn Clock>) -> Self {
        let backoff = BackOffStrategy::from_settings(&config.backoff);
        Self::with_parts(config, backoff, clock)
    }

    /// Build with an explicit backoff strategy and clock
    pub fn with_parts(config: RuntimeConfig, backoff: BackOffStrategy, clock: Arc<dyn Clock>) -> Self {
        let policy = DispatcherPolicy::from_config(&config);
        let queue_capacity = config.effective_queue_capacity();
        info!(?policy, queue_capacity, "Creating scheduler");
        Self {
            inner: Arc::new(SchedulerInner {
                config,
                backoff,
                clock,
                policy,
                queue_capacity,
                dispatchers: Mutex::new(Vec::new()),
                dead_letters: Mutex::new(VecDeque::new()),
                metrics: RuntimeMetrics::default(),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn backoff(&self) -> &BackOffStrategy {
        &self.inner.backoff
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.inner.clock)
    }

    pub fn metrics(&self) -> &RuntimeMetrics {
        &self.inner.metrics
    }

    pub fn policy(&self) -> DispatcherPolicy {
        self.inner.policy
    }

    pub fn default_queue_capacity(&self) -> usize {
        self.inner.queue_capacity
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    // ----- placement -----

    /// Dispatcher a new actor with the given expected load should join
    pub fn assign_dispatcher(&self, load_hint: u32) -> Result<Arc<DispatcherHandle>, ActorError> {
        let mut dispatchers = self.inner.dispatchers.lock();
        self.assign_locked(&mut dispatchers, load_hint)
    }

    fn assign_locked(
        &self,
        dispatchers: &mut Vec<Arc<DispatcherHandle>>,
        load_hint: u32,
    ) -> Result<Arc<DispatcherHandle>, ActorError> {
        match self.inner.policy {
            DispatcherPolicy::Single => {
                let existing = dispatchers.iter().find(|d| shares_actors(d)).cloned();
                match existing {
                    Some(dispatcher) => Ok(dispatcher),
                    None => self.start_locked(dispatchers, false),
                }
            }
            DispatcherPolicy::Elastic { max_dispatchers } => {
                let least = least_loaded(dispatchers.iter().filter(|d| shares_actors(d)));
                if let Some(dispatcher) = &least {
                    if dispatcher.load_percent() < load_hint {
                        return Ok(Arc::clone(dispatcher));
                    }
                }
                if shared_count(dispatchers) < max_dispatchers {
                    return self.start_locked(dispatchers, false);
                }
                match least {
                    Some(dispatcher) => Ok(dispatcher),
                    None => self.start_locked(dispatchers, false),
                }
            }
        }
    }

    fn start_locked(
        &self,
        dispatchers: &mut Vec<Arc<DispatcherHandle>>,
        isolated: bool,
    ) -> Result<Arc<DispatcherHandle>, ActorError> {
        if self.is_shut_down() {
            return Err(ActorError::unavailable("scheduler is shut down"));
        }
        let id = NEXT_DISPATCHER_ID.fetch_add(1, Ordering::Relaxed);
        // The single shared thread lives until shutdown
        let auto_shutdown = isolated || !matches!(self.inner.policy, DispatcherPolicy::Single);
        let handle = DispatcherHandle::start(self.clone(), id, isolated, auto_shutdown)?;
        dispatchers.push(Arc::clone(&handle));
        self.inner.metrics.record_dispatcher_started();
        debug!(dispatcher = %handle.name(), isolated, pool = dispatchers.len(), "Dispatcher created");
        Ok(handle)
    }

    /// Spawn an actor on a dispatcher chosen by the placement policy
    pub fn spawn<A: Actor>(&self, actor: A) -> Result<ActorRef<A>, ActorError> {
        self.spawn_with(actor, SpawnOptions::default())
    }

    pub fn spawn_with<A: Actor>(&self, actor: A, options: SpawnOptions) -> Result<ActorRef<A>, ActorError> {
        self.spawn_on(actor, options, None)
    }

    /// Spawn, preferring `preferred` when it still accepts shared actors
    pub(crate) fn spawn_on<A: Actor>(
        &self,
        actor: A,
        options: SpawnOptions,
        preferred: Option<DispatcherId>,
    ) -> Result<ActorRef<A>, ActorError> {
        let capacity = match options.queue_capacity {
            Some(capacity) => capacity
                .clamp(1, defaults::queues::MAX_QUEUE_CAPACITY)
                .next_power_of_two(),
            None => self.inner.queue_capacity,
        };
        let dedicated = options.dedicated;
        let shared = Arc::new(ActorShared::new(
            options.name,
            capacity,
            options.fail_fast,
            self.clone(),
        ));
        let mut cell: Box<dyn Schedulable> = Box::new(ActorCell::new(actor, Arc::clone(&shared)));

        let mut dispatchers = self.inner.dispatchers.lock();
        let mut target = if dedicated {
            self.start_locked(&mut dispatchers, true)?
        } else {
            let preferred = preferred.and_then(|id| {
                dispatchers
                    .iter()
                    .find(|d| d.id() == id && shares_actors(d))
                    .cloned()
            });
            match preferred {
                Some(dispatcher) => dispatcher,
                None => self.assign_locked(&mut dispatchers, defaults::dispatcher::ASSIGN_LOAD_HINT_PERCENT)?,
            }
        };

        let mut attempts = 0;
        loop {
            match target.hand_off(cell) {
                Ok(()) => break,
                Err(returned) if attempts == 0 => {
                    attempts += 1;
                    cell = returned;
                    target = self.start_locked(&mut dispatchers, dedicated)?;
                }
                Err(_) => {
                    return Err(ActorError::unavailable(format!(
                        "no dispatcher accepted actor {}",
                        shared.name()
                    )))
                }
            }
        }
        drop(dispatchers);

        self.inner.metrics.record_spawn();
        debug!(actor = %shared.id(), name = %shared.name(), dispatcher = %target.name(), capacity, "Actor spawned");
        Ok(ActorRef::from_shared(shared))
    }

    // ----- enqueue -----

    /// Turn a call into a queued entry on `receiver`
    pub fn enqueue_call<A: Actor>(
        &self,
        sender: Option<SenderInfo>,
        receiver: &ActorRef<A>,
        message: A::Message,
        lane: Lane,
    ) -> Result<(), ActorError> {
        let entry = CallEntry::new(receiver.id(), Payload::Message(message), lane).with_sender(sender);
        self.put(receiver.shared(), entry)
    }

    /// Like [`enqueue_call`](Self::enqueue_call) for calls arriving over a transport
    pub fn enqueue_call_from_remote<A: Actor>(
        &self,
        token: CorrelationToken,
        sender: Option<SenderInfo>,
        receiver: &ActorRef<A>,
        message: A::Message,
        lane: Lane,
    ) -> Result<(), ActorError> {
        let entry = CallEntry::new(receiver.id(), Payload::Message(message), lane)
            .with_sender(sender)
            .with_correlation(token);
        self.put(receiver.shared(), entry)
    }

    /// Backpressured enqueue.
    ///
    /// On a dispatcher thread a full queue is never simply waited on when
    /// waiting cannot end: a receiver whose turn is on this thread's stack
    /// takes the entry as overflow, a receiver present on this dispatcher is
    /// serviced inline, and once the wait turns to sleeping the other actors
    /// here move to a fresh dispatcher so the stall only holds the sender.
    pub(crate) fn put<A: Actor>(&self, target: &ActorShared<A>, entry: CallEntry<A>) -> Result<(), ActorError> {
        if target.is_stopped() {
            return Err(self.dead_letter(target, entry));
        }

        let call = entry.payload.name();
        let mut entry = match target.queues.offer(entry) {
            Ok(()) => return self.after_offer(target, call),
            Err(entry) => entry,
        };
        self.inner.metrics.record_queue_full();

        let local = LocalDispatcher::current();
        if let Some(local) = &local {
            if local.is_busy(target.id()) {
                debug!(call = %entry.describe(), "Queue full and its consumer is mid-turn on this thread, overflowing");
                target.queues.overflow_push(entry);
                return self.after_offer(target, call);
            }
        }

        let fail_fast = entry.sender().map(|sender| sender.fail_fast).unwrap_or(false);
        let warn_after = self.inner.config.dispatcher.blocked_warn();
        let started = self.inner.clock.now();
        let mut attempt: u64 = 0;
        let mut warned = false;
        let mut relieved = false;

        loop {
            if let Some(local) = &local {
                if local.poll_actor(target.id()) {
                    attempt = 0;
                }
            }
            self.inner.backoff.idle(attempt);
            attempt = attempt.saturating_add(1);

            if target.is_stopped() {
                return Err(self.dead_letter(target, entry));
            }
            entry = match target.queues.offer(entry) {
                Ok(()) => return self.after_offer(target, call),
                Err(entry) => entry,
            };
            if !self.inner.backoff.is_sleeping(attempt) {
                continue;
            }

            if fail_fast {
                self.inner.metrics.record_blocked();
                let error = ActorError::blocked(target.name(), entry.lane().as_str());
                debug!(call = %entry.describe(), "Fail-fast sender refused to wait");
                entry.reject(error.clone());
                return Err(error);
            }
            if let (Some(local), false) = (&local, relieved) {
                relieved = true;
                self.relieve(local);
            }
            let waited = self.inner.clock.now().saturating_duration_since(started);
            if !warned && waited >= warn_after {
                warned = true;
                self.inner.metrics.record_stall_warning();
                warn!(
                    call = %entry.describe(),
                    waited_ms = waited.as_millis() as u64,
                    "Enqueue stalled on a full queue"
                );
            }
        }
    }

    /// Catch entries that landed after the target's final drain
    fn after_offer<A: Actor>(&self, target: &ActorShared<A>, call: &'static str) -> Result<(), ActorError> {
        if !target.is_stopped() {
            return Ok(());
        }
        for entry in target.queues.drain() {
            self.dead_letter(target, entry);
        }
        Err(ActorError::dead_letter(target.name(), call))
    }

    /// Single non-blocking offer
    pub(crate) fn try_put<A: Actor>(&self, target: &ActorShared<A>, entry: CallEntry<A>) -> Result<(), ActorError> {
        if target.is_stopped() {
            return Err(self.dead_letter(target, entry));
        }
        let call = entry.payload.name();
        match target.queues.offer(entry) {
            Ok(()) => self.after_offer(target, call),
            Err(entry) => {
                self.inner.metrics.record_queue_full();
                let error = ActorError::mailbox_full(target.name());
                entry.reject(error.clone());
                Err(error)
            }
        }
    }

    /// Record a call that can never be delivered and reject its link
    pub(crate) fn dead_letter<A: Actor>(&self, target: &ActorShared<A>, entry: CallEntry<A>) -> ActorError {
        let message = entry.payload.name();
        info!(target: "actor_runtime::dead_letters", call = %entry.describe(), "Dead letter");
        self.inner.metrics.record_dead_letter();

        let capacity = self.inner.config.dead_letter_capacity;
        if capacity > 0 {
            let record = DeadLetter {
                target: target.id(),
                target_name: target.name().to_string(),
                message: message.to_string(),
                sender: entry.sender().map(|sender| sender.id),
                at: SystemTime::now(),
            };
            let mut letters = self.inner.dead_letters.lock();
            while letters.len() >= capacity {
                letters.pop_front();
            }
            letters.push_back(record);
        }

        let error = ActorError::dead_letter(target.name(), message);
        entry.reject(error.clone());
        error
    }

    /// Most recent dead letters, oldest first
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner.dead_letters.lock().iter().cloned().collect()
    }

    // ----- pool maintenance, called from the dispatcher's own thread -----

    /// Move about half of an overloaded dispatcher's actors elsewhere
    pub(crate) fn rebalance(&self, local: &LocalDispatcher) {
        let DispatcherPolicy::Elastic { max_dispatchers } = self.inner.policy else {
            return;
        };
        let source = local.handle();
        if source.is_isolated() {
            return;
        }

        let mut loads = local.actor_loads();
        if loads.len() < 2 {
            return;
        }
        // Alternate by load so the busiest actor stays and the rest split evenly
        loads.sort_by(|a, b| b.1.cmp(&a.1));
        let movers: Vec<ActorId> = loads.iter().skip(1).step_by(2).map(|(id, _)| *id).collect();

        let threshold = self.inner.config.dispatcher.rebalance_threshold_percent;
        let mut dispatchers = self.inner.dispatchers.lock();
        let candidate = least_loaded(
            dispatchers
                .iter()
                .filter(|d| d.id() != source.id() && shares_actors(d) && d.load_percent() < threshold / 2),
        );
        let target = match candidate {
            Some(target) => target,
            None if shared_count(&dispatchers) < max_dispatchers => {
                match self.start_locked(&mut dispatchers, false) {
                    Ok(target) => target,
                    Err(e) => {
                        warn!(dispatcher = %source.name(), error = %e, "Rebalance could not start a dispatcher");
                        return;
                    }
                }
            }
            None => return,
        };

        let moved = transfer(local, &target, &movers);
        drop(dispatchers);

        if moved > 0 {
            self.inner.metrics.record_rebalance(moved);
            info!(
                from = %source.name(),
                to = %target.name(),
                moved,
                load = source.load_percent(),
                "Rebalanced dispatcher"
            );
        }
    }

    /// Hand every actor of an idle dispatcher to an older, lighter one
    pub(crate) fn try_consolidate(&self, local: &LocalDispatcher) -> bool {
        let source = local.handle();
        if source.is_isolated() {
            return false;
        }
        let threshold = self.inner.config.dispatcher.rebalance_threshold_percent;
        let dispatchers = self.inner.dispatchers.lock();
        // Only older dispatchers receive, so two idle siblings never swap back and forth
        let Some(target) = least_loaded(
            dispatchers
                .iter()
                .filter(|d| d.id() < source.id() && shares_actors(d) && d.load_percent() < threshold),
        ) else {
            return false;
        };

        let ids: Vec<ActorId> = local.actor_loads().into_iter().map(|(id, _)| id).collect();
        let moved = transfer(local, &target, &ids);
        drop(dispatchers);

        if moved > 0 {
            self.inner.metrics.record_rebalance(moved);
            info!(from = %source.name(), to = %target.name(), moved, "Consolidated idle dispatcher");
        }
        moved == ids.len()
    }

    /// Remove an empty dispatcher from the pool; it exits once this returns true
    pub(crate) fn try_retire(&self, handle: &Arc<DispatcherHandle>) -> bool {
        let mut dispatchers = self.inner.dispatchers.lock();
        if handle.actor_count() > 0 || handle.has_pending() {
            return false;
        }
        handle.request_shutdown();
        dispatchers.retain(|d| d.id() != handle.id());
        self.inner.metrics.record_dispatcher_retired();
        info!(dispatcher = %handle.name(), pool = dispatchers.len(), "Dispatcher retired");
        true
    }

    /// Give `actor` a dispatcher thread of its own
    pub(crate) fn try_isolate(&self, local: &LocalDispatcher, actor: ActorId) -> bool {
        let source = local.handle();
        if source.is_isolated() {
            return true;
        }

        let mut dispatchers = self.inner.dispatchers.lock();
        let present = local.actor_loads().iter().any(|(id, _)| *id == actor);
        if !present {
            return false;
        }
        if source.actor_count() == 1 {
            source.set_isolated();
            self.inner.metrics.record_isolation();
            info!(dispatcher = %source.name(), actor = %actor, "Dispatcher isolated in place");
            return true;
        }

        let target = match self.start_locked(&mut dispatchers, true) {
            Ok(target) => target,
            Err(e) => {
                warn!(actor = %actor, error = %e, "Isolation could not start a dispatcher");
                return false;
            }
        };
        let moved = transfer(local, &target, &[actor]);
        drop(dispatchers);

        if moved == 0 {
            return false;
        }
        self.inner.metrics.record_isolation();
        info!(from = %source.name(), to = %target.name(), actor = %actor, "Actor isolated");
        true
    }

    /// Move every actor not on this thread's stack to a fresh dispatcher and
    /// leave the stalled one isolated with the sender
    pub(crate) fn relieve(&self, local: &LocalDispatcher) -> bool {
        let source = local.handle();
        if source.is_isolated() {
            return false;
        }
        local.drain_pending();
        let ids: Vec<ActorId> = local.actor_loads().into_iter().map(|(id, _)| id).collect();
        if ids.is_empty() {
            return false;
        }

        let mut dispatchers = self.inner.dispatchers.lock();
        let target = match self.start_locked(&mut dispatchers, false) {
            Ok(target) => target,
            Err(e) => {
                warn!(dispatcher = %source.name(), error = %e, "Could not start a dispatcher for stalled neighbours");
                return false;
            }
        };
        source.set_isolated();
        let moved = transfer(local, &target, &ids);
        drop(dispatchers);

        self.inner.metrics.record_isolation();
        info!(
            from = %source.name(),
            to = %target.name(),
            moved,
            "Stalled sender isolated, neighbours moved"
        );
        moved > 0
    }

    // ----- helper pool and timers -----

    /// Run blocking work off the dispatcher threads
    pub fn run_blocking<T, F>(&self, f: F) -> Future<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> Result<T, ActorError> + Send + 'static,
    {
        let result = Future::new();
        self.run_blocking_call(f, Callback::from(result.clone()));
        result
    }

    /// Run blocking work and deliver its result to `callback`
    pub fn run_blocking_call<T, F>(&self, f: F, callback: Callback<T>)
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, ActorError> + Send + 'static,
    {
        let reply = callback.clone();
        let spawned = timer::spawn_blocking(move || {
            let result = catch_unwind(AssertUnwindSafe(f))
                .unwrap_or_else(|panic| Err(ActorError::from_panic(panic.as_ref())));
            match result {
                Ok(value) => reply.resolve(value),
                Err(error) => reply.reject(error),
            }
        });
        if let Err(e) = spawned {
            callback.reject(e);
        }
    }

    /// Run `f` once after `after`
    pub fn delayed<F>(&self, after: Duration, f: F) -> Result<(), ActorError>
    where
        F: FnOnce() + Send + 'static,
    {
        timer::schedule(after, f)
    }

    // ----- observability and lifecycle -----

    pub fn dispatchers(&self) -> Vec<Arc<DispatcherHandle>> {
        self.inner.dispatchers.lock().clone()
    }

    pub fn status(&self) -> SchedulerStatus {
        let dispatchers = self.dispatchers();
        SchedulerStatus {
            dispatcher_count: dispatchers.len(),
            active_dispatchers: active_dispatchers(),
            default_queue_capacity: self.inner.queue_capacity,
            actor_count: dispatchers.iter().map(|d| d.actor_count()).sum(),
            dispatchers: dispatchers.iter().map(|d| d.status()).collect(),
            stats: self.inner.metrics.get_stats(),
        }
    }

    /// Stop every dispatcher, dead-lettering whatever is still queued
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let dispatchers = std::mem::take(&mut *self.inner.dispatchers.lock());
        info!(dispatchers = dispatchers.len(), "Shutting down scheduler");

        for dispatcher in &dispatchers {
            dispatcher.request_shutdown();
        }
        for dispatcher in &dispatchers {
            dispatcher.join();
        }
        info!("Scheduler shutdown complete");
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("policy", &self.inner.policy)
            .field("queue_capacity", &self.inner.queue_capacity)
            .field("dispatchers", &self.inner.dispatchers.lock().len())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

fn shares_actors(dispatcher: &DispatcherHandle) -> bool {
    dispatcher.is_live() && !dispatcher.is_isolated()
}

fn shared_count(dispatchers: &[Arc<DispatcherHandle>]) -> usize {
    dispatchers.iter().filter(|d| shares_actors(d)).count()
}

fn least_loaded<'a>(candidates: impl Iterator<Item = &'a Arc<DispatcherHandle>>) -> Option<Arc<DispatcherHandle>> {
    candidates
        .min_by_key(|d| (d.load_percent(), d.actor_count()))
        .cloned()
}

/// Move the named actors from `local` to `target`; returns how many moved
fn transfer(local: &LocalDispatcher, target: &DispatcherHandle, ids: &[ActorId]) -> usize {
    let mut moved = 0;
    let mut returned = Vec::new();
    for cell in local.detach(ids) {
        match target.hand_off(cell) {
            Ok(()) => moved += 1,
            Err(cell) => returned.push(cell),
        }
    }
    if !returned.is_empty() {
        warn!(to = %target.name(), count = returned.len(), "Hand-off refused, keeping actors");
        local.reattach(returned);
    }
    moved
}
