//! Dispatcher Threads
//!
//! A dispatcher is one OS thread that owns a set of actors and services them
//! round-robin: on every turn each actor gets at most one entry, callback
//! queue first. Empty turns escalate through the backoff ladder. Every tick
//! the thread takes in newly assigned actors, publishes its load and, when
//! overloaded, asks the scheduler to move part of its work elsewhere. An
//! idle, auto-shutdown dispatcher eventually hands its actors to a sibling
//! and retires.
//!
//! ## Ownership
//!
//! Actor state travels between dispatchers as a boxed [`Schedulable`]
//! through the target's hand-off channel, so at any instant exactly one
//! thread can poll an actor's queues. [`DispatcherHandle`] is the shared,
//! thread-safe face of a dispatcher; [`LocalDispatcher`] is the thread's own
//! view and never leaves it.

use crate::backoff::BackOffStrategy;
use crate::error::ActorError;
use crate::message::ActorId;
use crate::scheduler::Scheduler;
use crate::status::{DispatcherState, DispatcherStatus};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Numeric dispatcher identifier, unique per process
pub type DispatcherId = u64;

static ACTIVE_DISPATCHERS: AtomicUsize = AtomicUsize::new(0);

/// Depth limit for handlers run inline by a stalled enqueue
const MAX_INLINE_POLLS: usize = 8;

/// Dispatcher threads currently alive in this process
pub fn active_dispatchers() -> usize {
    ACTIVE_DISPATCHERS.load(Ordering::Acquire)
}

/// Result of servicing one actor for one turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Polled {
    /// Both queues were empty
    Idle,
    /// One entry handled
    Processed { isolate: bool },
    /// Actor stopped and must be removed
    Stopped,
}

/// Type-erased actor state owned by a dispatcher
pub(crate) trait Schedulable: Send {
    fn id(&self) -> ActorId;
    fn name(&self) -> &str;
    fn attach(&mut self, dispatcher: DispatcherId);
    fn poll_once(&mut self) -> Polled;
    fn load_percent(&self) -> u32;
    fn queued(&self) -> usize;
    fn is_stopped(&self) -> bool;
    /// Mark stopped, turn queued entries into dead letters, run the stop hook
    fn shutdown(&mut self);
}

/// Shared face of a dispatcher thread
pub struct DispatcherHandle {
    id: DispatcherId,
    name: String,
    state: AtomicU8,
    pending: Sender<Box<dyn Schedulable>>,
    isolated: AtomicBool,
    auto_shutdown: bool,
    created: Instant,
    actor_count: AtomicUsize,
    load: AtomicU32,
    queue_size: AtomicUsize,
    shutdown_requested: AtomicBool,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl DispatcherHandle {
    pub fn id(&self) -> DispatcherId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> DispatcherState {
        DispatcherState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: DispatcherState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Accepting actors: created or running and not asked to stop
    pub fn is_live(&self) -> bool {
        matches!(self.state(), DispatcherState::Created | DispatcherState::Running)
            && !self.shutdown_requested.load(Ordering::Acquire)
    }

    pub fn is_isolated(&self) -> bool {
        self.isolated.load(Ordering::Acquire)
    }

    pub(crate) fn set_isolated(&self) {
        self.isolated.store(true, Ordering::Release);
    }

    pub fn auto_shutdown(&self) -> bool {
        self.auto_shutdown
    }

    pub fn created(&self) -> Instant {
        self.created
    }

    /// Assigned actors, including ones still in the hand-off queue
    pub fn actor_count(&self) -> usize {
        self.actor_count.load(Ordering::Acquire)
    }

    /// Load published at the last tick
    pub fn load_percent(&self) -> u32 {
        self.load.load(Ordering::Acquire)
    }

    /// Aggregate queue size published at the last tick
    pub fn queue_size(&self) -> usize {
        self.queue_size.load(Ordering::Acquire)
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Hand an actor to this dispatcher; gives it back if the thread is gone
    pub(crate) fn hand_off(&self, mut cell: Box<dyn Schedulable>) -> Result<(), Box<dyn Schedulable>> {
        cell.attach(self.id);
        self.actor_count.fetch_add(1, Ordering::AcqRel);
        self.pending.send(cell).map_err(|e| {
            self.actor_count.fetch_sub(1, Ordering::AcqRel);
            e.into_inner()
        })
    }

    pub(crate) fn release_actor(&self) {
        self.actor_count.fetch_sub(1, Ordering::AcqRel);
    }

    /// Stop accepting actors; the thread exits at its next check
    pub(crate) fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::Release);
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }

    /// Wait for the thread to exit; a no-op from the dispatcher's own thread
    pub(crate) fn join(&self) {
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == std::thread::current().id() {
                *self.thread.lock() = Some(handle);
                return;
            }
            if handle.join().is_err() {
                warn!(dispatcher = %self.name, "Dispatcher thread panicked");
            }
        }
    }

    pub fn status(&self) -> DispatcherStatus {
        DispatcherStatus {
            id: self.id,
            name: self.name.clone(),
            state: self.state(),
            actor_count: self.actor_count(),
            load_percent: self.load_percent(),
            queue_size: self.queue_size(),
            isolated: self.is_isolated(),
        }
    }

    /// Start a dispatcher thread
    pub(crate) fn start(
        scheduler: Scheduler,
        id: DispatcherId,
        isolated: bool,
        auto_shutdown: bool,
    ) -> Result<Arc<DispatcherHandle>, ActorError> {
        let (pending_tx, pending_rx) = unbounded();
        let name = format!("dispatcher-{}", id);
        let handle = Arc::new(DispatcherHandle {
            id,
            name: name.clone(),
            state: AtomicU8::new(DispatcherState::Created.as_u8()),
            pending: pending_tx,
            isolated: AtomicBool::new(isolated),
            auto_shutdown,
            created: scheduler.clock().now(),
            actor_count: AtomicUsize::new(0),
            load: AtomicU32::new(0),
            queue_size: AtomicUsize::new(0),
            shutdown_requested: AtomicBool::new(false),
            thread: Mutex::new(None),
        });

        let thread_handle = Arc::clone(&handle);
        ACTIVE_DISPATCHERS.fetch_add(1, Ordering::AcqRel);
        let spawned = std::thread::Builder::new().name(name).spawn(move || {
            let local = Rc::new(LocalDispatcher::new(thread_handle, scheduler, pending_rx));
            CURRENT_DISPATCHER.with(|current| *current.borrow_mut() = Some(Rc::clone(&local)));
            local.run();
            CURRENT_DISPATCHER.with(|current| current.borrow_mut().take());
            ACTIVE_DISPATCHERS.fetch_sub(1, Ordering::AcqRel);
        });

        match spawned {
            Ok(join) => {
                *handle.thread.lock() = Some(join);
                Ok(handle)
            }
            Err(e) => {
                ACTIVE_DISPATCHERS.fetch_sub(1, Ordering::AcqRel);
                handle.set_state(DispatcherState::Stopped);
                Err(ActorError::unavailable(format!(
                    "failed to spawn dispatcher thread: {}",
                    e
                )))
            }
        }
    }
}

impl std::fmt::Debug for DispatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("actor_count", &self.actor_count())
            .field("load", &self.load_percent())
            .field("isolated", &self.is_isolated())
            .finish()
    }
}

thread_local! {
    static CURRENT_DISPATCHER: RefCell<Option<Rc<LocalDispatcher>>> = const { RefCell::new(None) };
}

/// The dispatcher thread's own view of its actors
pub(crate) struct LocalDispatcher {
    handle: Arc<DispatcherHandle>,
    scheduler: Scheduler,
    backoff: BackOffStrategy,
    pending: Receiver<Box<dyn Schedulable>>,
    /// `None` marks a cell checked out by an outer turn or removed until compaction
    slots: RefCell<Vec<Option<Box<dyn Schedulable>>>>,
    /// Actors whose turn is on this thread's stack, innermost last
    busy: RefCell<Vec<ActorId>>,
    inline_polls: Cell<usize>,
    cursor: Cell<usize>,
    isolate_requests: RefCell<Vec<ActorId>>,
}

impl LocalDispatcher {
    fn new(handle: Arc<DispatcherHandle>, scheduler: Scheduler, pending: Receiver<Box<dyn Schedulable>>) -> Self {
        let backoff = scheduler.backoff().clone();
        Self {
            handle,
            scheduler,
            backoff,
            pending,
            slots: RefCell::new(Vec::new()),
            busy: RefCell::new(Vec::new()),
            inline_polls: Cell::new(0),
            cursor: Cell::new(0),
            isolate_requests: RefCell::new(Vec::new()),
        }
    }

    /// Dispatcher owning the calling thread, if any
    pub(crate) fn current() -> Option<Rc<LocalDispatcher>> {
        CURRENT_DISPATCHER.with(|current| current.borrow().clone())
    }

    pub(crate) fn handle(&self) -> &Arc<DispatcherHandle> {
        &self.handle
    }

    pub(crate) fn backoff(&self) -> BackOffStrategy {
        self.backoff.clone()
    }

    /// One turn from inside a handler that is waiting cooperatively
    pub(crate) fn poll_nested(&self) -> usize {
        self.poll_round()
    }

    /// Give every present actor one chance to handle one entry
    fn poll_round(&self) -> usize {
        let len = self.slots.borrow().len();
        if len == 0 {
            return 0;
        }
        let start = self.cursor.get() % len;
        self.cursor.set(start + 1);

        (0..len)
            .filter(|offset| self.poll_slot((start + offset) % len))
            .count()
    }

    /// One turn for the actor in `index`; true if it handled an entry or stopped
    fn poll_slot(&self, index: usize) -> bool {
        let taken = self
            .slots
            .borrow_mut()
            .get_mut(index)
            .and_then(Option::take);
        let Some(mut cell) = taken else { return false };

        self.busy.borrow_mut().push(cell.id());
        let polled = cell.poll_once();
        self.busy.borrow_mut().pop();

        match polled {
            Polled::Idle => {
                self.put_back(index, cell);
                false
            }
            Polled::Processed { isolate } => {
                if isolate {
                    self.isolate_requests.borrow_mut().push(cell.id());
                }
                self.put_back(index, cell);
                true
            }
            Polled::Stopped => {
                cell.shutdown();
                self.handle.release_actor();
                self.scheduler.metrics().record_stop();
                true
            }
        }
    }

    /// Whether a turn of `id` is in progress further down this thread's stack
    pub(crate) fn is_busy(&self, id: ActorId) -> bool {
        self.busy.borrow().contains(&id)
    }

    /// Run one turn of `id` from inside an enqueue that found its queue full.
    /// Only actors present on this dispatcher qualify, and nesting is bounded.
    pub(crate) fn poll_actor(&self, id: ActorId) -> bool {
        if self.inline_polls.get() >= MAX_INLINE_POLLS {
            return false;
        }
        self.drain_pending();
        let index = self
            .slots
            .borrow()
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|cell| cell.id() == id));
        let Some(index) = index else { return false };

        self.inline_polls.set(self.inline_polls.get() + 1);
        let progressed = self.poll_slot(index);
        self.inline_polls.set(self.inline_polls.get() - 1);
        progressed
    }

    fn put_back(&self, index: usize, cell: Box<dyn Schedulable>) {
        if let Some(slot) = self.slots.borrow_mut().get_mut(index) {
            *slot = Some(cell);
        }
    }

    /// Take in actors handed to this dispatcher; appends only, so safe mid-turn
    pub(crate) fn drain_pending(&self) {
        let mut slots = self.slots.borrow_mut();
        for cell in self.pending.try_iter() {
            debug!(dispatcher = %self.handle.name, actor = %cell.id(), name = %cell.name(), "Actor assigned");
            slots.push(Some(cell));
        }
    }

    /// Drop empty slots; only valid when no turn is in progress
    fn compact(&self) {
        self.slots.borrow_mut().retain(Option::is_some);
    }

    pub(crate) fn actor_count(&self) -> usize {
        self.slots.borrow().iter().flatten().count()
    }

    /// Current load of each present actor
    pub(crate) fn actor_loads(&self) -> Vec<(ActorId, u32)> {
        self.slots
            .borrow()
            .iter()
            .flatten()
            .map(|cell| (cell.id(), cell.load_percent()))
            .collect()
    }

    /// Remove the named actors so they can be handed to another dispatcher.
    /// Emptied slots stay until the next compaction so turns in progress keep their index.
    pub(crate) fn detach(&self, ids: &[ActorId]) -> Vec<Box<dyn Schedulable>> {
        let mut detached = Vec::with_capacity(ids.len());
        let mut slots = self.slots.borrow_mut();
        for slot in slots.iter_mut() {
            let selected = slot
                .as_ref()
                .map(|cell| ids.contains(&cell.id()) && !cell.is_stopped())
                .unwrap_or(false);
            if selected {
                if let Some(cell) = slot.take() {
                    self.handle.release_actor();
                    detached.push(cell);
                }
            }
        }
        detached
    }

    /// Put back actors a failed hand-off returned
    pub(crate) fn reattach(&self, cells: Vec<Box<dyn Schedulable>>) {
        let mut slots = self.slots.borrow_mut();
        for mut cell in cells {
            cell.attach(self.handle.id);
            self.handle.actor_count.fetch_add(1, Ordering::AcqRel);
            slots.push(Some(cell));
        }
    }

    fn publish_stats(&self) {
        let slots = self.slots.borrow();
        let mut load = 0;
        let mut queued = 0;
        for cell in slots.iter().flatten() {
            load = load.max(cell.load_percent());
            queued += cell.queued();
        }
        self.handle.load.store(load, Ordering::Release);
        self.handle.queue_size.store(queued, Ordering::Release);
    }

    fn process_isolation_requests(&self) {
        let requests = std::mem::take(&mut *self.isolate_requests.borrow_mut());
        for id in requests {
            if !self.scheduler.try_isolate(self, id) {
                debug!(dispatcher = %self.handle.name, actor = %id, "Isolation request not honoured");
            }
        }
    }

    fn shutdown_all(&self) {
        self.drain_pending();
        let cells: Vec<Box<dyn Schedulable>> =
            self.slots.borrow_mut().drain(..).flatten().collect();
        for mut cell in cells {
            cell.shutdown();
            self.handle.release_actor();
            self.scheduler.metrics().record_stop();
        }
    }

    fn run(&self) {
        let settings = self.scheduler.config().dispatcher.clone();
        let clock = self.scheduler.clock();
        let tick = settings.tick();
        let retire_check_interval = tick * 20;

        self.handle.set_state(DispatcherState::Running);
        info!(dispatcher = %self.handle.name, isolated = self.handle.is_isolated(), "Dispatcher started");

        let mut idle_count: u64 = 0;
        let mut idle_in_interval = false;
        let mut last_tick = clock.now();
        let mut last_retire_check = last_tick;

        while !self.handle.shutdown_requested() {
            if self.poll_round() > 0 {
                idle_count = 0;
            } else {
                idle_in_interval = true;
                self.backoff.idle(idle_count);
                idle_count = idle_count.saturating_add(1);
            }

            let sleeping = self.backoff.is_sleeping(idle_count);
            let now = clock.now();
            if !sleeping && now.saturating_duration_since(last_tick) < tick {
                continue;
            }
            last_tick = now;

            self.drain_pending();
            self.compact();
            self.process_isolation_requests();
            self.publish_stats();

            let age = now.saturating_duration_since(self.handle.created);
            if sleeping {
                let retire_due = now.saturating_duration_since(last_retire_check) >= retire_check_interval;
                if self.handle.auto_shutdown && age >= settings.idle_shutdown() && retire_due {
                    last_retire_check = now;
                    if self.actor_count() == 0 && !self.handle.has_pending() {
                        if self.scheduler.try_retire(&self.handle) {
                            break;
                        }
                    } else {
                        self.scheduler.try_consolidate(self);
                    }
                }
            } else if !idle_in_interval
                && age >= settings.warmup()
                && self.actor_count() > 1
                && self.handle.load_percent() > settings.rebalance_threshold_percent
            {
                self.scheduler.rebalance(self);
            }
            idle_in_interval = false;
        }

        self.handle.set_state(DispatcherState::Draining);
        self.shutdown_all();
        self.handle.set_state(DispatcherState::Stopped);
        info!(dispatcher = %self.handle.name, "Dispatcher stopped");
    }
}
