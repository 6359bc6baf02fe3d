//! Futures with Caller Affinity
//!
//! A [`Future`] is a single-assignment completion cell shared between the
//! producer of a result and any number of subscribers. It may stream any
//! number of items before exactly one terminal settlement.
//!
//! ## Affinity
//!
//! A subscriber registered while an actor is being serviced is bound to that
//! actor: when the future settles, the continuation is posted to the actor's
//! callback queue and runs on the actor's own dispatcher thread, no matter
//! which thread settled the future. Subscribers registered from ordinary
//! threads run inline on the settling thread.
//!
//! ## Delivery
//!
//! Signals are delivered outside the lock, one at a time and in completion
//! order, even when several threads complete concurrently or a subscriber
//! completes the same future reentrantly. Streamed items are not replayed to
//! late subscribers; the terminal settlement is.

use crate::context::ambient;
use crate::dispatcher::LocalDispatcher;
use crate::error::ActorError;
use crate::message::Link;
use crate::signal::Signal;
use crate::timer;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

type OnceFn<T> = Box<dyn FnOnce(Result<T, ActorError>) + Send>;
type StreamFn<T> = Box<dyn FnMut(Signal<T>) + Send>;

enum Listener<T> {
    Once { f: OnceFn<T>, handles_errors: bool },
    Stream { f: StreamFn<T> },
}

impl<T> Listener<T> {
    fn handles_errors(&self) -> bool {
        match self {
            Listener::Once { handles_errors, .. } => *handles_errors,
            Listener::Stream { .. } => true,
        }
    }
}

struct State<T> {
    outcome: Option<Result<T, ActorError>>,
    listeners: Vec<Listener<T>>,
    backlog: VecDeque<Signal<T>>,
    delivering: bool,
    timeout_handlers: Vec<Box<dyn FnOnce() + Send>>,
    timed_out: bool,
    /// Invocation this future answers, known once a linked call fails
    call: Option<String>,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    settled: Condvar,
}

/// Single-assignment, optionally streaming completion cell
pub struct Future<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> Default for Future<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Future<T> {
    /// Create a pending future
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    outcome: None,
                    listeners: Vec::new(),
                    backlog: VecDeque::new(),
                    delivering: false,
                    timeout_handlers: Vec::new(),
                    timed_out: false,
                    call: None,
                }),
                settled: Condvar::new(),
            }),
        }
    }

    /// Create an already resolved future
    pub fn resolved(value: T) -> Self {
        let future = Self::new();
        future.resolve(value);
        future
    }

    /// Create an already rejected future
    pub fn rejected(error: ActorError) -> Self {
        let future = Self::new();
        future.reject(error);
        future
    }

    /// Settled cell that reports nothing; later subscribers still see `outcome`
    fn settled_silently(outcome: Result<T, ActorError>) -> Self {
        let future = Self::new();
        future.inner.state.lock().outcome = Some(outcome);
        future
    }

    /// Deliver a signal; returns false if the future had already settled
    pub fn complete(&self, signal: Signal<T>) -> bool {
        let mut state = self.inner.state.lock();
        if state.outcome.is_some() {
            return false;
        }
        if let Some(settlement) = signal.settlement() {
            state.outcome = Some(settlement);
            self.inner.settled.notify_all();
        }
        state.backlog.push_back(signal);
        if state.delivering {
            // The thread already delivering will pick it up in order
            return true;
        }
        state.delivering = true;
        Self::deliver(state);
        true
    }

    pub fn resolve(&self, value: T) -> bool {
        self.complete(Signal::Resolved(value))
    }

    pub fn reject(&self, error: ActorError) -> bool {
        self.complete(Signal::Rejected(error))
    }

    /// Emit one streamed item ahead of the terminal settlement
    pub fn stream(&self, value: T) -> bool {
        self.complete(Signal::Next(value))
    }

    fn deliver(mut state: MutexGuard<'_, State<T>>) {
        while let Some(signal) = state.backlog.pop_front() {
            if let Some(settlement) = signal.settlement() {
                let mut listeners = std::mem::take(&mut state.listeners);
                if let Err(error) = &settlement {
                    if !listeners.iter().any(Listener::handles_errors) && !error.is_dead_letter() {
                        match &state.call {
                            Some(call) => warn!(call = %call, error = %error, "Unhandled future rejection"),
                            None => warn!(error = %error, "Unhandled future rejection"),
                        }
                    }
                }
                // Subscribers registered while we deliver still get the settlement
                while !listeners.is_empty() {
                    MutexGuard::unlocked(&mut state, || {
                        for listener in listeners.drain(..) {
                            fire(listener, &signal, &settlement);
                        }
                    });
                    listeners = std::mem::take(&mut state.listeners);
                }
            } else {
                let mut listeners = std::mem::take(&mut state.listeners);
                MutexGuard::unlocked(&mut state, || {
                    for listener in listeners.iter_mut() {
                        if let Listener::Stream { f } = listener {
                            f(signal.clone());
                        }
                    }
                });
                listeners.append(&mut state.listeners);
                state.listeners = listeners;
            }
        }
        state.delivering = false;
    }

    fn register(&self, listener: Listener<T>) {
        let mut state = self.inner.state.lock();
        let settled = if state.delivering {
            None
        } else {
            state.outcome.clone()
        };
        match settled {
            Some(settlement) => {
                drop(state);
                let signal = Signal::from(settlement.clone());
                fire(listener, &signal, &settlement);
            }
            None => state.listeners.push(listener),
        }
    }

    /// Register for the terminal settlement, bound to the current actor if any
    pub fn on_settled<F>(&self, f: F)
    where
        F: FnOnce(Result<T, ActorError>) + Send + 'static,
    {
        self.register(Listener::Once {
            f: bind_once(f),
            handles_errors: true,
        });
    }

    /// Register for the terminal settlement, always running on the settling thread
    pub(crate) fn on_settled_inline<F>(&self, f: F)
    where
        F: FnOnce(Result<T, ActorError>) + Send + 'static,
    {
        self.register(Listener::Once {
            f: Box::new(f),
            handles_errors: true,
        });
    }

    /// Register for every streamed item and the terminal settlement
    pub fn subscribe<F>(&self, f: F)
    where
        F: FnMut(Signal<T>) + Send + 'static,
    {
        let f: StreamFn<T> = match ambient::current_sink() {
            Some(sink) => {
                let f = Arc::new(Mutex::new(f));
                Box::new(move |signal| {
                    let f = Arc::clone(&f);
                    post_or_drop(
                        &sink,
                        Box::new(move || {
                            let mut handler = f.lock();
                            (*handler)(signal)
                        }),
                    );
                })
            }
            None => Box::new(f),
        };
        self.register(Listener::Stream { f });
    }

    /// Run `f` on success only
    pub fn on_result<F>(&self, f: F)
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.register(Listener::Once {
            f: bind_once(move |result| {
                if let Ok(value) = result {
                    f(value);
                }
            }),
            handles_errors: false,
        });
    }

    /// Run `f` on rejection only
    pub fn on_error<F>(&self, f: F)
    where
        F: FnOnce(ActorError) + Send + 'static,
    {
        self.register(Listener::Once {
            f: bind_once(move |result| {
                if let Err(error) = result {
                    f(error);
                }
            }),
            handles_errors: true,
        });
    }

    /// Run `f` if a timer started by [`timeout_in`](Self::timeout_in) fires first
    pub fn on_timeout<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let handler: Box<dyn FnOnce() + Send> = match ambient::current_sink() {
            Some(sink) => Box::new(move || post_or_drop(&sink, Box::new(f))),
            None => Box::new(f),
        };
        let mut state = self.inner.state.lock();
        if state.timed_out {
            drop(state);
            handler();
        } else if state.outcome.is_none() {
            state.timeout_handlers.push(handler);
        }
    }

    /// Start an independent timer; the future itself is never settled by it
    pub fn timeout_in(&self, duration: Duration) -> Self {
        let inner = Arc::downgrade(&self.inner);
        let scheduled = timer::schedule(duration, move || {
            let Some(inner) = inner.upgrade() else { return };
            let handlers = {
                let mut state = inner.state.lock();
                if state.outcome.is_some() || state.timed_out {
                    return;
                }
                state.timed_out = true;
                std::mem::take(&mut state.timeout_handlers)
            };
            debug!(handlers = handlers.len(), "Future timed out");
            for handler in handlers {
                handler();
            }
        });
        if let Err(e) = scheduled {
            warn!(error = %e, "Could not arm future timeout");
        }
        self.clone()
    }

    /// Whether a `timeout_in` timer fired before settlement
    pub fn is_timed_out(&self) -> bool {
        self.inner.state.lock().timed_out
    }

    pub fn is_settled(&self) -> bool {
        self.inner.state.lock().outcome.is_some()
    }

    /// Terminal settlement, if reached
    pub fn settlement(&self) -> Option<Result<T, ActorError>> {
        self.inner.state.lock().outcome.clone()
    }

    /// Wait for settlement.
    ///
    /// On a dispatcher thread this keeps servicing the dispatcher's other
    /// actors while waiting; elsewhere it blocks. Timing out leaves the
    /// future untouched.
    pub fn await_result(&self, timeout: Duration) -> Result<T, ActorError> {
        let deadline = Instant::now() + timeout;

        if let Some(dispatcher) = LocalDispatcher::current() {
            let backoff = dispatcher.backoff();
            let mut idle = 0u64;
            loop {
                if let Some(settlement) = self.settlement() {
                    return settlement;
                }
                if Instant::now() >= deadline {
                    return Err(ActorError::Timeout(timeout));
                }
                if dispatcher.poll_nested() > 0 {
                    idle = 0;
                } else {
                    backoff.idle(idle);
                    idle += 1;
                }
            }
        }

        let mut state = self.inner.state.lock();
        loop {
            if let Some(settlement) = &state.outcome {
                return settlement.clone();
            }
            if self.inner.settled.wait_until(&mut state, deadline).timed_out() {
                return state
                    .outcome
                    .clone()
                    .unwrap_or(Err(ActorError::Timeout(timeout)));
            }
        }
    }

    /// Like [`await_result`](Self::await_result) but hands back a settled future
    pub fn await_future(&self, timeout: Duration) -> Future<T> {
        match self.await_result(timeout) {
            Err(error) if !self.is_settled() => Future::settled_silently(Err(error)),
            _ => self.clone(),
        }
    }

    /// Transform the resolved value
    pub fn map<U, F>(&self, f: F) -> Future<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let out = Future::new();
        let target = out.clone();
        self.on_settled(move |result| {
            match result {
                Ok(value) => target.resolve(f(value)),
                Err(error) => target.reject(error),
            };
        });
        out
    }

    /// Chain another asynchronous step on success
    pub fn and_then<U, F>(&self, f: F) -> Future<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Future<U> + Send + 'static,
    {
        let out = Future::new();
        let target = out.clone();
        self.on_settled(move |result| match result {
            Ok(value) => f(value).forward_to(&target),
            Err(error) => {
                target.reject(error);
            }
        });
        out
    }

    /// Recover from a rejection with a replacement value
    pub fn catch_error<F>(&self, f: F) -> Future<T>
    where
        F: FnOnce(ActorError) -> T + Send + 'static,
    {
        let out = Future::new();
        let target = out.clone();
        self.on_settled(move |result| {
            match result {
                Ok(value) => target.resolve(value),
                Err(error) => target.resolve(f(error)),
            };
        });
        out
    }

    /// Forward every signal, streamed items included, into `target`
    pub fn forward_to(&self, target: &Future<T>) {
        let target = target.clone();
        self.register(Listener::Stream {
            f: Box::new(move |signal| {
                target.complete(signal);
            }),
        });
    }

    /// Resolve once every input has settled, keeping each outcome in order
    pub fn all_of(futures: Vec<Future<T>>) -> Future<Vec<Result<T, ActorError>>> {
        let out = Future::new();
        if futures.is_empty() {
            out.resolve(Vec::new());
            return out;
        }

        let slots: Arc<Mutex<Vec<Option<Result<T, ActorError>>>>> =
            Arc::new(Mutex::new(vec![None; futures.len()]));
        let remaining = Arc::new(AtomicUsize::new(futures.len()));

        for (index, future) in futures.into_iter().enumerate() {
            let slots = Arc::clone(&slots);
            let remaining = Arc::clone(&remaining);
            let out = out.clone();
            future.on_settled_inline(move |result| {
                slots.lock()[index] = Some(result);
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    let results = slots.lock().drain(..).flatten().collect();
                    out.resolve(results);
                }
            });
        }
        out
    }

    /// Settle with whichever input settles first
    pub fn any_of(futures: Vec<Future<T>>) -> Future<T> {
        let out = Future::new();
        if futures.is_empty() {
            out.reject(ActorError::failure("any_of called without futures"));
            return out;
        }
        for future in futures {
            let out = out.clone();
            future.on_settled_inline(move |result| {
                out.complete(Signal::from(result));
            });
        }
        out
    }
}

fn fire<T: Clone>(listener: Listener<T>, signal: &Signal<T>, settlement: &Result<T, ActorError>) {
    match listener {
        Listener::Once { f, .. } => f(settlement.clone()),
        Listener::Stream { mut f } => f(signal.clone()),
    }
}

fn bind_once<T, F>(f: F) -> OnceFn<T>
where
    T: Send + 'static,
    F: FnOnce(Result<T, ActorError>) + Send + 'static,
{
    match ambient::current_sink() {
        Some(sink) => Box::new(move |result| post_or_drop(&sink, Box::new(move || f(result)))),
        None => Box::new(f),
    }
}

fn post_or_drop(sink: &Arc<dyn ambient::CallbackSink>, task: Box<dyn FnOnce() + Send>) {
    if let Err(e) = sink.post(task) {
        debug!(actor = %sink.actor_id(), error = %e, "Dropped continuation");
    }
}

impl<T: Clone + Send + 'static> Link for Future<T> {
    fn reject(self: Box<Self>, error: ActorError, call: String) {
        {
            let mut state = self.inner.state.lock();
            if state.outcome.is_some() {
                return;
            }
            state.call = Some(call);
        }
        Future::reject(&self, error);
    }
}

impl<T: fmt::Debug> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Future")
            .field("outcome", &state.outcome)
            .field("listeners", &state.listeners.len())
            .field("timed_out", &state.timed_out)
            .finish()
    }
}
