//! Per-key FIFO Tickets
//!
//! [`TicketMachine`] serialises asynchronous workflows that touch the same
//! key without ever blocking a thread. A caller asks for a ticket and gets a
//! start future; when it resolves the caller owns the key and receives a
//! finish future, which it settles once its work is done. Settling it hands
//! the key to the next ticket in line.
//!
//! ```
//! use actor_runtime::TicketMachine;
//!
//! let machine = TicketMachine::new();
//! let first = machine.get_ticket("fork-1");
//! let second = machine.get_ticket("fork-1");
//!
//! let finish = first.settlement().unwrap().unwrap();
//! assert!(!second.is_settled());
//!
//! finish.resolve(());
//! assert!(second.is_settled());
//! ```
//!
//! Inside an actor, [`TicketMachine::serial_on`] runs the holder's work as a
//! continuation on that actor once its turn comes.

use crate::actor::Actor;
use crate::context::Context;
use crate::error::ActorError;
use crate::future::Future;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{trace, warn};

#[derive(Clone)]
struct Ticket {
    seq: u64,
    start: Future<Future<()>>,
    finish: Future<()>,
}

impl Ticket {
    fn grant(&self) {
        self.start.resolve(self.finish.clone());
    }
}

struct Queues<K> {
    lines: Mutex<HashMap<K, VecDeque<Ticket>>>,
    next_seq: AtomicU64,
}

/// Async mutual exclusion keyed by `K`
pub struct TicketMachine<K> {
    queues: Arc<Queues<K>>,
}

impl<K> Clone for TicketMachine<K> {
    fn clone(&self) -> Self {
        Self {
            queues: Arc::clone(&self.queues),
        }
    }
}

impl<K> Default for TicketMachine<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> TicketMachine<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            queues: Arc::new(Queues {
                lines: Mutex::new(HashMap::new()),
                next_seq: AtomicU64::new(0),
            }),
        }
    }

    /// Join the line for `key`.
    ///
    /// The returned future resolves, immediately when nobody holds the key,
    /// to the finish future the holder must settle to release it.
    pub fn get_ticket(&self, key: K) -> Future<Future<()>> {
        let ticket = Ticket {
            seq: self.queues.next_seq.fetch_add(1, Ordering::Relaxed),
            start: Future::new(),
            finish: Future::new(),
        };

        let machine = self.clone();
        let seq = ticket.seq;
        let release_key = key.clone();
        ticket
            .finish
            .on_settled_inline(move |_| machine.release(&release_key, seq));

        let first = {
            let mut lines = self.queues.lines.lock();
            let line = lines.entry(key).or_default();
            line.push_back(ticket.clone());
            line.len() == 1
        };
        if first {
            ticket.grant();
        }
        trace!(seq, first, "Ticket issued");
        ticket.start
    }

    /// Run `f` on the calling actor once it holds `key`.
    ///
    /// `f` receives the finish future and must settle it, possibly much later,
    /// to pass the key on. A panic in `f` rejects the finish future so the
    /// line keeps moving.
    pub fn serial_on<A, F>(&self, ctx: &Context<'_, A>, key: K, f: F)
    where
        A: Actor,
        F: FnOnce(&mut A, &mut Context<'_, A>, Future<()>) + Send + 'static,
    {
        let start = self.get_ticket(key);
        ctx.then(&start, move |actor, ctx, granted| match granted {
            Ok(finish) => {
                let guard = finish.clone();
                if let Err(panic) = catch_unwind(AssertUnwindSafe(|| f(actor, ctx, finish))) {
                    let error = ActorError::from_panic(panic.as_ref());
                    warn!(actor = %ctx.id(), error = %error, "Serialized work panicked, releasing its key");
                    guard.reject(error);
                    resume_unwind(panic);
                }
            }
            Err(error) => warn!(actor = %ctx.id(), error = %error, "Ticket never granted"),
        });
    }

    /// Tickets waiting on or holding `key`
    pub fn pending(&self, key: &K) -> usize {
        self.queues.lines.lock().get(key).map(VecDeque::len).unwrap_or(0)
    }

    /// Keys with at least one ticket outstanding
    pub fn active_keys(&self) -> Vec<K> {
        self.queues.lines.lock().keys().cloned().collect()
    }

    fn release(&self, key: &K, seq: u64) {
        let next = {
            let mut lines = self.queues.lines.lock();
            let Some(line) = lines.get_mut(key) else {
                return;
            };
            let Some(position) = line.iter().position(|ticket| ticket.seq == seq) else {
                return;
            };
            line.remove(position);
            let next = if position == 0 { line.front().cloned() } else { None };
            if line.is_empty() {
                lines.remove(key);
            }
            next
        };
        // Granted outside the lock: the holder's continuation may ask for another ticket
        if let Some(next) = next {
            trace!(released = seq, granted = next.seq, "Ticket handed over");
            next.grant();
        }
    }
}

impl<K> fmt::Debug for TicketMachine<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TicketMachine")
            .field("keys", &self.queues.lines.lock().len())
            .finish()
    }
}
