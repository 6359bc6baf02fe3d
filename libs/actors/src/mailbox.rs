//! Mailbox Pair
//!
//! Each actor owns two bounded MPSC queues: the ordinary mailbox and the
//! callback queue for continuations. Producers offer without blocking; the
//! owning dispatcher is the only consumer and always looks at the callback
//! queue first.
//!
//! A full lane can still take entries from the one thread that drains it,
//! while that thread is inside one of the actor's own turns: those go to an
//! unbounded overflow behind the queue. While a lane has overflow, every
//! offer onto it is refused so entries from one sender stay in order.

use crate::actor::Actor;
use crate::message::{CallEntry, Lane};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

struct Overflow<A: Actor> {
    entries: Mutex<VecDeque<CallEntry<A>>>,
    len: AtomicUsize,
}

impl<A: Actor> Overflow<A> {
    fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            len: AtomicUsize::new(0),
        }
    }

    fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    fn push(&self, entry: CallEntry<A>) {
        let mut entries = self.entries.lock();
        entries.push_back(entry);
        self.len.store(entries.len(), Ordering::Release);
    }

    fn pop(&self) -> Option<CallEntry<A>> {
        if self.len() == 0 {
            return None;
        }
        let mut entries = self.entries.lock();
        let entry = entries.pop_front();
        self.len.store(entries.len(), Ordering::Release);
        entry
    }

    fn drain_into(&self, out: &mut Vec<CallEntry<A>>) {
        let mut entries = self.entries.lock();
        out.extend(entries.drain(..));
        self.len.store(0, Ordering::Release);
    }
}

/// Mailbox plus callback queue of one actor
pub struct QueuePair<A: Actor> {
    mailbox_tx: Sender<CallEntry<A>>,
    mailbox_rx: Receiver<CallEntry<A>>,
    callback_tx: Sender<CallEntry<A>>,
    callback_rx: Receiver<CallEntry<A>>,
    mailbox_overflow: Overflow<A>,
    callback_overflow: Overflow<A>,
    capacity: usize,
}

impl<A: Actor> QueuePair<A> {
    /// Create both queues, rounding the capacity up to a power of two
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        let (mailbox_tx, mailbox_rx) = bounded(capacity);
        let (callback_tx, callback_rx) = bounded(capacity);
        Self {
            mailbox_tx,
            mailbox_rx,
            callback_tx,
            callback_rx,
            mailbox_overflow: Overflow::new(),
            callback_overflow: Overflow::new(),
            capacity,
        }
    }

    fn overflow(&self, lane: Lane) -> &Overflow<A> {
        match lane {
            Lane::Mailbox => &self.mailbox_overflow,
            Lane::Callback => &self.callback_overflow,
        }
    }

    /// Non-blocking offer onto the lane the entry names
    pub fn offer(&self, entry: CallEntry<A>) -> Result<(), CallEntry<A>> {
        if self.overflow(entry.lane).len() > 0 {
            return Err(entry);
        }
        let queue = match entry.lane {
            Lane::Mailbox => &self.mailbox_tx,
            Lane::Callback => &self.callback_tx,
        };
        // Both ends live in this struct so the queue can never disconnect
        queue.try_send(entry).map_err(|e| match e {
            TrySendError::Full(entry) | TrySendError::Disconnected(entry) => entry,
        })
    }

    /// Queue past capacity; only for the thread that is running this actor
    pub(crate) fn overflow_push(&self, entry: CallEntry<A>) {
        self.overflow(entry.lane).push(entry);
    }

    /// Next entry for the consumer, callback lane first
    pub fn pop(&self) -> Option<CallEntry<A>> {
        match self.callback_rx.try_recv() {
            Ok(entry) => Some(entry),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => self
                .callback_overflow
                .pop()
                .or_else(|| self.mailbox_rx.try_recv().ok())
                .or_else(|| self.mailbox_overflow.pop()),
        }
    }

    /// Remove everything still queued, callbacks first
    pub fn drain(&self) -> Vec<CallEntry<A>> {
        let mut entries: Vec<CallEntry<A>> = self.callback_rx.try_iter().collect();
        self.callback_overflow.drain_into(&mut entries);
        entries.extend(self.mailbox_rx.try_iter());
        self.mailbox_overflow.drain_into(&mut entries);
        entries
    }

    pub fn mailbox_len(&self) -> usize {
        self.mailbox_rx.len() + self.mailbox_overflow.len()
    }

    pub fn callback_len(&self) -> usize {
        self.callback_rx.len() + self.callback_overflow.len()
    }

    pub fn len(&self) -> usize {
        self.mailbox_len() + self.callback_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fill percentage of the fuller of the two queues, capped at 100
    pub fn load_percent(&self) -> u32 {
        let fullest = self.mailbox_len().max(self.callback_len()).min(self.capacity);
        ((fullest * 100) / self.capacity) as u32
    }
}
