//! Runtime Metrics
//!
//! Lock-free counters updated on the hot path and read as snapshots.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Runtime-wide counters
#[derive(Debug, Default)]
pub struct RuntimeMetrics {
    pub actors_spawned: AtomicU64,
    pub actors_stopped: AtomicU64,
    pub messages_processed: AtomicU64,
    pub total_processing_time_ns: AtomicU64,

    // Failure accounting
    pub invocation_failures: AtomicU64,
    pub handler_panics: AtomicU64,
    pub dead_letters: AtomicU64,

    // Backpressure
    pub queue_full_events: AtomicU64,
    pub blocked_failures: AtomicU64,
    pub stall_warnings: AtomicU64,

    // Dispatcher pool
    pub dispatchers_started: AtomicU64,
    pub dispatchers_retired: AtomicU64,
    pub rebalances: AtomicU64,
    pub actors_migrated: AtomicU64,
    pub isolations: AtomicU64,
}

impl RuntimeMetrics {
    pub fn record_message_handled(&self, duration: Duration) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        self.total_processing_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn avg_processing_time_ns(&self) -> f64 {
        let count = self.messages_processed.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        let total = self.total_processing_time_ns.load(Ordering::Relaxed);
        total as f64 / count as f64
    }

    pub fn record_spawn(&self) {
        self.actors_spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stop(&self) {
        self.actors_stopped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.invocation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_panic(&self) {
        self.handler_panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_letter(&self) {
        self.dead_letters.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed offer onto a full queue
    pub fn record_queue_full(&self) {
        self.queue_full_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_blocked(&self) {
        self.blocked_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stall_warning(&self) {
        self.stall_warnings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatcher_started(&self) {
        self.dispatchers_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatcher_retired(&self) {
        self.dispatchers_retired.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one rebalance that moved `moved` actors
    pub fn record_rebalance(&self, moved: usize) {
        self.rebalances.fetch_add(1, Ordering::Relaxed);
        self.actors_migrated.fetch_add(moved as u64, Ordering::Relaxed);
    }

    pub fn record_isolation(&self) {
        self.isolations.fetch_add(1, Ordering::Relaxed);
    }

    /// Get metrics snapshot
    pub fn get_stats(&self) -> RuntimeStats {
        RuntimeStats {
            actors_spawned: self.actors_spawned.load(Ordering::Relaxed),
            actors_stopped: self.actors_stopped.load(Ordering::Relaxed),
            messages_processed: self.messages_processed.load(Ordering::Relaxed),
            avg_processing_time_ns: self.avg_processing_time_ns(),
            invocation_failures: self.invocation_failures.load(Ordering::Relaxed),
            handler_panics: self.handler_panics.load(Ordering::Relaxed),
            dead_letters: self.dead_letters.load(Ordering::Relaxed),
            queue_full_events: self.queue_full_events.load(Ordering::Relaxed),
            blocked_failures: self.blocked_failures.load(Ordering::Relaxed),
            stall_warnings: self.stall_warnings.load(Ordering::Relaxed),
            dispatchers_started: self.dispatchers_started.load(Ordering::Relaxed),
            dispatchers_retired: self.dispatchers_retired.load(Ordering::Relaxed),
            rebalances: self.rebalances.load(Ordering::Relaxed),
            actors_migrated: self.actors_migrated.load(Ordering::Relaxed),
            isolations: self.isolations.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RuntimeStats {
    pub actors_spawned: u64,
    pub actors_stopped: u64,
    pub messages_processed: u64,
    pub avg_processing_time_ns: f64,
    pub invocation_failures: u64,
    pub handler_panics: u64,
    pub dead_letters: u64,
    pub queue_full_events: u64,
    pub blocked_failures: u64,
    pub stall_warnings: u64,
    pub dispatchers_started: u64,
    pub dispatchers_retired: u64,
    pub rebalances: u64,
    pub actors_migrated: u64,
    pub isolations: u64,
}
