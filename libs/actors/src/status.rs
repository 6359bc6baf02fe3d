//! Observability Snapshots
//!
//! Point-in-time reads of queue depths, dispatcher load and the pool as a
//! whole. Values are gathered without stopping the runtime, so they are
//! approximate while work is in flight.

use crate::message::ActorId;
use crate::metrics::RuntimeStats;
use serde::Serialize;
use std::time::SystemTime;

/// Queue snapshot of one actor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActorStatus {
    pub id: ActorId,
    pub name: String,
    pub mailbox_len: usize,
    pub callback_len: usize,
    pub capacity: usize,
    pub load_percent: u32,
    pub stopped: bool,
    /// Owning dispatcher, 0 before the first assignment completes
    pub dispatcher: u64,
}

/// Lifecycle of a dispatcher thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatcherState {
    Created,
    Running,
    Draining,
    Stopped,
}

impl DispatcherState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => DispatcherState::Created,
            1 => DispatcherState::Running,
            2 => DispatcherState::Draining,
            _ => DispatcherState::Stopped,
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            DispatcherState::Created => 0,
            DispatcherState::Running => 1,
            DispatcherState::Draining => 2,
            DispatcherState::Stopped => 3,
        }
    }
}

/// Snapshot of one dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatcherStatus {
    pub id: u64,
    pub name: String,
    pub state: DispatcherState,
    pub actor_count: usize,
    pub load_percent: u32,
    pub queue_size: usize,
    pub isolated: bool,
}

/// Snapshot of the whole scheduler
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerStatus {
    pub dispatcher_count: usize,
    /// Dispatcher threads alive in the process, across schedulers
    pub active_dispatchers: usize,
    pub default_queue_capacity: usize,
    pub actor_count: usize,
    pub dispatchers: Vec<DispatcherStatus>,
    pub stats: RuntimeStats,
}

/// Record of a call dropped because its target had stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeadLetter {
    pub target: ActorId,
    pub target_name: String,
    pub message: String,
    pub sender: Option<ActorId>,
    pub at: SystemTime,
}
