//! Actor Runtime
//!
//! Message-passing concurrency on a pool of dispatcher threads. Each actor
//! handles one message at a time on the thread that currently owns it, so
//! actor state needs no locking. Calls between actors become queued
//! entries, and asynchronous results come back through [`Future`]s whose
//! continuations run on the thread of the actor that registered them.
//!
//! # Architecture
//!
//! ```text
//!  producer threads / other actors
//!        │  tell / ask / enqueue_call
//!        ▼
//! ┌──────────────────────┐   backpressure (spin → yield → park → sleep)
//! │      Scheduler       │────────────────────────────────────────────┐
//! │  placement, pool,    │                                            │
//! │  dead letters        │                                            ▼
//! └──────────┬───────────┘                         ┌──────────────────────────┐
//!            │ hand-off                            │   QueuePair per actor    │
//!            ▼                                     │  ┌────────┐ ┌─────────┐  │
//! ┌──────────────────────┐   one entry per turn    │  │callback│ │ mailbox │  │
//! │ Dispatcher thread(s) │◄────────────────────────│  └────────┘ └─────────┘  │
//! │ round-robin, ticks,  │  callback lane first    └──────────────────────────┘
//! │ rebalance / retire   │
//! └──────────────────────┘
//! ```
//!
//! # Examples
//!
//! ```rust
//! use actor_runtime::{Actor, Context, Future, Outcome, Scheduler};
//! use std::time::Duration;
//!
//! struct Counter {
//!     total: u64,
//! }
//!
//! enum CounterMsg {
//!     Add(u64),
//!     Total(Future<u64>),
//! }
//!
//! impl Actor for Counter {
//!     type Message = CounterMsg;
//!
//!     fn receive(&mut self, msg: CounterMsg, _ctx: &mut Context<'_, Self>) -> Outcome {
//!         match msg {
//!             CounterMsg::Add(n) => self.total += n,
//!             CounterMsg::Total(reply) => {
//!                 reply.resolve(self.total);
//!             }
//!         }
//!         Outcome::Success
//!     }
//! }
//!
//! let scheduler = Scheduler::default();
//! let counter = scheduler.spawn(Counter { total: 0 }).unwrap();
//! counter.tell(CounterMsg::Add(40)).unwrap();
//! counter.tell(CounterMsg::Add(2)).unwrap();
//!
//! let total = counter.ask(CounterMsg::Total).await_result(Duration::from_secs(5));
//! assert_eq!(total, Ok(42));
//! scheduler.shutdown();
//! ```

pub mod actor;
pub mod backoff;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod future;
pub mod mailbox;
pub mod message;
pub mod metrics;
pub mod scheduler;
pub mod signal;
pub mod status;
pub mod tickets;
pub mod timer;

#[cfg(test)]
pub(crate) mod test_support;

pub use actor::{Actor, ActorRef, SpawnOptions};
pub use backoff::{BackOffAction, BackOffStrategy, Clock, ManualClock, Parker, SystemClock, ThreadParker};
pub use context::{current_actor, Context};
pub use dispatcher::{active_dispatchers, DispatcherHandle, DispatcherId};
pub use error::{ActorError, Outcome, Result};
pub use future::Future;
pub use message::{ActorId, CallEntry, CorrelationToken, Lane, Payload, SenderInfo};
pub use metrics::{RuntimeMetrics, RuntimeStats};
pub use scheduler::{DispatcherPolicy, Scheduler};
pub use signal::{Callback, Signal};
pub use status::{ActorStatus, DeadLetter, DispatcherState, DispatcherStatus, SchedulerStatus};
pub use tickets::TicketMachine;

pub use runtime_config::RuntimeConfig;
