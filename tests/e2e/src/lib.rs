//! End-to-End Scenarios for the Actor Runtime
//!
//! Whole-system workloads run against a real scheduler, with their results
//! checked by the validators in [`report`].

pub mod philosophers;
pub mod report;

pub use philosophers::{run_dining, DiningConfig, Philosopher, PhilosopherMsg, PhilosopherState};
pub use report::{DiningReport, SeatReport, ValidationResult};
