//! Shared fixtures for the runtime integration tests

#![allow(dead_code)]

use actor_runtime::{RuntimeConfig, Scheduler};
use runtime_config::{BackoffSettings, DispatcherPolicyKind, DispatcherSettings};
use std::time::{Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(10);

/// Short backoff ladder so stalls and idle periods resolve quickly
pub fn fast_config(policy: DispatcherPolicyKind) -> RuntimeConfig {
    RuntimeConfig {
        backoff: BackoffSettings {
            spin_until_yield: 10,
            yield_until_park: 10,
            park_until_sleep: 5,
            sleep_micros: 200,
        },
        dispatcher: DispatcherSettings {
            policy,
            max_dispatchers: 4,
            ..DispatcherSettings::default()
        },
        ..RuntimeConfig::default()
    }
}

pub fn scheduler(policy: DispatcherPolicyKind) -> Scheduler {
    Scheduler::new(fast_config(policy))
}

/// Poll `condition` until it holds or `timeout` passes
pub fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
