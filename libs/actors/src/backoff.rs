//! Escalating Backoff
//!
//! Idle dispatcher loops and producers stalled on a full queue both back off
//! through the same policy: spin, then yield, then park briefly, then sleep.
//! The mapping from attempt count to action is pure; performing the action
//! goes through an injectable [`Parker`] so tests can observe it without
//! burning CPU or wall-clock time.
//!
//! ## Thresholds
//!
//! With the defaults (100/100/10) attempts 0..=100 spin, 101..=200 yield,
//! 201..=210 park and anything beyond sleeps for the configured duration.

use runtime_config::BackoffSettings;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One step of the backoff ladder, ordered by cost
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BackOffAction {
    Spin,
    Yield,
    Park,
    Sleep(Duration),
}

/// Performs backoff actions on the calling thread
pub trait Parker: Send + Sync {
    fn idle(&self, action: BackOffAction);
}

/// Parker backed by the real thread primitives
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadParker;

impl Parker for ThreadParker {
    fn idle(&self, action: BackOffAction) {
        match action {
            BackOffAction::Spin => std::hint::spin_loop(),
            BackOffAction::Yield => std::thread::yield_now(),
            BackOffAction::Park => std::thread::park_timeout(Duration::from_nanos(1)),
            BackOffAction::Sleep(duration) => std::thread::sleep(duration),
        }
    }
}

/// Source of monotonic time for scheduling decisions
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset_nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset_nanos: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset_nanos
            .fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }
}

/// Escalating spin/yield/park/sleep policy
#[derive(Clone)]
pub struct BackOffStrategy {
    yield_after: u64,
    park_after: u64,
    sleep_after: u64,
    sleep: Duration,
    parker: Arc<dyn Parker>,
}

impl BackOffStrategy {
    /// Create a strategy from raw thresholds
    pub fn new(spin_until_yield: u32, yield_until_park: u32, park_until_sleep: u32, sleep: Duration) -> Self {
        let yield_after = u64::from(spin_until_yield);
        let park_after = yield_after + u64::from(yield_until_park);
        let sleep_after = park_after + u64::from(park_until_sleep);
        Self {
            yield_after,
            park_after,
            sleep_after,
            sleep,
            parker: Arc::new(ThreadParker),
        }
    }

    pub fn from_settings(settings: &BackoffSettings) -> Self {
        Self::new(
            settings.spin_until_yield,
            settings.yield_until_park,
            settings.park_until_sleep,
            settings.sleep(),
        )
    }

    /// Replace the primitive that performs the actions
    pub fn with_parker(mut self, parker: Arc<dyn Parker>) -> Self {
        self.parker = parker;
        self
    }

    /// Map an attempt count to the action to take
    pub fn advance(&self, count: u64) -> BackOffAction {
        if count > self.sleep_after {
            BackOffAction::Sleep(self.sleep)
        } else if count > self.park_after {
            BackOffAction::Park
        } else if count > self.yield_after {
            BackOffAction::Yield
        } else {
            BackOffAction::Spin
        }
    }

    /// Perform the action for `count` on the calling thread
    pub fn idle(&self, count: u64) {
        self.parker.idle(self.advance(count));
    }

    pub fn is_yielding(&self, count: u64) -> bool {
        count > self.yield_after
    }

    pub fn is_sleeping(&self, count: u64) -> bool {
        count > self.sleep_after
    }

    /// First attempt count at which the strategy sleeps
    pub fn sleep_threshold(&self) -> u64 {
        self.sleep_after + 1
    }

    pub fn sleep_duration(&self) -> Duration {
        self.sleep
    }
}

impl Default for BackOffStrategy {
    fn default() -> Self {
        Self::from_settings(&BackoffSettings::default())
    }
}

impl fmt::Debug for BackOffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackOffStrategy")
            .field("yield_after", &self.yield_after)
            .field("park_after", &self.park_after)
            .field("sleep_after", &self.sleep_after)
            .field("sleep", &self.sleep)
            .finish()
    }
}
