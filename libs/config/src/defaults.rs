//! Runtime defaults
//!
//! Default values shared by the configuration layer and the runtime so the
//! two never drift apart.

/// Queue defaults
pub mod queues {
    /// Per-queue capacity (mailbox and callback queue each)
    pub const QUEUE_CAPACITY: usize = 8192;

    /// Hard upper bound on a single queue
    pub const MAX_QUEUE_CAPACITY: usize = 1 << 24;

    /// Dead-letter records retained for inspection
    pub const DEAD_LETTER_CAPACITY: usize = 1024;
}

/// Backoff defaults
pub mod backoff {
    /// Busy spins before yielding the CPU
    pub const SPIN_UNTIL_YIELD: u32 = 100;

    /// Yields before parking for short intervals
    pub const YIELD_UNTIL_PARK: u32 = 100;

    /// Short parks before falling asleep
    pub const PARK_UNTIL_SLEEP: u32 = 10;

    /// Sleep duration once sleeping (microseconds)
    pub const SLEEP_MICROS: u64 = 1_000;
}

/// Dispatcher defaults
pub mod dispatcher {
    /// Queue fill percentage above which a dispatcher asks to split
    pub const REBALANCE_THRESHOLD_PERCENT: u32 = 50;

    /// Interval between load checks (microseconds)
    pub const TICK_MICROS: u64 = 500;

    /// Grace period after creation before any rebalancing (milliseconds)
    pub const WARMUP_MILLIS: u64 = 2;

    /// Minimum lifetime before an idle dispatcher may shut down (milliseconds)
    pub const IDLE_SHUTDOWN_MILLIS: u64 = 5_000;

    /// Stall time on a full queue before a single warning (milliseconds)
    pub const BLOCKED_WARN_MILLIS: u64 = 5_000;

    /// Load hint used when assigning a dispatcher to a new actor
    pub const ASSIGN_LOAD_HINT_PERCENT: u32 = 70;
}
