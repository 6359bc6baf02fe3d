//! Runtime Configuration Module
//!
//! Provides configuration loading and validation for the actor runtime.
//! Supports loading from TOML files with environment variable overrides.

use crate::defaults;
use anyhow::{bail, Context, Result};
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "ACTOR_RUNTIME";

/// Top-level runtime configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Capacity of each mailbox and callback queue (rounded to a power of two)
    pub queue_capacity: usize,

    /// Dead-letter records kept in memory
    pub dead_letter_capacity: usize,

    /// Idle and stall backoff thresholds
    pub backoff: BackoffSettings,

    /// Dispatcher pool behaviour
    pub dispatcher: DispatcherSettings,
}

/// Backoff thresholds
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct BackoffSettings {
    pub spin_until_yield: u32,
    pub yield_until_park: u32,
    pub park_until_sleep: u32,
    pub sleep_micros: u64,
}

/// Dispatcher pool settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct DispatcherSettings {
    pub policy: DispatcherPolicyKind,

    /// Upper bound for the elastic pool, 0 means available parallelism
    pub max_dispatchers: usize,

    pub rebalance_threshold_percent: u32,
    pub tick_micros: u64,
    pub warmup_millis: u64,
    pub idle_shutdown_millis: u64,
    pub blocked_warn_millis: u64,
}

/// How actors are spread across dispatcher threads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatcherPolicyKind {
    /// Every actor shares one dispatcher thread
    Single,
    /// Dispatchers are created and retired with load
    Elastic,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: defaults::queues::QUEUE_CAPACITY,
            dead_letter_capacity: defaults::queues::DEAD_LETTER_CAPACITY,
            backoff: BackoffSettings::default(),
            dispatcher: DispatcherSettings::default(),
        }
    }
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            spin_until_yield: defaults::backoff::SPIN_UNTIL_YIELD,
            yield_until_park: defaults::backoff::YIELD_UNTIL_PARK,
            park_until_sleep: defaults::backoff::PARK_UNTIL_SLEEP,
            sleep_micros: defaults::backoff::SLEEP_MICROS,
        }
    }
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            policy: DispatcherPolicyKind::Elastic,
            max_dispatchers: 0,
            rebalance_threshold_percent: defaults::dispatcher::REBALANCE_THRESHOLD_PERCENT,
            tick_micros: defaults::dispatcher::TICK_MICROS,
            warmup_millis: defaults::dispatcher::WARMUP_MILLIS,
            idle_shutdown_millis: defaults::dispatcher::IDLE_SHUTDOWN_MILLIS,
            blocked_warn_millis: defaults::dispatcher::BLOCKED_WARN_MILLIS,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from an optional file with `ACTOR_RUNTIME_*` overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    /// Load configuration using a custom environment prefix
    pub fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!("Loading runtime config: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        // Nested keys use a double underscore: ACTOR_RUNTIME_DISPATCHER__TICK_MICROS
        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: RuntimeConfig = builder
            .build()
            .context("Failed to build runtime configuration")?
            .try_deserialize()
            .context("Failed to deserialize runtime configuration")?;

        config.checked()
    }

    /// Parse configuration from a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: RuntimeConfig =
            toml::from_str(content).context("Failed to parse runtime configuration")?;
        config.checked()
    }

    fn checked(self) -> Result<Self> {
        if let Err(message) = self.validate() {
            bail!("Invalid runtime configuration: {}", message);
        }
        debug!(
            queue_capacity = self.effective_queue_capacity(),
            policy = ?self.dispatcher.policy,
            "Runtime configuration loaded"
        );
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.queue_capacity == 0 {
            return Err("Queue capacity must be greater than 0".to_string());
        }
        if self.queue_capacity > defaults::queues::MAX_QUEUE_CAPACITY {
            return Err(format!(
                "Queue capacity {} exceeds maximum {}",
                self.queue_capacity,
                defaults::queues::MAX_QUEUE_CAPACITY
            ));
        }
        if self.backoff.sleep_micros == 0 {
            return Err("Backoff sleep duration must be greater than 0".to_string());
        }
        if self.dispatcher.rebalance_threshold_percent == 0
            || self.dispatcher.rebalance_threshold_percent > 100
        {
            return Err("Rebalance threshold must be between 1 and 100 percent".to_string());
        }
        if self.dispatcher.tick_micros == 0 {
            return Err("Dispatcher tick must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Queue capacity rounded up to the next power of two
    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity
            .clamp(1, defaults::queues::MAX_QUEUE_CAPACITY)
            .next_power_of_two()
    }

    /// Elastic pool bound, resolving 0 to the available parallelism
    pub fn effective_max_dispatchers(&self) -> usize {
        match self.dispatcher.max_dispatchers {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            n => n,
        }
    }
}

impl BackoffSettings {
    pub fn sleep(&self) -> Duration {
        Duration::from_micros(self.sleep_micros)
    }
}

impl DispatcherSettings {
    pub fn tick(&self) -> Duration {
        Duration::from_micros(self.tick_micros)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_millis)
    }

    pub fn idle_shutdown(&self) -> Duration {
        Duration::from_millis(self.idle_shutdown_millis)
    }

    pub fn blocked_warn(&self) -> Duration {
        Duration::from_millis(self.blocked_warn_millis)
    }
}
