//! # Actor Runtime Configuration
//!
//! Tunables consumed by the actor runtime: queue sizing, backoff thresholds,
//! dispatcher rebalancing and idle shutdown, and the dead-letter log.
//!
//! ## Sources
//!
//! - **Defaults**: compiled-in values from [`defaults`]
//! - **TOML file**: optional, any subset of keys
//! - **Environment**: `ACTOR_RUNTIME_*` overrides, `__` separating sections
//!
//! ## Usage
//!
//! ```rust
//! use runtime_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_toml_str(r#"
//! queue_capacity = 1000
//!
//! [dispatcher]
//! policy = "single"
//! "#).unwrap();
//!
//! // Capacities are rounded up to the next power of two
//! assert_eq!(config.effective_queue_capacity(), 1024);
//! ```

pub mod defaults;
pub mod runtime_config;

// Re-export commonly used types
pub use runtime_config::{
    BackoffSettings, DispatcherPolicyKind, DispatcherSettings, RuntimeConfig, ENV_PREFIX,
};
