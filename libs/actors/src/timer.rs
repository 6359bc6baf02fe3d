//! Timers and Blocking Helper Pool
//!
//! Delayed callbacks and off-dispatcher blocking work run on a shared tokio
//! runtime. When the caller is already inside a tokio runtime its handle is
//! reused; otherwise a small global runtime is built on first use.

use crate::error::ActorError;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{error, trace};

fn runtime_handle() -> Result<Handle, ActorError> {
    if let Ok(handle) = Handle::try_current() {
        return Ok(handle);
    }

    static GLOBAL_RT: OnceLock<Option<Runtime>> = OnceLock::new();
    let runtime = GLOBAL_RT.get_or_init(|| {
        match Builder::new_multi_thread()
            .enable_all()
            .worker_threads(1)
            .thread_name("actor-runtime-timer")
            .build()
        {
            Ok(runtime) => Some(runtime),
            Err(e) => {
                error!(error = %e, "Failed to build timer runtime");
                None
            }
        }
    });

    runtime
        .as_ref()
        .map(|rt| rt.handle().clone())
        .ok_or_else(|| ActorError::unavailable("timer runtime failed to start"))
}

/// Run `f` once after `delay` on the timer runtime
pub fn schedule<F>(delay: Duration, f: F) -> Result<(), ActorError>
where
    F: FnOnce() + Send + 'static,
{
    trace!(delay_us = delay.as_micros() as u64, "timer.schedule");
    runtime_handle()?.spawn(async move {
        tokio::time::sleep(delay).await;
        f();
    });
    Ok(())
}

/// Run blocking work on the helper pool, never on a dispatcher thread
pub fn spawn_blocking<F>(f: F) -> Result<(), ActorError>
where
    F: FnOnce() + Send + 'static,
{
    trace!("timer.spawn_blocking");
    // The join handle is dropped; results travel back through futures
    drop(runtime_handle()?.spawn_blocking(f));
    Ok(())
}
