//! Background eviction of idle sliding windows.
//!
//! Windows are created lazily and never removed by admission checks, so a
//! long-running process would otherwise keep one window for every client and
//! resource it has ever seen.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::limiter::RateLimiter;

/// Timing for the idle sweeper.
#[derive(Debug, Clone, Copy)]
pub struct SweepConfig {
    /// How often to scan for idle windows.
    pub interval: Duration,
    /// How long an empty window must go unchecked before it is evicted.
    pub idle_after: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            idle_after: Duration::from_secs(300),
        }
    }
}

/// Handle to a running idle sweeper task.
///
/// The task runs until [`stop`](Self::stop) is called or the handle is
/// dropped.
pub struct IdleSweeper {
    handle: JoinHandle<()>,
}

impl IdleSweeper {
    /// Spawn a sweeper for `limiter` on the current tokio runtime.
    pub fn spawn(limiter: Arc<RateLimiter>, config: SweepConfig) -> Self {
        info!(
            interval = ?config.interval,
            idle_after = ?config.idle_after,
            "Starting idle window sweeper"
        );

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let evicted = limiter.evict_idle(config.idle_after);
                debug!(
                    evicted,
                    windows = limiter.window_count(),
                    "Idle window sweep finished"
                );
            }
        });

        Self { handle }
    }

    /// Stop the sweeper.
    pub fn stop(self) {
        self.handle.abort();
        info!("Stopped idle window sweeper");
    }
}

impl Drop for IdleSweeper {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
