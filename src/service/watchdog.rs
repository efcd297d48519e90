//! Stops the host once no work has been running for a while

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Source of "is anything still running" answers
pub trait LivenessSource: Send + Sync {
    fn active_work(&self) -> usize;
}

/// Polls a [`LivenessSource`] and fires once after a quiet period.
#[derive(Debug, Clone, Copy)]
pub struct IdleWatchdog {
    poll_interval: Duration,
    debounce: Duration,
}

impl IdleWatchdog {
    pub fn new(poll_interval: Duration, debounce: Duration) -> Self {
        Self {
            poll_interval,
            debounce,
        }
    }

    /// Run until the source has reported zero for `debounce`, then call
    /// `on_idle` and return `true`. Returns `false` without calling it if
    /// `shutdown` fires first.
    pub async fn run<L, F>(&self, source: &L, shutdown: CancellationToken, on_idle: F) -> bool
    where
        L: LivenessSource + ?Sized,
        F: FnOnce(),
    {
        let mut idle_since: Option<Instant> = None;
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return false,
                _ = ticker.tick() => {}
            }

            let active = source.active_work();
            if active > 0 {
                if idle_since.take().is_some() {
                    debug!(active, "Work resumed, idle timer reset");
                }
                continue;
            }

            let since = *idle_since.get_or_insert_with(Instant::now);
            if since.elapsed() >= self.debounce {
                info!(idle_ms = since.elapsed().as_millis() as u64, "No active work, stopping");
                on_idle();
                return true;
            }
        }
    }
}
