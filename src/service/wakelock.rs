//! Reference-counted, time-bounded sleep inhibition
//!
//! Every running download holds a [`WakeLockGuard`]. The underlying host
//! lock is taken when the first guard appears and released when the last one
//! drops, or when `timeout` passes since the most recent acquire, whichever
//! comes first. A later acquire re-takes an expired lock.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Host-specific way of keeping the machine awake.
pub trait SleepInhibitor: Send + Sync {
    fn acquire(&self, tag: &str);
    fn release(&self, tag: &str);
}

/// Inhibitor for hosts without a sleep API; only logs.
#[derive(Debug, Default)]
pub struct LoggingInhibitor;

impl SleepInhibitor for LoggingInhibitor {
    fn acquire(&self, tag: &str) {
        info!(tag, "Wake lock acquired");
    }

    fn release(&self, tag: &str) {
        info!(tag, "Wake lock released");
    }
}

#[derive(Debug, Default)]
struct LockState {
    holders: usize,
    held: bool,
    generation: u64,
}

struct Inner {
    tag: String,
    timeout: Duration,
    inhibitor: Arc<dyn SleepInhibitor>,
    state: Mutex<LockState>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone)]
pub struct WakeLock {
    inner: Arc<Inner>,
}

impl WakeLock {
    pub fn new(tag: impl Into<String>, timeout: Duration, inhibitor: Arc<dyn SleepInhibitor>) -> Self {
        Self {
            inner: Arc::new(Inner {
                tag: tag.into(),
                timeout,
                inhibitor,
                state: Mutex::new(LockState::default()),
            }),
        }
    }

    /// Take a reference and (re)arm the expiry timer.
    ///
    /// Must be called inside a tokio runtime.
    pub fn acquire(&self) -> WakeLockGuard {
        let generation = {
            let mut state = self.inner.lock();
            state.holders += 1;
            state.generation += 1;
            if !state.held {
                state.held = true;
                self.inner.inhibitor.acquire(&self.inner.tag);
            }
            debug!(tag = %self.inner.tag, holders = state.holders, "Wake lock reference taken");
            state.generation
        };

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let timeout = self.inner.timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut state = inner.lock();
            if state.generation == generation && state.held {
                state.held = false;
                inner.inhibitor.release(&inner.tag);
                warn!(
                    tag = %inner.tag,
                    holders = state.holders,
                    timeout_secs = timeout.as_secs(),
                    "Wake lock auto-released after timeout"
                );
            }
        });

        WakeLockGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn is_held(&self) -> bool {
        self.inner.lock().held
    }

    pub fn holders(&self) -> usize {
        self.inner.lock().holders
    }
}

/// One reference on a [`WakeLock`]; released on drop.
pub struct WakeLockGuard {
    inner: Arc<Inner>,
}

impl Drop for WakeLockGuard {
    fn drop(&mut self) {
        let mut state = self.inner.lock();
        state.holders = state.holders.saturating_sub(1);
        if state.holders == 0 && state.held {
            state.held = false;
            self.inner.inhibitor.release(&self.inner.tag);
        }
    }
}
