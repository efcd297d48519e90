//! Download service: job bookkeeping, notifications and host lifecycle
//!
//! - [`DownloadService`] - actor owning the registry of active downloads
//! - [`JobRegistry`] - insertion-ordered request id → job map with snapshots
//! - [`NotificationCoordinator`] - throttled progress notifications per job
//! - [`WakeLock`] - reference-counted, time-bounded sleep inhibition
//! - [`TrafficGate`] - confirmation before transfers on metered networks
//! - [`IdleWatchdog`] - stops the host once nothing is running

mod controller;
mod notification;
mod registry;
mod traffic;
mod wakelock;
mod watchdog;

pub use controller::{
    ActiveDownload, DownloadBinder, DownloadService, ServiceError, ServiceParts, ServiceState,
    StartOutcome,
};
pub use notification::{
    DownloadCompleted, DownloadNotification, ForegroundSwitcher, Notification, NotificationBoard,
    NotificationCoordinator, NotificationSink, Observed,
};
pub use registry::{JobRegistry, Snapshot};
pub use traffic::{
    AppSettings, ConfirmAction, Confirmation, NetworkMonitor, StaticNetwork, TrafficGate,
    TransferDecision,
};
pub use wakelock::{LoggingInhibitor, SleepInhibitor, WakeLock, WakeLockGuard};
pub use watchdog::{IdleWatchdog, LivenessSource};
