use crate::humanize::{ByteSize, HumanDuration};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// HTTP host configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
    /// Largest accepted request body
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: ByteSize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            ledger_path: default_ledger_path(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("data/ledger")
}

fn default_max_payload_bytes() -> ByteSize {
    ByteSize(1024 * 1024) // 1 MB
}

/// Download engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadConfig {
    /// Root directory of the local manga library
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
    #[serde(default = "default_max_parallel_downloads")]
    pub max_parallel_downloads: usize,
    #[serde(default = "default_max_page_attempts")]
    pub max_page_attempts: u32,
    /// Delay before the first retry; doubled on each further attempt
    #[serde(default = "default_retry_delay")]
    pub retry_delay: HumanDuration,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: HumanDuration,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: HumanDuration,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_max_page_bytes")]
    pub max_page_bytes: ByteSize,
    /// Longest time the wake lock is held without a new download starting
    #[serde(default = "default_wake_lock_timeout")]
    pub wake_lock_timeout: HumanDuration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            max_parallel_downloads: default_max_parallel_downloads(),
            max_page_attempts: default_max_page_attempts(),
            retry_delay: default_retry_delay(),
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
            max_page_bytes: default_max_page_bytes(),
            wake_lock_timeout: default_wake_lock_timeout(),
        }
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("data/manga")
}

fn default_max_parallel_downloads() -> usize {
    2
}

fn default_max_page_attempts() -> u32 {
    3
}

fn default_retry_delay() -> HumanDuration {
    HumanDuration::from_millis(500)
}

fn default_connect_timeout() -> HumanDuration {
    HumanDuration::from_secs(10)
}

fn default_request_timeout() -> HumanDuration {
    HumanDuration::from_secs(60)
}

fn default_user_agent() -> String {
    concat!("mangabox/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_max_page_bytes() -> ByteSize {
    ByteSize(32 * 1024 * 1024) // 32 MB
}

fn default_wake_lock_timeout() -> HumanDuration {
    HumanDuration::from_secs(60 * 60)
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    /// Minimum spacing of progress renders
    #[serde(default = "default_progress_throttle")]
    pub progress_throttle: HumanDuration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            progress_throttle: default_progress_throttle(),
        }
    }
}

fn default_progress_throttle() -> HumanDuration {
    HumanDuration::from_millis(400)
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatchdogConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval: HumanDuration,
    #[serde(default = "default_debounce")]
    pub debounce: HumanDuration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            debounce: default_debounce(),
        }
    }
}

fn default_poll_interval() -> HumanDuration {
    HumanDuration::from_secs(1)
}

fn default_debounce() -> HumanDuration {
    HumanDuration::from_secs(1)
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    /// Treat the active connection as metered
    #[serde(default)]
    pub metered: bool,
    /// Default of the persisted "warn before metered transfers" preference
    #[serde(default = "default_traffic_warning")]
    pub traffic_warning: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            metered: false,
            traffic_warning: default_traffic_warning(),
        }
    }
}

fn default_traffic_warning() -> bool {
    true
}

/// Retention configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    #[serde(default = "default_track_logs_ttl_days")]
    pub track_logs_ttl_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            track_logs_ttl_days: default_track_logs_ttl_days(),
        }
    }
}

fn default_track_logs_ttl_days() -> u32 {
    crate::ledger::RETENTION_TRACK_LOGS_DAYS as u32
}
