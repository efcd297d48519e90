use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("max_parallel_downloads must be at least 1")]
    NoDownloadSlots,

    #[error("max_page_attempts must be at least 1")]
    NoPageAttempts,

    #[error("Duration must be positive: {field}")]
    ZeroDuration { field: String },

    #[error("Retention TTL must be positive: {field} = {value}")]
    InvalidRetentionTTL { field: String, value: u32 },

    #[error("{field} must be positive")]
    ZeroByteLimit { field: String },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_download(config)?;
    validate_durations(config)?;
    validate_limits(config)?;
    validate_retention(config)?;
    Ok(())
}

fn validate_download(config: &Config) -> Result<(), ValidationError> {
    if config.download.max_parallel_downloads == 0 {
        return Err(ValidationError::NoDownloadSlots);
    }
    if config.download.max_page_attempts == 0 {
        return Err(ValidationError::NoPageAttempts);
    }
    Ok(())
}

fn validate_durations(config: &Config) -> Result<(), ValidationError> {
    let durations = [
        ("notifications.progress_throttle", config.notifications.progress_throttle),
        ("download.wake_lock_timeout", config.download.wake_lock_timeout),
        ("watchdog.poll_interval", config.watchdog.poll_interval),
    ];

    for (field, value) in durations {
        if value.is_zero() {
            return Err(ValidationError::ZeroDuration {
                field: field.to_string(),
            });
        }
    }
    Ok(())
}

fn validate_limits(config: &Config) -> Result<(), ValidationError> {
    if config.server.max_payload_bytes.as_u64() == 0 {
        return Err(ValidationError::ZeroByteLimit {
            field: "server.max_payload_bytes".to_string(),
        });
    }
    if config.download.max_page_bytes.as_u64() == 0 {
        return Err(ValidationError::ZeroByteLimit {
            field: "download.max_page_bytes".to_string(),
        });
    }
    Ok(())
}

fn validate_retention(config: &Config) -> Result<(), ValidationError> {
    if config.retention.track_logs_ttl_days == 0 {
        return Err(ValidationError::InvalidRetentionTTL {
            field: "track_logs_ttl_days".to_string(),
            value: 0,
        });
    }
    Ok(())
}
