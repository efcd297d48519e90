//! HTTP client for page and cover images

use bytes::Bytes;
use reqwest::{Client, StatusCode, header};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::DownloadConfig;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Connection timeout")]
    Timeout,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Too many redirects")]
    TooManyRedirects,

    #[error("Response of {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },
}

impl HttpError {
    /// Client errors and oversized bodies will not get better on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            HttpError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
            }
            HttpError::InvalidUrl(_) | HttpError::TooLarge { .. } => false,
            _ => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, HttpError>;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub max_body_bytes: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            max_attempts: 3,
            retry_delay: Duration::from_millis(500),
            max_body_bytes: 32 * 1024 * 1024,
            user_agent: concat!("mangabox/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl From<&DownloadConfig> for HttpConfig {
    fn from(config: &DownloadConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout.as_duration(),
            request_timeout: config.request_timeout.as_duration(),
            max_attempts: config.max_page_attempts,
            retry_delay: config.retry_delay.as_duration(),
            max_body_bytes: config.max_page_bytes.as_u64(),
            user_agent: config.user_agent.clone(),
        }
    }
}

/// Downloaded body plus its declared media type
#[derive(Debug, Clone)]
pub struct FetchedResource {
    pub bytes: Bytes,
    pub content_type: Option<mime::Mime>,
}

impl FetchedResource {
    /// File extension for storing this resource, from the URL path or the
    /// media type.
    pub fn extension(&self, url: &str) -> String {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let from_url = path
            .rsplit('/')
            .next()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty() && ext.len() <= 4 && ext.chars().all(|c| c.is_ascii_alphanumeric()));
        if let Some(ext) = from_url {
            return ext;
        }

        match &self.content_type {
            Some(m) if m.type_() == mime::IMAGE && m.subtype() == mime::JPEG => "jpg".to_string(),
            Some(m) if m.type_() == mime::IMAGE => m.subtype().as_str().to_string(),
            _ => "img".to_string(),
        }
    }
}

/// Delay after failed attempt number `attempt` (from 1): `retry_delay`
/// doubled per earlier attempt, saturating.
fn backoff(retry_delay: Duration, attempt: u32) -> Duration {
    retry_delay.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

/// HTTP downloader with retry
pub struct HttpClient {
    client: Client,
    config: HttpConfig,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(config: HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| HttpError::RequestFailed(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Download a resource, retrying transient failures with exponential
    /// backoff starting at `retry_delay`.
    pub async fn download(&self, url: &str, headers: &[(String, String)]) -> Result<FetchedResource> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match self.download_once(url, headers).await {
                Ok(resource) => {
                    if attempts > 1 {
                        debug!(url, attempts, "Download succeeded after retry");
                    }
                    return Ok(resource);
                }
                Err(e) if !e.is_retryable() || attempts >= self.config.max_attempts => {
                    warn!(url, attempts, error = %e, "Download failed");
                    return Err(e);
                }
                Err(e) => {
                    warn!(url, attempts, error = %e, "Download failed, retrying");
                    tokio::time::sleep(backoff(self.config.retry_delay, attempts)).await;
                }
            }
        }
    }

    /// Download once (no retry)
    async fn download_once(&self, url: &str, headers: &[(String, String)]) -> Result<FetchedResource> {
        debug!(url, "Starting download");

        let parsed = reqwest::Url::parse(url).map_err(|e| HttpError::InvalidUrl(format!("{}: {}", url, e)))?;
        let mut request = self.client.get(parsed);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                HttpError::Timeout
            } else if e.is_redirect() {
                HttpError::TooManyRedirects
            } else {
                HttpError::RequestFailed(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let limit = self.config.max_body_bytes;
        if let Some(size) = response.content_length() {
            if size > limit {
                return Err(HttpError::TooLarge { size, limit });
            }
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<mime::Mime>().ok());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| HttpError::RequestFailed(format!("Failed to read body: {}", e)))?;
        if bytes.len() as u64 > limit {
            return Err(HttpError::TooLarge {
                size: bytes.len() as u64,
                limit,
            });
        }

        debug!(url, size = bytes.len(), "Download completed");

        Ok(FetchedResource { bytes, content_type })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(content_type: Option<&str>) -> FetchedResource {
        FetchedResource {
            bytes: Bytes::from_static(b"x"),
            content_type: content_type.map(|v| v.parse().unwrap()),
        }
    }

    #[test]
    fn test_http_config_defaults() {
        let config = HttpConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.max_attempts, 3);
        assert!(config.user_agent.starts_with("mangabox/"));
    }

    #[test]
    fn test_backoff_doubles_and_saturates() {
        let delay = Duration::from_millis(500);
        assert_eq!(backoff(delay, 1), Duration::from_millis(500));
        assert_eq!(backoff(delay, 3), Duration::from_secs(2));
        assert_eq!(backoff(delay, 40), delay * u32::MAX);
        assert_eq!(backoff(delay, u32::MAX), delay * u32::MAX);
        assert_eq!(backoff(Duration::MAX, 2), Duration::MAX);
    }

    #[test]
    fn test_extension_from_url() {
        let r = resource(Some("image/png"));
        assert_eq!(r.extension("https://cdn.example.com/a/001.JPG?token=1"), "jpg");
        assert_eq!(r.extension("https://cdn.example.com/a/page.webp#frag"), "webp");
    }

    #[test]
    fn test_extension_from_content_type() {
        assert_eq!(resource(Some("image/jpeg")).extension("https://x/page"), "jpg");
        assert_eq!(resource(Some("image/png")).extension("https://x/page"), "png");
        assert_eq!(resource(None).extension("https://x/page"), "img");
        assert_eq!(resource(Some("text/html")).extension("https://x/page.php5x"), "img");
    }

    #[test]
    fn test_retryable_errors() {
        let status = |status| HttpError::Status {
            url: "u".into(),
            status,
        };
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(HttpError::Timeout.is_retryable());
        assert!(!HttpError::TooLarge { size: 2, limit: 1 }.is_retryable());
    }
}
