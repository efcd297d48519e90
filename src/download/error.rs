use thiserror::Error;

use super::http::HttpError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("chapter {0} has no pages")]
    NoPages(i64),

    #[error("source request failed: {0}")]
    Request(String),
}

/// Why a download job ended in `DownloadState::Error`
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("manga has no chapters")]
    NoChapters,

    #[error("none of the requested chapters exist")]
    ChaptersNotFound,

    #[error("page source failed: {0}")]
    Source(#[from] SourceError),

    #[error("page download failed: {0}")]
    Http(#[from] HttpError),

    #[error("storage write failed: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to encode local index: {0}")]
    Index(#[from] serde_json::Error),

    #[error("download abandoned: {0}")]
    Abandoned(String),
}
