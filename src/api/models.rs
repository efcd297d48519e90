//! Request and response bodies of the HTTP surface
//!
//! Starting a download (`POST /downloads`):
//!
//! ```json
//! {
//!   "request_id": 7,
//!   "manga": { "id": 1, "title": "...", "url": "/m/1", "source": "SRC", "chapters": [ ... ] },
//!   "chapter_ids": [10, 11],
//!   "confirmation": { "action": "continue", "dont_ask_again": true }
//! }
//! ```
//!
//! `request_id` is optional; the service assigns one when it is missing.
//! Omitting `chapter_ids` downloads every chapter.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::download::{DownloadState, StateKind};
use crate::manga::Manga;
use crate::observability::MetricsSnapshot;
use crate::service::{ActiveDownload, Confirmation, ServiceState};

#[derive(Debug, Deserialize, Clone)]
pub struct StartDownloadRequest {
    #[serde(default)]
    pub request_id: Option<i32>,
    pub manga: Manga,
    #[serde(default)]
    pub chapter_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub confirmation: Option<Confirmation>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DownloadAcceptedResponse {
    pub request_id: i32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DeclinedResponse {
    pub declined: bool,
}

/// One active download as shown to clients
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct DownloadView {
    pub request_id: i32,
    pub manga_id: i64,
    pub title: String,
    pub state: StateKind,
    pub current: Option<usize>,
    pub total: Option<usize>,
    pub percent: Option<u8>,
    pub error: Option<String>,
    pub cancelled: bool,
}

impl DownloadView {
    pub fn new(request_id: i32, entry: &ActiveDownload) -> Self {
        let state = entry.job.current_state();
        let (current, total) = match &state {
            DownloadState::Progress { current, total, .. } => (Some(*current), Some(*total)),
            _ => (None, None),
        };
        let error = match &state {
            DownloadState::Error { cause } => Some(cause.to_string()),
            _ => None,
        };

        Self {
            request_id,
            manga_id: entry.request.manga().id,
            title: entry.request.manga().title.clone(),
            state: state.kind(),
            current,
            total,
            percent: state.percent(),
            error,
            cancelled: entry.job.is_cancelled(),
        }
    }

    pub fn from_snapshot(snapshot: &[(i32, ActiveDownload)]) -> Vec<Self> {
        snapshot.iter().map(|(id, entry)| Self::new(*id, entry)).collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RecordFeedRequest {
    pub manga: Manga,
    pub chapters: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct FeedQuery {
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClearFeedResponse {
    pub removed: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub version: String,
    pub service: ServiceState,
    pub active_downloads: usize,
    pub metrics: MetricsSnapshot,
}
