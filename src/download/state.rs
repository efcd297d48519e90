use std::sync::Arc;

use super::error::DownloadError;
use crate::manga::Manga;
use crate::progress::ProgressState;

/// State of one download job
#[derive(Debug, Clone)]
pub enum DownloadState {
    /// Waiting for a download slot
    Queued,
    /// Pages fetched so far out of all pages of the request
    Progress {
        request_id: i32,
        current: usize,
        total: usize,
    },
    /// Finished; carries the local copy of the manga
    Done { result: Arc<Manga> },
    Error { cause: Arc<DownloadError> },
    Cancelled,
}

/// Payload-free discriminant of [`DownloadState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    Queued,
    Progress,
    Done,
    Error,
    Cancelled,
}

impl DownloadState {
    pub fn kind(&self) -> StateKind {
        match self {
            DownloadState::Queued => StateKind::Queued,
            DownloadState::Progress { .. } => StateKind::Progress,
            DownloadState::Done { .. } => StateKind::Done,
            DownloadState::Error { .. } => StateKind::Error,
            DownloadState::Cancelled => StateKind::Cancelled,
        }
    }

    /// 0 for queued/progress, 1 for terminal states. Never decreases
    /// within one job.
    pub fn terminality_rank(&self) -> u8 {
        if self.is_terminal() { 1 } else { 0 }
    }

    /// Completion percentage while in progress
    pub fn percent(&self) -> Option<u8> {
        match self {
            DownloadState::Progress { current, total, .. } if *total > 0 => {
                Some(((*current).min(*total) * 100 / *total) as u8)
            }
            DownloadState::Progress { .. } => Some(0),
            _ => None,
        }
    }

    pub fn error(cause: DownloadError) -> Self {
        DownloadState::Error {
            cause: Arc::new(cause),
        }
    }
}

impl ProgressState for DownloadState {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadState::Done { .. } | DownloadState::Error { .. } | DownloadState::Cancelled
        )
    }

    fn abandoned(reason: &str) -> Self {
        DownloadState::error(DownloadError::Abandoned(reason.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_kinds() {
        assert!(!DownloadState::Queued.is_terminal());
        assert!(
            !DownloadState::Progress {
                request_id: 1,
                current: 0,
                total: 3
            }
            .is_terminal()
        );
        assert!(DownloadState::Cancelled.is_terminal());
        assert!(DownloadState::error(DownloadError::NoChapters).is_terminal());
        assert_eq!(DownloadState::abandoned("gone").kind(), StateKind::Error);
    }

    #[test]
    fn test_percent() {
        let state = |current, total| DownloadState::Progress {
            request_id: 1,
            current,
            total,
        };
        assert_eq!(state(0, 0).percent(), Some(0));
        assert_eq!(state(1, 4).percent(), Some(25));
        assert_eq!(state(4, 4).percent(), Some(100));
        assert_eq!(state(9, 4).percent(), Some(100));
        assert_eq!(DownloadState::Queued.percent(), None);
    }
}
