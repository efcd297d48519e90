//! Progress notifications for download jobs
//!
//! [`NotificationCoordinator`] watches one job at a time, turns its states
//! into [`Notification`]s and hands them to the [`ForegroundSwitcher`], which
//! keeps exactly one active request attached to the foreground slot of the
//! host's [`NotificationSink`].

use futures_util::StreamExt;
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::download::{DownloadState, StateKind};
use crate::manga::Manga;
use crate::observability::Metrics;
use crate::progress::{ProgressJob, ProgressState};

/// One rendered notification, replaced in place per request id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub request_id: i32,
    pub title: String,
    pub text: String,
    pub kind: StateKind,
    /// `(current, total)` while pages are being fetched
    pub progress: Option<(usize, usize)>,
    pub ongoing: bool,
}

/// Renders the states of one request.
#[derive(Debug, Clone)]
pub struct DownloadNotification {
    request_id: i32,
    title: String,
}

impl DownloadNotification {
    pub fn new(request_id: i32, title: impl Into<String>) -> Self {
        Self {
            request_id,
            title: title.into(),
        }
    }

    pub fn create(&self, state: &DownloadState) -> Notification {
        let (text, progress) = match state {
            DownloadState::Queued => ("Queued".to_string(), None),
            DownloadState::Progress { current, total, .. } => (
                format!("{}%", state.percent().unwrap_or(0)),
                Some((*current, *total)),
            ),
            DownloadState::Done { .. } => ("Download complete".to_string(), None),
            DownloadState::Error { cause } => (format!("Error: {}", cause), None),
            DownloadState::Cancelled => ("Cancelled".to_string(), None),
        };

        Notification {
            request_id: self.request_id,
            title: self.title.clone(),
            text,
            kind: state.kind(),
            progress,
            ongoing: !state.is_terminal(),
        }
    }
}

/// Host notification shade
pub trait NotificationSink: Send + Sync {
    /// Show or replace the notification for `notification.request_id`.
    fn post(&self, notification: Notification);
    fn cancel(&self, request_id: i32);
    /// Bind the foreground slot to `request_id`'s notification.
    fn start_foreground(&self, request_id: i32);
    fn stop_foreground(&self);
}

#[derive(Debug, Default)]
struct BoardState {
    shown: IndexMap<i32, Notification>,
    foreground: Option<i32>,
}

/// In-memory [`NotificationSink`] listing what is currently displayed.
#[derive(Debug, Default)]
pub struct NotificationBoard {
    state: Mutex<BoardState>,
}

impl NotificationBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn list(&self) -> Vec<Notification> {
        self.lock().shown.values().cloned().collect()
    }

    pub fn get(&self, request_id: i32) -> Option<Notification> {
        self.lock().shown.get(&request_id).cloned()
    }

    pub fn foreground(&self) -> Option<i32> {
        self.lock().foreground
    }
}

impl NotificationSink for NotificationBoard {
    fn post(&self, notification: Notification) {
        debug!(
            request_id = notification.request_id,
            text = %notification.text,
            ongoing = notification.ongoing,
            "Notification posted"
        );
        self.lock().shown.insert(notification.request_id, notification);
    }

    fn cancel(&self, request_id: i32) {
        debug!(request_id, "Notification removed");
        self.lock().shown.shift_remove(&request_id);
    }

    fn start_foreground(&self, request_id: i32) {
        self.lock().foreground = Some(request_id);
    }

    fn stop_foreground(&self) {
        self.lock().foreground = None;
    }
}

#[derive(Debug, Default)]
struct SwitcherState {
    active: IndexSet<i32>,
    foreground: Option<i32>,
}

/// Keeps the foreground slot bound to one active request.
pub struct ForegroundSwitcher {
    sink: Arc<dyn NotificationSink>,
    state: Mutex<SwitcherState>,
}

impl ForegroundSwitcher {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            sink,
            state: Mutex::new(SwitcherState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SwitcherState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Post an update; the first active request takes the foreground slot.
    pub fn notify(&self, notification: Notification) {
        let request_id = notification.request_id;
        let mut state = self.lock();
        state.active.insert(request_id);
        self.sink.post(notification);
        if state.foreground.is_none() {
            state.foreground = Some(request_id);
            self.sink.start_foreground(request_id);
        }
    }

    /// Stop tracking `request_id`. A final notification stays visible,
    /// otherwise the notification is removed.
    pub fn detach(&self, request_id: i32, last: Option<Notification>) {
        let mut state = self.lock();
        state.active.shift_remove(&request_id);

        if state.foreground == Some(request_id) {
            state.foreground = state.active.first().copied();
            match state.foreground {
                Some(next) => self.sink.start_foreground(next),
                None => self.sink.stop_foreground(),
            }
        }

        match last {
            Some(notification) => self.sink.post(Notification {
                ongoing: false,
                ..notification
            }),
            None => self.sink.cancel(request_id),
        }
    }

    pub fn foreground(&self) -> Option<i32> {
        self.lock().foreground
    }
}

/// Published once for every job that finishes with [`DownloadState::Done`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadCompleted {
    pub request_id: i32,
    /// The downloaded manga without its chapter list
    pub manga: Manga,
}

/// Outcome of observing one job
#[derive(Debug, Clone)]
pub struct Observed {
    pub state: DownloadState,
    pub cancelled: bool,
}

/// Renders a job's progress until it ends, then finalizes its notification.
#[derive(Clone)]
pub struct NotificationCoordinator {
    switcher: Arc<ForegroundSwitcher>,
    throttle: Duration,
    completions: broadcast::Sender<DownloadCompleted>,
    metrics: Arc<Metrics>,
}

impl NotificationCoordinator {
    pub fn new(
        switcher: Arc<ForegroundSwitcher>,
        throttle: Duration,
        completions: broadcast::Sender<DownloadCompleted>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            switcher,
            throttle,
            completions,
            metrics,
        }
    }

    /// Follow `job` until it is terminal.
    ///
    /// `Progress` renders are spaced at least `throttle` apart; during the
    /// wait only the newest state is kept. Other kinds render at once.
    pub async fn observe(
        &self,
        request_id: i32,
        title: &str,
        job: &ProgressJob<DownloadState>,
    ) -> Observed {
        let renderer = DownloadNotification::new(request_id, title);
        let mut states = Box::pin(job.subscribe());

        while let Some(state) = states.next().await {
            if state.is_terminal() {
                break;
            }
            self.switcher.notify(renderer.create(&state));
            if matches!(state, DownloadState::Progress { .. }) {
                tokio::select! {
                    _ = tokio::time::sleep(self.throttle) => {}
                    _ = job.join() => {}
                }
            }
        }

        let state = job.join().await;
        let cancelled = job.is_cancelled();

        match &state {
            DownloadState::Done { result } => {
                self.metrics.download_completed();
                let event = DownloadCompleted {
                    request_id,
                    manga: result.without_chapters(),
                };
                // No receivers is fine.
                let receivers = self.completions.send(event).unwrap_or(0);
                info!(request_id, manga_id = result.id, receivers, "Download completed");
            }
            DownloadState::Error { .. } => self.metrics.download_failed(),
            DownloadState::Cancelled => self.metrics.download_cancelled(),
            DownloadState::Queued | DownloadState::Progress { .. } => {}
        }

        if cancelled || matches!(state, DownloadState::Cancelled) {
            self.switcher.detach(request_id, None);
        } else {
            self.switcher.detach(request_id, Some(renderer.create(&state)));
        }

        Observed { state, cancelled }
    }
}
