//! The download service actor
//!
//! One tokio task owns the [`JobRegistry`] and the wake lock references;
//! [`DownloadService`] handles talk to it over an mpsc channel and wait for a
//! oneshot acknowledgement, so a `start` that returned is already visible in
//! every later snapshot. Each accepted job gets its own coordinator task that
//! renders notifications and sends `Release` back once the job is terminal.

use bon::Builder;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

use futures_util::{Stream, StreamExt};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tracing::{debug, info, warn};

use super::notification::{DownloadCompleted, NotificationCoordinator};
use super::registry::{JobRegistry, Snapshot};
use super::wakelock::{WakeLock, WakeLockGuard};
use super::watchdog::LivenessSource;
use crate::download::{DownloadManager, DownloadRequest, DownloadState};
use crate::observability::Metrics;
use crate::progress::ProgressJob;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Download service is not running")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Registry entry: the request and the job started for it
#[derive(Debug, Clone)]
pub struct ActiveDownload {
    pub request: Arc<DownloadRequest>,
    pub job: ProgressJob<DownloadState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// No registered jobs
    Idle,
    /// At least one registered job
    Active,
}

impl ServiceState {
    fn of(active: usize) -> Self {
        if active == 0 { ServiceState::Idle } else { ServiceState::Active }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started(i32),
    /// Explicit empty chapter subset; nothing was registered
    Rejected,
}

#[derive(Debug)]
enum Command {
    Start {
        request: DownloadRequest,
        reply: oneshot::Sender<StartOutcome>,
    },
    Cancel {
        request_id: i32,
        reply: oneshot::Sender<bool>,
    },
    Release {
        request_id: i32,
        job: ProgressJob<DownloadState>,
    },
    Shutdown {
        reply: oneshot::Sender<usize>,
    },
}

/// Collaborators of the service task
#[derive(Builder)]
pub struct ServiceParts {
    manager: DownloadManager,
    coordinator: NotificationCoordinator,
    wake_lock: WakeLock,
    completions: broadcast::Sender<DownloadCompleted>,
    #[builder(default)]
    metrics: Arc<Metrics>,
}

/// Cloneable handle to the download service
#[derive(Clone)]
pub struct DownloadService {
    tx: mpsc::Sender<Command>,
    downloads: watch::Receiver<Snapshot<ActiveDownload>>,
    completions: broadcast::Sender<DownloadCompleted>,
    next_request_id: Arc<AtomicI32>,
    bound: Arc<AtomicUsize>,
    metrics: Arc<Metrics>,
}

impl DownloadService {
    /// Spawn the service task on the current runtime.
    pub fn spawn(parts: ServiceParts) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(128);
        let registry = JobRegistry::new();
        let handle = Self {
            tx: tx.clone(),
            downloads: registry.watch(),
            completions: parts.completions.clone(),
            next_request_id: Arc::new(AtomicI32::new(1)),
            bound: Arc::new(AtomicUsize::new(0)),
            metrics: Arc::clone(&parts.metrics),
        };

        let actor = Actor {
            registry,
            wake_refs: HashMap::new(),
            state: ServiceState::Idle,
            tx: tx.downgrade(),
            parts,
        };
        let join = tokio::spawn(actor.run(rx));
        info!("Download service started");
        (handle, join)
    }

    /// Fresh request id for callers that do not bring their own
    pub fn next_request_id(&self) -> i32 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Start (or replace) the job for `request.request_id()`.
    pub async fn start(&self, request: DownloadRequest) -> Result<StartOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Start { request, reply }).await?;
        rx.await.map_err(|_| ServiceError::ChannelClosed)
    }

    /// Remove and cancel the job for `request_id`. Returns `false` if no
    /// job was registered under that id.
    pub async fn cancel(&self, request_id: i32) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Cancel { request_id, reply }).await?;
        rx.await.map_err(|_| ServiceError::ChannelClosed)
    }

    /// Stop the service. Registered jobs are cancelled and not awaited.
    /// Returns how many jobs were still registered.
    pub async fn shutdown(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Shutdown { reply }).await?;
        rx.await.map_err(|_| ServiceError::ChannelClosed)
    }

    pub fn bind(&self) -> DownloadBinder {
        let bound = self.bound.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(bound, "Binder attached");
        DownloadBinder {
            downloads: self.downloads.clone(),
            bound: Arc::clone(&self.bound),
        }
    }

    /// Number of binders not yet released
    pub fn bound_clients(&self) -> usize {
        self.bound.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Snapshot<ActiveDownload> {
        self.downloads.borrow().clone()
    }

    pub fn state(&self) -> ServiceState {
        ServiceState::of(self.downloads.borrow().len())
    }

    pub fn completions(&self) -> broadcast::Receiver<DownloadCompleted> {
        self.completions.subscribe()
    }

    /// Completion events as a stream; lagged receivers skip what they missed.
    pub fn completion_stream(&self) -> BroadcastStream<DownloadCompleted> {
        BroadcastStream::new(self.completions.subscribe())
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.tx.send(command).await.map_err(|_| ServiceError::ChannelClosed)
    }
}

impl LivenessSource for DownloadService {
    fn active_work(&self) -> usize {
        self.downloads.borrow().len()
    }
}

/// View of the active jobs handed to a UI client. Released when dropped;
/// releasing it does not affect the jobs.
pub struct DownloadBinder {
    downloads: watch::Receiver<Snapshot<ActiveDownload>>,
    bound: Arc<AtomicUsize>,
}

impl DownloadBinder {
    /// The current snapshot, then a new one after every registry change
    pub fn downloads(&self) -> WatchStream<Snapshot<ActiveDownload>> {
        WatchStream::new(self.downloads.clone())
    }

    /// Same as [`downloads`](Self::downloads), but the binder stays attached
    /// until the stream is dropped.
    pub fn into_downloads(self) -> impl Stream<Item = Snapshot<ActiveDownload>> + Send + 'static {
        let stream = self.downloads();
        futures_util::stream::unfold((stream, self), |(mut stream, binder)| async move {
            let snapshot = stream.next().await?;
            Some((snapshot, (stream, binder)))
        })
    }

    pub fn snapshot(&self) -> Snapshot<ActiveDownload> {
        self.downloads.borrow().clone()
    }

    /// Release the binder now.
    pub fn unbind(self) {}
}

impl Drop for DownloadBinder {
    fn drop(&mut self) {
        let bound = self.bound.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        debug!(bound, "Binder released");
    }
}

struct Actor {
    registry: JobRegistry<ActiveDownload>,
    wake_refs: HashMap<i32, WakeLockGuard>,
    state: ServiceState,
    tx: mpsc::WeakSender<Command>,
    parts: ServiceParts,
}

impl Actor {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Start { request, reply } => {
                    let _ = reply.send(self.start(request));
                }
                Command::Cancel { request_id, reply } => {
                    let _ = reply.send(self.cancel(request_id));
                }
                Command::Release { request_id, job } => self.release(request_id, &job),
                Command::Shutdown { reply } => {
                    let _ = reply.send(self.teardown());
                    return;
                }
            }
        }
        self.teardown();
    }

    fn start(&mut self, request: DownloadRequest) -> StartOutcome {
        let request_id = request.request_id();
        if request.is_empty_selection() {
            self.parts.metrics.request_rejected();
            debug!(request_id, "Ignoring start with empty chapter selection");
            return StartOutcome::Rejected;
        }

        let job = self.parts.manager.download_manga(&request);
        let request = Arc::new(request);
        let entry = ActiveDownload {
            request: Arc::clone(&request),
            job: job.clone(),
        };
        if let Some(previous) = self.registry.register(request_id, entry) {
            warn!(
                request_id,
                previous_job = previous.job.serial(),
                "Request id reused, previous job is no longer tracked"
            );
        }
        self.wake_refs.insert(request_id, self.parts.wake_lock.acquire());
        self.parts.metrics.download_started();
        info!(request_id, manga_id = request.manga().id, job = job.serial(), "Download accepted");

        let coordinator = self.parts.coordinator.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let observed = coordinator.observe(request_id, &request.manga().title, &job).await;
            debug!(request_id, cancelled = observed.cancelled, "Coordinator finished");
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::Release { request_id, job }).await;
            }
        });

        self.refresh_state();
        StartOutcome::Started(request_id)
    }

    fn cancel(&mut self, request_id: i32) -> bool {
        let Some(entry) = self.registry.remove(request_id) else {
            debug!(request_id, "Cancel for unknown request ignored");
            return false;
        };
        self.wake_refs.remove(&request_id);
        let accepted = entry.job.cancel();
        info!(request_id, accepted, "Download cancel requested");
        self.refresh_state();
        true
    }

    fn release(&mut self, request_id: i32, job: &ProgressJob<DownloadState>) {
        if self
            .registry
            .remove_if(request_id, |entry| entry.job.ptr_eq(job))
            .is_some()
        {
            self.wake_refs.remove(&request_id);
            debug!(request_id, "Download released");
            self.refresh_state();
        }
    }

    fn teardown(&mut self) -> usize {
        let abandoned = self.registry.drain();
        for (request_id, entry) in &abandoned {
            entry.job.cancel();
            warn!(request_id, job = entry.job.serial(), "Download abandoned at shutdown");
        }
        self.wake_refs.clear();
        self.refresh_state();
        info!(abandoned = abandoned.len(), "Download service stopped");
        abandoned.len()
    }

    fn refresh_state(&mut self) {
        let next = ServiceState::of(self.registry.len());
        if next != self.state {
            info!(from = ?self.state, to = ?next, active = self.registry.len(), "Service state changed");
            self.state = next;
        }
    }
}
