use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;
use crate::download::{DownloadManager, HttpError, MangaSource};
use crate::ledger::{FjallStore, LedgerError};
use crate::observability::Metrics;
use crate::service::{
    AppSettings, DownloadService, ForegroundSwitcher, LoggingInhibitor, NotificationBoard,
    NotificationCoordinator, ServiceParts, StaticNetwork, TrafficGate, WakeLock,
};
use crate::storage::StorageClient;

/// Capacity of the completion broadcast; slower subscribers skip ahead.
const COMPLETIONS_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to open ledger: {0}")]
    Ledger(#[from] LedgerError),
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] HttpError),
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub service: DownloadService,
    pub gate: TrafficGate,
    pub store: FjallStore,
    pub board: Arc<NotificationBoard>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Open the ledger, wire the download pipeline and spawn the service
    /// task. The returned handle finishes once the service shuts down.
    pub fn build(
        config: Config,
        storage: StorageClient,
        source: Arc<dyn MangaSource>,
    ) -> Result<(Self, JoinHandle<()>), StartupError> {
        info!(path = %config.server.ledger_path.display(), "Opening ledger");
        let store = FjallStore::open(&config.server.ledger_path)?;

        let metrics = Arc::new(Metrics::new());
        let manager = DownloadManager::new(&config.download, source, storage)?;
        let board = Arc::new(NotificationBoard::new());
        let switcher = Arc::new(ForegroundSwitcher::new(board.clone()));
        let (completions, _) = broadcast::channel(COMPLETIONS_CAPACITY);
        let coordinator = NotificationCoordinator::new(
            switcher,
            config.notifications.progress_throttle.as_duration(),
            completions.clone(),
            metrics.clone(),
        );
        let wake_lock = WakeLock::new(
            "mangabox:downloads",
            config.download.wake_lock_timeout.as_duration(),
            Arc::new(LoggingInhibitor),
        );

        let parts = ServiceParts::builder()
            .manager(manager)
            .coordinator(coordinator)
            .wake_lock(wake_lock)
            .completions(completions)
            .metrics(metrics.clone())
            .build();
        let (service, join) = DownloadService::spawn(parts);

        let gate = TrafficGate::new(
            Arc::new(StaticNetwork::new(config.network.metered)),
            AppSettings::new(store.clone(), config.network.traffic_warning),
        );

        let state = Self {
            config: Arc::new(config),
            service,
            gate,
            store,
            board,
            metrics,
        };
        Ok((state, join))
    }
}
