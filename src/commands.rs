use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cli::DownloadArgs;
use mangabox::api::{AppState, shutdown_signal};
use mangabox::config::Config;
use mangabox::download::{DownloadRequest, EmbeddedPages};
use mangabox::ledger::FjallStore;
use mangabox::manga::Manga;
use mangabox::service::{Confirmation, IdleWatchdog, StartOutcome, TransferDecision};
use mangabox::storage::StorageClient;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Runs the download service in-process for a single manga and stops it once
/// the watchdog sees no active downloads.
pub async fn download(config: Config, args: DownloadArgs) -> Result<(), AnyError> {
    let manga: Manga = serde_json::from_slice(&tokio::fs::read(&args.manga).await?)?;
    let storage = StorageClient::local(&config.download.storage_path)?;
    let watchdog = IdleWatchdog::new(
        config.watchdog.poll_interval.as_duration(),
        config.watchdog.debounce.as_duration(),
    );
    let (state, service_task) = AppState::build(config, storage, Arc::new(EmbeddedPages))?;

    let request_id = state.service.next_request_id();
    let request = DownloadRequest::new(request_id, manga, args.chapters);

    let proceed = if request.is_empty_selection() {
        warn!("Empty chapter selection, nothing to download");
        false
    } else {
        let confirmation = args.yes.then(|| Confirmation::proceed(args.dont_ask_again));
        match state.gate.check(confirmation)? {
            TransferDecision::Proceed => true,
            TransferDecision::ConfirmationRequired => {
                warn!("Network is metered, rerun with --yes to download anyway");
                false
            }
            TransferDecision::Declined => false,
        }
    };

    if proceed {
        let mut completions = state.service.completions();

        match state.service.start(request).await? {
            StartOutcome::Started(request_id) => {
                info!(request_id, "Download started");
                let shutdown = CancellationToken::new();
                tokio::select! {
                    _ = watchdog.run(&state.service, shutdown.clone(), || {}) => {}
                    _ = shutdown_signal() => shutdown.cancel(),
                }
            }
            StartOutcome::Rejected => warn!("Empty chapter selection, nothing to download"),
        }

        while let Ok(done) = completions.try_recv() {
            info!(
                request_id = done.request_id,
                manga_id = done.manga.id,
                url = %done.manga.url,
                "Saved to library"
            );
        }
        for notification in state.board.list() {
            info!(request_id = notification.request_id, "{}: {}", notification.title, notification.text);
        }
    }

    let abandoned = state.service.shutdown().await?;
    if abandoned > 0 {
        warn!(abandoned, "Stopped with downloads still running");
    }
    if let Err(err) = service_task.await {
        error!(error = %err, "Download service task failed");
    }
    state.store.persist()?;
    Ok(())
}

pub fn prune(config: &Config) -> Result<(), AnyError> {
    let store = FjallStore::open(&config.server.ledger_path)?;
    let stats = store.prune_expired(config.retention.track_logs_ttl_days as u64)?;
    info!(track_logs_pruned = stats.track_logs_pruned, "Prune finished");
    Ok(())
}
