/// Fjall-based persistence for manga rows, tracking logs and app settings
///
/// Uses Fjall (an embedded LSM key-value store) to persist:
///
/// - Manga rows and their tags (`manga`, `tags`, `manga_tags`)
/// - Tracking logs: chapters found by the update checker (`track_logs`)
/// - App settings such as the traffic warning preference (`settings`)
/// - Metadata (pruning state)
///
/// Tracking logs are read back joined with their manga through
/// [`TrackLogWithManga`], newest first.
///
/// ## Usage
///
/// ```rust,ignore
/// use mangabox::ledger::FjallStore;
///
/// let store = FjallStore::open("data/ledger")?;
/// store.upsert_manga(&manga)?;
/// store.record_track_log(manga.id, &["Chapter 12".to_string()])?;
/// let feed = store.track_logs(0, 20)?;
/// ```

pub mod entities;
pub mod error;
pub mod partitions;
pub mod pruning;
pub mod store;

pub use entities::{FeedItem, MangaEntity, TagEntity, TrackLogEntity, TrackLogWithManga, TrackingLogItem};
pub use error::{LedgerError, Result};
pub use pruning::{PruneStats, RETENTION_TRACK_LOGS_DAYS};
pub use store::{FjallStore, StoreStats};
