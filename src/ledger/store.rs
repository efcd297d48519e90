use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::manga::Manga;

use super::entities::{MangaEntity, TagEntity, TrackLogEntity, TrackLogWithManga, TrackingLogItem};
use super::error::{LedgerError, Result};
use super::partitions::{
    decode_manga_tag_key, decode_track_log_key, encode_manga_key, encode_manga_tag_key,
    encode_manga_tag_prefix, encode_meta_key, encode_setting_key, encode_tag_key,
    encode_track_log_key,
};
use super::pruning::{PruneStats, prune_track_logs};

/// Fjall-backed persistent storage for manga rows, tracking logs and settings
#[derive(Clone)]
pub struct FjallStore {
    keyspace: Keyspace,
    manga: PartitionHandle,
    tags: PartitionHandle,
    manga_tags: PartitionHandle,
    track_logs: PartitionHandle,
    settings: PartitionHandle,
    metadata: PartitionHandle,
    next_log_id: Arc<AtomicI64>,
}

impl FjallStore {
    /// Open or create a Fjall store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening Fjall store at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;

        let manga = keyspace.open_partition("manga", PartitionCreateOptions::default())?;
        let tags = keyspace.open_partition("tags", PartitionCreateOptions::default())?;
        let manga_tags = keyspace.open_partition("manga_tags", PartitionCreateOptions::default())?;
        let track_logs = keyspace.open_partition("track_logs", PartitionCreateOptions::default())?;
        let settings = keyspace.open_partition("settings", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        let last_log_id = match track_logs.last_key_value()? {
            Some((key, _)) => decode_track_log_key(&key)
                .ok_or_else(|| LedgerError::InvalidKey(String::from_utf8_lossy(&key).into_owned()))?,
            None => 0,
        };

        info!(last_log_id, "Fjall store opened successfully");
        Ok(Self {
            keyspace,
            manga,
            tags,
            manga_tags,
            track_logs,
            settings,
            metadata,
            next_log_id: Arc::new(AtomicI64::new(last_log_id + 1)),
        })
    }

    /// Store or update a manga row together with its tags
    pub fn upsert_manga(&self, manga: &Manga) -> Result<()> {
        let entity = MangaEntity::from_manga(manga);
        self.manga
            .insert(encode_manga_key(manga.id), serde_json::to_vec(&entity)?)?;

        let mut stale = Vec::new();
        for item in self.manga_tags.prefix(encode_manga_tag_prefix(manga.id)) {
            let (key, _) = item?;
            stale.push(key);
        }
        for key in &stale {
            self.manga_tags.remove(&key[..])?;
        }

        for tag in &manga.tags {
            let tag = TagEntity::from_tag(tag);
            self.tags
                .insert(encode_tag_key(tag.tag_id), serde_json::to_vec(&tag)?)?;
            self.manga_tags
                .insert(encode_manga_tag_key(manga.id, tag.tag_id), b"")?;
        }

        debug!(manga_id = manga.id, tags = manga.tags.len(), "Upserted manga");
        Ok(())
    }

    pub fn get_manga(&self, manga_id: i64) -> Result<Option<Manga>> {
        match self.manga_entity(manga_id)? {
            Some(entity) => {
                let tags = self
                    .tags_of(manga_id)?
                    .iter()
                    .map(TagEntity::to_manga_tag)
                    .collect::<BTreeSet<_>>();
                Ok(Some(entity.to_manga(tags)))
            }
            None => Ok(None),
        }
    }

    /// Record newly found chapters of a stored manga. Chapter names must not
    /// contain line breaks.
    pub fn record_track_log(&self, manga_id: i64, chapters: &[String]) -> Result<TrackLogEntity> {
        self.record_track_log_at(manga_id, chapters, chrono::Utc::now().timestamp_millis())
    }

    /// [`record_track_log`](Self::record_track_log) with an explicit creation
    /// time in epoch milliseconds
    pub fn record_track_log_at(
        &self,
        manga_id: i64,
        chapters: &[String],
        created_at: i64,
    ) -> Result<TrackLogEntity> {
        if self.manga_entity(manga_id)?.is_none() {
            return Err(LedgerError::MangaNotFound(manga_id));
        }

        let entity = TrackLogEntity {
            id: self.next_log_id.fetch_add(1, Ordering::SeqCst),
            manga_id,
            chapters: chapters.join("\n"),
            created_at,
        };
        self.track_logs
            .insert(encode_track_log_key(entity.id), serde_json::to_vec(&entity)?)?;
        debug!(log_id = entity.id, manga_id, chapters = chapters.len(), "Recorded track log");
        Ok(entity)
    }

    /// Track logs joined with their manga, newest first
    pub fn track_logs(&self, offset: usize, limit: usize) -> Result<Vec<TrackingLogItem>> {
        let mut items = Vec::with_capacity(limit.min(64));

        for item in self.track_logs.iter().rev().skip(offset) {
            if items.len() >= limit {
                break;
            }
            let (_, value) = item?;
            let track_log: TrackLogEntity = serde_json::from_slice(&value)?;

            let Some(manga) = self.manga_entity(track_log.manga_id)? else {
                warn!(log_id = track_log.id, manga_id = track_log.manga_id, "Track log without manga");
                continue;
            };
            let tags = self.tags_of(track_log.manga_id)?;

            items.push(
                TrackLogWithManga {
                    track_log,
                    manga,
                    tags,
                }
                .to_tracking_log_item(),
            );
        }

        Ok(items)
    }

    /// Delete every track log. Returns how many were removed.
    pub fn clear_track_logs(&self) -> Result<usize> {
        let mut keys = Vec::new();
        for item in self.track_logs.iter() {
            let (key, _) = item?;
            keys.push(key);
        }
        for key in &keys {
            self.track_logs.remove(&key[..])?;
        }
        info!(removed = keys.len(), "Cleared track logs");
        Ok(keys.len())
    }

    /// Prune track logs older than `ttl_days`
    pub fn prune_expired(&self, ttl_days: u64) -> Result<PruneStats> {
        info!("Starting pruning process");
        let stats = prune_track_logs(
            &self.track_logs,
            &self.metadata,
            ttl_days,
            chrono::Utc::now().timestamp_millis(),
        )?;
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        info!("Pruning completed: {:?}", stats);
        Ok(stats)
    }

    pub fn setting(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .settings
            .get(encode_setting_key(key))?
            .map(|value| String::from_utf8_lossy(&value).into_owned()))
    }

    pub fn put_setting(&self, key: &str, value: &str) -> Result<()> {
        self.settings.insert(encode_setting_key(key), value.as_bytes())?;
        debug!(key, value, "Stored setting");
        Ok(())
    }

    pub fn metadata(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .metadata
            .get(encode_meta_key(key))?
            .map(|value| String::from_utf8_lossy(&value).into_owned()))
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    /// Get internal statistics (for debugging/monitoring)
    pub fn stats(&self) -> Result<StoreStats> {
        let count = |partition: &PartitionHandle| -> Result<usize> {
            let mut n = 0;
            for item in partition.iter() {
                item?;
                n += 1;
            }
            Ok(n)
        };

        Ok(StoreStats {
            manga_count: count(&self.manga)?,
            tag_count: count(&self.tags)?,
            track_log_count: count(&self.track_logs)?,
            setting_count: count(&self.settings)?,
        })
    }

    fn manga_entity(&self, manga_id: i64) -> Result<Option<MangaEntity>> {
        match self.manga.get(encode_manga_key(manga_id))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn tags_of(&self, manga_id: i64) -> Result<Vec<TagEntity>> {
        let mut tags = Vec::new();
        for item in self.manga_tags.prefix(encode_manga_tag_prefix(manga_id)) {
            let (key, _) = item?;
            let Some((_, tag_id)) = decode_manga_tag_key(&key) else {
                return Err(LedgerError::InvalidKey(String::from_utf8_lossy(&key).into_owned()));
            };
            if let Some(value) = self.tags.get(encode_tag_key(tag_id))? {
                tags.push(serde_json::from_slice(&value)?);
            }
        }
        Ok(tags)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub manga_count: usize,
    pub tag_count: usize,
    pub track_log_count: usize,
    pub setting_count: usize,
}
