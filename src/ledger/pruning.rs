/// Retention of tracking logs
use fjall::PartitionHandle;
use serde::Serialize;
use tracing::info;

use super::entities::TrackLogEntity;
use super::error::Result;
use super::partitions::encode_meta_key;

/// Default retention of tracking logs (days)
pub const RETENTION_TRACK_LOGS_DAYS: u64 = 90;

/// Metadata key for pruning state
pub const META_LAST_PRUNE_LOGS: &str = "last_prune_logs";

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Pruning statistics
#[derive(Debug, Default, Clone, Serialize)]
pub struct PruneStats {
    pub track_logs_pruned: usize,
}

/// Remove track logs created more than `ttl_days` before `now_millis`.
pub fn prune_track_logs(
    track_logs: &PartitionHandle,
    metadata: &PartitionHandle,
    ttl_days: u64,
    now_millis: i64,
) -> Result<PruneStats> {
    let ttl_millis = i64::try_from(ttl_days)
        .unwrap_or(i64::MAX)
        .saturating_mul(MILLIS_PER_DAY);
    let cutoff = now_millis.saturating_sub(ttl_millis);

    // Keys are ordered by id, which follows creation order, but scan everything
    // so imported logs with older timestamps are caught as well.
    let mut expired = Vec::new();
    for item in track_logs.iter() {
        let (key, value) = item?;
        let entity: TrackLogEntity = serde_json::from_slice(&value)?;
        if entity.created_at < cutoff {
            expired.push(key);
        }
    }

    for key in &expired {
        track_logs.remove(&key[..])?;
    }

    metadata.insert(
        encode_meta_key(META_LAST_PRUNE_LOGS),
        now_millis.to_string().as_bytes(),
    )?;

    let stats = PruneStats {
        track_logs_pruned: expired.len(),
    };
    info!(pruned = stats.track_logs_pruned, ttl_days, "Pruned expired track logs");
    Ok(stats)
}
