/// Key layout and encoding utilities for Fjall partitions
///
/// Partition structure:
/// - `manga`: manga:{manga_id} -> MangaEntity (JSON)
/// - `tags`: tag:{tag_id} -> TagEntity (JSON)
/// - `manga_tags`: mt:{manga_id}:{tag_id} -> empty
/// - `track_logs`: log:{id:020} -> TrackLogEntity (JSON)
/// - `settings`: setting:{key} -> value (string)
/// - `metadata`: meta:{key} -> value (string)

/// Encode a manga key: manga:{manga_id}
pub fn encode_manga_key(manga_id: i64) -> Vec<u8> {
    format!("manga:{}", manga_id).into_bytes()
}

/// Encode a tag key: tag:{tag_id}
pub fn encode_tag_key(tag_id: i64) -> Vec<u8> {
    format!("tag:{}", tag_id).into_bytes()
}

/// Encode a manga/tag link: mt:{manga_id}:{tag_id}
pub fn encode_manga_tag_key(manga_id: i64, tag_id: i64) -> Vec<u8> {
    format!("mt:{}:{}", manga_id, tag_id).into_bytes()
}

/// Prefix of every link of one manga: mt:{manga_id}:
pub fn encode_manga_tag_prefix(manga_id: i64) -> Vec<u8> {
    format!("mt:{}:", manga_id).into_bytes()
}

/// Decode a manga/tag link -> (manga_id, tag_id)
pub fn decode_manga_tag_key(key: &[u8]) -> Option<(i64, i64)> {
    let key_str = std::str::from_utf8(key).ok()?;
    let (manga_id, tag_id) = key_str.strip_prefix("mt:")?.split_once(':')?;
    Some((manga_id.parse().ok()?, tag_id.parse().ok()?))
}

/// Encode a track log key: log:{id:020}
///
/// Zero padding keeps lexicographic order equal to id order.
pub fn encode_track_log_key(id: i64) -> Vec<u8> {
    format!("log:{:020}", id).into_bytes()
}

/// Decode a track log key -> id
pub fn decode_track_log_key(key: &[u8]) -> Option<i64> {
    let key_str = std::str::from_utf8(key).ok()?;
    key_str.strip_prefix("log:")?.parse().ok()
}

/// Encode a settings key: setting:{key}
pub fn encode_setting_key(key: &str) -> Vec<u8> {
    format!("setting:{}", key).into_bytes()
}

/// Encode a metadata key: meta:{key}
pub fn encode_meta_key(key: &str) -> Vec<u8> {
    format!("meta:{}", key).into_bytes()
}
