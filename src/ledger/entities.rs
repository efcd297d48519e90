//! Stored rows and the views joined from them

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::manga::{Manga, MangaTag};

/// Stable 64-bit string hash (31-multiplier polynomial with a 64-bit seed).
///
/// Used to derive tag ids so the same tag from the same source always maps
/// to the same row.
pub fn long_hash_code(value: &str) -> i64 {
    value
        .chars()
        .fold(1_125_899_906_842_597_i64, |h, c| h.wrapping_mul(31).wrapping_add(c as i64))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MangaEntity {
    pub manga_id: i64,
    pub title: String,
    pub url: String,
    pub public_url: String,
    pub cover_url: Option<String>,
    pub author: Option<String>,
    pub source: String,
}

impl MangaEntity {
    pub fn from_manga(manga: &Manga) -> Self {
        Self {
            manga_id: manga.id,
            title: manga.title.clone(),
            url: manga.url.clone(),
            public_url: manga.public_url.clone(),
            cover_url: manga.cover_url.clone(),
            author: manga.author.clone(),
            source: manga.source.clone(),
        }
    }

    /// Rebuild the manga with the given tags. The chapter list is not stored.
    pub fn to_manga(&self, tags: BTreeSet<MangaTag>) -> Manga {
        Manga {
            id: self.manga_id,
            title: self.title.clone(),
            url: self.url.clone(),
            public_url: self.public_url.clone(),
            cover_url: self.cover_url.clone(),
            author: self.author.clone(),
            tags,
            source: self.source.clone(),
            chapters: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagEntity {
    pub tag_id: i64,
    pub title: String,
    pub key: String,
    pub source: String,
}

impl TagEntity {
    pub fn from_tag(tag: &MangaTag) -> Self {
        Self {
            tag_id: long_hash_code(&format!("{}_{}", tag.key, tag.source)),
            title: tag.title.clone(),
            key: tag.key.clone(),
            source: tag.source.clone(),
        }
    }

    pub fn to_manga_tag(&self) -> MangaTag {
        MangaTag {
            key: self.key.clone(),
            title: self.title.clone(),
            source: self.source.clone(),
        }
    }
}

/// One "new chapters found" record of the tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackLogEntity {
    pub id: i64,
    pub manga_id: i64,
    /// Chapter names separated by `'\n'`
    pub chapters: String,
    /// Epoch milliseconds
    pub created_at: i64,
}

/// A track log joined with its manga and the manga's tags.
#[derive(Debug, Clone)]
pub struct TrackLogWithManga {
    pub track_log: TrackLogEntity,
    pub manga: MangaEntity,
    pub tags: Vec<TagEntity>,
}

impl TrackLogWithManga {
    pub fn to_tracking_log_item(&self) -> TrackingLogItem {
        TrackingLogItem {
            id: self.track_log.id,
            chapters: self
                .track_log
                .chapters
                .split('\n')
                .filter(|x| !x.is_empty())
                .map(str::to_string)
                .collect(),
            manga: self.manga.to_manga(self.tags.iter().map(TagEntity::to_manga_tag).collect()),
            created_at: Utc
                .timestamp_millis_opt(self.track_log.created_at)
                .single()
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingLogItem {
    pub id: i64,
    pub chapters: Vec<String>,
    pub manga: Manga,
    pub created_at: DateTime<Utc>,
}

impl TrackingLogItem {
    pub fn to_feed_item(&self) -> FeedItem {
        let count = self.chapters.len();
        FeedItem {
            id: self.id,
            image_url: self.manga.cover_url.clone().unwrap_or_default(),
            title: self.manga.title.clone(),
            subtitle: format!("{} new chapter{}", count, if count == 1 { "" } else { "s" }),
            chapters: self.chapters.join("\n"),
            manga: self.manga.clone(),
        }
    }
}

/// Row of the updates feed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedItem {
    pub id: i64,
    pub image_url: String,
    pub title: String,
    pub subtitle: String,
    pub chapters: String,
    pub manga: Manga,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(chapters: &str) -> TrackLogWithManga {
        let manga = Manga::builder()
            .id(8)
            .title("Berserk")
            .url("/m/8")
            .source("SRC")
            .cover_url("https://img/8.jpg")
            .build();
        let tag = MangaTag {
            key: "action".into(),
            title: "Action".into(),
            source: "SRC".into(),
        };
        TrackLogWithManga {
            track_log: TrackLogEntity {
                id: 3,
                manga_id: 8,
                chapters: chapters.to_string(),
                created_at: 1_700_000_000_000,
            },
            manga: MangaEntity::from_manga(&manga),
            tags: vec![TagEntity::from_tag(&tag)],
        }
    }

    #[test]
    fn test_chapters_split_drops_empty_segments() {
        let item = joined("Ch. 1\n\nCh. 2\n").to_tracking_log_item();
        assert_eq!(item.chapters, vec!["Ch. 1", "Ch. 2"]);
        assert!(joined("").to_tracking_log_item().chapters.is_empty());
    }

    #[test]
    fn test_tracking_log_item_fields() {
        let item = joined("Ch. 1").to_tracking_log_item();
        assert_eq!(item.id, 3);
        assert_eq!(item.manga.id, 8);
        assert_eq!(item.manga.tags.len(), 1);
        assert!(item.manga.chapters.is_none());
        assert_eq!(item.created_at.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_feed_item() {
        let feed = joined("a\nb").to_tracking_log_item().to_feed_item();
        assert_eq!(feed.subtitle, "2 new chapters");
        assert_eq!(feed.chapters, "a\nb");
        assert_eq!(feed.image_url, "https://img/8.jpg");
        assert_eq!(joined("a").to_tracking_log_item().to_feed_item().subtitle, "1 new chapter");
    }

    #[test]
    fn test_tag_id_is_stable() {
        let tag = MangaTag {
            key: "k".into(),
            title: "One".into(),
            source: "S".into(),
        };
        let renamed = MangaTag {
            title: "Two".into(),
            ..tag.clone()
        };
        assert_eq!(TagEntity::from_tag(&tag).tag_id, TagEntity::from_tag(&renamed).tag_id);
        assert_ne!(long_hash_code("a_S"), long_hash_code("b_S"));
    }
}
