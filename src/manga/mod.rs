//! Manga domain model shared by the downloader, the service and the ledger.

use bon::Builder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Source name used for manga that live in local storage.
pub const LOCAL_SOURCE: &str = "LOCAL";

/// A manga with optional chapter list.
///
/// `chapters` is `None` when the details were never fetched, which is
/// different from an empty list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct Manga {
    pub id: i64,
    #[builder(into)]
    pub title: String,
    #[builder(into)]
    pub url: String,
    #[builder(into, default)]
    #[serde(default)]
    pub public_url: String,
    #[builder(into)]
    pub cover_url: Option<String>,
    #[builder(into)]
    pub author: Option<String>,
    #[builder(default)]
    #[serde(default)]
    pub tags: BTreeSet<MangaTag>,
    #[builder(into)]
    pub source: String,
    pub chapters: Option<Vec<MangaChapter>>,
}

impl Manga {
    /// Copy of this manga with the chapter list dropped.
    pub fn without_chapters(&self) -> Manga {
        Manga {
            chapters: None,
            ..self.clone()
        }
    }

    pub fn is_local(&self) -> bool {
        self.source == LOCAL_SOURCE
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MangaChapter {
    pub id: i64,
    pub name: String,
    pub number: u32,
    pub url: String,
    #[serde(default)]
    pub scanlator: Option<String>,
    /// Upload time in epoch milliseconds, 0 when unknown.
    #[serde(default)]
    pub upload_date: i64,
    #[serde(default)]
    pub branch: Option<String>,
    /// Page list when the source already resolved it.
    #[serde(default)]
    pub pages: Vec<MangaPage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MangaPage {
    pub id: i64,
    pub url: String,
    #[serde(default)]
    pub preview: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MangaTag {
    pub key: String,
    pub title: String,
    pub source: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(id: i64) -> MangaChapter {
        MangaChapter {
            id,
            name: format!("Chapter {}", id),
            number: id as u32,
            url: format!("/chapter/{}", id),
            scanlator: None,
            upload_date: 0,
            branch: None,
            pages: Vec::new(),
        }
    }

    #[test]
    fn test_without_chapters_keeps_metadata() {
        let manga = Manga::builder()
            .id(42)
            .title("Blame!")
            .url("/manga/42")
            .source("MANGADEX")
            .cover_url("https://cdn.example.com/42.jpg")
            .chapters(vec![chapter(1), chapter(2)])
            .build();

        let stripped = manga.without_chapters();
        assert!(stripped.chapters.is_none());
        assert_eq!(stripped.id, 42);
        assert_eq!(stripped.title, "Blame!");
        assert_eq!(stripped.cover_url.as_deref(), Some("https://cdn.example.com/42.jpg"));
        assert_eq!(manga.chapters.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn test_deserialize_minimal() {
        let json = r#"{
            "id": 7,
            "title": "Dorohedoro",
            "url": "/manga/7",
            "cover_url": null,
            "author": null,
            "source": "TEST",
            "chapters": [{"id": 1, "name": "One", "number": 1, "url": "/c/1"}]
        }"#;
        let manga: Manga = serde_json::from_str(json).unwrap();
        assert!(manga.tags.is_empty());
        assert!(!manga.is_local());
        let chapters = manga.chapters.unwrap();
        assert_eq!(chapters[0].pages.len(), 0);
        assert_eq!(chapters[0].upload_date, 0);
    }
}
