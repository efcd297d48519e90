use std::collections::BTreeSet;

use crate::manga::Manga;

/// One start request: a manga and an optional subset of its chapters.
///
/// `chapter_ids == None` means every chapter. Immutable once built.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    request_id: i32,
    manga: Manga,
    chapter_ids: Option<BTreeSet<i64>>,
}

impl DownloadRequest {
    pub fn new<I>(request_id: i32, manga: Manga, chapter_ids: Option<I>) -> Self
    where
        I: IntoIterator<Item = i64>,
    {
        Self {
            request_id,
            manga,
            chapter_ids: chapter_ids.map(|ids| ids.into_iter().collect()),
        }
    }

    pub fn request_id(&self) -> i32 {
        self.request_id
    }

    pub fn manga(&self) -> &Manga {
        &self.manga
    }

    pub fn chapter_ids(&self) -> Option<&BTreeSet<i64>> {
        self.chapter_ids.as_ref()
    }

    /// An explicit but empty chapter subset selects nothing.
    pub fn is_empty_selection(&self) -> bool {
        self.chapter_ids.as_ref().is_some_and(BTreeSet::is_empty)
    }
}
