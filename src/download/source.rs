use async_trait::async_trait;

use super::error::SourceError;
use crate::manga::{Manga, MangaChapter, MangaPage};

/// Resolves the pages of a chapter.
///
/// Parsers for individual sites live outside this crate; they plug in here.
#[async_trait]
pub trait MangaSource: Send + Sync {
    async fn pages(&self, chapter: &MangaChapter) -> Result<Vec<MangaPage>, SourceError>;

    /// Final image URL of a page. Sources that hide images behind an extra
    /// request override this.
    async fn page_url(&self, page: &MangaPage) -> Result<String, SourceError> {
        Ok(page.url.clone())
    }

    /// Headers sent with every page and cover request of `manga`.
    fn request_headers(&self, manga: &Manga) -> Vec<(String, String)> {
        if manga.public_url.is_empty() {
            Vec::new()
        } else {
            vec![("Referer".to_string(), manga.public_url.clone())]
        }
    }
}

/// Source for chapters that already carry their page list.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedPages;

#[async_trait]
impl MangaSource for EmbeddedPages {
    async fn pages(&self, chapter: &MangaChapter) -> Result<Vec<MangaPage>, SourceError> {
        if chapter.pages.is_empty() {
            return Err(SourceError::NoPages(chapter.id));
        }
        Ok(chapter.pages.clone())
    }
}
