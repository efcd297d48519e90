use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::DownloadError;
use super::http::{HttpClient, HttpConfig, HttpError};
use super::request::DownloadRequest;
use super::source::MangaSource;
use super::state::DownloadState;
use crate::config::DownloadConfig;
use crate::manga::{LOCAL_SOURCE, Manga, MangaChapter, MangaPage};
use crate::progress::{ProgressJob, ProgressReporter};
use crate::storage::{StorageClient, StorageError, manga_prefix};

/// Starts download jobs and owns their execution.
///
/// At most `max_parallel_downloads` jobs fetch pages at the same time; the
/// rest stay [`DownloadState::Queued`] until a slot frees up.
#[derive(Clone)]
pub struct DownloadManager {
    worker: Arc<Worker>,
}

struct Worker {
    http: HttpClient,
    source: Arc<dyn MangaSource>,
    storage: StorageClient,
    slots: Arc<Semaphore>,
}

/// Keys written by one job, removed again if the job does not finish.
#[derive(Default)]
struct WrittenKeys(Mutex<Vec<String>>);

impl WrittenKeys {
    fn push(&self, key: String) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).push(key);
    }

    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

enum Interrupted {
    Cancelled,
    Failed(DownloadError),
}

impl DownloadManager {
    pub fn new(
        config: &DownloadConfig,
        source: Arc<dyn MangaSource>,
        storage: StorageClient,
    ) -> Result<Self, HttpError> {
        let http = HttpClient::new(HttpConfig::from(config))?;
        Ok(Self {
            worker: Arc::new(Worker {
                http,
                source,
                storage,
                slots: Arc::new(Semaphore::new(config.max_parallel_downloads)),
            }),
        })
    }

    /// Start downloading the chapters selected by `request`.
    ///
    /// Returns immediately; the job starts out `Queued`.
    pub fn download_manga(&self, request: &DownloadRequest) -> ProgressJob<DownloadState> {
        let worker = Arc::clone(&self.worker);
        let request = request.clone();
        ProgressJob::spawn(DownloadState::Queued, move |reporter, cancel| async move {
            worker.run(request, reporter, cancel).await
        })
    }

    pub fn storage(&self) -> &StorageClient {
        &self.worker.storage
    }
}

impl Worker {
    async fn run(
        &self,
        request: DownloadRequest,
        reporter: ProgressReporter<DownloadState>,
        cancel: CancellationToken,
    ) -> DownloadState {
        let request_id = request.request_id();
        let manga_id = request.manga().id;

        let _permit = tokio::select! {
            _ = cancel.cancelled() => return DownloadState::Cancelled,
            permit = Arc::clone(&self.slots).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    return DownloadState::error(DownloadError::Abandoned(
                        "download slots closed".to_string(),
                    ));
                }
            },
        };
        info!(request_id, manga_id, "Download started");

        let written = WrittenKeys::default();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Interrupted::Cancelled),
            result = self.execute(&request, &reporter, &written) => result.map_err(Interrupted::Failed),
        };

        match outcome {
            Ok(local) => {
                info!(request_id, manga_id, "Download finished");
                DownloadState::Done {
                    result: Arc::new(local),
                }
            }
            Err(Interrupted::Cancelled) => {
                info!(request_id, manga_id, "Download cancelled");
                self.discard(request_id, written.take()).await;
                DownloadState::Cancelled
            }
            Err(Interrupted::Failed(e)) => {
                error!(request_id, manga_id, error = %e, "Download failed");
                self.discard(request_id, written.take()).await;
                DownloadState::error(e)
            }
        }
    }

    async fn execute(
        &self,
        request: &DownloadRequest,
        reporter: &ProgressReporter<DownloadState>,
        written: &WrittenKeys,
    ) -> Result<Manga, DownloadError> {
        let manga = request.manga();
        let request_id = request.request_id();
        let chapters = select_chapters(manga, request)?;
        let prefix = manga_prefix(manga.id);
        let headers = self.source.request_headers(manga);

        let cover = match &manga.cover_url {
            Some(url) => match self.fetch_cover(&prefix, url, &headers).await {
                Ok(key) => {
                    written.push(key.clone());
                    Some(key)
                }
                Err(e) => {
                    warn!(request_id, manga_id = manga.id, error = %e, "Cover download failed");
                    None
                }
            },
            None => None,
        };

        let mut plan = Vec::with_capacity(chapters.len());
        for chapter in chapters {
            let pages = self.source.pages(chapter).await?;
            plan.push((chapter, pages));
        }

        let total: usize = plan.iter().map(|(_, pages)| pages.len()).sum();
        let mut current = 0;
        reporter.report(DownloadState::Progress {
            request_id,
            current,
            total,
        });

        let mut local_chapters = Vec::with_capacity(plan.len());
        for (chapter, pages) in plan {
            let chapter_prefix = format!("{}/{}", prefix, chapter.id);
            let mut local_pages = Vec::with_capacity(pages.len());

            for (index, page) in pages.iter().enumerate() {
                let url = self.source.page_url(page).await?;
                let resource = self.http.download(&url, &headers).await?;
                let key = format!("{}/{:04}.{}", chapter_prefix, index + 1, resource.extension(&url));
                self.storage.upload(&key, resource.bytes.to_vec()).await?;
                written.push(key.clone());
                debug!(request_id, chapter_id = chapter.id, page = index + 1, "Page stored");

                local_pages.push(MangaPage {
                    id: page.id,
                    url: key,
                    preview: None,
                });
                current += 1;
                reporter.report(DownloadState::Progress {
                    request_id,
                    current,
                    total,
                });
            }

            local_chapters.push(MangaChapter {
                url: chapter_prefix,
                pages: local_pages,
                ..chapter.clone()
            });
        }

        let index_key = format!("{}/index.json", prefix);
        let previous = self.read_index(&index_key).await;
        let local = Manga {
            url: format!("local://{}", manga.id),
            source: LOCAL_SOURCE.to_string(),
            cover_url: cover.or_else(|| previous.as_ref().and_then(|m| m.cover_url.clone())),
            chapters: Some(merge_chapters(
                previous.and_then(|m| m.chapters).unwrap_or_default(),
                local_chapters,
            )),
            ..manga.clone()
        };
        self.storage
            .upload(&index_key, serde_json::to_vec_pretty(&local)?)
            .await?;

        Ok(local)
    }

    async fn fetch_cover(
        &self,
        prefix: &str,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<String, DownloadError> {
        let resource = self.http.download(url, headers).await?;
        let key = format!("{}/cover.{}", prefix, resource.extension(url));
        self.storage.upload(&key, resource.bytes.to_vec()).await?;
        Ok(key)
    }

    /// Index left by an earlier download of the same manga, if readable
    async fn read_index(&self, key: &str) -> Option<Manga> {
        match self.storage.download(key).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(manga) => Some(manga),
                Err(e) => {
                    warn!(key, error = %e, "Ignoring unreadable local index");
                    None
                }
            },
            Err(StorageError::NotFound(_)) => None,
            Err(e) => {
                warn!(key, error = %e, "Failed to read local index");
                None
            }
        }
    }

    async fn discard(&self, request_id: i32, keys: Vec<String>) {
        if keys.is_empty() {
            return;
        }
        match self.storage.delete_all(&keys).await {
            Ok(removed) => debug!(request_id, removed, "Partial download removed"),
            Err(e) => warn!(request_id, error = %e, "Failed to remove partial download"),
        }
    }
}

/// Chapters of the request's manga, in manga order.
fn select_chapters<'a>(
    manga: &'a Manga,
    request: &DownloadRequest,
) -> Result<Vec<&'a MangaChapter>, DownloadError> {
    let all = match manga.chapters.as_deref() {
        Some(chapters) if !chapters.is_empty() => chapters,
        _ => return Err(DownloadError::NoChapters),
    };

    let selected: Vec<&MangaChapter> = match request.chapter_ids() {
        None => all.iter().collect(),
        Some(ids) => all.iter().filter(|c| ids.contains(&c.id)).collect(),
    };

    if selected.is_empty() {
        return Err(DownloadError::ChaptersNotFound);
    }
    Ok(selected)
}

/// Union by chapter id; fresh chapters replace stored ones. Sorted by number.
fn merge_chapters(previous: Vec<MangaChapter>, fresh: Vec<MangaChapter>) -> Vec<MangaChapter> {
    let mut by_id: BTreeMap<i64, MangaChapter> = previous.into_iter().map(|c| (c.id, c)).collect();
    for chapter in fresh {
        by_id.insert(chapter.id, chapter);
    }
    let mut chapters: Vec<MangaChapter> = by_id.into_values().collect();
    chapters.sort_by_key(|c| (c.number, c.id));
    chapters
}
