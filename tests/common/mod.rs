#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use tokio::sync::watch;

use mangabox::api::AppState;
use mangabox::config::{Config, HumanDuration};
use mangabox::download::{EmbeddedPages, MangaSource, SourceError};
use mangabox::manga::{Manga, MangaChapter, MangaPage};
use mangabox::storage::StorageClient;

pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake-page";

/// Serves fake page images: `/pages/{name}` answers with PNG bytes,
/// `/missing/{name}` with 404.
pub async fn start_page_server() -> String {
    let app = Router::new()
        .route("/pages/{name}", get(serve_page))
        .route("/missing/{name}", get(|| async { StatusCode::NOT_FOUND }));

    let addr = SocketAddr::from(([127, 0, 0, 1], 0));
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    let bound_addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", bound_addr)
}

async fn serve_page() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/png")], PNG_BYTES)
}

pub fn chapter(base: &str, id: i64, pages: usize) -> MangaChapter {
    MangaChapter {
        id,
        name: format!("Chapter {}", id),
        number: id as u32,
        url: format!("/chapter/{}", id),
        scanlator: None,
        upload_date: 0,
        branch: None,
        pages: (0..pages)
            .map(|i| MangaPage {
                id: id * 100 + i as i64,
                url: format!("{}/pages/{}-{}.png", base, id, i),
                preview: None,
            })
            .collect(),
    }
}

pub fn manga(id: i64, chapters: Option<Vec<MangaChapter>>) -> Manga {
    Manga::builder()
        .id(id)
        .title(format!("Manga {}", id))
        .url(format!("/manga/{}", id))
        .source("TEST")
        .maybe_chapters(chapters)
        .build()
}

/// Config pointing every path into `dir`, with short timings
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.server.ledger_path = dir.join("ledger");
    config.download.storage_path = dir.join("library");
    config.download.max_page_attempts = 1;
    config.download.retry_delay = HumanDuration::from_millis(10);
    config.download.connect_timeout = HumanDuration::from_secs(2);
    config.download.request_timeout = HumanDuration::from_secs(5);
    config.notifications.progress_throttle = HumanDuration::from_millis(20);
    config
}

pub fn build_state(config: Config, source: Arc<dyn MangaSource>) -> AppState {
    let storage = StorageClient::local(&config.download.storage_path).unwrap();
    let (state, _task) = AppState::build(config, storage, source).unwrap();
    state
}

/// Source that holds every page lookup until [`GatedSource::open`] is called.
#[derive(Clone)]
pub struct GatedSource {
    open: Arc<watch::Sender<bool>>,
}

impl GatedSource {
    pub fn closed() -> Self {
        Self {
            open: Arc::new(watch::Sender::new(false)),
        }
    }

    pub fn open(&self) {
        self.open.send_replace(true);
    }
}

#[async_trait]
impl MangaSource for GatedSource {
    async fn pages(&self, chapter: &MangaChapter) -> Result<Vec<MangaPage>, SourceError> {
        let mut rx = self.open.subscribe();
        rx.wait_for(|open| *open)
            .await
            .map_err(|e| SourceError::Request(e.to_string()))?;
        EmbeddedPages.pages(chapter).await
    }
}

/// Poll `condition` every 10ms for up to five seconds.
pub async fn eventually<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met within 5s");
}
