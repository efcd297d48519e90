//! Manga download engine
//!
//! [`DownloadManager`] turns a [`DownloadRequest`] into a
//! [`ProgressJob`](crate::progress::ProgressJob) that fetches the selected
//! chapters page by page, writes them to local storage and finishes with the
//! local copy of the manga.

mod error;
pub mod http;
mod manager;
mod request;
mod source;
mod state;

pub use error::{DownloadError, SourceError};
pub use http::{FetchedResource, HttpClient, HttpConfig, HttpError};
pub use manager::DownloadManager;
pub use request::DownloadRequest;
pub use source::{EmbeddedPages, MangaSource};
pub use state::{DownloadState, StateKind};
