//! HTTP surface of the download service
//!
//! | Method | Path                        | Purpose                          |
//! |--------|-----------------------------|----------------------------------|
//! | GET    | `/health`                   | liveness and service summary     |
//! | POST   | `/downloads`                | start a download                 |
//! | GET    | `/downloads`                | active downloads                 |
//! | GET    | `/downloads/watch`          | active downloads (SSE)           |
//! | GET    | `/downloads/completed`      | completion events (SSE)          |
//! | DELETE | `/downloads/{request_id}`   | cancel a download                |
//! | GET    | `/notifications`            | notifications on display         |
//! | GET    | `/feed`                     | tracking feed                    |
//! | POST   | `/feed`                     | record found chapters            |
//! | DELETE | `/feed`                     | clear the tracking feed          |

mod error;
pub mod models;
mod server;
pub mod services;
pub mod state;
pub(crate) mod utils;

pub use error::ApiError;
pub use server::{router, run, shutdown_signal};
pub use state::{AppState, StartupError};
