pub mod api;
pub mod config;
pub mod download;
pub mod humanize;
pub mod ledger;
pub mod manga;
pub mod observability;
pub mod progress;
pub mod service;
pub mod storage;
