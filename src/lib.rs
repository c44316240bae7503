pub mod activity;
pub mod config;
pub mod engine;
mod error;
pub mod filter;
pub mod identity;
pub mod ledger;
pub mod models;
pub mod orchestrator;
pub mod paths;
pub mod precheck;
pub mod ytdlp;

pub use error::{DownloaderError, Result};
pub use orchestrator::{download_likes, Downloader, RunReport};
