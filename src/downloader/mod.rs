pub mod context;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod manager;
pub mod merger;
pub mod progress;
pub mod storage;
pub mod task;

pub use manager::DownloadManager;
