pub mod cli;
pub mod common;
pub mod downloader;
pub mod parser;
pub mod post_process;

pub use common::config::DownloaderConfig;
pub use downloader::DownloadManager;
pub use downloader::error::DownloadError;
pub use downloader::events::TaskEvent;
pub use downloader::task::{TaskSnapshot, TaskStatus};

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
