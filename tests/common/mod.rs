#![allow(dead_code, unused_imports)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use m3u8_downloader::post_process::Remuxer;
use m3u8_downloader::{DownloadManager, DownloaderConfig, TaskEvent, TaskSnapshot, TaskStatus};
use tokio::sync::broadcast;
use uuid::Uuid;

pub use m3u8_downloader::test_utils::{CopyRemuxer, MemorySource, PartialRemuxer};

pub const MANIFEST_URL: &str = "https://media.example.com/vod/show/index.m3u8";

pub fn segment_url(i: usize) -> String {
    format!("https://media.example.com/vod/show/seg{i}.ts")
}

pub fn manager_with(
    root: &Path,
    source: &MemorySource,
    remuxer: impl Remuxer + 'static,
    max_concurrent_tasks: Option<usize>,
) -> DownloadManager {
    let config = DownloaderConfig {
        max_concurrent_tasks,
        ..DownloaderConfig::default().with_storage_root(root)
    };
    DownloadManager::new(&config, Arc::new(source.clone()), Arc::new(remuxer))
}

pub fn manager(root: &Path, source: &MemorySource) -> DownloadManager {
    manager_with(root, source, CopyRemuxer::default(), None)
}

/// 轮询直到任务进入终态
pub async fn wait_until_settled(manager: &DownloadManager, id: Uuid) -> TaskSnapshot {
    for _ in 0..1000 {
        if let Some(snapshot) = manager.task(id).await {
            if snapshot.status.is_terminal() {
                return snapshot;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("任务 {id} 没有结束");
}

pub async fn wait_for_status(
    manager: &DownloadManager,
    id: Uuid,
    status: TaskStatus,
) -> TaskSnapshot {
    for _ in 0..1000 {
        if let Some(snapshot) = manager.task(id).await {
            if snapshot.status == status {
                return snapshot;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("任务 {id} 没有进入 {status}");
}

/// 收集某个任务的事件直到终态或被移除
pub async fn collect_events(rx: &mut broadcast::Receiver<TaskEvent>, id: Uuid) -> Vec<TaskEvent> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("等待事件超时")
            .expect("事件通道异常");
        if event.task_id() != id {
            continue;
        }
        let done = match &event {
            TaskEvent::Removed(_) => true,
            other => other.snapshot().is_some_and(|s| s.status.is_terminal()),
        };
        events.push(event);
        if done {
            return events;
        }
    }
}

/// 存储根目录下剩余的文件名
pub fn leftover_files(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(root)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
