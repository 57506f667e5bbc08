use std::collections::HashMap;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use uuid::Uuid;

use super::events::TaskEvent;
use super::task::{TaskSnapshot, TaskStatus};

const BAR_LENGTH: u64 = 1000;

/// 把任务事件渲染成终端进度条，每个任务一条
pub struct DownloadProgress {
    multi_pb: MultiProgress,
    bars: HashMap<Uuid, ProgressBar>,
    style: ProgressStyle,
}

impl Default for DownloadProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadProgress {
    pub fn new() -> Self {
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");

        Self {
            multi_pb: MultiProgress::new(),
            bars: HashMap::new(),
            style,
        }
    }

    pub fn handle(&mut self, event: &TaskEvent) {
        match event {
            TaskEvent::Added(snapshot) | TaskEvent::Updated(snapshot) => self.render(snapshot),
            TaskEvent::Removed(id) => {
                if let Some(pb) = self.bars.remove(id) {
                    pb.finish_and_clear();
                }
            }
        }
    }

    fn render(&mut self, snapshot: &TaskSnapshot) {
        let pb = self.bars.entry(snapshot.id).or_insert_with(|| {
            let pb = self.multi_pb.add(ProgressBar::new(BAR_LENGTH));
            pb.set_style(self.style.clone());
            pb
        });

        pb.set_position((snapshot.progress * BAR_LENGTH as f64).round() as u64);
        pb.set_message(status_message(snapshot));

        if snapshot.status.is_terminal() {
            pb.finish();
        }
    }
}

pub fn status_message(snapshot: &TaskSnapshot) -> String {
    match snapshot.status {
        TaskStatus::Downloading | TaskStatus::Paused => format!(
            "{} {} {}/{}",
            snapshot.name, snapshot.status, snapshot.current_segment, snapshot.total_segments
        ),
        TaskStatus::Failed => format!(
            "{} {}: {}",
            snapshot.name,
            snapshot.status,
            snapshot.error_message.as_deref().unwrap_or("未知错误")
        ),
        _ => format!("{} {}", snapshot.name, snapshot.status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::task::DownloadTask;

    #[test]
    fn messages_reflect_status() {
        let mut task = DownloadTask::new("demo", "https://example.com/a.m3u8");
        task.status = TaskStatus::Downloading;
        task.total_segments = 5;
        task.current_segment = 2;
        assert_eq!(status_message(&task.snapshot()), "demo 下载中 2/5");

        task.status = TaskStatus::Failed;
        task.error_message = Some("未找到视频分片".to_string());
        assert_eq!(status_message(&task.snapshot()), "demo 失败: 未找到视频分片");
    }

    #[test]
    fn removed_task_drops_its_bar() {
        let mut progress = DownloadProgress::new();
        let task = DownloadTask::new("demo", "https://example.com/a.m3u8");
        progress.handle(&TaskEvent::Added(task.snapshot()));
        assert!(progress.bars.contains_key(&task.id));
        progress.handle(&TaskEvent::Removed(task.id));
        assert!(progress.bars.is_empty());
    }
}
