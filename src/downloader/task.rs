use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Waiting,
    Downloading,
    Paused,
    Merging,
    Converting,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Waiting => "等待中",
            TaskStatus::Downloading => "下载中",
            TaskStatus::Paused => "已暂停",
            TaskStatus::Merging => "合并中",
            TaskStatus::Converting => "转换中",
            TaskStatus::Completed => "已完成",
            TaskStatus::Failed => "失败",
        }
    }

    // Completed 和 Failed 之后不再有任何状态变化
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 一个下载任务的完整状态，只由管理器中属于该任务的流水线修改
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub id: Uuid,
    pub name: String,
    pub manifest_url: String,
    pub status: TaskStatus,
    pub progress: f64,
    pub current_segment: usize,
    pub total_segments: usize,
    pub output_path: Option<PathBuf>,
    pub error_message: Option<String>,
    pub is_paused: bool,
    /// 删除进行中，任务不能再被启动
    pub is_deleting: bool,
    pub downloaded_segments: BTreeSet<usize>,
    pub segment_urls: Vec<Url>,
    pub created_at: DateTime<Utc>,
}

impl DownloadTask {
    pub fn new(name: impl Into<String>, manifest_url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            manifest_url: manifest_url.into(),
            status: TaskStatus::Waiting,
            progress: 0.0,
            current_segment: 0,
            total_segments: 0,
            output_path: None,
            error_message: None,
            is_paused: false,
            is_deleting: false,
            downloaded_segments: BTreeSet::new(),
            segment_urls: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn can_start(&self) -> bool {
        !self.is_deleting && matches!(self.status, TaskStatus::Waiting | TaskStatus::Paused)
    }

    pub fn can_pause(&self) -> bool {
        self.status == TaskStatus::Downloading
    }

    pub fn can_resume(&self) -> bool {
        !self.is_deleting && self.status == TaskStatus::Paused
    }

    pub fn can_share(&self) -> bool {
        self.status == TaskStatus::Completed && self.output_path.is_some()
    }

    /// 进度只增不减
    pub fn advance_progress(&mut self, progress: f64) {
        let progress = progress.clamp(0.0, 1.0);
        if progress > self.progress {
            self.progress = progress;
        }
    }

    /// 记录一个已完成的分片，重复记录不产生影响
    pub fn mark_segment_done(&mut self, index: usize) {
        if index >= self.total_segments {
            return;
        }
        self.downloaded_segments.insert(index);
        self.current_segment = self.downloaded_segments.len();
        let fraction = self.current_segment as f64 / self.total_segments as f64;
        self.advance_progress(fraction * DOWNLOAD_PHASE_END);
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            name: self.name.clone(),
            manifest_url: self.manifest_url.clone(),
            status: self.status,
            progress: self.progress,
            current_segment: self.current_segment,
            total_segments: self.total_segments,
            output_path: self.output_path.clone(),
            error_message: self.error_message.clone(),
            created_at: self.created_at,
        }
    }
}

// 下载占总进度的 70%，合并占 70%-85%
pub const DOWNLOAD_PHASE_END: f64 = 0.7;
pub const MERGE_PHASE_END: f64 = 0.85;

/// 提供给展示层的只读快照
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSnapshot {
    pub id: Uuid,
    pub name: String,
    pub manifest_url: String,
    pub status: TaskStatus,
    pub progress: f64,
    pub current_segment: usize,
    pub total_segments: usize,
    pub output_path: Option<PathBuf>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TaskSnapshot {
    pub fn can_pause(&self) -> bool {
        self.status == TaskStatus::Downloading
    }

    pub fn can_resume(&self) -> bool {
        self.status == TaskStatus::Paused
    }

    pub fn can_share(&self) -> bool {
        self.status == TaskStatus::Completed && self.output_path.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_is_waiting_and_empty() {
        let task = DownloadTask::new("demo", "https://example.com/a.m3u8");
        assert_eq!(task.status, TaskStatus::Waiting);
        assert_eq!(task.progress, 0.0);
        assert!(task.segment_urls.is_empty());
        assert!(task.can_start());
        assert!(!task.can_pause());
        assert!(!task.can_share());
    }

    #[test]
    fn deleting_task_cannot_restart() {
        let mut task = DownloadTask::new("demo", "https://example.com/a.m3u8");
        task.status = TaskStatus::Paused;
        assert!(task.can_resume());

        task.is_deleting = true;
        assert!(!task.can_start());
        assert!(!task.can_resume());
    }

    #[test]
    fn ids_are_unique() {
        let a = DownloadTask::new("a", "https://example.com/a.m3u8");
        let b = DownloadTask::new("a", "https://example.com/a.m3u8");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn segment_marks_are_idempotent_and_bounded() {
        let mut task = DownloadTask::new("demo", "https://example.com/a.m3u8");
        task.total_segments = 4;

        task.mark_segment_done(2);
        task.mark_segment_done(2);
        task.mark_segment_done(9);
        assert_eq!(task.downloaded_segments.len(), 1);
        assert_eq!(task.current_segment, 1);
        assert!((task.progress - 0.175).abs() < 1e-9);

        task.mark_segment_done(0);
        task.mark_segment_done(1);
        task.mark_segment_done(3);
        assert_eq!(task.current_segment, 4);
        assert!((task.progress - DOWNLOAD_PHASE_END).abs() < 1e-9);
    }

    #[test]
    fn progress_never_goes_backwards() {
        let mut task = DownloadTask::new("demo", "https://example.com/a.m3u8");
        task.advance_progress(0.5);
        task.advance_progress(0.3);
        assert_eq!(task.progress, 0.5);
        task.advance_progress(1.7);
        assert_eq!(task.progress, 1.0);
    }

    #[test]
    fn status_labels() {
        assert_eq!(TaskStatus::Merging.to_string(), "合并中");
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Paused.is_terminal());
    }
}
