use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// 下载器配置，所有字段都有默认值，可以从 JSON 文件加载
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DownloaderConfig {
    /// 私有存储根目录，临时分片、合并文件和最终文件都放在这里
    pub storage_root: PathBuf,
    /// 最终文件的扩展名
    pub output_extension: String,
    pub ffmpeg_path: PathBuf,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    /// 同时运行的任务上限，None 表示不限制
    pub max_concurrent_tasks: Option<usize>,
    pub event_capacity: usize,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("./downloads"),
            output_extension: "mp4".to_string(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            request_timeout_secs: 30,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36".to_string(),
            max_concurrent_tasks: None,
            event_capacity: 1024,
        }
    }
}

impl DownloaderConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("配置文件格式错误: {}", path.display()))?;
        Ok(config)
    }

    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = root.into();
        self
    }
}
