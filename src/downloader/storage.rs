use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};
use uuid::Uuid;

static RESERVED_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\\/:*?"<>|\x00-\x1f]"#).expect("合法的正则表达式"));

/// 存储根目录下的文件布局
///
/// ```text
/// temp_<task-id>/segment_<index>.ts   每个分片一个文件
/// <task-name>.ts                       合并后的容器（临时）
/// <task-name>.<ext>                    最终文件
/// ```
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
    extension: String,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>, extension: impl AsRef<str>) -> Self {
        let extension = extension.as_ref().trim_start_matches('.').to_string();
        Self {
            root: root.into(),
            extension,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn temp_dir(&self, id: Uuid) -> PathBuf {
        self.root.join(format!("temp_{id}"))
    }

    pub fn segment_path(&self, id: Uuid, index: usize) -> PathBuf {
        self.temp_dir(id).join(format!("segment_{index}.ts"))
    }

    // 写入中的分片先落到 .part，完成后再改名
    pub fn partial_segment_path(&self, id: Uuid, index: usize) -> PathBuf {
        self.temp_dir(id).join(format!("segment_{index}.ts.part"))
    }

    pub fn container_path(&self, name: &str) -> PathBuf {
        let stem = sanitize_file_name(name);
        if self.extension.eq_ignore_ascii_case("ts") {
            // 最终文件同为 .ts 时容器不能和它重名
            return self.root.join(format!("{stem}.merged.ts"));
        }
        self.root.join(format!("{stem}.ts"))
    }

    pub fn deliverable_path(&self, name: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", sanitize_file_name(name), self.extension))
    }

    /// 删除临时分片目录和合并容器
    pub async fn remove_temporary(&self, id: Uuid, name: &str) {
        remove_dir_quietly(&self.temp_dir(id)).await;
        remove_file_quietly(&self.container_path(name)).await;
    }
}

pub fn sanitize_file_name(name: &str) -> String {
    let cleaned = RESERVED_CHARS.replace_all(name.trim(), "_");
    let cleaned = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if cleaned.is_empty() {
        "untitled".to_string()
    } else {
        cleaned.to_string()
    }
}

pub async fn remove_file_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("已删除文件: {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("删除文件失败: {}: {}", path.display(), e),
    }
}

pub async fn remove_dir_quietly(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => debug!("已删除目录: {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("删除目录失败: {}: {}", path.display(), e),
    }
}
