use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::parser::errors::ParseError;
use crate::post_process::RemuxError;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("分片 {index} 下载失败: {reason}")]
    SegmentDownloadFailed { index: usize, reason: String },
    #[error("合并分片失败: {0}")]
    MergeFailed(String),
    #[error("转换失败: {0}")]
    ConversionFailed(String),
    #[error("任务已取消")]
    Cancelled,
    #[error("任务未找到: {0}")]
    TaskNotFound(Uuid),
    #[error("IO错误: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DownloadError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            DownloadError::Cancelled | DownloadError::Parse(ParseError::Cancelled)
        )
    }
}

impl From<RemuxError> for DownloadError {
    fn from(err: RemuxError) -> Self {
        match err {
            RemuxError::Cancelled => DownloadError::Cancelled,
            other => DownloadError::ConversionFailed(other.to_string()),
        }
    }
}
