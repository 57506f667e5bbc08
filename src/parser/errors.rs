use thiserror::Error;

use crate::common::client::ClientError;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("无效的 M3U8 链接: {0}")]
    InvalidManifestLocation(String),
    #[error("获取 M3U8 失败: {0}")]
    ManifestFetchFailed(#[source] ClientError),
    #[error("无法解析 M3U8 内容: 不是有效的 UTF-8 文本")]
    ManifestDecodeFailed,
    #[error("未找到视频分片")]
    NoSegmentsFound,
    #[error("任务已取消")]
    Cancelled,
}
