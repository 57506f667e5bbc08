pub mod ffmpeg;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::downloader::context::TaskContext;
use crate::downloader::error::DownloadError;
use crate::downloader::storage::remove_file_quietly;

#[derive(Debug, Error)]
pub enum RemuxError {
    #[error("未检测到 ffmpeg: {0}")]
    ToolNotFound(PathBuf),
    #[error("封装失败: {0}")]
    Failed(String),
    #[error("封装已取消")]
    Cancelled,
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
}

/// 容器重新封装策略，只做流复制不重新编码
#[async_trait]
pub trait Remuxer: Send + Sync {
    async fn remux(&self, input: &Path, output: &Path) -> Result<(), RemuxError>;
}

pub struct Transcoder {
    remuxer: Arc<dyn Remuxer>,
}

impl Transcoder {
    pub fn new(remuxer: Arc<dyn Remuxer>) -> Self {
        Self { remuxer }
    }

    /// 把合并好的容器封装为最终文件，成功后记录输出位置并把进度置为 1.0
    pub async fn convert(&self, ctx: &TaskContext, container: &Path) -> Result<PathBuf, DownloadError> {
        let name = ctx.read(|task| task.name.clone()).await;
        let output = ctx.layout().deliverable_path(&name);

        // 删除旧文件
        remove_file_quietly(&output).await;

        info!("开始封装: {} -> {}", container.display(), output.display());
        let result = tokio::select! {
            biased;
            _ = ctx.token().cancelled() => Err(DownloadError::Cancelled),
            res = self.remuxer.remux(container, &output) => res.map_err(DownloadError::from),
        };
        if let Err(e) = result {
            // 不留下半成品
            remove_file_quietly(&output).await;
            return Err(e);
        }

        if !tokio::fs::try_exists(&output).await.unwrap_or(false) {
            return Err(DownloadError::ConversionFailed("没有生成输出文件".to_string()));
        }

        let recorded = output.clone();
        ctx.update(move |task| {
            task.output_path = Some(recorded);
            task.advance_progress(1.0);
        })
        .await?;
        debug!("封装完成: {}", output.display());
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::{Mutex, broadcast};
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::downloader::storage::StorageLayout;
    use crate::downloader::task::DownloadTask;
    use crate::test_utils::{CopyRemuxer, PartialRemuxer};

    fn setup(root: &Path) -> (TaskContext, Arc<Mutex<DownloadTask>>) {
        let task = DownloadTask::new("clip", "https://example.com/index.m3u8");
        let id = task.id;
        let state = Arc::new(Mutex::new(task));
        let (events, _) = broadcast::channel(16);
        let ctx = TaskContext::new(
            state.clone(),
            id,
            CancellationToken::new(),
            events,
            StorageLayout::new(root, "mp4"),
        );
        (ctx, state)
    }

    #[tokio::test]
    async fn convert_records_output_and_completes_progress() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, state) = setup(dir.path());
        let container = ctx.layout().container_path("clip");
        std::fs::write(&container, b"container").unwrap();

        let output = Transcoder::new(Arc::new(CopyRemuxer::default()))
            .convert(&ctx, &container)
            .await
            .unwrap();

        assert_eq!(output, dir.path().join("clip.mp4"));
        assert_eq!(std::fs::read(&output).unwrap(), b"container");
        let task = state.lock().await;
        assert_eq!(task.output_path.as_deref(), Some(output.as_path()));
        assert_eq!(task.progress, 1.0);
    }

    #[tokio::test]
    async fn remux_failure_becomes_conversion_failed() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, state) = setup(dir.path());
        let container = ctx.layout().container_path("clip");
        std::fs::write(&container, b"container").unwrap();

        let err = Transcoder::new(Arc::new(CopyRemuxer { fail: true }))
            .convert(&ctx, &container)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::ConversionFailed(_)));
        assert!(state.lock().await.output_path.is_none());
    }

    #[tokio::test]
    async fn failed_remux_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _) = setup(dir.path());
        let container = ctx.layout().container_path("clip");
        std::fs::write(&container, b"container").unwrap();

        let err = Transcoder::new(Arc::new(PartialRemuxer { fail: true }))
            .convert(&ctx, &container)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::ConversionFailed(_)));
        assert!(!dir.path().join("clip.mp4").exists());
    }

    #[tokio::test]
    async fn cancelled_remux_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _) = setup(dir.path());
        let container = ctx.layout().container_path("clip");
        std::fs::write(&container, b"container").unwrap();
        let output = dir.path().join("clip.mp4");

        let run_ctx = ctx.clone();
        let handle = tokio::spawn(async move {
            Transcoder::new(Arc::new(PartialRemuxer::default()))
                .convert(&run_ctx, &container)
                .await
        });
        while !output.exists() {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        ctx.token().cancel();

        let err = handle.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert!(!output.exists());
    }
}
