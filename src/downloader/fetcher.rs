use std::sync::Arc;

use tracing::{debug, info};

use super::context::TaskContext;
use super::error::DownloadError;
use crate::common::client::HttpSource;

/// 顺序下载一个任务的所有分片，已下载的分片不会重复请求
pub struct SegmentFetcher {
    client: Arc<dyn HttpSource>,
}

impl SegmentFetcher {
    pub fn new(client: Arc<dyn HttpSource>) -> Self {
        Self { client }
    }

    pub async fn fetch_all(&self, ctx: &TaskContext) -> Result<(), DownloadError> {
        let temp_dir = ctx.layout().temp_dir(ctx.id);
        tokio::fs::create_dir_all(&temp_dir)
            .await
            .map_err(|e| DownloadError::io(&temp_dir, e))?;

        let (segments, downloaded) = ctx
            .read(|task| (task.segment_urls.clone(), task.downloaded_segments.clone()))
            .await;
        info!(
            "任务 {} 开始下载分片: 共 {} 个，已完成 {} 个",
            ctx.id,
            segments.len(),
            downloaded.len()
        );

        for (index, url) in segments.iter().enumerate() {
            ctx.checkpoint().await?;

            if downloaded.contains(&index) {
                debug!("跳过已下载的分片 {}", index);
                continue;
            }

            let data = tokio::select! {
                biased;
                _ = ctx.token().cancelled() => return Err(DownloadError::Cancelled),
                res = self.client.fetch(url) => res.map_err(|e| DownloadError::SegmentDownloadFailed {
                    index,
                    reason: e.to_string(),
                })?,
            };

            // 请求返回时任务可能已经被暂停，结果直接丢弃
            ctx.checkpoint().await?;

            let partial = ctx.layout().partial_segment_path(ctx.id, index);
            let target = ctx.layout().segment_path(ctx.id, index);
            tokio::fs::write(&partial, &data)
                .await
                .map_err(|e| DownloadError::io(&partial, e))?;
            tokio::fs::rename(&partial, &target)
                .await
                .map_err(|e| DownloadError::io(&target, e))?;

            ctx.update(|task| task.mark_segment_done(index)).await?;
            debug!("分片 {} 下载完成 ({} 字节)", index, data.len());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::{Mutex, broadcast};
    use tokio_util::sync::CancellationToken;
    use url::Url;

    use super::*;
    use crate::downloader::storage::StorageLayout;
    use crate::downloader::task::{DownloadTask, TaskStatus};
    use crate::test_utils::MemorySource;

    fn seg_url(i: usize) -> String {
        format!("https://example.com/vod/seg{i}.ts")
    }

    fn setup(
        total: usize,
        root: &std::path::Path,
    ) -> (TaskContext, Arc<Mutex<DownloadTask>>, MemorySource) {
        let source = MemorySource::new();
        let mut task = DownloadTask::new("demo", "https://example.com/vod/index.m3u8");
        task.status = TaskStatus::Downloading;
        for i in 0..total {
            source.insert(&seg_url(i), format!("data-{i}"));
            task.segment_urls.push(Url::parse(&seg_url(i)).unwrap());
        }
        task.total_segments = total;
        let id = task.id;
        let state = Arc::new(Mutex::new(task));
        let (events, _) = broadcast::channel(64);
        let ctx = TaskContext::new(
            state.clone(),
            id,
            CancellationToken::new(),
            events,
            StorageLayout::new(root, "mp4"),
        );
        (ctx, state, source)
    }

    #[tokio::test]
    async fn fetches_every_segment_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, state, source) = setup(3, dir.path());

        SegmentFetcher::new(Arc::new(source.clone()))
            .fetch_all(&ctx)
            .await
            .unwrap();

        assert_eq!(source.requests(), vec![seg_url(0), seg_url(1), seg_url(2)]);
        let task = state.lock().await;
        assert_eq!(task.current_segment, 3);
        assert!((task.progress - 0.7).abs() < 1e-9);
        for i in 0..3 {
            let body = std::fs::read(ctx.layout().segment_path(ctx.id, i)).unwrap();
            assert_eq!(body, format!("data-{i}").into_bytes());
        }
    }

    #[tokio::test]
    async fn resume_only_fetches_missing_indices() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, state, source) = setup(4, dir.path());
        {
            let mut task = state.lock().await;
            task.mark_segment_done(0);
            task.mark_segment_done(2);
        }

        SegmentFetcher::new(Arc::new(source.clone()))
            .fetch_all(&ctx)
            .await
            .unwrap();

        assert_eq!(source.requests(), vec![seg_url(1), seg_url(3)]);
        let task = state.lock().await;
        assert_eq!(
            task.downloaded_segments.iter().copied().collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
    }

    #[tokio::test]
    async fn failed_segment_reports_its_index() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, state, source) = setup(3, dir.path());
        {
            let mut task = state.lock().await;
            task.segment_urls[1] = Url::parse("https://example.com/vod/missing.ts").unwrap();
        }

        let err = SegmentFetcher::new(Arc::new(source))
            .fetch_all(&ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::SegmentDownloadFailed { index: 1, .. }));
        let task = state.lock().await;
        assert_eq!(task.downloaded_segments.len(), 1);
    }

    #[tokio::test]
    async fn late_result_after_cancel_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, state, source) = setup(2, dir.path());
        source.hold(&seg_url(1));

        let fetcher = SegmentFetcher::new(Arc::new(source.clone()));
        let run_ctx = ctx.clone();
        let handle = tokio::spawn(async move { fetcher.fetch_all(&run_ctx).await });

        source.wait_for_request(&seg_url(1)).await;
        state.lock().await.is_paused = true;
        ctx.token().cancel();
        source.release(&seg_url(1));

        let err = handle.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        let task = state.lock().await;
        assert_eq!(task.downloaded_segments.iter().copied().collect::<Vec<_>>(), vec![0]);
        assert!(!ctx.layout().segment_path(ctx.id, 1).exists());
    }
}
