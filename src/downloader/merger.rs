use std::io::ErrorKind;
use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::context::TaskContext;
use super::error::DownloadError;
use super::storage::remove_file_quietly;
use super::task::{DOWNLOAD_PHASE_END, MERGE_PHASE_END};

pub struct SegmentMerger;

impl SegmentMerger {
    /// 按下标升序把临时分片拼接成一个容器文件
    pub async fn merge(ctx: &TaskContext) -> Result<PathBuf, DownloadError> {
        let (name, total) = ctx.read(|task| (task.name.clone(), task.total_segments)).await;
        let output = ctx.layout().container_path(&name);

        // 删除旧文件
        remove_file_quietly(&output).await;

        let file = tokio::fs::File::create(&output)
            .await
            .map_err(|e| DownloadError::io(&output, e))?;
        let mut writer = tokio::io::BufWriter::new(file);

        info!("开始合并 {} 个分片 -> {}", total, output.display());
        for index in 0..total {
            if ctx.checkpoint().await.is_err() {
                return Err(DownloadError::MergeFailed("任务已暂停".to_string()));
            }

            let segment = ctx.layout().segment_path(ctx.id, index);
            let data = match tokio::fs::read(&segment).await {
                Ok(data) => data,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(DownloadError::MergeFailed(format!("分片 {index} 缺失")));
                }
                Err(e) => return Err(DownloadError::io(&segment, e)),
            };
            writer
                .write_all(&data)
                .await
                .map_err(|e| DownloadError::io(&output, e))?;

            let fraction = (index + 1) as f64 / total as f64;
            ctx.update(|task| {
                task.advance_progress(DOWNLOAD_PHASE_END + fraction * (MERGE_PHASE_END - DOWNLOAD_PHASE_END))
            })
            .await
            .map_err(|_| DownloadError::MergeFailed("任务已暂停".to_string()))?;
            debug!("已合并分片 {}/{}", index + 1, total);
        }

        writer.flush().await.map_err(|e| DownloadError::io(&output, e))?;
        info!("✅ 分片合并完成: {}", output.display());
        Ok(output)
    }
}
