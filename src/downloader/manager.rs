use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::context::TaskContext;
use super::error::DownloadError;
use super::events::TaskEvent;
use super::fetcher::SegmentFetcher;
use super::merger::SegmentMerger;
use super::storage::{StorageLayout, remove_file_quietly};
use super::task::{DownloadTask, TaskSnapshot, TaskStatus};
use crate::common::client::{ClientError, HttpClient, HttpSource};
use crate::common::config::DownloaderConfig;
use crate::parser::ManifestParser;
use crate::post_process::ffmpeg::FfmpegRemuxer;
use crate::post_process::{Remuxer, Transcoder};

#[derive(Clone)]
struct TaskEntry {
    seq: u64,
    state: Arc<Mutex<DownloadTask>>,
    // 流水线整个运行期间持有，保证同一任务同一时刻只有一条流水线
    run_lock: Arc<Mutex<()>>,
}

struct ActiveRun {
    generation: u64,
    token: CancellationToken,
}

/// 任务编排器：展示层只和它打交道
#[derive(Clone)]
pub struct DownloadManager {
    tasks: Arc<DashMap<Uuid, TaskEntry>>, // task_id -> Task
    active: Arc<DashMap<Uuid, ActiveRun>>, // task_id -> 取消令牌
    events: broadcast::Sender<TaskEvent>,
    parser: Arc<ManifestParser>,
    fetcher: Arc<SegmentFetcher>,
    transcoder: Arc<Transcoder>,
    layout: StorageLayout,
    semaphore: Option<Arc<Semaphore>>, // 控制并发数
    next_seq: Arc<AtomicU64>,
    next_generation: Arc<AtomicU64>,
}

impl DownloadManager {
    pub fn new(
        config: &DownloaderConfig,
        client: Arc<dyn HttpSource>,
        remuxer: Arc<dyn Remuxer>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            tasks: Arc::new(DashMap::new()),
            active: Arc::new(DashMap::new()),
            events,
            parser: Arc::new(ManifestParser::new(client.clone())),
            fetcher: Arc::new(SegmentFetcher::new(client)),
            transcoder: Arc::new(Transcoder::new(remuxer)),
            layout: StorageLayout::new(&config.storage_root, &config.output_extension),
            semaphore: config
                .max_concurrent_tasks
                .map(|limit| Arc::new(Semaphore::new(limit.max(1)))),
            next_seq: Arc::new(AtomicU64::new(0)),
            next_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 使用 reqwest 客户端和系统 ffmpeg 构建
    pub fn from_config(config: &DownloaderConfig) -> Result<Self, ClientError> {
        let client = HttpClient::new(config)?;
        let remuxer = FfmpegRemuxer::new(&config.ffmpeg_path);
        Ok(Self::new(config, Arc::new(client), Arc::new(remuxer)))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    pub fn storage_root(&self) -> PathBuf {
        self.layout.root().to_path_buf()
    }

    // 添加新的下载任务，并立即开始
    pub async fn add_task(&self, name: &str, manifest_url: &str) -> Uuid {
        let task = DownloadTask::new(name, manifest_url);
        let id = task.id;
        let snapshot = task.snapshot();
        let entry = TaskEntry {
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            state: Arc::new(Mutex::new(task)),
            run_lock: Arc::new(Mutex::new(())),
        };
        self.tasks.insert(id, entry);
        let _ = self.events.send(TaskEvent::Added(snapshot));
        info!("添加下载任务: {} ({}) <- {}", name, id, manifest_url);

        if let Err(e) = self.start(id).await {
            warn!("任务 {} 启动失败: {}", id, e);
        }
        id
    }

    /// 仅对 Waiting / Paused 的任务生效，返回是否真的启动了
    pub async fn start(&self, id: Uuid) -> Result<bool, DownloadError> {
        let entry = self.entry(id)?;
        let token = CancellationToken::new();
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        {
            let mut task = entry.state.lock().await;
            if !task.can_start() {
                debug!("任务 {} 当前状态为 {}，忽略启动请求", id, task.status);
                return Ok(false);
            }
            task.status = TaskStatus::Downloading;
            task.is_paused = false;
            task.error_message = None;
            self.active.insert(
                id,
                ActiveRun {
                    generation,
                    token: token.clone(),
                },
            );
            let _ = self.events.send(TaskEvent::Updated(task.snapshot()));
        }

        info!("开始下载任务: {}", id);
        let manager = self.clone();
        tokio::spawn(async move {
            manager.run(id, entry, token, generation).await;
        });
        Ok(true)
    }

    /// 仅对 Downloading 的任务生效
    pub async fn pause(&self, id: Uuid) -> Result<bool, DownloadError> {
        let entry = self.entry(id)?;
        let mut task = entry.state.lock().await;
        if !task.can_pause() {
            debug!("任务 {} 当前状态为 {}，忽略暂停请求", id, task.status);
            return Ok(false);
        }

        task.is_paused = true;
        task.status = TaskStatus::Paused;
        if let Some((_, run)) = self.active.remove(&id) {
            run.token.cancel();
        }
        let _ = self.events.send(TaskEvent::Updated(task.snapshot()));
        info!("⏸️ 任务已暂停: {} ({}/{})", id, task.current_segment, task.total_segments);
        Ok(true)
    }

    /// 仅对 Paused 的任务生效
    pub async fn resume(&self, id: Uuid) -> Result<bool, DownloadError> {
        let entry = self.entry(id)?;
        if !entry.state.lock().await.can_resume() {
            return Ok(false);
        }
        info!("▶️ 继续下载任务: {}", id);
        self.start(id).await
    }

    /// 先标记删除并取消运行，等流水线退出后删除所有相关文件，再把任务移出集合
    pub async fn delete(&self, id: Uuid) -> Result<(), DownloadError> {
        let entry = self.entry(id)?;
        {
            let mut task = entry.state.lock().await;
            task.is_deleting = true;
            task.is_paused = true;
            if task.can_pause() {
                task.status = TaskStatus::Paused;
                let _ = self.events.send(TaskEvent::Updated(task.snapshot()));
            }
            if let Some((_, run)) = self.active.remove(&id) {
                run.token.cancel();
            }
        }

        let _run_guard = entry.run_lock.lock().await;
        let (name, output) = {
            let task = entry.state.lock().await;
            (task.name.clone(), task.output_path.clone())
        };
        self.layout.remove_temporary(id, &name).await;
        // 封装中途被删除时 output_path 尚未记录，但可能已有半成品
        let output = output.unwrap_or_else(|| self.layout.deliverable_path(&name));
        remove_file_quietly(&output).await;

        self.tasks.remove(&id);
        let _ = self.events.send(TaskEvent::Removed(id));
        info!("🗑️ 任务已删除: {}", id);
        Ok(())
    }

    /// 已完成且有输出文件时返回最终文件位置
    pub async fn share_target(&self, id: Uuid) -> Option<PathBuf> {
        let entry = self.entry(id).ok()?;
        let task = entry.state.lock().await;
        if task.can_share() {
            task.output_path.clone()
        } else {
            None
        }
    }

    pub async fn task(&self, id: Uuid) -> Option<TaskSnapshot> {
        let entry = self.entry(id).ok()?;
        let snapshot = entry.state.lock().await.snapshot();
        Some(snapshot)
    }

    /// 按添加顺序返回所有任务的快照
    pub async fn tasks(&self) -> Vec<TaskSnapshot> {
        let mut entries: Vec<TaskEntry> = self.tasks.iter().map(|r| r.value().clone()).collect();
        entries.sort_by_key(|entry| entry.seq);
        futures::future::join_all(
            entries
                .iter()
                .map(|entry| async move { entry.state.lock().await.snapshot() }),
        )
        .await
    }

    fn entry(&self, id: Uuid) -> Result<TaskEntry, DownloadError> {
        self.tasks
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or(DownloadError::TaskNotFound(id))
    }

    async fn run(self, id: Uuid, entry: TaskEntry, token: CancellationToken, generation: u64) {
        let _run_guard = entry.run_lock.lock().await;
        if token.is_cancelled() || entry.state.lock().await.is_deleting {
            self.release(id, generation);
            return;
        }

        let _permit = match self.acquire_slot(&token).await {
            Some(permit) => permit,
            None => {
                self.release(id, generation);
                return;
            }
        };

        let ctx = TaskContext::new(
            entry.state.clone(),
            id,
            token.clone(),
            self.events.clone(),
            self.layout.clone(),
        );

        match self.drive(&ctx).await {
            Ok(output) => info!("✅ 下载任务完成: {} -> {}", id, output.display()),
            Err(e) => self.settle_failure(&entry, &token, e).await,
        }
        self.release(id, generation);
    }

    // 未配置并发上限时直接放行；等待期间被取消返回 None
    async fn acquire_slot(&self, token: &CancellationToken) -> Option<Option<OwnedSemaphorePermit>> {
        let Some(semaphore) = &self.semaphore else {
            return Some(None);
        };
        tokio::select! {
            biased;
            _ = token.cancelled() => None,
            permit = semaphore.clone().acquire_owned() => permit.ok().map(Some),
        }
    }

    async fn drive(&self, ctx: &TaskContext) -> Result<PathBuf, DownloadError> {
        // 1. 解析 M3U8（已解析过的任务跳过）
        let (needs_parse, manifest_url) = ctx
            .read(|task| (task.segment_urls.is_empty(), task.manifest_url.clone()))
            .await;
        if needs_parse {
            let segments = self.parser.parse(&manifest_url, ctx.token()).await?;
            ctx.update(move |task| {
                task.total_segments = segments.len();
                task.segment_urls = segments;
            })
            .await?;
        }

        // 2. 下载分片
        self.fetcher.fetch_all(ctx).await?;

        // 3. 合并分片
        ctx.transition(TaskStatus::Merging).await?;
        let container = SegmentMerger::merge(ctx).await?;

        // 4. 封装为最终格式
        ctx.transition(TaskStatus::Converting).await?;
        let output = self.transcoder.convert(ctx, &container).await?;

        // 5. 清理临时文件
        let name = ctx.read(|task| task.name.clone()).await;
        self.layout.remove_temporary(ctx.id, &name).await;

        ctx.update(|task| {
            task.status = TaskStatus::Completed;
            task.progress = 1.0;
        })
        .await?;
        Ok(output)
    }

    async fn settle_failure(&self, entry: &TaskEntry, token: &CancellationToken, err: DownloadError) {
        let mut task = entry.state.lock().await;
        if token.is_cancelled() || task.is_paused {
            debug!("任务 {} 已暂停，忽略错误: {}", task.id, err);
            return;
        }

        task.status = TaskStatus::Failed;
        task.error_message = Some(err.to_string());
        error!("❌ 下载任务失败: {}, 错误: {}", task.id, err);
        let _ = self.events.send(TaskEvent::Updated(task.snapshot()));
    }

    fn release(&self, id: Uuid, generation: u64) {
        self.active.remove_if(&id, |_, run| run.generation == generation);
    }
}
