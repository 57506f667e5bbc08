use std::sync::Arc;

use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use super::error::DownloadError;
use super::events::TaskEvent;
use super::storage::StorageLayout;
use super::task::{DownloadTask, TaskStatus};

/// 一次流水线运行所需的全部上下文
///
/// 所有对任务状态的写入都经过这里：先拿任务锁，再检查取消令牌，
/// 令牌已取消时写入被丢弃，这样暂停之后迟到的网络结果不会落到任务上。
#[derive(Clone)]
pub struct TaskContext {
    pub id: Uuid,
    state: Arc<Mutex<DownloadTask>>,
    token: CancellationToken,
    events: broadcast::Sender<TaskEvent>,
    layout: StorageLayout,
}

impl TaskContext {
    pub fn new(
        state: Arc<Mutex<DownloadTask>>,
        id: Uuid,
        token: CancellationToken,
        events: broadcast::Sender<TaskEvent>,
        layout: StorageLayout,
    ) -> Self {
        Self {
            id,
            state,
            token,
            events,
            layout,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// 协作式取消检查点
    pub async fn checkpoint(&self) -> Result<(), DownloadError> {
        if self.token.is_cancelled() || self.state.lock().await.is_paused {
            return Err(DownloadError::Cancelled);
        }
        Ok(())
    }

    pub async fn read<R>(&self, f: impl FnOnce(&DownloadTask) -> R) -> R {
        let guard = self.state.lock().await;
        f(&guard)
    }

    /// 仅在本次运行仍然有效时修改任务并广播更新
    pub async fn update<R>(&self, f: impl FnOnce(&mut DownloadTask) -> R) -> Result<R, DownloadError> {
        let mut guard = self.state.lock().await;
        if self.token.is_cancelled() || guard.is_paused {
            debug!("任务 {} 已取消，丢弃本次状态更新", self.id);
            return Err(DownloadError::Cancelled);
        }
        let result = f(&mut guard);
        let _ = self.events.send(TaskEvent::Updated(guard.snapshot()));
        Ok(result)
    }

    pub async fn transition(&self, status: TaskStatus) -> Result<(), DownloadError> {
        self.update(|task| task.status = status).await
    }
}
