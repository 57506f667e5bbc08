use serde::Serialize;
use uuid::Uuid;

use super::task::TaskSnapshot;

/// 任务集合的变化通知，展示层订阅后自行渲染
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum TaskEvent {
    Added(TaskSnapshot),
    Updated(TaskSnapshot),
    Removed(Uuid),
}

impl TaskEvent {
    pub fn task_id(&self) -> Uuid {
        match self {
            TaskEvent::Added(snapshot) | TaskEvent::Updated(snapshot) => snapshot.id,
            TaskEvent::Removed(id) => *id,
        }
    }

    pub fn snapshot(&self) -> Option<&TaskSnapshot> {
        match self {
            TaskEvent::Added(snapshot) | TaskEvent::Updated(snapshot) => Some(snapshot),
            TaskEvent::Removed(_) => None,
        }
    }
}
