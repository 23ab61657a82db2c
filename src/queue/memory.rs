//! In-memory queue backend.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::info;

use super::{QueueStatus, QueuedTask, TaskQueue};
use crate::error::QueueError;

/// In-memory [`TaskQueue`]. Contents do not survive a restart — a real
/// deployment plugs a persistent backend into the same trait.
#[derive(Default)]
pub struct MemoryQueue {
    tasks: RwLock<HashMap<String, QueuedTask>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    async fn transition(
        &self,
        id: &str,
        target: QueueStatus,
        apply: impl FnOnce(&mut QueuedTask),
    ) -> Result<(), QueueError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(id).ok_or_else(|| QueueError::NotFound {
            id: id.to_string(),
        })?;

        // Terminal states never transition again.
        if matches!(task.status, QueueStatus::Completed | QueueStatus::Failed) {
            return Err(QueueError::InvalidTransition {
                id: id.to_string(),
                status: task.status.to_string(),
                target: target.to_string(),
            });
        }

        task.status = target;
        apply(task);
        Ok(())
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn enqueue(&self, task: &QueuedTask) -> Result<(), QueueError> {
        info!(task_id = %task.id, tool = %task.tool, "Task enqueued");
        self.tasks
            .write()
            .await
            .insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn list_queued(&self) -> Result<Vec<QueuedTask>, QueueError> {
        let tasks = self.tasks.read().await;
        let mut queued: Vec<QueuedTask> = tasks
            .values()
            .filter(|t| t.status == QueueStatus::Queued)
            .cloned()
            .collect();
        // Highest priority first; ties oldest-first.
        queued.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(queued)
    }

    async fn mark_running(&self, id: &str) -> Result<(), QueueError> {
        self.transition(id, QueueStatus::Running, |t| {
            t.started_at = Some(Utc::now());
        })
        .await
    }

    async fn mark_completed(&self, id: &str, result: Value) -> Result<(), QueueError> {
        self.transition(id, QueueStatus::Completed, |t| {
            t.completed_at = Some(Utc::now());
            t.result = Some(result);
        })
        .await
    }

    async fn mark_failed(&self, id: &str, error: &str) -> Result<(), QueueError> {
        let error = error.to_string();
        self.transition(id, QueueStatus::Failed, move |t| {
            t.completed_at = Some(Utc::now());
            t.error = Some(error);
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<QueuedTask>, QueueError> {
        Ok(self.tasks.read().await.get(id).cloned())
    }
}
