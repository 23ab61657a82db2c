//! Durable task queue — record model and backend contract.
//!
//! The queue is the only state that survives a process restart. The storage
//! engine itself is external; the registry only depends on the [`TaskQueue`]
//! trait. [`MemoryQueue`] is the in-process backend used for wiring and
//! tests.

mod memory;

pub use memory::MemoryQueue;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::QueueError;

/// Lifecycle status of a queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QueueStatus::Queued => "queued",
            QueueStatus::Running => "running",
            QueueStatus::Completed => "completed",
            QueueStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A persisted task intent, independent of any live connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedTask {
    /// Unique ID. Reused as the wire task id when drained.
    pub id: String,
    /// Tool to invoke.
    pub tool: String,
    /// Tool parameters.
    pub params: Value,
    /// Higher runs first; ties break oldest-first.
    pub priority: i64,
    /// Originating session, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Originating channel, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    pub status: QueueStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueuedTask {
    /// Create a queued task with defaults.
    pub fn new(tool: impl Into<String>, params: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tool: tool.into(),
            params,
            priority: 0,
            session_id: None,
            channel: None,
            status: QueueStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    /// Builder: set priority.
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Builder: tag with a session.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Builder: tag with a channel.
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }
}

/// Backend-agnostic durable queue contract.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Persist a new task intent.
    async fn enqueue(&self, task: &QueuedTask) -> Result<(), QueueError>;

    /// All tasks still in `queued` status, highest priority first.
    async fn list_queued(&self) -> Result<Vec<QueuedTask>, QueueError>;

    /// Transition a task to `running`, stamping `started_at`.
    async fn mark_running(&self, id: &str) -> Result<(), QueueError>;

    /// Transition a task to `completed` with its result payload.
    async fn mark_completed(&self, id: &str, result: Value) -> Result<(), QueueError>;

    /// Transition a task to `failed` with an error message.
    async fn mark_failed(&self, id: &str, error: &str) -> Result<(), QueueError>;

    /// Fetch a task by id.
    async fn get(&self, id: &str) -> Result<Option<QueuedTask>, QueueError>;
}
