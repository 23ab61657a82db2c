//! Worker-side runtime — turns dispatch frames into result frames.
//!
//! The concrete skills (filesystem, shell, browser automation) live outside
//! this crate behind the [`SkillTable`] seam.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::protocol::{TaskDispatch, TaskResult};

/// Executes named skills on the Worker's machine.
#[async_trait]
pub trait SkillTable: Send + Sync {
    /// Whether this table can run the named tool.
    fn supports(&self, tool: &str) -> bool;

    /// Run a skill to completion. Errors come back as strings — they travel
    /// the wire inside the result frame, not as process-local types.
    async fn run(&self, tool: &str, params: Value) -> Result<Value, String>;
}

/// Handles inbound dispatch frames against a skill table.
pub struct WorkerRuntime {
    skills: Arc<dyn SkillTable>,
}

impl WorkerRuntime {
    pub fn new(skills: Arc<dyn SkillTable>) -> Self {
        Self { skills }
    }

    /// Execute one dispatched task and produce its result frame. Always
    /// returns a frame — unknown tools, skill failures, and timeouts all
    /// become failed results carrying the same task id.
    pub async fn handle_dispatch(&self, dispatch: TaskDispatch) -> TaskResult {
        let start = Instant::now();
        let task_id = dispatch.task_id.clone();

        if !self.skills.supports(&dispatch.tool) {
            warn!(task_id = %task_id, tool = %dispatch.tool, "Unknown tool dispatched");
            return TaskResult::failed(
                task_id,
                format!("Tool {} is not available on this Worker", dispatch.tool),
                elapsed_ms(start),
            );
        }

        let timeout = Duration::from_millis(dispatch.timeout);
        let outcome =
            tokio::time::timeout(timeout, self.skills.run(&dispatch.tool, dispatch.params)).await;

        match outcome {
            Ok(Ok(result)) => {
                debug!(task_id = %task_id, tool = %dispatch.tool, "Skill completed");
                TaskResult::completed(task_id, result, elapsed_ms(start))
            }
            Ok(Err(error)) => {
                warn!(task_id = %task_id, tool = %dispatch.tool, error = %error, "Skill failed");
                TaskResult::failed(task_id, error, elapsed_ms(start))
            }
            Err(_) => {
                warn!(task_id = %task_id, tool = %dispatch.tool, "Skill timed out");
                TaskResult::failed(
                    task_id,
                    format!("Tool {} timed out after {}ms", dispatch.tool, dispatch.timeout),
                    elapsed_ms(start),
                )
            }
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
