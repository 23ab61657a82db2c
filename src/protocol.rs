//! Wire protocol — envelope and event payloads exchanged between the Brain
//! gateway and a Worker.
//!
//! Every frame is a JSON text message shaped as
//! `{ "type": "event", "event": <name>, "payload": { ... } }`.
//! Payload fields are camelCase on the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event names carried in the envelope.
pub mod events {
    pub const WORKER_HELLO: &str = "worker_hello";
    pub const HEARTBEAT: &str = "heartbeat";
    pub const TASK_DISPATCH: &str = "task_dispatch";
    pub const TASK_RESULT: &str = "task_result";
    pub const STATUS_REPORT: &str = "status_report";
}

/// Generic event envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub event: String,
    pub payload: Value,
}

impl Envelope {
    /// Wrap a payload in an event envelope.
    pub fn event(event: &str, payload: impl Serialize) -> Self {
        Self {
            kind: "event".to_string(),
            event: event.to_string(),
            payload: serde_json::to_value(payload).unwrap_or(Value::Null),
        }
    }

    /// Serialize to a wire frame.
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Handshake payload (Worker → Brain), sent as the first frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerHello {
    pub hostname: String,
    pub platform: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub secret: String,
}

/// Periodic heartbeat payload (Worker → Brain).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    #[serde(default)]
    pub active_tasks: usize,
}

/// A task dispatched to the Worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDispatch {
    pub task_id: String,
    pub tool: String,
    pub params: Value,
    pub priority: i64,
    /// Timeout in milliseconds.
    pub timeout: u64,
}

/// Terminal status of a dispatched task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Completed,
    Failed,
}

/// A task's result (Worker → Brain), matched back by `task_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Duration in milliseconds.
    pub duration: u64,
}

impl TaskResult {
    /// A successful result.
    pub fn completed(task_id: impl Into<String>, result: Value, duration: u64) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Completed,
            result: Some(result),
            error: None,
            duration,
        }
    }

    /// A failed result.
    pub fn failed(task_id: impl Into<String>, error: impl Into<String>, duration: u64) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Failed,
            result: None,
            error: Some(error.into()),
            duration,
        }
    }
}

/// Liveness status payload emitted by the Worker-side reporter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Elapsed uptime since the reporter started, in milliseconds.
    pub uptime_ms: u64,
    /// One-minute load average.
    pub load_avg: f64,
    /// Active task count, supplied by the Worker runtime.
    pub active_tasks: usize,
    pub mem_free_bytes: u64,
    pub mem_total_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shape() {
        let env = Envelope::event(
            events::TASK_DISPATCH,
            TaskDispatch {
                task_id: "t1".into(),
                tool: "exec".into(),
                params: serde_json::json!({"command": "ls"}),
                priority: 0,
                timeout: 300_000,
            },
        );
        let json: Value = serde_json::from_str(&env.to_frame()).unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["event"], "task_dispatch");
        assert_eq!(json["payload"]["taskId"], "t1");
        assert_eq!(json["payload"]["tool"], "exec");
        assert_eq!(json["payload"]["params"]["command"], "ls");
        assert_eq!(json["payload"]["timeout"], 300_000);
    }

    #[test]
    fn task_result_camel_case_and_optionals() {
        let res = TaskResult::completed("abc", serde_json::json!({"output": "ok"}), 42);
        let json = serde_json::to_string(&res).unwrap();
        assert!(json.contains("\"taskId\":\"abc\""));
        assert!(json.contains("\"status\":\"completed\""));
        assert!(json.contains("\"duration\":42"));
        assert!(!json.contains("\"error\""));

        let failed = TaskResult::failed("abc", "boom", 0);
        let json = serde_json::to_string(&failed).unwrap();
        assert!(json.contains("\"status\":\"failed\""));
        assert!(json.contains("\"error\":\"boom\""));
        assert!(!json.contains("\"result\""));
    }

    #[test]
    fn worker_hello_parses_wire_frame() {
        let frame = r#"{
            "type": "event",
            "event": "worker_hello",
            "payload": {
                "hostname": "mini",
                "platform": "darwin",
                "capabilities": ["exec", "browser"],
                "secret": "s3cret"
            }
        }"#;
        let env: Envelope = serde_json::from_str(frame).unwrap();
        assert_eq!(env.event, events::WORKER_HELLO);
        let hello: WorkerHello = serde_json::from_value(env.payload).unwrap();
        assert_eq!(hello.hostname, "mini");
        assert_eq!(hello.capabilities.len(), 2);
    }

    #[test]
    fn status_report_serde() {
        let report = StatusReport {
            uptime_ms: 1000,
            load_avg: 0.5,
            active_tasks: 2,
            mem_free_bytes: 1024,
            mem_total_bytes: 4096,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"uptimeMs\":1000"));
        assert!(json.contains("\"activeTasks\":2"));
    }
}
