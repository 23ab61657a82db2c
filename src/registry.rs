//! Worker registry — connection table, authentication, dispatch
//! correlation, and the execution-strategy decision.
//!
//! The registry is the sole owner of in-flight task state. A task id lives
//! in the global correlation map if and only if it also lives in exactly
//! one connection's active-task set; both maps sit behind a single lock so
//! removal is atomic.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde_json::Value;
use subtle::ConstantTimeEq;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classify::ToolClassifier;
use crate::config::HandsConfig;
use crate::error::DispatchError;
use crate::protocol::{Envelope, TaskDispatch, TaskResult, TaskStatus, events};
use crate::queue::{QueuedTask, TaskQueue};
use crate::strategy::{self, ExecutionStrategy};
use crate::transport::WorkerTransport;

/// Connection details supplied by the gateway after a validated handshake.
#[derive(Debug, Clone)]
pub struct WorkerInfo {
    pub hostname: String,
    pub platform: String,
    pub capabilities: Vec<String>,
}

/// Read-only view of a live connection.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkerSnapshot {
    pub id: Uuid,
    pub hostname: String,
    pub platform: String,
    pub capabilities: Vec<String>,
    pub connected_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub active_tasks: usize,
}

/// Per-dispatch options.
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    pub priority: i64,
    /// Overrides the configured default task timeout.
    pub timeout: Option<Duration>,
    pub session_id: Option<String>,
    pub channel: Option<String>,
}

/// One in-flight dispatched task. Destroyed exactly once — by a matching
/// result or by its timer.
struct PendingTask {
    tool: String,
    timeout: Duration,
    reply: oneshot::Sender<Result<TaskResult, DispatchError>>,
    timer: JoinHandle<()>,
}

/// One live Worker connection.
struct WorkerConnection {
    info: WorkerInfo,
    connected_at: DateTime<Utc>,
    last_heartbeat: DateTime<Utc>,
    transport: Arc<dyn WorkerTransport>,
    tasks: HashMap<String, PendingTask>,
}

/// Both maps under one lock; see the module invariant.
#[derive(Default)]
struct Inner {
    workers: HashMap<Uuid, WorkerConnection>,
    /// Global correlation map: task id → owning connection id.
    correlation: HashMap<String, Uuid>,
}

/// Brain-side registry of connected Workers.
pub struct WorkerRegistry {
    config: HandsConfig,
    classifier: Arc<dyn ToolClassifier>,
    queue: Arc<dyn TaskQueue>,
    inner: Arc<Mutex<Inner>>,
}

impl WorkerRegistry {
    pub fn new(
        config: HandsConfig,
        classifier: Arc<dyn ToolClassifier>,
        queue: Arc<dyn TaskQueue>,
    ) -> Self {
        Self {
            config,
            classifier,
            queue,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    // ── Authentication ──────────────────────────────────────────────

    /// Constant-time comparison of a presented secret against the
    /// configured one. Empty strings and length mismatches reject early —
    /// the length signal is unavoidable and is not the secret material.
    /// An unconfigured (empty) secret rejects everything.
    pub fn validate_secret(&self, provided: &str) -> bool {
        let expected = self.config.worker_secret.expose_secret();
        if provided.is_empty() || expected.is_empty() || provided.len() != expected.len() {
            return false;
        }
        bool::from(provided.as_bytes().ct_eq(expected.as_bytes()))
    }

    // ── Connection lifecycle ────────────────────────────────────────

    /// Register a Worker connection. The caller must have validated the
    /// secret first. Returns the new connection id.
    pub async fn register_worker(
        &self,
        transport: Arc<dyn WorkerTransport>,
        info: WorkerInfo,
    ) -> Uuid {
        let conn_id = Uuid::new_v4();
        let now = Utc::now();
        info!(
            conn_id = %conn_id,
            hostname = %info.hostname,
            platform = %info.platform,
            capabilities = ?info.capabilities,
            "Worker registered"
        );
        self.inner.lock().await.workers.insert(
            conn_id,
            WorkerConnection {
                info,
                connected_at: now,
                last_heartbeat: now,
                transport,
                tasks: HashMap::new(),
            },
        );
        conn_id
    }

    /// Disconnect path: reject every task still active on the connection,
    /// best-effort mark their durable entries failed, then drop the record.
    pub async fn unregister_worker(&self, conn_id: Uuid) {
        let orphaned = {
            let mut inner = self.inner.lock().await;
            let Some(mut conn) = inner.workers.remove(&conn_id) else {
                return;
            };
            let mut orphaned = Vec::with_capacity(conn.tasks.len());
            for (task_id, pending) in conn.tasks.drain() {
                inner.correlation.remove(&task_id);
                pending.timer.abort();
                orphaned.push((task_id, pending.reply));
            }
            orphaned
        };

        info!(conn_id = %conn_id, orphaned = orphaned.len(), "Worker unregistered");

        for (task_id, reply) in orphaned {
            if let Err(e) = self.queue.mark_failed(&task_id, "Worker disconnected").await {
                debug!(task_id = %task_id, error = %e, "Durable fail-mark skipped on disconnect");
            }
            let _ = reply.send(Err(DispatchError::WorkerDisconnected));
        }
    }

    /// Stamp the last-heartbeat time. Staleness policy is the caller's.
    pub async fn update_heartbeat(&self, conn_id: Uuid) {
        if let Some(conn) = self.inner.lock().await.workers.get_mut(&conn_id) {
            conn.last_heartbeat = Utc::now();
        }
    }

    /// Whether any Worker with an open transport is connected.
    pub async fn is_worker_connected(&self) -> bool {
        self.inner
            .lock()
            .await
            .workers
            .values()
            .any(|c| c.transport.is_open())
    }

    /// First connected Worker, if any. The design targets a single Worker
    /// today but keeps a map for future multiplicity.
    pub async fn worker(&self) -> Option<WorkerSnapshot> {
        self.inner.lock().await.workers.iter().next().map(snapshot)
    }

    /// All connected Workers.
    pub async fn workers(&self) -> Vec<WorkerSnapshot> {
        self.inner.lock().await.workers.iter().map(snapshot).collect()
    }

    pub async fn worker_count(&self) -> usize {
        self.inner.lock().await.workers.len()
    }

    // ── Execution strategy ──────────────────────────────────────────

    /// Decide where a tool invocation should run.
    pub async fn execution_strategy(&self, hands_enabled: bool, tool: &str) -> ExecutionStrategy {
        if !hands_enabled {
            return ExecutionStrategy::Local;
        }
        let domain = self.classifier.classify(tool);
        strategy::resolve(hands_enabled, domain, self.is_worker_connected().await)
    }

    // ── Dispatch and correlation ────────────────────────────────────

    /// Dispatch a tool invocation to the connected Worker.
    ///
    /// With no open connection the task is persisted and a terminal failed
    /// result naming the queued id is *returned*, not thrown — a normal,
    /// expected outcome. Otherwise the returned future settles only when a
    /// matching result frame arrives or the per-task timer fires; the
    /// timeout is a rejection, distinct in kind from the offline result.
    pub async fn dispatch(
        &self,
        tool: &str,
        params: Value,
        opts: DispatchOptions,
    ) -> Result<TaskResult, DispatchError> {
        let timeout = opts.timeout.unwrap_or(self.config.default_task_timeout);

        let target = {
            let inner = self.inner.lock().await;
            inner
                .workers
                .iter()
                .find(|(_, c)| c.transport.is_open())
                .map(|(id, c)| (*id, Arc::clone(&c.transport)))
        };

        // Durable intent is written on both paths; failures are swallowed
        // here, the durable row is recovery state, not the caller's answer.
        let entry = QueuedTask {
            priority: opts.priority,
            session_id: opts.session_id.clone(),
            channel: opts.channel.clone(),
            ..QueuedTask::new(tool, params.clone())
        };
        let entry_id = entry.id.clone();
        if let Err(e) = self.queue.enqueue(&entry).await {
            warn!(tool = %tool, error = %e, "Durable enqueue failed");
        }

        let Some((conn_id, transport)) = target else {
            info!(tool = %tool, queued_id = %entry_id, "No Worker connected, task queued");
            return Ok(offline_result(&entry_id));
        };

        // Fresh correlation id for the in-flight wait, separate from the
        // durable entry's id. drain_queue is the path that reuses durable
        // ids on the wire.
        let task_id = Uuid::new_v4().to_string();
        let (reply_tx, reply_rx) = oneshot::channel();

        let timer = self.spawn_timeout(task_id.clone(), timeout);
        {
            let mut inner = self.inner.lock().await;
            let Some(conn) = inner.workers.get_mut(&conn_id) else {
                // Disconnected between the open-check and now.
                timer.abort();
                return Ok(offline_result(&entry_id));
            };
            conn.tasks.insert(
                task_id.clone(),
                PendingTask {
                    tool: tool.to_string(),
                    timeout,
                    reply: reply_tx,
                    timer,
                },
            );
            inner.correlation.insert(task_id.clone(), conn_id);
        }

        let frame = Envelope::event(
            events::TASK_DISPATCH,
            TaskDispatch {
                task_id: task_id.clone(),
                tool: tool.to_string(),
                params,
                priority: opts.priority,
                timeout: timeout.as_millis() as u64,
            },
        )
        .to_frame();

        debug!(task_id = %task_id, tool = %tool, conn_id = %conn_id, "Task dispatched");

        if let Err(e) = transport.send(frame).await {
            warn!(task_id = %task_id, error = %e, "Dispatch send failed, falling back to queue");
            self.remove_pending(&task_id).await;
            return Ok(offline_result(&entry_id));
        }

        match reply_rx.await {
            Ok(outcome) => outcome,
            // Sender dropped without settling; only possible if the
            // registry itself is torn down.
            Err(_) => Err(DispatchError::WorkerDisconnected),
        }
    }

    /// Match an inbound result frame back to its waiting caller.
    ///
    /// Unknown ids (late, duplicate, or drained) return false. For those,
    /// the terminal durable update is still applied best-effort so a
    /// drained task's row does not stay `running`.
    pub async fn handle_task_result(&self, result: TaskResult) -> bool {
        let pending = {
            let mut inner = self.inner.lock().await;
            match inner.correlation.remove(&result.task_id) {
                Some(conn_id) => inner
                    .workers
                    .get_mut(&conn_id)
                    .and_then(|c| c.tasks.remove(&result.task_id)),
                None => None,
            }
        };

        let Some(pending) = pending else {
            debug!(task_id = %result.task_id, "Result for unknown task id, ignoring");
            self.mark_terminal(&result).await;
            return false;
        };

        pending.timer.abort();
        debug!(
            task_id = %result.task_id,
            tool = %pending.tool,
            status = ?result.status,
            duration = result.duration,
            "Task result received"
        );

        self.mark_terminal(&result).await;
        let _ = pending.reply.send(Ok(result));
        true
    }

    /// On (re)connection, push every queued durable entry to the Worker.
    ///
    /// Drained dispatches reuse the durable entry's id as the wire task id
    /// and register no pending wait — their completion is tracked purely
    /// through durable status. Returns the number dispatched.
    pub async fn drain_queue(&self) -> usize {
        let transport = {
            let inner = self.inner.lock().await;
            inner
                .workers
                .values()
                .find(|c| c.transport.is_open())
                .map(|c| Arc::clone(&c.transport))
        };
        let Some(transport) = transport else {
            return 0;
        };

        let queued = match self.queue.list_queued().await {
            Ok(queued) => queued,
            Err(e) => {
                warn!(error = %e, "Could not list queued tasks for drain");
                return 0;
            }
        };
        if queued.is_empty() {
            return 0;
        }

        let mut sent = 0;
        for entry in queued {
            if let Err(e) = self.queue.mark_running(&entry.id).await {
                warn!(task_id = %entry.id, error = %e, "Could not mark drained task running");
            }
            let frame = Envelope::event(
                events::TASK_DISPATCH,
                TaskDispatch {
                    task_id: entry.id.clone(),
                    tool: entry.tool,
                    params: entry.params,
                    priority: entry.priority,
                    timeout: self.config.default_task_timeout.as_millis() as u64,
                },
            )
            .to_frame();

            match transport.send(frame).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    warn!(task_id = %entry.id, error = %e, "Drain send failed, stopping");
                    break;
                }
            }
        }

        info!(count = sent, "Drained queued tasks to Worker");
        sent
    }

    // ── Internals ───────────────────────────────────────────────────

    fn spawn_timeout(&self, task_id: String, timeout: Duration) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let pending = {
                let mut inner = inner.lock().await;
                match inner.correlation.remove(&task_id) {
                    Some(conn_id) => inner
                        .workers
                        .get_mut(&conn_id)
                        .and_then(|c| c.tasks.remove(&task_id)),
                    None => None,
                }
            };
            if let Some(pending) = pending {
                warn!(task_id = %task_id, tool = %pending.tool, "Task timed out");
                let _ = pending.reply.send(Err(DispatchError::Timeout {
                    task_id,
                    timeout: pending.timeout,
                }));
            }
        })
    }

    /// Atomically drop a pending task from both maps, aborting its timer.
    async fn remove_pending(&self, task_id: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(conn_id) = inner.correlation.remove(task_id)
            && let Some(conn) = inner.workers.get_mut(&conn_id)
            && let Some(pending) = conn.tasks.remove(task_id)
        {
            pending.timer.abort();
        }
    }

    /// Best-effort terminal durable update; storage hiccups never surface.
    async fn mark_terminal(&self, result: &TaskResult) {
        let outcome = match result.status {
            TaskStatus::Completed => {
                self.queue
                    .mark_completed(&result.task_id, result.result.clone().unwrap_or(Value::Null))
                    .await
            }
            TaskStatus::Failed => {
                self.queue
                    .mark_failed(&result.task_id, result.error.as_deref().unwrap_or("failed"))
                    .await
            }
        };
        if let Err(e) = outcome {
            debug!(task_id = %result.task_id, error = %e, "Durable terminal update skipped");
        }
    }
}

fn snapshot((id, conn): (&Uuid, &WorkerConnection)) -> WorkerSnapshot {
    WorkerSnapshot {
        id: *id,
        hostname: conn.info.hostname.clone(),
        platform: conn.info.platform.clone(),
        capabilities: conn.info.capabilities.clone(),
        connected_at: conn.connected_at,
        last_heartbeat: conn.last_heartbeat,
        active_tasks: conn.tasks.len(),
    }
}

fn offline_result(queued_id: &str) -> TaskResult {
    TaskResult::failed(
        queued_id,
        format!(
            "Your machine is offline; the task was queued as {queued_id} and will run when the \
             Worker reconnects."
        ),
        0,
    )
}
