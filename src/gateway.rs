//! WebSocket gateway the Worker connects to.
//!
//! Owns the pieces the registry deliberately leaves to its caller: the
//! handshake (including closing the connection on a bad secret), the
//! socket-backed transport, heartbeat stamping, routing of result frames,
//! and unregistration on disconnect.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::protocol::{Envelope, TaskResult, WorkerHello, events};
use crate::registry::{WorkerInfo, WorkerRegistry};
use crate::transport::WorkerTransport;

/// How long a connecting Worker has to present its hello frame.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared state for the worker gateway.
#[derive(Clone)]
pub struct GatewayState {
    pub registry: Arc<WorkerRegistry>,
}

/// Build the Axum router for the Worker gateway.
pub fn worker_routes(registry: Arc<WorkerRegistry>) -> Router {
    Router::new()
        .route("/ws/worker", get(ws_handler))
        .route("/api/workers", get(list_workers))
        .route("/health", get(health))
        .with_state(GatewayState { registry })
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok", "service": "remote-hands"}))
}

async fn list_workers(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(state.registry.workers().await)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<GatewayState>) -> impl IntoResponse {
    info!("Worker connecting");
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Transport over the live socket: frames go through an unbounded channel
/// drained by the connection's select loop.
struct WsTransport {
    tx: mpsc::UnboundedSender<String>,
    open: Arc<AtomicBool>,
}

#[async_trait]
impl WorkerTransport for WsTransport {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.tx.is_closed()
    }

    async fn send(&self, frame: String) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        self.tx.send(frame).map_err(|_| TransportError::Closed)
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

async fn handle_socket(mut socket: WebSocket, state: GatewayState) {
    // ── Handshake ───────────────────────────────────────────────────
    let hello = match tokio::time::timeout(HANDSHAKE_TIMEOUT, socket.recv()).await {
        Ok(Some(Ok(Message::Text(text)))) => match parse_hello(&text) {
            Some(hello) => hello,
            None => {
                warn!("Malformed handshake frame, closing");
                return;
            }
        },
        Ok(_) => {
            warn!("Worker closed before handshake");
            return;
        }
        Err(_) => {
            warn!("Handshake timed out, closing");
            return;
        }
    };

    if !state.registry.validate_secret(&hello.secret) {
        warn!(hostname = %hello.hostname, "Worker handshake rejected: bad secret");
        return;
    }

    // ── Register ────────────────────────────────────────────────────
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let open = Arc::new(AtomicBool::new(true));
    let transport = Arc::new(WsTransport {
        tx,
        open: Arc::clone(&open),
    });

    let conn_id = state
        .registry
        .register_worker(
            transport as Arc<dyn WorkerTransport>,
            WorkerInfo {
                hostname: hello.hostname.clone(),
                platform: hello.platform,
                capabilities: hello.capabilities,
            },
        )
        .await;

    info!(conn_id = %conn_id, hostname = %hello.hostname, "Worker connected");

    // Backlog first: anything parked while the machine was offline.
    let drained = state.registry.drain_queue().await;
    if drained > 0 {
        info!(conn_id = %conn_id, count = drained, "Backlog drained to Worker");
    }

    // ── Frame loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            // Outbound dispatch frames from the registry.
            frame = rx.recv() => {
                match frame {
                    Some(frame) => {
                        if socket.send(Message::Text(frame.into())).await.is_err() {
                            debug!(conn_id = %conn_id, "Worker disconnected during send");
                            break;
                        }
                    }
                    None => break,
                }
            }

            // Inbound frames from the Worker.
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(&text, conn_id, &state).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(conn_id = %conn_id, "Worker disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(conn_id = %conn_id, error = %e, "Worker socket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    open.store(false, Ordering::SeqCst);
    state.registry.unregister_worker(conn_id).await;
}

fn parse_hello(text: &str) -> Option<WorkerHello> {
    let env: Envelope = serde_json::from_str(text).ok()?;
    if env.event != events::WORKER_HELLO {
        return None;
    }
    serde_json::from_value(env.payload).ok()
}

async fn handle_frame(text: &str, conn_id: uuid::Uuid, state: &GatewayState) {
    let env: Envelope = match serde_json::from_str(text) {
        Ok(env) => env,
        Err(e) => {
            debug!(conn_id = %conn_id, error = %e, "Unrecognized frame from Worker");
            return;
        }
    };

    match env.event.as_str() {
        events::HEARTBEAT | events::STATUS_REPORT => {
            state.registry.update_heartbeat(conn_id).await;
        }
        events::TASK_RESULT => {
            state.registry.update_heartbeat(conn_id).await;
            match serde_json::from_value::<TaskResult>(env.payload) {
                Ok(result) => {
                    let matched = state.registry.handle_task_result(result).await;
                    if !matched {
                        debug!(conn_id = %conn_id, "Result frame had no waiting caller");
                    }
                }
                Err(e) => {
                    warn!(conn_id = %conn_id, error = %e, "Malformed task result");
                }
            }
        }
        other => {
            debug!(conn_id = %conn_id, event = other, "Ignoring unknown event");
        }
    }
}
