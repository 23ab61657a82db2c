//! Integration tests for the Worker gateway.
//!
//! Each test spins up an Axum server on a random port and connects a fake
//! Worker via tokio-tungstenite, exercising the real handshake / dispatch /
//! result contract over the wire.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use remote_hands::classify::StaticClassifier;
use remote_hands::config::HandsConfig;
use remote_hands::error::DispatchError;
use remote_hands::gateway::worker_routes;
use remote_hands::protocol::{Envelope, TaskResult, TaskStatus, WorkerHello, events};
use remote_hands::queue::{MemoryQueue, QueueStatus, QueuedTask, TaskQueue};
use remote_hands::registry::{DispatchOptions, WorkerRegistry};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const SECRET: &str = "integration-secret";

/// Start the gateway on a random port.
async fn start_server() -> (u16, Arc<WorkerRegistry>, Arc<MemoryQueue>) {
    let queue = Arc::new(MemoryQueue::new());
    let classifier = Arc::new(StaticClassifier::new(
        ["exec".to_string(), "screenshot".to_string()],
        ["fetch".to_string()],
    ));
    let registry = Arc::new(WorkerRegistry::new(
        HandsConfig::default().with_secret(SECRET),
        classifier,
        Arc::clone(&queue) as Arc<dyn TaskQueue>,
    ));

    let app = worker_routes(Arc::clone(&registry));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (port, registry, queue)
}

fn hello_frame(secret: &str) -> String {
    Envelope::event(
        events::WORKER_HELLO,
        WorkerHello {
            hostname: "test-box".into(),
            platform: "linux".into(),
            capabilities: vec!["exec".into()],
            secret: secret.into(),
        },
    )
    .to_frame()
}

type WorkerSocket = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Connect a fake Worker and complete the handshake.
async fn connect_worker(port: u16, registry: &WorkerRegistry) -> WorkerSocket {
    let (mut ws, _) = connect_async(format!("ws://127.0.0.1:{port}/ws/worker"))
        .await
        .expect("WS connect failed");
    ws.send(Message::Text(hello_frame(SECRET).into()))
        .await
        .unwrap();
    wait_until_connected(registry).await;
    ws
}

async fn wait_until_connected(registry: &WorkerRegistry) {
    for _ in 0..100 {
        if registry.is_worker_connected().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Worker never registered");
}

/// Parse a WS text frame into a serde_json::Value.
fn parse_ws_json(msg: &Message) -> Value {
    match msg {
        Message::Text(txt) => serde_json::from_str(txt).expect("invalid JSON from server"),
        other => panic!("expected Text frame, got {:?}", other),
    }
}

fn result_frame(result: TaskResult) -> String {
    Envelope::event(events::TASK_RESULT, result).to_frame()
}

// ── Handshake ────────────────────────────────────────────────────────

#[tokio::test]
async fn handshake_with_bad_secret_never_registers() {
    timeout(TEST_TIMEOUT, async {
        let (port, registry, _queue) = start_server().await;

        let (mut ws, _) = connect_async(format!("ws://127.0.0.1:{port}/ws/worker"))
            .await
            .unwrap();
        ws.send(Message::Text(hello_frame("wrong-secret").into()))
            .await
            .unwrap();

        // The gateway drops the connection without registering.
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(_)) => break,
            }
        }
        assert_eq!(registry.worker_count().await, 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn handshake_registers_worker_details() {
    timeout(TEST_TIMEOUT, async {
        let (port, registry, _queue) = start_server().await;
        let _ws = connect_worker(port, &registry).await;

        let snapshot = registry.worker().await.unwrap();
        assert_eq!(snapshot.hostname, "test-box");
        assert_eq!(snapshot.platform, "linux");
        assert_eq!(snapshot.capabilities, vec!["exec".to_string()]);
    })
    .await
    .expect("test timed out");
}

// ── Dispatch round trip ──────────────────────────────────────────────

#[tokio::test]
async fn dispatch_round_trip_over_the_wire() {
    timeout(TEST_TIMEOUT, async {
        let (port, registry, _queue) = start_server().await;
        let mut ws = connect_worker(port, &registry).await;

        let dispatch_handle = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                registry
                    .dispatch(
                        "exec",
                        serde_json::json!({"command": "ls"}),
                        DispatchOptions::default(),
                    )
                    .await
            })
        };

        // The fake Worker receives the dispatch frame.
        let msg = ws.next().await.unwrap().unwrap();
        let json = parse_ws_json(&msg);
        assert_eq!(json["type"], "event");
        assert_eq!(json["event"], "task_dispatch");
        assert_eq!(json["payload"]["tool"], "exec");
        assert_eq!(json["payload"]["params"]["command"], "ls");
        let task_id = json["payload"]["taskId"].as_str().unwrap().to_string();

        // ...and replies with a result frame.
        ws.send(Message::Text(
            result_frame(TaskResult::completed(
                task_id.clone(),
                serde_json::json!({"output": "file1.txt"}),
                100,
            ))
            .into(),
        ))
        .await
        .unwrap();

        let result = dispatch_handle.await.unwrap().unwrap();
        assert_eq!(result.task_id, task_id);
        assert_eq!(result.status, TaskStatus::Completed);
        assert_eq!(result.result.unwrap()["output"], "file1.txt");
        assert_eq!(result.duration, 100);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn offline_dispatch_resolves_with_queued_failure() {
    timeout(TEST_TIMEOUT, async {
        let (_port, registry, queue) = start_server().await;

        let result = registry
            .dispatch("exec", Value::Null, DispatchOptions::default())
            .await
            .unwrap();

        assert_eq!(result.status, TaskStatus::Failed);
        assert!(result.error.unwrap().contains("offline"));
        assert_eq!(queue.list_queued().await.unwrap().len(), 1);
    })
    .await
    .expect("test timed out");
}

// ── Drain on connect ─────────────────────────────────────────────────

#[tokio::test]
async fn backlog_drains_when_worker_connects() {
    timeout(TEST_TIMEOUT, async {
        let (port, registry, queue) = start_server().await;

        let a = QueuedTask::new("exec", serde_json::json!({"command": "uptime"}));
        let b = QueuedTask::new("screenshot", Value::Null);
        queue.enqueue(&a).await.unwrap();
        queue.enqueue(&b).await.unwrap();

        let mut ws = connect_worker(port, &registry).await;

        // Both parked tasks arrive, keyed by their durable ids.
        let mut seen = Vec::new();
        for _ in 0..2 {
            let msg = ws.next().await.unwrap().unwrap();
            let json = parse_ws_json(&msg);
            assert_eq!(json["event"], "task_dispatch");
            seen.push(json["payload"]["taskId"].as_str().unwrap().to_string());
        }
        assert!(seen.contains(&a.id));
        assert!(seen.contains(&b.id));
        assert!(queue.list_queued().await.unwrap().is_empty());

        // Completing a drained task lands in the durable row, not a waiter.
        ws.send(Message::Text(
            result_frame(TaskResult::completed(
                a.id.clone(),
                serde_json::json!({"output": "up 3 days"}),
                12,
            ))
            .into(),
        ))
        .await
        .unwrap();

        for _ in 0..100 {
            let stored = queue.get(&a.id).await.unwrap().unwrap();
            if stored.status == QueueStatus::Completed {
                assert_eq!(stored.result.unwrap()["output"], "up 3 days");
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("drained task never reached completed status");
    })
    .await
    .expect("test timed out");
}

// ── Disconnect ───────────────────────────────────────────────────────

#[tokio::test]
async fn worker_disconnect_rejects_in_flight_dispatch() {
    timeout(TEST_TIMEOUT, async {
        let (port, registry, _queue) = start_server().await;
        let mut ws = connect_worker(port, &registry).await;

        let dispatch_handle = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                registry
                    .dispatch("exec", Value::Null, DispatchOptions::default())
                    .await
            })
        };

        // Wait for the dispatch frame, then drop the connection.
        let msg = ws.next().await.unwrap().unwrap();
        assert_eq!(parse_ws_json(&msg)["event"], "task_dispatch");
        ws.close(None).await.unwrap();

        let err = dispatch_handle.await.unwrap().unwrap_err();
        assert!(matches!(err, DispatchError::WorkerDisconnected));

        // The gateway unregisters the connection.
        for _ in 0..100 {
            if registry.worker_count().await == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("Worker never unregistered after disconnect");
    })
    .await
    .expect("test timed out");
}

// ── Heartbeats ───────────────────────────────────────────────────────

#[tokio::test]
async fn heartbeat_frames_stamp_the_connection() {
    timeout(TEST_TIMEOUT, async {
        let (port, registry, _queue) = start_server().await;
        let mut ws = connect_worker(port, &registry).await;

        let before = registry.worker().await.unwrap().last_heartbeat;
        tokio::time::sleep(Duration::from_millis(20)).await;

        ws.send(Message::Text(
            Envelope::event(
                events::HEARTBEAT,
                remote_hands::protocol::Heartbeat { active_tasks: 1 },
            )
            .to_frame()
            .into(),
        ))
        .await
        .unwrap();

        for _ in 0..100 {
            if registry.worker().await.unwrap().last_heartbeat > before {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("heartbeat never stamped");
    })
    .await
    .expect("test timed out");
}
