use std::sync::Arc;
use std::time::Duration;

use remote_hands::classify::StaticClassifier;
use remote_hands::config::HandsConfig;
use remote_hands::gateway::worker_routes;
use remote_hands::queue::{MemoryQueue, TaskQueue};
use remote_hands::registry::WorkerRegistry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // The shared secret is mandatory; an empty secret rejects every Worker.
    let secret = std::env::var("HANDS_WORKER_SECRET").unwrap_or_else(|_| {
        eprintln!("Error: HANDS_WORKER_SECRET not set");
        eprintln!("  export HANDS_WORKER_SECRET=<shared secret>");
        std::process::exit(1);
    });

    let port: u16 = std::env::var("HANDS_PORT")
        .unwrap_or_else(|_| "8787".to_string())
        .parse()
        .unwrap_or(8787);

    let heartbeat_secs: u64 = std::env::var("HANDS_HEARTBEAT_SEC")
        .unwrap_or_else(|_| "30".to_string())
        .parse()
        .unwrap_or(30);

    let task_timeout_ms: u64 = std::env::var("HANDS_TASK_TIMEOUT_MS")
        .unwrap_or_else(|_| "300000".to_string())
        .parse()
        .unwrap_or(300_000);

    let heartbeat_multiplier: u32 = std::env::var("HANDS_HEARTBEAT_MULTIPLIER")
        .unwrap_or_else(|_| "2".to_string())
        .parse()
        .unwrap_or(2);

    let config = HandsConfig {
        heartbeat_interval: Duration::from_secs(heartbeat_secs),
        default_task_timeout: Duration::from_millis(task_timeout_ms),
        heartbeat_timeout_multiplier: heartbeat_multiplier,
        ..HandsConfig::default().with_secret(secret)
    };

    let local_tools = env_list("HANDS_LOCAL_TOOLS", "exec,read_file,write_file,screenshot");
    let hybrid_tools = env_list("HANDS_HYBRID_TOOLS", "fetch");
    let classifier = Arc::new(StaticClassifier::new(local_tools, hybrid_tools));

    // In-memory backlog; a deployment that needs restart survival plugs a
    // persistent TaskQueue in here.
    let queue: Arc<dyn TaskQueue> = Arc::new(MemoryQueue::new());

    let heartbeat_interval = config.heartbeat_interval;
    let registry = Arc::new(WorkerRegistry::new(config, classifier, queue));

    eprintln!("🦾 Remote Hands v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Worker WS: ws://0.0.0.0:{}/ws/worker", port);
    eprintln!("   Workers API: http://0.0.0.0:{}/api/workers", port);

    // Stale-heartbeat sweep: the advisory interval × multiplier policy the
    // registry leaves to its caller.
    {
        let registry = Arc::clone(&registry);
        let stale_after = chrono::Duration::from_std(heartbeat_interval * heartbeat_multiplier)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(heartbeat_interval).await;
                let now = chrono::Utc::now();
                for worker in registry.workers().await {
                    if now - worker.last_heartbeat > stale_after {
                        tracing::warn!(
                            conn_id = %worker.id,
                            hostname = %worker.hostname,
                            "Worker heartbeat stale, unregistering"
                        );
                        registry.unregister_worker(worker.id).await;
                    }
                }
            }
        });
    }

    let app = worker_routes(registry);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn env_list(key: &str, default: &str) -> Vec<String> {
    std::env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
