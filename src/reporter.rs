//! Worker-side liveness reporter.
//!
//! A self-rescheduling beat: each emission builds a status payload, invokes
//! the registered callback, then schedules the next beat relative to the
//! current time. A slow callback delays only the next beat instead of
//! causing drift or overlapping emissions.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use sysinfo::System;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::protocol::StatusReport;

/// Default emission interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Receives each status payload. Errors are swallowed with a warning so a
/// failing callback never breaks the chain.
pub type StatusCallback = Arc<dyn Fn(StatusReport) -> anyhow::Result<()> + Send + Sync>;

/// Supplies the current active-task count, owned by the Worker runtime.
pub type ActiveTaskFn = Arc<dyn Fn() -> usize + Send + Sync>;

/// Periodically emits a [`StatusReport`] while running.
pub struct LivenessReporter {
    interval: Duration,
    callback: StatusCallback,
    active_tasks: ActiveTaskFn,
    running: Mutex<Option<JoinHandle<()>>>,
}

impl LivenessReporter {
    pub fn new(callback: StatusCallback, active_tasks: ActiveTaskFn) -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            callback,
            active_tasks,
            running: Mutex::new(None),
        }
    }

    /// Builder: override the emission interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start the beat. Idempotent — a second call while running is a no-op.
    /// The first emission happens only after one full interval has elapsed.
    pub fn start(&self) {
        let mut running = self.running.lock().expect("reporter lock poisoned");
        if running.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("Liveness reporter already running");
            return;
        }

        let interval = self.interval;
        let callback = Arc::clone(&self.callback);
        let active_tasks = Arc::clone(&self.active_tasks);

        *running = Some(tokio::spawn(async move {
            let started = tokio::time::Instant::now();
            loop {
                tokio::time::sleep(interval).await;
                let report = build_report(started.elapsed(), active_tasks());
                if let Err(e) = callback(report) {
                    warn!(error = %e, "Status callback failed");
                }
            }
        }));
    }

    /// Cancel the pending beat. Idempotent.
    pub fn stop(&self) {
        if let Some(handle) = self.running.lock().expect("reporter lock poisoned").take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .expect("reporter lock poisoned")
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for LivenessReporter {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_report(uptime: Duration, active_tasks: usize) -> StatusReport {
    let mut sys = System::new();
    sys.refresh_memory();
    StatusReport {
        uptime_ms: uptime.as_millis() as u64,
        load_avg: System::load_average().one,
        active_tasks,
        mem_free_bytes: sys.free_memory(),
        mem_total_bytes: sys.total_memory(),
    }
}
