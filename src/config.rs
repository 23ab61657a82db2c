//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

/// Brain-side coordination configuration.
#[derive(Debug, Clone)]
pub struct HandsConfig {
    /// Shared secret a Worker must present during the handshake.
    /// An empty secret rejects every handshake.
    pub worker_secret: SecretString,
    /// Expected interval between Worker heartbeats.
    pub heartbeat_interval: Duration,
    /// Default per-task timeout for dispatched work.
    pub default_task_timeout: Duration,
    /// A Worker is considered stale after `heartbeat_interval` times this
    /// multiplier without a heartbeat. Advisory — consumed by the sweep loop
    /// in the binary, not enforced by the registry.
    pub heartbeat_timeout_multiplier: u32,
    /// Whether the split Brain/Worker architecture is enabled at all.
    /// When false every tool runs locally.
    pub hands_enabled: bool,
}

impl Default for HandsConfig {
    fn default() -> Self {
        Self {
            worker_secret: SecretString::from(""),
            heartbeat_interval: Duration::from_secs(30),
            default_task_timeout: Duration::from_millis(300_000), // 5 minutes
            heartbeat_timeout_multiplier: 2,
            hands_enabled: true,
        }
    }
}

impl HandsConfig {
    /// Builder: set the worker secret.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.worker_secret = SecretString::from(secret.into());
        self
    }

    /// Builder: set the default task timeout.
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.default_task_timeout = timeout;
        self
    }
}
