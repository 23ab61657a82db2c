//! Execution strategy — the pure decision of where a tool invocation runs.

use crate::classify::ToolDomain;

/// How a requested tool invocation should be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    /// Run in the orchestrating process.
    Local,
    /// Send to the connected Worker.
    Dispatch,
    /// Park in the durable queue until a Worker connects.
    Queue,
}

/// Decide the strategy for one invocation.
///
/// With hands disabled the split architecture is bypassed entirely. Cloud
/// tools never leave the orchestrator. Local tools queue when no Worker is
/// connected; hybrid tools fall back to the orchestrator instead, since
/// they can run either place.
pub fn resolve(
    hands_enabled: bool,
    domain: ToolDomain,
    worker_connected: bool,
) -> ExecutionStrategy {
    if !hands_enabled {
        return ExecutionStrategy::Local;
    }
    match domain {
        ToolDomain::Cloud => ExecutionStrategy::Local,
        ToolDomain::Local => {
            if worker_connected {
                ExecutionStrategy::Dispatch
            } else {
                ExecutionStrategy::Queue
            }
        }
        ToolDomain::Hybrid => {
            if worker_connected {
                ExecutionStrategy::Dispatch
            } else {
                ExecutionStrategy::Local
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hands_disabled_is_always_local() {
        for domain in [ToolDomain::Local, ToolDomain::Cloud, ToolDomain::Hybrid] {
            for connected in [false, true] {
                assert_eq!(resolve(false, domain, connected), ExecutionStrategy::Local);
            }
        }
    }

    #[test]
    fn cloud_never_leaves_the_orchestrator() {
        assert_eq!(resolve(true, ToolDomain::Cloud, true), ExecutionStrategy::Local);
        assert_eq!(resolve(true, ToolDomain::Cloud, false), ExecutionStrategy::Local);
    }

    #[test]
    fn local_dispatches_when_connected_queues_otherwise() {
        assert_eq!(resolve(true, ToolDomain::Local, true), ExecutionStrategy::Dispatch);
        assert_eq!(resolve(true, ToolDomain::Local, false), ExecutionStrategy::Queue);
    }

    #[test]
    fn hybrid_falls_back_to_local_when_disconnected() {
        assert_eq!(resolve(true, ToolDomain::Hybrid, true), ExecutionStrategy::Dispatch);
        assert_eq!(resolve(true, ToolDomain::Hybrid, false), ExecutionStrategy::Local);
    }
}
