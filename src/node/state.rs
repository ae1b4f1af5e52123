//! Lifecycle state of the managed nodes
//!
//! Tracks where the orchestrator is in its setup/start/stop cycle.

use serde::Serialize;

/// Orchestrator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// No credential on disk yet
    #[default]
    Uninitialized,
    /// Working directory and account exist, nothing running
    Provisioned,
    /// Both nodes reported ready
    Running,
    /// Nodes were stopped after running
    Stopped,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Provisioned => "provisioned",
            LifecycleState::Running => "running",
            LifecycleState::Stopped => "stopped",
        }
    }

    /// Whether a credential is known to exist in this state
    pub fn is_provisioned(&self) -> bool {
        !matches!(self, LifecycleState::Uninitialized)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the managed nodes (for the shell / CLI)
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub state: LifecycleState,

    /// Account address, if a credential exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// PID of the running geth process
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geth_pid: Option<u32>,

    /// PID of the running swarm process
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swarm_pid: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        let status = NodeStatus {
            state: LifecycleState::Running,
            address: Some("abc".to_string()),
            geth_pid: Some(42),
            swarm_pid: None,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "running");
        assert_eq!(json["gethPid"], 42);
        assert!(json.get("swarmPid").is_none());
    }

    #[test]
    fn test_provisioned_states() {
        assert!(!LifecycleState::Uninitialized.is_provisioned());
        assert!(LifecycleState::Provisioned.is_provisioned());
        assert!(LifecycleState::Stopped.is_provisioned());
    }
}
