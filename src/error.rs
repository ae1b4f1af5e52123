//! Error types for the launcher
//!
//! Every failure raised while provisioning, starting or stopping the nodes
//! is one of these variants. Nothing is retried inside the crate; callers
//! decide what to do with a failed start.

use std::path::PathBuf;
use std::time::Duration;

/// Errors surfaced by the path resolver, keystore and process lifecycle
#[derive(Debug, thiserror::Error)]
pub enum LauncherError {
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("no credential found in {}", .keystore.display())]
    NoCredential { keystore: PathBuf },

    #[error("corrupt credential {}: {reason}", .path.display())]
    CorruptCredential { path: PathBuf, reason: String },

    /// `start()` was called before `setup()` produced an account
    #[error("cannot start nodes without a credential, run setup first")]
    MissingCredential,

    #[error("failed to start {name}: {source}")]
    ProcessSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{name} reported a fatal error: {line}")]
    ProcessFatal { name: String, line: String },

    #[error("{name} exited before it was ready ({status})")]
    ProcessExitedEarly { name: String, status: String },

    #[error("{name} was not ready after {timeout:?}")]
    ProcessTimeout { name: String, timeout: Duration },

    #[error("{name} is already running (pid {pid:?})")]
    AlreadyRunning { name: String, pid: Option<u32> },

    #[error("account creation failed ({status}): {stderr}")]
    AccountCreation { status: String, stderr: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),
}

impl LauncherError {
    /// Whether the error came from a managed process rather than local state
    pub fn is_process_failure(&self) -> bool {
        matches!(
            self,
            Self::ProcessSpawn { .. }
                | Self::ProcessFatal { .. }
                | Self::ProcessExitedEarly { .. }
                | Self::ProcessTimeout { .. }
                | Self::AccountCreation { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, LauncherError>;
