//! Process specifications for the managed nodes
//!
//! Command lines and readiness markers are a contract with the geth and
//! swarm binaries: changing a marker here means the launcher no longer
//! recognises the corresponding log line.

use super::config::LauncherConfig;
use crate::keystore::Credential;
use crate::paths::AppPaths;
use serde::Serialize;
use std::path::PathBuf;

/// geth logs this once its HTTP-RPC server is up
pub const GETH_READY_MARKER: &str = "http endpoint opened";

/// swarm logs this once its WebSocket server is up
pub const SWARM_READY_MARKER: &str = "websocket endpoint opened";

/// Both binaries prefix unrecoverable errors with this
pub const FATAL_MARKER: &str = "fatal:";

/// The two long-lived processes the launcher manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessKind {
    /// Blockchain client (node-A)
    Geth,
    /// Distributed storage client (node-B)
    Swarm,
}

impl ProcessKind {
    /// Executable base name
    pub fn binary_name(&self) -> &'static str {
        match self {
            ProcessKind::Geth => "geth",
            ProcessKind::Swarm => "swarm",
        }
    }

    /// Literal markers scanned for in this process's output
    pub fn markers(&self) -> ReadinessMarkers {
        match self {
            ProcessKind::Geth => ReadinessMarkers::new(GETH_READY_MARKER, FATAL_MARKER),
            ProcessKind::Swarm => ReadinessMarkers::new(SWARM_READY_MARKER, FATAL_MARKER),
        }
    }
}

impl std::fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.binary_name())
    }
}

/// Case-insensitive substrings that classify a log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessMarkers {
    ready: String,
    fatal: String,
}

impl ReadinessMarkers {
    pub fn new(ready: &str, fatal: &str) -> Self {
        Self {
            ready: ready.to_lowercase(),
            fatal: fatal.to_lowercase(),
        }
    }

    pub fn ready(&self) -> &str {
        &self.ready
    }

    pub fn fatal(&self) -> &str {
        &self.fatal
    }
}

/// Everything needed to launch one managed process
#[derive(Debug, Clone)]
pub struct ManagedProcessSpec {
    pub kind: ProcessKind,
    /// Display name used in logs and errors
    pub name: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Shared log file receiving the process's stderr
    pub log_path: PathBuf,
    pub markers: ReadinessMarkers,
}

impl ManagedProcessSpec {
    /// Long-running geth service, mining to the given account
    pub fn geth(
        program: PathBuf,
        paths: &AppPaths,
        config: &LauncherConfig,
        credential: &Credential,
    ) -> Self {
        let args = vec![
            "--datadir".to_string(),
            paths.data_dir.to_string_lossy().to_string(),
            "--rpc".to_string(),
            "--rpcapi".to_string(),
            config.rpc_api.clone(),
            "--rpccorsdomain".to_string(),
            config.rpc_cors_domain.clone(),
            "--syncmode".to_string(),
            config.sync_mode.clone(),
            "--etherbase".to_string(),
            credential.address.clone(),
        ];

        Self::new(ProcessKind::Geth, program, args, paths)
    }

    /// Long-running swarm service bound to the given account
    pub fn swarm(
        program: PathBuf,
        paths: &AppPaths,
        config: &LauncherConfig,
        credential: &Credential,
    ) -> Self {
        let args = vec![
            "--datadir".to_string(),
            paths.data_dir.to_string_lossy().to_string(),
            "--password".to_string(),
            paths.password_file.to_string_lossy().to_string(),
            "--bzzaccount".to_string(),
            credential.address.clone(),
            "--bzzport".to_string(),
            config.bzz_port.to_string(),
            "--ws".to_string(),
            "--wsorigins".to_string(),
            "*".to_string(),
            "--wsport".to_string(),
            config.ws_port.to_string(),
            "--ens-api".to_string(),
            String::new(),
            "--store.size".to_string(),
            config.store_size.to_string(),
        ];

        Self::new(ProcessKind::Swarm, program, args, paths)
    }

    fn new(kind: ProcessKind, program: PathBuf, args: Vec<String>, paths: &AppPaths) -> Self {
        Self {
            kind,
            name: kind.binary_name().to_string(),
            program,
            args,
            log_path: paths.log_file.clone(),
            markers: kind.markers(),
        }
    }
}

/// Arguments for the one-shot `geth account new` invocation
pub fn account_new_args(paths: &AppPaths) -> Vec<String> {
    vec![
        "--datadir".to_string(),
        paths.data_dir.to_string_lossy().to_string(),
        "--password".to_string(),
        paths.password_file.to_string_lossy().to_string(),
        "account".to_string(),
        "new".to_string(),
    ]
}
