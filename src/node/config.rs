//! Launcher configuration types and persistence
//!
//! Handles loading and saving launcher configuration from disk.

use crate::paths::{self, AppPaths, BinaryRoots, RuntimeMode, APP_DIR_NAME};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Password written to `data/pwd` on first setup
pub const DEFAULT_PASSWORD: &str = "secret";

/// Launcher configuration stored in launcher_config.json
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LauncherConfig {
    /// Where binaries are looked up (dev checkout or packaged resources)
    #[serde(default)]
    pub runtime_mode: RuntimeMode,

    /// Override for the per-user data root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data_root: Option<String>,

    /// Override for the source checkout root (development mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_root: Option<String>,

    /// Override for the bundled resources directory (packaged mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources_dir: Option<String>,

    /// Content of the password file handed to both nodes
    #[serde(default = "default_password")]
    pub password: String,

    /// Seconds to wait for a node to report readiness (0 disables the limit)
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,

    /// Seconds between the polite termination request and a hard kill
    #[serde(default = "default_stop_grace")]
    pub stop_grace_secs: u64,

    /// geth: `--rpcapi` modules
    #[serde(default = "default_rpc_api")]
    pub rpc_api: String,

    /// geth: `--rpccorsdomain`
    #[serde(default = "default_rpc_cors_domain")]
    pub rpc_cors_domain: String,

    /// geth: `--syncmode`
    #[serde(default = "default_sync_mode")]
    pub sync_mode: String,

    /// swarm: `--bzzport`
    #[serde(default = "default_bzz_port")]
    pub bzz_port: u16,

    /// swarm: `--wsport`
    #[serde(default = "default_ws_port")]
    pub ws_port: u16,

    /// swarm: `--store.size` (chunks)
    #[serde(default = "default_store_size")]
    pub store_size: u64,
}

fn default_password() -> String {
    DEFAULT_PASSWORD.to_string()
}

fn default_ready_timeout() -> u64 {
    120
}

fn default_stop_grace() -> u64 {
    10
}

fn default_rpc_api() -> String {
    "eth,web3,net,db,debug".to_string()
}

fn default_rpc_cors_domain() -> String {
    "127.0.0.1".to_string()
}

fn default_sync_mode() -> String {
    "light".to_string()
}

fn default_bzz_port() -> u16 {
    8500
}

fn default_ws_port() -> u16 {
    8600
}

fn default_store_size() -> u64 {
    1_000_000
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            runtime_mode: RuntimeMode::default(),
            user_data_root: None,
            project_root: None,
            resources_dir: None,
            password: default_password(),
            ready_timeout_secs: default_ready_timeout(),
            stop_grace_secs: default_stop_grace(),
            rpc_api: default_rpc_api(),
            rpc_cors_domain: default_rpc_cors_domain(),
            sync_mode: default_sync_mode(),
            bzz_port: default_bzz_port(),
            ws_port: default_ws_port(),
            store_size: default_store_size(),
        }
    }
}

impl LauncherConfig {
    /// Get the path to the launcher config file
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
            .join("launcher_config.json")
    }

    /// Load config from disk, or return default if not found
    pub fn load() -> Self {
        let path = Self::config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                log::warn!("Ignoring unreadable config {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save config to disk
    pub fn save(&self) -> crate::Result<()> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| crate::LauncherError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&path, contents)?;

        log::info!("Launcher config saved to {}", path.display());
        Ok(())
    }

    /// Readiness timeout, `None` when disabled
    pub fn ready_timeout(&self) -> Option<Duration> {
        match self.ready_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    /// Per-user root holding `data/`
    pub fn user_data_root(&self) -> PathBuf {
        match &self.user_data_root {
            Some(dir) if !dir.is_empty() => PathBuf::from(crate::expand_path(dir)),
            _ => paths::default_user_data_root(),
        }
    }

    /// Working state layout derived from this config
    pub fn app_paths(&self) -> AppPaths {
        AppPaths::new(&self.user_data_root())
    }

    /// Binary lookup roots, with configured overrides applied
    pub fn binary_roots(&self) -> BinaryRoots {
        let mut roots = BinaryRoots::detect();
        if let Some(dir) = self.project_root.as_deref().filter(|d| !d.is_empty()) {
            roots.project_root = PathBuf::from(crate::expand_path(dir));
        }
        if let Some(dir) = self.resources_dir.as_deref().filter(|d| !d.is_empty()) {
            roots.resources_dir = PathBuf::from(crate::expand_path(dir));
        }
        roots
    }
}
