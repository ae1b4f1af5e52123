//! Filesystem locations used by the launcher
//!
//! Resolves where the node binaries live (dev checkout vs packaged app) and
//! where the per-user working state is kept. Nothing here touches the disk.

use crate::error::{LauncherError, Result};
use crate::node::spec::ProcessKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory name used under the platform data/config directories
pub const APP_DIR_NAME: &str = "Swarm-Launcher";

/// Operating systems we ship node binaries for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Mac,
    Linux,
    Win,
}

impl Platform {
    /// Map an OS identifier (`std::env::consts::OS` or a Node-style name)
    pub fn from_os(os: &str) -> Result<Self> {
        match os {
            "macos" | "darwin" => Ok(Platform::Mac),
            "linux" => Ok(Platform::Linux),
            "windows" | "win32" => Ok(Platform::Win),
            other => Err(LauncherError::UnsupportedPlatform(other.to_string())),
        }
    }

    /// Platform of the running process
    pub fn current() -> Result<Self> {
        Self::from_os(std::env::consts::OS)
    }

    /// Suffix used for development binaries (`geth-linux`, `swarm-mac`, ...)
    pub fn suffix(&self) -> &'static str {
        match self {
            Platform::Mac => "mac",
            Platform::Linux => "linux",
            Platform::Win => "win",
        }
    }
}

/// Whether we run from a source checkout or from a packaged app
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    Development,
    #[default]
    Packaged,
}

/// Roots the binary lookup starts from
#[derive(Debug, Clone)]
pub struct BinaryRoots {
    /// Source checkout root (development mode)
    pub project_root: PathBuf,
    /// Bundled resources directory (packaged mode)
    pub resources_dir: PathBuf,
}

impl BinaryRoots {
    /// Best-effort defaults: the working directory for development and the
    /// directory of the current executable for packaged builds
    pub fn detect() -> Self {
        let project_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let resources_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            project_root,
            resources_dir,
        }
    }
}

/// Path to the executable for a node kind
pub fn binary_path(
    kind: ProcessKind,
    mode: RuntimeMode,
    platform: Platform,
    roots: &BinaryRoots,
) -> PathBuf {
    let name = kind.binary_name();
    match mode {
        RuntimeMode::Development => roots
            .project_root
            .join("bin")
            .join(format!("{}-{}", name, platform.suffix())),
        RuntimeMode::Packaged => {
            let file = if platform == Platform::Win {
                format!("{}.exe", name)
            } else {
                name.to_string()
            };
            roots.resources_dir.join("bin").join(file)
        }
    }
}

/// Default per-user root for all persisted state
pub fn default_user_data_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Working state layout under the user data root
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppPaths {
    /// `<root>/data`, passed to both nodes as `--datadir`
    pub data_dir: PathBuf,
    /// `<root>/data/pwd`
    pub password_file: PathBuf,
    /// `<root>/data/keystore`
    pub keystore_dir: PathBuf,
    /// `<root>/data/node.log`, shared stderr log of both nodes
    pub log_file: PathBuf,
}

impl AppPaths {
    pub fn new(user_data_root: &Path) -> Self {
        let data_dir = user_data_root.join("data");
        Self {
            password_file: data_dir.join("pwd"),
            keystore_dir: data_dir.join("keystore"),
            log_file: data_dir.join("node.log"),
            data_dir,
        }
    }
}
