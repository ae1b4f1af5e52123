//! Swarm Launcher
//!
//! Lifecycle orchestration for the local geth (blockchain) and swarm
//! (storage) nodes behind a desktop dApp shell. The shell calls
//! [`Orchestrator::setup`] and [`Orchestrator::start`] once the app is ready
//! and [`Orchestrator::stop`] when its window closes.

pub mod error;
pub mod keystore;
pub mod logging;
pub mod node;
pub mod paths;

pub use error::{LauncherError, Result};
pub use keystore::Credential;
pub use node::{LauncherConfig, LifecycleState, NodeStatus, Orchestrator};
pub use paths::{AppPaths, Platform, RuntimeMode};

/// Expand a user-supplied path: `~` prefix on Unix, `%VAR%` references on
/// Windows. Anything that cannot be expanded is left as written.
pub(crate) fn expand_path(path: &str) -> String {
    #[cfg(windows)]
    {
        expand_env_vars(path)
    }

    #[cfg(not(windows))]
    {
        expand_home(path)
    }
}

#[cfg(not(windows))]
fn expand_home(path: &str) -> String {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => return path.to_string(),
    };
    match dirs::home_dir() {
        Some(home) => format!("{}{}", home.display(), rest),
        None => path.to_string(),
    }
}

#[cfg(windows)]
fn expand_env_vars(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut rest = path;

    while let Some(open) = rest.find('%') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('%') else { break };
        match std::env::var(&after[..close]) {
            Ok(value) => {
                out.push_str(&rest[..open]);
                out.push_str(&value);
                rest = &after[close + 1..];
            }
            Err(_) => break,
        }
    }

    out.push_str(rest);
    out
}
