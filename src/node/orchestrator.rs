//! Node orchestration
//!
//! Sequences account setup, startup (geth, then swarm), shutdown and reset
//! of the two managed nodes. This is the surface the desktop shell calls:
//! `setup()` + `start()` when the app is ready, `stop()` when the window
//! closes.

use super::config::LauncherConfig;
use super::spec::{account_new_args, ManagedProcessSpec, ProcessKind};
use super::state::{LifecycleState, NodeStatus};
use super::supervisor::ProcessSupervisor;
use crate::error::{LauncherError, Result};
use crate::keystore::{self, Credential};
use crate::paths::{binary_path, AppPaths, Platform};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Executables for both nodes
#[derive(Debug, Clone)]
pub struct NodeBinaries {
    pub geth: PathBuf,
    pub swarm: PathBuf,
}

impl NodeBinaries {
    /// Resolve binaries for the running platform and configured mode
    pub fn resolve(config: &LauncherConfig) -> Result<Self> {
        let platform = Platform::current()?;
        let roots = config.binary_roots();
        Ok(Self {
            geth: binary_path(ProcessKind::Geth, config.runtime_mode, platform, &roots),
            swarm: binary_path(ProcessKind::Swarm, config.runtime_mode, platform, &roots),
        })
    }
}

/// Owns both process supervisors and the on-disk working state
pub struct Orchestrator {
    config: LauncherConfig,
    paths: AppPaths,
    binaries: NodeBinaries,
    geth: ProcessSupervisor,
    swarm: ProcessSupervisor,
    state: Mutex<LifecycleState>,
}

impl Orchestrator {
    /// Create an orchestrator with paths and binaries derived from `config`
    pub fn new(config: LauncherConfig) -> Result<Self> {
        let paths = config.app_paths();
        let binaries = NodeBinaries::resolve(&config)?;
        Ok(Self::with_binaries(config, paths, binaries))
    }

    /// Create an orchestrator with explicit locations
    pub fn with_binaries(config: LauncherConfig, paths: AppPaths, binaries: NodeBinaries) -> Self {
        let initial = if keystore::has_credential(&paths.keystore_dir) {
            LifecycleState::Provisioned
        } else {
            LifecycleState::Uninitialized
        };

        let stop_grace = config.stop_grace();
        Self {
            geth: ProcessSupervisor::new(ProcessKind::Geth, stop_grace),
            swarm: ProcessSupervisor::new(ProcessKind::Swarm, stop_grace),
            config,
            paths,
            binaries,
            state: Mutex::new(initial),
        }
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn binaries(&self) -> &NodeBinaries {
        &self.binaries
    }

    pub fn state(&self) -> LifecycleState {
        match self.state.lock() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_state(&self, next: LifecycleState) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *state != next {
            log::debug!("Node lifecycle: {} -> {}", *state, next);
            *state = next;
        }
    }

    /// Current status snapshot
    pub async fn status(&self) -> NodeStatus {
        self.refresh_state().await;
        NodeStatus {
            state: self.state(),
            address: keystore::current_credential(&self.paths.keystore_dir)
                .ok()
                .map(|c| c.address),
            geth_pid: self.geth.pid().await,
            swarm_pid: self.swarm.pid().await,
        }
    }

    /// Provision the working directory and create the node account.
    ///
    /// No-op when the keystore already holds a credential.
    pub async fn setup(&self) -> Result<()> {
        log::info!("Running node setup...");

        if keystore::has_credential(&self.paths.keystore_dir) {
            log::info!("Keystore exists, skipping setup");
            if !self.state().is_provisioned() {
                self.set_state(LifecycleState::Provisioned);
            }
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.paths.data_dir).await?;
        tokio::fs::write(&self.paths.password_file, &self.config.password).await?;

        self.create_account().await?;

        let credential = keystore::current_credential(&self.paths.keystore_dir)?;
        log::info!("Created node account {}", credential.address);

        self.set_state(LifecycleState::Provisioned);
        Ok(())
    }

    /// Run `geth account new` to completion
    async fn create_account(&self) -> Result<()> {
        log::info!("Creating node account with {}", self.binaries.geth.display());

        let output = Command::new(&self.binaries.geth)
            .args(account_new_args(&self.paths))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| LauncherError::ProcessSpawn {
                name: ProcessKind::Geth.to_string(),
                source,
            })?;

        self.append_node_log(&output.stderr).await;

        if !output.status.success() {
            return Err(LauncherError::AccountCreation {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    async fn append_node_log(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }

        let result = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.paths.log_file)
                .await?;
            file.write_all(bytes).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = result {
            log::warn!("Failed to write {}: {}", self.paths.log_file.display(), e);
        }
    }

    /// Credential read fresh from disk for each node start
    fn credential(&self) -> Result<Credential> {
        keystore::current_credential(&self.paths.keystore_dir).map_err(|e| match e {
            LauncherError::NoCredential { .. } => LauncherError::MissingCredential,
            other => other,
        })
    }

    /// Drop a stale `Running` once either node has exited on its own
    async fn refresh_state(&self) {
        if self.state() != LifecycleState::Running {
            return;
        }
        let geth_alive = self.geth.is_running().await;
        let swarm_alive = self.swarm.is_running().await;
        if !(geth_alive && swarm_alive) {
            log::warn!(
                "Node exited unexpectedly (geth running: {}, swarm running: {})",
                geth_alive,
                swarm_alive
            );
            self.set_state(LifecycleState::Stopped);
        }
    }

    /// Start geth, then swarm. Swarm is not attempted if geth fails.
    ///
    /// A node that is still alive is left alone, so calling this again after
    /// a partial failure or a crash only brings up what is missing.
    pub async fn start(&self) -> Result<()> {
        self.refresh_state().await;

        if self.geth.is_running().await {
            log::info!("geth already running, skipping");
        } else {
            self.start_geth().await?;
        }

        if self.swarm.is_running().await {
            log::info!("swarm already running, skipping");
        } else {
            self.start_swarm().await?;
        }

        self.set_state(LifecycleState::Running);
        log::info!("All nodes started");
        Ok(())
    }

    async fn start_geth(&self) -> Result<()> {
        log::info!("Starting geth");
        let credential = self.credential()?;
        let spec = ManagedProcessSpec::geth(
            self.binaries.geth.clone(),
            &self.paths,
            &self.config,
            &credential,
        );
        self.geth.start(spec, self.config.ready_timeout()).await
    }

    async fn start_swarm(&self) -> Result<()> {
        log::info!("Starting swarm");
        let credential = self.credential()?;
        let spec = ManagedProcessSpec::swarm(
            self.binaries.swarm.clone(),
            &self.paths,
            &self.config,
            &credential,
        );
        self.swarm.start(spec, self.config.ready_timeout()).await
    }

    /// Terminate both nodes concurrently. Succeeds when nothing is running.
    pub async fn stop(&self) -> Result<()> {
        let was_running = self.geth.is_running().await || self.swarm.is_running().await;

        let supervisors = [&self.geth, &self.swarm];
        futures_util::future::join_all(supervisors.iter().map(|s| s.terminate())).await;

        if was_running || self.state() == LifecycleState::Running {
            self.set_state(LifecycleState::Stopped);
            log::info!("All nodes stopped");
        }
        Ok(())
    }

    /// Stop everything, delete all persisted state and set up again.
    ///
    /// This destroys the account key and all chain/storage data.
    pub async fn reset(&self) -> Result<()> {
        log::warn!("Resetting node data at {}", self.paths.data_dir.display());

        self.stop().await?;

        match tokio::fs::remove_dir_all(&self.paths.data_dir).await {
            Ok(()) => log::info!("Deleted {}", self.paths.data_dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.set_state(LifecycleState::Uninitialized);

        self.setup().await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;

    const GETH_OK: &str = r#"
case "$*" in
  *"account new"*)
    mkdir -p "$2/keystore"
    addr=$(od -An -N20 -tx1 /dev/urandom | tr -d ' \n')
    echo "{\"address\":\"$addr\",\"version\":3}" > "$2/keystore/UTC--$(date +%s)--$addr"
    echo "Address: {$addr}"
    exit 0
    ;;
esac
echo 'INFO [01-01] HTTP endpoint opened: ws://127.0.0.1:8545' >&2
exec sleep 30
"#;

    const GETH_FATAL: &str = r#"
case "$*" in
  *"account new"*)
    mkdir -p "$2/keystore"
    echo '{"address":"8a3f1c0d2e4b5a69788796a5b4c3d2e1f0a1b2c3"}' > "$2/keystore/UTC--1--a"
    exit 0
    ;;
esac
echo 'INFO ... Fatal: disk full'
exec sleep 30
"#;

    const GETH_ACCOUNT_FAILS: &str = r#"
echo 'Fatal: could not decrypt key' >&2
exit 1
"#;

    const SWARM_OK: &str = r#"
echo 'INFO WebSocket endpoint opened url=ws://127.0.0.1:8600' >&2
exec sleep 30
"#;

    /// Fails on the first run in a data dir, comes up on the next
    const SWARM_FAILS_ONCE: &str = r#"
if [ ! -e "$2/swarm-attempted" ]; then
  touch "$2/swarm-attempted"
  echo 'Fatal: failed to listen on 127.0.0.1:8500' >&2
  exec sleep 30
fi
echo 'INFO WebSocket endpoint opened url=ws://127.0.0.1:8600' >&2
exec sleep 30
"#;

    struct Fixture {
        _tmp: TempDir,
        root: PathBuf,
        calls: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let root = tmp.path().to_path_buf();
            let calls = root.join("calls.log");
            Self {
                _tmp: tmp,
                root,
                calls,
            }
        }

        /// Fake node binary that records each invocation before running `body`
        fn binary(&self, name: &str, body: &str) -> PathBuf {
            let bin_dir = self.root.join("bin");
            fs::create_dir_all(&bin_dir).unwrap();
            let path = bin_dir.join(name);
            let script = format!(
                "#!/bin/sh\necho \"{} $*\" >> '{}'\n{}",
                name,
                self.calls.display(),
                body
            );
            let source = bin_dir.join(format!("{}.sh", name));
            fs::write(&source, script).unwrap();
            fs::set_permissions(&source, fs::Permissions::from_mode(0o755)).unwrap();

            // Installed by a child process so this test binary never holds a
            // write fd on the executable (ETXTBSY under parallel tests)
            let status = std::process::Command::new("cp")
                .arg(&source)
                .arg(&path)
                .status()
                .unwrap();
            assert!(status.success());
            path
        }

        fn orchestrator(&self, geth: &str, swarm: &str) -> Orchestrator {
            let config = LauncherConfig {
                ready_timeout_secs: 10,
                stop_grace_secs: 5,
                ..Default::default()
            };
            let binaries = NodeBinaries {
                geth: self.binary("geth", geth),
                swarm: self.binary("swarm", swarm),
            };
            Orchestrator::with_binaries(config, AppPaths::new(&self.root), binaries)
        }

        fn calls(&self) -> Vec<String> {
            fs::read_to_string(&self.calls)
                .unwrap_or_default()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    /// Service launches of `name`, excluding account creation
    fn launches(calls: &[String], name: &str) -> usize {
        calls
            .iter()
            .filter(|c| c.starts_with(&format!("{} ", name)) && !c.contains("account new"))
            .count()
    }

    async fn wait_for_exit(supervisor: &ProcessSupervisor) {
        for _ in 0..100 {
            if !supervisor.is_running().await {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        panic!("process did not exit");
    }

    fn keystore_entries(dir: &Path) -> Vec<(String, String)> {
        let mut entries: Vec<(String, String)> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .map(|p| {
                (
                    p.file_name().unwrap().to_string_lossy().to_string(),
                    fs::read_to_string(&p).unwrap(),
                )
            })
            .collect();
        entries.sort();
        entries
    }

    #[tokio::test]
    async fn test_setup_creates_one_key_and_password() {
        let fx = Fixture::new();
        let orchestrator = fx.orchestrator(GETH_OK, SWARM_OK);
        assert_eq!(orchestrator.state(), LifecycleState::Uninitialized);

        orchestrator.setup().await.unwrap();

        let paths = orchestrator.paths();
        assert_eq!(keystore_entries(&paths.keystore_dir).len(), 1);
        assert_eq!(fs::read_to_string(&paths.password_file).unwrap(), "secret");
        assert_eq!(orchestrator.state(), LifecycleState::Provisioned);
        assert!(fx.calls()[0].contains("account new"));
    }

    #[tokio::test]
    async fn test_setup_is_idempotent() {
        let fx = Fixture::new();
        let orchestrator = fx.orchestrator(GETH_OK, SWARM_OK);

        orchestrator.setup().await.unwrap();
        let keys = keystore_entries(&orchestrator.paths().keystore_dir);

        orchestrator.setup().await.unwrap();
        orchestrator.setup().await.unwrap();

        assert_eq!(keystore_entries(&orchestrator.paths().keystore_dir), keys);
        assert_eq!(fx.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_existing_keystore_starts_provisioned() {
        let fx = Fixture::new();
        fx.orchestrator(GETH_OK, SWARM_OK).setup().await.unwrap();

        let orchestrator = fx.orchestrator(GETH_OK, SWARM_OK);
        assert_eq!(orchestrator.state(), LifecycleState::Provisioned);
    }

    #[tokio::test]
    async fn test_failed_account_creation_surfaces() {
        let fx = Fixture::new();
        let orchestrator = fx.orchestrator(GETH_ACCOUNT_FAILS, SWARM_OK);

        match orchestrator.setup().await.unwrap_err() {
            LauncherError::AccountCreation { stderr, .. } => {
                assert!(stderr.contains("could not decrypt key"))
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(orchestrator.state(), LifecycleState::Uninitialized);
    }

    #[tokio::test]
    async fn test_start_without_credential() {
        let fx = Fixture::new();
        let orchestrator = fx.orchestrator(GETH_OK, SWARM_OK);

        let err = orchestrator.start().await.unwrap_err();
        assert!(matches!(err, LauncherError::MissingCredential));
        assert!(fx.calls().is_empty());
    }

    #[tokio::test]
    async fn test_start_then_stop() {
        let fx = Fixture::new();
        let orchestrator = fx.orchestrator(GETH_OK, SWARM_OK);

        orchestrator.setup().await.unwrap();
        orchestrator.start().await.unwrap();

        let status = orchestrator.status().await;
        assert_eq!(status.state, LifecycleState::Running);
        assert!(status.geth_pid.is_some());
        assert!(status.swarm_pid.is_some());

        let address = status.address.unwrap();
        let calls = fx.calls();
        assert!(calls[1].starts_with("geth "));
        assert!(calls[1].contains(&format!("--etherbase {}", address)));
        assert!(calls[2].starts_with("swarm "));
        assert!(calls[2].contains(&format!("--bzzaccount {}", address)));

        orchestrator.stop().await.unwrap();
        let status = orchestrator.status().await;
        assert_eq!(status.state, LifecycleState::Stopped);
        assert!(status.geth_pid.is_none());
        assert!(status.swarm_pid.is_none());

        let log = fs::read_to_string(&orchestrator.paths().log_file).unwrap();
        assert!(log.contains("HTTP endpoint opened"));
        assert!(log.contains("WebSocket endpoint opened"));
    }

    #[tokio::test]
    async fn test_geth_failure_skips_swarm() {
        let fx = Fixture::new();
        let orchestrator = fx.orchestrator(GETH_FATAL, SWARM_OK);

        orchestrator.setup().await.unwrap();
        let err = orchestrator.start().await.unwrap_err();

        match err {
            LauncherError::ProcessFatal { name, line } => {
                assert_eq!(name, "geth");
                assert_eq!(line, "INFO ... Fatal: disk full");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(fx.calls().iter().all(|c| !c.starts_with("swarm")));
        assert_ne!(orchestrator.state(), LifecycleState::Running);

        orchestrator.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_while_running_is_noop() {
        let fx = Fixture::new();
        let orchestrator = fx.orchestrator(GETH_OK, SWARM_OK);

        orchestrator.setup().await.unwrap();
        orchestrator.start().await.unwrap();
        let before = orchestrator.status().await;

        orchestrator.start().await.unwrap();
        let after = orchestrator.status().await;

        assert_eq!(after.state, LifecycleState::Running);
        assert_eq!(after.geth_pid, before.geth_pid);
        assert_eq!(after.swarm_pid, before.swarm_pid);
        assert_eq!(launches(&fx.calls(), "geth"), 1);
        assert_eq!(launches(&fx.calls(), "swarm"), 1);

        orchestrator.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_restarts_crashed_node() {
        let fx = Fixture::new();
        let orchestrator = fx.orchestrator(GETH_OK, SWARM_OK);

        orchestrator.setup().await.unwrap();
        orchestrator.start().await.unwrap();
        let before = orchestrator.status().await;
        let geth_pid = before.geth_pid.unwrap();

        // SAFETY: plain kill(2) on a pid this test spawned
        let rc = unsafe { libc::kill(geth_pid as libc::pid_t, libc::SIGKILL) };
        assert_eq!(rc, 0);
        wait_for_exit(&orchestrator.geth).await;

        let status = orchestrator.status().await;
        assert_eq!(status.state, LifecycleState::Stopped);
        assert!(status.geth_pid.is_none());
        assert_eq!(status.swarm_pid, before.swarm_pid);

        orchestrator.start().await.unwrap();

        let status = orchestrator.status().await;
        assert_eq!(status.state, LifecycleState::Running);
        assert!(status.geth_pid.is_some());
        assert_ne!(status.geth_pid, Some(geth_pid));
        assert_eq!(status.swarm_pid, before.swarm_pid);
        assert_eq!(launches(&fx.calls(), "geth"), 2);
        assert_eq!(launches(&fx.calls(), "swarm"), 1);

        orchestrator.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_retry_after_swarm_failure_keeps_geth() {
        let fx = Fixture::new();
        let orchestrator = fx.orchestrator(GETH_OK, SWARM_FAILS_ONCE);

        orchestrator.setup().await.unwrap();
        match orchestrator.start().await.unwrap_err() {
            LauncherError::ProcessFatal { name, .. } => assert_eq!(name, "swarm"),
            other => panic!("unexpected error: {:?}", other),
        }

        let status = orchestrator.status().await;
        assert_ne!(status.state, LifecycleState::Running);
        let geth_pid = status.geth_pid.unwrap();
        assert!(status.swarm_pid.is_none());

        orchestrator.start().await.unwrap();

        let status = orchestrator.status().await;
        assert_eq!(status.state, LifecycleState::Running);
        assert_eq!(status.geth_pid, Some(geth_pid));
        assert!(status.swarm_pid.is_some());
        assert_eq!(launches(&fx.calls(), "geth"), 1);
        assert_eq!(launches(&fx.calls(), "swarm"), 2);

        orchestrator.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_never_started() {
        let fx = Fixture::new();
        let orchestrator = fx.orchestrator(GETH_OK, SWARM_OK);

        orchestrator.stop().await.unwrap();

        assert_eq!(orchestrator.state(), LifecycleState::Uninitialized);
        assert!(fx.calls().is_empty());
    }

    #[tokio::test]
    async fn test_reset_creates_fresh_credential() {
        let fx = Fixture::new();
        let orchestrator = fx.orchestrator(GETH_OK, SWARM_OK);

        orchestrator.setup().await.unwrap();
        orchestrator.start().await.unwrap();
        let before = orchestrator.status().await.address.unwrap();

        orchestrator.reset().await.unwrap();
        assert_eq!(orchestrator.state(), LifecycleState::Provisioned);
        assert_eq!(keystore_entries(&orchestrator.paths().keystore_dir).len(), 1);

        orchestrator.start().await.unwrap();
        let after = orchestrator.status().await.address.unwrap();
        assert_ne!(before, after);

        orchestrator.stop().await.unwrap();
    }
}
