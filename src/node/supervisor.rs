//! Node process supervision
//!
//! Spawns one managed process, scans its output for readiness and fatal
//! markers, copies its stderr into the shared node log and tears it down on
//! request.
//!
//! Each spawned process gets two scanner tasks (stdout, stderr) and an exit
//! monitor task. The monitor owns the [`Child`]: it waits for exit or for a
//! termination request, drains the scanners and then reports the exit to
//! the readiness latch, so a fatal line printed just before exiting is still
//! reported as fatal.

use super::readiness::{classify_line, LogSignal, ReadinessLatch, ReadinessOutcome};
use super::spec::{ManagedProcessSpec, ProcessKind, ReadinessMarkers};
use crate::error::{LauncherError, Result};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

/// How long the exit monitor waits for output pipes to close after exit
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Live process state, owned by its supervisor
struct ManagedProcessHandle {
    spec: ManagedProcessSpec,
    pid: Option<u32>,
    latch: Arc<ReadinessLatch>,
    /// Dropping this also asks the monitor to terminate the process
    kill_tx: Option<oneshot::Sender<()>>,
    monitor: JoinHandle<()>,
}

impl ManagedProcessHandle {
    fn is_alive(&self) -> bool {
        !self.monitor.is_finished()
    }
}

/// Supervises a single process kind
pub struct ProcessSupervisor {
    kind: ProcessKind,
    stop_grace: Duration,
    handle: Mutex<Option<ManagedProcessHandle>>,
}

impl ProcessSupervisor {
    /// Create a supervisor with nothing running
    pub fn new(kind: ProcessKind, stop_grace: Duration) -> Self {
        Self {
            kind,
            stop_grace,
            handle: Mutex::new(None),
        }
    }

    /// PID of the live process, if any
    pub async fn pid(&self) -> Option<u32> {
        self.handle
            .lock()
            .await
            .as_ref()
            .filter(|h| h.is_alive())
            .and_then(|h| h.pid)
    }

    /// Check if a process we spawned is still running
    pub async fn is_running(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .map(|h| h.is_alive())
            .unwrap_or(false)
    }

    /// Spawn the process described by `spec`
    pub async fn spawn(&self, spec: ManagedProcessSpec) -> Result<Option<u32>> {
        debug_assert_eq!(spec.kind, self.kind);

        let mut guard = self.handle.lock().await;
        if let Some(existing) = guard.as_ref() {
            if existing.is_alive() {
                return Err(LauncherError::AlreadyRunning {
                    name: existing.spec.name.clone(),
                    pid: existing.pid,
                });
            }
        }
        // Previous process already exited, forget it
        *guard = None;

        let log_file = open_log(&spec).await?;

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // On Windows, prevent console window from appearing
        #[cfg(target_os = "windows")]
        {
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        log::info!("Starting {}: {:?}", spec.name, cmd.as_std());
        let mut child = cmd.spawn().map_err(|source| LauncherError::ProcessSpawn {
            name: spec.name.clone(),
            source,
        })?;

        let pid = child.id();
        log::info!("{} started with PID {:?}", spec.name, pid);

        let latch = Arc::new(ReadinessLatch::new());
        let mut scanners = Vec::with_capacity(2);

        if let Some(stdout) = child.stdout.take() {
            scanners.push(tokio::spawn(scan_output(
                stdout,
                spec.name.clone(),
                spec.markers.clone(),
                latch.clone(),
                None,
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            scanners.push(tokio::spawn(scan_output(
                stderr,
                spec.name.clone(),
                spec.markers.clone(),
                latch.clone(),
                Some(log_file),
            )));
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        let monitor = tokio::spawn(monitor_exit(
            child,
            spec.name.clone(),
            kill_rx,
            scanners,
            latch.clone(),
            self.stop_grace,
        ));

        *guard = Some(ManagedProcessHandle {
            spec,
            pid,
            latch,
            kill_tx: Some(kill_tx),
            monitor,
        });

        Ok(pid)
    }

    /// Wait until the process reports readiness.
    ///
    /// Fails on the fatal marker, on exit before readiness, or when `timeout`
    /// elapses. Only the first of these is ever reported for a given spawn.
    pub async fn wait_until_ready(&self, timeout: Option<Duration>) -> Result<()> {
        let (name, latch) = {
            let guard = self.handle.lock().await;
            match guard.as_ref() {
                Some(h) => (h.spec.name.clone(), h.latch.clone()),
                None => {
                    return Err(LauncherError::ProcessExitedEarly {
                        name: self.kind.to_string(),
                        status: "not running".to_string(),
                    })
                }
            }
        };

        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, latch.settled()).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    latch.resolve(ReadinessOutcome::TimedOut(limit));
                    // Something else may have won in the meantime
                    latch
                        .outcome()
                        .unwrap_or(ReadinessOutcome::TimedOut(limit))
                }
            },
            None => latch.settled().await,
        };

        outcome_to_result(&name, outcome)
    }

    /// Spawn and wait for readiness; a process that fails to come up is
    /// terminated before the error is returned
    pub async fn start(&self, spec: ManagedProcessSpec, timeout: Option<Duration>) -> Result<()> {
        let name = spec.name.clone();
        self.spawn(spec).await?;

        match self.wait_until_ready(timeout).await {
            Ok(()) => {
                log::info!("{} node started", name);
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to start {} node: {}", name, e);
                self.terminate().await;
                Err(e)
            }
        }
    }

    /// Terminate the process and wait for it to exit. No-op if not running.
    pub async fn terminate(&self) {
        let handle = self.handle.lock().await.take();
        let mut handle = match handle {
            Some(handle) => handle,
            None => return,
        };

        log::info!("Stopping {}...", handle.spec.name);

        if let Some(tx) = handle.kill_tx.take() {
            // Err means the monitor already saw the process exit
            let _ = tx.send(());
        }

        if let Err(e) = handle.monitor.await {
            log::warn!("{} exit monitor failed: {}", handle.spec.name, e);
        }

        log::info!("{} stopped", handle.spec.name);
    }
}

fn outcome_to_result(name: &str, outcome: ReadinessOutcome) -> Result<()> {
    match outcome {
        ReadinessOutcome::Ready => Ok(()),
        ReadinessOutcome::Fatal(line) => Err(LauncherError::ProcessFatal {
            name: name.to_string(),
            line,
        }),
        ReadinessOutcome::Exited(status) => Err(LauncherError::ProcessExitedEarly {
            name: name.to_string(),
            status,
        }),
        ReadinessOutcome::TimedOut(timeout) => Err(LauncherError::ProcessTimeout {
            name: name.to_string(),
            timeout,
        }),
    }
}

/// Open the shared node log for appending
async fn open_log(spec: &ManagedProcessSpec) -> Result<File> {
    if let Some(parent) = spec.log_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&spec.log_path)
        .await?;
    Ok(file)
}

/// Log target for a child's output lines, e.g. `node::geth`
fn output_target(name: &str) -> String {
    format!("node::{}", name)
}

/// Read lines from one output stream until EOF, resolving the latch on
/// markers. Stderr lines are also appended to the node log.
async fn scan_output<R>(
    stream: R,
    name: String,
    markers: ReadinessMarkers,
    latch: Arc<ReadinessLatch>,
    mut log_file: Option<File>,
) where
    R: AsyncRead + Unpin,
{
    let target = output_target(&name);
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                log::warn!("Failed to read {} output: {}", name, e);
                break;
            }
        }

        let write_error = match log_file.as_mut() {
            Some(file) => file.write_all(&buf).await.err(),
            None => None,
        };
        if let Some(e) = write_error {
            log::warn!("Failed to write {} output to node log: {}", name, e);
            log_file = None;
        }

        let text = String::from_utf8_lossy(&buf);
        let line = text.trim_end();
        log::debug!(target: &target, "{}", line);

        match classify_line(line, &markers) {
            Some(LogSignal::Ready) => {
                if latch.resolve(ReadinessOutcome::Ready) {
                    log::info!("{} reported ready", name);
                }
            }
            Some(LogSignal::Fatal) => {
                log::error!("{} error: {}", name, line);
                latch.resolve(ReadinessOutcome::Fatal(line.to_string()));
            }
            None => {}
        }
    }

    if let Some(mut file) = log_file {
        let _ = file.flush().await;
    }
}

/// Own the child until it exits, either on its own or on request
async fn monitor_exit(
    mut child: Child,
    name: String,
    kill_rx: oneshot::Receiver<()>,
    scanners: Vec<JoinHandle<()>>,
    latch: Arc<ReadinessLatch>,
    stop_grace: Duration,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill_rx => terminate_child(&mut child, &name, stop_grace).await,
    };

    for mut scanner in scanners {
        if tokio::time::timeout(OUTPUT_DRAIN_GRACE, &mut scanner)
            .await
            .is_err()
        {
            log::warn!("{} output still open after exit, detaching", name);
            scanner.abort();
        }
    }

    let description = describe_exit(&status);
    if latch.resolve(ReadinessOutcome::Exited(description.clone())) {
        log::warn!("{} exited before it was ready ({})", name, description);
    } else {
        log::info!("{} exited ({})", name, description);
    }
}

fn describe_exit(status: &std::io::Result<ExitStatus>) -> String {
    match status {
        Ok(status) => status.to_string(),
        Err(e) => format!("wait failed: {}", e),
    }
}

/// Ask the child to exit, escalating to a hard kill after `grace`
async fn terminate_child(
    child: &mut Child,
    name: &str,
    grace: Duration,
) -> std::io::Result<ExitStatus> {
    request_termination(child, name);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            log::warn!("{} did not exit within {:?}, killing", name, grace);
            child.kill().await?;
            child.wait().await
        }
    }
}

#[cfg(unix)]
fn request_termination(child: &mut Child, name: &str) {
    // None means the child was already reaped
    if let Some(pid) = child.id() {
        // SAFETY: kill(2) has no memory-safety preconditions; the pid is our
        // own unreaped child so it cannot have been recycled
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc != 0 {
            log::warn!(
                "Failed to send SIGTERM to {} (PID {}): {}",
                name,
                pid,
                std::io::Error::last_os_error()
            );
        }
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child, name: &str) {
    if let Err(e) = child.start_kill() {
        log::warn!("Failed to terminate {}: {}", name, e);
    }
}
