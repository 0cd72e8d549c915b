use crate::{BackendSpec, ProcessError, ProcessState, RestartPolicy};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long a terminated backend gets before it is force-killed
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);

/// Supervisor behaviour, fixed for the life of a session
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// The backend is started independently during interactive development
    pub dev_mode: bool,
    pub grace_period: Duration,
    pub restart: RestartPolicy,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            dev_mode: false,
            grace_period: DEFAULT_GRACE_PERIOD,
            restart: RestartPolicy::Never,
        }
    }
}

/// The live backend. Only the supervisor ever holds one.
struct ProcessHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    monitor: JoinHandle<()>,
}

/// Manages exactly one backend process instance per session
pub struct ProcessSupervisor {
    config: SupervisorConfig,
    state: Arc<watch::Sender<ProcessState>>,
    handle: Option<ProcessHandle>,
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        let (state, _) = watch::channel(ProcessState::NotStarted);
        Self {
            config,
            state: Arc::new(state),
            handle: None,
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn state(&self) -> ProcessState {
        *self.state.borrow()
    }

    /// Observe state changes, including exits the host did not ask for
    pub fn subscribe(&self) -> watch::Receiver<ProcessState> {
        self.state.subscribe()
    }

    /// Spawn the backend described by `spec`.
    ///
    /// Does nothing in dev mode, while a process is already active, or when
    /// the entry point is missing. Must be called inside a tokio runtime.
    pub fn start(&mut self, spec: &BackendSpec) -> Result<ProcessState, ProcessError> {
        let current = self.state();

        if self.config.dev_mode {
            debug!("dev mode: backend is expected to be running separately");
            return Ok(current);
        }

        if current.is_active() {
            debug!(state = ?current, "backend already started");
            return Ok(current);
        }

        if !spec.entry_path.exists() {
            warn!(
                entry = %spec.entry_path.display(),
                "backend entry point not found, continuing without backend"
            );
            return Ok(current);
        }

        // A previous run has finished; its monitor task is already done.
        self.handle = None;

        self.state.send_replace(ProcessState::Starting);
        let (child, pid) = match spawn_backend(spec) {
            Ok(spawned) => spawned,
            Err(e) => {
                warn!(entry = %spec.entry_path.display(), error = %e, "failed to start backend");
                self.state.send_replace(current);
                return Err(e);
            }
        };
        self.state.send_replace(ProcessState::Running { pid });
        info!(pid, entry = %spec.entry_path.display(), "backend started");

        let (stop_tx, stop_rx) = oneshot::channel();
        let monitor = tokio::spawn(monitor(
            child,
            spec.clone(),
            self.config.clone(),
            Arc::clone(&self.state),
            stop_rx,
        ));
        self.handle = Some(ProcessHandle {
            stop_tx: Some(stop_tx),
            monitor,
        });

        Ok(self.state())
    }

    /// Terminate the backend and wait for it to be reaped.
    ///
    /// A no-op when nothing is running. Bounded by twice the grace period.
    pub async fn stop(&mut self) -> ProcessState {
        let Some(mut handle) = self.handle.take() else {
            return self.state();
        };
        if !self.state().is_active() {
            return self.state();
        }

        debug!(state = ?self.state(), "stopping backend");
        if let Some(stop_tx) = handle.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        let deadline = self.config.grace_period * 2 + Duration::from_millis(500);
        if tokio::time::timeout(deadline, &mut handle.monitor)
            .await
            .is_err()
        {
            // Aborting drops the child, and kill_on_drop reaps it.
            warn!("backend monitor did not finish in time, aborting");
            handle.monitor.abort();
            self.state.send_replace(ProcessState::Stopped { code: None });
        }

        self.state()
    }
}

// ============================================================================
// Process plumbing
// ============================================================================

fn spawn_backend(spec: &BackendSpec) -> Result<(Child, u32), ProcessError> {
    let mut cmd = spec.command();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(
        interpreter = ?spec.interpreter,
        entry = %spec.entry_path.display(),
        cwd = %spec.working_dir.display(),
        "backend.spawn"
    );

    let mut child = cmd.spawn().map_err(ProcessError::from)?;
    let pid = child
        .id()
        .ok_or_else(|| ProcessError::failed_to_spawn("Process has no PID"))?;

    if let Some(stdout) = child.stdout.take() {
        forward_lines(stdout, pid, OutputStream::Stdout);
    }
    if let Some(stderr) = child.stderr.take() {
        forward_lines(stderr, pid, OutputStream::Stderr);
    }

    Ok((child, pid))
}

#[derive(Debug, Clone, Copy)]
enum OutputStream {
    Stdout,
    Stderr,
}

/// Copy a child stream into the log, one line per event
fn forward_lines<R>(reader: R, pid: u32, stream: OutputStream)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let result = read_lines(reader, |line| match stream {
            OutputStream::Stdout => info!(target: "backend", pid, "{}", line),
            OutputStream::Stderr => warn!(target: "backend", pid, "{}", line),
        })
        .await;
        if let Err(e) = result {
            debug!(pid, ?stream, error = %e, "backend output closed");
        }
    });
}

/// Read until EOF, handing each line to `on_line` without its terminator.
///
/// Bytes that are not UTF-8 are replaced rather than ending the stream; the
/// pipe must stay drained for as long as the child writes to it.
async fn read_lines<R, F>(reader: R, mut on_line: F) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => return Ok(()),
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                on_line(line.trim_end_matches(&['\r', '\n'][..]));
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Owns the child: waits for it, honours stop requests and the restart policy
async fn monitor(
    mut child: Child,
    spec: BackendSpec,
    config: SupervisorConfig,
    state: Arc<watch::Sender<ProcessState>>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut restarts = 0u32;

    loop {
        let pid = child.id();
        let status = tokio::select! {
            status = child.wait() => status,
            // Also fires when the supervisor is dropped.
            _ = &mut stop_rx => {
                let code = terminate(&mut child, config.grace_period).await;
                info!(?pid, ?code, "backend stopped");
                state.send_replace(ProcessState::Stopped { code });
                return;
            }
        };

        let code = match status {
            Ok(status) => {
                log_exit(pid, &status);
                status.code()
            }
            Err(e) => {
                warn!(?pid, error = %e, "failed to wait on backend");
                None
            }
        };

        if !config.restart.should_restart(code, restarts) {
            state.send_replace(ProcessState::Stopped { code });
            return;
        }

        restarts += 1;
        let delay = config.restart.backoff(restarts);
        warn!(
            attempt = restarts,
            delay_ms = delay.as_millis() as u64,
            "restarting backend"
        );
        state.send_replace(ProcessState::Starting);

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = &mut stop_rx => {
                state.send_replace(ProcessState::Stopped { code });
                return;
            }
        }

        match spawn_backend(&spec) {
            Ok((next, pid)) => {
                child = next;
                state.send_replace(ProcessState::Running { pid });
                info!(pid, attempt = restarts, "backend restarted");
            }
            Err(e) => {
                warn!(error = %e, "failed to restart backend");
                state.send_replace(ProcessState::Stopped { code });
                return;
            }
        }
    }
}

fn log_exit(pid: Option<u32>, status: &ExitStatus) {
    match status.code() {
        Some(0) => info!(?pid, "Backend process exited with code 0"),
        Some(code) => warn!(?pid, code, "Backend process exited with code {}", code),
        None => warn!(?pid, "Backend process terminated by signal"),
    }
}

/// SIGTERM, then SIGKILL once the grace period runs out
async fn terminate(child: &mut Child, grace: Duration) -> Option<i32> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                debug!(pid, error = %e, "SIGTERM failed");
            }
            if let Ok(Ok(status)) = tokio::time::timeout(grace, child.wait()).await {
                return status.code();
            }
            warn!(pid, "backend ignored SIGTERM, killing");
        }
    }

    #[cfg(not(unix))]
    let _ = grace;

    if let Err(e) = child.kill().await {
        warn!(error = %e, "failed to kill backend");
    }
    child.wait().await.ok().and_then(|status| status.code())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn sh_spec(dir: &Path, entry: PathBuf) -> BackendSpec {
        BackendSpec::new(entry, dir).with_interpreter(Some("sh".to_string()))
    }

    fn fast_config() -> SupervisorConfig {
        SupervisorConfig {
            grace_period: Duration::from_millis(300),
            ..SupervisorConfig::default()
        }
    }

    async fn wait_until_stopped(rx: &mut watch::Receiver<ProcessState>) -> ProcessState {
        let state = tokio::time::timeout(
            Duration::from_secs(10),
            rx.wait_for(|s| matches!(s, ProcessState::Stopped { .. })),
        )
        .await
        .expect("backend did not stop in time")
        .expect("state channel closed");
        *state
    }

    fn is_alive(pid: u32) -> bool {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }

    #[tokio::test]
    async fn test_read_lines_replaces_invalid_utf8() {
        let mut lines = Vec::new();
        read_lines(&b"caf\xe9\nsecond\r\nlast"[..], |line| lines.push(line.to_string()))
            .await
            .unwrap();
        assert_eq!(lines, ["caf\u{FFFD}", "second", "last"]);
    }

    #[tokio::test]
    async fn test_non_utf8_output_keeps_backend_running() {
        let dir = TempDir::new().unwrap();
        let entry = script(
            dir.path(),
            "main.sh",
            "printf 'caf\\351\\n'\nprintf 'bad \\377 err\\n' >&2\nsleep 0.3\necho still-alive\necho done > marker.txt\n",
        );
        let mut supervisor = ProcessSupervisor::new(fast_config());
        let mut rx = supervisor.subscribe();

        supervisor.start(&sh_spec(dir.path(), entry)).unwrap();
        let state = wait_until_stopped(&mut rx).await;
        assert_eq!(state, ProcessState::Stopped { code: Some(0) });
        assert!(dir.path().join("marker.txt").exists());
    }

    #[tokio::test]
    async fn test_missing_entry_leaves_not_started() {
        let dir = TempDir::new().unwrap();
        let mut supervisor = ProcessSupervisor::new(fast_config());
        let spec = sh_spec(dir.path(), dir.path().join("missing.sh"));

        let state = supervisor.start(&spec).unwrap();
        assert_eq!(state, ProcessState::NotStarted);
        assert_eq!(supervisor.state(), ProcessState::NotStarted);
    }

    #[tokio::test]
    async fn test_dev_mode_does_not_spawn() {
        let dir = TempDir::new().unwrap();
        let entry = script(dir.path(), "main.sh", "exec sleep 30\n");
        let mut supervisor = ProcessSupervisor::new(SupervisorConfig {
            dev_mode: true,
            ..fast_config()
        });

        let state = supervisor.start(&sh_spec(dir.path(), entry)).unwrap();
        assert_eq!(state, ProcessState::NotStarted);
    }

    #[tokio::test]
    async fn test_start_then_stop() {
        let dir = TempDir::new().unwrap();
        let entry = script(dir.path(), "main.sh", "exec sleep 30\n");
        let mut supervisor = ProcessSupervisor::new(fast_config());
        assert_eq!(supervisor.state(), ProcessState::NotStarted);

        let state = supervisor.start(&sh_spec(dir.path(), entry)).unwrap();
        let pid = state.pid().expect("backend should be running");
        assert!(is_alive(pid));

        let state = supervisor.stop().await;
        assert!(matches!(state, ProcessState::Stopped { .. }));
        assert!(!is_alive(pid));
    }

    #[tokio::test]
    async fn test_double_start_is_noop() {
        let dir = TempDir::new().unwrap();
        let entry = script(dir.path(), "main.sh", "exec sleep 30\n");
        let spec = sh_spec(dir.path(), entry);
        let mut supervisor = ProcessSupervisor::new(fast_config());

        let first = supervisor.start(&spec).unwrap();
        let second = supervisor.start(&spec).unwrap();
        assert_eq!(first, second);

        supervisor.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut supervisor = ProcessSupervisor::new(fast_config());
        assert_eq!(supervisor.stop().await, ProcessState::NotStarted);

        let entry = script(dir.path(), "main.sh", "exec sleep 30\n");
        supervisor.start(&sh_spec(dir.path(), entry)).unwrap();
        let stopped = supervisor.stop().await;
        assert_eq!(supervisor.stop().await, stopped);
        assert_eq!(supervisor.state(), stopped);
    }

    #[tokio::test]
    async fn test_exit_code_is_recorded() {
        let dir = TempDir::new().unwrap();
        let entry = script(dir.path(), "main.sh", "exit 3\n");
        let mut supervisor = ProcessSupervisor::new(fast_config());
        let mut rx = supervisor.subscribe();

        supervisor.start(&sh_spec(dir.path(), entry)).unwrap();
        let state = wait_until_stopped(&mut rx).await;
        assert_eq!(state, ProcessState::Stopped { code: Some(3) });

        // Nothing left to stop.
        assert_eq!(supervisor.stop().await, state);
    }

    #[tokio::test]
    async fn test_environment_and_working_dir() {
        let dir = TempDir::new().unwrap();
        let entry = script(
            dir.path(),
            "main.sh",
            "printf '%s|%s' \"$PYTHONPATH\" \"$CHEF_MODE\" > env.txt\n",
        );
        let spec = sh_spec(dir.path(), entry).with_env("CHEF_MODE", "kitchen");
        let mut supervisor = ProcessSupervisor::new(fast_config());
        let mut rx = supervisor.subscribe();

        supervisor.start(&spec).unwrap();
        wait_until_stopped(&mut rx).await;

        let written = std::fs::read_to_string(dir.path().join("env.txt")).unwrap();
        assert_eq!(written, format!("{}|kitchen", dir.path().display()));
    }

    #[tokio::test]
    async fn test_restart_on_failure() {
        let dir = TempDir::new().unwrap();
        let entry = script(dir.path(), "main.sh", "echo run >> runs.txt\nexit 1\n");
        let mut supervisor = ProcessSupervisor::new(SupervisorConfig {
            restart: RestartPolicy::OnFailure {
                max_attempts: 2,
                backoff_ms: 10,
            },
            ..fast_config()
        });
        let mut rx = supervisor.subscribe();

        supervisor.start(&sh_spec(dir.path(), entry)).unwrap();
        let state = wait_until_stopped(&mut rx).await;
        assert_eq!(state, ProcessState::Stopped { code: Some(1) });

        let runs = std::fs::read_to_string(dir.path().join("runs.txt")).unwrap();
        assert_eq!(runs.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_stop_escalates_when_sigterm_ignored() {
        let dir = TempDir::new().unwrap();
        let entry = script(dir.path(), "main.sh", "trap '' TERM\nexec sleep 30\n");
        let mut supervisor = ProcessSupervisor::new(fast_config());

        let pid = supervisor
            .start(&sh_spec(dir.path(), entry))
            .unwrap()
            .pid()
            .unwrap();
        // Give the shell time to install the trap before signalling.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let state = supervisor.stop().await;
        assert_eq!(state, ProcessState::Stopped { code: None });
        assert!(!is_alive(pid));
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let dir = TempDir::new().unwrap();
        let entry = script(dir.path(), "main.sh", "exec sleep 30\n");
        let spec = sh_spec(dir.path(), entry);
        let mut supervisor = ProcessSupervisor::new(fast_config());

        let first = supervisor.start(&spec).unwrap().pid().unwrap();
        supervisor.stop().await;
        let second = supervisor.start(&spec).unwrap().pid().unwrap();
        assert_ne!(first, second);
        assert!(supervisor.state().is_active());

        supervisor.stop().await;
        assert!(!supervisor.state().is_active());
    }
}
