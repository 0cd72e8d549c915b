//! Backend process supervision for the Chef Suite host
//!
//! Owns at most one backend child process per session: spawns it, forwards
//! its output into the host log, records how it exited and terminates it
//! when the session ends.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

mod supervisor;

pub use supervisor::{ProcessSupervisor, SupervisorConfig, DEFAULT_GRACE_PERIOD};

// ============================================================================
// Error Types with Structured Codes
// ============================================================================

/// Error codes for process operations (for machine-readable errors)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ProcessErrorCode {
    /// Permission denied while spawning
    PermissionDenied = 4001,
    /// Interpreter or entry binary not found
    NotFound = 4002,
    /// Failed to spawn process
    FailedToSpawn = 4003,
}

/// Custom error type for process operations
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("[{code}] Permission denied: {message}")]
    PermissionDenied { code: u32, message: String },

    #[error("[{code}] Not found: {message}")]
    NotFound { code: u32, message: String },

    #[error("[{code}] Failed to spawn: {message}")]
    FailedToSpawn { code: u32, message: String },
}

impl ProcessError {
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            code: ProcessErrorCode::PermissionDenied as u32,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            code: ProcessErrorCode::NotFound as u32,
            message: message.into(),
        }
    }

    pub fn failed_to_spawn(message: impl Into<String>) -> Self {
        Self::FailedToSpawn {
            code: ProcessErrorCode::FailedToSpawn as u32,
            message: message.into(),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            Self::PermissionDenied { code, .. }
            | Self::NotFound { code, .. }
            | Self::FailedToSpawn { code, .. } => *code,
        }
    }
}

impl From<std::io::Error> for ProcessError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(e.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::permission_denied(e.to_string()),
            _ => Self::failed_to_spawn(e.to_string()),
        }
    }
}

// ============================================================================
// Types
// ============================================================================

/// Lifecycle of the backend process.
///
/// `NotStarted -> Starting -> Running -> Stopped(code)`. A restart policy may
/// move `Running` back to `Starting`; nothing leaves `Stopped` except a fresh
/// `start()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    NotStarted,
    Starting,
    Running { pid: u32 },
    /// `code` is `None` when the process was ended by a signal.
    Stopped { code: Option<i32> },
}

impl ProcessState {
    /// Whether a live (or about to be live) process backs this state
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Running { .. })
    }

    pub fn pid(&self) -> Option<u32> {
        match self {
            Self::Running { pid } => Some(*pid),
            _ => None,
        }
    }
}

/// Interpreter used for the backend entry when none is configured
pub fn default_interpreter() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}

/// Everything needed to launch the backend
#[derive(Debug, Clone)]
pub struct BackendSpec {
    /// Program that runs `entry_path`; `None` executes the entry directly
    pub interpreter: Option<String>,
    pub entry_path: PathBuf,
    pub working_dir: PathBuf,
    /// Extra variables on top of the inherited host environment
    pub env: HashMap<String, String>,
    /// Variable that points the backend at its module search root
    pub module_path_var: String,
    pub module_root: PathBuf,
}

impl BackendSpec {
    pub fn new(entry_path: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        let working_dir = working_dir.into();
        Self {
            interpreter: Some(default_interpreter().to_string()),
            entry_path: entry_path.into(),
            module_root: working_dir.clone(),
            working_dir,
            env: HashMap::new(),
            module_path_var: "PYTHONPATH".to_string(),
        }
    }

    pub fn with_interpreter(mut self, interpreter: Option<String>) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Build the command; stdio is configured by the supervisor
    pub fn command(&self) -> Command {
        let mut cmd = match &self.interpreter {
            Some(interpreter) => {
                let mut cmd = Command::new(interpreter);
                cmd.arg(&self.entry_path);
                cmd
            }
            None => Command::new(&self.entry_path),
        };
        cmd.current_dir(&self.working_dir);
        cmd.envs(&self.env);
        cmd.env(&self.module_path_var, &self.module_root);
        cmd
    }
}

/// What to do when the backend exits without being asked to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "policy", rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// Record the exit and stay stopped
    #[default]
    Never,
    /// Respawn after a non-zero or signalled exit, with exponential backoff
    OnFailure {
        max_attempts: u32,
        #[serde(default = "default_backoff_ms")]
        backoff_ms: u64,
    },
}

fn default_backoff_ms() -> u64 {
    500
}

const MAX_BACKOFF: Duration = Duration::from_secs(30);

impl RestartPolicy {
    /// `restarts` is the number of restarts already performed
    pub fn should_restart(&self, code: Option<i32>, restarts: u32) -> bool {
        match self {
            Self::Never => false,
            Self::OnFailure { max_attempts, .. } => code != Some(0) && restarts < *max_attempts,
        }
    }

    /// Delay before restart number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        match self {
            Self::Never => Duration::ZERO,
            Self::OnFailure { backoff_ms, .. } => {
                let factor = 1u64 << attempt.saturating_sub(1).min(16);
                Duration::from_millis(backoff_ms.saturating_mul(factor)).min(MAX_BACKOFF)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
