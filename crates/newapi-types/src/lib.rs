#![forbid(unsafe_code)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const APP_NAME: &str = "New API";

pub const BACKEND_BINARY_NAME: &str = "new-api";

pub const BACKEND_BINARY_NAME_WINDOWS: &str = "new-api.exe";

pub const DATABASE_FILE_NAME: &str = "new-api.db";

pub const DEFAULT_PORT: u16 = 3000;

pub const PORT_ENV_KEY: &str = "PORT";

pub const DATABASE_PATH_ENV_KEY: &str = "SQLITE_PATH";

pub const DEFAULT_LOG_CAPACITY: usize = 100;

pub const DEFAULT_CRASH_TAIL_LINES: usize = 20;

pub const DEFAULT_READINESS_ATTEMPTS: u32 = 30;

pub const DEFAULT_READINESS_INTERVAL_MS: u64 = 1000;

pub const DEFAULT_GRACE_PERIOD_MS: u64 = 5000;

#[derive(Error, Debug)]
pub enum SidecarError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment error: {0}")]
    Environment(String),

    #[error("Failed to launch backend: {0}")]
    Spawn(String),

    #[error("Server failed to start within timeout ({attempts} attempts)")]
    ReadinessTimeout { attempts: u32 },

    #[error("Server exited during startup with code {}", display_code(.exit_code))]
    ExitedDuringStartup { exit_code: Option<i32> },

    #[error("Backend already running (state: {0})")]
    AlreadyRunning(SupervisorState),

    #[error("Signal error: {0}")]
    Signal(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type SidecarResult<T> = Result<T, SidecarError>;

fn display_code(code: &Option<i32>) -> String {
    code.map(|c| c.to_string()).unwrap_or_else(|| "null".into())
}

/// Lifecycle of one supervised backend instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    #[default]
    NotStarted,
    Starting,
    Ready,
    Crashed,
    ShuttingDown,
    Stopped,
}

impl SupervisorState {
    /// States from which a fresh `start()` may launch a new instance.
    pub fn can_start(&self) -> bool {
        matches!(
            self,
            SupervisorState::NotStarted | SupervisorState::Stopped | SupervisorState::Crashed
        )
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorState::NotStarted => write!(f, "not-started"),
            SupervisorState::Starting => write!(f, "starting"),
            SupervisorState::Ready => write!(f, "ready"),
            SupervisorState::Crashed => write!(f, "crashed"),
            SupervisorState::ShuttingDown => write!(f, "shutting-down"),
            SupervisorState::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    PortInUse,
    DatabaseLocked,
    PermissionDenied,
    NetworkUnreachable,
    InvalidConfiguration,
    OutOfMemory,
    MissingFile,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 7] = [
        ErrorCategory::PortInUse,
        ErrorCategory::DatabaseLocked,
        ErrorCategory::PermissionDenied,
        ErrorCategory::NetworkUnreachable,
        ErrorCategory::InvalidConfiguration,
        ErrorCategory::OutOfMemory,
        ErrorCategory::MissingFile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::PortInUse => "port-in-use",
            ErrorCategory::DatabaseLocked => "database-locked",
            ErrorCategory::PermissionDenied => "permission-denied",
            ErrorCategory::NetworkUnreachable => "network-unreachable",
            ErrorCategory::InvalidConfiguration => "invalid-configuration",
            ErrorCategory::OutOfMemory => "out-of-memory",
            ErrorCategory::MissingFile => "missing-file",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-readable explanation of a backend failure, derived from its stderr.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub category: ErrorCategory,
    pub title: String,
    pub message: String,
    pub remediation: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserChoice {
    #[default]
    DismissAndExit,
    ViewFullLog,
}

/// Observed termination of a backend process. `code` is `None` when the
/// process was terminated by a signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitInfo {
    pub code: Option<i32>,
}

impl ExitInfo {
    pub fn new(code: Option<i32>) -> Self {
        Self { code }
    }

    /// Exit code 0 and signal termination both count as a normal stop.
    pub fn is_abnormal(&self) -> bool {
        matches!(self.code, Some(code) if code != 0)
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", display_code(&self.code))
    }
}
