use newapi_sidecar::{LaunchMode, SupervisorConfig, MODE_ENV_KEY};
use newapi_types::{SidecarError, SidecarResult, APP_NAME};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::cli::Cli;

pub const PORT_OVERRIDE_ENV_KEY: &str = "NEWAPI_PORT";
pub const DATA_DIR_OVERRIDE_ENV_KEY: &str = "NEWAPI_DATA_DIR";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub file: Option<PathBuf>,
    pub show_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file: None,
            show_target: false,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DesktopConfig {
    pub logging: LoggingConfig,
    pub supervisor: SupervisorConfig,
    pub export_dir: Option<PathBuf>,
}

/// Per-user application directory, e.g. `~/.local/share/New API`.
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join(APP_NAME))
        .unwrap_or_else(|| std::env::temp_dir().join(APP_NAME))
}

pub fn default_config_path() -> PathBuf {
    app_data_dir().join("config.toml")
}

impl DesktopConfig {
    pub fn load(path: impl AsRef<Path>) -> SidecarResult<Self> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| SidecarError::Config(format!("Failed to read config: {}", e)))?;

            toml::from_str(&contents)
                .map_err(|e| SidecarError::Config(format!("Failed to parse config: {}", e)))?
        } else {
            info!("Config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup(PORT_OVERRIDE_ENV_KEY) {
            if let Ok(p) = port.parse() {
                self.supervisor.port = p;
            }
        }

        if let Some(dir) = lookup(DATA_DIR_OVERRIDE_ENV_KEY) {
            self.supervisor.data_dir = Some(PathBuf::from(dir));
        }

        if let Some(mode) = lookup(MODE_ENV_KEY) {
            if mode.eq_ignore_ascii_case("development") {
                self.supervisor.mode = LaunchMode::Development;
            }
        }
    }

    pub fn apply_cli(&mut self, cli: &Cli) {
        if cli.dev {
            self.supervisor.mode = LaunchMode::Development;
        }
        if let Some(port) = cli.port {
            self.supervisor.port = port;
        }
        if let Some(ref dir) = cli.data_dir {
            self.supervisor.data_dir = Some(dir.clone());
        }
        if let Some(ref exe) = cli.executable {
            self.supervisor.executable = Some(exe.clone());
        }
        if let Some(ref dir) = cli.export_dir {
            self.export_dir = Some(dir.clone());
        }
    }

    pub fn validate(&self) -> SidecarResult<()> {
        self.supervisor.validate()
    }

    pub fn export_dir(&self) -> PathBuf {
        self.export_dir
            .clone()
            .unwrap_or_else(|| app_data_dir().join("logs"))
    }
}
