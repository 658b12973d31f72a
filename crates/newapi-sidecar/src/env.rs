use newapi_types::{
    SidecarError, SidecarResult, APP_NAME, BACKEND_BINARY_NAME, BACKEND_BINARY_NAME_WINDOWS,
    DATABASE_FILE_NAME, DATABASE_PATH_ENV_KEY, DEFAULT_PORT, PORT_ENV_KEY,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const MODE_ENV_KEY: &str = "NEWAPI_ENV";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LaunchMode {
    Development,
    #[default]
    Packaged,
}

impl LaunchMode {
    pub fn from_env() -> Self {
        match std::env::var(MODE_ENV_KEY) {
            Ok(value) if value.eq_ignore_ascii_case("development") => LaunchMode::Development,
            _ => LaunchMode::Packaged,
        }
    }
}

impl std::fmt::Display for LaunchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LaunchMode::Development => write!(f, "development"),
            LaunchMode::Packaged => write!(f, "packaged"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostPlatform {
    Windows,
    MacOs,
    Linux,
    Other,
}

impl HostPlatform {
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &str) -> Self {
        match os {
            "windows" => HostPlatform::Windows,
            "macos" => HostPlatform::MacOs,
            "linux" => HostPlatform::Linux,
            _ => HostPlatform::Other,
        }
    }

    /// Unknown platforms get the packaged default name rather than an error.
    pub fn executable_name(&self) -> &'static str {
        match self {
            HostPlatform::Windows => BACKEND_BINARY_NAME_WINDOWS,
            HostPlatform::MacOs | HostPlatform::Linux | HostPlatform::Other => BACKEND_BINARY_NAME,
        }
    }
}

/// Directories the host application itself lives in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostLayout {
    pub source_root: PathBuf,
    pub resources_dir: PathBuf,
    pub user_data_dir: PathBuf,
}

impl HostLayout {
    pub fn detect() -> SidecarResult<Self> {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .ok_or_else(|| SidecarError::Environment("Cannot locate host executable".into()))?;

        let source_root = std::env::current_dir()
            .map_err(|e| SidecarError::Environment(format!("Cannot read current dir: {}", e)))?;

        let bundle_resources = exe_dir.join("..").join("Resources");
        let resources_dir = if cfg!(target_os = "macos") && bundle_resources.is_dir() {
            bundle_resources
        } else {
            exe_dir
        };

        let user_data_dir = dirs::data_dir()
            .map(|d| d.join(APP_NAME))
            .ok_or_else(|| SidecarError::Environment("No per-user data directory".into()))?;

        Ok(Self {
            source_root,
            resources_dir,
            user_data_dir,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchSpec {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env: HashMap<OsString, OsString>,
    pub port: u16,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
}

impl LaunchSpec {
    pub fn base_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }
}

pub struct EnvironmentResolver {
    layout: HostLayout,
    platform: HostPlatform,
    port: u16,
    executable_override: Option<PathBuf>,
    args: Vec<String>,
    data_dir_override: Option<PathBuf>,
    base_env: Option<HashMap<OsString, OsString>>,
}

impl EnvironmentResolver {
    pub fn new(layout: HostLayout) -> Self {
        Self {
            layout,
            platform: HostPlatform::current(),
            port: DEFAULT_PORT,
            executable_override: None,
            args: Vec::new(),
            data_dir_override: None,
            base_env: None,
        }
    }

    pub fn with_platform(mut self, platform: HostPlatform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_executable(mut self, path: Option<PathBuf>) -> Self {
        self.executable_override = path;
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_data_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.data_dir_override = dir;
        self
    }

    /// Replaces the inherited host environment. Used by tests.
    pub fn with_base_env(mut self, env: HashMap<OsString, OsString>) -> Self {
        self.base_env = Some(env);
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn resolve(&self, mode: LaunchMode) -> SidecarResult<LaunchSpec> {
        let executable = self.executable_path(mode);
        let working_dir = match mode {
            LaunchMode::Development => self.layout.source_root.clone(),
            LaunchMode::Packaged => self.layout.resources_dir.clone(),
        };

        let data_dir = self.data_dir(mode);
        std::fs::create_dir_all(&data_dir).map_err(|e| {
            SidecarError::Environment(format!(
                "Failed to create data directory {}: {}",
                data_dir.display(),
                e
            ))
        })?;
        debug!("Data directory ready at {:?}", data_dir);

        let database_path = data_dir.join(DATABASE_FILE_NAME);

        let mut env = match &self.base_env {
            Some(env) => env.clone(),
            None => std::env::vars_os().collect(),
        };
        env.insert(PORT_ENV_KEY.into(), self.port.to_string().into());
        env.insert(DATABASE_PATH_ENV_KEY.into(), database_path.clone().into_os_string());

        info!(
            "Resolved {} launch: {:?} (cwd {:?}, port {})",
            mode, executable, working_dir, self.port
        );

        Ok(LaunchSpec {
            executable,
            args: self.args.clone(),
            working_dir,
            env,
            port: self.port,
            data_dir,
            database_path,
        })
    }

    fn executable_path(&self, mode: LaunchMode) -> PathBuf {
        if let Some(ref path) = self.executable_override {
            return path.clone();
        }

        let name = self.platform.executable_name();
        match mode {
            LaunchMode::Development => self.layout.source_root.join(name),
            LaunchMode::Packaged => self.layout.resources_dir.join("bin").join(name),
        }
    }

    fn data_dir(&self, mode: LaunchMode) -> PathBuf {
        if let Some(ref dir) = self.data_dir_override {
            return dir.clone();
        }

        match mode {
            LaunchMode::Development => self.layout.source_root.join("data"),
            LaunchMode::Packaged => self.layout.user_data_dir.join("data"),
        }
    }
}
