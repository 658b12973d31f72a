#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod child;
pub mod classifier;
pub mod config;
pub mod env;
pub mod export;
pub mod logs;
pub mod notify;
pub mod readiness;
pub mod shutdown;
pub mod supervisor;

pub use child::{spawn_backend, ChildHandle, ExitWatcher};
pub use classifier::{default_rules, ErrorClassifier, Locale, Pattern, SignatureRule};
pub use config::{ReadinessConfig, ShutdownConfig, SignatureConfig, SupervisorConfig};
pub use env::{EnvironmentResolver, HostLayout, HostPlatform, LaunchMode, LaunchSpec, MODE_ENV_KEY};
pub use export::{build_export, HostInfo, LogExport};
pub use logs::{shared_buffer, CrashLogCollector, LogRingBuffer, SharedLogBuffer};
pub use notify::Notifier;
pub use readiness::{HttpProbe, Probe, ReadinessOutcome, ReadinessProber};
pub use shutdown::{ChildControl, ShutdownCoordinator, ShutdownOutcome};
pub use supervisor::{Supervisor, SupervisorBuilder, SupervisorEvent};

pub use newapi_types::{
    Diagnosis, ErrorCategory, ExitInfo, SidecarError, SidecarResult, SupervisorState, UserChoice,
};
