use chrono::Local;
use newapi_types::{
    Diagnosis, ExitInfo, SidecarError, SidecarResult, SupervisorState, UserChoice,
};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::events::SupervisorEvent;
use crate::child::{spawn_backend, ChildHandle};
use crate::classifier::ErrorClassifier;
use crate::config::SupervisorConfig;
use crate::env::{EnvironmentResolver, HostLayout};
use crate::export::{build_export, HostInfo, LogExport};
use crate::logs::{shared_buffer, SharedLogBuffer};
use crate::notify::Notifier;
use crate::readiness::{Probe, ReadinessOutcome, ReadinessProber};
use crate::shutdown::{ChildControl, ShutdownCoordinator, ShutdownOutcome};

const EVENT_CHANNEL_CAPACITY: usize = 16;

enum StartPhase {
    Probed(ReadinessOutcome),
    Exited(ExitInfo),
}

enum ExitKind {
    Crash,
    Normal,
    DuringStartup,
    Ignored,
}

struct Inner {
    config: SupervisorConfig,
    resolver: EnvironmentResolver,
    prober: ReadinessProber,
    classifier: ErrorClassifier,
    coordinator: ShutdownCoordinator,
    notifier: Arc<dyn Notifier>,
    host: HostInfo,
    state: RwLock<SupervisorState>,
    logs: RwLock<SharedLogBuffer>,
    child: Mutex<Option<ChildHandle>>,
    instance: AtomicU64,
    events: broadcast::Sender<SupervisorEvent>,
}

/// Owns the single backend process: launch, readiness, crash reporting and
/// shutdown. Cloning yields another handle to the same supervisor.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    pub fn builder() -> SupervisorBuilder {
        SupervisorBuilder::new()
    }

    pub fn state(&self) -> SupervisorState {
        *self.inner.state.read()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.inner.events.subscribe()
    }

    pub fn base_url(&self) -> String {
        format!("http://localhost:{}", self.inner.resolver.port())
    }

    pub fn pid(&self) -> Option<u32> {
        self.inner.child.lock().as_ref().and_then(|child| child.pid())
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    /// Stderr lines of the current instance, oldest first.
    pub fn log_snapshot(&self) -> Vec<String> {
        self.inner.current_logs().lock().snapshot()
    }

    pub fn export_logs(&self) -> LogExport {
        self.inner.export_logs()
    }

    /// Launches the backend and resolves once it answers on its port.
    ///
    /// Failures are reported through the notifier before they are returned,
    /// unless a shutdown is already under way.
    pub async fn start(&self) -> SidecarResult<String> {
        let instance = {
            let mut state = self.inner.state.write();
            if !state.can_start() || self.inner.child.lock().is_some() {
                return Err(SidecarError::AlreadyRunning(*state));
            }
            *state = SupervisorState::Starting;
            self.inner.instance.fetch_add(1, Ordering::SeqCst) + 1
        };

        let buffer = shared_buffer(self.inner.config.log_capacity);
        *self.inner.logs.write() = buffer.clone();

        let spec = match self.inner.resolver.resolve(self.inner.config.mode) {
            Ok(spec) => spec,
            Err(e) => {
                let diagnosis = self.inner.classifier.classify(&[e.to_string()]);
                return Err(self.inner.fail_startup(e, diagnosis).await);
            }
        };

        let handle = match spawn_backend(&spec, buffer) {
            Ok(handle) => handle,
            Err(e) => {
                let diagnosis = self.inner.classifier.classify(&[e.to_string()]);
                return Err(self.inner.fail_startup(e, diagnosis).await);
            }
        };

        let mut exit = handle.exit_watcher();
        let mut monitor_exit = handle.exit_watcher();
        *self.inner.child.lock() = Some(handle);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let info = monitor_exit.wait().await;
            inner.on_exit(instance, info).await;
        });

        let base_url = spec.base_url();
        info!(
            "Waiting for server at {} (up to {} attempts)",
            base_url,
            self.inner.prober.max_attempts()
        );

        let phase = tokio::select! {
            outcome = self.inner.prober.wait_until_ready(&base_url) => StartPhase::Probed(outcome),
            info = exit.wait() => StartPhase::Exited(info),
        };

        match phase {
            StartPhase::Probed(ReadinessOutcome::Ready { .. }) => {
                let promoted = {
                    let mut state = self.inner.state.write();
                    if *state == SupervisorState::Starting {
                        *state = SupervisorState::Ready;
                        true
                    } else {
                        false
                    }
                };

                if promoted {
                    info!("Server is ready at {}", base_url);
                    self.inner.emit(SupervisorEvent::Ready {
                        base_url: base_url.clone(),
                    });
                    return Ok(base_url);
                }

                let exit_code = exit.exited().and_then(|info| info.code);
                let diagnosis = self.inner.classify_current();
                Err(self
                    .inner
                    .fail_startup(SidecarError::ExitedDuringStartup { exit_code }, diagnosis)
                    .await)
            }
            StartPhase::Probed(ReadinessOutcome::TimedOut { attempts }) => {
                if self.inner.config.kill_on_readiness_timeout {
                    let mut slot = self.inner.child.lock().take();
                    self.inner.coordinator.stop(&mut slot).await;
                } else {
                    warn!("Leaving unresponsive server running after readiness timeout");
                }

                let diagnosis = self.inner.classify_current();
                Err(self
                    .inner
                    .fail_startup(SidecarError::ReadinessTimeout { attempts }, diagnosis)
                    .await)
            }
            StartPhase::Exited(info) => {
                let diagnosis = self.inner.classify_current();
                Err(self
                    .inner
                    .fail_startup(
                        SidecarError::ExitedDuringStartup {
                            exit_code: info.code,
                        },
                        diagnosis,
                    )
                    .await)
            }
        }
    }

    /// Stops the backend, waiting at most the grace period before forcing it.
    /// Safe to call any number of times.
    pub async fn shutdown(&self) -> ShutdownOutcome {
        let (previous, mut slot) = {
            let mut state = self.inner.state.write();
            let previous = *state;
            *state = SupervisorState::ShuttingDown;
            (previous, self.inner.child.lock().take())
        };

        if previous == SupervisorState::ShuttingDown {
            debug!("Shutdown already in progress");
            return ShutdownOutcome::NoChild;
        }

        let outcome = self.inner.coordinator.stop(&mut slot).await;
        *self.inner.state.write() = SupervisorState::Stopped;

        if previous != SupervisorState::Stopped {
            self.inner.emit(SupervisorEvent::Stopped);
        }
        outcome
    }
}

impl Inner {
    fn emit(&self, event: SupervisorEvent) {
        if self.events.send(event).is_err() {
            debug!("No subscribers for supervisor event");
        }
    }

    fn current_logs(&self) -> SharedLogBuffer {
        self.logs.read().clone()
    }

    fn classify_current(&self) -> Option<Diagnosis> {
        let entries = self.current_logs().lock().snapshot();
        self.classifier.classify(&entries)
    }

    fn export_logs(&self) -> LogExport {
        let entries = self.current_logs().lock().snapshot();
        build_export(&self.host, &entries, Local::now())
    }

    async fn deliver_export(&self) {
        let export = self.export_logs();
        info!("Exporting crash log as {}", export.file_name);
        self.notifier.deliver_log_export(export).await;
    }

    async fn fail_startup(&self, err: SidecarError, diagnosis: Option<Diagnosis>) -> SidecarError {
        let interrupted = {
            let mut state = self.state.write();
            match *state {
                SupervisorState::ShuttingDown | SupervisorState::Stopped => true,
                _ => {
                    *state = SupervisorState::Crashed;
                    false
                }
            }
        };

        if interrupted {
            debug!("Startup interrupted by shutdown: {}", err);
            return err;
        }

        error!("Server failed to start: {}", err);
        if let Some(ref diagnosis) = diagnosis {
            error!("Diagnosis: {} ({})", diagnosis.title, diagnosis.category);
        }

        let message = err.to_string();
        let choice = self
            .notifier
            .notify_startup_failure(&message, diagnosis.as_ref())
            .await;
        if choice == UserChoice::ViewFullLog {
            self.deliver_export().await;
        }

        self.emit(SupervisorEvent::StartupFailed { message, diagnosis });
        err
    }

    async fn on_exit(&self, instance: u64, exit: ExitInfo) {
        let kind = {
            let mut state = self.state.write();
            if self.instance.load(Ordering::SeqCst) != instance {
                debug!("Ignoring exit of stale backend instance {}", instance);
                return;
            }
            self.child.lock().take();

            match *state {
                SupervisorState::Ready if exit.is_abnormal() => {
                    *state = SupervisorState::Crashed;
                    ExitKind::Crash
                }
                SupervisorState::Ready => {
                    *state = SupervisorState::Stopped;
                    ExitKind::Normal
                }
                SupervisorState::Starting => {
                    *state = SupervisorState::Crashed;
                    ExitKind::DuringStartup
                }
                _ => ExitKind::Ignored,
            }
        };

        match kind {
            ExitKind::Crash => self.report_crash(exit).await,
            ExitKind::Normal => {
                info!("Server stopped on its own (code {})", exit);
                self.emit(SupervisorEvent::NormalExit {
                    exit_code: exit.code,
                });
            }
            ExitKind::DuringStartup => {
                debug!("Server exited with code {} before becoming ready", exit);
            }
            ExitKind::Ignored => {}
        }
    }

    async fn report_crash(&self, exit: ExitInfo) {
        let entries = self.current_logs().lock().snapshot();
        let skip = entries.len().saturating_sub(self.config.crash_tail_lines);
        let recent = entries[skip..].to_vec();
        let diagnosis = self.classifier.classify(&entries);

        match diagnosis {
            Some(ref d) => error!("Server crashed with code {}: {}", exit, d.title),
            None => error!("Server crashed with code {}", exit),
        }

        let choice = self
            .notifier
            .notify_crash(exit.code, diagnosis.as_ref(), &recent)
            .await;
        if choice == UserChoice::ViewFullLog {
            self.deliver_export().await;
        }

        self.emit(SupervisorEvent::Crashed {
            exit_code: exit.code,
            diagnosis,
        });
    }
}

pub struct SupervisorBuilder {
    config: SupervisorConfig,
    layout: Option<HostLayout>,
    notifier: Option<Arc<dyn Notifier>>,
    host: Option<HostInfo>,
    probe: Option<Arc<dyn Probe>>,
}

impl SupervisorBuilder {
    pub fn new() -> Self {
        Self {
            config: SupervisorConfig::default(),
            layout: None,
            notifier: None,
            host: None,
            probe: None,
        }
    }

    pub fn config(mut self, config: SupervisorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn layout(mut self, layout: HostLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn host_info(mut self, host: HostInfo) -> Self {
        self.host = Some(host);
        self
    }

    /// Replaces the HTTP reachability check.
    pub fn probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn build(self) -> SidecarResult<Supervisor> {
        self.config.validate()?;

        let notifier = self
            .notifier
            .ok_or_else(|| SidecarError::Config("A notifier is required".into()))?;

        let layout = match self.layout {
            Some(layout) => layout,
            None => HostLayout::detect()?,
        };

        let config = self.config;
        let resolver = EnvironmentResolver::new(layout)
            .with_port(config.port)
            .with_executable(config.executable.clone())
            .with_args(config.args.clone())
            .with_data_dir(config.data_dir.clone());

        let prober = match self.probe {
            Some(probe) => ReadinessProber::new(
                probe,
                config.readiness.max_attempts,
                Duration::from_millis(config.readiness.interval_ms),
            ),
            None => ReadinessProber::http(&config.readiness)?,
        };

        let mut classifier = ErrorClassifier::new(config.port).with_locale(config.locale);
        for signature in &config.signatures {
            classifier.push_rule(signature.to_rule());
        }
        debug!("Classifier loaded {} signature rules", classifier.rules().len());
        let coordinator = ShutdownCoordinator::new(config.shutdown.grace_period());
        let host = self
            .host
            .unwrap_or_else(|| HostInfo::current(env!("CARGO_PKG_VERSION")));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let logs = shared_buffer(config.log_capacity);

        Ok(Supervisor {
            inner: Arc::new(Inner {
                config,
                resolver,
                prober,
                classifier,
                coordinator,
                notifier,
                host,
                state: RwLock::new(SupervisorState::NotStarted),
                logs: RwLock::new(logs),
                child: Mutex::new(None),
                instance: AtomicU64::new(0),
                events,
            }),
        })
    }
}

impl Default for SupervisorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
