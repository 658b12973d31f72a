use newapi_sidecar::{HostInfo, Notifier, Supervisor, SupervisorEvent};
use newapi_types::SidecarResult;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::cli::BUILD_VERSION;
use crate::config::DesktopConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitReason {
    Signal,
    StartupFailed,
    BackendCrashed,
    BackendExited,
}

impl ExitReason {
    pub fn is_failure(&self) -> bool {
        matches!(self, ExitReason::StartupFailed | ExitReason::BackendCrashed)
    }
}

/// Everything the host needs for one run, built once at startup.
pub struct AppContext {
    config: DesktopConfig,
    supervisor: Supervisor,
}

impl AppContext {
    pub fn new(config: DesktopConfig, notifier: Arc<dyn Notifier>) -> SidecarResult<Self> {
        let supervisor = Supervisor::builder()
            .config(config.supervisor.clone())
            .notifier(notifier)
            .host_info(HostInfo::current(BUILD_VERSION))
            .build()?;

        Ok(Self { config, supervisor })
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub async fn run(&self) -> ExitReason {
        self.run_until(wait_for_shutdown()).await
    }

    /// Starts the server and keeps it alive until `shutdown` resolves or the
    /// server goes away. The server is always stopped before returning.
    pub async fn run_until<F>(&self, shutdown: F) -> ExitReason
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut events = self.supervisor.subscribe();

        info!(
            "Starting {} server ({} mode, port {})",
            newapi_types::APP_NAME,
            self.config.supervisor.mode,
            self.config.supervisor.port
        );

        let started = tokio::select! {
            result = self.supervisor.start() => Some(result),
            _ = &mut shutdown => None,
        };

        let reason = match started {
            None => {
                info!("Shutdown requested during startup");
                ExitReason::Signal
            }
            Some(Err(e)) => {
                error!("Startup failed: {}", e);
                ExitReason::StartupFailed
            }
            Some(Ok(url)) => {
                print_ready_message(&url);
                tokio::select! {
                    _ = &mut shutdown => ExitReason::Signal,
                    reason = wait_for_exit_event(&mut events) => reason,
                }
            }
        };

        info!("Shutting down...");
        let outcome = self.supervisor.shutdown().await;
        debug!("Server stop outcome: {:?}", outcome);
        info!("Shutdown complete");
        reason
    }
}

async fn wait_for_exit_event(events: &mut broadcast::Receiver<SupervisorEvent>) -> ExitReason {
    loop {
        match events.recv().await {
            Ok(SupervisorEvent::Crashed { .. }) => return ExitReason::BackendCrashed,
            Ok(SupervisorEvent::NormalExit { .. }) => {
                info!("Server exited, closing");
                return ExitReason::BackendExited;
            }
            Ok(event) => debug!("Supervisor event: {:?}", event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Missed {} supervisor events", n);
            }
            Err(broadcast::error::RecvError::Closed) => return ExitReason::BackendExited,
        }
    }
}

fn print_ready_message(url: &str) {
    println!();
    println!("\x1b[38;5;46m{} is running\x1b[0m", newapi_types::APP_NAME);
    println!("  Open: \x1b[38;5;51m{}\x1b[0m", url);
    println!("  \x1b[38;5;245mPress Ctrl+C to stop\x1b[0m");
    println!();
}

pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let handlers = (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
            signal(SignalKind::hangup()),
        );

        if let (Ok(mut sigterm), Ok(mut sigint), Ok(mut sighup)) = handlers {
            tokio::select! {
                _ = sigterm.recv() => { info!("Received SIGTERM"); }
                _ = sigint.recv() => { info!("Received SIGINT"); }
                _ = sighup.recv() => { info!("Received SIGHUP"); }
            }
            return;
        }
        warn!("Failed to install signal handlers, falling back to Ctrl+C");
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C"),
        Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
    }
}
