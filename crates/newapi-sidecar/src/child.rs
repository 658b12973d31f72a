use async_trait::async_trait;
use newapi_types::{ExitInfo, SidecarError, SidecarResult};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::env::LaunchSpec;
use crate::logs::{CrashLogCollector, SharedLogBuffer};
use crate::shutdown::ChildControl;

/// How long to wait for stderr to reach EOF after the process exits, so the
/// ring buffer is complete before anyone classifies it.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Clone)]
pub struct ExitWatcher {
    receiver: watch::Receiver<Option<ExitInfo>>,
}

impl ExitWatcher {
    pub fn exited(&self) -> Option<ExitInfo> {
        *self.receiver.borrow()
    }

    pub async fn wait(&mut self) -> ExitInfo {
        loop {
            let current = *self.receiver.borrow();
            if let Some(exit) = current {
                return exit;
            }
            if self.receiver.changed().await.is_err() {
                let last = *self.receiver.borrow();
                return last.unwrap_or(ExitInfo::new(None));
            }
        }
    }
}

/// Signals are delivered by the task that reaps the child, so none can reach
/// a pid after it has been reaped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StopSignal {
    Terminate,
    Kill,
}

/// Handle to the single supervised backend process.
pub struct ChildHandle {
    pid: Option<u32>,
    exit: ExitWatcher,
    signal_tx: mpsc::UnboundedSender<StopSignal>,
}

impl ChildHandle {
    pub fn exit_watcher(&self) -> ExitWatcher {
        self.exit.clone()
    }

    pub fn has_exited(&self) -> bool {
        self.exit.exited().is_some()
    }

    fn send(&self, signal: StopSignal) -> SidecarResult<()> {
        if self.has_exited() {
            return Ok(());
        }
        // A closed channel means the monitor already reaped the process.
        if self.signal_tx.send(signal).is_err() {
            debug!("Backend already reaped, dropping {:?}", signal);
        }
        Ok(())
    }
}

#[async_trait]
impl ChildControl for ChildHandle {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn terminate(&mut self) -> SidecarResult<()> {
        self.send(StopSignal::Terminate)
    }

    fn force_kill(&mut self) -> SidecarResult<()> {
        self.send(StopSignal::Kill)
    }

    async fn wait_exit(&mut self) -> ExitInfo {
        self.exit.wait().await
    }
}

fn deliver(child: &mut Child, signal: StopSignal) {
    let result = match signal {
        #[cfg(unix)]
        StopSignal::Terminate => send_sigterm(child.id()),
        #[cfg(not(unix))]
        StopSignal::Terminate => start_kill(child),
        StopSignal::Kill => start_kill(child),
    };
    if let Err(e) = result {
        warn!("Failed to signal backend: {}", e);
    }
}

fn start_kill(child: &mut Child) -> SidecarResult<()> {
    child
        .start_kill()
        .map_err(|e| SidecarError::Signal(format!("Kill failed: {}", e)))
}

#[cfg(unix)]
fn send_sigterm(pid: Option<u32>) -> SidecarResult<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let pid = pid.ok_or_else(|| SidecarError::Signal("Process id unavailable".into()))?;
    let raw =
        i32::try_from(pid).map_err(|_| SidecarError::Signal(format!("Invalid pid {}", pid)))?;
    kill(Pid::from_raw(raw), Signal::SIGTERM)
        .map_err(|e| SidecarError::Signal(format!("SIGTERM to {} failed: {}", pid, e)))?;
    debug!("Sent SIGTERM to backend {}", pid);
    Ok(())
}

/// Launches the backend described by `spec`. The stderr collector is attached
/// before this returns, so no early output is lost.
pub fn spawn_backend(spec: &LaunchSpec, buffer: SharedLogBuffer) -> SidecarResult<ChildHandle> {
    let mut child = Command::new(&spec.executable)
        .args(&spec.args)
        .current_dir(&spec.working_dir)
        .env_clear()
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            SidecarError::Spawn(format!("{}: {}", spec.executable.display(), e))
        })?;

    let pid = child.id();
    info!("Started server from {:?} (pid {:?})", spec.executable, pid);

    let collector = child
        .stderr
        .take()
        .map(|stderr| CrashLogCollector::attach(stderr, buffer));
    if let Some(stdout) = child.stdout.take() {
        CrashLogCollector::mirror_stdout(stdout);
    }

    let (exit_tx, exit_rx) = watch::channel(None);
    let (signal_tx, signal_rx) = mpsc::unbounded_channel();

    tokio::spawn(monitor(child, signal_rx, collector, exit_tx));

    Ok(ChildHandle {
        pid,
        exit: ExitWatcher { receiver: exit_rx },
        signal_tx,
    })
}

async fn monitor(
    mut child: Child,
    mut signal_rx: mpsc::UnboundedReceiver<StopSignal>,
    collector: Option<JoinHandle<()>>,
    exit_tx: watch::Sender<Option<ExitInfo>>,
) {
    let status = loop {
        tokio::select! {
            biased;
            status = child.wait() => break status,
            Some(signal) = signal_rx.recv() => deliver(&mut child, signal),
        }
    };
    drop(signal_rx);

    let exit = match status {
        Ok(status) => ExitInfo::new(status.code()),
        Err(e) => {
            error!("Failed to wait for backend: {}", e);
            ExitInfo::new(None)
        }
    };
    info!("Server process exited with code {}", exit);

    if let Some(collector) = collector {
        if tokio::time::timeout(STDERR_DRAIN_TIMEOUT, collector).await.is_err() {
            debug!("Backend stderr still open after exit");
        }
    }

    let _ = exit_tx.send(Some(exit));
}
