use async_trait::async_trait;
use newapi_types::{ExitInfo, SidecarResult};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Signal and await operations on a running backend process.
#[async_trait]
pub trait ChildControl: Send {
    fn pid(&self) -> Option<u32>;

    /// Graceful termination request (SIGTERM on unix).
    fn terminate(&mut self) -> SidecarResult<()>;

    /// Forced termination. Delivery is not awaited.
    fn force_kill(&mut self) -> SidecarResult<()>;

    async fn wait_exit(&mut self) -> ExitInfo;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownOutcome {
    NoChild,
    Graceful,
    Forced,
}

pub struct ShutdownCoordinator {
    grace_period: Duration,
}

impl ShutdownCoordinator {
    pub fn new(grace_period: Duration) -> Self {
        Self { grace_period }
    }

    /// Takes the child out of `slot`, asks it to exit and escalates to a
    /// forced kill once the grace period elapses. An empty slot returns
    /// immediately, so repeated calls never signal twice.
    pub async fn stop<C: ChildControl>(&self, slot: &mut Option<C>) -> ShutdownOutcome {
        let Some(mut child) = slot.take() else {
            debug!("No backend process to stop");
            return ShutdownOutcome::NoChild;
        };

        info!("Shutting down server (pid {:?})...", child.pid());
        if let Err(e) = child.terminate() {
            warn!("Failed to send termination signal: {}", e);
        }

        match tokio::time::timeout(self.grace_period, child.wait_exit()).await {
            Ok(exit) => {
                info!("Server exited with code {}", exit);
                ShutdownOutcome::Graceful
            }
            Err(_) => {
                warn!(
                    "Server did not exit within {:?}, forcing termination",
                    self.grace_period
                );
                if let Err(e) = child.force_kill() {
                    warn!("Failed to force kill server: {}", e);
                }
                ShutdownOutcome::Forced
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Signals {
        terminate: AtomicU32,
        kill: AtomicU32,
    }

    struct MockChild {
        signals: Arc<Signals>,
        exits_after: Option<Duration>,
    }

    #[async_trait]
    impl ChildControl for MockChild {
        fn pid(&self) -> Option<u32> {
            Some(4242)
        }

        fn terminate(&mut self) -> SidecarResult<()> {
            self.signals.terminate.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn force_kill(&mut self) -> SidecarResult<()> {
            self.signals.kill.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn wait_exit(&mut self) -> ExitInfo {
            match self.exits_after {
                Some(delay) => {
                    tokio::time::sleep(delay).await;
                    ExitInfo::new(Some(0))
                }
                None => std::future::pending().await,
            }
        }
    }

    fn mock(exits_after: Option<Duration>) -> (Arc<Signals>, Option<MockChild>) {
        let signals = Arc::new(Signals::default());
        let child = MockChild {
            signals: signals.clone(),
            exits_after,
        };
        (signals, Some(child))
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_exit_skips_force_kill() {
        let (signals, mut slot) = mock(Some(Duration::from_millis(200)));
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(5000));

        let started = tokio::time::Instant::now();
        let outcome = coordinator.stop(&mut slot).await;

        assert_eq!(outcome, ShutdownOutcome::Graceful);
        assert_eq!(signals.terminate.load(Ordering::SeqCst), 1);
        assert_eq!(signals.kill.load(Ordering::SeqCst), 0);
        assert!(started.elapsed() < Duration::from_millis(5000));
        assert!(slot.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_escalates_once_after_grace_period() {
        let (signals, mut slot) = mock(None);
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(5000));

        let started = tokio::time::Instant::now();
        let outcome = coordinator.stop(&mut slot).await;

        assert_eq!(outcome, ShutdownOutcome::Forced);
        assert_eq!(signals.terminate.load(Ordering::SeqCst), 1);
        assert_eq!(signals.kill.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::from_millis(5000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_stop_is_noop() {
        let (signals, mut slot) = mock(Some(Duration::from_millis(10)));
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(5000));

        assert_eq!(coordinator.stop(&mut slot).await, ShutdownOutcome::Graceful);
        assert_eq!(coordinator.stop(&mut slot).await, ShutdownOutcome::NoChild);

        assert_eq!(signals.terminate.load(Ordering::SeqCst), 1);
        assert_eq!(signals.kill.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_child_completes_immediately() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(5000));
        let mut slot: Option<MockChild> = None;
        assert_eq!(coordinator.stop(&mut slot).await, ShutdownOutcome::NoChild);
    }
}
