use async_trait::async_trait;
use newapi_types::{SidecarError, SidecarResult};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ReadinessConfig;

/// A single reachability check against the backend.
#[async_trait]
pub trait Probe: Send + Sync {
    /// `Ok` when anything answered, whatever the status code.
    async fn probe(&self, url: &str) -> Result<(), String>;
}

pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new(request_timeout: Duration) -> SidecarResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .no_proxy()
            .build()
            .map_err(|e| SidecarError::Internal(format!("Failed to build probe client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, url: &str) -> Result<(), String> {
        let response = self.client.get(url).send().await.map_err(|e| e.to_string())?;
        debug!("Probe {} answered with {}", url, response.status());
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadinessOutcome {
    Ready { attempts: u32 },
    TimedOut { attempts: u32 },
}

impl ReadinessOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, ReadinessOutcome::Ready { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            ReadinessOutcome::Ready { attempts } | ReadinessOutcome::TimedOut { attempts } => {
                *attempts
            }
        }
    }
}

pub struct ReadinessProber {
    probe: Arc<dyn Probe>,
    max_attempts: u32,
    interval: Duration,
}

impl ReadinessProber {
    pub fn new(probe: Arc<dyn Probe>, max_attempts: u32, interval: Duration) -> Self {
        Self {
            probe,
            max_attempts,
            interval,
        }
    }

    pub fn http(config: &ReadinessConfig) -> SidecarResult<Self> {
        let probe = HttpProbe::new(Duration::from_millis(config.request_timeout_ms))?;
        Ok(Self::new(
            Arc::new(probe),
            config.max_attempts,
            Duration::from_millis(config.interval_ms),
        ))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Polls `base_url` until something answers or the attempt budget runs out.
    /// Every failed attempt is followed by one interval of sleep.
    pub async fn wait_until_ready(&self, base_url: &str) -> ReadinessOutcome {
        let mut attempts = 0;

        while attempts < self.max_attempts {
            attempts += 1;
            match self.probe.probe(base_url).await {
                Ok(()) => {
                    info!("Server is ready after {} attempt(s)", attempts);
                    return ReadinessOutcome::Ready { attempts };
                }
                Err(e) => {
                    debug!(
                        "Readiness attempt {}/{} failed: {}",
                        attempts, self.max_attempts, e
                    );
                    tokio::time::sleep(self.interval).await;
                }
            }
        }

        warn!(
            "Server did not become reachable at {} after {} attempts",
            base_url, attempts
        );
        ReadinessOutcome::TimedOut { attempts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyProbe {
        calls: AtomicU32,
        succeed_on: Option<u32>,
    }

    impl FlakyProbe {
        fn new(succeed_on: Option<u32>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                succeed_on,
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Probe for FlakyProbe {
        async fn probe(&self, _url: &str) -> Result<(), String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            match self.succeed_on {
                Some(target) if n >= target => Ok(()),
                _ => Err("connection refused".into()),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_after_fifth_attempt() {
        let probe = FlakyProbe::new(Some(5));
        let prober = ReadinessProber::new(probe.clone(), 30, Duration::from_millis(1000));

        let started = tokio::time::Instant::now();
        let outcome = prober.wait_until_ready("http://localhost:3000").await;

        assert_eq!(outcome, ReadinessOutcome::Ready { attempts: 5 });
        assert_eq!(probe.calls(), 5);
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_after_exact_budget() {
        let probe = FlakyProbe::new(None);
        let prober = ReadinessProber::new(probe.clone(), 30, Duration::from_millis(1000));

        let outcome = prober.wait_until_ready("http://localhost:3000").await;

        assert_eq!(outcome, ReadinessOutcome::TimedOut { attempts: 30 });
        assert!(!outcome.is_ready());
        assert_eq!(probe.calls(), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_budget_times_out_immediately() {
        let probe = FlakyProbe::new(Some(1));
        let prober = ReadinessProber::new(probe.clone(), 0, Duration::from_millis(1000));

        let outcome = prober.wait_until_ready("http://localhost:3000").await;

        assert_eq!(outcome, ReadinessOutcome::TimedOut { attempts: 0 });
        assert_eq!(probe.calls(), 0);
    }

    #[tokio::test]
    async fn test_http_probe_accepts_any_status() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                    .await;
            }
        });

        let probe = HttpProbe::new(Duration::from_secs(2)).unwrap();
        assert!(probe.probe(&format!("http://{}/", addr)).await.is_ok());
    }

    #[tokio::test]
    async fn test_http_probe_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = HttpProbe::new(Duration::from_secs(2)).unwrap();
        assert!(probe.probe(&format!("http://{}/", addr)).await.is_err());
    }
}
