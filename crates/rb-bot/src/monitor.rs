//! Polls an RDP port until it accepts connections or a deadline passes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::probe::{PortProbe, ProbeErrorKind};

/// Emitted after every failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorEvent {
    pub attempt: u32,
    pub max_attempts: u32,
    pub elapsed: Duration,
    pub remaining: Duration,
    /// `None` when the probe task itself failed.
    pub error: Option<ProbeErrorKind>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorOutcome {
    pub ready: bool,
    pub attempts: u32,
    pub elapsed: Duration,
    pub latency: Option<Duration>,
}

#[derive(Clone)]
pub struct ReadinessMonitor {
    probe: Arc<dyn PortProbe>,
    poll_interval: Duration,
    probe_timeout: Duration,
}

impl ReadinessMonitor {
    pub fn new(probe: Arc<dyn PortProbe>, poll_interval: Duration, probe_timeout: Duration) -> Self {
        Self {
            probe,
            poll_interval,
            probe_timeout,
        }
    }

    pub fn probe(&self) -> &Arc<dyn PortProbe> {
        &self.probe
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// Attempts that fit in `deadline`, never fewer than one.
    pub fn max_attempts(&self, deadline: Duration) -> u32 {
        if self.poll_interval.is_zero() {
            return 1;
        }
        let fits = deadline.as_millis() / self.poll_interval.as_millis();
        u32::try_from(fits).unwrap_or(u32::MAX).max(1)
    }

    /// Probe `host:port` until it answers or the attempts run out.
    ///
    /// Each probe runs in its own task so a panicking probe only costs one
    /// attempt. Dropping the returned future stops polling.
    pub async fn wait_until_ready(
        &self,
        host: &str,
        port: u16,
        deadline: Duration,
        progress: Option<mpsc::Sender<MonitorEvent>>,
    ) -> MonitorOutcome {
        let max_attempts = self.max_attempts(deadline);
        let started = Instant::now();

        for attempt in 1..=max_attempts {
            let probe = Arc::clone(&self.probe);
            let target = host.to_string();
            let timeout = self.probe_timeout;
            let result = tokio::spawn(async move { probe.probe(&target, port, timeout).await }).await;

            let error = match result {
                Ok(result) if result.reachable => {
                    tracing::debug!(host, port, attempt, "port is reachable");
                    return MonitorOutcome {
                        ready: true,
                        attempts: attempt,
                        elapsed: started.elapsed(),
                        latency: result.latency,
                    };
                }
                Ok(result) => result.error,
                Err(e) => {
                    tracing::warn!(host, port, attempt, error = %e, "probe task failed");
                    None
                }
            };

            let elapsed = started.elapsed();
            if let Some(tx) = &progress {
                let event = MonitorEvent {
                    attempt,
                    max_attempts,
                    elapsed,
                    remaining: deadline.saturating_sub(elapsed),
                    error,
                };
                // A gone receiver only means nobody is rendering progress.
                let _ = tx.send(event).await;
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        tracing::info!(host, port, attempts = max_attempts, "port never became reachable");
        MonitorOutcome {
            ready: false,
            attempts: max_attempts,
            elapsed: started.elapsed(),
            latency: None,
        }
    }
}
