use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Notify, RwLock};
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::connection::ConnectionManager;

const WINDOW_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Unknown,
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone)]
struct Sample {
    ok: bool,
    latency_ms: u64,
}

#[derive(Debug, Clone, Default)]
pub struct HealthMetrics {
    pub state: Option<HealthState>,
    pub consecutive_failures: u32,
    pub last_check_at: Option<Instant>,
    pub window_success_rate: f64,
    pub p95_latency_ms: u64,
}

/// Periodically probes the connection pool and tracks a rolling window of
/// recent outcomes, exposing a debounced [`HealthState`] so a single blip
/// doesn't flap dependents between healthy and unhealthy.
pub struct HealthMonitor {
    manager: ConnectionManager,
    interval: Duration,
    timeout: Duration,
    window: Mutex<VecDeque<Sample>>,
    metrics: RwLock<HealthMetrics>,
    notify: Notify,
}

impl HealthMonitor {
    pub fn new(manager: ConnectionManager, interval: Duration, timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            manager,
            interval,
            timeout,
            window: Mutex::new(VecDeque::with_capacity(WINDOW_SIZE)),
            metrics: RwLock::new(HealthMetrics::default()),
            notify: Notify::new(),
        })
    }

    /// Runs the probe loop until cancelled. Intended to be spawned once at
    /// startup alongside the rest of the service's background tasks.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = interval(self.interval);
        loop {
            ticker.tick().await;
            self.force_check().await;
        }
    }

    /// Runs one probe immediately, outside the regular cadence. Used by
    /// readiness endpoints and tests that can't wait for the next tick.
    pub async fn force_check(&self) -> HealthState {
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.manager.check_connection()).await;
        let (ok, latency_ms) = match outcome {
            Ok(Ok(())) => (true, started.elapsed().as_millis() as u64),
            Ok(Err(e)) => {
                warn!(error = %e, "health probe failed");
                (false, started.elapsed().as_millis() as u64)
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "health probe timed out");
                (false, self.timeout.as_millis() as u64)
            }
        };

        let mut window = self.window.lock().await;
        window.push_back(Sample { ok, latency_ms });
        while window.len() > WINDOW_SIZE {
            window.pop_front();
        }

        let total = window.len() as f64;
        let successes = window.iter().filter(|s| s.ok).count() as f64;
        let success_rate = if total > 0.0 { successes / total } else { 1.0 };

        let mut latencies: Vec<u64> = window.iter().map(|s| s.latency_ms).collect();
        latencies.sort_unstable();
        let p95 = percentile(&latencies, 0.95);

        let consecutive_failures = window
            .iter()
            .rev()
            .take_while(|s| !s.ok)
            .count() as u32;
        drop(window);

        let state = if consecutive_failures >= 3 {
            HealthState::Unhealthy
        } else if success_rate < 0.9 {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };

        {
            let mut metrics = self.metrics.write().await;
            let previous = metrics.state;
            metrics.state = Some(state);
            metrics.consecutive_failures = consecutive_failures;
            metrics.last_check_at = Some(started);
            metrics.window_success_rate = success_rate;
            metrics.p95_latency_ms = p95;

            if previous != Some(state) {
                match state {
                    HealthState::Healthy => info!(success_rate, "database health recovered"),
                    HealthState::Degraded => warn!(success_rate, "database health degraded"),
                    HealthState::Unhealthy => error!(consecutive_failures, "database unhealthy"),
                    HealthState::Unknown => {}
                }
                self.notify.notify_waiters();
            }
        }

        state
    }

    pub async fn metrics(&self) -> HealthMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn state(&self) -> HealthState {
        self.metrics.read().await.state.unwrap_or(HealthState::Unknown)
    }

    /// Blocks until the monitor observes `Healthy`, or the timeout elapses.
    pub async fn wait_for_healthy(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.state().await == HealthState::Healthy {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let _ = tokio::time::timeout(remaining, self.notify.notified()).await;
        }
    }

    pub async fn reset_metrics(&self) {
        self.window.lock().await.clear();
        *self.metrics.write().await = HealthMetrics::default();
    }
}

fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_of_empty_is_zero() {
        assert_eq!(percentile(&[], 0.95), 0);
    }

    #[test]
    fn percentile_picks_high_end_of_window() {
        let values: Vec<u64> = (1..=100).collect();
        assert_eq!(percentile(&values, 0.95), 96);
    }
}
