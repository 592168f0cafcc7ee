//! Periodic reclamation of idle guest sessions.
//!
//! Each tick launches a cleanup pass as its own task so a slow backend does
//! not hold up the ticker. At most one pass runs at a time; ticks that land
//! while a pass is still running are skipped.

pub mod cleanup;

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, SweeperConfig};

pub use cleanup::{CleanupBatchSessions, StaleSessionCleanup};

#[derive(Debug, Default)]
pub struct SweeperMetrics {
    pub passes_started_total: AtomicU64,
    pub passes_skipped_total: AtomicU64,
    pub passes_failed_total: AtomicU64,
    pub sessions_closed_total: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweeperSnapshot {
    pub passes_started: u64,
    pub passes_skipped: u64,
    pub passes_failed: u64,
    pub sessions_closed: u64,
}

impl SweeperMetrics {
    pub fn snapshot(&self) -> SweeperSnapshot {
        SweeperSnapshot {
            passes_started: self.passes_started_total.load(Ordering::Relaxed),
            passes_skipped: self.passes_skipped_total.load(Ordering::Relaxed),
            passes_failed: self.passes_failed_total.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed_total.load(Ordering::Relaxed),
        }
    }
}

/// Holds the "pass running" flag for as long as it lives.
struct PassGuard {
    running: Arc<AtomicBool>,
}

impl PassGuard {
    fn try_acquire(running: &Arc<AtomicBool>) -> Option<Self> {
        running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                running: Arc::clone(running),
            })
    }
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

pub struct SessionSweeper {
    config: SweeperConfig,
    cleanup: Arc<dyn CleanupBatchSessions>,
    running: Arc<AtomicBool>,
    metrics: Arc<SweeperMetrics>,
}

impl SessionSweeper {
    pub const NAME: &'static str = "sessions.sweeper";

    pub fn new(
        config: SweeperConfig,
        cleanup: Arc<dyn CleanupBatchSessions>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            config,
            cleanup,
            running: Arc::new(AtomicBool::new(false)),
            metrics: Arc::new(SweeperMetrics::default()),
        })
    }

    pub fn metrics(&self) -> Arc<SweeperMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Tick until shutdown, then wait for the pass in flight, if any.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let period = self.config.interval();
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut in_flight: Option<JoinHandle<()>> = None;

        info!(
            worker = Self::NAME,
            interval_secs = self.config.interval_secs,
            fetch_limit = self.config.fetch_limit,
            "Session sweeper started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    if let Some(handle) = self.launch_pass() {
                        in_flight = Some(handle);
                    }
                }
            }
        }

        if let Some(handle) = in_flight {
            if let Err(e) = handle.await {
                warn!(error = %e, "Sweep pass panicked");
            }
        }

        info!(worker = Self::NAME, "Session sweeper stopped");
    }

    fn launch_pass(&self) -> Option<JoinHandle<()>> {
        let Some(guard) = PassGuard::try_acquire(&self.running) else {
            self.metrics
                .passes_skipped_total
                .fetch_add(1, Ordering::Relaxed);
            debug!("Previous sweep pass still running, skipping tick");
            return None;
        };

        self.metrics
            .passes_started_total
            .fetch_add(1, Ordering::Relaxed);

        let cleanup = Arc::clone(&self.cleanup);
        let metrics = Arc::clone(&self.metrics);
        let limit = self.config.fetch_limit;

        Some(tokio::spawn(async move {
            let _guard = guard;
            match cleanup.cleanup_batch_sessions(limit).await {
                Ok(closed) => {
                    metrics
                        .sessions_closed_total
                        .fetch_add(closed as u64, Ordering::Relaxed);
                    if closed > 0 {
                        info!(closed, "Closed stale sessions");
                    }
                }
                Err(e) => {
                    metrics.passes_failed_total.fetch_add(1, Ordering::Relaxed);
                    error!(error = %e, "Failed to close stale sessions");
                }
            }
        }))
    }
}
