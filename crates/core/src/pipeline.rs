use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{
    clock::Clock,
    config::{AppConfig, ConfigError},
    store::{EventStore, SessionStore},
    sweeper::{CleanupBatchSessions, SessionSweeper, SweeperMetrics},
    tracker::{FlushWorker, Tracker, TrackerMetrics},
};

/// Running tracker and sweeper loops.
pub struct PipelineHandle {
    pub tracker: Tracker,
    pub tracker_metrics: Arc<TrackerMetrics>,
    pub sweeper_metrics: Arc<SweeperMetrics>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

pub struct Pipeline;

impl Pipeline {
    /// Spawn the flush worker and the session sweeper on the current runtime.
    ///
    /// The whole config is validated first; nothing is spawned if it is rejected.
    pub fn start(
        config: &AppConfig,
        events: Arc<dyn EventStore>,
        sessions: Arc<dyn SessionStore>,
        cleanup: Arc<dyn CleanupBatchSessions>,
        clock: Arc<dyn Clock>,
    ) -> Result<PipelineHandle, ConfigError> {
        config.validate()?;
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);

        let (tracker, flush_worker) =
            Tracker::new(config.tracker.clone(), events, sessions, clock)?;
        let sweeper = SessionSweeper::new(config.sweeper.clone(), cleanup)?;

        let tracker_metrics = tracker.metrics();
        let sweeper_metrics = sweeper.metrics();

        let tasks = vec![
            (
                FlushWorker::NAME,
                tokio::spawn(flush_worker.run(shutdown_rx.resubscribe())),
            ),
            (SessionSweeper::NAME, tokio::spawn(sweeper.run(shutdown_rx))),
        ];

        info!("Pipeline started");

        Ok(PipelineHandle {
            tracker,
            tracker_metrics,
            sweeper_metrics,
            shutdown_tx,
            tasks,
        })
    }
}

impl PipelineHandle {
    /// Signal both loops and wait until they have finished their current work.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());

        for (name, handle) in self.tasks {
            if let Err(e) = handle.await {
                warn!(worker = name, error = %e, "Worker task panicked");
            }
        }

        info!("Pipeline stopped");
    }
}
