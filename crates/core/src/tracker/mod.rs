//! Non-blocking event intake with batched persistence.
//!
//! Producers push into a bounded queue through [`Tracker::track_event`]; a
//! single [`FlushWorker`] owns the current batch and is the only writer into
//! storage. A batch is flushed when it reaches `max_batch_size` or when the
//! flush interval ticks, whichever comes first. Delivery is at-most-once.

pub mod metrics;

use std::sync::Arc;

use tokio::sync::{Notify, broadcast};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::{
    clock::Clock,
    config::{ConfigError, LivenessPolicy, TrackerConfig},
    events::{Batch, VisitEvent, distinct_sessions, latest_timestamp},
    queues::{BoundedDropNewestQueue, BoundedDropNewestReceiver},
    store::{EventStore, SessionStore},
};

pub use metrics::{TrackerMetrics, TrackerSnapshot};

/// Producer side of the pipeline. Cheap to clone.
#[derive(Clone)]
pub struct Tracker {
    queue: BoundedDropNewestQueue<VisitEvent>,
    metrics: Arc<TrackerMetrics>,
}

impl Tracker {
    /// Build the producer handle and its consumer. Nothing runs until the
    /// returned [`FlushWorker`] is spawned.
    pub fn new(
        config: TrackerConfig,
        events: Arc<dyn EventStore>,
        sessions: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<(Tracker, FlushWorker), ConfigError> {
        config.validate()?;

        let queue = BoundedDropNewestQueue::new(config.queue_capacity, Arc::new(Notify::new()));
        let metrics = Arc::new(TrackerMetrics::new());

        let worker = FlushWorker {
            receiver: queue.receiver(),
            config,
            events,
            sessions,
            clock,
            metrics: Arc::clone(&metrics),
        };

        Ok((Tracker { queue, metrics }, worker))
    }

    /// Enqueue one event without waiting.
    ///
    /// A full queue drops the event. The return value only says whether it
    /// was accepted; callers are free to ignore it.
    pub fn track_event(&self, event: VisitEvent) -> bool {
        match self.queue.try_push(event) {
            Ok(()) => {
                self.metrics.record_accepted();
                true
            }
            Err(_) => {
                self.metrics.record_dropped();
                false
            }
        }
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn metrics(&self) -> Arc<TrackerMetrics> {
        Arc::clone(&self.metrics)
    }
}

/// The single consumer that owns batch accumulation and flushing.
pub struct FlushWorker {
    receiver: BoundedDropNewestReceiver<VisitEvent>,
    config: TrackerConfig,
    events: Arc<dyn EventStore>,
    sessions: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    metrics: Arc<TrackerMetrics>,
}

impl FlushWorker {
    pub const NAME: &'static str = "tracker.flush";

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let period = self.config.flush_interval();
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut batch = Batch::new(self.config.max_batch_size);

        info!(
            worker = Self::NAME,
            queue_capacity = self.config.queue_capacity,
            max_batch_size = self.config.max_batch_size,
            flush_interval_ms = self.config.flush_interval_ms,
            "Flush worker started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                event = self.receiver.recv() => {
                    batch.push(event);
                    if batch.is_full() {
                        self.flush(&mut batch).await;
                    }
                }
                _ = ticker.tick() => {
                    if !batch.is_empty() {
                        self.flush(&mut batch).await;
                    }
                }
            }
        }

        if self.config.drain_on_shutdown {
            while let Some(event) = self.receiver.try_recv() {
                batch.push(event);
                if batch.is_full() {
                    self.flush(&mut batch).await;
                }
            }
            if !batch.is_empty() {
                self.flush(&mut batch).await;
            }
        } else if !batch.is_empty() {
            warn!(events = batch.len(), "Discarding unflushed events on shutdown");
        }

        info!(worker = Self::NAME, "Flush worker stopped");
    }

    async fn flush(&self, batch: &mut Batch) {
        let events = batch.take();
        let count = events.len();
        let flushed_at = self.clock.now();

        if let Err(e) = self.events.save_events(&events).await {
            self.metrics.record_failed_flush(count);
            error!(error = %e, events = count, "Failed to save event batch, discarding");
            return;
        }
        self.metrics.record_flush(count);

        let sessions = distinct_sessions(&events);
        let at = match self.config.liveness {
            LivenessPolicy::FlushTime => flushed_at,
            LivenessPolicy::LatestEventTimestamp => {
                latest_timestamp(&events).unwrap_or(flushed_at)
            }
        };

        match self.sessions.set_last_active(&sessions, at).await {
            Ok(refreshed) if refreshed < sessions.len() => {
                let missed = sessions.len() - refreshed;
                self.metrics.record_liveness_misses(missed);
                warn!(
                    missed,
                    sessions = sessions.len(),
                    "Liveness refresh skipped closed or unknown sessions"
                );
            }
            Ok(_) => {}
            Err(e) => {
                self.metrics.record_liveness_failure();
                warn!(
                    error = %e,
                    sessions = sessions.len(),
                    "Events saved but session liveness was not refreshed"
                );
            }
        }

        debug!(events = count, sessions = sessions.len(), "Flushed event batch");
    }
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for FlushWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlushWorker")
            .field("config", &self.config)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}
