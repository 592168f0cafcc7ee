#![allow(dead_code)]

use std::sync::{
    Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

use visitflow_core::{
    Clock, CleanupBatchSessions, EventStore, SessionId, SessionStore, StoreError, StoreResult,
    VisitEvent,
};

pub fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

pub fn page_view(session: u64, n: u64) -> VisitEvent {
    VisitEvent::new(SessionId(session), VisitEvent::PAGE_VIEW, "/", t0()).with_data("n", n)
}

/// Wall clock that follows tokio's (possibly paused) clock.
pub struct TokioClock {
    base: DateTime<Utc>,
    started: Instant,
}

impl TokioClock {
    pub fn new(base: DateTime<Utc>) -> Self {
        Self {
            base,
            started: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.started.elapsed()).unwrap();
        self.base + elapsed
    }
}

// ============================================================================
// Event store double
// ============================================================================

pub struct SaveCall {
    pub at: Instant,
    pub events: Vec<VisitEvent>,
}

#[derive(Default)]
pub struct RecordingEventStore {
    pub calls: Mutex<Vec<SaveCall>>,
    pub fail: AtomicBool,
}

impl RecordingEventStore {
    pub fn batches(&self) -> Vec<Vec<VisitEvent>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.events.clone())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn saved(&self) -> Vec<VisitEvent> {
        self.batches().into_iter().flatten().collect()
    }
}

#[async_trait]
impl EventStore for RecordingEventStore {
    async fn save_events(&self, events: &[VisitEvent]) -> StoreResult<()> {
        self.calls.lock().unwrap().push(SaveCall {
            at: Instant::now(),
            events: events.to_vec(),
        });
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("connection refused"));
        }
        Ok(())
    }
}

// ============================================================================
// Session store double
// ============================================================================

pub struct LivenessCall {
    pub ids: Vec<SessionId>,
    pub at: DateTime<Utc>,
}

#[derive(Default)]
pub struct RecordingSessionStore {
    pub calls: Mutex<Vec<LivenessCall>>,
    pub fail: AtomicBool,
    /// Pretend only this many sessions exist per refresh.
    pub known: Mutex<Option<usize>>,
}

impl RecordingSessionStore {
    pub fn liveness_calls(&self) -> Vec<(Vec<SessionId>, DateTime<Utc>)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| (c.ids.clone(), c.at))
            .collect()
    }
}

#[async_trait]
impl SessionStore for RecordingSessionStore {
    async fn set_last_active(&self, ids: &[SessionId], at: DateTime<Utc>) -> StoreResult<usize> {
        self.calls.lock().unwrap().push(LivenessCall {
            ids: ids.to_vec(),
            at,
        });
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("connection reset"));
        }
        let known = *self.known.lock().unwrap();
        Ok(known.map_or(ids.len(), |k| k.min(ids.len())))
    }

    async fn stale_sessions(&self, _limit: usize) -> StoreResult<Vec<SessionId>> {
        Ok(Vec::new())
    }

    async fn close_sessions(&self, _ids: &[SessionId]) -> StoreResult<usize> {
        Ok(0)
    }
}

// ============================================================================
// Cleanup doubles
// ============================================================================

/// Cleanup pass that takes `delay` and tracks how many passes overlap.
pub struct SlowCleanup {
    pub delay: Duration,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub completed: AtomicUsize,
}

impl SlowCleanup {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CleanupBatchSessions for SlowCleanup {
    async fn cleanup_batch_sessions(&self, _limit: usize) -> StoreResult<usize> {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    }
}

/// Fails the first `failures` passes, then succeeds.
pub struct FlakyCleanup {
    pub failures: usize,
    pub calls: AtomicUsize,
    pub limits: Mutex<Vec<usize>>,
}

impl FlakyCleanup {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
            limits: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CleanupBatchSessions for FlakyCleanup {
    async fn cleanup_batch_sessions(&self, limit: usize) -> StoreResult<usize> {
        self.limits.lock().unwrap().push(limit);
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(StoreError::unavailable("database is down"));
        }
        Ok(1)
    }
}
