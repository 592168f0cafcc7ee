mod common;

use std::sync::{Arc, atomic::Ordering};
use std::time::Duration;

use chrono::DateTime;
use tokio::sync::broadcast;
use tokio::time::sleep;

use visitflow_core::{
    CleanupBatchSessions, Clock, EventStore, GuestId, ManualClock, MemoryStore, SessionId, SessionStore,
    SessionSweeper, StaleSessionCleanup, StalenessPolicy, SweeperConfig, VisitEvent,
};

use common::{FlakyCleanup, SlowCleanup, t0};

fn sweeper_config(interval_secs: u64, fetch_limit: usize) -> SweeperConfig {
    SweeperConfig {
        interval_secs,
        fetch_limit,
    }
}

fn policy(idle_mins: u64, window_mins: u64) -> StalenessPolicy {
    StalenessPolicy {
        idle_threshold_secs: idle_mins * 60,
        recent_activity_window_secs: window_mins * 60,
    }
}

fn event_at(id: SessionId, at: DateTime<chrono::Utc>) -> VisitEvent {
    VisitEvent::new(id, VisitEvent::PAGE_VIEW, "/", at)
}

/// Two sessions last active at `t0`, viewed from `t0 + 26m`: `old` has its
/// newest event 31 minutes back, `recent` 10 minutes back.
async fn idle_pair(policy: StalenessPolicy) -> (Arc<MemoryStore>, SessionId, SessionId) {
    let clock = Arc::new(ManualClock::new(t0()));
    let store = Arc::new(MemoryStore::new(policy, clock.clone()));
    let old = store.create_session(GuestId(1), None).unwrap().id;
    let recent = store.create_session(GuestId(2), None).unwrap().id;

    store
        .save_events(&[
            event_at(old, t0() - chrono::Duration::minutes(5)),
            event_at(recent, t0() + chrono::Duration::minutes(16)),
        ])
        .await
        .unwrap();

    clock.advance(chrono::Duration::minutes(26));
    (store, old, recent)
}

#[tokio::test]
async fn closes_idle_session_and_keeps_one_with_recent_event() {
    let (store, old, recent) = idle_pair(policy(25, 30)).await;
    let cleanup = StaleSessionCleanup::new(store.clone());

    assert_eq!(cleanup.cleanup_batch_sessions(100).await.unwrap(), 1);

    let closed = store.session(old).unwrap().unwrap();
    assert!(!closed.is_active());
    assert_eq!(closed.end_time(), Some(t0() + chrono::Duration::minutes(26)));

    let kept = store.session(recent).unwrap().unwrap();
    assert!(kept.is_active());
    assert_eq!(kept.end_time(), None);
}

#[tokio::test]
async fn event_inside_recent_window_blocks_closing() {
    let clock = Arc::new(ManualClock::new(t0()));
    let store = Arc::new(MemoryStore::new(policy(25, 30), clock.clone()));
    let id = store.create_session(GuestId(1), None).unwrap().id;
    store
        .save_events(&[event_at(id, t0() - chrono::Duration::minutes(2))])
        .await
        .unwrap();

    // last_active 26m ago, event 28m ago: still inside the 30m window.
    clock.advance(chrono::Duration::minutes(26));
    let cleanup = StaleSessionCleanup::new(store.clone());
    assert_eq!(cleanup.cleanup_batch_sessions(100).await.unwrap(), 0);
    assert!(store.session(id).unwrap().unwrap().is_active());

    // With a narrower window the same event no longer counts as recent.
    let clock = Arc::new(ManualClock::new(t0()));
    let store = Arc::new(MemoryStore::new(policy(25, 27), clock.clone()));
    let id = store.create_session(GuestId(1), None).unwrap().id;
    store
        .save_events(&[event_at(id, t0() - chrono::Duration::minutes(2))])
        .await
        .unwrap();
    clock.advance(chrono::Duration::minutes(26));
    let cleanup = StaleSessionCleanup::new(store.clone());
    assert_eq!(cleanup.cleanup_batch_sessions(100).await.unwrap(), 1);
}

#[tokio::test]
async fn guest_returning_after_sweep_gets_a_new_session() {
    let clock = Arc::new(ManualClock::new(t0()));
    let store = Arc::new(MemoryStore::new(policy(25, 30), clock.clone()));
    let guest = GuestId(42);
    let swept = store.session_for_guest(guest, None).unwrap();

    clock.advance(chrono::Duration::minutes(26));
    let cleanup = StaleSessionCleanup::new(store.clone());
    assert_eq!(cleanup.cleanup_batch_sessions(100).await.unwrap(), 1);
    let ended = store.session(swept.id).unwrap().unwrap().end_time();
    assert_eq!(ended, Some(t0() + chrono::Duration::minutes(26)));

    clock.advance(chrono::Duration::minutes(1));
    let returned = store.session_for_guest(guest, None).unwrap();
    assert_ne!(returned.id, swept.id);
    assert!(returned.is_active());

    // A late liveness refresh for the swept session does not revive it.
    assert_eq!(store.set_last_active(&[swept.id], clock.now()).await.unwrap(), 0);
    let reopened = store.session(swept.id).unwrap().unwrap();
    assert!(!reopened.is_active());
    assert_eq!(reopened.end_time(), ended);
    assert_eq!(store.session_for_guest(guest, None).unwrap().id, returned.id);
}

#[tokio::test]
async fn second_pass_is_a_noop() {
    let (store, old, _) = idle_pair(policy(25, 30)).await;
    let cleanup = StaleSessionCleanup::new(store.clone());

    cleanup.cleanup_batch_sessions(100).await.unwrap();
    let first_end = store.session(old).unwrap().unwrap().end_time();

    assert_eq!(cleanup.cleanup_batch_sessions(100).await.unwrap(), 0);
    assert_eq!(store.session(old).unwrap().unwrap().end_time(), first_end);
}

#[tokio::test]
async fn fetch_limit_caps_one_pass() {
    let clock = Arc::new(ManualClock::new(t0()));
    let store = Arc::new(MemoryStore::new(policy(25, 30), clock.clone()));
    for g in 0..7 {
        store.create_session(GuestId(g), None).unwrap();
    }
    clock.advance(chrono::Duration::hours(2));

    let cleanup = StaleSessionCleanup::new(store.clone());
    assert_eq!(cleanup.cleanup_batch_sessions(5).await.unwrap(), 5);
    assert_eq!(store.count_active_sessions().unwrap(), 2);
    assert_eq!(cleanup.cleanup_batch_sessions(5).await.unwrap(), 2);
    assert_eq!(store.count_active_sessions().unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn sweeper_closes_on_tick() {
    let (store, old, recent) = idle_pair(policy(25, 30)).await;
    let sweeper = SessionSweeper::new(
        sweeper_config(15, 1000),
        Arc::new(StaleSessionCleanup::new(store.clone())),
    )
    .unwrap();
    let metrics = sweeper.metrics();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(sweeper.run(shutdown_rx));

    sleep(Duration::from_secs(14)).await;
    assert!(store.session(old).unwrap().unwrap().is_active());

    sleep(Duration::from_secs(2)).await;
    assert!(!store.session(old).unwrap().unwrap().is_active());
    assert!(store.session(recent).unwrap().unwrap().is_active());

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.passes_started, 1);
    assert_eq!(snapshot.sessions_closed, 1);
}

#[tokio::test(start_paused = true)]
async fn overlapping_passes_are_skipped() {
    let cleanup = Arc::new(SlowCleanup::new(Duration::from_secs(40)));
    let sweeper = SessionSweeper::new(sweeper_config(15, 10), cleanup.clone()).unwrap();
    let metrics = sweeper.metrics();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(sweeper.run(shutdown_rx));

    // Ticks at 15s (starts a pass lasting until 55s), 30s and 45s (skipped).
    sleep(Duration::from_secs(50)).await;
    assert_eq!(cleanup.max_active.load(Ordering::SeqCst), 1);
    assert_eq!(cleanup.completed.load(Ordering::SeqCst), 0);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();

    // Stop waited for the pass in flight.
    assert_eq!(cleanup.completed.load(Ordering::SeqCst), 1);
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.passes_started, 1);
    assert_eq!(snapshot.passes_skipped, 2);
}

#[tokio::test(start_paused = true)]
async fn failed_pass_is_retried_next_tick() {
    let cleanup = Arc::new(FlakyCleanup::new(1));
    let sweeper = SessionSweeper::new(sweeper_config(15, 250), cleanup.clone()).unwrap();
    let metrics = sweeper.metrics();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(sweeper.run(shutdown_rx));

    sleep(Duration::from_secs(31)).await;
    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();

    assert_eq!(cleanup.calls.load(Ordering::SeqCst), 2);
    assert_eq!(*cleanup.limits.lock().unwrap(), vec![250, 250]);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.passes_started, 2);
    assert_eq!(snapshot.passes_failed, 1);
    assert_eq!(snapshot.sessions_closed, 1);
}

#[tokio::test(start_paused = true)]
async fn stop_before_first_tick_runs_nothing() {
    let cleanup = Arc::new(FlakyCleanup::new(0));
    let sweeper = SessionSweeper::new(sweeper_config(15, 10), cleanup.clone()).unwrap();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(sweeper.run(shutdown_rx));

    sleep(Duration::from_secs(5)).await;
    drop(shutdown_tx);
    handle.await.unwrap();

    assert_eq!(cleanup.calls.load(Ordering::SeqCst), 0);
}
