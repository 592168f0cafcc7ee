use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use std::time::{Duration, Instant};

use anyhow::Result;
use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;
use visitflow_core::{
    AppConfig, Clock, GuestId, MemoryStore, Pipeline, SessionId, StaleSessionCleanup,
    SystemClock, Tracker, VisitEvent,
    sweeper::SweeperSnapshot,
    tracker::TrackerSnapshot,
};

const PAGES: &[&str] = &["/", "/pricing", "/docs", "/blog", "/signup", "/contact"];
const ELEMENTS: &[&str] = &["#cta", "#nav-docs", "#footer-link", ".card", "#search"];

pub struct SimulationOptions {
    pub duration: Duration,
    pub producers: usize,
    pub sessions: usize,
    pub tick: Duration,
    pub min_events: usize,
    pub max_events: usize,
}

pub struct SimulationReport {
    pub run_id: Uuid,
    pub elapsed: Duration,
    pub produced: u64,
    pub tracker: TrackerSnapshot,
    pub sweeper: SweeperSnapshot,
    pub seeded_sessions: usize,
    pub active_sessions: usize,
    pub stored_events: usize,
}

/// Seed guest sessions, drive the pipeline with synthetic traffic for the
/// configured duration and shut everything down cleanly.
pub async fn run(config: &AppConfig, opts: SimulationOptions) -> Result<SimulationReport> {
    anyhow::ensure!(opts.producers > 0, "producers must be > 0");
    anyhow::ensure!(opts.sessions > 0, "sessions must be > 0");
    anyhow::ensure!(
        opts.min_events <= opts.max_events,
        "min-events must not exceed max-events"
    );

    let run_id = Uuid::new_v4();
    let span = info_span!("simulation", %run_id);

    async move {
        let started = Instant::now();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(MemoryStore::new(config.staleness.clone(), Arc::clone(&clock)));

        let guests = seed_guests(&store, opts.sessions)?;
        info!(guests = guests.len(), "Seeded guest sessions");

        let pipeline = Pipeline::start(
            config,
            store.clone(),
            store.clone(),
            Arc::new(StaleSessionCleanup::new(store.clone())),
            Arc::clone(&clock),
        )?;

        let produced = Arc::new(AtomicU64::new(0));
        let (stop_tx, stop_rx) = broadcast::channel::<()>(1);
        let guests = Arc::new(guests);

        let producers: Vec<JoinHandle<()>> = (0..opts.producers)
            .map(|_| {
                tokio::spawn(produce(
                    pipeline.tracker.clone(),
                    Arc::clone(&store),
                    Arc::clone(&clock),
                    Arc::clone(&guests),
                    Arc::clone(&produced),
                    Burst {
                        tick: opts.tick,
                        min: opts.min_events,
                        max: opts.max_events,
                    },
                    stop_rx.resubscribe(),
                ))
            })
            .collect();
        drop(stop_rx);

        tokio::time::sleep(opts.duration).await;

        let _ = stop_tx.send(());
        for producer in producers {
            producer.await?;
        }

        let tracker_metrics = Arc::clone(&pipeline.tracker_metrics);
        let sweeper_metrics = Arc::clone(&pipeline.sweeper_metrics);
        pipeline.stop().await;

        Ok(SimulationReport {
            run_id,
            elapsed: started.elapsed(),
            produced: produced.load(Ordering::Relaxed),
            tracker: tracker_metrics.snapshot(),
            sweeper: sweeper_metrics.snapshot(),
            seeded_sessions: opts.sessions,
            active_sessions: store.count_active_sessions()?,
            stored_events: store.event_count()?,
        })
    }
    .instrument(span)
    .await
}

fn seed_guests(store: &MemoryStore, count: usize) -> Result<Vec<GuestId>> {
    (0..count)
        .map(|i| {
            let guest = GuestId(i as u64);
            let ip = format!("192.0.2.{}", i % 254 + 1);
            store.session_for_guest(guest, Some(ip))?;
            Ok(guest)
        })
        .collect()
}

struct Burst {
    tick: Duration,
    min: usize,
    max: usize,
}

async fn produce(
    tracker: Tracker,
    store: Arc<MemoryStore>,
    clock: Arc<dyn Clock>,
    guests: Arc<Vec<GuestId>>,
    produced: Arc<AtomicU64>,
    burst: Burst,
    mut stop: broadcast::Receiver<()>,
) {
    let mut rng = StdRng::from_entropy();
    let mut ticker = tokio::time::interval(burst.tick);

    loop {
        tokio::select! {
            _ = stop.recv() => return,
            _ = ticker.tick() => {
                let size = rng.gen_range(burst.min..=burst.max);
                for _ in 0..size {
                    let Some(&guest) = guests.choose(&mut rng) else {
                        return;
                    };
                    // A swept session is replaced by a fresh one for the same guest.
                    let session = match store.session_for_guest(guest, None) {
                        Ok(session) => session.id,
                        Err(e) => {
                            warn!(%guest, error = %e, "Guest session lookup failed");
                            continue;
                        }
                    };
                    tracker.track_event(random_event(&mut rng, session, clock.now()));
                    produced.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}

fn random_event(
    rng: &mut StdRng,
    session: SessionId,
    at: chrono::DateTime<chrono::Utc>,
) -> VisitEvent {
    let page = PAGES.choose(rng).copied().unwrap_or("/");

    if rng.gen_bool(0.3) {
        let element = ELEMENTS.choose(rng).copied().unwrap_or("body");
        VisitEvent::new(session, VisitEvent::CLICK, page, at)
            .with_element(element)
            .with_data("x", rng.gen_range(0..1920))
            .with_data("y", rng.gen_range(0..1080))
    } else {
        VisitEvent::new(session, VisitEvent::PAGE_VIEW, page, at)
            .with_data("referrer", "direct")
    }
}
