//! Visitflow Core Library
//!
//! Batched ingestion of visit events and reclamation of idle guest sessions.

pub mod clock;
pub mod config;
pub mod events;
pub mod pipeline;
pub mod queues;
pub mod store;
pub mod sweeper;
pub mod tracker;
pub mod types;

// Re-export commonly used items at crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    AppConfig, ConfigError, LivenessPolicy, StalenessPolicy, SweeperConfig, TrackerConfig,
};
pub use events::{Batch, VisitEvent};
pub use pipeline::{Pipeline, PipelineHandle};
pub use store::{EventStore, MemoryStore, SessionStore, StoreError, StoreResult};
pub use sweeper::{CleanupBatchSessions, SessionSweeper, StaleSessionCleanup, SweeperMetrics};
pub use tracker::{FlushWorker, Tracker, TrackerMetrics};
pub use types::{GuestId, GuestSession, SessionId, SessionState};
