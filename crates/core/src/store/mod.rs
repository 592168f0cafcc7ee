//! Durable sinks the pipeline writes into.

pub mod error;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{events::VisitEvent, types::SessionId};

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist a whole batch atomically.
    async fn save_events(&self, events: &[VisitEvent]) -> StoreResult<()>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Bulk-refresh liveness for distinct session ids.
    ///
    /// Returns how many sessions were refreshed. Unknown or closed sessions
    /// are skipped rather than reported as errors.
    async fn set_last_active(&self, ids: &[SessionId], at: DateTime<Utc>) -> StoreResult<usize>;

    /// Up to `limit` sessions eligible for closing. Empty when none are.
    async fn stale_sessions(&self, limit: usize) -> StoreResult<Vec<SessionId>>;

    /// Close the given sessions in one atomic write.
    ///
    /// Returns how many sessions changed state; already closed ones are left
    /// untouched.
    async fn close_sessions(&self, ids: &[SessionId]) -> StoreResult<usize>;
}
