use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::store::{SessionStore, StoreResult};

/// One sweep pass: find stale sessions and close them.
#[async_trait]
pub trait CleanupBatchSessions: Send + Sync {
    /// Returns how many sessions were closed.
    async fn cleanup_batch_sessions(&self, limit: usize) -> StoreResult<usize>;
}

pub struct StaleSessionCleanup {
    sessions: Arc<dyn SessionStore>,
}

impl StaleSessionCleanup {
    pub fn new(sessions: Arc<dyn SessionStore>) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl CleanupBatchSessions for StaleSessionCleanup {
    async fn cleanup_batch_sessions(&self, limit: usize) -> StoreResult<usize> {
        let stale = self.sessions.stale_sessions(limit).await?;
        if stale.is_empty() {
            return Ok(0);
        }

        let closed = self.sessions.close_sessions(&stale).await?;
        debug!(found = stale.len(), closed, "Closed stale sessions");
        Ok(closed)
    }
}
