use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::{events::VisitEvent, types::SessionId};

/// Events accumulated by the flush worker between two flushes.
pub struct Batch {
    events: Vec<VisitEvent>,
    max_size: usize,
}

impl Batch {
    pub fn new(max_size: usize) -> Self {
        Self {
            events: Vec::with_capacity(max_size),
            max_size,
        }
    }

    pub fn push(&mut self, event: VisitEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.events.len() >= self.max_size
    }

    /// Hand the accumulated events over and start a fresh batch.
    pub fn take(&mut self) -> Vec<VisitEvent> {
        std::mem::replace(&mut self.events, Vec::with_capacity(self.max_size))
    }
}

/// Distinct session ids in first-seen order.
pub fn distinct_sessions(events: &[VisitEvent]) -> Vec<SessionId> {
    let mut seen = HashSet::with_capacity(events.len());
    events
        .iter()
        .map(|e| e.session_id)
        .filter(|id| seen.insert(*id))
        .collect()
}

pub fn latest_timestamp(events: &[VisitEvent]) -> Option<DateTime<Utc>> {
    events.iter().map(|e| e.timestamp).max()
}
