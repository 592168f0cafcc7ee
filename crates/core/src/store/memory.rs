//! In-process backend implementing both store traits.
//!
//! Every write happens under a single lock, so each call is all-or-nothing.

// std::sync::Mutex is fine here: the lock is never held across an .await.
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::{
    clock::Clock,
    config::StalenessPolicy,
    events::VisitEvent,
    types::{GuestId, GuestSession, SessionId},
};

use super::{EventStore, SessionStore, StoreError, StoreResult};

pub struct MemoryStore {
    state: Mutex<State>,
    policy: StalenessPolicy,
    clock: Arc<dyn Clock>,
}

#[derive(Default)]
struct State {
    next_session_id: u64,
    sessions: BTreeMap<SessionId, GuestSession>,
    events: Vec<VisitEvent>,
    latest_event_at: HashMap<SessionId, DateTime<Utc>>,
}

impl State {
    fn open_session(
        &mut self,
        guest_id: GuestId,
        ip_address: Option<String>,
        at: DateTime<Utc>,
    ) -> GuestSession {
        let id = SessionId(self.next_session_id);
        self.next_session_id += 1;

        let session = GuestSession::new(id, guest_id, ip_address, at);
        self.sessions.insert(id, session.clone());
        session
    }
}

impl MemoryStore {
    pub fn new(policy: StalenessPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(State {
                next_session_id: 1,
                ..State::default()
            }),
            policy,
            clock,
        }
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| StoreError::backend("memory store lock poisoned"))
    }

    /// Open a new active session with `last_active` set to now.
    pub fn create_session(
        &self,
        guest_id: GuestId,
        ip_address: Option<String>,
    ) -> StoreResult<GuestSession> {
        let now = self.clock.now();
        let mut state = self.lock()?;
        Ok(state.open_session(guest_id, ip_address, now))
    }

    /// The guest's most recently active open session, or a fresh one when the
    /// guest has none. Closed sessions are never handed out again.
    pub fn session_for_guest(
        &self,
        guest_id: GuestId,
        ip_address: Option<String>,
    ) -> StoreResult<GuestSession> {
        let now = self.clock.now();
        let mut state = self.lock()?;

        let existing = state
            .sessions
            .values()
            .filter(|s| s.guest_id == guest_id && s.is_active())
            .max_by_key(|s| s.last_active)
            .cloned();

        match existing {
            Some(session) => Ok(session),
            None => {
                let session = state.open_session(guest_id, ip_address, now);
                debug!(guest = %guest_id, session = %session.id, "Opened guest session");
                Ok(session)
            }
        }
    }

    pub fn session(&self, id: SessionId) -> StoreResult<Option<GuestSession>> {
        Ok(self.lock()?.sessions.get(&id).cloned())
    }

    pub fn events_for_session(&self, id: SessionId) -> StoreResult<Vec<VisitEvent>> {
        Ok(self
            .lock()?
            .events
            .iter()
            .filter(|e| e.session_id == id)
            .cloned()
            .collect())
    }

    pub fn count_active_sessions(&self) -> StoreResult<usize> {
        Ok(self
            .lock()?
            .sessions
            .values()
            .filter(|s| s.is_active())
            .count())
    }

    pub fn event_count(&self) -> StoreResult<usize> {
        Ok(self.lock()?.events.len())
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn save_events(&self, events: &[VisitEvent]) -> StoreResult<()> {
        let mut state = self.lock()?;

        // Events reference their session; one dangling reference rejects the batch.
        if let Some(missing) = events
            .iter()
            .find(|e| !state.sessions.contains_key(&e.session_id))
        {
            return Err(StoreError::SessionNotFound(missing.session_id));
        }

        for event in events {
            let latest = state
                .latest_event_at
                .entry(event.session_id)
                .or_insert(event.timestamp);
            if event.timestamp > *latest {
                *latest = event.timestamp;
            }
        }
        state.events.extend_from_slice(events);
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn set_last_active(&self, ids: &[SessionId], at: DateTime<Utc>) -> StoreResult<usize> {
        let mut state = self.lock()?;
        let mut refreshed = 0;
        for id in ids {
            if let Some(session) = state.sessions.get_mut(id) {
                if session.touch(at) {
                    refreshed += 1;
                }
            }
        }
        Ok(refreshed)
    }

    async fn stale_sessions(&self, limit: usize) -> StoreResult<Vec<SessionId>> {
        let now = self.clock.now();
        let idle_cutoff = now
            .checked_sub_signed(self.policy.idle_threshold())
            .ok_or_else(|| StoreError::backend("idle threshold is out of range"))?;
        let recent_cutoff = now
            .checked_sub_signed(self.policy.recent_activity_window())
            .ok_or_else(|| StoreError::backend("recent activity window is out of range"))?;

        let state = self.lock()?;
        let stale: Vec<SessionId> = state
            .sessions
            .values()
            .filter(|s| s.is_active() && s.last_active < idle_cutoff)
            .filter(|s| {
                state
                    .latest_event_at
                    .get(&s.id)
                    .is_none_or(|ts| *ts <= recent_cutoff)
            })
            .map(|s| s.id)
            .take(limit)
            .collect();

        debug!(count = stale.len(), limit, "Stale sessions looked up");
        Ok(stale)
    }

    async fn close_sessions(&self, ids: &[SessionId]) -> StoreResult<usize> {
        let now = self.clock.now();
        let mut state = self.lock()?;

        if let Some(missing) = ids.iter().find(|id| !state.sessions.contains_key(*id)) {
            return Err(StoreError::SessionNotFound(*missing));
        }

        let mut closed = 0;
        for id in ids {
            if let Some(session) = state.sessions.get_mut(id) {
                if session.close(now) {
                    closed += 1;
                }
            }
        }
        Ok(closed)
    }
}
