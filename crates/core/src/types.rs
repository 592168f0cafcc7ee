use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuestId(pub u64);

impl fmt::Display for GuestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Closed { ended_at: DateTime<Utc> },
}

/// One continuous period of activity from one anonymous visitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestSession {
    pub id: SessionId,
    pub guest_id: GuestId,
    pub ip_address: Option<String>,
    pub state: SessionState,
    pub last_active: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl GuestSession {
    pub fn new(
        id: SessionId,
        guest_id: GuestId,
        ip_address: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            guest_id,
            ip_address,
            state: SessionState::Active,
            last_active: at,
            created_at: at,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Active)
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        match self.state {
            SessionState::Active => None,
            SessionState::Closed { ended_at } => Some(ended_at),
        }
    }

    /// Refresh liveness. Returns false for closed sessions, which are never
    /// touched again.
    pub fn touch(&mut self, at: DateTime<Utc>) -> bool {
        if !self.is_active() {
            return false;
        }
        if at > self.last_active {
            self.last_active = at;
        }
        true
    }

    /// Close the session. Returns false if it was already closed, in which case
    /// the first `end_time` is kept.
    pub fn close(&mut self, at: DateTime<Utc>) -> bool {
        if !self.is_active() {
            return false;
        }
        self.state = SessionState::Closed { ended_at: at };
        true
    }
}
