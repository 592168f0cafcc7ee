use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::SessionId;

/// A single recorded visitor activity.
///
/// `timestamp` is when the activity happened on the client, not when it was
/// ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitEvent {
    pub session_id: SessionId,
    #[serde(rename = "type")]
    pub kind: String,
    pub page_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl VisitEvent {
    pub const PAGE_VIEW: &'static str = "page_view";
    pub const CLICK: &'static str = "click";

    pub fn new(
        session_id: SessionId,
        kind: impl Into<String>,
        page_url: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            kind: kind.into(),
            page_url: page_url.into(),
            element: None,
            timestamp,
            data: Map::new(),
        }
    }

    pub fn with_element(mut self, element: impl Into<String>) -> Self {
        self.element = Some(element.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}
