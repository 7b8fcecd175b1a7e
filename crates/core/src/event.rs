// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External trigger events.
//!
//! Inserted by the ingestion endpoint, consumed by the leader exactly once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a trigger event.
    pub struct EventId("evt-");
}

/// An external trigger record. `event_type` selects the event-kind
/// definition to materialize; `dedupe_key`, when present, is unique across
/// all events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub id: EventId,
    pub event_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub dedupe_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl TriggerEvent {
    /// The idempotency anchor for the run this event materializes:
    /// the dedupe key when present, the event id otherwise.
    pub fn run_anchor(&self) -> &str {
        self.dedupe_key.as_deref().unwrap_or_else(|| self.id.as_str())
    }
}
