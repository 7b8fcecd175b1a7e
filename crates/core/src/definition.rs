// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job definition: the named template runs are materialized from.

use crate::schedule::Schedule;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

crate::define_id! {
    /// Unique identifier for a job definition.
    pub struct DefinitionId("def-");
}

/// How a definition's runs come into being.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Materialized by the leader from the schedule grid
    Time,
    /// Materialized from ingested trigger events
    Event,
}

crate::text_enum! {
    JobKind {
        Time => "time",
        Event => "event",
    }
}

/// What to do when a new run would overlap a non-terminal one of the same
/// definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyPolicy {
    /// Skip materialization while a non-terminal run exists
    #[default]
    Forbid,
    /// No restriction
    Allow,
    /// Cancel the existing run before dispatching the new one
    Replace,
}

crate::text_enum! {
    ConcurrencyPolicy {
        Forbid => "forbid",
        Allow => "allow",
        Replace => "replace",
    }
}

/// A named job template. Created and edited externally; the engine only
/// reads these rows. Never destroyed while referenced by runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDefinition {
    pub id: DefinitionId,
    /// Display name; also the match key for event-kind definitions
    /// (an event's `event_type` selects the definition with that name).
    pub name: String,
    pub enabled: bool,
    pub kind: JobKind,
    /// Command name resolved by the executor.
    pub command: String,
    /// Opaque default argument map, passed through to the executor.
    #[serde(default)]
    pub default_args: Map<String, Value>,
    /// Present iff `kind == Time`. `None` on a time definition means the
    /// stored grammar was unrecognized; the definition is treated as
    /// disabled (with an audit entry at load time).
    #[serde(default)]
    pub schedule: Option<Schedule>,
    pub timeout_seconds: u32,
    /// Cap on total attempts (initial + reassignments).
    pub max_retries: u32,
    /// Extra delay applied before each reassignment beyond the first.
    pub retry_backoff_seconds: u32,
    #[serde(default)]
    pub concurrency: ConcurrencyPolicy,
}

impl JobDefinition {
    /// Whether the leader may materialize runs from this definition.
    pub fn is_schedulable(&self) -> bool {
        match self.kind {
            JobKind::Time => self.enabled && self.schedule.is_some(),
            JobKind::Event => self.enabled,
        }
    }
}

crate::builder! {
    pub struct JobDefinitionBuilder => JobDefinition {
        into {
            id: DefinitionId = "def-test",
            name: String = "test-job",
            command: String = "noop",
        }
        set {
            enabled: bool = true,
            kind: JobKind = JobKind::Time,
            default_args: Map<String, Value> = Map::new(),
            timeout_seconds: u32 = 60,
            max_retries: u32 = 3,
            retry_backoff_seconds: u32 = 0,
            concurrency: ConcurrencyPolicy = ConcurrencyPolicy::Allow,
        }
        option {
            schedule: Schedule = None,
        }
    }
}

#[cfg(test)]
#[path = "definition_tests.rs"]
mod tests;
