// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job run row and its state machine.
//!
//! A run is one attempt to execute a definition. Its `state` only ever
//! moves along the closed transition table in [`RunState::can_transition`];
//! every durable update goes through the store's conditional-update
//! primitive, so at most one writer wins each transition.

use crate::definition::DefinitionId;
use crate::worker::{Epoch, WorkerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a job run.
    pub struct RunId("run-");
}

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Materialized, waiting for assignment
    Pending,
    /// Assigned to a worker, dispatch pending or in flight
    Assigned,
    /// Worker is executing the subprocess
    Running,
    /// Clean exit 0
    Succeeded,
    /// Non-zero exit or continuation abort
    Failed,
    /// Leader- or operator-initiated abort
    Canceled,
    /// Per-run timeout fired
    TimedOut,
    /// Assigned worker lost; awaiting reassignment
    Orphaned,
    /// Slot older than the backlog cutoff, never dispatched
    Skipped,
}

impl RunState {
    /// Terminal states never transition again. `Orphaned` is not terminal:
    /// it exists to be reassigned.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Succeeded
                | RunState::Failed
                | RunState::Canceled
                | RunState::TimedOut
                | RunState::Skipped
        )
    }

    /// The closed transition table. Anything not listed is rejected.
    pub fn can_transition(self, to: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, to),
            (Pending, Assigned)
                | (Pending, Skipped)
                | (Assigned, Running)
                | (Assigned, Canceled)
                | (Assigned, Orphaned)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, TimedOut)
                | (Running, Canceled)
                | (Orphaned, Assigned)
        )
    }
}

crate::text_enum! {
    RunState {
        Pending => "pending",
        Assigned => "assigned",
        Running => "running",
        Succeeded => "succeeded",
        Failed => "failed",
        Canceled => "canceled",
        TimedOut => "timed_out",
        Orphaned => "orphaned",
        Skipped => "skipped",
    }
}

/// Continuation sub-state, orthogonal to [`RunState`].
///
/// `Confirming` is only legal while the run is `Running`; while set, the
/// leader excludes the run from orphan scanning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinuationState {
    #[default]
    None,
    Confirming,
}

crate::text_enum! {
    ContinuationState {
        None => "none",
        Confirming => "confirming",
    }
}

/// One scheduled or triggered execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRun {
    pub id: RunId,
    pub definition_id: DefinitionId,
    /// Starts at 1; incremented on every ORPHANED → ASSIGNED reassignment.
    pub attempt: i32,
    pub scheduled_for: DateTime<Utc>,
    pub state: RunState,
    pub assigned_worker_id: Option<WorkerId>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub error_summary: Option<String>,
    /// Opaque reference to the log body (a path or object key); the body
    /// itself is owned by the log sink, not by this row.
    pub log_ref: Option<String>,
    /// Epoch under which the run was dispatched. Binds terminal closes:
    /// a stale leader's close misses the conditional update.
    pub leader_epoch: Option<Epoch>,
    /// Monotonic, bumped on every update; the optimistic-concurrency guard.
    pub version: i64,
    /// Unique creation key; deduplicates materialization and event intake.
    pub idempotency_key: String,
    pub continuation_state: ContinuationState,
    pub continuation_check_started_at: Option<DateTime<Utc>>,
    pub continuation_check_deadline_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl JobRun {
    /// Idempotency key for a time-materialized run.
    pub fn time_key(definition_id: &DefinitionId, slot: DateTime<Utc>) -> String {
        format!("time:{}:{}", definition_id, slot.timestamp())
    }

    /// Idempotency key for an event-triggered run. The anchor is the
    /// event's dedupe key when present, its id otherwise.
    pub fn event_key(anchor: &str) -> String {
        format!("event:{}", anchor)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
