// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inputs to the store: new-run rows, conditional-update guards and
//! patches, audit entries.

use chrono::{DateTime, Utc};
use gaffer_core::{ContinuationState, DefinitionId, Epoch, RunId, RunState, WorkerId};
use serde::{Deserialize, Serialize};

/// Row inserted by `create_run_if_absent`.
#[derive(Debug, Clone)]
pub struct NewRun {
    pub id: RunId,
    pub definition_id: DefinitionId,
    pub scheduled_for: DateTime<Utc>,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

/// Expected columns for a conditional update. The WHERE clause enumerates
/// exactly these; at most one caller observes `rows_affected == 1` per
/// transition.
#[derive(Debug, Clone)]
pub struct RunGuard {
    pub expected_state: RunState,
    pub expected_version: i64,
    pub expected_worker: Option<WorkerId>,
    pub expected_epoch: Option<Epoch>,
}

impl RunGuard {
    pub fn new(expected_state: RunState, expected_version: i64) -> Self {
        Self { expected_state, expected_version, expected_worker: None, expected_epoch: None }
    }

    /// Additionally require the row to be assigned to `worker`.
    pub fn expected_worker(mut self, worker: impl Into<WorkerId>) -> Self {
        self.expected_worker = Some(worker.into());
        self
    }

    /// Additionally require the row's `leader_epoch` to match.
    pub fn expected_epoch(mut self, epoch: Epoch) -> Self {
        self.expected_epoch = Some(epoch);
        self
    }
}

/// Fields written by a conditional update. `version` is always bumped by
/// the store itself and never appears here.
#[derive(Debug, Clone, Default)]
pub struct RunPatch {
    pub state: Option<RunState>,
    /// `Some(None)` clears the column.
    pub assigned_worker_id: Option<Option<WorkerId>>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub error_summary: Option<String>,
    pub log_ref: Option<String>,
    pub leader_epoch: Option<Epoch>,
    pub attempt: Option<i32>,
    pub continuation_state: Option<ContinuationState>,
    pub continuation_check_started_at: Option<Option<DateTime<Utc>>>,
    pub continuation_check_deadline_at: Option<Option<DateTime<Utc>>>,
}

impl RunPatch {
    /// PENDING → ASSIGNED: bind the worker and the dispatching epoch.
    pub fn assign(worker: WorkerId, at: DateTime<Utc>, epoch: Epoch) -> Self {
        Self {
            state: Some(RunState::Assigned),
            assigned_worker_id: Some(Some(worker)),
            assigned_at: Some(at),
            leader_epoch: Some(epoch),
            ..Self::default()
        }
    }

    /// ORPHANED → ASSIGNED: fresh worker, bumped attempt.
    pub fn reassign(worker: WorkerId, at: DateTime<Utc>, epoch: Epoch, attempt: i32) -> Self {
        Self { attempt: Some(attempt), ..Self::assign(worker, at, epoch) }
    }

    /// ASSIGNED → RUNNING on the executing worker.
    pub fn start(at: DateTime<Utc>) -> Self {
        Self { state: Some(RunState::Running), started_at: Some(at), ..Self::default() }
    }

    /// RUNNING → terminal with the execution outcome.
    pub fn finish(
        state: RunState,
        at: DateTime<Utc>,
        exit_code: Option<i32>,
        error_summary: Option<String>,
        log_ref: Option<String>,
    ) -> Self {
        Self {
            state: Some(state),
            finished_at: Some(at),
            exit_code,
            error_summary,
            log_ref,
            continuation_state: Some(ContinuationState::None),
            continuation_check_started_at: Some(None),
            continuation_check_deadline_at: Some(None),
            ..Self::default()
        }
    }

    /// ASSIGNED/RUNNING → CANCELED, leader- or operator-initiated.
    pub fn cancel(at: DateTime<Utc>, reason: String) -> Self {
        Self {
            state: Some(RunState::Canceled),
            finished_at: Some(at),
            error_summary: Some(reason),
            continuation_state: Some(ContinuationState::None),
            continuation_check_started_at: Some(None),
            continuation_check_deadline_at: Some(None),
            ..Self::default()
        }
    }

    /// ASSIGNED → ORPHANED.
    pub fn orphan() -> Self {
        Self { state: Some(RunState::Orphaned), ..Self::default() }
    }

    /// PENDING → SKIPPED for slots past the backlog cutoff.
    pub fn skip(at: DateTime<Utc>) -> Self {
        Self { state: Some(RunState::Skipped), finished_at: Some(at), ..Self::default() }
    }

    /// Enter the continuation check (state untouched).
    pub fn confirming(started: DateTime<Utc>, deadline: DateTime<Utc>) -> Self {
        Self {
            continuation_state: Some(ContinuationState::Confirming),
            continuation_check_started_at: Some(Some(started)),
            continuation_check_deadline_at: Some(Some(deadline)),
            ..Self::default()
        }
    }

    /// Leave the continuation check (state untouched).
    pub fn continuation_cleared() -> Self {
        Self {
            continuation_state: Some(ContinuationState::None),
            continuation_check_started_at: Some(None),
            continuation_check_deadline_at: Some(None),
            ..Self::default()
        }
    }
}

/// What an audit row records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    SlotSkipped,
    UnknownEventType,
    UnknownScheduleGrammar,
    ConditionalMiss,
    Promotion,
    Demotion,
}

gaffer_core::text_enum! {
    AuditKind {
        SlotSkipped => "slot_skipped",
        UnknownEventType => "unknown_event_type",
        UnknownScheduleGrammar => "unknown_schedule_grammar",
        ConditionalMiss => "conditional_miss",
        Promotion => "promotion",
        Demotion => "demotion",
    }
}

/// One audit-trail row. Durable-state oddities are recorded here and
/// nowhere else; they never surface to external callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub kind: AuditKind,
    /// What the entry is about (a run id, definition id, worker id…).
    pub subject: String,
    pub detail: String,
}
