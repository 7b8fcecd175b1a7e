// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `RunStore` trait: every read and conditional write the engine
//! performs against the relational database.

use crate::error::StoreError;
use crate::types::{AuditEntry, NewRun, RunGuard, RunPatch};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gaffer_core::{DefinitionId, EventId, JobDefinition, JobRun, RunId, RunState, TriggerEvent};
use std::collections::HashMap;

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Idempotent creation: inserts a PENDING row, or returns the existing
    /// row when the idempotency key already exists.
    async fn create_run_if_absent(&self, new: NewRun) -> Result<JobRun, StoreError>;

    /// The conditional-update primitive. Returns the number of rows
    /// affected (0 or 1); 1 is the sole success signal. Bumps `version` on
    /// success. Rejects patches whose target state is not reachable from
    /// the guard's expected state.
    async fn update_run(
        &self,
        id: &RunId,
        guard: &RunGuard,
        patch: &RunPatch,
    ) -> Result<u64, StoreError>;

    async fn get_run(&self, id: &RunId) -> Result<Option<JobRun>, StoreError>;

    /// Runs in `state`, optionally with `scheduled_for <= due_before`,
    /// ordered by `scheduled_for` ascending.
    async fn runs_in_state(
        &self,
        state: RunState,
        due_before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<JobRun>, StoreError>;

    /// Non-terminal runs of one definition (concurrency policy checks).
    async fn active_runs_for(&self, definition_id: &DefinitionId)
        -> Result<Vec<JobRun>, StoreError>;

    /// Most recent time-materialized slot for a definition, the catch-up
    /// anchor for materialization.
    async fn latest_time_slot(
        &self,
        definition_id: &DefinitionId,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    async fn list_definitions(&self) -> Result<Vec<JobDefinition>, StoreError>;

    async fn upsert_definition(&self, definition: &JobDefinition) -> Result<(), StoreError>;

    /// Insert a trigger event. Returns false when a row with the same
    /// dedupe key already exists (the ingestion collapses into it).
    async fn insert_event(&self, event: &TriggerEvent) -> Result<bool, StoreError>;

    /// Unprocessed events, ascending `created_at`, up to `limit`.
    async fn pending_events(&self, limit: i64) -> Result<Vec<TriggerEvent>, StoreError>;

    async fn mark_event_processed(&self, id: &EventId, at: DateTime<Utc>)
        -> Result<(), StoreError>;

    /// Settings overrides as stored (secret filtering is the resolver's
    /// concern, at read time).
    async fn settings(&self) -> Result<HashMap<String, String>, StoreError>;

    async fn put_setting(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn record_audit(&self, entry: AuditEntry) -> Result<(), StoreError>;
}
