// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory run store for tests. Same conditional-update semantics as the
//! PostgreSQL store: guard columns enumerated, version bumped, one winner.

use crate::error::StoreError;
use crate::store::RunStore;
use crate::types::{AuditEntry, NewRun, RunGuard, RunPatch};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gaffer_core::{
    ContinuationState, DefinitionId, EventId, JobDefinition, JobRun, RunId, RunState, TriggerEvent,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct Inner {
    runs: HashMap<String, JobRun>,
    /// idempotency_key → run id
    run_keys: HashMap<String, String>,
    definitions: Vec<JobDefinition>,
    events: Vec<TriggerEvent>,
    settings: HashMap<String, String>,
    audit: Vec<AuditEntry>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every run row, unordered (test assertions).
    pub fn all_runs(&self) -> Vec<JobRun> {
        self.inner.lock().runs.values().cloned().collect()
    }

    /// Recorded audit entries (test assertions).
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.inner.lock().audit.clone()
    }
}

fn apply_patch(run: &mut JobRun, patch: &RunPatch) {
    run.version += 1;
    if let Some(state) = patch.state {
        run.state = state;
    }
    if let Some(worker) = &patch.assigned_worker_id {
        run.assigned_worker_id = worker.clone();
    }
    if let Some(at) = patch.assigned_at {
        run.assigned_at = Some(at);
    }
    if let Some(at) = patch.started_at {
        run.started_at = Some(at);
    }
    if let Some(at) = patch.finished_at {
        run.finished_at = Some(at);
    }
    if let Some(code) = patch.exit_code {
        run.exit_code = Some(code);
    }
    if let Some(summary) = &patch.error_summary {
        run.error_summary = Some(summary.clone());
    }
    if let Some(log_ref) = &patch.log_ref {
        run.log_ref = Some(log_ref.clone());
    }
    if let Some(epoch) = patch.leader_epoch {
        run.leader_epoch = Some(epoch);
    }
    if let Some(attempt) = patch.attempt {
        run.attempt = attempt;
    }
    if let Some(continuation) = patch.continuation_state {
        run.continuation_state = continuation;
    }
    if let Some(at) = &patch.continuation_check_started_at {
        run.continuation_check_started_at = *at;
    }
    if let Some(at) = &patch.continuation_check_deadline_at {
        run.continuation_check_deadline_at = *at;
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn create_run_if_absent(&self, new: NewRun) -> Result<JobRun, StoreError> {
        let mut inner = self.inner.lock();
        if let Some(existing_id) = inner.run_keys.get(&new.idempotency_key) {
            let existing = inner.runs.get(existing_id).cloned();
            if let Some(run) = existing {
                return Ok(run);
            }
        }
        let run = JobRun {
            id: new.id.clone(),
            definition_id: new.definition_id,
            attempt: 1,
            scheduled_for: new.scheduled_for,
            state: RunState::Pending,
            assigned_worker_id: None,
            assigned_at: None,
            started_at: None,
            finished_at: None,
            exit_code: None,
            error_summary: None,
            log_ref: None,
            leader_epoch: None,
            version: 1,
            idempotency_key: new.idempotency_key.clone(),
            continuation_state: ContinuationState::None,
            continuation_check_started_at: None,
            continuation_check_deadline_at: None,
            created_at: new.created_at,
        };
        inner.run_keys.insert(new.idempotency_key, new.id.as_str().to_string());
        inner.runs.insert(new.id.as_str().to_string(), run.clone());
        Ok(run)
    }

    async fn update_run(
        &self,
        id: &RunId,
        guard: &RunGuard,
        patch: &RunPatch,
    ) -> Result<u64, StoreError> {
        if let Some(to) = patch.state {
            if !guard.expected_state.can_transition(to) {
                return Err(StoreError::IllegalTransition { from: guard.expected_state, to });
            }
        }
        let mut inner = self.inner.lock();
        let Some(run) = inner.runs.get_mut(id.as_str()) else {
            return Ok(0);
        };
        if run.state != guard.expected_state || run.version != guard.expected_version {
            return Ok(0);
        }
        if let Some(worker) = &guard.expected_worker {
            if run.assigned_worker_id.as_ref() != Some(worker) {
                return Ok(0);
            }
        }
        if let Some(epoch) = guard.expected_epoch {
            if run.leader_epoch != Some(epoch) {
                return Ok(0);
            }
        }
        apply_patch(run, patch);
        Ok(1)
    }

    async fn get_run(&self, id: &RunId) -> Result<Option<JobRun>, StoreError> {
        Ok(self.inner.lock().runs.get(id.as_str()).cloned())
    }

    async fn runs_in_state(
        &self,
        state: RunState,
        due_before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<JobRun>, StoreError> {
        let inner = self.inner.lock();
        let mut runs: Vec<JobRun> = inner
            .runs
            .values()
            .filter(|r| r.state == state)
            .filter(|r| due_before.map_or(true, |due| r.scheduled_for <= due))
            .cloned()
            .collect();
        runs.sort_by_key(|r| r.scheduled_for);
        runs.truncate(limit.max(0) as usize);
        Ok(runs)
    }

    async fn active_runs_for(
        &self,
        definition_id: &DefinitionId,
    ) -> Result<Vec<JobRun>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .runs
            .values()
            .filter(|r| &r.definition_id == definition_id && !r.state.is_terminal())
            .cloned()
            .collect())
    }

    async fn latest_time_slot(
        &self,
        definition_id: &DefinitionId,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .runs
            .values()
            .filter(|r| &r.definition_id == definition_id && r.idempotency_key.starts_with("time:"))
            .map(|r| r.scheduled_for)
            .max())
    }

    async fn list_definitions(&self) -> Result<Vec<JobDefinition>, StoreError> {
        Ok(self.inner.lock().definitions.clone())
    }

    async fn upsert_definition(&self, definition: &JobDefinition) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.definitions.iter_mut().find(|d| d.id == definition.id) {
            *existing = definition.clone();
        } else {
            inner.definitions.push(definition.clone());
        }
        Ok(())
    }

    async fn insert_event(&self, event: &TriggerEvent) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        if let Some(key) = &event.dedupe_key {
            if inner.events.iter().any(|e| e.dedupe_key.as_ref() == Some(key)) {
                return Ok(false);
            }
        }
        if inner.events.iter().any(|e| e.id == event.id) {
            return Ok(false);
        }
        inner.events.push(event.clone());
        Ok(true)
    }

    async fn pending_events(&self, limit: i64) -> Result<Vec<TriggerEvent>, StoreError> {
        let inner = self.inner.lock();
        let mut events: Vec<TriggerEvent> =
            inner.events.iter().filter(|e| e.processed_at.is_none()).cloned().collect();
        events.sort_by_key(|e| e.created_at);
        events.truncate(limit.max(0) as usize);
        Ok(events)
    }

    async fn mark_event_processed(
        &self,
        id: &EventId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if let Some(event) = inner.events.iter_mut().find(|e| &e.id == id) {
            if event.processed_at.is_none() {
                event.processed_at = Some(at);
            }
        }
        Ok(())
    }

    async fn settings(&self) -> Result<HashMap<String, String>, StoreError> {
        Ok(self.inner.lock().settings.clone())
    }

    async fn put_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.lock().settings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn record_audit(&self, entry: AuditEntry) -> Result<(), StoreError> {
        self.inner.lock().audit.push(entry);
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
