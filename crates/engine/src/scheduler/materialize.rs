// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialization of due time-runs from the schedule grid.

use super::MAX_SLOTS_PER_TICK;
use crate::error::RuntimeError;
use crate::runtime::WorkerRuntime;
use chrono::Duration as ChronoDuration;
use gaffer_core::{
    Clock, ConcurrencyPolicy, JobDefinition, JobKind, JobRun, RunId, RunState, Tunables,
};
use gaffer_store::{AuditEntry, AuditKind, NewRun, RunGuard, RunPatch};
use tracing::debug;

impl<C: Clock> WorkerRuntime<C> {
    /// For each enabled time definition, walk the grid from its last
    /// materialized slot up to `now + assign_ahead`. Slots older than the
    /// backlog cutoff become SKIPPED rows with an audit entry instead of
    /// dispatchable work.
    pub(crate) async fn materialize(&self, tunables: &Tunables) -> Result<(), RuntimeError> {
        let now = self.clock.now_utc();
        let horizon = now + ChronoDuration::seconds(tunables.assign_ahead_seconds);
        let cutoff = now - ChronoDuration::seconds(tunables.skip_late_runs_after_seconds);

        let definitions = self.store.list_definitions().await?;
        for def in definitions.iter().filter(|d| d.kind == JobKind::Time && d.enabled) {
            let schedule = match def.schedule.as_ref() {
                Some(schedule) if schedule.validate().is_ok() => schedule,
                _ => {
                    self.audit_unknown_grammar(def).await;
                    continue;
                }
            };

            // Catch-up anchor: just past the newest slot ever created. A
            // definition with no history starts at the current grid point;
            // there is no backlog to account for.
            let anchor = match self.store.latest_time_slot(&def.id).await? {
                Some(latest) => latest + ChronoDuration::seconds(1),
                None => now,
            };

            let mut slot = match schedule.next_fire(anchor, self.config.tz_offset) {
                Ok(slot) => slot,
                Err(_) => {
                    self.audit_unknown_grammar(def).await;
                    continue;
                }
            };

            let mut walked = 0;
            while slot <= horizon && walked < MAX_SLOTS_PER_TICK {
                walked += 1;
                if slot < cutoff {
                    self.skip_slot(def, slot).await?;
                } else {
                    self.materialize_slot(def, slot).await?;
                }
                slot = match schedule
                    .next_fire(slot + ChronoDuration::seconds(1), self.config.tz_offset)
                {
                    Ok(next) => next,
                    Err(_) => break,
                };
            }
        }
        Ok(())
    }

    /// Record a missed slot as SKIPPED for audit without dispatching it.
    async fn skip_slot(
        &self,
        def: &JobDefinition,
        slot: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), RuntimeError> {
        let now = self.clock.now_utc();
        let run = self
            .store
            .create_run_if_absent(NewRun {
                id: RunId::new(),
                definition_id: def.id.clone(),
                scheduled_for: slot,
                idempotency_key: JobRun::time_key(&def.id, slot),
                created_at: now,
            })
            .await?;
        if run.state != RunState::Pending {
            return Ok(());
        }
        let guard = RunGuard::new(RunState::Pending, run.version);
        if self.store.update_run(&run.id, &guard, &RunPatch::skip(now)).await? == 1 {
            self.store
                .record_audit(AuditEntry {
                    at: now,
                    kind: AuditKind::SlotSkipped,
                    subject: run.id.to_string(),
                    detail: format!("{} slot {} past backlog cutoff", def.name, slot.to_rfc3339()),
                })
                .await?;
        }
        Ok(())
    }

    /// Create the PENDING run for one slot, honoring the definition's
    /// concurrency policy.
    async fn materialize_slot(
        &self,
        def: &JobDefinition,
        slot: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), RuntimeError> {
        match def.concurrency {
            ConcurrencyPolicy::Forbid => {
                if !self.store.active_runs_for(&def.id).await?.is_empty() {
                    debug!(definition = %def.name, slot = %slot, "forbid: active run exists, slot not materialized");
                    return Ok(());
                }
            }
            ConcurrencyPolicy::Replace => {
                self.displace_active(def).await?;
            }
            ConcurrencyPolicy::Allow => {}
        }

        self.store
            .create_run_if_absent(NewRun {
                id: RunId::new(),
                definition_id: def.id.clone(),
                scheduled_for: slot,
                idempotency_key: JobRun::time_key(&def.id, slot),
                created_at: self.clock.now_utc(),
            })
            .await?;
        Ok(())
    }

    /// Audit a definition whose stored grammar is unusable, once per
    /// process lifetime.
    pub(crate) async fn audit_unknown_grammar(&self, def: &JobDefinition) {
        if !self.audited_defs.lock().insert(def.id.to_string()) {
            return;
        }
        let _ = self
            .store
            .record_audit(AuditEntry {
                at: self.clock.now_utc(),
                kind: AuditKind::UnknownScheduleGrammar,
                subject: def.id.to_string(),
                detail: format!("definition {} treated as disabled", def.name),
            })
            .await;
    }
}
