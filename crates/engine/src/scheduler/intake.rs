// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event intake: turn unprocessed trigger events into PENDING runs.
//!
//! The run insert is the idempotency anchor (`event:{dedupe_key|id}`);
//! the event is marked processed after the insert. A crash in between
//! re-processes the event and the unique key deduplicates.

use super::BATCH_LIMIT;
use crate::error::RuntimeError;
use crate::runtime::WorkerRuntime;
use gaffer_core::{Clock, ConcurrencyPolicy, JobKind, JobRun, RunId, Tunables};
use gaffer_store::{AuditEntry, AuditKind, NewRun};
use std::collections::HashMap;
use tracing::debug;

impl<C: Clock> WorkerRuntime<C> {
    pub(crate) async fn intake_events(&self, _tunables: &Tunables) -> Result<(), RuntimeError> {
        let events = self.store.pending_events(BATCH_LIMIT).await?;
        if events.is_empty() {
            return Ok(());
        }
        let now = self.clock.now_utc();

        // An event's type selects the enabled event-kind definition with
        // that name.
        let definitions = self.store.list_definitions().await?;
        let by_name: HashMap<&str, _> = definitions
            .iter()
            .filter(|d| d.kind == JobKind::Event && d.enabled)
            .map(|d| (d.name.as_str(), d))
            .collect();

        for event in events {
            let Some(def) = by_name.get(event.event_type.as_str()) else {
                self.store
                    .record_audit(AuditEntry {
                        at: now,
                        kind: AuditKind::UnknownEventType,
                        subject: event.id.to_string(),
                        detail: format!("no enabled event definition named {:?}", event.event_type),
                    })
                    .await?;
                self.store.mark_event_processed(&event.id, now).await?;
                continue;
            };

            match def.concurrency {
                ConcurrencyPolicy::Forbid => {
                    if !self.store.active_runs_for(&def.id).await?.is_empty() {
                        // Leave the event unprocessed; it is retried once
                        // the active run reaches a terminal state.
                        debug!(event = %event.id, definition = %def.name, "forbid: event intake deferred");
                        continue;
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
                    scheduled_for: now,
                    idempotency_key: JobRun::event_key(event.run_anchor()),
                    created_at: now,
                })
                .await?;
            self.store.mark_event_processed(&event.id, now).await?;
        }
        Ok(())
    }
}
