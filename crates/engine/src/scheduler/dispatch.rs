// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatch: send StartJob for due ASSIGNED runs and act on the
//! enumerated results.

use super::{BATCH_LIMIT, RPC_DEADLINE};
use crate::error::RuntimeError;
use crate::runtime::WorkerRuntime;
use gaffer_core::{Clock, JobRun, Role, RunState, Tunables};
use gaffer_store::{AuditEntry, AuditKind, RunGuard, RunPatch};
use gaffer_wire::{Request, Response, StartJobResult};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Consecutive transport failures before a worker is declared
/// unreachable and its runs put on the reassignment path.
const MAX_TRANSPORT_FAILURES: u32 = 3;

impl<C: Clock> WorkerRuntime<C> {
    /// Returns true when a rejection proved this leader stale and it
    /// stepped down mid-dispatch.
    pub(crate) async fn dispatch(&self, _tunables: &Tunables) -> Result<bool, RuntimeError> {
        let now = self.clock.now_utc();
        let assigned = self.store.runs_in_state(RunState::Assigned, Some(now), BATCH_LIMIT).await?;
        if assigned.is_empty() {
            return Ok(false);
        }

        let directory: HashMap<String, _> = self
            .coord
            .scan_workers()
            .await?
            .into_iter()
            .map(|e| (e.worker_id.to_string(), e))
            .collect();
        let definitions: HashMap<String, _> = self
            .store
            .list_definitions()
            .await?
            .into_iter()
            .map(|d| (d.id.to_string(), d))
            .collect();
        let epoch = self.lock_state(|state| state.leader_epoch);

        for run in assigned {
            let Some(worker) = run.assigned_worker_id.clone() else {
                continue;
            };
            let Some(entry) = directory.get(worker.as_str()) else {
                // Gone from the directory; the reconcile pass decides.
                continue;
            };
            let Some(def) = definitions.get(run.definition_id.as_str()) else {
                warn!(run_id = %run.id, "assigned run references unknown definition");
                continue;
            };

            let request = Request::StartJob {
                job_run_id: run.id.clone(),
                command_name: def.command.clone(),
                args: def.default_args.clone(),
                timeout_seconds: def.timeout_seconds,
                attempt: run.attempt,
                leader_epoch: epoch,
                caller_role: Role::Leader,
            };

            match self.peers.call(&entry.addr(), request, RPC_DEADLINE).await {
                Ok(Response::StartJob { result: StartJobResult::Accepted }) => {
                    self.dispatch_failures.lock().remove(worker.as_str());
                }
                Ok(Response::StartJob { result: StartJobResult::RejectedOldEpoch }) => {
                    // The worker has seen a newer epoch: this leader is
                    // stale and must stop scheduling at once.
                    self.demote("dispatch rejected: old epoch").await;
                    return Ok(true);
                }
                Ok(Response::StartJob {
                    result:
                        result @ (StartJobResult::RejectedDetached
                        | StartJobResult::RejectedDraining
                        | StartJobResult::RejectedAlreadyRunning),
                }) => {
                    debug!(run_id = %run.id, worker = %worker, %result, "dispatch rejected, reassigning");
                    self.orphan_for_reassignment(&run).await?;
                }
                Ok(Response::StartJob { result: StartJobResult::RejectedInvalid }) => {
                    // The worker's view of the row disagrees with ours;
                    // re-read next tick rather than act blindly.
                    debug!(run_id = %run.id, worker = %worker, "dispatch rejected as invalid");
                }
                Ok(other) => {
                    warn!(run_id = %run.id, response = ?other, "unexpected dispatch response");
                }
                Err(e) => {
                    let failures = {
                        let mut map = self.dispatch_failures.lock();
                        let count = map.entry(worker.to_string()).or_insert(0);
                        *count += 1;
                        *count
                    };
                    debug!(run_id = %run.id, worker = %worker, failures, error = %e, "dispatch transport failure");
                    if failures >= MAX_TRANSPORT_FAILURES {
                        warn!(worker = %worker, "worker unreachable, reassigning its dispatch");
                        self.orphan_for_reassignment(&run).await?;
                        self.dispatch_failures.lock().remove(worker.as_str());
                    }
                }
            }
        }
        Ok(false)
    }

    /// Put an ASSIGNED run back on the reassignment path.
    async fn orphan_for_reassignment(&self, run: &JobRun) -> Result<(), RuntimeError> {
        let guard = RunGuard::new(RunState::Assigned, run.version);
        let rows = self.store.update_run(&run.id, &guard, &RunPatch::orphan()).await?;
        if rows == 0 {
            self.store
                .record_audit(AuditEntry {
                    at: self.clock.now_utc(),
                    kind: AuditKind::ConditionalMiss,
                    subject: run.id.to_string(),
                    detail: "orphan transition missed; row moved on".to_string(),
                })
                .await?;
        }
        Ok(())
    }
}
