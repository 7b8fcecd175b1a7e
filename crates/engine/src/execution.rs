// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker-side execution: accepting dispatches, driving subprocesses to a
//! terminal state, and the two cancel paths (worker-held run vs
//! leader-side durable cancel).

use crate::error::RuntimeError;
use crate::executor::{ExecOutcome, ExecSpec};
use crate::runtime::WorkerRuntime;
use crate::scheduler::RPC_DEADLINE;
use crate::state::{AbortCause, RunHandle};
use gaffer_core::{Clock, Epoch, JobRun, Role, RunId, RunState};
use gaffer_store::{AuditEntry, AuditKind, RunGuard, RunPatch};
use gaffer_wire::{CancelJobResult, Request, StartJobResult};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pause between SIGTERM and SIGKILL when tearing a subprocess down.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Cap on the error summary written into the run row.
const SUMMARY_MAX_BYTES: usize = 1024;

impl<C: Clock> WorkerRuntime<C> {
    /// Handle an inbound StartJob. Idempotent: a duplicate for a run this
    /// worker already holds answers Accepted again.
    pub(crate) async fn handle_start_job(
        self: &Arc<Self>,
        job_run_id: RunId,
        command_name: String,
        args: Map<String, Value>,
        timeout_seconds: u32,
        attempt: i32,
        leader_epoch: Epoch,
    ) -> StartJobResult {
        let tunables = self.tunables().await;

        // Fast gate on local state; the epoch comparison is the fencing
        // check of property 8.
        let gate = self.lock_state_mut(|state| {
            if state.runs.contains_key(&job_run_id) {
                return Some(StartJobResult::Accepted);
            }
            if leader_epoch < state.observed_epoch {
                return Some(StartJobResult::RejectedOldEpoch);
            }
            if state.detached {
                return Some(StartJobResult::RejectedDetached);
            }
            if state.draining {
                return Some(StartJobResult::RejectedDraining);
            }
            if state.load() >= tunables.max_jobs_per_worker {
                return Some(StartJobResult::RejectedAlreadyRunning);
            }
            state.observe_epoch(leader_epoch);
            None
        });
        if let Some(result) = gate {
            return result;
        }

        let worker_id = self.worker_id();

        // The durable row must agree: assigned to us, under this epoch.
        let run = match self.store.get_run(&job_run_id).await {
            Ok(Some(run)) => run,
            Ok(None) => return StartJobResult::RejectedInvalid,
            Err(e) => {
                warn!(run_id = %job_run_id, error = %e, "start: run read failed");
                return StartJobResult::RejectedInvalid;
            }
        };
        if run.state == RunState::Running && run.assigned_worker_id.as_ref() == Some(&worker_id) {
            return StartJobResult::Accepted;
        }
        if run.state != RunState::Assigned
            || run.assigned_worker_id.as_ref() != Some(&worker_id)
            || run.leader_epoch != Some(leader_epoch)
        {
            return StartJobResult::RejectedInvalid;
        }

        let guard = RunGuard::new(RunState::Assigned, run.version)
            .expected_worker(worker_id.clone())
            .expected_epoch(leader_epoch);
        let patch = RunPatch::start(self.clock.now_utc());
        match self.store.update_run(&job_run_id, &guard, &patch).await {
            Ok(1) => {}
            Ok(_) => {
                // Lost the transition; if a twin handler on this worker
                // won it, the run is ours after all.
                return match self.store.get_run(&job_run_id).await {
                    Ok(Some(run))
                        if run.state == RunState::Running
                            && run.assigned_worker_id.as_ref() == Some(&worker_id) =>
                    {
                        StartJobResult::Accepted
                    }
                    _ => StartJobResult::RejectedInvalid,
                };
            }
            Err(e) => {
                warn!(run_id = %job_run_id, error = %e, "start transition failed");
                return StartJobResult::RejectedInvalid;
            }
        }

        let cancel = CancellationToken::new();
        let inserted = self.lock_state_mut(|state| {
            if state.runs.contains_key(&job_run_id) {
                false
            } else {
                state.runs.insert(
                    job_run_id.clone(),
                    RunHandle {
                        dispatch_epoch: leader_epoch,
                        cancel: cancel.clone(),
                        abort_cause: None,
                    },
                );
                true
            }
        });
        if !inserted {
            return StartJobResult::Accepted;
        }

        let spec = ExecSpec {
            run_id: job_run_id.clone(),
            command: command_name,
            args,
            attempt,
            timeout: Duration::from_secs(u64::from(timeout_seconds)),
            grace: KILL_GRACE,
            log_dir: self.config.log_dir.clone(),
        };
        let runtime = Arc::clone(self);
        tokio::spawn(async move {
            runtime.drive_run(job_run_id, leader_epoch, spec, cancel).await;
        });
        StartJobResult::Accepted
    }

    /// Supervise one subprocess to its terminal row update.
    pub(crate) async fn drive_run(
        self: Arc<Self>,
        run_id: RunId,
        dispatch_epoch: Epoch,
        spec: ExecSpec,
        cancel: CancellationToken,
    ) {
        let timeout_seconds = spec.timeout.as_secs();
        let outcome = self.executor.run(spec, cancel).await;

        let (worker_id, cause) = self.lock_state(|state| {
            let cause = state.runs.get(&run_id).and_then(|h| h.abort_cause.clone());
            (state.worker_id.clone(), cause)
        });

        let (state, exit_code, summary, log_ref) = match outcome {
            ExecOutcome::Exited { exit_code: 0, log_ref, .. } => {
                (RunState::Succeeded, Some(0), None, log_ref)
            }
            ExecOutcome::Exited { exit_code, log_ref, stderr_tail } => {
                let summary = clip(&format!("exit {}: {}", exit_code, stderr_tail.trim()));
                (RunState::Failed, Some(exit_code), Some(summary), log_ref)
            }
            ExecOutcome::TimedOut { log_ref } => {
                let summary = format!("timed out after {}s", timeout_seconds);
                (RunState::TimedOut, None, Some(summary), log_ref)
            }
            ExecOutcome::Canceled { log_ref } => match cause {
                Some(AbortCause::ContinuationAbort { reason }) => {
                    let summary = format!("aborted after detach: {}", reason);
                    (RunState::Failed, None, Some(summary), log_ref)
                }
                Some(AbortCause::Canceled { reason }) => {
                    (RunState::Canceled, None, Some(reason), log_ref)
                }
                None => (RunState::Canceled, None, Some("canceled".to_string()), log_ref),
            },
            ExecOutcome::SpawnFailed { error } => (RunState::Failed, None, Some(clip(&error)), None),
        };

        let patch = RunPatch::finish(state, self.clock.now_utc(), exit_code, summary, log_ref);
        self.write_terminal(&run_id, dispatch_epoch, &worker_id, patch).await;

        self.lock_state_mut(|state| {
            state.runs.remove(&run_id);
        });
    }

    /// RUNNING → terminal, fenced by worker id and dispatch epoch. A miss
    /// is a no-op recorded at audit level (the transition already went the
    /// other way, e.g. a leader cancel won).
    async fn write_terminal(
        &self,
        run_id: &RunId,
        dispatch_epoch: Epoch,
        worker_id: &gaffer_core::WorkerId,
        patch: RunPatch,
    ) {
        let run = match self.store.get_run(run_id).await {
            Ok(Some(run)) => run,
            Ok(None) => return,
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "terminal write: run read failed");
                return;
            }
        };
        if run.state != RunState::Running {
            self.audit_miss(run_id, &format!("terminal write found state {}", run.state)).await;
            return;
        }
        let guard = RunGuard::new(RunState::Running, run.version)
            .expected_worker(worker_id.clone())
            .expected_epoch(dispatch_epoch);
        match self.store.update_run(run_id, &guard, &patch).await {
            Ok(1) => {
                info!(run_id = %run_id, state = %patch.state.unwrap_or(RunState::Running), "run finished");
            }
            Ok(_) => self.audit_miss(run_id, "terminal conditional update missed").await,
            Err(e) => warn!(run_id = %run_id, error = %e, "terminal write failed"),
        }
    }

    async fn audit_miss(&self, run_id: &RunId, detail: &str) {
        let _ = self
            .store
            .record_audit(AuditEntry {
                at: self.clock.now_utc(),
                kind: AuditKind::ConditionalMiss,
                subject: run_id.to_string(),
                detail: detail.to_string(),
            })
            .await;
    }

    /// Handle an inbound CancelJob.
    pub(crate) async fn handle_cancel(
        self: &Arc<Self>,
        job_run_id: RunId,
        reason: String,
        leader_epoch: Epoch,
    ) -> CancelJobResult {
        let gate = self.lock_state_mut(|state| {
            if leader_epoch < state.observed_epoch {
                return Some(CancelJobResult::RejectedOldEpoch);
            }
            state.observe_epoch(leader_epoch);
            if let Some(handle) = state.runs.get_mut(&job_run_id) {
                if handle.abort_cause.is_none() {
                    handle.abort_cause = Some(AbortCause::Canceled { reason: reason.clone() });
                }
                handle.cancel.cancel();
                return Some(CancelJobResult::Accepted);
            }
            None
        });
        if let Some(result) = gate {
            return result;
        }

        // Not held here. A leader answers for the durable row; anyone else
        // only knows what the store says.
        match self.store.get_run(&job_run_id).await {
            Ok(Some(run)) if run.is_terminal() => CancelJobResult::AlreadyFinished,
            Ok(Some(run)) if self.role() == Role::Leader => {
                match self.leader_cancel(&run, &reason).await {
                    Ok(()) => CancelJobResult::Accepted,
                    Err(e) => {
                        warn!(run_id = %job_run_id, error = %e, "leader cancel failed");
                        CancelJobResult::NotFound
                    }
                }
            }
            Ok(Some(_)) | Ok(None) => CancelJobResult::NotFound,
            Err(e) => {
                warn!(run_id = %job_run_id, error = %e, "cancel: run read failed");
                CancelJobResult::NotFound
            }
        }
    }

    /// Leader-side durable cancel plus best-effort teardown on the worker
    /// holding the run.
    pub(crate) async fn leader_cancel(&self, run: &JobRun, reason: &str) -> Result<(), RuntimeError> {
        let now = self.clock.now_utc();
        let epoch = self.lock_state(|state| state.leader_epoch);
        match run.state {
            RunState::Pending => {
                // The table has no PENDING → CANCELED edge; an unwanted
                // pending run is recorded as skipped.
                let guard = RunGuard::new(RunState::Pending, run.version);
                let _ = self.store.update_run(&run.id, &guard, &RunPatch::skip(now)).await?;
                return Ok(());
            }
            RunState::Assigned | RunState::Running => {
                let guard = RunGuard::new(run.state, run.version);
                let rows = self
                    .store
                    .update_run(&run.id, &guard, &RunPatch::cancel(now, reason.to_string()))
                    .await?;
                if rows == 0 {
                    debug!(run_id = %run.id, "cancel lost the conditional update");
                    return Ok(());
                }
            }
            _ => return Ok(()),
        }

        // Tell the holder to stop its subprocess. Its own terminal write
        // will miss (the row is already CANCELED), which is the design.
        if let Some(worker) = run.assigned_worker_id.as_ref() {
            if let Ok(entries) = self.coord.scan_workers().await {
                if let Some(entry) = entries.iter().find(|e| &e.worker_id == worker) {
                    let request = Request::CancelJob {
                        job_run_id: run.id.clone(),
                        reason: reason.to_string(),
                        leader_epoch: epoch,
                        caller_role: Role::Leader,
                    };
                    let _ = self.peers.call(&entry.addr(), request, RPC_DEADLINE).await;
                }
            }
        }
        Ok(())
    }

    /// Enable or disable draining.
    pub(crate) fn handle_drain(&self, enable: bool, leader_epoch: Epoch) -> bool {
        self.lock_state_mut(|state| {
            state.observe_epoch(leader_epoch);
            state.draining = enable;
            state.draining
        })
    }
}

fn clip(s: &str) -> String {
    if s.len() <= SUMMARY_MAX_BYTES {
        return s.to_string();
    }
    let mut end = SUMMARY_MAX_BYTES;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
#[path = "execution_tests.rs"]
mod tests;
