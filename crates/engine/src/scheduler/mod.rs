// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The leader tick: materialize, intake, assign, dispatch, reconcile.
//!
//! Each phase is a separate module and its own method so tests can drive
//! them independently; `leader_tick` runs them in this order on every
//! pass.

mod assign;
mod dispatch;
mod intake;
mod materialize;
mod reconcile;

#[cfg(test)]
pub(crate) use assign::sort_candidates;

use crate::error::RuntimeError;
use crate::runtime::WorkerRuntime;
use gaffer_coord::keys;
use gaffer_core::{Clock, ConcurrencyPolicy, JobDefinition, Role, RunState};
use gaffer_store::{RunGuard, RunPatch};
use std::time::Duration;

/// Per-tick bound on rows pulled into each phase.
pub(crate) const BATCH_LIMIT: i64 = 64;

/// Per-tick bound on grid slots walked per definition; a longer backlog
/// carries over to the next tick.
pub(crate) const MAX_SLOTS_PER_TICK: usize = 512;

/// Deadline for leader-issued control-plane calls.
pub(crate) const RPC_DEADLINE: Duration = Duration::from_secs(2);

/// TTL of the short-lived per-run assignment lease.
pub(crate) const RUN_LEASE_TTL: Duration = Duration::from_secs(5);

impl<C: Clock> WorkerRuntime<C> {
    /// One pass of the leader loop. A no-op unless this worker holds the
    /// leader role.
    pub async fn leader_tick(&self) -> Result<(), RuntimeError> {
        if self.role() != Role::Leader {
            return Ok(());
        }
        let tunables = self.tunables().await;

        self.coord
            .put(keys::LEADER_LAST_SEEN, &self.clock.epoch_ms().to_string())
            .await?;

        self.materialize(&tunables).await?;
        self.intake_events(&tunables).await?;
        self.assign(&tunables).await?;
        let demoted = self.dispatch(&tunables).await?;
        if demoted {
            return Ok(());
        }
        self.reconcile(&tunables).await?;
        Ok(())
    }

    /// Enforce the `replace` policy: displace every non-terminal run of
    /// the definition before a new one is dispatched. Pending rows are
    /// skipped; assigned and running rows are canceled durably and, where
    /// a worker holds them, told to stop.
    pub(crate) async fn displace_active(&self, def: &JobDefinition) -> Result<(), RuntimeError> {
        debug_assert_eq!(def.concurrency, ConcurrencyPolicy::Replace);
        let now = self.clock.now_utc();
        for run in self.store.active_runs_for(&def.id).await? {
            match run.state {
                RunState::Pending => {
                    let guard = RunGuard::new(RunState::Pending, run.version);
                    let _ = self.store.update_run(&run.id, &guard, &RunPatch::skip(now)).await?;
                }
                RunState::Assigned | RunState::Running => {
                    self.leader_cancel(&run, "replaced by a newer run").await?;
                }
                // Orphaned rows are picked up by reassignment and then
                // displaced on the next pass if still in the way.
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../scheduler_tests/mod.rs"]
mod tests;
