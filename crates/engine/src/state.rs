// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker's small mutable state, serialized by one mutex.
//!
//! Loops and RPC handlers read and write through short lock scopes; the
//! lock is never held across a network call.

use gaffer_core::{Epoch, Role, RunId, WorkerId};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Why an in-flight run is being torn down. Decides the terminal state the
/// driver writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AbortCause {
    /// Leader- or operator-initiated CancelJob.
    Canceled { reason: String },
    /// Continuation denied or coordinator unreachable after detach.
    ContinuationAbort { reason: String },
}

/// Supervision handle for one in-flight run.
#[derive(Debug)]
pub(crate) struct RunHandle {
    /// Epoch the dispatching leader stamped on the run row.
    pub dispatch_epoch: Epoch,
    pub cancel: CancellationToken,
    pub abort_cause: Option<AbortCause>,
}

/// Mutable worker state behind the runtime's mutex.
#[derive(Debug)]
pub(crate) struct RuntimeState {
    pub worker_id: WorkerId,
    pub role: Role,
    /// Highest epoch this worker has seen in any accepted command.
    pub observed_epoch: Epoch,
    /// Epoch this worker holds as leader (meaningful while role is Leader).
    pub leader_epoch: Epoch,
    pub runs: HashMap<RunId, RunHandle>,
    pub draining: bool,
    pub detached: bool,
    /// Wall-clock ms of this incarnation's registration. The detach flag
    /// is honored only past the configured grace age.
    pub registered_at_ms: u64,
    /// Consecutive failed leader probes (sub-leader monitor).
    pub monitor_failures: u32,
}

impl RuntimeState {
    pub fn new(worker_id: WorkerId, registered_at_ms: u64) -> Self {
        Self {
            worker_id,
            role: Role::Worker,
            observed_epoch: 0,
            leader_epoch: 0,
            runs: HashMap::new(),
            draining: false,
            detached: false,
            registered_at_ms,
            monitor_failures: 0,
        }
    }

    pub fn load(&self) -> u32 {
        self.runs.len() as u32
    }

    /// Any in-flight run id, for the directory entry's `current_job_run_id`.
    pub fn current_run_id(&self) -> Option<RunId> {
        self.runs.keys().next().cloned()
    }

    /// Advance the observed epoch; it never regresses.
    pub fn observe_epoch(&mut self, epoch: Epoch) {
        if epoch > self.observed_epoch {
            self.observed_epoch = epoch;
        }
    }
}
