// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use gaffer_core::{Epoch, NodeId, Role, RunId, WorkerId};
use serde::{Deserialize, Serialize};

/// Outcome of a `StartJob` request. The set is closed; the dispatcher
/// switches on it deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartJobResult {
    Accepted,
    RejectedOldEpoch,
    RejectedDetached,
    RejectedDraining,
    RejectedAlreadyRunning,
    RejectedInvalid,
}

gaffer_core::text_enum! {
    StartJobResult {
        Accepted => "accepted",
        RejectedOldEpoch => "rejected_old_epoch",
        RejectedDetached => "rejected_detached",
        RejectedDraining => "rejected_draining",
        RejectedAlreadyRunning => "rejected_already_running",
        RejectedInvalid => "rejected_invalid",
    }
}

/// Outcome of a `CancelJob` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelJobResult {
    Accepted,
    RejectedOldEpoch,
    NotFound,
    AlreadyFinished,
}

/// Answer to a `ConfirmContinuation` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinuationVerdict {
    AllowContinue,
    MustAbort,
}

/// Full worker state, as returned by `GetStatus`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub worker_id: WorkerId,
    pub node_id: NodeId,
    pub role: Role,
    pub observed_epoch: Epoch,
    pub load: u32,
    pub current_run_id: Option<RunId>,
    pub detached: bool,
    pub draining: bool,
    pub last_heartbeat_ms: u64,
}

/// Response frames, one per request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    HelloAck {
        version: String,
    },
    Pong {
        worker_id: WorkerId,
        role: Role,
        observed_epoch: Epoch,
    },
    Status {
        status: WorkerStatus,
    },
    StartJob {
        result: StartJobResult,
    },
    CancelJob {
        result: CancelJobResult,
    },
    Drain {
        draining: bool,
    },
    Continuation {
        verdict: ContinuationVerdict,
    },
    Error {
        message: String,
    },
}
