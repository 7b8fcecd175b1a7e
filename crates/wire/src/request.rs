// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use gaffer_core::{Epoch, Role, RunId, WorkerId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Request frames. `caller_role` is carried for audit; `leader_epoch` is
/// the fencing token and is checked by the receiver wherever present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Version + auth handshake, first frame on every connection.
    Hello {
        version: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },

    /// Liveness probe. Used by the leader toward workers and by the
    /// sub-leader toward the leader.
    Ping {
        sender: WorkerId,
        caller_role: Role,
    },

    /// Full worker state snapshot.
    GetStatus,

    /// Begin a run. Idempotent: a duplicate for a run this worker already
    /// accepted answers `Accepted` again.
    StartJob {
        job_run_id: RunId,
        command_name: String,
        #[serde(default)]
        args: Map<String, Value>,
        timeout_seconds: u32,
        attempt: i32,
        leader_epoch: Epoch,
        caller_role: Role,
    },

    /// Abort a run.
    CancelJob {
        job_run_id: RunId,
        reason: String,
        leader_epoch: Epoch,
        caller_role: Role,
    },

    /// Stop (or resume) accepting new runs; running runs continue.
    Drain {
        enable: bool,
        leader_epoch: Epoch,
        caller_role: Role,
    },

    /// A detached-but-still-running worker asking whether it may finish
    /// its current run. Answered by the leader or the sub-leader.
    ConfirmContinuation {
        worker_id: WorkerId,
        job_run_id: RunId,
        leader_epoch: Epoch,
        caller_role: Role,
    },
}

impl Request {
    /// Request name for log spans.
    pub fn name(&self) -> &'static str {
        match self {
            Request::Hello { .. } => "hello",
            Request::Ping { .. } => "ping",
            Request::GetStatus => "get_status",
            Request::StartJob { .. } => "start_job",
            Request::CancelJob { .. } => "cancel_job",
            Request::Drain { .. } => "drain",
            Request::ConfirmContinuation { .. } => "confirm_continuation",
        }
    }
}
