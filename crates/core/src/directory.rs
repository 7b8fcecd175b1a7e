// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker directory entry: the ephemeral per-worker record in the
//! coordination store. Expires on TTL miss.

use crate::run::RunId;
use crate::worker::{NodeId, Role, WorkerId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerEntry {
    pub worker_id: WorkerId,
    pub node_id: NodeId,
    pub host: String,
    pub port: u16,
    pub role: Role,
    /// Wall-clock ms of the last heartbeat refresh.
    pub last_heartbeat_ms: u64,
    /// Count of in-flight runs.
    pub load: u32,
    pub current_run_id: Option<RunId>,
    pub detached: bool,
    pub draining: bool,
}

impl WorkerEntry {
    /// Address of the worker's RPC listener.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Heartbeat age relative to `now_ms`; zero if the heartbeat is in the
    /// future (clock skew between observers).
    pub fn heartbeat_age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_heartbeat_ms)
    }

    /// Whether the entry's heartbeat is fresh within `ttl_seconds`.
    pub fn is_fresh(&self, now_ms: u64, ttl_seconds: i64) -> bool {
        self.heartbeat_age_ms(now_ms) <= (ttl_seconds.max(0) as u64) * 1000
    }

    /// Whether this worker may be handed new runs.
    pub fn is_candidate(&self, now_ms: u64, ttl_seconds: i64, max_jobs: u32) -> bool {
        !self.detached && !self.draining && self.is_fresh(now_ms, ttl_seconds) && self.load < max_jobs
    }
}

crate::builder! {
    pub struct WorkerEntryBuilder => WorkerEntry {
        into {
            worker_id: WorkerId = "w1",
            node_id: NodeId = "node-a",
            host: String = "127.0.0.1",
        }
        set {
            port: u16 = 7070,
            role: Role = Role::Worker,
            last_heartbeat_ms: u64 = 0,
            load: u32 = 0,
            detached: bool = false,
            draining: bool = false,
        }
        option {
            current_run_id: RunId = None,
        }
    }
}

#[cfg(test)]
#[path = "directory_tests.rs"]
mod tests;
