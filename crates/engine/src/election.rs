// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Leader and sub-leader election.
//!
//! Runs every second on every worker. A fresh leader acquisition
//! increments the epoch counter before anything else; a failed renew
//! demotes immediately. The sub-leader lease is scoped to this worker's
//! node and skipped while the leader occupies the same node (unless the
//! fleet has only this node).

use crate::error::RuntimeError;
use crate::runtime::WorkerRuntime;
use gaffer_coord::keys;
use gaffer_core::{Clock, Role};
use gaffer_store::{AuditEntry, AuditKind};
use std::time::Duration;
use tracing::info;

impl<C: Clock> WorkerRuntime<C> {
    /// One pass of the election loop.
    pub async fn election_tick(&self) -> Result<(), RuntimeError> {
        let tunables = self.tunables().await;
        let lease_ttl = Duration::from_secs(tunables.heartbeat_ttl_seconds.max(1) as u64);

        let (worker_id, role, draining, detached) = self.lock_state(|state| {
            (state.worker_id.clone(), state.role, state.draining, state.detached)
        });

        // A draining or detached worker holds no role.
        if draining || detached {
            if role != Role::Worker {
                self.demote("draining or detached").await;
            }
            return Ok(());
        }

        // Degrade flag set on us by the sub-leader: step down at once.
        if role == Role::Leader {
            if self.coord.get_flag(&keys::degrade_flag(&worker_id)).await? {
                self.coord.clear_flag(&keys::degrade_flag(&worker_id)).await?;
                self.demote("degrade flag set").await;
                return Ok(());
            }
        }

        if self.coord.try_acquire(keys::LEADER_LOCK, worker_id.as_str(), lease_ttl).await? {
            // Fresh acquisition: fence with a new epoch before any command
            // goes out.
            let epoch = self.coord.incr(keys::LEADER_EPOCH).await?;
            self.lock_state_mut(|state| {
                state.role = Role::Leader;
                state.leader_epoch = epoch;
                state.observe_epoch(epoch);
            });
            info!(worker_id = %worker_id, epoch, "acquired leader lease");
            let _ = self
                .store
                .record_audit(AuditEntry {
                    at: self.clock.now_utc(),
                    kind: AuditKind::Promotion,
                    subject: worker_id.to_string(),
                    detail: format!("leader epoch {}", epoch),
                })
                .await;
            return Ok(());
        }

        let holder = self.coord.get(keys::LEADER_LOCK).await?;
        if holder.as_deref() == Some(worker_id.as_str()) {
            if !self.coord.renew(keys::LEADER_LOCK, worker_id.as_str(), lease_ttl).await? {
                self.demote("leader lease renew failed").await;
            }
            return Ok(());
        }

        // Lease held by somebody else.
        if role == Role::Leader {
            self.demote("leader lease held by other").await;
        }
        self.subleader_tick(lease_ttl).await
    }

    /// Maintain or attempt the sub-leader lease for this node.
    async fn subleader_tick(&self, lease_ttl: Duration) -> Result<(), RuntimeError> {
        let (worker_id, role) =
            self.lock_state(|state| (state.worker_id.clone(), state.role));
        let lock_key = keys::subleader_lock(&self.config.node_id);

        if role == Role::SubLeader {
            if !self.coord.renew(&lock_key, worker_id.as_str(), lease_ttl).await? {
                self.demote("sub-leader lease renew failed").await;
            }
            return Ok(());
        }

        // Keep the sub-leader off the leader's node when the fleet spans
        // more than one node.
        let entries = self.coord.scan_workers().await?;
        let leader_node = entries.iter().find(|e| e.role == Role::Leader).map(|e| &e.node_id);
        if let Some(leader_node) = leader_node {
            let other_nodes = entries.iter().any(|e| e.node_id != *leader_node);
            if *leader_node == self.config.node_id && other_nodes {
                return Ok(());
            }
        }

        if self.coord.try_acquire(&lock_key, worker_id.as_str(), lease_ttl).await? {
            self.lock_state_mut(|state| {
                if state.role == Role::Worker {
                    state.role = Role::SubLeader;
                }
            });
            info!(worker_id = %worker_id, "acquired sub-leader lease");
        } else if self.coord.get(&lock_key).await?.as_deref() == Some(worker_id.as_str()) {
            // Held from a previous life of this process.
            let _ = self.coord.renew(&lock_key, worker_id.as_str(), lease_ttl).await?;
            self.lock_state_mut(|state| {
                if state.role == Role::Worker {
                    state.role = Role::SubLeader;
                }
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "election_tests.rs"]
mod tests;
