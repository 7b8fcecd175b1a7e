// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sub-leader monitor: watch the leader, degrade it when it stalls, and
//! take over.

use crate::error::RuntimeError;
use crate::runtime::WorkerRuntime;
use gaffer_coord::keys;
use gaffer_core::{Clock, Role};
use gaffer_store::{AuditEntry, AuditKind};
use gaffer_wire::{Request, Response};
use std::time::Duration;
use tracing::{info, warn};

/// Probe deadline for the liveness ping toward the leader.
const PING_DEADLINE: Duration = Duration::from_millis(300);

/// Failed probes tolerated before the leader is degraded.
const MAX_PROBE_FAILURES: u32 = 3;

impl<C: Clock> WorkerRuntime<C> {
    /// One pass of the sub-leader monitor. Call only while sub-leader.
    pub async fn monitor_tick(&self) -> Result<(), RuntimeError> {
        let tunables = self.tunables().await;
        let stale_ms = (tunables.leader_stale_seconds.max(1) as u64) * 1000;
        let now_ms = self.clock.epoch_ms();

        let last_seen: Option<u64> = self
            .coord
            .get(keys::LEADER_LAST_SEEN)
            .await?
            .and_then(|v| v.parse().ok());
        if let Some(last_seen) = last_seen {
            if now_ms.saturating_sub(last_seen) <= stale_ms {
                self.lock_state_mut(|state| state.monitor_failures = 0);
                return Ok(());
            }
        }

        // The marker is stale (or absent). Probe the leader directly.
        let entries = self.coord.scan_workers().await?;
        let leader = entries.into_iter().find(|e| e.role == Role::Leader);
        let (worker_id, my_role) =
            self.lock_state(|state| (state.worker_id.clone(), state.role));

        let probe_ok = match &leader {
            Some(leader) => {
                let request =
                    Request::Ping { sender: worker_id.clone(), caller_role: my_role };
                matches!(
                    self.peers.call(&leader.addr(), request, PING_DEADLINE).await,
                    Ok(Response::Pong { .. })
                )
            }
            None => false,
        };

        if probe_ok {
            self.lock_state_mut(|state| state.monitor_failures = 0);
            return Ok(());
        }

        let failures = self.lock_state_mut(|state| {
            state.monitor_failures += 1;
            state.monitor_failures
        });
        warn!(failures, "leader probe failed");
        if failures < MAX_PROBE_FAILURES {
            return Ok(());
        }

        // The leader is stalled: degrade it and try to take the lease.
        if let Some(leader) = &leader {
            self.coord.set_flag(&keys::degrade_flag(&leader.worker_id)).await?;
        }
        let lease_ttl = Duration::from_secs(tunables.heartbeat_ttl_seconds.max(1) as u64);
        // The stalled leader's lease may still be live; promotion waits for
        // its TTL unless it was already lost.
        if self.coord.try_acquire(keys::LEADER_LOCK, worker_id.as_str(), lease_ttl).await? {
            // Epoch bumps before any outbound command from the new leader.
            let epoch = self.coord.incr(keys::LEADER_EPOCH).await?;
            let _ = self
                .coord
                .release(&keys::subleader_lock(&self.config.node_id), worker_id.as_str())
                .await;
            self.lock_state_mut(|state| {
                state.role = Role::Leader;
                state.leader_epoch = epoch;
                state.observe_epoch(epoch);
                state.monitor_failures = 0;
            });
            info!(worker_id = %worker_id, epoch, "promoted after leader stall");
            let _ = self
                .store
                .record_audit(AuditEntry {
                    at: self.clock.now_utc(),
                    kind: AuditKind::Promotion,
                    subject: worker_id.to_string(),
                    detail: format!("promoted from sub-leader, epoch {}", epoch),
                })
                .await;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
