// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime construction, shared helpers, and the interval loops.

use crate::error::RuntimeError;
use crate::executor::JobExecutor;
use crate::settings::SettingsResolver;
use crate::state::RuntimeState;
use chrono::FixedOffset;
use gaffer_coord::{keys, CoordStore};
use gaffer_core::{Clock, Epoch, Role, Tunables, WorkerEntry, WorkerId};
use gaffer_store::{AuditEntry, AuditKind, RunStore};
use gaffer_wire::{PeerClient, WorkerStatus};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Static per-process configuration (everything else comes from settings).
pub struct EngineConfig {
    /// Host identity shared by all workers on this machine.
    pub node_id: gaffer_core::NodeId,
    /// Host advertised in the directory entry.
    pub host: String,
    /// Port the RPC server is bound to.
    pub port: u16,
    /// Directory for per-run log files.
    pub log_dir: PathBuf,
    /// Offset the daily/weekly schedule grids are computed in.
    pub tz_offset: FixedOffset,
}

/// Adapter dependencies handed to the runtime.
pub struct EngineDeps {
    pub coord: Arc<dyn CoordStore>,
    pub store: Arc<dyn RunStore>,
    pub executor: Arc<dyn JobExecutor>,
    pub peers: Arc<dyn PeerClient>,
}

/// One worker process's runtime.
pub struct WorkerRuntime<C: Clock> {
    pub(crate) clock: C,
    pub(crate) config: EngineConfig,
    pub(crate) coord: Arc<dyn CoordStore>,
    pub(crate) store: Arc<dyn RunStore>,
    pub(crate) executor: Arc<dyn JobExecutor>,
    pub(crate) peers: Arc<dyn PeerClient>,
    pub(crate) settings: SettingsResolver,
    pub(crate) state: Mutex<RuntimeState>,
    pub(crate) shutdown: CancellationToken,
    /// Definitions already audited for unrecognized schedule grammar.
    pub(crate) audited_defs: Mutex<HashSet<String>>,
    /// Consecutive dispatch transport failures per worker.
    pub(crate) dispatch_failures: Mutex<HashMap<String, u32>>,
}

impl<C: Clock> WorkerRuntime<C> {
    /// Allocate a worker id from the directory counter, write the initial
    /// directory entry, and hand back the runtime. Loops are started
    /// separately with [`run_loops`](Self::run_loops).
    pub async fn start(
        deps: EngineDeps,
        clock: C,
        config: EngineConfig,
    ) -> Result<Arc<Self>, RuntimeError> {
        let seq = deps.coord.incr(keys::WORKER_ID_SEQ).await?;
        let worker_id = WorkerId::from_seq(seq);
        info!(worker_id = %worker_id, node_id = %config.node_id, "worker registering");

        let registered_at_ms = clock.epoch_ms();
        let runtime = Arc::new(Self {
            clock,
            settings: SettingsResolver::new(Arc::clone(&deps.store)),
            coord: deps.coord,
            store: deps.store,
            executor: deps.executor,
            peers: deps.peers,
            config,
            state: Mutex::new(RuntimeState::new(worker_id, registered_at_ms)),
            shutdown: CancellationToken::new(),
            audited_defs: Mutex::new(HashSet::new()),
            dispatch_failures: Mutex::new(HashMap::new()),
        });

        let tunables = runtime.settings.tunables().await;
        let entry = runtime.entry_snapshot();
        runtime
            .coord
            .write_entry(&entry, Duration::from_secs(tunables.heartbeat_ttl_seconds.max(1) as u64))
            .await?;
        Ok(runtime)
    }

    pub fn worker_id(&self) -> WorkerId {
        self.state.lock().worker_id.clone()
    }

    pub fn role(&self) -> Role {
        self.state.lock().role
    }

    pub fn observed_epoch(&self) -> Epoch {
        self.state.lock().observed_epoch
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Helper to lock state immutably.
    pub(crate) fn lock_state<T>(&self, f: impl FnOnce(&RuntimeState) -> T) -> T {
        f(&self.state.lock())
    }

    /// Helper to lock state mutably.
    pub(crate) fn lock_state_mut<T>(&self, f: impl FnOnce(&mut RuntimeState) -> T) -> T {
        f(&mut self.state.lock())
    }

    /// Directory entry reflecting the current state.
    pub(crate) fn entry_snapshot(&self) -> WorkerEntry {
        let now_ms = self.clock.epoch_ms();
        self.lock_state(|state| WorkerEntry {
            worker_id: state.worker_id.clone(),
            node_id: self.config.node_id.clone(),
            host: self.config.host.clone(),
            port: self.config.port,
            role: state.role,
            last_heartbeat_ms: now_ms,
            load: state.load(),
            current_run_id: state.current_run_id(),
            detached: state.detached,
            draining: state.draining,
        })
    }

    /// Status snapshot for `GetStatus`.
    pub(crate) fn status_snapshot(&self) -> WorkerStatus {
        let now_ms = self.clock.epoch_ms();
        self.lock_state(|state| WorkerStatus {
            worker_id: state.worker_id.clone(),
            node_id: self.config.node_id.clone(),
            role: state.role,
            observed_epoch: state.observed_epoch,
            load: state.load(),
            current_run_id: state.current_run_id(),
            detached: state.detached,
            draining: state.draining,
            last_heartbeat_ms: now_ms,
        })
    }

    /// Cease scheduling immediately and drop to the worker role.
    ///
    /// In-flight dispatches already accepted by targets are left to
    /// fencing; demotion does not cancel them.
    pub(crate) async fn demote(&self, reason: &str) {
        let (worker_id, was) = self.lock_state_mut(|state| {
            let was = state.role;
            state.role = Role::Worker;
            (state.worker_id.clone(), was)
        });
        if was == Role::Worker {
            return;
        }
        warn!(worker_id = %worker_id, from = %was, reason, "stepping down");
        if was == Role::Leader {
            // Best effort: the lease may already be gone or owned by another.
            let _ = self.coord.release(keys::LEADER_LOCK, worker_id.as_str()).await;
        }
        if was == Role::SubLeader {
            let _ = self
                .coord
                .release(&keys::subleader_lock(&self.config.node_id), worker_id.as_str())
                .await;
        }
        let _ = self
            .store
            .record_audit(AuditEntry {
                at: self.clock.now_utc(),
                kind: AuditKind::Demotion,
                subject: worker_id.to_string(),
                detail: reason.to_string(),
            })
            .await;
    }

    /// Current tunables snapshot.
    pub(crate) async fn tunables(&self) -> Tunables {
        self.settings.tunables().await
    }

    /// Settings-reload signal: drop the resolver cache so the next lookup
    /// re-reads the store.
    pub fn reload_settings(&self) {
        self.settings.invalidate();
    }

    /// Spawn all coordination loops; returns when shutdown is requested.
    ///
    /// Periods are re-read from settings on every iteration so overrides
    /// take effect without a restart.
    pub async fn run_loops(self: &Arc<Self>) {
        let heartbeat = {
            let runtime = Arc::clone(self);
            tokio::spawn(async move {
                loop {
                    let period = runtime.tunables().await.heartbeat_interval_seconds.max(1);
                    tokio::select! {
                        _ = runtime.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(period)) => {}
                    }
                    if let Err(e) = runtime.heartbeat_tick().await {
                        warn!(error = %e, "heartbeat tick failed");
                    }
                }
            })
        };

        let election = {
            let runtime = Arc::clone(self);
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = runtime.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    }
                    if let Err(e) = runtime.election_tick().await {
                        warn!(error = %e, "election tick failed");
                        if matches!(e, RuntimeError::Coord(_)) {
                            runtime.demote("coordination store failure").await;
                        }
                    }
                }
            })
        };

        let monitor = {
            let runtime = Arc::clone(self);
            tokio::spawn(async move {
                loop {
                    let period = runtime.tunables().await.subleader_check_seconds.max(1);
                    tokio::select! {
                        _ = runtime.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(period)) => {}
                    }
                    if runtime.role() != Role::SubLeader {
                        continue;
                    }
                    if let Err(e) = runtime.monitor_tick().await {
                        warn!(error = %e, "sub-leader monitor tick failed");
                    }
                }
            })
        };

        let leader = {
            let runtime = Arc::clone(self);
            tokio::spawn(async move {
                loop {
                    let period = runtime.tunables().await.leader_tick_seconds.max(1);
                    tokio::select! {
                        _ = runtime.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(period)) => {}
                    }
                    if runtime.role() != Role::Leader {
                        continue;
                    }
                    if let Err(e) = runtime.leader_tick().await {
                        warn!(error = %e, "leader tick failed");
                        if matches!(e, RuntimeError::Coord(_)) {
                            runtime.demote("coordination store failure").await;
                        }
                    }
                }
            })
        };

        let _ = tokio::join!(heartbeat, election, monitor, leader);
    }

    /// Graceful shutdown: stop loops, abort in-flight subprocesses as
    /// cancellations, flush the directory entry so followers notice fast.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let (worker_id, handles) = self.lock_state_mut(|state| {
            let handles: Vec<_> = state
                .runs
                .values_mut()
                .map(|handle| {
                    handle.abort_cause = Some(crate::state::AbortCause::Canceled {
                        reason: "worker shutting down".to_string(),
                    });
                    handle.cancel.clone()
                })
                .collect();
            (state.worker_id.clone(), handles)
        });
        for cancel in handles {
            cancel.cancel();
        }
        let _ = self.coord.drop_entry(&worker_id).await;
        info!(worker_id = %worker_id, "worker stopped");
    }
}
