// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine tests: a fleet of in-process workers over
//! memory adapters, driven by a fake clock.

use crate::runtime::{EngineConfig, EngineDeps, WorkerRuntime};
use crate::test_support::{FakeExecutor, LoopbackNet};
use chrono::{DateTime, FixedOffset, Utc};
use gaffer_coord::MemoryCoord;
use gaffer_core::{
    Clock, DefinitionId, FakeClock, JobDefinition, JobRun, NodeId, RunId, Schedule, WorkerId,
};
use gaffer_store::{MemoryStore, NewRun, RunGuard, RunPatch, RunStore};
use gaffer_core::RunState;
use std::sync::Arc;

pub(crate) struct Fleet {
    pub clock: FakeClock,
    pub coord: MemoryCoord,
    pub store: MemoryStore,
    pub executor: Arc<FakeExecutor>,
    pub net: Arc<LoopbackNet>,
    next_port: std::sync::atomic::AtomicU16,
}

impl Fleet {
    pub fn new() -> Self {
        let clock = FakeClock::new();
        Self {
            coord: MemoryCoord::new(clock.clone()),
            store: MemoryStore::new(),
            executor: Arc::new(FakeExecutor::new()),
            net: LoopbackNet::new(),
            clock,
            next_port: std::sync::atomic::AtomicU16::new(7001),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now_utc()
    }

    /// Register a worker on `node` and wire it into the loopback net.
    pub async fn worker(&self, node: &str) -> Arc<WorkerRuntime<FakeClock>> {
        let port = self.next_port.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let config = EngineConfig {
            node_id: NodeId::new(node),
            host: "127.0.0.1".to_string(),
            port,
            log_dir: std::env::temp_dir(),
            tz_offset: FixedOffset::east_opt(0).unwrap(),
        };
        let runtime = WorkerRuntime::start(
            EngineDeps {
                coord: Arc::new(self.coord.clone()),
                store: Arc::new(self.store.clone()),
                executor: self.executor.clone(),
                peers: self.net.clone(),
            },
            self.clock.clone(),
            config,
        )
        .await
        .unwrap();
        self.net.register(&format!("127.0.0.1:{port}"), Arc::clone(&runtime));
        runtime
    }

    /// Store a minute-grid time definition and return it.
    pub async fn minute_definition(&self, name: &str) -> JobDefinition {
        let def = JobDefinition::builder()
            .id(format!("def-{name}"))
            .name(name)
            .command(name)
            .schedule(Schedule::EveryNMinutes { n: 1 })
            .build();
        self.store.upsert_definition(&def).await.unwrap();
        def
    }

    /// Insert a PENDING run scheduled for now.
    pub async fn pending_run(&self, def: &JobDefinition, key: &str) -> JobRun {
        self.store
            .create_run_if_absent(NewRun {
                id: RunId::new(),
                definition_id: def.id.clone(),
                scheduled_for: self.now(),
                idempotency_key: key.to_string(),
                created_at: self.now(),
            })
            .await
            .unwrap()
    }

    /// Insert a run already ASSIGNED to `worker` under `epoch`.
    pub async fn assigned_run(
        &self,
        def: &JobDefinition,
        key: &str,
        worker: &WorkerId,
        epoch: i64,
    ) -> JobRun {
        let run = self.pending_run(def, key).await;
        let guard = RunGuard::new(RunState::Pending, run.version);
        let patch = RunPatch::assign(worker.clone(), self.now(), epoch);
        assert_eq!(self.store.update_run(&run.id, &guard, &patch).await.unwrap(), 1);
        self.store.get_run(&run.id).await.unwrap().unwrap()
    }

    pub async fn run(&self, id: &RunId) -> JobRun {
        self.store.get_run(id).await.unwrap().unwrap()
    }

    pub async fn runs_for(&self, def: &DefinitionId) -> Vec<JobRun> {
        self.store.all_runs().into_iter().filter(|r| &r.definition_id == def).collect()
    }
}

/// Wait until `predicate` holds or panic after ~2s of real time. For
/// assertions on spawned driver tasks.
pub(crate) async fn eventually_async<F, Fut>(mut predicate: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if predicate().await {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
