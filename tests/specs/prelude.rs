// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared cluster harness for the workspace specs.

use chrono::FixedOffset;
use gaffer_coord::MemoryCoord;
use gaffer_core::{FakeClock, JobDefinition, NodeId, Schedule, WorkerId};
use gaffer_engine::{
    handle_request, EngineConfig, EngineDeps, FakeExecutor, LoopbackNet, WorkerRuntime,
};
use gaffer_store::{MemoryStore, RunStore};
use gaffer_wire::{Request, Response, WorkerStatus};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

pub type Worker = Arc<WorkerRuntime<FakeClock>>;

pub struct Cluster {
    pub clock: FakeClock,
    pub coord: MemoryCoord,
    pub store: MemoryStore,
    pub executor: Arc<FakeExecutor>,
    pub net: Arc<LoopbackNet>,
    next_port: AtomicU16,
}

impl Cluster {
    pub fn new() -> Self {
        let clock = FakeClock::new();
        Self {
            coord: MemoryCoord::new(clock.clone()),
            store: MemoryStore::new(),
            executor: Arc::new(FakeExecutor::new()),
            net: LoopbackNet::new(),
            clock,
            next_port: AtomicU16::new(7101),
        }
    }

    /// Register a worker on `node` and wire it into the loopback net.
    /// Returns the runtime and its advertised address.
    pub async fn worker(&self, node: &str) -> (Worker, String) {
        let port = self.next_port.fetch_add(1, Ordering::SeqCst);
        let runtime = WorkerRuntime::start(
            EngineDeps {
                coord: Arc::new(self.coord.clone()),
                store: Arc::new(self.store.clone()),
                executor: self.executor.clone(),
                peers: self.net.clone(),
            },
            self.clock.clone(),
            EngineConfig {
                node_id: NodeId::new(node),
                host: "127.0.0.1".to_string(),
                port,
                log_dir: std::env::temp_dir(),
                tz_offset: FixedOffset::east_opt(0).unwrap(),
            },
        )
        .await
        .unwrap();
        let addr = format!("127.0.0.1:{port}");
        self.net.register(&addr, Arc::clone(&runtime));
        (runtime, addr)
    }

    /// Store a minute-grid time definition running `command`.
    pub async fn minute_definition(&self, name: &str, command: &str) -> JobDefinition {
        let def = JobDefinition::builder()
            .id(format!("def-{name}"))
            .name(name)
            .command(command)
            .schedule(Schedule::EveryNMinutes { n: 1 })
            .build();
        self.store.upsert_definition(&def).await.unwrap();
        def
    }

    /// Run one full coordination round on every given worker: election,
    /// heartbeat, sub-leader monitor, leader tick.
    pub async fn round(&self, workers: &[&Worker]) {
        for worker in workers {
            worker.election_tick().await.unwrap();
            worker.heartbeat_tick().await.unwrap();
        }
        for worker in workers {
            if worker.role() == gaffer_core::Role::SubLeader {
                worker.monitor_tick().await.unwrap();
            }
        }
        for worker in workers {
            if worker.role() == gaffer_core::Role::Leader {
                worker.leader_tick().await.unwrap();
            }
        }
    }
}

/// Worker status via the public control plane.
pub async fn status_of(worker: &Worker) -> WorkerStatus {
    match handle_request(worker, Request::GetStatus).await {
        Response::Status { status } => status,
        other => panic!("unexpected response: {other:?}"),
    }
}

/// Poll `predicate` for up to ~2s of real time.
pub async fn eventually<F, Fut>(mut predicate: F)
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

/// The id a worker registered under.
pub fn id_of(worker: &Worker) -> WorkerId {
    worker.worker_id()
}
