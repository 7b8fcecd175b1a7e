// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fleet-level invariants from the design: epoch uniqueness, single
//! RUNNING transition per run, backlog cutoff.

use crate::prelude::*;
use gaffer_core::{Clock, Role, RunState};
use gaffer_store::{AuditKind, RunStore};
use gaffer_wire::{Request, Response, StartJobResult};
use gaffer_engine::handle_request;
use std::collections::HashMap;
use std::time::Duration;

/// Property 1: over elections, expiries, and store blips, each epoch
/// value is held by at most one worker.
#[tokio::test]
async fn single_leader_per_epoch() {
    let cluster = Cluster::new();
    let (w1, _) = cluster.worker("node-a").await;
    let (w2, _) = cluster.worker("node-b").await;
    let (w3, _) = cluster.worker("node-c").await;
    let workers = [&w1, &w2, &w3];

    let mut holders: HashMap<i64, String> = HashMap::new();
    for step in 0..60u64 {
        cluster.clock.advance(Duration::from_secs(1));

        // Periodically knock the lease out (a partitioned store would do
        // the same), and briefly fail the store entirely.
        if step % 17 == 0 {
            cluster.coord.evict(gaffer_coord::keys::LEADER_LOCK);
        }
        if step % 23 == 0 {
            cluster.coord.set_fail_all(true);
            for worker in workers {
                let _ = worker.election_tick().await;
            }
            cluster.coord.set_fail_all(false);
        }

        for worker in workers {
            worker.election_tick().await.unwrap();
            worker.heartbeat_tick().await.unwrap();
        }
        for worker in workers {
            if worker.role() == Role::Leader {
                let epoch = worker.observed_epoch();
                let id = worker.worker_id().to_string();
                let holder = holders.entry(epoch).or_insert_with(|| id.clone());
                assert_eq!(holder, &id, "epoch {epoch} held by two workers");
            }
        }
    }
    assert!(holders.len() > 1, "the churn should have minted several epochs");
}

/// Property 2: one successful ASSIGNED → RUNNING transition per run; the
/// duplicate dispatch is absorbed, not re-applied.
#[tokio::test]
async fn at_most_one_running_transition() {
    let cluster = Cluster::new();
    let (w1, _) = cluster.worker("node-a").await;
    let def = cluster.minute_definition("p2", "noop").await;
    cluster.executor.script("noop", gaffer_engine::FakeBehavior::RunFor(Duration::from_secs(3600)));

    let run = cluster
        .store
        .create_run_if_absent(gaffer_store::NewRun {
            id: "run-p2".into(),
            definition_id: def.id.clone(),
            scheduled_for: cluster.clock.now_utc(),
            idempotency_key: "time:def-p2:0".to_string(),
            created_at: cluster.clock.now_utc(),
        })
        .await
        .unwrap();
    let guard = gaffer_store::RunGuard::new(RunState::Pending, run.version);
    let patch = gaffer_store::RunPatch::assign(id_of(&w1), cluster.clock.now_utc(), 1);
    cluster.store.update_run(&run.id, &guard, &patch).await.unwrap();

    let start = |attempt| Request::StartJob {
        job_run_id: run.id.clone(),
        command_name: "noop".to_string(),
        args: serde_json::Map::new(),
        timeout_seconds: 3600,
        attempt,
        leader_epoch: 1,
        caller_role: Role::Leader,
    };
    let first = handle_request(&w1, start(1)).await;
    let version_after_first =
        cluster.store.get_run(&run.id).await.unwrap().unwrap().version;
    let second = handle_request(&w1, start(1)).await;

    assert_eq!(first, Response::StartJob { result: StartJobResult::Accepted });
    assert_eq!(second, Response::StartJob { result: StartJobResult::Accepted });
    let after = cluster.store.get_run(&run.id).await.unwrap().unwrap();
    assert_eq!(after.state, RunState::Running);
    assert_eq!(after.version, version_after_first, "second accept did not re-transition");
}

/// Property 9: after a 30-minute outage with a one-minute grid and a
/// 300-second cutoff, recovery dispatches at most the backlog window plus
/// the current slot; older slots are audited as skipped.
#[tokio::test]
async fn backlog_cutoff_bounds_recovery() {
    let cluster = Cluster::new();
    let (w1, _) = cluster.worker("node-a").await;
    cluster.round(&[&w1]).await;
    let def = cluster.minute_definition("p9", "noop").await;
    cluster.round(&[&w1]).await;

    cluster.clock.advance(Duration::from_secs(30 * 60));
    cluster.round(&[&w1]).await;

    let runs: Vec<_> = cluster
        .store
        .all_runs()
        .into_iter()
        .filter(|r| r.definition_id == def.id)
        .collect();
    let skipped = runs.iter().filter(|r| r.state == RunState::Skipped).count();
    let dispatchable = runs
        .iter()
        .filter(|r| r.scheduled_for > runs.iter().map(|x| x.created_at).min().unwrap())
        .filter(|r| r.state != RunState::Skipped)
        .count();
    assert_eq!(skipped, 24);
    assert!(dispatchable <= 6, "backlog window (5) plus the current slot, got {dispatchable}");
    let audits = cluster.store.audit_entries();
    assert_eq!(audits.iter().filter(|a| a.kind == AuditKind::SlotSkipped).count(), 24);
}
