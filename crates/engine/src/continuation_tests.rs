// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::test_helpers::{eventually_async, Fleet};
use crate::test_support::FakeBehavior;
use gaffer_coord::{keys, CoordStore};
use gaffer_core::{ContinuationState, RunState, WorkerId};
use gaffer_store::RunStore;
use gaffer_wire::ContinuationVerdict;
use serde_json::Map;
use std::time::Duration;

/// Leader on node-a plus a worker on node-b holding a slow run dispatched
/// under the current epoch.
async fn detach_scene(
    fleet: &Fleet,
) -> (
    std::sync::Arc<crate::runtime::WorkerRuntime<gaffer_core::FakeClock>>,
    std::sync::Arc<crate::runtime::WorkerRuntime<gaffer_core::FakeClock>>,
    gaffer_core::JobRun,
) {
    fleet.store.put_setting("continuation_retry_interval_seconds", "0.01").await.unwrap();
    fleet.store.put_setting("worker_detach_grace_seconds", "0").await.unwrap();
    fleet.executor.script("slow", FakeBehavior::RunFor(Duration::from_millis(200)));

    let leader = fleet.worker("node-a").await;
    leader.election_tick().await.unwrap();
    leader.heartbeat_tick().await.unwrap();

    let worker = fleet.worker("node-b").await;
    worker.heartbeat_tick().await.unwrap();

    let def = fleet.minute_definition("slow").await;
    let run = fleet.assigned_run(&def, "k", &worker.worker_id(), 1).await;
    let result = worker
        .handle_start_job(run.id.clone(), "slow".to_string(), Map::new(), 3600, 1, 1)
        .await;
    assert_eq!(result, gaffer_wire::StartJobResult::Accepted);
    (leader, worker, fleet.run(&run.id).await)
}

#[tokio::test]
async fn detached_worker_allowed_to_finish_its_run() {
    let fleet = Fleet::new();
    let (_leader, worker, run) = detach_scene(&fleet).await;

    // Detach mid-run: the worker asks, the leader sees the run still
    // assigned under the current epoch, and the run finishes here.
    fleet.coord.set_flag(&keys::detach_flag(&worker.worker_id())).await.unwrap();
    worker.heartbeat_tick().await.unwrap();

    let store = fleet.store.clone();
    let run_id = run.id.clone();
    eventually_async(move || {
        let store = store.clone();
        let run_id = run_id.clone();
        async move { store.get_run(&run_id).await.unwrap().unwrap().state == RunState::Succeeded }
    })
    .await;

    let finished = fleet.run(&run.id).await;
    assert_eq!(finished.assigned_worker_id.as_ref().map(WorkerId::as_str), Some("w2"));
    assert_eq!(finished.continuation_state, ContinuationState::None, "cleared after allow");
    assert_eq!(finished.exit_code, Some(0));
}

#[tokio::test]
async fn denied_continuation_aborts_with_distinct_summary() {
    let fleet = Fleet::new();
    let (_leader, worker, run) = detach_scene(&fleet).await;

    // A newer leader epoch exists: the responder must deny.
    fleet.coord.incr(keys::LEADER_EPOCH).await.unwrap();

    fleet.coord.set_flag(&keys::detach_flag(&worker.worker_id())).await.unwrap();
    worker.heartbeat_tick().await.unwrap();

    let store = fleet.store.clone();
    let run_id = run.id.clone();
    eventually_async(move || {
        let store = store.clone();
        let run_id = run_id.clone();
        async move { store.get_run(&run_id).await.unwrap().unwrap().state == RunState::Failed }
    })
    .await;
    let finished = fleet.run(&run.id).await;
    assert!(
        finished.error_summary.unwrap().contains("aborted after detach"),
        "distinct failure summary"
    );
}

#[tokio::test]
async fn unreachable_coordinators_abort_after_retries() {
    let fleet = Fleet::new();
    fleet.store.put_setting("continuation_retry_count", "2").await.unwrap();
    let (leader, worker, run) = detach_scene(&fleet).await;
    fleet.net.partition(&format!("127.0.0.1:{}", leader.config.port), true);

    fleet.coord.set_flag(&keys::detach_flag(&worker.worker_id())).await.unwrap();
    worker.heartbeat_tick().await.unwrap();

    let store = fleet.store.clone();
    let run_id = run.id.clone();
    eventually_async(move || {
        let store = store.clone();
        let run_id = run_id.clone();
        async move { store.get_run(&run_id).await.unwrap().unwrap().state == RunState::Failed }
    })
    .await;
    assert!(fleet.run(&run.id).await.error_summary.unwrap().contains("no coordinator reachable"));
}

#[tokio::test]
async fn responder_checks_assignment_and_epoch() {
    let fleet = Fleet::new();
    let (leader, worker, run) = detach_scene(&fleet).await;

    // Happy path: running, assigned to the caller, epoch current.
    let verdict = leader
        .answer_continuation(&worker.worker_id(), &run.id, 1)
        .await
        .unwrap();
    assert_eq!(verdict, ContinuationVerdict::AllowContinue);

    // Wrong caller.
    let verdict = leader
        .answer_continuation(&WorkerId::new("w9"), &run.id, 1)
        .await
        .unwrap();
    assert_eq!(verdict, ContinuationVerdict::MustAbort);

    // Cited epoch no longer current.
    fleet.coord.incr(keys::LEADER_EPOCH).await.unwrap();
    let verdict = leader
        .answer_continuation(&worker.worker_id(), &run.id, 1)
        .await
        .unwrap();
    assert_eq!(verdict, ContinuationVerdict::MustAbort);

    worker.handle_cancel(run.id.clone(), "test over".to_string(), 2).await;
}
