// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::fleet_with_leader;
use gaffer_core::{ContinuationState, RunState, WorkerId};
use gaffer_store::{RunGuard, RunPatch, RunStore};
use std::time::Duration;

#[tokio::test]
async fn assigned_run_on_vanished_worker_is_orphaned_after_threshold() {
    let (fleet, leader) = fleet_with_leader().await;
    let def = fleet.minute_definition("tick").await;
    // w9 never heartbeats: it is absent from the directory.
    let run = fleet.assigned_run(&def, "time:def-tick:0", &WorkerId::new("w9"), 1).await;

    let tunables = leader.tunables().await;
    leader.reconcile(&tunables).await.unwrap();
    assert_eq!(fleet.run(&run.id).await.state, RunState::Assigned, "threshold not reached");

    fleet.clock.advance(Duration::from_secs(61));
    leader.reconcile(&tunables).await.unwrap();
    assert_eq!(fleet.run(&run.id).await.state, RunState::Orphaned);
}

#[tokio::test]
async fn stale_heartbeat_counts_as_lost() {
    let (fleet, leader) = fleet_with_leader().await;
    let worker = fleet.worker("node-b").await;
    worker.heartbeat_tick().await.unwrap();
    let def = fleet.minute_definition("tick").await;
    let run = fleet.assigned_run(&def, "time:def-tick:0", &worker.worker_id(), 1).await;

    // Heartbeats keep coming at first, then stop; the directory entry TTL
    // would drop it, which reads as "missing" here.
    fleet.clock.advance(Duration::from_secs(61));
    leader.reconcile(&leader.tunables().await).await.unwrap();
    assert_eq!(fleet.run(&run.id).await.state, RunState::Orphaned);
}

#[tokio::test]
async fn healthy_worker_keeps_its_assignment() {
    let (fleet, leader) = fleet_with_leader().await;
    let worker = fleet.worker("node-b").await;
    let def = fleet.minute_definition("tick").await;
    let run = fleet.assigned_run(&def, "time:def-tick:0", &worker.worker_id(), 1).await;

    fleet.clock.advance(Duration::from_secs(61));
    worker.heartbeat_tick().await.unwrap();
    leader.reconcile(&leader.tunables().await).await.unwrap();
    assert_eq!(fleet.run(&run.id).await.state, RunState::Assigned);
}

#[tokio::test]
async fn confirming_run_is_shielded_from_orphaning() {
    let (fleet, leader) = fleet_with_leader().await;
    let def = fleet.minute_definition("tick").await;
    let run = fleet.assigned_run(&def, "time:def-tick:0", &WorkerId::new("w9"), 1).await;

    // The (unreachable) worker moved it to RUNNING and then marked the
    // continuation check before we lost it.
    let guard = RunGuard::new(RunState::Assigned, run.version).expected_worker("w9");
    fleet.store.update_run(&run.id, &guard, &RunPatch::start(fleet.now())).await.unwrap();
    let run = fleet.run(&run.id).await;
    let guard = RunGuard::new(RunState::Running, run.version);
    let deadline = fleet.now() + chrono::Duration::seconds(30);
    fleet
        .store
        .update_run(&run.id, &guard, &RunPatch::confirming(fleet.now(), deadline))
        .await
        .unwrap();

    fleet.clock.advance(Duration::from_secs(600));
    leader.reconcile(&leader.tunables().await).await.unwrap();

    let run = fleet.run(&run.id).await;
    assert_eq!(run.continuation_state, ContinuationState::Confirming);
    assert_eq!(run.state, RunState::Running, "no orphan transition while confirming");
}
