// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::fleet_with_leader;
use crate::scheduler::sort_candidates;
use gaffer_core::{RunState, WorkerEntry, WorkerId};
use gaffer_store::RunStore;
use std::time::Duration;

#[tokio::test]
async fn assigns_due_pending_run_to_non_leader_candidate() {
    let (fleet, leader) = fleet_with_leader().await;
    let worker = fleet.worker("node-b").await;
    worker.heartbeat_tick().await.unwrap();

    let def = fleet.minute_definition("tick").await;
    let run = fleet.pending_run(&def, "time:def-tick:0").await;

    leader.assign(&leader.tunables().await).await.unwrap();

    let run = fleet.run(&run.id).await;
    assert_eq!(run.state, RunState::Assigned);
    assert_eq!(run.assigned_worker_id, Some(worker.worker_id()));
    assert_eq!(run.leader_epoch, Some(1));
    assert_eq!(run.assigned_at, Some(fleet.now()));
}

#[tokio::test]
async fn leader_is_assigned_only_when_alone() {
    let (fleet, leader) = fleet_with_leader().await;
    let def = fleet.minute_definition("tick").await;
    let run = fleet.pending_run(&def, "time:def-tick:0").await;

    leader.assign(&leader.tunables().await).await.unwrap();
    assert_eq!(fleet.run(&run.id).await.assigned_worker_id, Some(leader.worker_id()));
}

#[tokio::test]
async fn second_assignment_pass_finds_nothing_to_do() {
    let (fleet, leader) = fleet_with_leader().await;
    let worker = fleet.worker("node-b").await;
    worker.heartbeat_tick().await.unwrap();
    let def = fleet.minute_definition("tick").await;
    let run = fleet.pending_run(&def, "time:def-tick:0").await;

    leader.assign(&leader.tunables().await).await.unwrap();
    let assigned_version = fleet.run(&run.id).await.version;
    leader.assign(&leader.tunables().await).await.unwrap();
    assert_eq!(fleet.run(&run.id).await.version, assigned_version, "no second winner");
}

#[tokio::test]
async fn stale_and_flagged_workers_are_not_candidates() {
    let (fleet, leader) = fleet_with_leader().await;
    let worker = fleet.worker("node-b").await;
    worker.lock_state_mut(|state| state.draining = true);
    worker.heartbeat_tick().await.unwrap();

    let def = fleet.minute_definition("tick").await;
    let run = fleet.pending_run(&def, "time:def-tick:0").await;
    leader.assign(&leader.tunables().await).await.unwrap();

    // Draining worker skipped; the leader itself was the only candidate.
    assert_eq!(fleet.run(&run.id).await.assigned_worker_id, Some(leader.worker_id()));
}

#[test]
fn scoring_prefers_low_load_then_fresh_heartbeat_then_id() {
    let mut pool = vec![
        WorkerEntry::builder().worker_id("w4").load(1).last_heartbeat_ms(90).build(),
        WorkerEntry::builder().worker_id("w3").load(0).last_heartbeat_ms(50).build(),
        WorkerEntry::builder().worker_id("w2").load(0).last_heartbeat_ms(80).build(),
        WorkerEntry::builder().worker_id("w1").load(0).last_heartbeat_ms(80).build(),
    ];
    sort_candidates(&mut pool);
    let order: Vec<&str> = pool.iter().map(|e| e.worker_id.as_str()).collect();
    assert_eq!(order, ["w1", "w2", "w3", "w4"]);
}

#[tokio::test]
async fn orphaned_run_is_reassigned_with_bumped_attempt() {
    let (fleet, leader) = fleet_with_leader().await;
    let def = fleet.minute_definition("tick").await;
    // Assigned to a worker that died; reconcile already orphaned it.
    let run = fleet.assigned_run(&def, "time:def-tick:0", &WorkerId::new("w9"), 1).await;
    let guard = gaffer_store::RunGuard::new(RunState::Assigned, run.version);
    fleet.store.update_run(&run.id, &guard, &gaffer_store::RunPatch::orphan()).await.unwrap();

    let replacement = fleet.worker("node-b").await;
    replacement.heartbeat_tick().await.unwrap();
    fleet.clock.advance(Duration::from_secs(61));
    leader.heartbeat_tick().await.unwrap();
    replacement.heartbeat_tick().await.unwrap();

    leader.assign(&leader.tunables().await).await.unwrap();

    let run = fleet.run(&run.id).await;
    assert_eq!(run.state, RunState::Assigned);
    assert_eq!(run.attempt, 2);
    assert_eq!(run.assigned_worker_id, Some(replacement.worker_id()));
}

#[tokio::test]
async fn orphan_past_retry_cap_stays_orphaned() {
    let (fleet, leader) = fleet_with_leader().await;
    let mut def = fleet.minute_definition("tick").await;
    def.max_retries = 1;
    fleet.store.upsert_definition(&def).await.unwrap();

    let run = fleet.assigned_run(&def, "time:def-tick:0", &WorkerId::new("w9"), 1).await;
    let guard = gaffer_store::RunGuard::new(RunState::Assigned, run.version);
    let patch = gaffer_store::RunPatch {
        attempt: Some(2),
        ..gaffer_store::RunPatch::orphan()
    };
    fleet.store.update_run(&run.id, &guard, &patch).await.unwrap();

    fleet.clock.advance(Duration::from_secs(120));
    leader.heartbeat_tick().await.unwrap();
    leader.assign(&leader.tunables().await).await.unwrap();

    assert_eq!(fleet.run(&run.id).await.state, RunState::Orphaned);
}
