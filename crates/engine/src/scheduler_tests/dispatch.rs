// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::fleet_with_leader;
use crate::test_helpers::eventually_async;
use gaffer_core::{Role, RunState};
use gaffer_store::RunStore;

#[tokio::test]
async fn accepted_dispatch_starts_the_run_on_the_worker() {
    let (fleet, leader) = fleet_with_leader().await;
    let worker = fleet.worker("node-b").await;
    worker.heartbeat_tick().await.unwrap();

    let def = fleet.minute_definition("tick").await;
    let run = fleet.assigned_run(&def, "time:def-tick:0", &worker.worker_id(), 1).await;

    leader.dispatch(&leader.tunables().await).await.unwrap();

    // The worker took ASSIGNED → RUNNING synchronously in the handler;
    // the driver finishes it shortly after.
    let store = fleet.store.clone();
    let run_id = run.id.clone();
    eventually_async(|| {
        let store = store.clone();
        let run_id = run_id.clone();
        async move {
            store.get_run(&run_id).await.unwrap().unwrap().state == RunState::Succeeded
        }
    })
    .await;
    let finished = fleet.run(&run.id).await;
    assert_eq!(finished.exit_code, Some(0));
    assert_eq!(finished.leader_epoch, Some(1));
    assert!(worker.lock_state(|state| state.runs.is_empty()), "handle released");
}

#[tokio::test]
async fn old_epoch_rejection_demotes_the_dispatching_leader() {
    let (fleet, leader) = fleet_with_leader().await;
    let worker = fleet.worker("node-b").await;
    worker.heartbeat_tick().await.unwrap();
    // The worker has already seen a newer leader.
    worker.lock_state_mut(|state| state.observe_epoch(9));

    let def = fleet.minute_definition("tick").await;
    let run = fleet.assigned_run(&def, "time:def-tick:0", &worker.worker_id(), 1).await;
    let version_before = fleet.run(&run.id).await.version;

    let demoted = leader.dispatch(&leader.tunables().await).await.unwrap();

    assert!(demoted);
    assert_eq!(leader.role(), Role::Worker);
    assert_eq!(fleet.run(&run.id).await.version, version_before, "row untouched");
}

#[tokio::test]
async fn detached_rejection_puts_run_on_reassignment_path() {
    let (fleet, leader) = fleet_with_leader().await;
    let worker = fleet.worker("node-b").await;
    worker.lock_state_mut(|state| state.detached = true);
    worker.heartbeat_tick().await.unwrap();

    let def = fleet.minute_definition("tick").await;
    let run = fleet.assigned_run(&def, "time:def-tick:0", &worker.worker_id(), 1).await;

    leader.dispatch(&leader.tunables().await).await.unwrap();
    assert_eq!(fleet.run(&run.id).await.state, RunState::Orphaned);
}

#[tokio::test]
async fn transport_failures_eventually_orphan_the_dispatch() {
    let (fleet, leader) = fleet_with_leader().await;
    let worker = fleet.worker("node-b").await;
    worker.heartbeat_tick().await.unwrap();
    fleet.net.partition(&format!("127.0.0.1:{}", worker.config.port), true);

    let def = fleet.minute_definition("tick").await;
    let run = fleet.assigned_run(&def, "time:def-tick:0", &worker.worker_id(), 1).await;

    let tunables = leader.tunables().await;
    leader.dispatch(&tunables).await.unwrap();
    leader.dispatch(&tunables).await.unwrap();
    assert_eq!(fleet.run(&run.id).await.state, RunState::Assigned, "still within the window");
    leader.dispatch(&tunables).await.unwrap();
    assert_eq!(fleet.run(&run.id).await.state, RunState::Orphaned, "declared unreachable");
}
