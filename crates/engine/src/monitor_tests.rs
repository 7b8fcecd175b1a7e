// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::test_helpers::Fleet;
use gaffer_coord::{keys, CoordStore};
use gaffer_core::{FakeClock, Role};
use crate::runtime::WorkerRuntime;
use std::sync::Arc;
use std::time::Duration;

/// Leader on node-a, sub-leader on node-b, directory published.
async fn leader_and_subleader(
    fleet: &Fleet,
) -> (Arc<WorkerRuntime<FakeClock>>, Arc<WorkerRuntime<FakeClock>>) {
    let leader = fleet.worker("node-a").await;
    leader.election_tick().await.unwrap();
    leader.leader_tick().await.unwrap(); // writes leader:last_seen_ts
    leader.heartbeat_tick().await.unwrap();
    let sub = fleet.worker("node-b").await;
    sub.election_tick().await.unwrap();
    sub.heartbeat_tick().await.unwrap();
    assert_eq!(sub.role(), Role::SubLeader);
    (leader, sub)
}

#[tokio::test]
async fn fresh_last_seen_keeps_monitor_quiet() {
    let fleet = Fleet::new();
    let (_leader, sub) = leader_and_subleader(&fleet).await;
    sub.monitor_tick().await.unwrap();
    assert_eq!(sub.role(), Role::SubLeader);
    assert_eq!(sub.lock_state(|state| state.monitor_failures), 0);
}

#[tokio::test]
async fn reachable_leader_with_stale_marker_is_left_alone() {
    let fleet = Fleet::new();
    let (leader, sub) = leader_and_subleader(&fleet).await;
    fleet.clock.advance(Duration::from_secs(11));
    leader.heartbeat_tick().await.unwrap(); // alive, but last_seen not refreshed
    sub.monitor_tick().await.unwrap();
    assert_eq!(sub.role(), Role::SubLeader);
    assert_eq!(sub.lock_state(|state| state.monitor_failures), 0, "ping succeeded");
}

#[tokio::test]
async fn stalled_leader_is_degraded_and_replaced() {
    let fleet = Fleet::new();
    let (leader, sub) = leader_and_subleader(&fleet).await;
    let leader_id = leader.worker_id();
    let leader_addr = format!("127.0.0.1:{}", leader.config.port);
    fleet.net.partition(&leader_addr, true);

    // Marker goes stale; probes fail three times.
    fleet.clock.advance(Duration::from_secs(11));
    sub.monitor_tick().await.unwrap();
    sub.monitor_tick().await.unwrap();
    assert_eq!(sub.role(), Role::SubLeader);
    sub.monitor_tick().await.unwrap();

    assert!(fleet.coord.get_flag(&keys::degrade_flag(&leader_id)).await.unwrap());

    // The dead leader's lease must expire before the takeover lands.
    if sub.role() != Role::Leader {
        fleet.clock.advance(Duration::from_secs(16));
        sub.monitor_tick().await.unwrap();
    }
    assert_eq!(sub.role(), Role::Leader);
    assert_eq!(sub.observed_epoch(), 2, "promotion mints a fresh epoch");
}
