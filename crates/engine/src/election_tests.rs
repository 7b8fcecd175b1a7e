// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::test_helpers::Fleet;
use gaffer_coord::{keys, CoordStore};
use gaffer_core::Role;
use std::time::Duration;

#[tokio::test]
async fn first_acquisition_takes_leadership_and_bumps_epoch() {
    let fleet = Fleet::new();
    let w1 = fleet.worker("node-a").await;

    w1.election_tick().await.unwrap();
    assert_eq!(w1.role(), Role::Leader);
    assert_eq!(w1.observed_epoch(), 1);
    assert_eq!(fleet.coord.get(keys::LEADER_LOCK).await.unwrap().as_deref(), Some("w1"));
}

#[tokio::test]
async fn repeated_ticks_renew_without_new_epoch() {
    let fleet = Fleet::new();
    let w1 = fleet.worker("node-a").await;
    w1.election_tick().await.unwrap();
    for _ in 0..5 {
        fleet.clock.advance(Duration::from_secs(5));
        w1.election_tick().await.unwrap();
    }
    assert_eq!(w1.role(), Role::Leader);
    assert_eq!(w1.observed_epoch(), 1, "renewal must not mint epochs");
}

#[tokio::test]
async fn lost_lease_demotes_immediately() {
    let fleet = Fleet::new();
    let w1 = fleet.worker("node-a").await;
    w1.election_tick().await.unwrap();

    // Lease expires and another worker grabs it.
    fleet.clock.advance(Duration::from_secs(20));
    let w2 = fleet.worker("node-b").await;
    w2.election_tick().await.unwrap();
    assert_eq!(w2.role(), Role::Leader);
    assert_eq!(w2.observed_epoch(), 2);

    w1.election_tick().await.unwrap();
    assert_eq!(w1.role(), Role::Worker, "old leader steps down on held-by-other");
}

#[tokio::test]
async fn degrade_flag_forces_step_down() {
    let fleet = Fleet::new();
    let w1 = fleet.worker("node-a").await;
    w1.election_tick().await.unwrap();

    fleet.coord.set_flag(&keys::degrade_flag(&w1.worker_id())).await.unwrap();
    w1.election_tick().await.unwrap();
    assert_eq!(w1.role(), Role::Worker);
    // Flag is consumed on the way down.
    assert!(!fleet.coord.get_flag(&keys::degrade_flag(&w1.worker_id())).await.unwrap());
}

#[tokio::test]
async fn draining_worker_holds_no_role() {
    let fleet = Fleet::new();
    let w1 = fleet.worker("node-a").await;
    w1.lock_state_mut(|state| state.draining = true);
    w1.election_tick().await.unwrap();
    assert_eq!(w1.role(), Role::Worker);
    assert_eq!(fleet.coord.get(keys::LEADER_LOCK).await.unwrap(), None);
}

#[tokio::test]
async fn second_worker_on_other_node_becomes_sub_leader() {
    let fleet = Fleet::new();
    let w1 = fleet.worker("node-a").await;
    w1.election_tick().await.unwrap();
    w1.heartbeat_tick().await.unwrap(); // publish leader role in the directory

    let w2 = fleet.worker("node-b").await;
    w2.election_tick().await.unwrap();
    assert_eq!(w2.role(), Role::SubLeader);
}

#[tokio::test]
async fn sub_leader_stays_off_leader_node_in_multi_node_fleet() {
    let fleet = Fleet::new();
    let w1 = fleet.worker("node-a").await;
    w1.election_tick().await.unwrap();
    w1.heartbeat_tick().await.unwrap();
    let _other = fleet.worker("node-b").await; // the fleet spans two nodes

    let w3 = fleet.worker("node-a").await; // same node as the leader
    w3.election_tick().await.unwrap();
    assert_eq!(w3.role(), Role::Worker);
}

#[tokio::test]
async fn single_node_fleet_allows_same_node_sub_leader() {
    let fleet = Fleet::new();
    let w1 = fleet.worker("node-a").await;
    w1.election_tick().await.unwrap();
    w1.heartbeat_tick().await.unwrap();

    let w2 = fleet.worker("node-a").await;
    w2.election_tick().await.unwrap();
    assert_eq!(w2.role(), Role::SubLeader);
}

#[tokio::test]
async fn coord_outage_surfaces_as_error() {
    let fleet = Fleet::new();
    let w1 = fleet.worker("node-a").await;
    fleet.coord.set_fail_all(true);
    assert!(w1.election_tick().await.is_err());
}
