// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::test_helpers::Fleet;
use gaffer_coord::{keys, CoordStore};
use gaffer_core::Role;
use std::time::Duration;

#[tokio::test]
async fn heartbeat_refreshes_directory_entry() {
    let fleet = Fleet::new();
    let w1 = fleet.worker("node-a").await;
    let before = fleet.coord.scan_workers().await.unwrap()[0].last_heartbeat_ms;

    fleet.clock.advance(Duration::from_secs(5));
    w1.heartbeat_tick().await.unwrap();
    let after = fleet.coord.scan_workers().await.unwrap()[0].last_heartbeat_ms;
    assert_eq!(after, before + 5_000);
}

#[tokio::test]
async fn missed_heartbeats_expire_the_entry() {
    let fleet = Fleet::new();
    let _w1 = fleet.worker("node-a").await;
    fleet.clock.advance(Duration::from_secs(16));
    assert!(fleet.coord.scan_workers().await.unwrap().is_empty());
}

#[tokio::test]
async fn detach_flag_is_ignored_within_the_grace_age() {
    let fleet = Fleet::new();
    let w1 = fleet.worker("node-a").await;
    fleet.coord.set_flag(&keys::detach_flag(&w1.worker_id())).await.unwrap();

    // Default grace is 10s; a fresh incarnation shrugs the flag off.
    fleet.clock.advance(Duration::from_secs(5));
    w1.heartbeat_tick().await.unwrap();
    assert_eq!(w1.worker_id(), "w1");
    assert!(!w1.lock_state(|state| state.detached));
}

#[tokio::test]
async fn idle_detached_worker_re_registers_under_new_id() {
    let fleet = Fleet::new();
    let w1 = fleet.worker("node-a").await;
    assert_eq!(w1.worker_id(), "w1");

    fleet.coord.set_flag(&keys::detach_flag(&w1.worker_id())).await.unwrap();
    fleet.clock.advance(Duration::from_secs(10));
    w1.heartbeat_tick().await.unwrap();

    assert_eq!(w1.worker_id(), "w2", "fresh id from the directory counter");
    assert!(!w1.lock_state(|state| state.detached));
    assert!(!fleet.coord.get_flag(&keys::detach_flag(&"w1".into())).await.unwrap());
    let entries = fleet.coord.scan_workers().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].worker_id, "w2");
}

#[tokio::test]
async fn detach_drops_any_held_role() {
    let fleet = Fleet::new();
    let w1 = fleet.worker("node-a").await;
    w1.election_tick().await.unwrap();
    assert_eq!(w1.role(), Role::Leader);

    fleet.coord.set_flag(&keys::detach_flag(&w1.worker_id())).await.unwrap();
    fleet.clock.advance(Duration::from_secs(10));
    w1.election_tick().await.unwrap(); // keeps the lease alive past the advance
    w1.heartbeat_tick().await.unwrap();

    assert_eq!(w1.role(), Role::Worker);
    assert_eq!(fleet.coord.get(keys::LEADER_LOCK).await.unwrap(), None, "lease released");
}
