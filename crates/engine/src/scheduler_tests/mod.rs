// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Leader-tick tests, one module per phase.

mod assign;
mod dispatch;
mod intake;
mod materialize;
mod reconcile;

use crate::runtime::WorkerRuntime;
use crate::test_helpers::Fleet;
use gaffer_core::{FakeClock, Role};
use std::sync::Arc;

/// A fleet with an elected, heartbeating leader.
pub(crate) async fn fleet_with_leader() -> (Fleet, Arc<WorkerRuntime<FakeClock>>) {
    let fleet = Fleet::new();
    let leader = fleet.worker("node-a").await;
    leader.election_tick().await.unwrap();
    leader.heartbeat_tick().await.unwrap();
    assert_eq!(leader.role(), Role::Leader);
    (fleet, leader)
}
