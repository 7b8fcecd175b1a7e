// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The six end-to-end operational scenarios.

use crate::prelude::*;
use gaffer_coord::{keys, CoordStore};
use gaffer_core::{Clock, ContinuationState, EventId, Role, RunState, TriggerEvent};
use gaffer_engine::{handle_request, FakeBehavior};
use gaffer_store::RunStore;
use gaffer_wire::{Request, Response, StartJobResult};
use std::time::Duration;

/// S1: a single worker, a one-minute schedule, and a command that exits
/// cleanly. Two minutes later at least one run has succeeded.
#[tokio::test]
async fn s1_one_shot_success() {
    let cluster = Cluster::new();
    let (w1, _) = cluster.worker("node-a").await;
    let def = cluster.minute_definition("a", "noop").await;

    for _ in 0..4 {
        cluster.round(&[&w1]).await;
        cluster.clock.advance(Duration::from_secs(30));
    }

    let store = cluster.store.clone();
    let def_id = def.id.clone();
    eventually(move || {
        let store = store.clone();
        let def_id = def_id.clone();
        async move {
            store
                .all_runs()
                .iter()
                .any(|r| r.definition_id == def_id && r.state == RunState::Succeeded)
        }
    })
    .await;

    let succeeded: Vec<_> = cluster
        .store
        .all_runs()
        .into_iter()
        .filter(|r| r.state == RunState::Succeeded)
        .collect();
    assert!(!succeeded.is_empty());
    for run in succeeded {
        assert_eq!(run.exit_code, Some(0));
        assert!(run.error_summary.is_none());
        assert!(run.log_ref.is_some());
    }
}

/// S2: three workers; the leader is force-killed; a different worker ends
/// up leader with a strictly greater epoch.
#[tokio::test]
async fn s2_leader_failover() {
    let cluster = Cluster::new();
    let (w1, addr1) = cluster.worker("node-a").await;
    let (w2, _) = cluster.worker("node-b").await;
    let (w3, _) = cluster.worker("node-c").await;

    cluster.round(&[&w1, &w2, &w3]).await;
    cluster.round(&[&w1, &w2, &w3]).await;
    assert_eq!(w1.role(), Role::Leader);
    let old_epoch = w1.observed_epoch();
    let survivors: Vec<&Worker> =
        vec![&w2, &w3].into_iter().filter(|w| w.role() == Role::SubLeader).collect();
    assert!(!survivors.is_empty(), "a sub-leader was elected");

    // Force-kill the leader: unreachable, no more ticks, entry expires.
    cluster.net.partition(&addr1, true);

    // Within leader_stale + subleader_check + slack, someone else leads.
    for _ in 0..8 {
        cluster.clock.advance(Duration::from_secs(5));
        for w in [&w2, &w3] {
            w.election_tick().await.unwrap();
            w.heartbeat_tick().await.unwrap();
            if w.role() == Role::SubLeader {
                w.monitor_tick().await.unwrap();
            }
        }
        if w2.role() == Role::Leader || w3.role() == Role::Leader {
            break;
        }
    }

    let new_leader =
        if w2.role() == Role::Leader { &w2 } else { &w3 };
    let status = status_of(new_leader).await;
    assert_eq!(status.role, Role::Leader);
    assert_ne!(status.worker_id, id_of(&w1), "a different worker leads");
    assert!(
        status.observed_epoch > old_epoch,
        "epoch must grow across failover: {} -> {}",
        old_epoch,
        status.observed_epoch
    );
}

/// S3: a worker is detached mid-run; the leader is reachable and the run
/// is still its assignment, so it finishes where it started.
#[tokio::test]
async fn s3_detach_mid_run_continues() {
    let cluster = Cluster::new();
    cluster.store.put_setting("continuation_retry_interval_seconds", "0.01").await.unwrap();
    cluster.store.put_setting("worker_detach_grace_seconds", "0").await.unwrap();
    cluster.executor.script("slowjob", FakeBehavior::RunFor(Duration::from_millis(200)));

    let (leader, _) = cluster.worker("node-a").await;
    let (w2, _) = cluster.worker("node-b").await;
    cluster.round(&[&leader, &w2]).await;
    assert_eq!(leader.role(), Role::Leader);

    let def = cluster.minute_definition("b", "slowjob").await;
    cluster.round(&[&leader, &w2]).await; // materialize, assign, dispatch

    // The run is now RUNNING on w2.
    let running = cluster
        .store
        .all_runs()
        .into_iter()
        .find(|r| r.definition_id == def.id && r.state == RunState::Running)
        .expect("run dispatched to the worker");
    assert_eq!(running.assigned_worker_id, Some(id_of(&w2)));

    // Detach the worker mid-run.
    cluster.coord.set_flag(&keys::detach_flag(&id_of(&w2))).await.unwrap();
    w2.heartbeat_tick().await.unwrap();

    let store = cluster.store.clone();
    let run_id = running.id.clone();
    eventually(move || {
        let store = store.clone();
        let run_id = run_id.clone();
        async move {
            store.get_run(&run_id).await.unwrap().unwrap().state == RunState::Succeeded
        }
    })
    .await;

    let finished = cluster.store.get_run(&running.id).await.unwrap().unwrap();
    assert_eq!(finished.assigned_worker_id, Some(id_of(&w2)), "no reassignment");
    assert_eq!(finished.attempt, 1);
    assert_eq!(finished.continuation_state, ContinuationState::None);
    assert_eq!(finished.exit_code, Some(0));
}

/// S4: a worker crashes while holding an ASSIGNED run; after
/// reassign_after_seconds the run moves ORPHANED → ASSIGNED on a fresh
/// worker with attempt 2.
#[tokio::test]
async fn s4_true_orphan_is_reassigned() {
    let cluster = Cluster::new();
    // Keep dispatch from racing the crash: the command would hang anyway.
    cluster.executor.script("job", FakeBehavior::RunFor(Duration::from_secs(3600)));

    let (leader, _) = cluster.worker("node-a").await;
    let (w3, addr3) = cluster.worker("node-b").await;
    cluster.round(&[&leader, &w3]).await;
    let def = cluster.minute_definition("c", "job").await;

    // w3 crashes right before the dispatch reaches it.
    cluster.net.partition(&addr3, true);
    cluster.round(&[&leader, &w3]).await;
    let run = cluster
        .store
        .all_runs()
        .into_iter()
        .find(|r| r.definition_id == def.id)
        .expect("materialized");
    assert_eq!(run.assigned_worker_id, Some(id_of(&w3)));

    // No heartbeats from w3 anymore; its entry expires, the threshold
    // elapses, and a replacement joins.
    cluster.clock.advance(Duration::from_secs(61));
    let (w4, _) = cluster.worker("node-c").await;
    leader.election_tick().await.unwrap();
    leader.heartbeat_tick().await.unwrap();
    w4.heartbeat_tick().await.unwrap();
    leader.leader_tick().await.unwrap(); // reconcile orphans
    leader.leader_tick().await.unwrap(); // reassign

    let run = cluster.store.get_run(&run.id).await.unwrap().unwrap();
    assert_eq!(run.attempt, 2);
    assert_eq!(run.assigned_worker_id, Some(id_of(&w4)));
}

/// S5: split-brain fencing. A worker that has observed epoch 8 rejects a
/// StartJob dispatched under epoch 7 and the row is untouched.
#[tokio::test]
async fn s5_split_brain_fencing() {
    let cluster = Cluster::new();
    let (w5, _) = cluster.worker("node-a").await;
    let def = cluster.minute_definition("d", "noop").await;

    // Epochs 1..=8 were minted over time; w5 has seen 8.
    for _ in 0..8 {
        cluster.coord.incr(keys::LEADER_EPOCH).await.unwrap();
    }
    let probe = Request::StartJob {
        job_run_id: "run-probe".into(),
        command_name: "noop".to_string(),
        args: serde_json::Map::new(),
        timeout_seconds: 60,
        attempt: 1,
        leader_epoch: 8,
        caller_role: Role::Leader,
    };
    // Not a real run; the call only teaches w5 the epoch.
    let _ = handle_request(&w5, probe).await;
    assert_eq!(w5.observed_epoch(), 8);

    // A run assigned by the stale leader under epoch 7.
    let run = cluster
        .store
        .create_run_if_absent(gaffer_store::NewRun {
            id: "run-r".into(),
            definition_id: def.id.clone(),
            scheduled_for: cluster.clock.now_utc(),
            idempotency_key: "time:def-d:0".to_string(),
            created_at: cluster.clock.now_utc(),
        })
        .await
        .unwrap();
    let guard = gaffer_store::RunGuard::new(RunState::Pending, run.version);
    let patch = gaffer_store::RunPatch::assign(id_of(&w5), cluster.clock.now_utc(), 7);
    cluster.store.update_run(&run.id, &guard, &patch).await.unwrap();
    let before = cluster.store.get_run(&run.id).await.unwrap().unwrap();

    let request = Request::StartJob {
        job_run_id: run.id.clone(),
        command_name: "noop".to_string(),
        args: serde_json::Map::new(),
        timeout_seconds: 60,
        attempt: 1,
        leader_epoch: 7,
        caller_role: Role::Leader,
    };
    let response = handle_request(&w5, request).await;
    assert_eq!(response, Response::StartJob { result: StartJobResult::RejectedOldEpoch });

    let after = cluster.store.get_run(&run.id).await.unwrap().unwrap();
    assert_eq!(after, before, "fenced dispatch must not mutate the run");
}

/// S6: two ingestions with the same dedupe key produce exactly one run.
#[tokio::test]
async fn s6_event_dedup() {
    let cluster = Cluster::new();
    let (leader, _) = cluster.worker("node-a").await;
    cluster.round(&[&leader]).await;

    let def = gaffer_core::JobDefinition::builder()
        .id("def-evt")
        .name("deploy")
        .command("noop")
        .kind(gaffer_core::JobKind::Event)
        .build();
    cluster.store.upsert_definition(&def).await.unwrap();

    for _ in 0..2 {
        let event = TriggerEvent {
            id: EventId::new(),
            event_type: "deploy".to_string(),
            payload: serde_json::json!({"ref": "v2"}),
            dedupe_key: Some("k-1".to_string()),
            created_at: cluster.clock.now_utc(),
            processed_at: None,
        };
        let _ = cluster.store.insert_event(&event).await.unwrap();
        cluster.clock.advance(Duration::from_millis(10));
    }

    cluster.round(&[&leader]).await;
    cluster.round(&[&leader]).await;

    let runs: Vec<_> = cluster
        .store
        .all_runs()
        .into_iter()
        .filter(|r| r.definition_id == def.id)
        .collect();
    assert_eq!(runs.len(), 1, "exactly one run materializes");
    assert!(cluster.store.pending_events(10).await.unwrap().is_empty(), "nothing left to process");
}
