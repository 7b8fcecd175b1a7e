// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use gaffer_core::WorkerId;

fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_767_225_600, 0).unwrap()
}

fn new_run(key: &str) -> NewRun {
    NewRun {
        id: RunId::new(),
        definition_id: DefinitionId::from_string("def-a"),
        scheduled_for: t0(),
        idempotency_key: key.to_string(),
        created_at: t0(),
    }
}

#[tokio::test]
async fn create_run_if_absent_returns_existing_on_conflict() {
    let store = MemoryStore::new();
    let first = store.create_run_if_absent(new_run("time:def-a:0")).await.unwrap();
    let second = store.create_run_if_absent(new_run("time:def-a:0")).await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(store.all_runs().len(), 1);
}

#[tokio::test]
async fn conditional_update_has_one_winner_per_version() {
    let store = MemoryStore::new();
    let run = store.create_run_if_absent(new_run("k")).await.unwrap();

    let guard = RunGuard::new(RunState::Pending, run.version);
    let patch = RunPatch::assign(WorkerId::new("w1"), t0(), 3);
    assert_eq!(store.update_run(&run.id, &guard, &patch).await.unwrap(), 1);

    // Same guard again: version moved on, nobody else wins.
    let patch2 = RunPatch::assign(WorkerId::new("w2"), t0(), 3);
    assert_eq!(store.update_run(&run.id, &guard, &patch2).await.unwrap(), 0);

    let updated = store.get_run(&run.id).await.unwrap().unwrap();
    assert_eq!(updated.state, RunState::Assigned);
    assert_eq!(updated.assigned_worker_id, Some(WorkerId::new("w1")));
    assert_eq!(updated.leader_epoch, Some(3));
    assert_eq!(updated.version, run.version + 1);
}

#[tokio::test]
async fn update_run_rejects_illegal_transition() {
    let store = MemoryStore::new();
    let run = store.create_run_if_absent(new_run("k")).await.unwrap();
    let guard = RunGuard::new(RunState::Pending, run.version);
    let patch = RunPatch { state: Some(RunState::Running), ..RunPatch::default() };
    assert!(matches!(
        store.update_run(&run.id, &guard, &patch).await,
        Err(StoreError::IllegalTransition { .. })
    ));
}

#[tokio::test]
async fn update_run_enforces_worker_and_epoch_guards() {
    let store = MemoryStore::new();
    let run = store.create_run_if_absent(new_run("k")).await.unwrap();
    let assign = RunPatch::assign(WorkerId::new("w1"), t0(), 7);
    store
        .update_run(&run.id, &RunGuard::new(RunState::Pending, run.version), &assign)
        .await
        .unwrap();
    let run = store.get_run(&run.id).await.unwrap().unwrap();

    // Wrong worker misses.
    let wrong_worker = RunGuard::new(RunState::Assigned, run.version).expected_worker("w9");
    assert_eq!(store.update_run(&run.id, &wrong_worker, &RunPatch::start(t0())).await.unwrap(), 0);

    // Wrong epoch misses.
    let wrong_epoch = RunGuard::new(RunState::Assigned, run.version)
        .expected_worker("w1")
        .expected_epoch(6);
    assert_eq!(store.update_run(&run.id, &wrong_epoch, &RunPatch::start(t0())).await.unwrap(), 0);

    // Matching guard wins.
    let good = RunGuard::new(RunState::Assigned, run.version)
        .expected_worker("w1")
        .expected_epoch(7);
    assert_eq!(store.update_run(&run.id, &good, &RunPatch::start(t0())).await.unwrap(), 1);
}

#[tokio::test]
async fn runs_in_state_filters_and_orders() {
    let store = MemoryStore::new();
    let mut late = new_run("a");
    late.scheduled_for = t0() + chrono::Duration::seconds(60);
    let mut early = new_run("b");
    early.scheduled_for = t0();
    store.create_run_if_absent(late).await.unwrap();
    let early = store.create_run_if_absent(early).await.unwrap();

    let due = store
        .runs_in_state(RunState::Pending, Some(t0() + chrono::Duration::seconds(30)), 10)
        .await
        .unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].id, early.id);

    let all = store.runs_in_state(RunState::Pending, None, 10).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, early.id, "ascending scheduled_for");
}

#[tokio::test]
async fn event_dedupe_key_collapses_second_insert() {
    let store = MemoryStore::new();
    let mut first = TriggerEvent {
        id: EventId::new(),
        event_type: "deploy".to_string(),
        payload: serde_json::Value::Null,
        dedupe_key: Some("k-1".to_string()),
        created_at: t0(),
        processed_at: None,
    };
    assert!(store.insert_event(&first).await.unwrap());
    first.id = EventId::new();
    assert!(!store.insert_event(&first).await.unwrap());
    assert_eq!(store.pending_events(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn mark_event_processed_is_idempotent() {
    let store = MemoryStore::new();
    let event = TriggerEvent {
        id: EventId::new(),
        event_type: "deploy".to_string(),
        payload: serde_json::Value::Null,
        dedupe_key: None,
        created_at: t0(),
        processed_at: None,
    };
    store.insert_event(&event).await.unwrap();
    store.mark_event_processed(&event.id, t0()).await.unwrap();
    let later = t0() + chrono::Duration::seconds(5);
    store.mark_event_processed(&event.id, later).await.unwrap();
    assert!(store.pending_events(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn latest_time_slot_ignores_event_runs() {
    let store = MemoryStore::new();
    let mut time_run = new_run("time:def-a:100");
    time_run.scheduled_for = t0();
    store.create_run_if_absent(time_run).await.unwrap();
    let mut event_run = new_run("event:evt-1");
    event_run.scheduled_for = t0() + chrono::Duration::seconds(600);
    store.create_run_if_absent(event_run).await.unwrap();

    let def = DefinitionId::from_string("def-a");
    assert_eq!(store.latest_time_slot(&def).await.unwrap(), Some(t0()));
}
