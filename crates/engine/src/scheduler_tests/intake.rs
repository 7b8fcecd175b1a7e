// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::fleet_with_leader;
use crate::test_helpers::Fleet;
use gaffer_core::{
    ConcurrencyPolicy, EventId, JobDefinition, JobKind, RunState, TriggerEvent, WorkerId,
};
use gaffer_store::{AuditKind, RunStore};

async fn event_definition(fleet: &Fleet, name: &str) -> JobDefinition {
    let def = JobDefinition::builder()
        .id(format!("def-{name}"))
        .name(name)
        .command(name)
        .kind(JobKind::Event)
        .build();
    fleet.store.upsert_definition(&def).await.unwrap();
    def
}

fn event(fleet: &Fleet, event_type: &str, dedupe_key: Option<&str>) -> TriggerEvent {
    TriggerEvent {
        id: EventId::new(),
        event_type: event_type.to_string(),
        payload: serde_json::json!({"source": "test"}),
        dedupe_key: dedupe_key.map(str::to_string),
        created_at: fleet.now(),
        processed_at: None,
    }
}

#[tokio::test]
async fn event_materializes_one_pending_run() {
    let (fleet, leader) = fleet_with_leader().await;
    let def = event_definition(&fleet, "deploy").await;
    let ev = event(&fleet, "deploy", None);
    fleet.store.insert_event(&ev).await.unwrap();

    leader.intake_events(&leader.tunables().await).await.unwrap();

    let runs = fleet.runs_for(&def.id).await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].state, RunState::Pending);
    assert_eq!(runs[0].idempotency_key, format!("event:{}", ev.id));
    assert!(fleet.store.pending_events(10).await.unwrap().is_empty(), "event marked processed");
}

#[tokio::test]
async fn duplicate_dedupe_key_produces_exactly_one_run() {
    let (fleet, leader) = fleet_with_leader().await;
    let def = event_definition(&fleet, "deploy").await;

    // Two ingestions 10ms apart with the same dedupe key: the second
    // collapses into the first row.
    let first = event(&fleet, "deploy", Some("k-1"));
    assert!(fleet.store.insert_event(&first).await.unwrap());
    fleet.clock.advance(std::time::Duration::from_millis(10));
    let second = event(&fleet, "deploy", Some("k-1"));
    assert!(!fleet.store.insert_event(&second).await.unwrap());

    leader.intake_events(&leader.tunables().await).await.unwrap();
    leader.intake_events(&leader.tunables().await).await.unwrap();

    let runs = fleet.runs_for(&def.id).await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].idempotency_key, "event:k-1");
}

#[tokio::test]
async fn replayed_intake_is_idempotent_on_the_run_key() {
    // A crash between run insert and mark-processed re-processes the
    // event; the run key is the idempotency anchor.
    let (fleet, leader) = fleet_with_leader().await;
    let def = event_definition(&fleet, "deploy").await;
    let ev = event(&fleet, "deploy", Some("k-9"));
    fleet.store.insert_event(&ev).await.unwrap();
    // The run already exists from the interrupted first intake.
    fleet.pending_run(&def, "event:k-9").await;

    leader.intake_events(&leader.tunables().await).await.unwrap();
    assert_eq!(fleet.runs_for(&def.id).await.len(), 1);
    assert!(fleet.store.pending_events(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_event_type_is_consumed_with_audit() {
    let (fleet, leader) = fleet_with_leader().await;
    let ev = event(&fleet, "nobody-home", None);
    fleet.store.insert_event(&ev).await.unwrap();

    leader.intake_events(&leader.tunables().await).await.unwrap();

    assert!(fleet.store.pending_events(10).await.unwrap().is_empty());
    assert!(fleet.store.all_runs().is_empty());
    let audits = fleet.store.audit_entries();
    assert_eq!(audits.iter().filter(|a| a.kind == AuditKind::UnknownEventType).count(), 1);
}

#[tokio::test]
async fn forbid_defers_event_until_active_run_finishes() {
    let (fleet, leader) = fleet_with_leader().await;
    let mut def = event_definition(&fleet, "deploy").await;
    def.concurrency = ConcurrencyPolicy::Forbid;
    fleet.store.upsert_definition(&def).await.unwrap();
    let blocking = fleet.assigned_run(&def, "event:blocker", &WorkerId::new("w9"), 1).await;

    let ev = event(&fleet, "deploy", Some("k-2"));
    fleet.store.insert_event(&ev).await.unwrap();

    leader.intake_events(&leader.tunables().await).await.unwrap();
    assert_eq!(fleet.store.pending_events(10).await.unwrap().len(), 1, "event deferred");
    assert_eq!(fleet.runs_for(&def.id).await.len(), 1);

    // Blocker finishes; the deferred event now materializes.
    leader.leader_cancel(&blocking, "test").await.unwrap();
    leader.intake_events(&leader.tunables().await).await.unwrap();
    assert!(fleet.store.pending_events(10).await.unwrap().is_empty());
    assert_eq!(fleet.runs_for(&def.id).await.len(), 2);
}
