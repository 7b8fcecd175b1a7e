// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::fleet_with_leader;
use gaffer_core::{ConcurrencyPolicy, JobDefinition, JobKind, RunState, Schedule, WorkerId};
use gaffer_store::{AuditKind, RunStore};
use std::time::Duration;

#[tokio::test]
async fn materializes_the_due_slot_once() {
    let (fleet, leader) = fleet_with_leader().await;
    let def = fleet.minute_definition("tick").await;

    // The fake clock starts exactly on a minute boundary.
    let tunables = leader.tunables().await;
    leader.materialize(&tunables).await.unwrap();
    let runs = fleet.runs_for(&def.id).await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].state, RunState::Pending);
    assert_eq!(runs[0].scheduled_for, fleet.now());

    // Property: re-materializing the same slot yields the same run.
    let first_id = runs[0].id.clone();
    leader.materialize(&tunables).await.unwrap();
    let runs = fleet.runs_for(&def.id).await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].id, first_id);
}

#[tokio::test]
async fn backlog_past_cutoff_is_skipped_with_audit() {
    let (fleet, leader) = fleet_with_leader().await;
    let def = fleet.minute_definition("tick").await;
    leader.leader_tick().await.unwrap();

    // A 30-minute outage with skip_late_runs_after_seconds = 300.
    fleet.clock.advance(Duration::from_secs(30 * 60));
    leader.election_tick().await.unwrap(); // reclaim the expired lease
    leader.leader_tick().await.unwrap();

    let runs = fleet.runs_for(&def.id).await;
    let pending = runs.iter().filter(|r| r.state == RunState::Pending).count();
    let skipped = runs.iter().filter(|r| r.state == RunState::Skipped).count();
    // Backlog window holds at most 5 one-minute slots plus the current
    // one; the pre-outage slot may sit in any state by now.
    assert!(pending <= 7, "pending={pending}");
    assert_eq!(skipped, 24, "minutes 1..=24 after the old slot are past the cutoff");
    let audits = fleet.store.audit_entries();
    assert_eq!(audits.iter().filter(|a| a.kind == AuditKind::SlotSkipped).count(), 24);
}

#[tokio::test]
async fn unknown_grammar_disables_definition_and_audits_once() {
    let (fleet, leader) = fleet_with_leader().await;
    let def = JobDefinition::builder().id("def-bad").name("bad").kind(JobKind::Time).build();
    assert!(def.schedule.is_none());
    fleet.store.upsert_definition(&def).await.unwrap();

    leader.leader_tick().await.unwrap();
    leader.leader_tick().await.unwrap();

    assert!(fleet.runs_for(&def.id).await.is_empty());
    let audits = fleet.store.audit_entries();
    assert_eq!(
        audits.iter().filter(|a| a.kind == AuditKind::UnknownScheduleGrammar).count(),
        1
    );
}

#[tokio::test]
async fn invalid_grammar_fields_also_disable() {
    let (fleet, leader) = fleet_with_leader().await;
    let def = JobDefinition::builder()
        .id("def-bad")
        .name("bad")
        .schedule(Schedule::Hourly { minute: 99 })
        .build();
    fleet.store.upsert_definition(&def).await.unwrap();

    leader.leader_tick().await.unwrap();
    assert!(fleet.runs_for(&def.id).await.is_empty());
}

#[tokio::test]
async fn forbid_skips_materialization_while_a_run_is_active() {
    let (fleet, leader) = fleet_with_leader().await;
    let mut def = fleet.minute_definition("tick").await;
    def.concurrency = ConcurrencyPolicy::Forbid;
    fleet.store.upsert_definition(&def).await.unwrap();

    leader.materialize(&leader.tunables().await).await.unwrap();
    assert_eq!(fleet.runs_for(&def.id).await.len(), 1);

    // Next slot arrives while the first run is still pending.
    fleet.clock.advance(Duration::from_secs(60));
    leader.materialize(&leader.tunables().await).await.unwrap();
    assert_eq!(fleet.runs_for(&def.id).await.len(), 1, "second slot not materialized");
}

#[tokio::test]
async fn replace_displaces_the_active_run() {
    let (fleet, leader) = fleet_with_leader().await;
    let mut def = fleet.minute_definition("tick").await;
    def.concurrency = ConcurrencyPolicy::Replace;
    fleet.store.upsert_definition(&def).await.unwrap();

    let old = fleet.assigned_run(&def, "time:def-tick:old", &WorkerId::new("w9"), 1).await;

    fleet.clock.advance(Duration::from_secs(60));
    leader.materialize(&leader.tunables().await).await.unwrap();

    assert_eq!(fleet.run(&old.id).await.state, RunState::Canceled);
    let runs = fleet.runs_for(&def.id).await;
    assert!(runs.iter().any(|r| r.state == RunState::Pending), "replacement slot created");
}

#[tokio::test]
async fn disabled_definitions_are_ignored() {
    let (fleet, leader) = fleet_with_leader().await;
    let mut def = fleet.minute_definition("tick").await;
    def.enabled = false;
    fleet.store.upsert_definition(&def).await.unwrap();

    leader.leader_tick().await.unwrap();
    assert!(fleet.runs_for(&def.id).await.is_empty());
}
