// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::schedule::Schedule;

#[test]
fn time_definition_without_schedule_is_not_schedulable() {
    let def = JobDefinition::builder().build();
    assert_eq!(def.kind, JobKind::Time);
    assert!(def.schedule.is_none());
    assert!(!def.is_schedulable());
}

#[test]
fn time_definition_with_schedule_is_schedulable() {
    let def = JobDefinition::builder().schedule(Schedule::EveryNMinutes { n: 1 }).build();
    assert!(def.is_schedulable());
}

#[test]
fn disabled_definition_is_not_schedulable() {
    let def = JobDefinition::builder()
        .enabled(false)
        .schedule(Schedule::EveryNMinutes { n: 1 })
        .build();
    assert!(!def.is_schedulable());
}

#[test]
fn event_definition_needs_no_schedule() {
    let def = JobDefinition::builder().kind(JobKind::Event).build();
    assert!(def.is_schedulable());
}

#[test]
fn concurrency_defaults_to_forbid_in_serde() {
    let json = r#"{
        "id": "def-x", "name": "x", "enabled": true, "kind": "event",
        "command": "noop", "timeout_seconds": 5, "max_retries": 1,
        "retry_backoff_seconds": 0
    }"#;
    let def: JobDefinition = serde_json::from_str(json).unwrap();
    assert_eq!(def.concurrency, ConcurrencyPolicy::Forbid);
    assert!(def.default_args.is_empty());
}
