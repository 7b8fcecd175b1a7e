// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

const ALL: [RunState; 9] = [
    RunState::Pending,
    RunState::Assigned,
    RunState::Running,
    RunState::Succeeded,
    RunState::Failed,
    RunState::Canceled,
    RunState::TimedOut,
    RunState::Orphaned,
    RunState::Skipped,
];

#[parameterized(
    assign = { RunState::Pending, RunState::Assigned },
    skip = { RunState::Pending, RunState::Skipped },
    start = { RunState::Assigned, RunState::Running },
    cancel_assigned = { RunState::Assigned, RunState::Canceled },
    orphan = { RunState::Assigned, RunState::Orphaned },
    succeed = { RunState::Running, RunState::Succeeded },
    fail = { RunState::Running, RunState::Failed },
    time_out = { RunState::Running, RunState::TimedOut },
    cancel_running = { RunState::Running, RunState::Canceled },
    reassign = { RunState::Orphaned, RunState::Assigned },
)]
fn permitted_transitions(from: RunState, to: RunState) {
    assert!(from.can_transition(to), "{from} -> {to} should be permitted");
}

#[parameterized(
    regress_running = { RunState::Running, RunState::Pending },
    regress_assigned = { RunState::Assigned, RunState::Pending },
    running_to_orphaned = { RunState::Running, RunState::Orphaned },
    pending_to_running = { RunState::Pending, RunState::Running },
    pending_to_canceled = { RunState::Pending, RunState::Canceled },
    orphaned_to_running = { RunState::Orphaned, RunState::Running },
)]
fn rejected_transitions(from: RunState, to: RunState) {
    assert!(!from.can_transition(to), "{from} -> {to} should be rejected");
}

#[test]
fn terminal_states_have_no_outgoing_edges() {
    for from in ALL {
        if !from.is_terminal() {
            continue;
        }
        for to in ALL {
            assert!(!from.can_transition(to), "{from} is terminal but allows -> {to}");
        }
    }
}

#[test]
fn no_self_transitions() {
    for state in ALL {
        assert!(!state.can_transition(state));
    }
}

#[test]
fn orphaned_is_not_terminal() {
    assert!(!RunState::Orphaned.is_terminal());
}

#[test]
fn time_key_is_stable_per_slot() {
    let def = DefinitionId::from_string("def-a");
    let slot = DateTime::from_timestamp(1_767_225_600, 0).unwrap();
    let k1 = JobRun::time_key(&def, slot);
    let k2 = JobRun::time_key(&def, slot);
    assert_eq!(k1, k2);
    assert_eq!(k1, "time:def-a:1767225600");
}

#[test]
fn event_key_prefers_anchor() {
    assert_eq!(JobRun::event_key("k-1"), "event:k-1");
}

#[test]
fn state_serde_is_snake_case() {
    assert_eq!(serde_json::to_string(&RunState::TimedOut).unwrap(), "\"timed_out\"");
    let back: RunState = serde_json::from_str("\"orphaned\"").unwrap();
    assert_eq!(back, RunState::Orphaned);
}

#[test]
fn text_form_round_trips_for_every_state() {
    // The store writes Display and reads parse_str; they must agree.
    for state in ALL {
        assert_eq!(RunState::parse_str(&state.to_string()), Some(state));
    }
    assert_eq!(RunState::parse_str("TIMED_OUT"), None);
    assert_eq!(RunState::parse_str("nonsense"), None);

    assert_eq!(ContinuationState::parse_str("confirming"), Some(ContinuationState::Confirming));
    assert_eq!(ContinuationState::parse_str(""), None);
}
