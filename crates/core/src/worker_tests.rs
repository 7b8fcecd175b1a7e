// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn worker_id_from_seq() {
    assert_eq!(WorkerId::from_seq(17), "w17");
}

#[test]
fn role_display() {
    assert_eq!(Role::Leader.to_string(), "leader");
    assert_eq!(Role::SubLeader.to_string(), "sub-leader");
    assert_eq!(Role::Worker.to_string(), "worker");
}

#[test]
fn role_serde_is_snake_case() {
    assert_eq!(serde_json::to_string(&Role::SubLeader).unwrap(), "\"sub_leader\"");
}

#[test]
fn role_text_form_round_trips() {
    // Directory hash fields store the Display form.
    for role in [Role::Leader, Role::SubLeader, Role::Worker] {
        assert_eq!(Role::parse_str(&role.to_string()), Some(role));
    }
    assert_eq!(Role::parse_str("subleader"), None);
}

#[test]
fn worker_id_compares_to_str() {
    let id = WorkerId::new("w3");
    assert_eq!(id, "w3");
    assert_eq!(id.as_str(), "w3");
}
