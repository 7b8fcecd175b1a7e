// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::short;
use crate::run::RunId;

#[test]
fn generated_ids_carry_prefix() {
    let id = RunId::new();
    assert!(id.as_str().starts_with("run-"));
    assert_eq!(id.suffix().len(), 16);
}

#[test]
fn generated_ids_are_unique() {
    let a = RunId::new();
    let b = RunId::new();
    assert_ne!(a, b);
}

#[test]
fn from_string_round_trips() {
    let id = RunId::from_string("run-abc123");
    assert_eq!(id.as_str(), "run-abc123");
    assert_eq!(id.suffix(), "abc123");
    assert_eq!(id, "run-abc123");
}

#[test]
fn suffix_without_prefix_is_whole_string() {
    let id = RunId::from_string("bare");
    assert_eq!(id.suffix(), "bare");
}

#[test]
fn short_truncates() {
    assert_eq!(short("abcdef", 3), "abc");
    assert_eq!(short("ab", 3), "ab");
}

#[test]
fn serde_is_transparent() {
    let id = RunId::from_string("run-xyz");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"run-xyz\"");
    let back: RunId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}
