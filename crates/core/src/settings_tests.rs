// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashMap;

#[test]
fn defaults_apply_when_lookup_is_empty() {
    let tunables = Tunables::from_lookup(|_| None);
    assert_eq!(tunables, Tunables::default());
}

#[test]
fn lookup_overrides_defaults() {
    let mut map = HashMap::new();
    map.insert(keys::LEADER_TICK_SECONDS.to_string(), "7".to_string());
    map.insert(keys::CONTINUATION_RETRY_INTERVAL_SECONDS.to_string(), "0.5".to_string());
    let tunables = Tunables::from_lookup(|k| map.get(k).cloned());
    assert_eq!(tunables.leader_tick_seconds, 7);
    assert_eq!(tunables.continuation_retry_interval_seconds, 0.5);
    // Untouched keys keep their defaults
    assert_eq!(tunables.max_jobs_per_worker, Tunables::default().max_jobs_per_worker);
}

#[test]
fn unparseable_values_fall_back() {
    let tunables = Tunables::from_lookup(|k| {
        (k == keys::MAX_JOBS_PER_WORKER).then(|| "not-a-number".to_string())
    });
    assert_eq!(tunables.max_jobs_per_worker, Tunables::default().max_jobs_per_worker);
}

#[test]
fn env_var_names_are_prefixed_upper() {
    assert_eq!(env_var_for(keys::LEADER_TICK_SECONDS), "GAFFER_LEADER_TICK_SECONDS");
}

#[test]
fn auth_token_is_secret() {
    assert!(SECRET_KEYS.contains(&keys::AUTH_TOKEN));
}
