// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn addr_joins_host_and_port() {
    let entry = WorkerEntry::builder().host("10.0.0.5").port(7071).build();
    assert_eq!(entry.addr(), "10.0.0.5:7071");
}

#[test]
fn heartbeat_age_saturates_on_skew() {
    let entry = WorkerEntry::builder().last_heartbeat_ms(10_000).build();
    assert_eq!(entry.heartbeat_age_ms(8_000), 0);
    assert_eq!(entry.heartbeat_age_ms(13_000), 3_000);
}

#[parameterized(
    fresh = { 0, true },
    at_ttl = { 15_000, true },
    stale = { 15_001, false },
)]
fn freshness_tracks_ttl(age_ms: u64, want: bool) {
    let entry = WorkerEntry::builder().last_heartbeat_ms(100_000).build();
    assert_eq!(entry.is_fresh(100_000 + age_ms, 15), want);
}

#[parameterized(
    ok = { false, false, 0, true },
    detached = { true, false, 0, false },
    draining = { false, true, 0, false },
    loaded = { false, false, 4, false },
)]
fn candidate_filter(detached: bool, draining: bool, load: u32, want: bool) {
    let entry = WorkerEntry::builder()
        .last_heartbeat_ms(50_000)
        .detached(detached)
        .draining(draining)
        .load(load)
        .build();
    assert_eq!(entry.is_candidate(50_000, 15, 4), want);
}
