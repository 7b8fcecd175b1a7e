// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordination store key layout.

use gaffer_core::{NodeId, RunId, WorkerId};

/// Counter allocating worker ids.
pub const WORKER_ID_SEQ: &str = "worker:id_seq";

/// Leader lease: value is the holder's worker id, TTL is the lease.
pub const LEADER_LOCK: &str = "leader:lock";

/// Fencing epoch counter; incremented on every new leader acquisition,
/// never reset.
pub const LEADER_EPOCH: &str = "leader:epoch";

/// Wall-clock ms of the leader's most recent tick; the sub-leader's
/// staleness probe reads this.
pub const LEADER_LAST_SEEN: &str = "leader:last_seen_ts";

/// Directory entry for one worker (hash with TTL).
pub fn worker_entry(id: &WorkerId) -> String {
    format!("worker:{}", id)
}

/// Sub-leader lease, scoped to the candidate's node.
pub fn subleader_lock(node: &NodeId) -> String {
    format!("subleader:{}:lock", node)
}

/// Administrative detach signal for one worker.
pub fn detach_flag(id: &WorkerId) -> String {
    format!("detach:{}", id)
}

/// Degrade signal set by the sub-leader on a stalled leader.
pub fn degrade_flag(id: &WorkerId) -> String {
    format!("degrade:{}", id)
}

/// Short-lived assignment lease for one run.
pub fn run_lease(id: &RunId) -> String {
    format!("run_lease:{}", id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_shapes() {
        assert_eq!(worker_entry(&WorkerId::new("w3")), "worker:w3");
        assert_eq!(subleader_lock(&NodeId::new("host-b")), "subleader:host-b:lock");
        assert_eq!(detach_flag(&WorkerId::new("w3")), "detach:w3");
        assert_eq!(run_lease(&RunId::from_string("run-x")), "run_lease:run-x");
    }
}
