// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker identity and role.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Fencing token: monotonically increasing integer incremented on every new
/// leader acquisition, never reset.
pub type Epoch = i64;

/// Unique identifier for a worker instance.
///
/// Allocated from the coordination store's `worker:id_seq` counter at
/// startup (formatted `w{n}`), so it is monotonic across the fleet. A
/// worker that re-registers after a detach gets a fresh id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub String);

impl WorkerId {
    /// Create a new WorkerId from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Format a WorkerId from the directory counter.
    pub fn from_seq(seq: i64) -> Self {
        Self(format!("w{}", seq))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for WorkerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for WorkerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl PartialEq<str> for WorkerId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for WorkerId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Borrow<str> for WorkerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Host identity, shared by every worker process on the same machine.
///
/// Used to keep the sub-leader off the leader's host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Role a worker currently holds. A role is an attribute of the process,
/// not a separate entity; transitions are local and driven by lease
/// ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Leader,
    SubLeader,
    Worker,
}

impl Role {
    pub fn is_leader(self) -> bool {
        matches!(self, Role::Leader)
    }
}

crate::text_enum! {
    Role {
        Leader => "leader",
        SubLeader => "sub-leader",
        Worker => "worker",
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
