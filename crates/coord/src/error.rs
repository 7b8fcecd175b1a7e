// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Errors from the coordination store.
///
/// Callers holding a role must treat any of these as "role possibly lost"
/// and step down; none of them is safe to ignore while scheduling.
#[derive(Debug, Error)]
pub enum CoordError {
    #[error("coordination store backend error: {0}")]
    Backend(String),

    #[error("coordination store operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("malformed directory entry for {key}: {reason}")]
    BadEntry { key: String, reason: String },
}

impl From<redis::RedisError> for CoordError {
    fn from(e: redis::RedisError) -> Self {
        CoordError::Backend(e.to_string())
    }
}
