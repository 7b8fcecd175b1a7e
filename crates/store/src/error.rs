// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use gaffer_core::RunState;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("run store backend error: {0}")]
    Backend(String),

    /// The patch asked for a transition the table does not permit. This is
    /// a programming error at the call site, not a concurrency miss.
    #[error("illegal run transition {from} -> {to}")]
    IllegalTransition { from: RunState, to: RunState },

    #[error("stored row is malformed: {0}")]
    BadRow(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::BadRow(e.to_string())
    }
}
