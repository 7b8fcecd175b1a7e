// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use gaffer_coord::CoordError;
use gaffer_store::StoreError;
use thiserror::Error;

/// Errors surfaced by the engine's own loops and handlers.
///
/// Coordination-store and RPC failures never leave the process; loops log
/// them and, where a role is at stake, step down.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Coord(#[from] CoordError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("worker is shutting down")]
    ShuttingDown,

    #[error("{0}")]
    Internal(String),
}
