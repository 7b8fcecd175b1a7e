// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fakes for engine and workspace tests: a scripted executor and an
//! in-process control-plane transport.

use crate::executor::{ExecOutcome, ExecSpec, JobExecutor};
use crate::runtime::WorkerRuntime;
use crate::server::handle_request;
use async_trait::async_trait;
use gaffer_core::FakeClock;
use gaffer_wire::{PeerClient, ProtocolError, Request, Response};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Scripted behavior for one command name.
#[derive(Debug, Clone)]
pub enum FakeBehavior {
    /// Exit 0 immediately.
    Succeed,
    /// Exit non-zero immediately.
    Fail { exit_code: i32, stderr: String },
    /// Run for the given duration, then exit 0 (interruptible).
    RunFor(Duration),
    /// Never exit on its own; ends only by timeout or cancellation.
    Hang,
}

/// Executor fake: behaviors are keyed by command name; unknown commands
/// succeed. Honors the requested timeout and the cancellation token the
/// way the process executor does.
#[derive(Default)]
pub struct FakeExecutor {
    behaviors: Mutex<HashMap<String, FakeBehavior>>,
    calls: Mutex<Vec<ExecSpec>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, command: &str, behavior: FakeBehavior) {
        self.behaviors.lock().insert(command.to_string(), behavior);
    }

    /// Specs of every run call so far.
    pub fn calls(&self) -> Vec<ExecSpec> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl JobExecutor for FakeExecutor {
    async fn run(&self, spec: ExecSpec, cancel: CancellationToken) -> ExecOutcome {
        self.calls.lock().push(spec.clone());
        let behavior = self
            .behaviors
            .lock()
            .get(&spec.command)
            .cloned()
            .unwrap_or(FakeBehavior::Succeed);
        let log_ref = Some(format!("fake:{}", spec.run_id));
        match behavior {
            FakeBehavior::Succeed => {
                ExecOutcome::Exited { exit_code: 0, log_ref, stderr_tail: String::new() }
            }
            FakeBehavior::Fail { exit_code, stderr } => {
                ExecOutcome::Exited { exit_code, log_ref, stderr_tail: stderr }
            }
            FakeBehavior::RunFor(duration) => {
                tokio::select! {
                    _ = tokio::time::sleep(duration) => {
                        ExecOutcome::Exited { exit_code: 0, log_ref, stderr_tail: String::new() }
                    }
                    _ = tokio::time::sleep(spec.timeout) => ExecOutcome::TimedOut { log_ref },
                    _ = cancel.cancelled() => ExecOutcome::Canceled { log_ref },
                }
            }
            FakeBehavior::Hang => {
                tokio::select! {
                    _ = tokio::time::sleep(spec.timeout) => ExecOutcome::TimedOut { log_ref },
                    _ = cancel.cancelled() => ExecOutcome::Canceled { log_ref },
                }
            }
        }
    }
}

/// In-process control-plane transport: routes calls by advertised address
/// straight into each runtime's request handler. Addresses can be
/// partitioned away to simulate unreachable peers.
#[derive(Default)]
pub struct LoopbackNet {
    targets: Mutex<HashMap<String, Arc<WorkerRuntime<FakeClock>>>>,
    partitioned: Mutex<HashSet<String>>,
}

impl LoopbackNet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a runtime under its advertised address.
    pub fn register(&self, addr: &str, runtime: Arc<WorkerRuntime<FakeClock>>) {
        self.targets.lock().insert(addr.to_string(), runtime);
    }

    pub fn remove(&self, addr: &str) {
        self.targets.lock().remove(addr);
    }

    /// Make an address unreachable (calls time out).
    pub fn partition(&self, addr: &str, cut: bool) {
        if cut {
            self.partitioned.lock().insert(addr.to_string());
        } else {
            self.partitioned.lock().remove(addr);
        }
    }
}

#[async_trait]
impl PeerClient for LoopbackNet {
    async fn call(
        &self,
        addr: &str,
        request: Request,
        _deadline: Duration,
    ) -> Result<Response, ProtocolError> {
        if self.partitioned.lock().contains(addr) {
            return Err(ProtocolError::Timeout);
        }
        let target = self.targets.lock().get(addr).cloned();
        match target {
            Some(runtime) => Ok(handle_request(&runtime, request).await),
            None => Err(ProtocolError::ConnectionClosed),
        }
    }
}
