// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution.
//!
//! A job is data plus a command name; the executor is the single seam that
//! turns one into an OS process. Combined child output streams to
//! `<log_dir>/<run_id>.log`; the last few KB of stderr are kept in memory
//! for the run's error summary.

use async_trait::async_trait;
use gaffer_core::RunId;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Bytes of trailing stderr retained for `error_summary`.
const STDERR_TAIL_BYTES: usize = 4096;

/// What to execute.
#[derive(Debug, Clone)]
pub struct ExecSpec {
    pub run_id: RunId,
    pub command: String,
    /// Opaque argument map; delivered to the child as JSON in
    /// `GAFFER_ARGS`.
    pub args: Map<String, Value>,
    pub attempt: i32,
    pub timeout: Duration,
    /// Pause between the termination signal and the forceful kill.
    pub grace: Duration,
    pub log_dir: PathBuf,
}

/// How an execution ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecOutcome {
    Exited { exit_code: i32, log_ref: Option<String>, stderr_tail: String },
    TimedOut { log_ref: Option<String> },
    Canceled { log_ref: Option<String> },
    SpawnFailed { error: String },
}

/// The execution seam: `run(command, args, timeout) → outcome + log ref`.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn run(&self, spec: ExecSpec, cancel: CancellationToken) -> ExecOutcome;
}

/// Real subprocess executor.
#[derive(Clone, Default)]
pub struct ProcessExecutor;

#[async_trait]
impl JobExecutor for ProcessExecutor {
    async fn run(&self, spec: ExecSpec, cancel: CancellationToken) -> ExecOutcome {
        let log_path = spec.log_dir.join(format!("{}.log", spec.run_id));
        let log_ref = Some(log_path.display().to_string());

        let args_json = match serde_json::to_string(&Value::Object(spec.args.clone())) {
            Ok(json) => json,
            Err(e) => return ExecOutcome::SpawnFailed { error: e.to_string() },
        };

        let mut command = tokio::process::Command::new(&spec.command);
        command
            .env("GAFFER_RUN_ID", spec.run_id.as_str())
            .env("GAFFER_ATTEMPT", spec.attempt.to_string())
            .env("GAFFER_ARGS", args_json)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ExecOutcome::SpawnFailed {
                    error: format!("spawn {:?} failed: {}", spec.command, e),
                }
            }
        };

        let log_file = match tokio::fs::File::create(&log_path).await {
            Ok(file) => Some(file),
            Err(e) => {
                // Execution still proceeds; the run just has no log body.
                warn!(run_id = %spec.run_id, error = %e, "log file create failed");
                None
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_file = log_file;
        let stderr_file = match &stdout_file {
            Some(file) => file.try_clone().await.ok(),
            None => None,
        };

        let out_task = tokio::spawn(drain(stdout, stdout_file, 0));
        let err_task = tokio::spawn(drain(stderr, stderr_file, STDERR_TAIL_BYTES));

        let pid = child.id();
        let mut timed_out = false;
        let mut canceled = false;

        let status = tokio::select! {
            status = child.wait() => status,
            _ = tokio::time::sleep(spec.timeout) => {
                timed_out = true;
                terminate(&mut child, pid, spec.grace).await
            }
            _ = cancel.cancelled() => {
                canceled = true;
                terminate(&mut child, pid, spec.grace).await
            }
        };

        let _ = out_task.await;
        let stderr_tail = err_task.await.unwrap_or_default();

        if canceled {
            return ExecOutcome::Canceled { log_ref };
        }
        if timed_out {
            return ExecOutcome::TimedOut { log_ref };
        }
        match status {
            Ok(status) => {
                let exit_code = status.code().unwrap_or(-1);
                debug!(run_id = %spec.run_id, exit_code, "subprocess exited");
                ExecOutcome::Exited { exit_code, log_ref, stderr_tail }
            }
            Err(e) => ExecOutcome::SpawnFailed { error: format!("wait failed: {}", e) },
        }
    }
}

/// Signal-then-force-kill with a grace interval, then reap.
async fn terminate(
    child: &mut tokio::process::Child,
    pid: Option<u32>,
    grace: Duration,
) -> std::io::Result<std::process::ExitStatus> {
    if let Some(pid) = pid {
        let _ = nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(pid as i32),
            nix::sys::signal::Signal::SIGTERM,
        );
        if let Ok(status) = tokio::time::timeout(grace, child.wait()).await {
            return status;
        }
    }
    child.kill().await?;
    child.wait().await
}

/// Copy a child stream into the log file, keeping the trailing `tail_cap`
/// bytes in memory.
async fn drain(
    stream: Option<impl tokio::io::AsyncRead + Unpin>,
    mut file: Option<tokio::fs::File>,
    tail_cap: usize,
) -> String {
    let Some(mut stream) = stream else {
        return String::new();
    };
    let mut tail: Vec<u8> = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if let Some(file) = file.as_mut() {
                    let _ = file.write_all(&buf[..n]).await;
                }
                if tail_cap > 0 {
                    tail.extend_from_slice(&buf[..n]);
                    if tail.len() > tail_cap {
                        tail.drain(..tail.len() - tail_cap);
                    }
                }
            }
        }
    }
    if let Some(file) = file.as_mut() {
        let _ = file.flush().await;
    }
    String::from_utf8_lossy(&tail).into_owned()
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
