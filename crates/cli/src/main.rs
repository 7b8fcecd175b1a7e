// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! gaffer: thin operator CLI over the control-plane RPC.
//!
//! Read a worker's status, drain it, cancel a run at the leader, or push
//! a trigger event for a fleet under test. The administrative surface
//! proper lives elsewhere; this is the screwdriver.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gaffer_core::{EventId, Role, TriggerEvent};
use gaffer_store::{PgStore, RunStore};
use gaffer_wire::{CancelJobResult, PeerClient, Request, Response, TcpPeer};
use std::time::Duration;

const CALL_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "gaffer", about = "Gaffer control-plane CLI", version)]
struct Cli {
    /// Worker RPC address to talk to.
    #[arg(long, env = "GAFFER_ADDR", default_value = "127.0.0.1:7070", global = true)]
    addr: String,

    /// Shared auth token for the control plane.
    #[arg(long, env = "GAFFER_AUTH_TOKEN", global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show a worker's status snapshot.
    Status,

    /// Liveness-probe a worker.
    Ping,

    /// Stop (or resume) the worker accepting new runs.
    Drain {
        /// `on` to drain, `off` to resume
        state: String,
    },

    /// Cancel a run. Point --addr at the leader.
    Cancel {
        run_id: String,
        #[arg(long, default_value = "canceled by operator")]
        reason: String,
    },

    /// Insert a trigger event directly into the run store.
    Emit {
        event_type: String,
        #[arg(long)]
        payload: Option<String>,
        #[arg(long)]
        dedupe_key: Option<String>,
        #[arg(long, env = "GAFFER_DATABASE_URL")]
        database_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = TcpPeer::new(cli.token.clone());

    match cli.command {
        Command::Status => {
            let response = client.call(&cli.addr, Request::GetStatus, CALL_DEADLINE).await?;
            let Response::Status { status } = response else {
                bail!("unexpected response: {response:?}");
            };
            println!("worker   {}", status.worker_id);
            println!("node     {}", status.node_id);
            println!("role     {}", status.role);
            println!("epoch    {}", status.observed_epoch);
            println!("load     {}", status.load);
            if let Some(run) = &status.current_run_id {
                println!("running  {}", run);
            }
            if status.draining {
                println!("draining");
            }
            if status.detached {
                println!("detached");
            }
        }
        Command::Ping => {
            let request = Request::Ping { sender: "cli".into(), caller_role: Role::Worker };
            match client.call(&cli.addr, request, CALL_DEADLINE).await? {
                Response::Pong { worker_id, role, observed_epoch } => {
                    println!("{worker_id} {role} epoch={observed_epoch}");
                }
                other => bail!("unexpected response: {other:?}"),
            }
        }
        Command::Drain { state } => {
            let enable = match state.as_str() {
                "on" => true,
                "off" => false,
                other => bail!("expected on|off, got {other:?}"),
            };
            let request = Request::Drain { enable, leader_epoch: 0, caller_role: Role::Worker };
            match client.call(&cli.addr, request, CALL_DEADLINE).await? {
                Response::Drain { draining } => {
                    println!("draining: {draining}");
                }
                other => bail!("unexpected response: {other:?}"),
            }
        }
        Command::Cancel { run_id, reason } => {
            let request = Request::CancelJob {
                job_run_id: run_id.as_str().into(),
                reason,
                leader_epoch: fetch_epoch(&client, &cli.addr).await?,
                caller_role: Role::Worker,
            };
            match client.call(&cli.addr, request, CALL_DEADLINE).await? {
                Response::CancelJob { result: CancelJobResult::Accepted } => {
                    println!("canceled {run_id}");
                }
                Response::CancelJob { result } => bail!("cancel refused: {result:?}"),
                other => bail!("unexpected response: {other:?}"),
            }
        }
        Command::Emit { event_type, payload, dedupe_key, database_url } => {
            let payload = match payload {
                Some(raw) => serde_json::from_str(&raw).context("payload is not valid JSON")?,
                None => serde_json::Value::Null,
            };
            let store = PgStore::connect(&database_url).await?;
            let event = TriggerEvent {
                id: EventId::new(),
                event_type,
                payload,
                dedupe_key,
                created_at: chrono::Utc::now(),
                processed_at: None,
            };
            if store.insert_event(&event).await? {
                println!("event {}", event.id);
            } else {
                println!("duplicate of an existing event, nothing inserted");
            }
        }
    }
    Ok(())
}

/// The target worker's observed epoch, cited back so the cancel passes
/// its fencing check.
async fn fetch_epoch(client: &TcpPeer, addr: &str) -> Result<i64> {
    let response = client.call(addr, Request::GetStatus, CALL_DEADLINE).await?;
    match response {
        Response::Status { status } => Ok(status.observed_epoch),
        other => bail!("unexpected response: {other:?}"),
    }
}
