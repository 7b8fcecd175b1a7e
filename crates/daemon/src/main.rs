// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gafferd: one worker process of the Gaffer fleet.
//!
//! Wires the Redis coordination store, the PostgreSQL run store, the
//! subprocess executor, and the TCP control plane into a
//! [`gaffer_engine::WorkerRuntime`], then runs its loops until SIGINT.

mod env;

use anyhow::{Context, Result};
use clap::Parser;
use gaffer_coord::RedisCoord;
use gaffer_core::{NodeId, SystemClock};
use gaffer_engine::{EngineConfig, EngineDeps, ProcessExecutor, WorkerRuntime};
use gaffer_store::{PgStore, RunStore};
use gaffer_wire::TcpPeer;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Deadline for individual coordination-store operations.
const COORD_OP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "gafferd", about = "Gaffer worker daemon", version)]
struct Args {
    /// Coordination store URL.
    #[arg(long, env = "GAFFER_COORD_URL", default_value = "redis://127.0.0.1:6379")]
    coord_url: String,

    /// Run store (PostgreSQL) URL.
    #[arg(long, env = "GAFFER_DATABASE_URL")]
    database_url: String,

    /// Host advertised to peers and bound by the RPC server.
    #[arg(long, env = "GAFFER_BIND_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port range to bind the RPC server in (first free wins).
    #[arg(long, env = "GAFFER_PORT_RANGE", default_value = "7070-7079")]
    port_range: String,

    /// Directory for per-run log files (defaults under the state dir).
    #[arg(long, env = "GAFFER_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Write daemon logs to a file under the state dir instead of stderr.
    #[arg(long)]
    log_to_file: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let state_dir = env::state_dir()?;
    std::fs::create_dir_all(&state_dir)
        .with_context(|| format!("creating state dir {}", state_dir.display()))?;

    let _guard = init_tracing(&args, &state_dir)?;

    let node_id = env::node_id()?;
    let log_dir = args.log_dir.clone().unwrap_or_else(|| state_dir.join("logs"));
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("creating log dir {}", log_dir.display()))?;

    let listener = bind_in_range(&args.host, &args.port_range).await?;
    let port = listener.local_addr()?.port();
    info!(node_id, %port, "gafferd starting");

    let coord = RedisCoord::connect(&args.coord_url, COORD_OP_TIMEOUT)
        .await
        .context("connecting to coordination store")?;
    let store = PgStore::connect(&args.database_url).await.context("connecting to run store")?;
    store.migrate().await.context("applying schema")?;

    // Outbound calls authenticate with the same shared token the server
    // checks (settings override, else environment).
    let token = store
        .settings()
        .await
        .ok()
        .and_then(|s| s.get(gaffer_core::settings::keys::AUTH_TOKEN).cloned())
        .or_else(|| std::env::var("GAFFER_AUTH_TOKEN").ok().filter(|t| !t.is_empty()));

    let runtime = WorkerRuntime::start(
        EngineDeps {
            coord: Arc::new(coord),
            store: Arc::new(store),
            executor: Arc::new(ProcessExecutor),
            peers: Arc::new(TcpPeer::new(token)),
        },
        SystemClock,
        EngineConfig {
            node_id: NodeId::new(node_id),
            host: args.host.clone(),
            port,
            log_dir,
            tz_offset: *chrono::Local::now().offset(),
        },
    )
    .await
    .context("registering worker")?;

    let server = tokio::spawn(gaffer_engine::run_server(Arc::clone(&runtime), listener));
    let loops = {
        let runtime = Arc::clone(&runtime);
        tokio::spawn(async move { runtime.run_loops().await })
    };

    // SIGHUP reloads settings without a restart.
    {
        let runtime = Arc::clone(&runtime);
        let mut hangup = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
            .context("installing SIGHUP handler")?;
        tokio::spawn(async move {
            while hangup.recv().await.is_some() {
                info!("settings reload requested");
                runtime.reload_settings();
            }
        });
    }

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutdown requested");
    runtime.stop().await;
    let _ = tokio::join!(server, loops);
    Ok(())
}

/// Bind the first free port in the configured range.
async fn bind_in_range(host: &str, range: &str) -> Result<TcpListener> {
    let (lo, hi) = env::parse_port_range(range)?;
    for port in lo..=hi {
        match TcpListener::bind((host, port)).await {
            Ok(listener) => return Ok(listener),
            Err(_) => continue,
        }
    }
    anyhow::bail!("no free port in {host}:{range}")
}

fn init_tracing(
    args: &Args,
    state_dir: &std::path::Path,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.log_to_file {
        let appender = tracing_appender::rolling::daily(state_dir.join("daemon-logs"), "gafferd");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).init();
        Ok(Some(guard))
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        Ok(None)
    }
}
