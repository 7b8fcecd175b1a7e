// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-plane RPC server.
//!
//! One connection carries a Hello handshake, a request, and a response.
//! Connections are handled in spawned tasks so the coordination loops are
//! never blocked on socket I/O.

use crate::runtime::WorkerRuntime;
use gaffer_core::{settings, Clock, Role};
use gaffer_wire::{
    read_message, write_message, ProtocolError, Request, Response, PROTOCOL_VERSION,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error};

/// Per-frame read deadline on the server side.
const IPC_TIMEOUT: Duration = Duration::from_secs(5);

/// Accept connections until shutdown.
pub async fn run_server<C: Clock>(runtime: Arc<WorkerRuntime<C>>, listener: TcpListener) {
    loop {
        let shutdown = runtime.shutdown_token();
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let runtime = Arc::clone(&runtime);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(runtime, stream).await {
                                log_connection_error(e);
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "accept failed"),
                }
            }
        }
    }
}

fn log_connection_error(e: ProtocolError) {
    match e {
        ProtocolError::ConnectionClosed => debug!("peer disconnected"),
        ProtocolError::Timeout => debug!("connection timed out"),
        _ => error!(error = %e, "connection error"),
    }
}

async fn handle_connection<C: Clock>(
    runtime: Arc<WorkerRuntime<C>>,
    stream: TcpStream,
) -> Result<(), ProtocolError> {
    let (mut reader, mut writer) = stream.into_split();

    let hello: Request = read_framed(&mut reader).await?;
    let Request::Hello { token, .. } = hello else {
        write_message(&mut writer, &Response::Error { message: "expected hello".to_string() })
            .await?;
        return Err(ProtocolError::BadHandshake);
    };
    if let Some(expected) = runtime.settings.secret(settings::keys::AUTH_TOKEN).await {
        if token.as_deref() != Some(expected.as_str()) {
            write_message(&mut writer, &Response::Error { message: "invalid token".to_string() })
                .await?;
            return Err(ProtocolError::Unauthorized("token mismatch".to_string()));
        }
    }
    write_message(&mut writer, &Response::HelloAck { version: PROTOCOL_VERSION.to_string() })
        .await?;

    let request: Request = read_framed(&mut reader).await?;
    debug!(request = request.name(), "handling request");
    let response = handle_request(&runtime, request).await;
    write_message(&mut writer, &response).await
}

async fn read_framed<T, R>(reader: &mut R) -> Result<T, ProtocolError>
where
    T: serde::de::DeserializeOwned,
    R: tokio::io::AsyncRead + Unpin,
{
    match tokio::time::timeout(IPC_TIMEOUT, read_message(reader)).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout),
    }
}

/// Route one request. Public for tests and in-process loopback transports.
pub async fn handle_request<C: Clock>(
    runtime: &Arc<WorkerRuntime<C>>,
    request: Request,
) -> Response {
    match request {
        Request::Hello { .. } => {
            Response::Error { message: "unexpected hello".to_string() }
        }
        Request::Ping { .. } => {
            let status = runtime.status_snapshot();
            Response::Pong {
                worker_id: status.worker_id,
                role: status.role,
                observed_epoch: status.observed_epoch,
            }
        }
        Request::GetStatus => Response::Status { status: runtime.status_snapshot() },
        Request::StartJob {
            job_run_id,
            command_name,
            args,
            timeout_seconds,
            attempt,
            leader_epoch,
            ..
        } => Response::StartJob {
            result: runtime
                .handle_start_job(
                    job_run_id,
                    command_name,
                    args,
                    timeout_seconds,
                    attempt,
                    leader_epoch,
                )
                .await,
        },
        Request::CancelJob { job_run_id, reason, leader_epoch, .. } => Response::CancelJob {
            result: runtime.handle_cancel(job_run_id, reason, leader_epoch).await,
        },
        Request::Drain { enable, leader_epoch, .. } => {
            Response::Drain { draining: runtime.handle_drain(enable, leader_epoch) }
        }
        Request::ConfirmContinuation { worker_id, job_run_id, leader_epoch, .. } => {
            if runtime.role() == Role::Worker {
                return Response::Error { message: "not a coordinator".to_string() };
            }
            match runtime.answer_continuation(&worker_id, &job_run_id, leader_epoch).await {
                Ok(verdict) => Response::Continuation { verdict },
                Err(e) => Response::Error { message: e.to_string() },
            }
        }
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
