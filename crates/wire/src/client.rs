// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deadline-bound client side of the control plane.

use crate::framing::{read_message, write_message, ProtocolError, PROTOCOL_VERSION};
use crate::request::Request;
use crate::response::Response;
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;

/// The seam the engine dispatches through. The production implementation
/// opens a TCP connection per call; tests route calls in-process.
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Send `request` to the worker listening at `addr`, bounded by
    /// `deadline` end to end (connect, handshake, response).
    async fn call(
        &self,
        addr: &str,
        request: Request,
        deadline: Duration,
    ) -> Result<Response, ProtocolError>;
}

/// TCP client. Every call is its own connection: Hello, request, response.
#[derive(Clone)]
pub struct TcpPeer {
    token: Option<String>,
}

impl TcpPeer {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

#[async_trait]
impl PeerClient for TcpPeer {
    async fn call(
        &self,
        addr: &str,
        request: Request,
        deadline: Duration,
    ) -> Result<Response, ProtocolError> {
        let token = self.token.clone();
        let exchange = async move {
            let mut stream = TcpStream::connect(addr).await?;
            let (mut reader, mut writer) = stream.split();

            let hello = Request::Hello { version: PROTOCOL_VERSION.to_string(), token };
            write_message(&mut writer, &hello).await?;
            match read_message::<Response, _>(&mut reader).await? {
                Response::HelloAck { .. } => {}
                Response::Error { message } => return Err(ProtocolError::Unauthorized(message)),
                _ => return Err(ProtocolError::BadHandshake),
            }

            write_message(&mut writer, &request).await?;
            read_message(&mut reader).await
        };

        match tokio::time::timeout(deadline, exchange).await {
            Ok(result) => result,
            Err(_) => Err(ProtocolError::Timeout),
        }
    }
}
