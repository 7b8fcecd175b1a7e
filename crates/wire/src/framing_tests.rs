// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::request::Request;
use crate::response::{Response, StartJobResult};
use gaffer_core::Role;

#[test]
fn encode_prefixes_big_endian_length() {
    let frame = encode(&Request::GetStatus).unwrap();
    let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]);
    assert_eq!(len as usize, frame.len() - 4);
    let decoded: Request = decode(&frame[4..]).unwrap();
    assert_eq!(decoded, Request::GetStatus);
}

#[tokio::test]
async fn read_write_round_trip() {
    let request = Request::Ping { sender: "w1".into(), caller_role: Role::Leader };
    let (mut writer, mut reader) = tokio::io::duplex(1024);
    write_message(&mut writer, &request).await.unwrap();
    let back: Request = read_message(&mut reader).await.unwrap();
    assert_eq!(back, request);
}

#[tokio::test]
async fn read_rejects_oversized_frame() {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(MAX_FRAME_BYTES + 1).to_be_bytes());
    let mut reader = buf.as_slice();
    let result = read_message::<Request, _>(&mut reader).await;
    assert!(matches!(result, Err(ProtocolError::FrameTooLarge(_))));
}

#[tokio::test]
async fn truncated_stream_reads_as_closed() {
    let mut reader: &[u8] = &[0, 0];
    let result = read_message::<Request, _>(&mut reader).await;
    assert!(matches!(result, Err(ProtocolError::ConnectionClosed)));
}

#[test]
fn request_serde_uses_type_tag() {
    let json = serde_json::to_value(Request::Drain {
        enable: true,
        leader_epoch: 4,
        caller_role: Role::Leader,
    })
    .unwrap();
    assert_eq!(json["type"], "Drain");
    assert_eq!(json["leader_epoch"], 4);
}

#[test]
fn result_codes_are_snake_case() {
    let json = serde_json::to_string(&Response::StartJob {
        result: StartJobResult::RejectedOldEpoch,
    })
    .unwrap();
    assert!(json.contains("rejected_old_epoch"), "{json}");
}
