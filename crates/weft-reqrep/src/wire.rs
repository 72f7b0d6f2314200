// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 weft contributors

//! Wire format for request/reply frames.
//!
//! Every frame starts with a fixed five byte header: one byte selecting the
//! [`MessageKind`], followed by a big-endian 32-bit request id. The remainder
//! is kind-specific. Request and Reply payloads open with a NUL-terminated
//! payload-type tag; Error payloads carry a single [`ErrorCode`] byte;
//! RequestAck and ReplyAck carry nothing.

use crate::error::{Error, Result};

/// Fixed header length: kind byte + 32-bit request id.
pub const HEADER_LEN: usize = 5;

/// Frame discriminator, first byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// A request that must be answered at least once.
    Request = 1,
    /// A fire-and-forget request, sent exactly once.
    LossyRequest = 2,
    /// The answer to a request.
    Reply = 3,
    /// Acknowledges receipt of a reply, lets the answerer drop its cache.
    ReplyAck = 4,
    /// Acknowledges a request that is taking a long time to answer.
    RequestAck = 5,
    /// A remote error report.
    Error = 6,
}

impl MessageKind {
    /// Decode the wire discriminator.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Request),
            2 => Some(Self::LossyRequest),
            3 => Some(Self::Reply),
            4 => Some(Self::ReplyAck),
            5 => Some(Self::RequestAck),
            6 => Some(Self::Error),
            _ => None,
        }
    }
}

/// Error codes carried by [`MessageKind::Error`] frames, plus the two
/// requester-local conditions (`Timeout`, `Send`) that never hit the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    /// The answering side has no subscriber for this request.
    NoHandler = 1,
    /// The answering side's subscriber failed while producing an answer.
    HandlerFailure = 2,
    /// Local: no reply or ack arrived within the full retry budget.
    Timeout = 3,
    /// Local: the transport refused to send.
    Send = 4,
}

impl ErrorCode {
    /// Decode the wire representation.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::NoHandler),
            2 => Some(Self::HandlerFailure),
            3 => Some(Self::Timeout),
            4 => Some(Self::Send),
            _ => None,
        }
    }
}

/// Build a full frame: `[kind][id:4 BE][payload]`.
pub fn encode_frame(kind: MessageKind, id: u32, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.push(kind as u8);
    frame.extend_from_slice(&id.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Split a frame into `(kind, id, rest)`.
pub fn decode_frame(data: &[u8]) -> Result<(MessageKind, u32, &[u8])> {
    if data.len() < HEADER_LEN {
        return Err(Error::MalformedFrame { len: data.len() });
    }
    let kind = MessageKind::from_u8(data[0]).ok_or(Error::UnknownMessageKind(data[0]))?;
    let id = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);
    Ok((kind, id, &data[HEADER_LEN..]))
}

/// Split a Request/Reply payload into `(type_tag, application_payload)`.
///
/// The tag is everything before the first NUL byte. A payload without a NUL
/// is treated as all tag with an empty application payload.
pub fn split_type_tag(data: &[u8]) -> (&[u8], &[u8]) {
    match data.iter().position(|&b| b == 0) {
        Some(idx) => (&data[..idx], &data[idx + 1..]),
        None => (data, &[]),
    }
}

/// Join a type tag and application payload into a Request/Reply body.
pub fn join_type_tag(tag: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(tag.len() + 1 + payload.len());
    body.extend_from_slice(tag);
    body.push(0);
    body.extend_from_slice(payload);
    body
}
