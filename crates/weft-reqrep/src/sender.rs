// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 weft contributors

//! The `Sender` capability: a one-way, best-effort byte transport with a
//! stable identity.
//!
//! The engine never opens sockets itself. Everything it transmits goes
//! through a `Sender` supplied by the transport layer, and everything it
//! needs to know about a peer is the sender's identity.

use std::fmt;

/// Stable identity of a sender, used for deduplication and as a map key.
///
/// The identity is the sender's URI, which doubles as its round-trippable
/// external form.
pub type SenderKey = String;

/// Failure reported by [`Sender::send`].
///
/// Transient failures are retried on the next maintenance pass; permanent
/// failures terminate the request immediately.
#[derive(Debug, Clone)]
pub enum SendError {
    /// The send failed but a later attempt may succeed.
    Transient(String),
    /// The send can never succeed (unroutable destination, closed edge).
    Permanent(String),
}

impl SendError {
    /// True if a later attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient(msg) => write!(f, "transient send failure: {}", msg),
            Self::Permanent(msg) => write!(f, "permanent send failure: {}", msg),
        }
    }
}

impl std::error::Error for SendError {}

/// A capability that can transmit a byte blob to one logical destination.
///
/// Implementations must be cheap to clone behind an `Arc` and safe to call
/// from any thread. `uri` must be stable for the lifetime of the sender:
/// it is used for equality, hashing, and URI round-tripping.
pub trait Sender: Send + Sync {
    /// Transmit one frame, at most once, best effort.
    fn send(&self, data: &[u8]) -> Result<(), SendError>;

    /// The sender's transport family (e.g. `"udp"`, `"tunnel"`). Timeout
    /// statistics are aggregated per family.
    fn kind(&self) -> &'static str;

    /// Stable identity and external form of this sender.
    fn uri(&self) -> String;
}

/// Identity comparison for trait-object senders.
pub fn same_sender(a: &dyn Sender, b: &dyn Sender) -> bool {
    a.uri() == b.uri()
}
