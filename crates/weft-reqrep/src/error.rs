// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 weft contributors

//! Error types for the request/reply engine.

use crate::sender::SendError;
use std::fmt;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the engine's own API.
///
/// Protocol-level failures (timeouts, remote handler failures) are delivered
/// through [`crate::ReplyHandler::handle_error`], not through this type.
#[derive(Debug)]
pub enum Error {
    /// The initial transmission of a request failed permanently.
    Send(SendError),

    /// A frame was shorter than the fixed header.
    MalformedFrame {
        /// Observed frame length.
        len: usize,
    },

    /// The frame discriminator byte is not a known message kind.
    UnknownMessageKind(u8),

    /// A reply-state URI could not be parsed.
    InvalidUri(String),

    /// The reply state addressed by a URI has already been released.
    UnknownReplyState(u32),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Send(e) => write!(f, "request send failed: {}", e),
            Self::MalformedFrame { len } => {
                write!(f, "frame too short for reqrep header: {} bytes", len)
            }
            Self::UnknownMessageKind(b) => write!(f, "unknown message kind: {}", b),
            Self::InvalidUri(uri) => write!(f, "invalid reply-state uri: {}", uri),
            Self::UnknownReplyState(id) => write!(f, "no reply state with local id {}", id),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Send(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SendError> for Error {
    fn from(e: SendError) -> Self {
        Self::Send(e)
    }
}
