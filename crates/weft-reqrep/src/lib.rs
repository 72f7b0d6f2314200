// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 weft contributors

//! # weft-reqrep — semi-reliable request/reply for overlay networks
//!
//! This crate is the request/reply reliability layer of a peer-to-peer
//! overlay: it turns a best-effort, at-most-once "send a blob to a sender"
//! primitive into a semi-reliable exchange with automatic retransmission,
//! acknowledgement, adaptive timeout estimation, and duplicate suppression.
//!
//! Semi-reliable means that ordinary packet loss, duplication, and
//! reordering are absorbed, while extreme loss or delay can still surface as
//! a timeout. That is the right trade for overlay control traffic that only
//! needs a best-effort attempt to deal with lost packets.
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                     Application / RPC layer                  |
//! |        ReplyHandler callbacks | RequestHandler subscriber    |
//! +--------------------------------------------------------------+
//! |                        ReqrepManager                         |
//! |  outbound RequestState table | inbound ReplyState LRU cache  |
//! |          TimeoutManager (adaptive RTT estimation)            |
//! +--------------------------------------------------------------+
//! |                      Sender abstraction                      |
//! |        overlay edges, tunnels, UDP: supplied by caller       |
//! +--------------------------------------------------------------+
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use weft_reqrep::{ReqrepManager, RequestKind};
//!
//! let manager = Arc::new(ReqrepManager::new("node0"));
//!
//! // Outbound: send a request, receive replies via a ReplyHandler.
//! let id = manager.send_request(edge, RequestKind::Request, b"ping\0", handler, None)?;
//!
//! // Inbound: wire the transport receive path to handle_data, and a
//! // heartbeat timer to timeout_checker.
//! manager.handle_data(&frame, return_path, None);
//! manager.timeout_checker(std::time::Instant::now());
//! ```
//!
//! The manager never spawns threads and never blocks beyond its internal
//! lock; the caller owns the receive loop and the maintenance timer.
//!
//! Out of scope here, by design: transport framing and addressing, the RPC
//! dispatch built on top, DHT logic, security, and NAT traversal. Those
//! layers wrap the [`Sender`] capability this engine consumes.

/// Engine API error types.
pub mod error;
/// Caller-supplied callback traits (reply handlers, request subscribers).
pub mod handler;
/// The orchestrator: tables, dispatch, and the maintenance pass.
pub mod manager;
/// Inbound-request answer tracking and the cached-reply sender.
pub mod reply;
/// Outbound request tracking.
pub mod request;
/// The transport capability this engine sends through.
pub mod sender;
/// Moving average/variance RTT estimation.
pub mod stats;
/// Adaptive timeout derivation with three-level priors.
pub mod timeout;
/// URI encoding for addressable reply states.
pub mod uri;
/// Frame layout: message kinds, headers, error codes.
pub mod wire;

pub use error::{Error, Result};
pub use handler::{HandlerError, ReplyHandler, RequestHandler, UserState};
pub use manager::{ReqrepConfig, ReqrepManager};
pub use reply::{ReplyState, RequestKey};
pub use request::{RequestKind, Statistics};
pub use sender::{same_sender, SendError, Sender, SenderKey};
pub use stats::TimeStats;
pub use timeout::TimeoutManager;
pub use wire::{ErrorCode, MessageKind};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
