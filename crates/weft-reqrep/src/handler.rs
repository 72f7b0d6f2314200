// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 weft contributors

//! Caller-supplied callback capabilities.
//!
//! None of these are ever invoked while the manager's lock is held, so
//! implementations are free to call back into the manager.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::manager::ReqrepManager;
use crate::reply::ReplyState;
use crate::request::Statistics;
use crate::sender::Sender;
use crate::wire::{ErrorCode, MessageKind};

/// Opaque per-request state attached by the caller and handed back on every
/// callback. `None` when the caller has nothing to attach.
pub type UserState = Option<Arc<dyn Any + Send + Sync>>;

/// Receives replies and errors for one outstanding request.
pub trait ReplyHandler: Send + Sync {
    /// Called for each distinct reply. Return `false` to stop listening;
    /// the manager then releases the request and acks the repliers.
    #[allow(clippy::too_many_arguments)]
    fn handle_reply(
        &self,
        mgr: &ReqrepManager,
        kind: MessageKind,
        id: u32,
        payload_type: &[u8],
        payload: &[u8],
        return_path: &Arc<dyn Sender>,
        stats: &Statistics,
        user_state: &UserState,
    ) -> bool;

    /// Called at most once per terminal error, and additionally for
    /// non-fatal `Send` notifications when a scheduled resend fails
    /// transiently (the request stays active in that case).
    fn handle_error(
        &self,
        mgr: &ReqrepManager,
        id: u32,
        error: ErrorCode,
        return_path: Option<&Arc<dyn Sender>>,
        user_state: &UserState,
    );
}

/// Failure reported by a request subscriber that could not produce an answer.
///
/// Translated into an `Error(HandlerFailure)` frame on the wire.
#[derive(Debug)]
pub struct HandlerError(pub String);

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request handler failed: {}", self.0)
    }
}

impl std::error::Error for HandlerError {}

/// Processes inbound requests. The reply sender stays valid after this call
/// returns, so slow handlers can answer later from another thread; the
/// engine acks the requester in the meantime.
pub trait RequestHandler: Send + Sync {
    fn handle_request(
        &self,
        payload: &[u8],
        reply_sender: &Arc<ReplyState>,
    ) -> Result<(), HandlerError>;
}
