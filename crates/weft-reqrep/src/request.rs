// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 weft contributors

//! Per-outbound-request tracking.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::handler::{ReplyHandler, UserState};
use crate::sender::{same_sender, SendError, Sender};
use crate::wire::MessageKind;

/// The two outbound request variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Must be answered at least once; retransmitted until a reply, an ack,
    /// or exhaustion of the retry budget.
    Request,
    /// Sent exactly once, best effort, never retransmitted.
    LossyRequest,
}

impl RequestKind {
    pub(crate) fn message_kind(self) -> MessageKind {
        match self {
            Self::Request => MessageKind::Request,
            Self::LossyRequest => MessageKind::LossyRequest,
        }
    }
}

/// Delivery statistics handed to [`crate::ReplyHandler::handle_reply`].
#[derive(Debug, Clone, Copy)]
pub struct Statistics {
    /// How many times the request frame has been transmitted so far.
    pub send_count: u32,
}

/// Progress fields mutated over the request's lifetime.
///
/// Guarded by a per-state lock distinct from the manager-wide lock, so the
/// post-unlock send path can stamp `last_send` without re-entering the
/// manager.
struct Progress {
    last_send: Instant,
    repliers: Vec<Arc<dyn Sender>>,
    /// `None` until the first RequestAck arrives.
    ackers: Option<Vec<Arc<dyn Sender>>>,
    retries_left: i32,
}

/// One outstanding outbound request.
///
/// Reachable exactly while its id is in the manager's outbound table;
/// removal (success, timeout, or explicit stop) is the only destructor path.
pub(crate) struct RequestState {
    id: u32,
    sender: Arc<dyn Sender>,
    frame: Vec<u8>,
    kind: RequestKind,
    handler: Arc<dyn ReplyHandler>,
    user_state: UserState,
    timeout: Duration,
    ack_timeout: Duration,
    retry_budget: i32,
    send_count: AtomicU32,
    progress: Mutex<Progress>,
}

impl RequestState {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: u32,
        sender: Arc<dyn Sender>,
        frame: Vec<u8>,
        kind: RequestKind,
        handler: Arc<dyn ReplyHandler>,
        user_state: UserState,
        timeout: Duration,
        ack_timeout: Duration,
        retry_budget: i32,
    ) -> Self {
        Self {
            id,
            sender,
            frame,
            kind,
            handler,
            user_state,
            timeout,
            ack_timeout,
            retry_budget,
            send_count: AtomicU32::new(0),
            progress: Mutex::new(Progress {
                last_send: Instant::now(),
                repliers: Vec::new(),
                ackers: None,
                retries_left: retry_budget,
            }),
        }
    }

    pub(crate) fn id(&self) -> u32 {
        self.id
    }

    pub(crate) fn kind(&self) -> RequestKind {
        self.kind
    }

    pub(crate) fn handler(&self) -> &Arc<dyn ReplyHandler> {
        &self.handler
    }

    pub(crate) fn user_state(&self) -> &UserState {
        &self.user_state
    }

    pub(crate) fn send_count(&self) -> u32 {
        self.send_count.load(Ordering::Relaxed)
    }

    /// Transmit (or retransmit) the serialized request frame.
    pub(crate) fn send(&self) -> Result<(), SendError> {
        self.send_count.fetch_add(1, Ordering::Relaxed);
        self.progress.lock().last_send = Instant::now();
        self.sender.send(&self.frame)
    }

    /// RTT reference point: time since the most recent transmission.
    pub(crate) fn elapsed_since_last_send(&self) -> Duration {
        Instant::now().saturating_duration_since(self.progress.lock().last_send)
    }

    /// Record a replier. Returns true if this sender had not replied before.
    pub(crate) fn add_replier(&self, replier: &Arc<dyn Sender>) -> bool {
        let mut p = self.progress.lock();
        if p.repliers.iter().any(|s| same_sender(&**s, &**replier)) {
            false
        } else {
            p.repliers.push(replier.clone());
            true
        }
    }

    /// Record an acker. Returns true if this sender had not acked before.
    pub(crate) fn add_acker(&self, acker: &Arc<dyn Sender>) -> bool {
        let mut p = self.progress.lock();
        match &mut p.ackers {
            None => {
                p.ackers = Some(vec![acker.clone()]);
                true
            }
            Some(ackers) => {
                if ackers.iter().any(|s| same_sender(&**s, &**acker)) {
                    false
                } else {
                    ackers.push(acker.clone());
                    true
                }
            }
        }
    }

    pub(crate) fn got_ack(&self) -> bool {
        self.progress.lock().ackers.is_some()
    }

    /// Snapshot of everyone who replied, for courtesy ReplyAcks on stop.
    pub(crate) fn repliers(&self) -> Vec<Arc<dyn Sender>> {
        self.progress.lock().repliers.clone()
    }

    /// Check whether the current timeout window has elapsed, burning one
    /// retry if so. When an acked request exhausts its budget the ack state
    /// is discarded and the budget reset to its initial value, extending the
    /// overall wait beyond a naive reading of the retry count. That coupling
    /// matches the observed protocol behavior and is relied upon by peers
    /// that ack long-running requests.
    pub(crate) fn is_time_to_act(&self, now: Instant) -> bool {
        let mut p = self.progress.lock();
        let window = if p.ackers.is_some() {
            self.ack_timeout
        } else {
            self.timeout
        };
        if now.saturating_duration_since(p.last_send) > window {
            p.retries_left -= 1;
            if p.ackers.is_some() && p.retries_left < 0 {
                p.ackers = None;
                p.retries_left = self.retry_budget;
            }
            true
        } else {
            false
        }
    }

    /// True once the retry budget has gone negative.
    pub(crate) fn is_timed_out(&self) -> bool {
        self.progress.lock().retries_left < 0
    }

    /// A resend is only warranted for a reliable request that has seen
    /// neither a reply nor an ack.
    pub(crate) fn need_to_resend(&self) -> bool {
        if self.kind != RequestKind::Request {
            return false;
        }
        let p = self.progress.lock();
        p.repliers.is_empty() && p.ackers.is_none()
    }
}
