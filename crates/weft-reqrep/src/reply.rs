// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 weft contributors

//! Per-inbound-request answer tracking.
//!
//! A [`ReplyState`] is handed to the subscriber as the reply sender for one
//! inbound request. The first answer is cached verbatim so retransmitted
//! duplicates of the request get a byte-identical reply without re-invoking
//! the subscriber.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use parking_lot::Mutex;

use crate::sender::{SendError, Sender, SenderKey};
use crate::uri;
use crate::wire::{self, MessageKind};

/// Identity of an inbound request: (request id, requester identity).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub id: u32,
    pub sender: SenderKey,
}

impl RequestKey {
    pub fn new(id: u32, return_path: &dyn Sender) -> Self {
        Self {
            id,
            sender: return_path.uri(),
        }
    }
}

/// Tracks one inbound request's answer.
///
/// At most one exists per [`RequestKey`] at any time. Owned by the manager's
/// reply cache until evicted, timed out, or released by a ReplyAck.
pub struct ReplyState {
    key: RequestKey,
    return_path: Arc<dyn Sender>,
    request_date: Instant,
    /// Reverse-lookup id, assigned exactly once by the manager.
    local_id: OnceLock<u32>,
    reply: Mutex<Option<Vec<u8>>>,
    have_sent: AtomicBool,
    have_sent_ack: AtomicBool,
    reply_date: Mutex<Instant>,
    reply_timeouts: AtomicU32,
    uri: OnceLock<String>,
}

impl ReplyState {
    pub(crate) fn new(key: RequestKey, return_path: Arc<dyn Sender>) -> Self {
        let now = Instant::now();
        Self {
            key,
            return_path,
            request_date: now,
            local_id: OnceLock::new(),
            reply: Mutex::new(None),
            have_sent: AtomicBool::new(false),
            have_sent_ack: AtomicBool::new(false),
            reply_date: Mutex::new(now),
            reply_timeouts: AtomicU32::new(0),
            uri: OnceLock::new(),
        }
    }

    /// The request id assigned by the requester.
    pub fn request_id(&self) -> u32 {
        self.key.id
    }

    pub(crate) fn key(&self) -> &RequestKey {
        &self.key
    }

    /// The sender that routes back to the requester.
    pub fn return_path(&self) -> &Arc<dyn Sender> {
        &self.return_path
    }

    /// When the request was first seen locally.
    pub fn request_date(&self) -> Instant {
        self.request_date
    }

    pub(crate) fn set_local_id(&self, id: u32) {
        if self.local_id.set(id).is_err() {
            log::warn!(
                "[ReplyState::set_local_id] local id already set for request {}",
                self.key.id
            );
        }
    }

    pub(crate) fn local_id(&self) -> Option<u32> {
        self.local_id.get().copied()
    }

    /// True once the cached reply has been transmitted at least once.
    pub fn have_sent(&self) -> bool {
        self.have_sent.load(Ordering::Acquire)
    }

    /// True once a RequestAck has gone out for this request.
    pub fn have_sent_ack(&self) -> bool {
        self.have_sent_ack.load(Ordering::Acquire)
    }

    pub(crate) fn reply_date(&self) -> Instant {
        *self.reply_date.lock()
    }

    pub(crate) fn increment_reply_timeouts(&self) -> u32 {
        self.reply_timeouts.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Retransmit the cached reply byte-identically, or ack the request if
    /// no answer exists yet. Failures are swallowed; the next maintenance
    /// pass retries.
    pub(crate) fn resend(&self) {
        let frame = self.reply.lock().clone();
        match frame {
            Some(frame) => {
                *self.reply_date.lock() = Instant::now();
                if let Err(e) = self.return_path.send(&frame) {
                    log::debug!(
                        "[ReplyState::resend] reply retransmit for request {} failed: {}",
                        self.key.id,
                        e
                    );
                }
            }
            None => {
                if let Err(e) = self.send_ack() {
                    log::debug!(
                        "[ReplyState::resend] ack for request {} failed: {}",
                        self.key.id,
                        e
                    );
                }
            }
        }
    }

    /// Send a RequestAck down the return path, marking it sent even when the
    /// transmission fails (the requester's resend will trigger another try).
    pub(crate) fn send_ack(&self) -> Result<(), SendError> {
        self.have_sent_ack.store(true, Ordering::Release);
        let frame = wire::encode_frame(MessageKind::RequestAck, self.key.id, &[]);
        self.return_path.send(&frame)
    }
}

impl Sender for ReplyState {
    /// Answer the request. The first call caches the serialized reply frame
    /// and transmits it; later calls are no-ops so the answer stays
    /// byte-identical across retransmissions.
    fn send(&self, data: &[u8]) -> Result<(), SendError> {
        if self
            .have_sent
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let frame = wire::encode_frame(MessageKind::Reply, self.key.id, data);
            *self.reply.lock() = Some(frame);
            self.resend();
        } else {
            log::debug!(
                "[ReplyState::send] duplicate answer for request {} ignored",
                self.key.id
            );
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "replystate"
    }

    fn uri(&self) -> String {
        match self.local_id() {
            Some(id) => self
                .uri
                .get_or_init(|| {
                    let id = id.to_string();
                    let retpath = self.return_path.uri();
                    uri::encode("replystate", &[("id", &id), ("retpath", &retpath)])
                })
                .clone(),
            None => {
                // Not cached: the manager assigns the local id right after
                // construction, so a later call picks the real one up.
                log::warn!(
                    "[ReplyState::uri] uri requested before local id assignment for request {}",
                    self.key.id
                );
                let retpath = self.return_path.uri();
                uri::encode("replystate", &[("id", "0"), ("retpath", &retpath)])
            }
        }
    }
}
