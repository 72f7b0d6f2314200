// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 weft contributors

//! The request/reply orchestrator.
//!
//! `ReqrepManager` turns a best-effort, at-most-once sender primitive into a
//! semi-reliable request/response exchange: automatic retransmission,
//! acknowledgement, adaptive timeouts, and duplicate suppression.
//!
//! All shared state lives behind a single mutex. The central locking
//! invariant: no caller-supplied callback (reply handler or request
//! subscriber) ever runs while that lock is held. Every path collects the
//! actions to take under the lock, releases it, then sends and calls back.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use lru::LruCache;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::handler::{ReplyHandler, RequestHandler, UserState};
use crate::reply::{ReplyState, RequestKey};
use crate::request::{RequestKind, RequestState, Statistics};
use crate::sender::Sender;
use crate::timeout::TimeoutManager;
use crate::uri;
use crate::wire::{self, ErrorCode, MessageKind};

/// URI scheme under which reply states are addressable.
const REPLY_STATE_SCHEME: &str = "replystate";

/// Tunables for one manager instance.
#[derive(Debug, Clone)]
pub struct ReqrepConfig {
    /// Resends allowed per request (and per cached reply) before giving up.
    pub retry_budget: i32,
    /// Capacity of the LRU cache of inbound-request reply states.
    pub reply_cache_capacity: usize,
}

impl Default for ReqrepConfig {
    fn default() -> Self {
        Self {
            retry_budget: 5,
            reply_cache_capacity: 1000,
        }
    }
}

struct Inner {
    /// Outstanding outbound requests by request id.
    requests: HashMap<u32, Arc<RequestState>>,
    /// Reverse lookup from local id to reply state, for URI resolution.
    reply_ids: HashMap<u32, Arc<ReplyState>>,
    /// Bounded cache of inbound-request answers, for duplicate suppression.
    reply_cache: LruCache<RequestKey, Arc<ReplyState>>,
    timeouts: TimeoutManager,
    subscriber: Option<Arc<dyn RequestHandler>>,
}

/// Semi-reliable request/reply engine over an opaque sender transport.
pub struct ReqrepManager {
    info: String,
    config: ReqrepConfig,
    inner: Mutex<Inner>,
}

impl ReqrepManager {
    /// Create a manager with default configuration. `info` is a diagnostic
    /// context label used in log lines.
    pub fn new(info: impl Into<String>) -> Self {
        Self::with_config(info, ReqrepConfig::default())
    }

    pub fn with_config(info: impl Into<String>, config: ReqrepConfig) -> Self {
        let capacity =
            NonZeroUsize::new(config.reply_cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            info: info.into(),
            config,
            inner: Mutex::new(Inner {
                requests: HashMap::new(),
                reply_ids: HashMap::new(),
                reply_cache: LruCache::new(capacity),
                timeouts: TimeoutManager::new(),
                subscriber: None,
            }),
        }
    }

    /// Context label this manager was created with.
    pub fn info(&self) -> &str {
        &self.info
    }

    /// Register the handler for inbound requests. Until one is registered,
    /// inbound requests are answered with `Error(NoHandler)`.
    pub fn subscribe(&self, handler: Arc<dyn RequestHandler>) {
        self.inner.lock().subscriber = Some(handler);
    }

    /// Send a request and start tracking it.
    ///
    /// Returns the request id. A transient failure of the initial send is
    /// swallowed; the next maintenance pass retries. A permanent failure
    /// removes the request, notifies the handler with a `Send` error, and
    /// is returned to the caller.
    pub fn send_request(
        &self,
        sender: Arc<dyn Sender>,
        kind: RequestKind,
        payload: &[u8],
        handler: Arc<dyn ReplyHandler>,
        user_state: UserState,
    ) -> Result<u32> {
        let user_state_copy = user_state.clone();
        let state = {
            let mut inner = self.inner.lock();
            let timeout = inner.timeouts.timeout_for(&*sender);
            let ack_timeout = inner.timeouts.acked_timeout();
            let id = generate_id(|candidate| inner.requests.contains_key(&candidate));
            let frame = wire::encode_frame(kind.message_kind(), id, payload);
            let state = Arc::new(RequestState::new(
                id,
                sender,
                frame,
                kind,
                handler.clone(),
                user_state,
                timeout,
                ack_timeout,
                self.config.retry_budget,
            ));
            inner.requests.insert(id, state.clone());
            state
        };

        let id = state.id();
        match state.send() {
            Ok(()) => Ok(id),
            Err(e) if e.is_transient() => {
                log::debug!(
                    "[ReqrepManager::send_request] {}: initial send of {} failed transiently: {}",
                    self.info,
                    id,
                    e
                );
                Ok(id)
            }
            Err(e) => {
                log::debug!(
                    "[ReqrepManager::send_request] {}: initial send of {} failed permanently: {}",
                    self.info,
                    id,
                    e
                );
                self.stop_request(id);
                handler.handle_error(self, id, ErrorCode::Send, None, &user_state_copy);
                Err(Error::Send(e))
            }
        }
    }

    /// Abandon an outstanding request. Idempotent. Every sender that had
    /// replied gets a courtesy ReplyAck so it can release its cached answer
    /// early.
    pub fn stop_request(&self, id: u32) {
        let state = self.inner.lock().requests.remove(&id);
        if let Some(state) = state {
            let ack = wire::encode_frame(MessageKind::ReplyAck, id, &[]);
            for replier in state.repliers() {
                // Best effort; the remote cache expires on its own anyway.
                if let Err(e) = replier.send(&ack) {
                    log::debug!(
                        "[ReqrepManager::stop_request] {}: reply ack to {} failed: {}",
                        self.info,
                        replier.uri(),
                        e
                    );
                }
            }
        }
    }

    /// True while the request id is still tracked. Collaborators use this to
    /// decide whether an out-of-band error is still relevant.
    pub fn request_active(&self, id: u32) -> bool {
        self.inner.lock().requests.contains_key(&id)
    }

    /// Entry point for inbound wire data: demultiplex by message kind and
    /// dispatch. Malformed frames are logged and dropped.
    pub fn handle_data(&self, data: &[u8], return_path: Arc<dyn Sender>, _state: UserState) {
        match wire::decode_frame(data) {
            Ok((kind, id, rest)) => match kind {
                MessageKind::Request | MessageKind::LossyRequest => {
                    self.handle_request_frame(id, rest, return_path)
                }
                MessageKind::Reply => self.handle_reply_frame(id, rest, return_path),
                MessageKind::RequestAck => self.handle_request_ack(id, return_path),
                MessageKind::ReplyAck => self.handle_reply_ack(id, return_path),
                MessageKind::Error => self.handle_error_frame(id, rest, return_path),
            },
            Err(e) => {
                log::warn!(
                    "[ReqrepManager::handle_data] {}: dropping frame from {}: {}",
                    self.info,
                    return_path.uri(),
                    e
                );
            }
        }
    }

    /// Resolve a previously issued reply state by its URI. Fails once the
    /// state has been released.
    pub fn reply_state_for_uri(&self, reply_uri: &str) -> Result<Arc<ReplyState>> {
        let (scheme, pairs) = uri::decode(reply_uri)?;
        if scheme != REPLY_STATE_SCHEME {
            return Err(Error::InvalidUri(reply_uri.to_string()));
        }
        let id: u32 = uri::get(&pairs, "id")
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| Error::InvalidUri(reply_uri.to_string()))?;
        self.inner
            .lock()
            .reply_ids
            .get(&id)
            .cloned()
            .ok_or(Error::UnknownReplyState(id))
    }

    /// Periodic maintenance: resend, ack, and time out tracked state.
    ///
    /// Driven externally (heartbeat timer). Self-throttled: the full scan
    /// runs at most once per minimum-timeout window, with a lighter
    /// ack-nudge pass in between. Not intended to be called concurrently
    /// with itself.
    pub fn timeout_checker(&self, now: Instant) {
        let mut timed_out: Vec<Arc<RequestState>> = Vec::new();
        let mut to_resend: Vec<Arc<RequestState>> = Vec::new();
        let mut to_ack: Vec<Arc<ReplyState>> = Vec::new();
        let mut replies_to_resend: Vec<Arc<ReplyState>> = Vec::new();

        {
            let mut inner = self.inner.lock();
            let Inner {
                requests,
                reply_ids,
                reply_cache,
                timeouts,
                ..
            } = &mut *inner;

            if timeouts.is_time_to_check(now) {
                timeouts.set_last_check(now);

                for state in requests.values() {
                    if state.is_time_to_act(now) {
                        if state.is_timed_out() {
                            timed_out.push(state.clone());
                        } else if state.need_to_resend() {
                            to_resend.push(state.clone());
                        }
                    }
                }
                for state in &timed_out {
                    requests.remove(&state.id());
                }

                let mut to_release: Vec<Arc<ReplyState>> = Vec::new();
                for (_, reply) in reply_cache.iter() {
                    if reply.have_sent() {
                        let window = timeouts.timeout_for(&**reply.return_path());
                        if now.saturating_duration_since(reply.reply_date()) > window {
                            if (reply.increment_reply_timeouts() as i64)
                                <= self.config.retry_budget as i64
                            {
                                // Once we acked, we owe the reply until a
                                // ReplyAck confirms delivery.
                                if reply.have_sent_ack() {
                                    replies_to_resend.push(reply.clone());
                                }
                            } else {
                                to_release.push(reply.clone());
                            }
                        }
                    } else if !reply.have_sent_ack() {
                        // Slow answer in progress: tell the requester it
                        // was not lost.
                        to_ack.push(reply.clone());
                    }
                }
                for reply in to_release {
                    release_reply_state(reply_cache, reply_ids, &reply);
                }
            } else {
                for (_, reply) in reply_cache.iter() {
                    if !reply.have_sent() && !reply.have_sent_ack() {
                        to_ack.push(reply.clone());
                    }
                }
            }
        }

        // Lock released; now do the sends and callbacks.
        for state in to_resend {
            match state.send() {
                Ok(()) => {}
                Err(e) if e.is_transient() => {
                    // Non-fatal notification; the request stays tracked.
                    state.handler().handle_error(
                        self,
                        state.id(),
                        ErrorCode::Send,
                        None,
                        state.user_state(),
                    );
                }
                Err(_) => {
                    // No way to reach this sender anymore; treat like a
                    // timeout, which is also a permanent condition.
                    self.stop_request(state.id());
                    state.handler().handle_error(
                        self,
                        state.id(),
                        ErrorCode::Timeout,
                        None,
                        state.user_state(),
                    );
                }
            }
        }

        for state in timed_out {
            // Lossy requests expire silently; they promised nothing.
            if state.kind() == RequestKind::LossyRequest {
                continue;
            }
            state.handler().handle_error(
                self,
                state.id(),
                ErrorCode::Timeout,
                None,
                state.user_state(),
            );
        }

        for reply in to_ack {
            if let Err(e) = reply.send_ack() {
                log::debug!(
                    "[ReqrepManager::timeout_checker] {}: ack for request {} failed: {}",
                    self.info,
                    reply.request_id(),
                    e
                );
            }
        }

        for reply in replies_to_resend {
            reply.resend();
        }
    }

    // ------------------------------------------------------------------
    // Inbound dispatch
    // ------------------------------------------------------------------

    fn handle_request_frame(&self, id: u32, payload: &[u8], return_path: Arc<dyn Sender>) {
        let key = RequestKey::new(id, &*return_path);

        enum Disposition {
            Duplicate(Arc<ReplyState>),
            New(Arc<ReplyState>, Arc<dyn RequestHandler>),
            NoHandler(Arc<ReplyState>),
        }

        let disposition = {
            let mut inner = self.inner.lock();
            if let Some(reply) = inner.reply_cache.get(&key) {
                Disposition::Duplicate(reply.clone())
            } else {
                let reply = Arc::new(ReplyState::new(key.clone(), return_path.clone()));
                let local_id = generate_id(|candidate| inner.reply_ids.contains_key(&candidate));
                reply.set_local_id(local_id);
                inner.reply_ids.insert(local_id, reply.clone());
                if let Some((evicted_key, evicted)) = inner.reply_cache.push(key.clone(), reply.clone())
                {
                    // push() evicting the LRU entry must not leave a
                    // dangling reverse mapping behind.
                    if evicted_key != key {
                        if let Some(lid) = evicted.local_id() {
                            inner.reply_ids.remove(&lid);
                        }
                    }
                }
                match inner.subscriber.clone() {
                    Some(sub) => Disposition::New(reply, sub),
                    None => Disposition::NoHandler(reply),
                }
            }
        };

        match disposition {
            Disposition::Duplicate(reply) => {
                log::debug!(
                    "[ReqrepManager::handle_request_frame] {}: duplicate request {} from {}",
                    self.info,
                    id,
                    return_path.uri()
                );
                reply.resend();
            }
            Disposition::New(reply, subscriber) => {
                if let Err(e) = subscriber.handle_request(payload, &reply) {
                    log::warn!(
                        "[ReqrepManager::handle_request_frame] {}: subscriber failed on request {}: {}",
                        self.info,
                        id,
                        e
                    );
                    self.release(&reply);
                    self.send_error(&return_path, id, ErrorCode::HandlerFailure);
                }
            }
            Disposition::NoHandler(reply) => {
                self.release(&reply);
                self.send_error(&return_path, id, ErrorCode::NoHandler);
            }
        }
    }

    fn handle_reply_frame(&self, id: u32, payload: &[u8], return_path: Arc<dyn Sender>) {
        let to_invoke = {
            let mut inner = self.inner.lock();
            let Inner {
                requests, timeouts, ..
            } = &mut *inner;
            match requests.get(&id) {
                Some(state) => {
                    if state.add_replier(&return_path) {
                        let rtt = state.elapsed_since_last_send();
                        timeouts.add_reply_sample(&*return_path, state.got_ack(), rtt);
                        Some(state.clone())
                    } else {
                        // Same sender replying again: no RTT accounting,
                        // no handler invocation.
                        None
                    }
                }
                // Unknown or already-completed request; ignore.
                None => None,
            }
        };

        if let Some(state) = to_invoke {
            let (payload_type, body) = wire::split_type_tag(payload);
            let stats = Statistics {
                send_count: state.send_count(),
            };
            let keep_listening = state.handler().handle_reply(
                self,
                MessageKind::Reply,
                id,
                payload_type,
                body,
                &return_path,
                &stats,
                state.user_state(),
            );
            if !keep_listening {
                self.stop_request(id);
            }
        }
    }

    fn handle_request_ack(&self, id: u32, return_path: Arc<dyn Sender>) {
        let mut inner = self.inner.lock();
        let Inner {
            requests, timeouts, ..
        } = &mut *inner;
        if let Some(state) = requests.get(&id) {
            // The ack does not complete the request; it only widens the
            // window we are willing to wait.
            if state.add_acker(&return_path) {
                let rtt = state.elapsed_since_last_send();
                timeouts.add_ack_sample(&*return_path, rtt);
            }
        }
    }

    fn handle_reply_ack(&self, id: u32, return_path: Arc<dyn Sender>) {
        let key = RequestKey::new(id, &*return_path);
        let mut inner = self.inner.lock();
        let Inner {
            reply_ids,
            reply_cache,
            ..
        } = &mut *inner;
        if let Some(reply) = reply_cache.pop(&key) {
            if let Some(lid) = reply.local_id() {
                reply_ids.remove(&lid);
            }
        }
    }

    fn handle_error_frame(&self, id: u32, payload: &[u8], return_path: Arc<dyn Sender>) {
        let code = match payload.first().copied().and_then(ErrorCode::from_u8) {
            Some(code) => code,
            None => {
                log::warn!(
                    "[ReqrepManager::handle_error_frame] {}: unparseable error for request {}",
                    self.info,
                    id
                );
                return;
            }
        };
        // Taking the state here is what makes the terminal callback unique:
        // a second Error for the same id finds nothing.
        let state = self.inner.lock().requests.remove(&id);
        if let Some(state) = state {
            state
                .handler()
                .handle_error(self, id, code, Some(&return_path), state.user_state());
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Forget a reply state: cache entry and local-id mapping both go.
    fn release(&self, reply: &Arc<ReplyState>) {
        let mut inner = self.inner.lock();
        let Inner {
            reply_ids,
            reply_cache,
            ..
        } = &mut *inner;
        release_reply_state(reply_cache, reply_ids, reply);
    }

    /// Best-effort error report back to a requester.
    fn send_error(&self, return_path: &Arc<dyn Sender>, id: u32, code: ErrorCode) {
        let frame = wire::encode_frame(MessageKind::Error, id, &[code as u8]);
        if let Err(e) = return_path.send(&frame) {
            log::debug!(
                "[ReqrepManager::send_error] {}: error report for request {} failed: {}",
                self.info,
                id,
                e
            );
        }
    }
}

fn release_reply_state(
    reply_cache: &mut LruCache<RequestKey, Arc<ReplyState>>,
    reply_ids: &mut HashMap<u32, Arc<ReplyState>>,
    reply: &ReplyState,
) {
    reply_cache.pop(reply.key());
    if let Some(lid) = reply.local_id() {
        reply_ids.remove(&lid);
    }
}

/// Random non-zero id not currently in use, per `taken`.
fn generate_id(taken: impl Fn(u32) -> bool) -> u32 {
    loop {
        let candidate = fastrand::u32(1..);
        if !taken(candidate) {
            return candidate;
        }
    }
}
