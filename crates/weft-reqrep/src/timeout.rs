// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 weft contributors

//! Adaptive timeout estimation.
//!
//! Keeps a global, a per-sender-kind, and a per-sender-instance [`TimeStats`]
//! with three-level prior inheritance: a never-before-seen sender starts from
//! its transport family's statistic, which itself started from the global one.
//! A separate, wider statistic covers requests that have already been acked,
//! since replies after an ack tend to take longer (the remote is actively
//! working on the answer).

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::sender::{Sender, SenderKey};
use crate::stats::TimeStats;

/// Hard floor for any derived timeout, milliseconds.
pub const MINIMUM_TIMEOUT_MS: u64 = 2000;
/// How many standard deviations above the average to wait.
pub const STD_DEVS: f64 = 6.0;
/// Exponential decay factor for all RTT statistics.
pub const DECAY_FACTOR: f64 = 0.98;
/// Initial RTT estimate before any samples, milliseconds.
pub const INITIAL_ESTIMATE_MS: f64 = 5000.0;
/// Initial estimate for the acked-request statistic, milliseconds.
pub const INITIAL_ACKED_ESTIMATE_MS: f64 = 50_000.0;

const SENDER_STATS_CAPACITY: usize = 1000;
const KIND_STATS_CAPACITY: usize = 100;

/// Derives resend/timeout intervals from observed round-trip times.
pub struct TimeoutManager {
    global: TimeStats,
    acked_rtt: TimeStats,
    kind_stats: LruCache<&'static str, TimeStats>,
    sender_stats: LruCache<SenderKey, TimeStats>,
    min_timeout_ms: f64,
    last_check: Instant,
}

impl TimeoutManager {
    pub fn new() -> Self {
        Self {
            global: TimeStats::new(INITIAL_ESTIMATE_MS, DECAY_FACTOR),
            acked_rtt: TimeStats::new(INITIAL_ACKED_ESTIMATE_MS, DECAY_FACTOR),
            kind_stats: LruCache::new(
                NonZeroUsize::new(KIND_STATS_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            ),
            sender_stats: LruCache::new(
                NonZeroUsize::new(SENDER_STATS_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            ),
            min_timeout_ms: INITIAL_ESTIMATE_MS,
            last_check: Instant::now(),
        }
    }

    /// Make sure both inheritance levels exist for this sender.
    fn ensure_stats(&mut self, sender: &dyn Sender) -> SenderKey {
        let kind = sender.kind();
        if self.kind_stats.get(&kind).is_none() {
            let seeded = self.global.clone();
            self.kind_stats.put(kind, seeded);
        }
        let key = sender.uri();
        if self.sender_stats.get(&key).is_none() {
            let seeded = self
                .kind_stats
                .get(&kind)
                .cloned()
                .unwrap_or_else(|| self.global.clone());
            self.sender_stats.put(key.clone(), seeded);
        }
        key
    }

    /// Timeout to apply when waiting on this sender, never below the floor.
    pub fn timeout_for(&mut self, sender: &dyn Sender) -> Duration {
        let key = self.ensure_stats(sender);
        let estimate = self
            .sender_stats
            .get(&key)
            .map(|ts| ts.avg_plus_k_std_dev(STD_DEVS))
            .unwrap_or(INITIAL_ESTIMATE_MS);
        clamp_to_floor(estimate)
    }

    /// Timeout to apply once a request has been acked.
    pub fn acked_timeout(&self) -> Duration {
        clamp_to_floor(self.acked_rtt.avg_plus_k_std_dev(STD_DEVS))
    }

    /// Record the RTT of a request ack: feeds the per-kind, per-sender, and
    /// global statistics and lowers the minimum-timeout floor toward the
    /// smallest justified estimate.
    pub fn add_ack_sample(&mut self, sender: &dyn Sender, rtt: Duration) {
        let ms = rtt.as_secs_f64() * 1000.0;
        let key = self.ensure_stats(sender);
        let kind = sender.kind();

        if let Some(ts) = self.kind_stats.get_mut(&kind) {
            ts.add_sample(ms);
            self.min_timeout_ms = self.min_timeout_ms.min(ts.avg_plus_k_std_dev(STD_DEVS));
        }
        if let Some(ts) = self.sender_stats.get_mut(&key) {
            ts.add_sample(ms);
            self.min_timeout_ms = self.min_timeout_ms.min(ts.avg_plus_k_std_dev(STD_DEVS));
        }
        self.global.add_sample(ms);
        self.min_timeout_ms = self
            .min_timeout_ms
            .min(self.global.avg_plus_k_std_dev(STD_DEVS));
    }

    /// Record the RTT of a reply. Post-ack replies feed the separate acked
    /// statistic; replies that arrive before any ack count like acks.
    pub fn add_reply_sample(&mut self, sender: &dyn Sender, got_ack: bool, rtt: Duration) {
        if got_ack {
            let ms = rtt.as_secs_f64() * 1000.0;
            self.acked_rtt.add_sample(ms);
            self.min_timeout_ms = self
                .min_timeout_ms
                .min(self.acked_rtt.avg_plus_k_std_dev(STD_DEVS));
        } else {
            self.add_ack_sample(sender, rtt);
        }
    }

    /// Interval floor for the expensive full maintenance scan.
    pub fn minimum_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.min_timeout_ms / 1000.0)
    }

    /// True once a full scan is due again.
    pub fn is_time_to_check(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_check) > self.minimum_timeout()
    }

    pub fn set_last_check(&mut self, now: Instant) {
        self.last_check = now;
    }
}

impl Default for TimeoutManager {
    fn default() -> Self {
        Self::new()
    }
}

fn clamp_to_floor(estimate_ms: f64) -> Duration {
    let floor = MINIMUM_TIMEOUT_MS as f64;
    Duration::from_secs_f64(estimate_ms.max(floor) / 1000.0)
}
