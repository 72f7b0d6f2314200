// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 weft contributors

//! Exponential moving average/variance estimator over observed RTTs.

/// Moving estimate of a round-trip-time distribution.
///
/// With decay factor `f`, each sample `x` updates the average as
/// `avg <- f*(avg - x) + x`. `f = 0` tracks the last sample exactly,
/// `f = 1` never moves. The standard deviation is derived from the moving
/// average of squares, clamped at zero against floating point drift.
#[derive(Debug, Clone)]
pub struct TimeStats {
    avg: f64,
    avg_square: f64,
    std_dev: f64,
    max: f64,
    decay: f64,
}

impl TimeStats {
    /// Create an estimator with an initial estimate (milliseconds) and decay.
    pub fn new(init: f64, decay: f64) -> Self {
        Self {
            avg: init,
            avg_square: init * init,
            std_dev: 0.0,
            max: init,
            decay,
        }
    }

    /// Fold one observed RTT (milliseconds) into the estimate.
    pub fn add_sample(&mut self, ms: f64) {
        if ms > self.max {
            self.max = ms;
        }
        let ms2 = ms * ms;
        self.avg = self.decay * (self.avg - ms) + ms;
        self.avg_square = self.decay * (self.avg_square - ms2) + ms2;
        let variance = self.avg_square - self.avg * self.avg;
        self.std_dev = if variance > 0.0 { variance.sqrt() } else { 0.0 };
    }

    /// Current moving average (milliseconds).
    pub fn average(&self) -> f64 {
        self.avg
    }

    /// Current moving standard deviation (milliseconds).
    pub fn std_dev(&self) -> f64 {
        self.std_dev
    }

    /// Largest RTT ever observed (milliseconds).
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Timeout estimate: average plus `k` standard deviations.
    pub fn avg_plus_k_std_dev(&self, k: f64) -> f64 {
        self.avg + k * self.std_dev
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state() {
        let ts = TimeStats::new(5000.0, 0.98);
        assert_eq!(ts.average(), 5000.0);
        assert_eq!(ts.std_dev(), 0.0);
        assert_eq!(ts.max(), 5000.0);
        assert_eq!(ts.avg_plus_k_std_dev(6.0), 5000.0);
    }

    #[test]
    fn sample_moves_average_toward_observation() {
        let mut ts = TimeStats::new(5000.0, 0.98);
        ts.add_sample(100.0);
        // avg <- 0.98*(5000-100)+100 = 4902
        assert!((ts.average() - 4902.0).abs() < 1e-9);
        assert!(ts.average() < 5000.0);
    }

    #[test]
    fn converges_to_constant_samples() {
        let mut ts = TimeStats::new(5000.0, 0.98);
        for _ in 0..2000 {
            ts.add_sample(100.0);
        }
        assert!((ts.average() - 100.0).abs() < 1.0);
        assert!(ts.std_dev() < 50.0);
    }

    #[test]
    fn decay_zero_tracks_last_sample() {
        let mut ts = TimeStats::new(5000.0, 0.0);
        ts.add_sample(250.0);
        assert_eq!(ts.average(), 250.0);
        assert_eq!(ts.std_dev(), 0.0);
    }

    #[test]
    fn std_dev_never_negative() {
        let mut ts = TimeStats::new(1.0, 0.98);
        for _ in 0..100 {
            ts.add_sample(1.0);
        }
        assert!(ts.std_dev() >= 0.0);
    }

    #[test]
    fn variance_grows_with_spread() {
        let mut ts = TimeStats::new(100.0, 0.9);
        for _ in 0..50 {
            ts.add_sample(50.0);
            ts.add_sample(150.0);
        }
        assert!(ts.std_dev() > 10.0);
        assert!(ts.avg_plus_k_std_dev(6.0) > ts.average());
    }

    #[test]
    fn max_tracks_peak() {
        let mut ts = TimeStats::new(100.0, 0.98);
        ts.add_sample(80.0);
        ts.add_sample(900.0);
        ts.add_sample(50.0);
        assert_eq!(ts.max(), 900.0);
    }

    #[test]
    fn clone_seeds_independent_child() {
        let mut parent = TimeStats::new(5000.0, 0.98);
        parent.add_sample(100.0);
        let mut child = parent.clone();
        assert_eq!(child.average(), parent.average());

        child.add_sample(10.0);
        assert!(child.average() < parent.average());
    }
}
