// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Per-peer frame error rate, independent of the configured rate selector.

use std::time::Duration;

const DEFAULT_MEMORY: Duration = Duration::from_secs(1);

/// Exponentially decaying estimate of the frame error rate seen toward one
/// peer. Observations further in the past weigh exponentially less, with a
/// one second memory window.
#[derive(Debug, Clone)]
pub struct FrameErrorTracker {
    memory: Duration,
    last_update: Duration,
    fail_avg: f64,
}

impl Default for FrameErrorTracker {
    fn default() -> Self {
        Self { memory: DEFAULT_MEMORY, last_update: Duration::ZERO, fail_avg: 0.0 }
    }
}

impl FrameErrorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn averaging_coefficient(&mut self, now: Duration) -> f64 {
        let elapsed = now.saturating_sub(self.last_update);
        let coefficient = (-elapsed.as_secs_f64() / self.memory.as_secs_f64()).exp();
        self.last_update = now;
        coefficient
    }

    /// Folds in a delivered frame. `retries` is how many attempts failed
    /// before this one succeeded; `retries / (1 + retries)` of the window
    /// is counted as errored.
    pub fn record_success(&mut self, now: Duration, retries: u32) {
        let coefficient = self.averaging_coefficient(now);
        self.fail_avg = retries as f64 / (1 + retries) as f64 * (1.0 - coefficient)
            + coefficient * self.fail_avg;
    }

    /// Folds in a frame that was dropped after exhausting its retries.
    pub fn record_failure(&mut self, now: Duration) {
        let coefficient = self.averaging_coefficient(now);
        self.fail_avg = (1.0 - coefficient) + coefficient * self.fail_avg;
    }

    /// Current frame error rate estimate in [0, 1].
    pub fn frame_error_rate(&self) -> f64 {
        self.fail_avg
    }
}
