// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Injected time source. The subsystem never schedules anything itself;
//! interval work is performed lazily by comparing deadlines against the
//! current time on each outcome report, keeping the surrounding simulation
//! in full control of the clock.

use std::{cell::Cell, rc::Rc, time::Duration};

/// Answers "what time is it" as a duration since an arbitrary epoch.
pub trait TimeSource {
    fn now(&self) -> Duration;
}

/// A hand-driven clock. Cloning yields a handle onto the same instant, so a
/// test (or the simulation scheduler adapter) can advance time underneath
/// every component holding a handle.
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, now: Duration) {
        self.now.set(now);
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_same_instant() {
        let clock = ManualClock::new();
        let handle = clock.clone();
        assert_eq!(handle.now(), Duration::from_secs(0));

        clock.advance(Duration::from_millis(250));
        assert_eq!(handle.now(), Duration::from_millis(250));

        handle.set(Duration::from_secs(2));
        assert_eq!(clock.now(), Duration::from_secs(2));
    }
}
