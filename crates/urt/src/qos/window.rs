// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Adaptive jitter window.
//!
//! Tracks a `[min, max]` latency corridor whose width never exceeds the
//! configured maximum jitter `w`. The window starts unseeded (inverted,
//! `min > max`); the first sample seeds both bounds.
//!
//! On each latency `lat`:
//! - `min = lat` if unseeded, or `lat < min` and `max - lat <= w`
//! - `max = lat` if unseeded, or `lat > max` and `lat - min <= w`
//! - the sample violates the jitter constraint if it still lies outside
//!
//! # Examples
//!
//! ```
//! use urt::qos::LatencyWindow;
//! use std::time::Duration;
//!
//! let ms = Duration::from_millis;
//! let mut window = LatencyWindow::new();
//!
//! for lat in [100, 105, 98, 102] {
//!     assert!(window.track(ms(lat), ms(10)));
//! }
//! assert_eq!(window.bounds(), Some((ms(98), ms(105))));
//!
//! // 200ms would stretch the window to 102ms
//! assert!(!window.track(ms(200), ms(10)));
//! ```

use std::time::Duration;

/// Latency corridor of a firm or hard real-time entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyWindow {
    min: Duration,
    max: Duration,
}

impl Default for LatencyWindow {
    /// Unseeded window
    fn default() -> Self {
        Self {
            min: Duration::MAX,
            max: Duration::ZERO,
        }
    }
}

impl LatencyWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once a sample has been tracked.
    #[inline]
    pub fn is_seeded(&self) -> bool {
        self.min <= self.max
    }

    /// Lower bound, if seeded.
    #[inline]
    pub fn min(&self) -> Option<Duration> {
        self.is_seeded().then_some(self.min)
    }

    /// `(min, max)`, if seeded.
    pub fn bounds(&self) -> Option<(Duration, Duration)> {
        self.is_seeded().then_some((self.min, self.max))
    }

    /// Track `lat` against maximum jitter `max_jitter`.
    ///
    /// Returns `true` when the sample lies inside the (updated) window.
    pub fn track(&mut self, lat: Duration, max_jitter: Duration) -> bool {
        let unseeded = !self.is_seeded();
        if unseeded || (lat < self.min && self.max.saturating_sub(lat) <= max_jitter) {
            self.min = lat;
        }
        if unseeded || (lat > self.max && lat.saturating_sub(self.min) <= max_jitter) {
            self.max = lat;
        }
        lat >= self.min && lat <= self.max
    }

    /// Whether `lat` would keep the window within `max_jitter`, without
    /// updating it. An unseeded window admits everything.
    pub fn admits(&self, lat: Duration, max_jitter: Duration) -> bool {
        if !self.is_seeded() {
            return true;
        }
        let above = lat > self.min && lat - self.min > max_jitter;
        let below = lat < self.max && self.max - lat > max_jitter;
        !(above || below)
    }

    /// Forget every sample.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
