// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Real-time QoS: deadline, jitter and rate constraints.
//!
//! Firm entities report violations by status. Hard entities additionally arm
//! a timer at the *critical* time (the earliest moment the data can turn
//! invalid) and escalate through [`recovery`] when it fires or when a
//! violation is detected inline.
//!
//! | Parameter | Meaning | Zero |
//! |-----------|---------|------|
//! | `deadline` | maximum latency (age of information) | disabled |
//! | `jitter` | maximum width of the [`LatencyWindow`] | disabled |
//! | `rate` | maximum interval between messages (hard subscribers) | disabled |

pub mod recovery;
pub mod window;

pub use recovery::{Recovery, RecoveryCallback, Violation, ViolationLatch};
pub use window::LatencyWindow;

use crate::config::QosChecks;
use crate::status::Status;
use std::time::{Duration, Instant};

/// QoS parameters of a firm or hard real-time entity.
///
/// # Examples
///
/// ```
/// use urt::qos::QosParams;
/// use std::time::Duration;
///
/// let qos = QosParams::new()
///     .deadline(Duration::from_millis(20))
///     .jitter(Duration::from_millis(2));
/// assert_eq!(qos.rate, Duration::ZERO);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QosParams {
    pub deadline: Duration,
    pub jitter: Duration,
    pub rate: Duration,
}

impl QosParams {
    /// No constraint.
    pub const fn new() -> Self {
        Self {
            deadline: Duration::ZERO,
            jitter: Duration::ZERO,
            rate: Duration::ZERO,
        }
    }

    #[must_use]
    pub const fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    #[must_use]
    pub const fn jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    #[must_use]
    pub const fn rate(mut self, rate: Duration) -> Self {
        self.rate = rate;
        self
    }
}

impl QosChecks {
    /// Delay after the reference time at which the data turns invalid.
    ///
    /// `Duration::ZERO` means no constraint is active. With both checks on,
    /// the jitter bound `min + jitter` wins when the window is seeded and it
    /// is earlier than the deadline.
    pub fn critical_delay(
        &self,
        deadline: Duration,
        jitter: Duration,
        window: &LatencyWindow,
    ) -> Duration {
        let jitter_bound = match window.min() {
            Some(min) if self.jitter && !jitter.is_zero() => Some(min.saturating_add(jitter)),
            _ => None,
        };
        match (self.deadline, jitter_bound) {
            (true, Some(bound)) if deadline.is_zero() || bound < deadline => bound,
            (true, _) => deadline,
            (false, Some(bound)) => bound,
            (false, None) => Duration::ZERO,
        }
    }

    /// Violation kind a timer armed with this critical delay reports.
    pub fn attribute(&self, deadline: Duration, jitter: Duration, window: &LatencyWindow) -> Status {
        if self.deadline && self.critical_delay(deadline, jitter, window) == deadline {
            Status::DeadlineViolation
        } else {
            Status::JitterViolation
        }
    }

    /// Absolute critical time relative to `reference`, `None` when infinite.
    pub fn absolute_deadline(
        &self,
        reference: Instant,
        deadline: Duration,
        jitter: Duration,
        window: &LatencyWindow,
    ) -> Option<Instant> {
        let delay = self.critical_delay(deadline, jitter, window);
        if delay.is_zero() {
            None
        } else {
            reference.checked_add(delay)
        }
    }

    /// Deadline check, then jitter check (which updates the window).
    ///
    /// Shared by firm and hard subscribers and requests.
    pub fn check_latency(
        &self,
        latency: Duration,
        deadline: Duration,
        jitter: Duration,
        window: &mut LatencyWindow,
    ) -> Status {
        if self.deadline && !deadline.is_zero() && latency > deadline {
            return Status::DeadlineViolation;
        }
        if self.jitter && !jitter.is_zero() && !window.track(latency, jitter) {
            return Status::JitterViolation;
        }
        Status::Ok
    }

    /// Whether data of age `latency` is still valid, without updating the window.
    pub fn is_valid(
        &self,
        latency: Duration,
        deadline: Duration,
        jitter: Duration,
        window: &LatencyWindow,
    ) -> bool {
        if self.deadline && !deadline.is_zero() && latency > deadline {
            return false;
        }
        if self.jitter && !jitter.is_zero() && !window.admits(latency, jitter) {
            return false;
        }
        true
    }
}
