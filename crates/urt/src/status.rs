// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Outcome codes reported by value from every middleware operation.
//!
//! A [`Status`] is not an error: `FetchNoMessage` or `RequestLocked` are the
//! everyday results of non-blocking calls, and QoS violations on firm
//! entities are informative. Misuse of the API is reported separately through
//! [`crate::Error`].
//!
//! Codes are grouped by high nibble:
//!
//! | Range | Group |
//! |-------|-------|
//! | `0x00` | success |
//! | `0x1_` | QoS violations |
//! | `0x2_` | node synchronisation |
//! | `0xE_` | publish / fetch |
//! | `0xF_` | request ownership |

use std::fmt;

/// Status of a middleware operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Status {
    /// Operation succeeded.
    #[default]
    Ok = 0x00,

    // -- QoS violations --------------------------------------------------
    /// Latency exceeded the configured deadline offset.
    DeadlineViolation = 0x10,
    /// Latency fell outside the adaptive jitter window.
    JitterViolation = 0x11,
    /// No new message arrived within the expected period.
    RateViolation = 0x12,

    // -- Node synchronisation ---------------------------------------------
    /// Other nodes have not reached this stage yet.
    SyncPending = 0x20,
    /// Nodes disagree on the synchronisation stage.
    SyncError = 0x21,

    // -- Publish / fetch ----------------------------------------------------
    /// Topic lock was contended (lazy policy).
    PublishLocked = 0xE1,
    /// Next slot still owes hard real-time consumers.
    PublishBlocked = 0xE2,
    /// Waiting for hard real-time consumers timed out.
    PublishTimeout = 0xE3,
    /// Nothing new to fetch.
    FetchNoMessage = 0xE5,

    // -- Request ownership ------------------------------------------------
    /// Request is owned by a service.
    RequestBadOwner = 0xF1,
    /// Request lock was contended.
    RequestLocked = 0xF2,
    /// Request still awaits a response.
    RequestPending = 0xF3,
    /// Request was resubmitted since it was dispatched.
    RequestObsolete = 0xF4,
}

impl Status {
    /// Stable numeric code.
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    #[inline]
    pub const fn is_ok(self) -> bool {
        matches!(self, Status::Ok)
    }

    /// True for deadline, jitter and rate violations.
    #[inline]
    pub const fn is_violation(self) -> bool {
        matches!(
            self,
            Status::DeadlineViolation | Status::JitterViolation | Status::RateViolation
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Status::Ok => "ok",
            Status::DeadlineViolation => "deadline violation",
            Status::JitterViolation => "jitter violation",
            Status::RateViolation => "rate violation",
            Status::SyncPending => "synchronisation pending",
            Status::SyncError => "synchronisation error",
            Status::PublishLocked => "topic locked",
            Status::PublishBlocked => "publish blocked by hard real-time consumers",
            Status::PublishTimeout => "publish timed out",
            Status::FetchNoMessage => "no message",
            Status::RequestBadOwner => "request owned by service",
            Status::RequestLocked => "request locked",
            Status::RequestPending => "request pending",
            Status::RequestObsolete => "request obsolete",
        };
        write!(f, "{} (0x{:02X})", text, self.code())
    }
}

/// Real-time class of a subscriber or request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RtClass {
    /// Best effort, no QoS.
    Nrt,
    /// Soft real-time, advisory usefulness score.
    Srt,
    /// Firm real-time, violations are reported.
    Frt,
    /// Hard real-time, violations escalate.
    Hrt,
}

impl fmt::Display for RtClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RtClass::Nrt => "NRT",
            RtClass::Srt => "SRT",
            RtClass::Frt => "FRT",
            RtClass::Hrt => "HRT",
        };
        f.write_str(name)
    }
}
