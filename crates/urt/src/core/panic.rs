// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fatal halt raised by hard real-time violations without a recovery callback.
//!
//! [`crate::Core::panic`] latches the reason, wakes every node with the
//! emergency flag, then hands the reason to the installed [`PanicHandler`].
//! The default handler aborts the process. Tests install a
//! [`RecordingPanicHandler`] instead to observe escalations.

use crate::status::Status;
use parking_lot::Mutex;

/// Final action of a core panic.
///
/// Called from application threads and from the timer thread; must not call
/// back into the topic or request that raised the violation.
pub trait PanicHandler: Send + Sync {
    fn on_panic(&self, reason: Status);
}

/// Default handler: log and abort the process.
#[derive(Debug, Default)]
pub struct AbortOnPanic;

impl PanicHandler for AbortOnPanic {
    fn on_panic(&self, reason: Status) {
        log::error!("[Core::panic] {}, aborting", reason);
        std::process::abort();
    }
}

/// Handler that records every reason and returns.
#[derive(Debug, Default)]
pub struct RecordingPanicHandler {
    reasons: Mutex<Vec<Status>>,
}

impl RecordingPanicHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reasons seen so far, oldest first.
    pub fn reasons(&self) -> Vec<Status> {
        self.reasons.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.reasons.lock().len()
    }
}

impl PanicHandler for RecordingPanicHandler {
    fn on_panic(&self, reason: Status) {
        log::warn!("[Core::panic] {} (recorded)", reason);
        self.reasons.lock().push(reason);
    }
}

impl<T: PanicHandler + ?Sized> PanicHandler for std::sync::Arc<T> {
    fn on_panic(&self, reason: Status) {
        (**self).on_panic(reason);
    }
}
