// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Panic-or-recover escalation of hard real-time violations.
//!
//! Every hard subscriber and hard request owns a [`ViolationLatch`]. When a
//! violation is detected (inline or by a QoS timer):
//!
//! - without a recovery callback, the core panics with the violation kind;
//! - with a callback, the latch is set to the kind and the callback runs,
//!   unless the latch already holds an uncleared violation.
//!
//! The callback (or any later code) re-enables escalation by clearing the
//! latch through [`Violation::clear`].
//!
//! The decision is taken while the entity's locks are held; the resulting
//! [`Escalation`] is dispatched after they are released so the callback or
//! panic handler may call back into the middleware.

use crate::core::Runtime;
use crate::status::Status;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Application recovery strategy.
pub type RecoveryCallback = Arc<dyn Fn(&Violation) + Send + Sync>;

/// Fire-once latch holding the unresolved violation of a hard entity.
#[derive(Debug, Clone, Default)]
pub struct ViolationLatch(Arc<Mutex<Status>>);

impl ViolationLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current violation, `Status::Ok` when clear.
    pub fn get(&self) -> Status {
        *self.0.lock()
    }

    pub fn clear(&self) {
        *self.0.lock() = Status::Ok;
    }

    /// Latch `reason` if clear. Returns whether it was latched.
    pub fn try_latch(&self, reason: Status) -> bool {
        let mut code = self.0.lock();
        if code.is_ok() {
            *code = reason;
            true
        } else {
            false
        }
    }
}

/// Violation handed to a recovery callback.
#[derive(Debug, Clone)]
pub struct Violation {
    reason: Status,
    latch: ViolationLatch,
}

impl Violation {
    pub fn reason(&self) -> Status {
        self.reason
    }

    /// Re-enable escalation for the entity.
    pub fn clear(&self) {
        self.latch.clear();
    }

    pub fn latch(&self) -> &ViolationLatch {
        &self.latch
    }
}

/// Recovery strategy of a hard entity.
///
/// The default has no callback: violations panic the core.
#[derive(Clone, Default)]
pub struct Recovery {
    callback: Option<RecoveryCallback>,
}

impl fmt::Debug for Recovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recovery")
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

impl Recovery {
    /// No callback, violations panic.
    pub fn panic() -> Self {
        Self::default()
    }

    /// Run `callback` on violations.
    pub fn with_callback<F>(callback: F) -> Self
    where
        F: Fn(&Violation) + Send + Sync + 'static,
    {
        Self {
            callback: Some(Arc::new(callback)),
        }
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    /// Decide the escalation for `reason`, latching it when recovering.
    pub(crate) fn escalate(&self, latch: &ViolationLatch, reason: Status) -> Option<Escalation> {
        match &self.callback {
            None => Some(Escalation::Panic(reason)),
            Some(callback) if latch.try_latch(reason) => Some(Escalation::Recover {
                callback: Arc::clone(callback),
                violation: Violation {
                    reason,
                    latch: latch.clone(),
                },
            }),
            Some(_) => None,
        }
    }
}

/// Escalation decided under lock, dispatched after unlock.
pub(crate) enum Escalation {
    Panic(Status),
    Recover {
        callback: RecoveryCallback,
        violation: Violation,
    },
}

impl Escalation {
    pub(crate) fn dispatch(self, runtime: &Runtime) {
        match self {
            Escalation::Panic(reason) => runtime.panic(reason),
            Escalation::Recover {
                callback,
                violation,
            } => {
                log::warn!("[recovery] {}, running recovery callback", violation.reason);
                callback(&violation);
            }
        }
    }
}
