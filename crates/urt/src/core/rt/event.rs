// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Event notification between threads.
//!
//! # Architecture
//! - [`Notifier`]: per-thread mailbox of pending event bits (mutex + condvar)
//! - [`Notification`]: a notifier plus the bits to raise on it
//! - [`EventSource`]: broadcaster owned by topics and the core
//! - [`EventListener`]: per-registration flags accumulated by broadcasts
//!
//! A thread waits on its notifier for any or all bits of a mask. Waiting
//! clears the returned bits, signalling ORs them in, so wakes are never lost
//! between two waits.
//!
//! # Example
//! ```ignore
//! let notifier = Notifier::new();
//! let listener = EventListener::new();
//! topic_events.register(&listener, Notification::new(notifier.clone(), 0x1));
//!
//! // Publisher thread
//! topic_events.broadcast(0);
//!
//! // Subscriber thread
//! let woke = notifier.wait(0x1, WaitMode::Any, Some(Duration::from_millis(10)));
//! ```

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Bit mask identifying event channels on a notifier.
pub type EventMask = u32;

/// Payload flags delivered to listeners.
pub type EventFlags = u32;

/// How [`Notifier::wait`] matches the requested mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    /// Return as soon as any bit of the mask is pending.
    Any,
    /// Return only when every bit of the mask is pending.
    All,
}

#[derive(Debug, Default)]
struct NotifierInner {
    pending: Mutex<EventMask>,
    condvar: Condvar,
}

/// Event mailbox of one thread.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    inner: Arc<NotifierInner>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise `mask` and wake the waiter.
    pub fn signal(&self, mask: EventMask) {
        let mut pending = self.inner.pending.lock();
        *pending |= mask;
        self.inner.condvar.notify_all();
    }

    /// Pending bits, without clearing them.
    pub fn pending(&self) -> EventMask {
        *self.inner.pending.lock()
    }

    /// Wait for bits of `mask`.
    ///
    /// Returns the matched bits and clears them. Returns `0` when the timeout
    /// elapses first; `None` waits forever.
    pub fn wait(&self, mask: EventMask, mode: WaitMode, timeout: Option<Duration>) -> EventMask {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut pending = self.inner.pending.lock();
        loop {
            let hit = *pending & mask;
            let ready = match mode {
                WaitMode::Any => hit != 0,
                WaitMode::All => hit == mask,
            };
            if ready {
                *pending &= !hit;
                return hit;
            }
            match deadline {
                Some(deadline) => {
                    if self
                        .inner
                        .condvar
                        .wait_until(&mut pending, deadline)
                        .timed_out()
                    {
                        return 0;
                    }
                }
                // No timeout, or one too large to represent.
                None => self.inner.condvar.wait(&mut pending),
            }
        }
    }

    /// True when both handles refer to the same mailbox.
    pub fn same(&self, other: &Notifier) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// A notifier and the bits to raise on it.
#[derive(Debug, Clone)]
pub struct Notification {
    notifier: Notifier,
    mask: EventMask,
}

impl Notification {
    pub fn new(notifier: Notifier, mask: EventMask) -> Self {
        Self { notifier, mask }
    }

    #[inline]
    pub fn signal(&self) {
        self.notifier.signal(self.mask);
    }

    #[inline]
    pub fn mask(&self) -> EventMask {
        self.mask
    }

    #[inline]
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}

/// Registration handle receiving broadcast flags.
#[derive(Debug, Clone, Default)]
pub struct EventListener {
    flags: Arc<Mutex<EventFlags>>,
}

impl EventListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flags accumulated since the last clear.
    pub fn flags(&self) -> EventFlags {
        *self.flags.lock()
    }

    /// Clear `mask` and return the flags that were set before.
    pub fn clear_flags(&self, mask: EventFlags) -> EventFlags {
        let mut flags = self.flags.lock();
        let old = *flags;
        *flags &= !mask;
        old
    }

    fn same(&self, other: &EventListener) -> bool {
        Arc::ptr_eq(&self.flags, &other.flags)
    }
}

#[derive(Debug)]
struct Registration {
    listener: EventListener,
    notification: Notification,
}

/// Broadcaster fanning events out to registered listeners.
#[derive(Debug, Default)]
pub struct EventSource {
    registrations: Mutex<Vec<Registration>>,
}

impl EventSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener`; broadcasts will signal `notification`.
    pub fn register(&self, listener: &EventListener, notification: Notification) {
        self.registrations.lock().push(Registration {
            listener: listener.clone(),
            notification,
        });
    }

    /// Remove `listener`. Returns false if it was not registered.
    pub fn unregister(&self, listener: &EventListener) -> bool {
        let mut regs = self.registrations.lock();
        let before = regs.len();
        regs.retain(|r| !r.listener.same(listener));
        regs.len() != before
    }

    /// OR `flags` into every listener and signal its notifier.
    pub fn broadcast(&self, flags: EventFlags) {
        let regs = self.registrations.lock();
        for reg in regs.iter() {
            *reg.listener.flags.lock() |= flags;
            reg.notification.signal();
        }
    }

    pub fn len(&self) -> usize {
        self.registrations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
