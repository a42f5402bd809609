// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Runtime primitives the middleware is built on: event notification and
//! timers. Locks and condition variables come from `parking_lot`, time from
//! `std::time::Instant`.

pub mod event;
pub mod timer;

pub use event::{EventFlags, EventListener, EventMask, EventSource, Notification, Notifier, WaitMode};
pub use timer::{Timer, TimerService};
