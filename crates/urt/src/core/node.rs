// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Nodes: application threads driven by events.
//!
//! A node runs a [`NodeTask`] on its own thread:
//!
//! 1. `setup` returns the event mask to wait for (core events are always added)
//! 2. all nodes synchronise, then wait for the core proceed event
//! 3. `run` is called with every matching event set and returns the next mask
//! 4. an emergency or terminate core event ends the loop
//! 5. `shutdown` runs with the latched core status
//!
//! # Example
//! ```ignore
//! struct Blinker { sub: NrtSubscriber }
//!
//! impl NodeTask for Blinker {
//!     fn setup(&mut self, ctx: &NodeContext) -> EventMask {
//!         self.sub.subscribe(&topic, ctx.notification(0x1)).ok();
//!         0x1
//!     }
//!     fn run(&mut self, _ctx: &NodeContext, _events: EventMask) -> EventMask {
//!         let mut buf = [0u8; 8];
//!         while let Ok(Fetch::Message { .. }) = self.sub.fetch_next(&mut buf) {}
//!         0x1
//!     }
//! }
//! ```

use super::rt::{EventListener, EventMask, Notification, Notifier, WaitMode};
use super::Core;
use crate::config::{
    CORE_EVENT_MASK, EVENT_FLAG_EMERGENCY, EVENT_FLAG_PROCEED, EVENT_FLAG_TERMINATE, EVENT_MASK_ALL,
};
use crate::status::Status;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Index of a node in its core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Application logic of a node.
pub trait NodeTask: Send + 'static {
    /// Called once on the node thread before synchronisation.
    ///
    /// Returns the events the first `run` waits for.
    fn setup(&mut self, _ctx: &NodeContext) -> EventMask {
        EVENT_MASK_ALL
    }

    /// Called with the events that woke the node. Returns the next wait mask.
    fn run(&mut self, ctx: &NodeContext, events: EventMask) -> EventMask;

    /// Called once after the loop ends, with the core status.
    fn shutdown(&mut self, _ctx: &NodeContext, _reason: Status) {}
}

/// Handle passed to every [`NodeTask`] hook.
pub struct NodeContext {
    id: NodeId,
    name: String,
    notifier: Notifier,
    listener: EventListener,
    loops: Arc<AtomicU64>,
    core: Arc<Core>,
}

impl NodeContext {
    pub(crate) fn new(
        id: NodeId,
        name: String,
        notifier: Notifier,
        listener: EventListener,
        loops: Arc<AtomicU64>,
        core: Arc<Core>,
    ) -> Self {
        Self {
            id,
            name,
            notifier,
            listener,
            loops,
            core,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn core(&self) -> &Arc<Core> {
        &self.core
    }

    /// The node thread's event mailbox.
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Notification raising `mask` on this node, for subscribe and submit.
    pub fn notification(&self, mask: EventMask) -> Notification {
        Notification::new(self.notifier.clone(), mask)
    }

    /// Advance this node's synchronisation stage.
    pub fn synchronize(&self) -> Status {
        self.core.synchronize_nodes(self.id)
    }
}

/// Body of a node thread.
pub(crate) fn run(ctx: NodeContext, mut task: Box<dyn NodeTask>) {
    let core = Arc::clone(&ctx.core);
    let mut waitmask = CORE_EVENT_MASK | task.setup(&ctx);

    let mut running = true;
    if core.status().is_ok() {
        ctx.synchronize();
        ctx.notifier.wait(CORE_EVENT_MASK, WaitMode::All, None);
        let flags = ctx.listener.clear_flags(EVENT_FLAG_PROCEED);
        running = flags & (EVENT_FLAG_EMERGENCY | EVENT_FLAG_TERMINATE) == 0;
    }

    while running {
        let events = ctx.notifier.wait(waitmask, WaitMode::Any, None);
        if events & CORE_EVENT_MASK != 0 {
            let flags = ctx.listener.clear_flags(EventMask::MAX);
            if flags & EVENT_FLAG_EMERGENCY != 0 {
                log::debug!("[node:{}] Emergency, leaving loop", ctx.name);
                running = false;
            } else if flags & EVENT_FLAG_TERMINATE != 0 {
                log::debug!("[node:{}] Terminate requested", ctx.name);
                running = false;
            }
        } else {
            waitmask = CORE_EVENT_MASK | task.run(&ctx, events);
            ctx.loops.fetch_add(1, Ordering::Relaxed);
        }
    }

    task.shutdown(&ctx, core.status());
    core.unregister_node(&ctx.listener);
    log::debug!(
        "[node:{}] Stopped after {} loops",
        ctx.name,
        ctx.loops.load(Ordering::Relaxed)
    );
}
