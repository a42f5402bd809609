// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The core: composition root of a urt application.
//!
//! A [`Core`] owns the topic and service registries, the list of nodes, the
//! latched system status and the core event source every node listens on.
//! Topics, subscribers and requests share its runtime (configuration,
//! timers, panic handler) through an `Arc`.
//!
//! # Lifecycle
//!
//! ```text
//! Core::new -> create_topic / create_service / add_node
//!           -> start_nodes -> (nodes synchronise, loop)
//!           -> stop_nodes | panic -> join_nodes
//! ```

pub mod node;
pub mod panic;
pub mod rt;
#[cfg(feature = "syncgroups")]
pub mod sync;

pub use node::{NodeContext, NodeId, NodeTask};
pub use panic::{AbortOnPanic, PanicHandler, RecordingPanicHandler};
#[cfg(feature = "syncgroups")]
pub use sync::{ExternalSync, SyncGroup, SyncNode, SyncStage, SyncState, Synchronize};

use crate::config::{
    CoreConfig, CORE_EVENT_MASK, EVENT_FLAG_EMERGENCY, EVENT_FLAG_PROCEED, EVENT_FLAG_TERMINATE,
};
use crate::error::{Error, Result};
use crate::pubsub::{Topic, TopicId};
use crate::rpc::{Service, ServiceId};
use crate::status::Status;
use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use rt::{EventListener, EventSource, Notification, Notifier, TimerService};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// State shared by the core and every entity created from it.
pub(crate) struct Runtime {
    pub(crate) config: CoreConfig,
    status: Mutex<Status>,
    pub(crate) events: EventSource,
    panic_handler: ArcSwap<Box<dyn PanicHandler>>,
    pub(crate) timers: TimerService,
}

impl Runtime {
    fn new(config: CoreConfig) -> Result<Self> {
        config.validate()?;
        let timers = TimerService::spawn(&config.timer_thread_name)?;
        Ok(Self {
            config,
            status: Mutex::new(Status::Ok),
            events: EventSource::new(),
            panic_handler: ArcSwap::from_pointee(Box::new(AbortOnPanic) as Box<dyn PanicHandler>),
            timers,
        })
    }

    pub(crate) fn status(&self) -> Status {
        *self.status.lock()
    }

    /// Latch `reason` unless a status is already latched. Returns the status
    /// in effect afterwards.
    fn latch(&self, reason: Status) -> Status {
        let mut status = self.status.lock();
        if status.is_ok() {
            *status = reason;
        }
        *status
    }

    pub(crate) fn panic(&self, reason: Status) {
        self.latch(reason);
        log::error!("[Core::panic] {}", reason);
        self.events.broadcast(EVENT_FLAG_EMERGENCY);
        self.panic_handler.load().on_panic(reason);
    }
}

struct NodeEntry {
    name: String,
    stage: u64,
    task: Option<Box<dyn NodeTask>>,
    listener: EventListener,
    loops: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

/// Registry and lifecycle controller.
pub struct Core {
    runtime: Arc<Runtime>,
    topics: RwLock<BTreeMap<TopicId, Arc<Topic>>>,
    services: RwLock<BTreeMap<ServiceId, Arc<Service>>>,
    nodes: Mutex<Vec<NodeEntry>>,
}

impl Core {
    /// Create a core and start its timer thread.
    pub fn new(config: CoreConfig) -> Result<Arc<Self>> {
        let runtime = Arc::new(Runtime::new(config)?);
        log::debug!("[Core::new] Timer thread '{}' started", runtime.config.timer_thread_name);
        Ok(Arc::new(Self {
            runtime,
            topics: RwLock::new(BTreeMap::new()),
            services: RwLock::new(BTreeMap::new()),
            nodes: Mutex::new(Vec::new()),
        }))
    }

    pub fn config(&self) -> &CoreConfig {
        &self.runtime.config
    }

    /// Latched system status, `Status::Ok` until a panic or stop.
    pub fn status(&self) -> Status {
        self.runtime.status()
    }

    /// Event bit the core uses on node notifiers.
    pub fn event_mask(&self) -> rt::EventMask {
        CORE_EVENT_MASK
    }

    /// Replace the action taken on a core panic.
    pub fn set_panic_handler<H: PanicHandler + 'static>(&self, handler: H) {
        self.runtime
            .panic_handler
            .store(Arc::new(Box::new(handler) as Box<dyn PanicHandler>));
    }

    /// Emergency stop: latch `reason`, wake every node, run the panic handler.
    pub fn panic(&self, reason: Status) {
        self.runtime.panic(reason);
    }

    // -- Topics -------------------------------------------------------------

    /// Create and register a topic with `buffer_size` message slots.
    pub fn create_topic(
        &self,
        id: TopicId,
        payload_capacity: usize,
        buffer_size: usize,
    ) -> Result<Arc<Topic>> {
        let mut topics = self.topics.write();
        if topics.contains_key(&id) {
            return Err(Error::DuplicateTopic(id));
        }
        let topic = Topic::new(id, payload_capacity, buffer_size, Arc::clone(&self.runtime));
        topics.insert(id, Arc::clone(&topic));
        log::debug!(
            "[Core::create_topic] Topic {} ({} slots of {} bytes)",
            id,
            topic.buffer_size(),
            payload_capacity
        );
        Ok(topic)
    }

    pub fn topic(&self, id: TopicId) -> Option<Arc<Topic>> {
        self.topics.read().get(&id).cloned()
    }

    /// Registered topic ids, ascending.
    pub fn topic_ids(&self) -> Vec<TopicId> {
        self.topics.read().keys().copied().collect()
    }

    // -- Services -----------------------------------------------------------

    /// Create and register a service; `notification` is signalled on submit.
    pub fn create_service(&self, id: ServiceId, notification: Notification) -> Result<Arc<Service>> {
        let mut services = self.services.write();
        if services.contains_key(&id) {
            return Err(Error::DuplicateService(id));
        }
        let service = Service::new(id, notification, Arc::clone(&self.runtime));
        services.insert(id, Arc::clone(&service));
        log::debug!("[Core::create_service] Service {}", id);
        Ok(service)
    }

    pub fn service(&self, id: ServiceId) -> Option<Arc<Service>> {
        self.services.read().get(&id).cloned()
    }

    /// Registered service ids, ascending.
    pub fn service_ids(&self) -> Vec<ServiceId> {
        self.services.read().keys().copied().collect()
    }

    // -- Nodes --------------------------------------------------------------

    /// Register a node. It runs once [`Core::start_nodes`] is called.
    pub fn add_node<T: NodeTask>(&self, name: &str, task: T) -> NodeId {
        let mut nodes = self.nodes.lock();
        nodes.push(NodeEntry {
            name: name.to_string(),
            stage: 0,
            task: Some(Box::new(task)),
            listener: EventListener::new(),
            loops: Arc::new(AtomicU64::new(0)),
            thread: None,
        });
        NodeId(nodes.len() - 1)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.lock().len()
    }

    /// Loop iterations executed by a node.
    pub fn node_loops(&self, id: NodeId) -> u64 {
        self.nodes
            .lock()
            .get(id.0)
            .map(|n| n.loops.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Spawn one thread per registered node not started yet.
    pub fn start_nodes(self: &Arc<Self>) -> Result<()> {
        let mut nodes = self.nodes.lock();
        for (index, entry) in nodes.iter_mut().enumerate() {
            let Some(task) = entry.task.take() else {
                continue;
            };
            let notifier = Notifier::new();
            // Registered before the thread runs so no core event is missed.
            self.runtime.events.register(
                &entry.listener,
                Notification::new(notifier.clone(), CORE_EVENT_MASK),
            );
            let ctx = NodeContext::new(
                NodeId(index),
                entry.name.clone(),
                notifier,
                entry.listener.clone(),
                Arc::clone(&entry.loops),
                Arc::clone(self),
            );
            let handle = std::thread::Builder::new()
                .name(format!("{}{}", crate::config::NODE_THREAD_PREFIX, entry.name))
                .spawn(move || node::run(ctx, task))?;
            log::debug!("[Core::start_nodes] Node '{}' started", entry.name);
            entry.thread = Some(handle);
        }
        Ok(())
    }

    /// Advance `node` to its next stage and compare with all other nodes.
    ///
    /// - `Ok`: every node reached the stage, proceed is broadcast
    /// - `SyncPending`: some nodes are one stage behind
    /// - `SyncError`: stage mismatch, the core panics
    pub fn synchronize_nodes(&self, node: NodeId) -> Status {
        let status = {
            let mut nodes = self.nodes.lock();
            let Some(stage) = nodes.get_mut(node.0).map(|n| {
                n.stage += 1;
                n.stage
            }) else {
                return Status::SyncError;
            };
            match nodes.iter().find(|n| n.stage != stage) {
                None => Status::Ok,
                Some(other) if other.stage + 1 == stage => Status::SyncPending,
                Some(other) => {
                    log::warn!(
                        "[Core::synchronize_nodes] Node '{}' at stage {}, expected {}",
                        other.name,
                        other.stage,
                        stage
                    );
                    Status::SyncError
                }
            }
        };

        match status {
            Status::Ok => self.runtime.events.broadcast(EVENT_FLAG_PROCEED),
            Status::SyncError => self.runtime.panic(Status::SyncError),
            _ => {}
        }
        status
    }

    /// Ask every node to terminate with `reason`.
    ///
    /// Ignored when a status is already latched; that status is returned.
    pub fn stop_nodes(&self, reason: Status) -> Status {
        {
            let mut status = self.runtime.status.lock();
            if !status.is_ok() {
                return *status;
            }
            *status = reason;
        }
        log::debug!("[Core::stop_nodes] Terminating nodes ({})", reason);
        self.runtime.events.broadcast(EVENT_FLAG_TERMINATE);
        Status::Ok
    }

    /// Wait for every started node thread to finish.
    pub fn join_nodes(&self) {
        let handles: Vec<_> = self
            .nodes
            .lock()
            .iter_mut()
            .filter_map(|n| n.thread.take().map(|h| (n.name.clone(), h)))
            .collect();
        for (name, handle) in handles {
            if handle.join().is_err() {
                log::warn!("[Core::join_nodes] Node '{}' panicked", name);
            }
        }
    }

    /// Remove a node's listener from the core event source.
    pub(crate) fn unregister_node(&self, listener: &EventListener) {
        self.runtime.events.unregister(listener);
    }
}

impl std::fmt::Debug for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core")
            .field("status", &self.status())
            .field("topics", &self.topic_ids())
            .field("services", &self.service_ids())
            .field("nodes", &self.node_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rt::WaitMode;

    fn core() -> (Arc<Core>, Arc<RecordingPanicHandler>) {
        let core = Core::new(CoreConfig::default()).expect("core");
        let handler = Arc::new(RecordingPanicHandler::new());
        core.set_panic_handler(Arc::clone(&handler));
        (core, handler)
    }

    #[test]
    fn test_topic_registry_rejects_duplicates() {
        let (core, _) = core();
        core.create_topic(7, 16, 4).expect("topic 7");
        core.create_topic(3, 16, 4).expect("topic 3");
        assert!(matches!(
            core.create_topic(7, 8, 2),
            Err(Error::DuplicateTopic(7))
        ));
        assert_eq!(core.topic_ids(), vec![3, 7]);
        assert_eq!(core.topic(7).map(|t| t.id()), Some(7));
        assert!(core.topic(5).is_none());
    }

    #[test]
    fn test_service_registry_rejects_duplicates() {
        let (core, _) = core();
        let notification = Notification::new(Notifier::new(), 0x1);
        core.create_service(2, notification.clone()).expect("service");
        assert!(matches!(
            core.create_service(2, notification),
            Err(Error::DuplicateService(2))
        ));
        assert_eq!(core.service_ids(), vec![2]);
    }

    #[test]
    fn test_panic_latches_first_reason_and_broadcasts() {
        let (core, handler) = core();
        let notifier = Notifier::new();
        let listener = EventListener::new();
        core.runtime
            .events
            .register(&listener, Notification::new(notifier.clone(), CORE_EVENT_MASK));

        core.panic(Status::DeadlineViolation);
        core.panic(Status::RateViolation);

        assert_eq!(core.status(), Status::DeadlineViolation);
        assert_eq!(
            handler.reasons(),
            vec![Status::DeadlineViolation, Status::RateViolation]
        );
        assert_eq!(listener.flags() & EVENT_FLAG_EMERGENCY, EVENT_FLAG_EMERGENCY);
        assert_eq!(notifier.wait(CORE_EVENT_MASK, WaitMode::Any, None), CORE_EVENT_MASK);
    }

    #[test]
    fn test_stop_nodes_ignored_after_error() {
        let (core, _) = core();
        assert_eq!(core.stop_nodes(Status::SyncPending), Status::Ok);
        assert_eq!(core.status(), Status::SyncPending);
        assert_eq!(core.stop_nodes(Status::Ok), Status::SyncPending);
    }

    struct Idle;

    impl NodeTask for Idle {
        fn run(&mut self, _ctx: &NodeContext, _events: rt::EventMask) -> rt::EventMask {
            0
        }
    }

    #[test]
    fn test_synchronize_stage_mismatch_panics() {
        let (core, handler) = core();
        let a = core.add_node("a", Idle);
        let _b = core.add_node("b", Idle);

        assert_eq!(core.synchronize_nodes(a), Status::SyncPending);
        assert_eq!(core.synchronize_nodes(a), Status::SyncError);
        assert_eq!(handler.reasons(), vec![Status::SyncError]);
        assert_eq!(core.status(), Status::SyncError);
    }

    #[test]
    fn test_synchronize_all_equal_is_ok() {
        let (core, _) = core();
        let a = core.add_node("a", Idle);
        let b = core.add_node("b", Idle);
        assert_eq!(core.synchronize_nodes(a), Status::SyncPending);
        assert_eq!(core.synchronize_nodes(b), Status::Ok);
    }
}
