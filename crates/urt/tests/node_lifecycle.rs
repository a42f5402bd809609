// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::missing_panics_doc)] // Tests/examples panic on failure

//! Node lifecycle integration tests
//!
//! Nodes exchanging messages and calls on their own threads.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use urt::core::rt::{EventMask, Notification, Notifier, WaitMode};
use urt::pubsub::{Fetch, NrtSubscriber, PublishPolicy, Publisher};
use urt::{Core, CoreConfig, NodeContext, NodeTask, Request, RetrievePolicy, Service, Status, Topic};

const MSG_EVENT: EventMask = 0x1;
const CALL_EVENT: EventMask = 0x2;

fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(5) {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    done()
}

struct Listener {
    topic: Arc<Topic>,
    sub: NrtSubscriber,
    received: Arc<Mutex<Vec<u8>>>,
    stopped: Arc<Mutex<Option<Status>>>,
}

impl NodeTask for Listener {
    fn setup(&mut self, ctx: &NodeContext) -> EventMask {
        self.sub
            .subscribe(&self.topic, ctx.notification(MSG_EVENT))
            .expect("subscribe");
        MSG_EVENT
    }

    fn run(&mut self, _ctx: &NodeContext, _events: EventMask) -> EventMask {
        let mut buf = [0u8; 8];
        while let Ok(Fetch::Message { .. }) = self.sub.fetch_next(&mut buf) {
            self.received.lock().push(buf[0]);
        }
        MSG_EVENT
    }

    fn shutdown(&mut self, _ctx: &NodeContext, reason: Status) {
        *self.stopped.lock() = Some(reason);
    }
}

/// Hosts service 5 and doubles the first payload byte.
#[derive(Default)]
struct Doubler {
    service: Option<Arc<Service>>,
}

impl NodeTask for Doubler {
    fn setup(&mut self, ctx: &NodeContext) -> EventMask {
        self.service = ctx
            .core()
            .create_service(5, ctx.notification(CALL_EVENT))
            .ok();
        CALL_EVENT
    }

    fn run(&mut self, _ctx: &NodeContext, _events: EventMask) -> EventMask {
        let Some(service) = &self.service else {
            return 0;
        };
        let mut buf = [0u8; 8];
        while let Ok(Some(d)) = service.dispatch(&mut buf) {
            if let Ok(responder) = service.acquire_request(&d) {
                let _ = responder.respond(&[buf[0] * 2]);
            }
        }
        CALL_EVENT
    }
}

#[test]
fn test_node_receives_published_messages() {
    let core = Core::new(CoreConfig::default()).expect("core");
    let topic = core.create_topic(1, 8, 8).expect("topic");
    let received = Arc::new(Mutex::new(Vec::new()));
    let stopped = Arc::new(Mutex::new(None));
    core.add_node(
        "listener",
        Listener {
            topic: Arc::clone(&topic),
            sub: NrtSubscriber::new(),
            received: Arc::clone(&received),
            stopped: Arc::clone(&stopped),
        },
    );
    core.start_nodes().expect("start");
    assert!(wait_until(|| topic.profile().subscribers == 1));

    let publisher = Publisher::new(Arc::clone(&topic));
    for v in 1..=3 {
        publisher
            .publish(&[v], None, PublishPolicy::Determined, None)
            .expect("publish");
    }
    assert!(wait_until(|| received.lock().len() == 3));
    assert_eq!(*received.lock(), vec![1, 2, 3]);

    assert_eq!(core.stop_nodes(Status::Ok), Status::Ok);
    core.join_nodes();
    assert_eq!(*stopped.lock(), Some(Status::Ok));
    // subscriber released with the node task
    assert_eq!(topic.profile().subscribers, 0);
}

#[test]
fn test_service_node_answers_calls() {
    let core = Core::new(CoreConfig::default()).expect("core");
    core.add_node("doubler", Doubler::default());
    core.start_nodes().expect("start");
    assert!(wait_until(|| core.service(5).is_some()));
    let service = core.service(5).expect("service");

    let client = Notifier::new();
    let request = Request::nrt(8);
    request
        .acquire()
        .expect("acquire")
        .submit(
            &service,
            &[21],
            Some(Notification::new(client.clone(), 0x10)),
            Duration::ZERO,
        )
        .expect("submit");
    let events = client.wait(0x10, WaitMode::Any, Some(Duration::from_secs(5)));
    assert_eq!(events & 0x10, 0x10);

    let mut buf = [0u8; 8];
    let retrieved = request
        .retrieve(RetrievePolicy::Blocking, &mut buf)
        .expect("retrieve");
    assert_eq!((retrieved.status, buf[0]), (Status::Ok, 42));
    assert_eq!(service.profile().calls, 1);

    core.stop_nodes(Status::Ok);
    core.join_nodes();
}

#[test]
fn test_emergency_ends_every_node() {
    let core = Core::new(CoreConfig::default()).expect("core");
    let recorder = Arc::new(urt::core::RecordingPanicHandler::new());
    core.set_panic_handler(Arc::clone(&recorder));
    let topic = core.create_topic(1, 8, 8).expect("topic");
    let stopped = Arc::new(Mutex::new(None));
    core.add_node(
        "listener",
        Listener {
            topic: Arc::clone(&topic),
            sub: NrtSubscriber::new(),
            received: Arc::new(Mutex::new(Vec::new())),
            stopped: Arc::clone(&stopped),
        },
    );
    core.add_node("doubler", Doubler::default());
    core.start_nodes().expect("start");
    assert!(wait_until(|| core.service(5).is_some()));

    core.panic(Status::JitterViolation);
    core.join_nodes();
    assert_eq!(*stopped.lock(), Some(Status::JitterViolation));
    assert_eq!(recorder.reasons(), vec![Status::JitterViolation]);
    // a later stop request keeps the first reason
    assert_eq!(core.stop_nodes(Status::Ok), Status::JitterViolation);
}
