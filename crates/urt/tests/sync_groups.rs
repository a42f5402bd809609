// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![cfg(feature = "syncgroups")]
#![allow(clippy::missing_panics_doc)] // Tests/examples panic on failure

//! Synchronisation group integration tests
//!
//! Node threads stepping in lockstep through a shared group.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use urt::config::SYNC_FLAG_PROCEED;
use urt::core::rt::{EventMask, Notification, Notifier};
use urt::core::{SyncGroup, SyncNode};
use urt::pubsub::{Fetch, NrtSubscriber, PublishPolicy, Publisher};
use urt::{Core, CoreConfig, NodeContext, NodeTask, Status, Topic};

const TICK_EVENT: EventMask = 0x1;
const SYNC_EVENT: EventMask = 0x2;

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

/// Reaches the barrier on every tick and counts completed rounds.
struct Stepper {
    topic: Arc<Topic>,
    group: Arc<SyncGroup>,
    sub: NrtSubscriber,
    sync: SyncNode,
    released: Arc<AtomicUsize>,
}

impl Stepper {
    fn new(topic: &Arc<Topic>, group: &Arc<SyncGroup>, released: &Arc<AtomicUsize>) -> Self {
        Self {
            topic: Arc::clone(topic),
            group: Arc::clone(group),
            sub: NrtSubscriber::new(),
            sync: SyncNode::new(),
            released: Arc::clone(released),
        }
    }
}

impl NodeTask for Stepper {
    fn setup(&mut self, ctx: &NodeContext) -> EventMask {
        self.sub
            .subscribe(&self.topic, ctx.notification(TICK_EVENT))
            .expect("subscribe");
        self.sync
            .join(&self.group, ctx.notification(SYNC_EVENT))
            .expect("join");
        TICK_EVENT | SYNC_EVENT
    }

    fn run(&mut self, _ctx: &NodeContext, events: EventMask) -> EventMask {
        if events & TICK_EVENT != 0 {
            let mut buf = [0u8; 4];
            while let Ok(Fetch::Message { .. }) = self.sub.fetch_next(&mut buf) {
                self.sync.synchronize().expect("synchronize");
            }
        }
        if events & SYNC_EVENT != 0
            && self.sync.listener().clear_flags(SYNC_FLAG_PROCEED) & SYNC_FLAG_PROCEED != 0
        {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
        TICK_EVENT | SYNC_EVENT
    }
}

#[test]
fn test_nodes_step_through_group_rounds() {
    let core = Core::new(CoreConfig::default()).expect("core");
    let topic = core.create_topic(1, 4, 8).expect("topic");
    let group = SyncGroup::new();
    let released = Arc::new(AtomicUsize::new(0));
    core.add_node("left", Stepper::new(&topic, &group, &released));
    core.add_node("right", Stepper::new(&topic, &group, &released));
    core.start_nodes().expect("start");
    assert!(wait_until(|| group.len() == 2));

    let publisher = Publisher::new(Arc::clone(&topic));
    for round in 1..=2u64 {
        publisher
            .publish(&[round as u8], None, PublishPolicy::Determined, None)
            .expect("publish");
        assert!(wait_until(|| group.rounds() == round));
        // both members see the proceed of every round
        assert!(wait_until(|| released.load(Ordering::SeqCst) == 2 * round as usize));
        assert!(group.is_synchronized());
    }

    assert_eq!(core.stop_nodes(Status::Ok), Status::Ok);
    core.join_nodes();
    // memberships end with their node tasks
    assert!(group.is_empty());
}

#[test]
fn test_leaving_member_completes_round() {
    let group = SyncGroup::new();
    let notifier = Notifier::new();
    let mut stays = SyncNode::new();
    let mut leaves = SyncNode::new();
    stays
        .join(&group, Notification::new(notifier.clone(), SYNC_EVENT))
        .expect("join");
    leaves
        .join(&group, Notification::new(Notifier::new(), SYNC_EVENT))
        .expect("join");

    assert_eq!(stays.synchronize().expect("sync"), Status::SyncPending);
    let waiter = std::thread::spawn(move || stays.wait(Some(Duration::from_secs(5))).expect("wait"));
    std::thread::sleep(Duration::from_millis(10));
    leaves.leave().expect("leave");

    assert_eq!(waiter.join().expect("join"), Status::Ok);
    assert_eq!(notifier.pending() & SYNC_EVENT, SYNC_EVENT);
    assert_eq!(group.rounds(), 1);
}
