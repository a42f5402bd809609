// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::cast_possible_truncation)] // Test parameters
#![allow(clippy::missing_panics_doc)] // Tests/examples panic on failure

//! Publish-subscribe integration tests
//!
//! Ring ordering, overwrite bookkeeping and firm QoS through the public API.

use std::sync::Arc;
use std::time::{Duration, Instant};
use urt::core::rt::{Notification, Notifier, WaitMode};
use urt::pubsub::{Fetch, FrtSubscriber, NrtSubscriber, PublishPolicy, Publisher, SrtSubscriber};
use urt::qos::QosParams;
use urt::{Core, CoreConfig, Status};

fn note() -> Notification {
    Notification::new(Notifier::new(), 0x1)
}

fn publish(publisher: &Publisher, value: u8) {
    let status = publisher
        .publish(&[value], None, PublishPolicy::Determined, None)
        .expect("publish");
    assert_eq!(status, Status::Ok);
}

fn drain(sub: &mut NrtSubscriber) -> Vec<u8> {
    let mut buf = [0u8; 16];
    let mut seen = Vec::new();
    while let Fetch::Message { sample, .. } = sub.fetch_next(&mut buf).expect("fetch") {
        assert_eq!(sample.size, 1);
        seen.push(buf[0]);
    }
    seen
}

#[test]
fn test_fetch_next_preserves_publish_order() {
    let core = Core::new(CoreConfig::default()).expect("core");
    let topic = core.create_topic(10, 16, 8).expect("topic");
    let publisher = Publisher::new(Arc::clone(&topic));
    let mut sub = NrtSubscriber::new();
    sub.subscribe(&topic, note()).expect("subscribe");

    for v in 1..=6 {
        publish(&publisher, v);
    }
    assert_eq!(drain(&mut sub), vec![1, 2, 3, 4, 5, 6]);

    let mut buf = [0u8; 16];
    let fetch = sub.fetch_next(&mut buf).expect("fetch");
    assert_eq!(fetch, Fetch::NoMessage);
    assert_eq!(fetch.status(), Status::FetchNoMessage);
    assert_eq!(sub.base().profile().received, 6);
}

#[test]
fn test_slow_subscriber_resumes_at_oldest_slot() {
    let core = Core::new(CoreConfig::default()).expect("core");
    let topic = core.create_topic(10, 16, 4).expect("topic");
    let publisher = Publisher::new(Arc::clone(&topic));
    let mut sub = NrtSubscriber::new();
    sub.subscribe(&topic, note()).expect("subscribe");

    for v in 1..=10 {
        publish(&publisher, v);
    }
    // only the last four slots survive
    assert_eq!(drain(&mut sub), vec![7, 8, 9, 10]);
    assert_eq!(topic.profile().published, 10);
    assert_eq!(topic.profile().discarded, 6);
    assert_eq!(topic.outstanding_consumers(), 0);
}

#[test]
fn test_fetch_latest_releases_every_unread_slot() {
    let core = Core::new(CoreConfig::default()).expect("core");
    let topic = core.create_topic(10, 16, 8).expect("topic");
    let publisher = Publisher::new(Arc::clone(&topic));
    let mut first = NrtSubscriber::new();
    let mut second = NrtSubscriber::new();
    first.subscribe(&topic, note()).expect("subscribe");
    second.subscribe(&topic, note()).expect("subscribe");

    for v in 1..=3 {
        publish(&publisher, v);
    }
    assert_eq!(topic.outstanding_consumers(), 6);

    let mut buf = [0u8; 16];
    assert!(first.fetch_latest(&mut buf).expect("fetch").is_message());
    assert_eq!(buf[0], 3);
    assert_eq!(topic.outstanding_consumers(), 3);

    assert_eq!(drain(&mut second), vec![1, 2, 3]);
    assert_eq!(topic.outstanding_consumers(), 0);
    assert_eq!(first.fetch_next(&mut buf).expect("fetch"), Fetch::NoMessage);
}

#[test]
fn test_publish_wakes_subscriber_thread() {
    let core = Core::new(CoreConfig::default()).expect("core");
    let topic = core.create_topic(10, 16, 8).expect("topic");
    let notifier = Notifier::new();
    let mut sub = NrtSubscriber::new();
    sub.subscribe(&topic, Notification::new(notifier.clone(), 0x4))
        .expect("subscribe");

    let publisher = Publisher::new(Arc::clone(&topic));
    let handle = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(10));
        publish(&publisher, 42);
    });

    let events = notifier.wait(0x4, WaitMode::Any, Some(Duration::from_secs(5)));
    assert_eq!(events & 0x4, 0x4);
    handle.join().expect("join");

    let mut buf = [0u8; 16];
    assert!(sub.fetch_next(&mut buf).expect("fetch").is_message());
    assert_eq!(buf[0], 42);
}

#[test]
fn test_firm_jitter_window() {
    let core = Core::new(CoreConfig::default()).expect("core");
    let topic = core.create_topic(10, 16, 8).expect("topic");
    let publisher = Publisher::new(Arc::clone(&topic));
    let mut sub = FrtSubscriber::new();
    let params = QosParams::new().jitter(Duration::from_millis(10));
    sub.subscribe(&topic, note(), params).expect("subscribe");

    let mut buf = [0u8; 16];
    let mut fetch_aged = |age_ms: u64| -> Status {
        let origin = Instant::now() - Duration::from_millis(age_ms);
        publisher
            .publish(&[0], Some(origin), PublishPolicy::Determined, None)
            .expect("publish");
        sub.fetch_next(&mut buf).expect("fetch").status()
    };

    // window stays within 10ms around the observed latencies
    for age in [100, 105, 98, 102] {
        assert_eq!(fetch_aged(age), Status::Ok, "latency {}ms", age);
    }
    assert_eq!(fetch_aged(200), Status::JitterViolation);
}

#[test]
fn test_firm_deadline_reported_not_escalated() {
    let core = Core::new(CoreConfig::default()).expect("core");
    let topic = core.create_topic(10, 16, 8).expect("topic");
    let publisher = Publisher::new(Arc::clone(&topic));
    let mut sub = FrtSubscriber::new();
    sub.subscribe(
        &topic,
        note(),
        QosParams::new().deadline(Duration::from_millis(5)),
    )
    .expect("subscribe");

    let stale = Instant::now() - Duration::from_millis(50);
    publisher
        .publish(&[1], Some(stale), PublishPolicy::Determined, None)
        .expect("publish");
    let mut buf = [0u8; 16];
    assert_eq!(
        sub.fetch_next(&mut buf).expect("fetch").status(),
        Status::DeadlineViolation
    );
    assert!(core.status().is_ok());
}

#[test]
fn test_disabled_checks_are_never_evaluated() {
    let config = CoreConfig::default().with_pubsub(urt::QosChecks::none());
    let core = Core::new(config).expect("core");
    let topic = core.create_topic(10, 16, 8).expect("topic");
    let publisher = Publisher::new(Arc::clone(&topic));
    let mut sub = FrtSubscriber::new();
    sub.subscribe(
        &topic,
        note(),
        QosParams::new().deadline(Duration::from_millis(1)),
    )
    .expect("subscribe");

    let stale = Instant::now() - Duration::from_secs(1);
    publisher
        .publish(&[1], Some(stale), PublishPolicy::Determined, None)
        .expect("publish");
    let mut buf = [0u8; 16];
    assert_eq!(sub.fetch_next(&mut buf).expect("fetch").status(), Status::Ok);
}

#[test]
fn test_soft_usefulness_decreases_with_age() {
    let core = Core::new(CoreConfig::default()).expect("core");
    let topic = core.create_topic(10, 16, 8).expect("topic");
    let mut sub = SrtSubscriber::new();
    sub.subscribe(
        &topic,
        note(),
        Some(Arc::new(|lat: Duration| {
            1.0 - lat.as_secs_f32() / 0.1
        })),
    )
    .expect("subscribe");

    assert!(sub.usefulness(Duration::ZERO) > 0.99);
    assert!(sub.usefulness(Duration::from_millis(50)) < 0.51);
    assert!(sub.usefulness(Duration::from_millis(500)).abs() < 1e-6);
}

#[test]
fn test_random_payload_sizes_round_trip() {
    let core = Core::new(CoreConfig::default()).expect("core");
    let topic = core.create_topic(10, 64, 4).expect("topic");
    let publisher = Publisher::new(Arc::clone(&topic));
    let mut sub = NrtSubscriber::new();
    sub.subscribe(&topic, note()).expect("subscribe");

    let mut rng = fastrand::Rng::with_seed(7);
    let mut buf = [0u8; 64];
    for _ in 0..100 {
        let payload: Vec<u8> = (0..rng.usize(0..=64)).map(|_| rng.u8(..)).collect();
        publisher
            .publish(&payload, None, PublishPolicy::Lazy, None)
            .expect("publish");
        match sub.fetch_next(&mut buf).expect("fetch") {
            Fetch::Message { sample, .. } => assert_eq!(&buf[..sample.size], &payload[..]),
            Fetch::NoMessage => panic!("message lost"),
        }
    }
}
