// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests/examples panic on failure

//! Hard real-time escalation tests
//!
//! QoS timers of hard subscribers and requests, recovery latches and the
//! core panic path.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use urt::core::rt::{Notification, Notifier};
use urt::core::RecordingPanicHandler;
use urt::pubsub::{HrtSubscriber, PublishPolicy, Publisher};
use urt::qos::{QosParams, Recovery};
use urt::{Core, CoreConfig, Request, RetrievePolicy, Status};

fn core_with_recorder() -> (Arc<Core>, Arc<RecordingPanicHandler>) {
    let core = Core::new(CoreConfig::default()).expect("core");
    let recorder = Arc::new(RecordingPanicHandler::new());
    core.set_panic_handler(Arc::clone(&recorder));
    (core, recorder)
}

fn note() -> Notification {
    Notification::new(Notifier::new(), 0x1)
}

fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(2) {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    done()
}

#[test]
fn test_unread_message_fires_deadline_timer() {
    let (core, recorder) = core_with_recorder();
    let topic = core.create_topic(1, 8, 4).expect("topic");
    let mut sub = HrtSubscriber::new();
    sub.subscribe(
        &topic,
        note(),
        QosParams::new().deadline(Duration::from_millis(10)),
        Recovery::panic(),
    )
    .expect("subscribe");

    Publisher::new(Arc::clone(&topic))
        .publish(&[1], None, PublishPolicy::Determined, None)
        .expect("publish");

    assert!(wait_until(|| recorder.count() > 0));
    assert_eq!(recorder.reasons(), vec![Status::DeadlineViolation]);
    assert_eq!(core.status(), Status::DeadlineViolation);
}

#[test]
fn test_recovery_callback_fires_once_per_latch() {
    let (core, recorder) = core_with_recorder();
    let topic = core.create_topic(1, 8, 4).expect("topic");
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut sub = HrtSubscriber::new();
    sub.subscribe(
        &topic,
        note(),
        QosParams::new().deadline(Duration::from_millis(5)),
        Recovery::with_callback(move |violation| {
            assert_eq!(violation.reason(), Status::DeadlineViolation);
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .expect("subscribe");

    let publisher = Publisher::new(Arc::clone(&topic));
    let stale = Instant::now() - Duration::from_millis(50);
    publisher
        .publish(&[1], Some(stale), PublishPolicy::Determined, None)
        .expect("publish");
    publisher
        .publish(&[2], Some(stale), PublishPolicy::Determined, None)
        .expect("publish");

    let mut buf = [0u8; 8];
    assert_eq!(
        sub.fetch_next(&mut buf).expect("fetch").status(),
        Status::DeadlineViolation
    );
    // latched: the second violation does not call back again
    assert_eq!(
        sub.fetch_next(&mut buf).expect("fetch").status(),
        Status::DeadlineViolation
    );
    assert!(wait_until(|| calls.load(Ordering::SeqCst) >= 1));
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(sub.violation(), Status::DeadlineViolation);

    sub.clear_violation();
    assert_eq!(sub.violation(), Status::Ok);
    publisher
        .publish(&[3], Some(stale), PublishPolicy::Determined, None)
        .expect("publish");
    sub.fetch_next(&mut buf).expect("fetch");
    assert!(wait_until(|| calls.load(Ordering::SeqCst) == 2));

    assert_eq!(recorder.count(), 0);
    assert!(core.status().is_ok());
}

#[test]
fn test_hard_request_recovers_and_rearms() {
    let (core, recorder) = core_with_recorder();
    let service = core
        .create_service(3, Notification::new(Notifier::new(), 0x1))
        .expect("service");
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let request = Request::hrt(
        8,
        Duration::ZERO,
        Recovery::with_callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    let submit = || {
        request
            .acquire()
            .expect("acquire")
            .submit(&service, &[1], None, Duration::from_millis(5))
            .expect("submit");
    };

    submit();
    assert!(wait_until(|| calls.load(Ordering::SeqCst) == 1));
    assert_eq!(request.violation(), Status::DeadlineViolation);

    // take it back, then a second overrun stays silent until cleared
    let mut buf = [0u8; 8];
    let retrieved = request
        .retrieve(RetrievePolicy::Enforcing, &mut buf)
        .expect("retrieve");
    assert_eq!(retrieved.status, Status::RequestBadOwner);
    submit();
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    request.clear_violation();
    request
        .retrieve(RetrievePolicy::Enforcing, &mut buf)
        .expect("retrieve");
    submit();
    assert!(wait_until(|| calls.load(Ordering::SeqCst) == 2));
    assert_eq!(recorder.count(), 0);
}

#[test]
fn test_missing_publication_is_rate_violation() {
    let (core, recorder) = core_with_recorder();
    let topic = core.create_topic(1, 8, 4).expect("topic");
    let mut sub = HrtSubscriber::new();
    sub.subscribe(
        &topic,
        note(),
        QosParams::new().rate(Duration::from_millis(10)),
        Recovery::panic(),
    )
    .expect("subscribe");

    let publisher = Publisher::new(Arc::clone(&topic));
    publisher
        .publish(&[1], None, PublishPolicy::Determined, None)
        .expect("publish");
    let mut buf = [0u8; 8];
    assert!(sub.fetch_next(&mut buf).expect("fetch").is_message());

    assert!(wait_until(|| recorder.count() > 0));
    assert_eq!(recorder.reasons(), vec![Status::RateViolation]);
}

#[test]
fn test_hard_request_timer_escalates_late_response() {
    let (core, recorder) = core_with_recorder();
    let service = core
        .create_service(3, Notification::new(Notifier::new(), 0x1))
        .expect("service");
    let request = Request::hrt(8, Duration::ZERO, Recovery::panic());
    request
        .acquire()
        .expect("acquire")
        .submit(&service, &[1], None, Duration::from_millis(10))
        .expect("submit");

    assert!(wait_until(|| recorder.count() > 0));
    assert_eq!(recorder.reasons(), vec![Status::DeadlineViolation]);
    assert_eq!(core.status(), Status::DeadlineViolation);
}

#[test]
fn test_hard_request_answered_in_time_stays_quiet() {
    let (core, recorder) = core_with_recorder();
    let service = core
        .create_service(3, Notification::new(Notifier::new(), 0x1))
        .expect("service");
    let request = Request::hrt(8, Duration::ZERO, Recovery::panic());
    request
        .acquire()
        .expect("acquire")
        .submit(&service, &[1], Some(note()), Duration::from_millis(200))
        .expect("submit");

    let mut buf = [0u8; 8];
    let d = service.dispatch(&mut buf).expect("dispatch").expect("queued");
    service
        .acquire_request(&d)
        .expect("owned")
        .respond(&[2])
        .expect("respond");
    let retrieved = request
        .retrieve(RetrievePolicy::Blocking, &mut buf)
        .expect("retrieve");
    assert_eq!(retrieved.status, Status::Ok);

    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(recorder.count(), 0);
    assert!(core.status().is_ok());
}

#[test]
fn test_hard_retrieve_without_answer_never_escalates() {
    let (core, recorder) = core_with_recorder();
    let service = core
        .create_service(3, Notification::new(Notifier::new(), 0x1))
        .expect("service");
    let request = Request::hrt(8, Duration::from_millis(1), Recovery::panic());
    let mut buf = [0u8; 8];

    // nothing submitted yet
    let retrieved = request
        .retrieve(RetrievePolicy::Blocking, &mut buf)
        .expect("retrieve");
    assert_eq!((retrieved.status, retrieved.latency), (Status::Ok, Duration::ZERO));
    assert!(!request.window().is_seeded());

    request
        .acquire()
        .expect("acquire")
        .submit(&service, &[1], Some(note()), Duration::from_millis(500))
        .expect("submit");
    std::thread::sleep(Duration::from_millis(5));
    let d = service.dispatch(&mut buf).expect("dispatch").expect("queued");
    service
        .acquire_request(&d)
        .expect("owned")
        .respond(&[2])
        .expect("respond");
    let answered = request
        .retrieve(RetrievePolicy::Blocking, &mut buf)
        .expect("retrieve");
    assert_eq!(answered.status, Status::Ok);

    // reading the same answer again later is not a new sample
    std::thread::sleep(Duration::from_millis(20));
    let again = request
        .retrieve(RetrievePolicy::Blocking, &mut buf)
        .expect("retrieve");
    assert_eq!((again.status, buf[0]), (Status::Ok, 2));
    assert_eq!(
        request.window().bounds(),
        Some((answered.latency, answered.latency))
    );

    assert_eq!(request.violation(), Status::Ok);
    assert_eq!(recorder.count(), 0);
    assert!(core.status().is_ok());
}

#[test]
fn test_core_panic_latches_first_reason() {
    let (core, recorder) = core_with_recorder();
    core.panic(Status::JitterViolation);
    core.panic(Status::DeadlineViolation);
    assert_eq!(core.status(), Status::JitterViolation);
    assert_eq!(recorder.reasons().first(), Some(&Status::JitterViolation));
}
