// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # urt - real-time publish-subscribe and RPC middleware
//!
//! In-process middleware for threads ("nodes") exchanging messages through
//! topics and calls through services, with four real-time classes:
//!
//! | Class | Subscriber / request | Violations |
//! |-------|----------------------|------------|
//! | NRT | best effort | none |
//! | SRT | advisory usefulness score | none |
//! | FRT | deadline and jitter checks | returned as status |
//! | HRT | checks plus QoS timers | returned, then panic or recovery |
//!
//! ## Quick Start
//!
//! ```
//! use urt::core::rt::{Notification, Notifier};
//! use urt::pubsub::{NrtSubscriber, PublishPolicy, Publisher};
//! use urt::{Core, CoreConfig, Result};
//!
//! fn main() -> Result<()> {
//!     let core = Core::new(CoreConfig::default())?;
//!     let topic = core.create_topic(1, 64, 8)?;
//!
//!     let mut subscriber = NrtSubscriber::new();
//!     subscriber.subscribe(&topic, Notification::new(Notifier::new(), 0x1))?;
//!
//!     let publisher = Publisher::new(topic);
//!     publisher.publish(b"hello", None, PublishPolicy::Determined, None)?;
//!
//!     let mut buf = [0u8; 64];
//!     let fetch = subscriber.fetch_next(&mut buf)?;
//!     assert_eq!(fetch.sample().map(|s| &buf[..s.size]), Some(&b"hello"[..]));
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                              Nodes                                  |
//! |   NodeTask::setup -> synchronise -> run(events) ... -> shutdown     |
//! +---------------------------------------------------------------------+
//! |          Pub/Sub                 |               RPC                |
//! |  Publisher -> Topic ring ->      |  Request -> Service queue ->     |
//! |  Nrt/Srt/Frt/Hrt Subscriber      |  dispatch -> respond -> retrieve |
//! +---------------------------------------------------------------------+
//! |                               QoS                                   |
//! |  deadline | jitter window | rate | QoS timers | panic-or-recover    |
//! +---------------------------------------------------------------------+
//! |                              Runtime                                |
//! |  events (Notifier/EventSource) | timer thread | status | panic      |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Core`] | Registry of topics, services and nodes; status latch and panic |
//! | [`Topic`] | Message ring shared by publishers and subscribers |
//! | [`Publisher`] | Writes messages into a topic |
//! | [`HrtSubscriber`] | Hard real-time subscriber with QoS timers |
//! | [`Service`] | Three-tier request queue served by one node |
//! | [`Request`] | Client side of a call, any real-time class |
//! | `SyncGroup` | Barrier across nodes (`syncgroups` feature) |
//! | [`Status`] | Outcome codes returned by value |

pub mod config;
pub mod core;
pub mod error;
pub mod pubsub;
pub mod qos;
pub mod rpc;
pub mod status;

pub use crate::config::{CoreConfig, QosChecks};
pub use crate::core::{Core, NodeContext, NodeId, NodeTask, PanicHandler};
#[cfg(feature = "syncgroups")]
pub use crate::core::{SyncGroup, SyncNode};
pub use crate::error::{Error, Result};
pub use crate::pubsub::{
    Fetch, FrtSubscriber, HrtSubscriber, NrtSubscriber, PublishPolicy, Publisher, SrtSubscriber,
    Topic, TopicId,
};
pub use crate::qos::{QosParams, Recovery};
pub use crate::rpc::{Request, RetrievePolicy, Service, ServiceId};
pub use crate::status::{RtClass, Status};
