// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publish-subscribe.
//!
//! A [`Topic`] holds a ring of message slots. [`Publisher`]s overwrite the
//! oldest slot, subscribers of the four real-time classes read them in ring
//! order and are woken through the topic's event source.

pub(crate) mod message;
pub mod publisher;
pub mod subscriber;
pub mod topic;

pub use publisher::{PublishPolicy, Publisher};
pub use subscriber::{
    Fetch, FrtSubscriber, HrtSubscriber, NrtSubscriber, Sample, SrtSubscriber, Subscriber,
    SubscriberBase, SubscriberProfile, UsefulnessFn,
};
pub use topic::{Topic, TopicId, TopicProfile};
