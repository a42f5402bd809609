// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topics: a lock-protected message ring shared by one or more publishers and
//! any number of subscribers.
//!
//! Besides the ring, a topic keeps the hard real-time subscribers sorted by
//! criticality, a single rate timer armed for the most critical of them, and a
//! condition variable signalled whenever a slot's last hard consumer read it.

use super::message::{Message, MessageRing};
use super::subscriber::hrt::HrtLink;
use crate::config::QosChecks;
use crate::core::rt::{EventSource, Timer};
use crate::core::Runtime;
use crate::status::Status;
use parking_lot::{Condvar, Mutex};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Topic identifier.
pub type TopicId = u32;

/// Snapshot of a topic's profiling counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TopicProfile {
    /// Messages published.
    pub published: u64,
    /// Slots overwritten while some subscriber had not read them.
    pub discarded: u64,
    /// Subscribers currently bound.
    pub subscribers: usize,
    /// Hard real-time subscribers currently bound.
    pub hrt_subscribers: usize,
}

/// Mutable topic state, guarded by the topic lock.
pub(crate) struct TopicState {
    pub(crate) ring: MessageRing,
    /// Hard subscribers, most critical first.
    pub(crate) hrt_links: Vec<Arc<HrtLink>>,
    /// Subscriber the rate timer is armed for.
    pub(crate) rate_target: Option<Arc<HrtLink>>,
    pub(crate) rate_armed: Option<u64>,
    /// Newest origin time published so far.
    pub(crate) latest_information: Option<Instant>,
    pub(crate) profile: TopicProfile,
}

/// Publish-subscribe channel.
pub struct Topic {
    id: TopicId,
    payload_capacity: usize,
    pub(crate) runtime: Arc<Runtime>,
    pub(crate) state: Mutex<TopicState>,
    /// Signalled when a slot's hard consumer count drops to zero.
    pub(crate) hrt_released: Condvar,
    pub(crate) events: EventSource,
    rate_timer: Timer,
}

impl Topic {
    pub(crate) fn new(
        id: TopicId,
        payload_capacity: usize,
        buffer_size: usize,
        runtime: Arc<Runtime>,
    ) -> Arc<Self> {
        let mut ring = MessageRing::new(payload_capacity);
        ring.add(buffer_size.saturating_sub(1));

        Arc::new_cyclic(|weak: &Weak<Topic>| {
            let topic = weak.clone();
            let rate_timer = runtime.timers.timer(move |generation| {
                if let Some(topic) = topic.upgrade() {
                    topic.on_rate_timer(generation);
                }
            });
            Self {
                id,
                payload_capacity,
                runtime,
                state: Mutex::new(TopicState {
                    ring,
                    hrt_links: Vec::new(),
                    rate_target: None,
                    rate_armed: None,
                    latest_information: None,
                    profile: TopicProfile::default(),
                }),
                hrt_released: Condvar::new(),
                events: EventSource::new(),
                rate_timer,
            }
        })
    }

    pub fn id(&self) -> TopicId {
        self.id
    }

    /// Maximum payload size in bytes.
    pub fn payload_capacity(&self) -> usize {
        self.payload_capacity
    }

    /// Number of message slots.
    pub fn buffer_size(&self) -> usize {
        self.state.lock().ring.len()
    }

    /// Add `count` slots. They are the next ones to be written.
    pub fn add_messages(&self, count: usize) {
        self.state.lock().ring.add(count);
        log::debug!("[Topic::add_messages] Topic {} +{} slots", self.id, count);
    }

    pub fn profile(&self) -> TopicProfile {
        self.state.lock().profile
    }

    /// Sum of unread-consumer counts over all slots.
    pub fn outstanding_consumers(&self) -> usize {
        self.state
            .lock()
            .ring
            .iter()
            .filter(|m| m.is_valid())
            .map(|m| m.consumers_left)
            .sum()
    }

    /// Sum of unread hard-consumer counts over all slots.
    pub fn outstanding_hrt_consumers(&self) -> usize {
        self.state
            .lock()
            .ring
            .iter()
            .map(|m| m.hrt_consumers_left)
            .sum()
    }

    /// Number of writes per slot, in arena order.
    pub fn slot_utilizations(&self) -> Vec<u64> {
        self.state.lock().ring.iter().map(|m| m.utilizations).collect()
    }

    pub(crate) fn checks(&self) -> QosChecks {
        self.runtime.config.pubsub
    }

    // -- Publishing (called with the lock held) -----------------------------

    /// Write `payload` into the next slot and make it the latest message.
    pub(crate) fn publish_locked(&self, state: &mut TopicState, payload: &[u8], origin: Instant) {
        let checks = self.checks();

        if state.latest_information.map_or(true, |info| origin >= info) {
            state.latest_information = Some(origin);
            if checks.rate {
                if let Some(head) = state.hrt_links.first() {
                    if !head.params.rate.is_zero() {
                        let generation = self.rate_timer.set_at(origin + head.params.rate);
                        state.rate_target = Some(Arc::clone(head));
                        state.rate_armed = Some(generation);
                    }
                }
            }
        }

        let subscribers = state.profile.subscribers;
        let num_hrt = state.hrt_links.len();
        let latest = state.ring.latest();
        let id = MessageRing::next_id(state.ring.get(latest).id);
        let index = state.ring.next(latest);
        {
            let message: &mut Message = state.ring.get_mut(index);
            message.id = id;
            message.time = origin;
            message.payload[..payload.len()].copy_from_slice(payload);
            message.size = payload.len();
            message.hrt_consumers_left = num_hrt;
            message.utilizations += 1;
            if message.consumers_left > 0 {
                state.profile.discarded += 1;
            }
            message.consumers_left = subscribers;
        }
        state.ring.set_latest(index);

        if checks.any_latency() {
            for link in &state.hrt_links {
                let mut qos = link.qos.lock();
                let delay = checks.critical_delay(link.params.deadline, link.params.jitter, &qos.window);
                let armed_later = match qos.timer_message {
                    None => true,
                    Some(critical) => state.ring.get(critical).time > origin,
                };
                if !delay.is_zero() && armed_later {
                    qos.armed = Some(link.timer.set_at(origin + delay));
                    qos.timer_message = Some(index);
                }
            }
        }

        state.profile.published += 1;
    }

    // -- Hard real-time subscriber list ---------------------------------------

    /// Sort key of a hard subscriber. Subscribers without a rate go last.
    fn criticality(&self, link: &HrtLink) -> (bool, Duration) {
        let checks = self.checks();
        if checks.rate {
            (link.params.rate.is_zero(), link.params.rate)
        } else if checks.deadline {
            (false, link.params.deadline)
        } else {
            (false, link.params.jitter)
        }
    }

    /// Insert after every subscriber at least as critical.
    pub(crate) fn insert_hrt_locked(&self, state: &mut TopicState, link: Arc<HrtLink>) {
        let key = self.criticality(&link);
        let position = state
            .hrt_links
            .iter()
            .position(|other| self.criticality(other) > key)
            .unwrap_or(state.hrt_links.len());
        state.hrt_links.insert(position, link);
    }

    /// Remove `link`, moving the rate timer to the new head if needed.
    pub(crate) fn remove_hrt_locked(&self, state: &mut TopicState, link: &Arc<HrtLink>) {
        let Some(position) = state.hrt_links.iter().position(|l| Arc::ptr_eq(l, link)) else {
            return;
        };
        state.hrt_links.remove(position);
        let was_target = state
            .rate_target
            .as_ref()
            .is_some_and(|target| Arc::ptr_eq(target, link));
        if position != 0 && !was_target {
            return;
        }

        match (state.hrt_links.first(), state.latest_information) {
            (Some(head), Some(info)) if self.checks().rate && !head.params.rate.is_zero() => {
                state.rate_armed = Some(self.rate_timer.set_at(info + head.params.rate));
                state.rate_target = Some(Arc::clone(head));
            }
            _ => {
                self.rate_timer.reset();
                state.rate_armed = None;
                state.rate_target = None;
            }
        }
    }

    /// Rate timer expiry: move on to the next subscriber, escalate the lapsed one.
    fn on_rate_timer(&self, generation: u64) {
        let escalation = {
            let mut state = self.state.lock();
            if state.rate_armed != Some(generation) {
                return;
            }
            state.rate_armed = None;
            let Some(lapsed) = state.rate_target.take() else {
                return;
            };

            let next = state
                .hrt_links
                .iter()
                .position(|l| Arc::ptr_eq(l, &lapsed))
                .and_then(|p| state.hrt_links.get(p + 1))
                .cloned();
            if let (Some(next), Some(info)) = (next, state.latest_information) {
                if !next.params.rate.is_zero() {
                    state.rate_armed = Some(self.rate_timer.set_at(info + next.params.rate));
                    state.rate_target = Some(next);
                }
            }

            log::warn!("[Topic::rate] Topic {}: rate violation", self.id);
            lapsed.recovery.escalate(&lapsed.latch, Status::RateViolation)
        };

        if let Some(escalation) = escalation {
            escalation.dispatch(&self.runtime);
        }
    }
}

impl std::fmt::Debug for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topic")
            .field("id", &self.id)
            .field("payload_capacity", &self.payload_capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::CoreConfig;
    use crate::core::Core;

    #[test]
    fn test_buffer_size_includes_mandatory_slot() {
        let core = Core::new(CoreConfig::default()).expect("core");
        let topic = core.create_topic(1, 8, 4).expect("topic");
        assert_eq!(topic.buffer_size(), 4);
        let single = core.create_topic(2, 8, 0).expect("topic");
        assert_eq!(single.buffer_size(), 1);
    }

    #[test]
    fn test_add_messages_grows_ring() {
        let core = Core::new(CoreConfig::default()).expect("core");
        let topic = core.create_topic(1, 8, 2).expect("topic");
        topic.add_messages(3);
        assert_eq!(topic.buffer_size(), 5);
        assert_eq!(topic.slot_utilizations(), vec![0; 5]);
    }

    #[test]
    fn test_publish_locked_advances_latest() {
        let core = Core::new(CoreConfig::default()).expect("core");
        let topic = core.create_topic(1, 4, 3).expect("topic");
        let now = std::time::Instant::now();
        {
            let mut state = topic.state.lock();
            topic.publish_locked(&mut state, &[1, 2], now);
            let latest = state.ring.latest();
            assert_eq!(state.ring.get(latest).id, 1);
            assert_eq!(state.ring.get(latest).data(), &[1, 2]);
            topic.publish_locked(&mut state, &[3], now);
            let latest = state.ring.latest();
            assert_eq!(state.ring.get(latest).id, 2);
        }
        assert_eq!(topic.profile().published, 2);
        assert_eq!(topic.profile().discarded, 0);
    }
}
