// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Subscribers of the four real-time classes.
//!
//! | Class | Type | On a late message |
//! |-------|------|-------------------|
//! | NRT | [`NrtSubscriber`] | nothing |
//! | SRT | [`SrtSubscriber`] | advisory usefulness score |
//! | FRT | [`FrtSubscriber`] | violation status returned |
//! | HRT | [`HrtSubscriber`] | status returned, panic or recovery dispatched |
//!
//! All share [`SubscriberBase`]: the bound topic, the event listener and the
//! `(slot, id)` of the last message read. `fetch_next` returns the oldest
//! unread message, `fetch_latest` skips to the newest while still releasing
//! every message it skipped.

pub mod frt;
pub mod hrt;
pub mod nrt;

pub use frt::FrtSubscriber;
pub use hrt::HrtSubscriber;
pub use nrt::{NrtSubscriber, SrtSubscriber, UsefulnessFn};

use super::topic::{Topic, TopicState};
use crate::config::MESSAGE_ID_INVALID;
use crate::core::rt::{EventListener, Notification};
use crate::error::{Error, Result};
use crate::status::{RtClass, Status};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Metadata of a fetched message. The payload is copied to the caller's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    /// Payload size in bytes.
    pub size: usize,
    /// Origin time stamped by the publisher.
    pub origin: Instant,
    /// Age of the message when it was fetched.
    pub latency: Duration,
}

/// Result of a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetch {
    /// Nothing new since the last fetch.
    NoMessage,
    /// A message was copied; `status` carries any QoS violation.
    Message { status: Status, sample: Sample },
}

impl Fetch {
    pub fn status(&self) -> Status {
        match self {
            Fetch::NoMessage => Status::FetchNoMessage,
            Fetch::Message { status, .. } => *status,
        }
    }

    pub fn sample(&self) -> Option<&Sample> {
        match self {
            Fetch::NoMessage => None,
            Fetch::Message { sample, .. } => Some(sample),
        }
    }

    pub fn is_message(&self) -> bool {
        matches!(self, Fetch::Message { .. })
    }
}

/// Latency statistics of a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberProfile {
    pub min_latency: Duration,
    pub max_latency: Duration,
    pub sum_latency: Duration,
    pub received: u64,
}

impl Default for SubscriberProfile {
    fn default() -> Self {
        Self {
            min_latency: Duration::MAX,
            max_latency: Duration::ZERO,
            sum_latency: Duration::ZERO,
            received: 0,
        }
    }
}

impl SubscriberProfile {
    fn track(&mut self, latency: Duration) {
        self.min_latency = self.min_latency.min(latency);
        self.max_latency = self.max_latency.max(latency);
        self.sum_latency = self.sum_latency.saturating_add(latency);
    }

    /// Mean latency over received messages.
    pub fn mean_latency(&self) -> Option<Duration> {
        u32::try_from(self.received)
            .ok()
            .filter(|n| *n > 0)
            .map(|n| self.sum_latency / n)
    }
}

/// State common to every subscriber class.
#[derive(Debug, Default)]
pub struct SubscriberBase {
    topic: Option<Arc<Topic>>,
    listener: EventListener,
    last: usize,
    last_id: u64,
    profile: SubscriberProfile,
}

impl SubscriberBase {
    pub fn topic(&self) -> Option<&Arc<Topic>> {
        self.topic.as_ref()
    }

    pub fn is_subscribed(&self) -> bool {
        self.topic.is_some()
    }

    pub fn listener(&self) -> &EventListener {
        &self.listener
    }

    pub fn profile(&self) -> &SubscriberProfile {
        &self.profile
    }

    /// Slot of the last message read.
    pub(crate) fn last_index(&self) -> usize {
        self.last
    }

    pub(crate) fn bound_topic(&self) -> Result<Arc<Topic>> {
        self.topic.clone().ok_or(Error::NotSubscribed)
    }

    /// Bind to `topic` with the topic lock held; only future messages are seen.
    pub(crate) fn bind_locked(
        &mut self,
        topic: &Arc<Topic>,
        state: &mut TopicState,
        notification: Notification,
    ) -> Result<()> {
        if self.topic.is_some() {
            return Err(Error::AlreadySubscribed);
        }
        if notification.mask() == 0 {
            return Err(Error::InvalidEventMask);
        }
        self.last = state.ring.latest();
        self.last_id = state.ring.get(self.last).id;
        self.topic = Some(Arc::clone(topic));
        topic.events.register(&self.listener, notification);
        state.profile.subscribers += 1;
        Ok(())
    }

    /// Subscribe without class-specific state.
    pub(crate) fn subscribe(&mut self, topic: &Arc<Topic>, notification: Notification) -> Result<()> {
        let mut state = topic.state.lock();
        self.bind_locked(topic, &mut state, notification)
    }

    /// Slot after the last one read, or the oldest one if it was overwritten.
    fn first_unread(&self, state: &TopicState) -> usize {
        let ring = &state.ring;
        if ring.get(self.last).id == self.last_id {
            ring.next(self.last)
        } else {
            let mut index = ring.oldest();
            while !ring.get(index).is_valid() && index != ring.latest() {
                index = ring.next(index);
            }
            index
        }
    }

    fn has_unread(&self, state: &TopicState) -> bool {
        let latest = state.ring.get(state.ring.latest());
        latest.is_valid() && latest.id != self.last_id
    }

    fn copy_out(state: &TopicState, index: usize, buf: &mut [u8]) -> Result<Sample> {
        let message = state.ring.get(index);
        if buf.len() < message.size {
            return Err(Error::BufferTooSmall {
                required: message.size,
                available: buf.len(),
            });
        }
        buf[..message.size].copy_from_slice(message.data());
        Ok(Sample {
            size: message.size,
            origin: message.time,
            latency: Instant::now().saturating_duration_since(message.time),
        })
    }

    /// Check the buffer, then copy the message at `index` and mark it read.
    pub(crate) fn take_locked(
        &mut self,
        state: &mut TopicState,
        index: usize,
        buf: &mut [u8],
    ) -> Result<Sample> {
        let sample = Self::copy_out(state, index, buf)?;
        let message = state.ring.get_mut(index);
        message.consumers_left = message.consumers_left.saturating_sub(1);
        self.last = index;
        self.last_id = message.id;
        self.profile.received += 1;
        self.profile.track(sample.latency);
        Ok(sample)
    }

    /// Oldest unread message, if any.
    pub(crate) fn fetch_next_locked(
        &mut self,
        state: &mut TopicState,
        buf: &mut [u8],
    ) -> Result<Option<Sample>> {
        if !self.has_unread(state) {
            return Ok(None);
        }
        let index = self.first_unread(state);
        self.take_locked(state, index, buf).map(Some)
    }

    /// Latest message, releasing every unread one before it.
    pub(crate) fn fetch_latest_locked(
        &mut self,
        state: &mut TopicState,
        buf: &mut [u8],
    ) -> Result<Option<Sample>> {
        if !self.has_unread(state) {
            return Ok(None);
        }
        let latest = state.ring.latest();
        let sample = Self::copy_out(state, latest, buf)?;
        for index in state.ring.pending_from(self.first_unread(state)) {
            let message = state.ring.get_mut(index);
            if message.is_valid() {
                message.consumers_left = message.consumers_left.saturating_sub(1);
                self.profile.received += 1;
            }
        }
        self.last = latest;
        self.last_id = state.ring.get(latest).id;
        self.profile.track(sample.latency);
        Ok(Some(sample))
    }

    /// Slots still unread, in ring order.
    pub(crate) fn unread_locked(&self, state: &TopicState) -> Vec<usize> {
        if self.has_unread(state) {
            state.ring.pending_from(self.first_unread(state))
        } else {
            Vec::new()
        }
    }

    /// Release every unread message and drop the topic binding.
    pub(crate) fn unbind_locked(&mut self, topic: &Topic, state: &mut TopicState) {
        topic.events.unregister(&self.listener);
        for index in self.unread_locked(state) {
            let message = state.ring.get_mut(index);
            message.consumers_left = message.consumers_left.saturating_sub(1);
        }
        state.profile.subscribers = state.profile.subscribers.saturating_sub(1);
        self.topic = None;
        self.last = 0;
        self.last_id = MESSAGE_ID_INVALID;
    }

    pub(crate) fn fetch_next(&mut self, buf: &mut [u8]) -> Result<Option<Sample>> {
        let topic = self.bound_topic()?;
        let mut state = topic.state.lock();
        self.fetch_next_locked(&mut state, buf)
    }

    pub(crate) fn fetch_latest(&mut self, buf: &mut [u8]) -> Result<Option<Sample>> {
        let topic = self.bound_topic()?;
        let mut state = topic.state.lock();
        self.fetch_latest_locked(&mut state, buf)
    }

    pub(crate) fn unsubscribe(&mut self) -> Result<()> {
        let topic = self.bound_topic()?;
        let mut state = topic.state.lock();
        self.unbind_locked(&topic, &mut state);
        Ok(())
    }
}

impl Drop for SubscriberBase {
    fn drop(&mut self) {
        if self.topic.is_some() {
            let _ = self.unsubscribe();
        }
    }
}

/// Subscriber of any class.
#[derive(Debug)]
pub enum Subscriber {
    Nrt(NrtSubscriber),
    Srt(SrtSubscriber),
    Frt(FrtSubscriber),
    Hrt(HrtSubscriber),
}

impl Subscriber {
    pub fn rt_class(&self) -> RtClass {
        match self {
            Subscriber::Nrt(_) => RtClass::Nrt,
            Subscriber::Srt(_) => RtClass::Srt,
            Subscriber::Frt(_) => RtClass::Frt,
            Subscriber::Hrt(_) => RtClass::Hrt,
        }
    }

    pub fn base(&self) -> &SubscriberBase {
        match self {
            Subscriber::Nrt(s) => s.base(),
            Subscriber::Srt(s) => s.base(),
            Subscriber::Frt(s) => s.base(),
            Subscriber::Hrt(s) => s.base(),
        }
    }

    pub fn fetch_next(&mut self, buf: &mut [u8]) -> Result<Fetch> {
        match self {
            Subscriber::Nrt(s) => s.fetch_next(buf),
            Subscriber::Srt(s) => s.fetch_next(buf),
            Subscriber::Frt(s) => s.fetch_next(buf),
            Subscriber::Hrt(s) => s.fetch_next(buf),
        }
    }

    pub fn fetch_latest(&mut self, buf: &mut [u8]) -> Result<Fetch> {
        match self {
            Subscriber::Nrt(s) => s.fetch_latest(buf),
            Subscriber::Srt(s) => s.fetch_latest(buf),
            Subscriber::Frt(s) => s.fetch_latest(buf),
            Subscriber::Hrt(s) => s.fetch_latest(buf),
        }
    }

    pub fn unsubscribe(&mut self) -> Result<()> {
        match self {
            Subscriber::Nrt(s) => s.unsubscribe(),
            Subscriber::Srt(s) => s.unsubscribe(),
            Subscriber::Frt(s) => s.unsubscribe(),
            Subscriber::Hrt(s) => s.unsubscribe(),
        }
    }
}

impl From<NrtSubscriber> for Subscriber {
    fn from(s: NrtSubscriber) -> Self {
        Subscriber::Nrt(s)
    }
}

impl From<SrtSubscriber> for Subscriber {
    fn from(s: SrtSubscriber) -> Self {
        Subscriber::Srt(s)
    }
}

impl From<FrtSubscriber> for Subscriber {
    fn from(s: FrtSubscriber) -> Self {
        Subscriber::Frt(s)
    }
}

impl From<HrtSubscriber> for Subscriber {
    fn from(s: HrtSubscriber) -> Self {
        Subscriber::Hrt(s)
    }
}

/// Wrap an optional sample with a status.
pub(crate) fn fetched(sample: Option<Sample>, status: Status) -> Fetch {
    match sample {
        Some(sample) => Fetch::Message { status, sample },
        None => Fetch::NoMessage,
    }
}
