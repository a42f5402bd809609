// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publishers write messages into a topic's ring.
//!
//! The slot after the latest message is overwritten. When hard real-time
//! subscribers still owe a read on it, the [`PublishPolicy`] decides whether
//! the publish fails or waits for them.

use super::topic::Topic;
use crate::error::{Error, Result};
use crate::status::Status;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How a publish treats contention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishPolicy {
    /// Try-lock the topic; fail if it is locked or the slot is still owed.
    Lazy,
    /// Lock the topic; fail if the slot is still owed to hard consumers.
    #[default]
    Determined,
    /// Lock the topic and wait until hard consumers released the slot.
    Enforcing,
}

/// Publisher bound to one topic.
#[derive(Debug)]
pub struct Publisher {
    topic: Arc<Topic>,
    attempts: AtomicU64,
    fails: AtomicU64,
}

impl Publisher {
    pub fn new(topic: Arc<Topic>) -> Self {
        Self {
            topic,
            attempts: AtomicU64::new(0),
            fails: AtomicU64::new(0),
        }
    }

    pub fn topic(&self) -> &Arc<Topic> {
        &self.topic
    }

    /// Publish `payload`.
    ///
    /// `origin` is the time the information was created (now if `None`).
    /// `timeout` bounds the wait of [`PublishPolicy::Enforcing`].
    ///
    /// # Returns
    /// - `Status::Ok` on success
    /// - `Status::PublishLocked` for a contended lazy publish
    /// - `Status::PublishBlocked` when hard consumers still hold the slot
    /// - `Status::PublishTimeout` when an enforcing publish timed out
    pub fn publish(
        &self,
        payload: &[u8],
        origin: Option<Instant>,
        policy: PublishPolicy,
        timeout: Option<Duration>,
    ) -> Result<Status> {
        if payload.len() > self.topic.payload_capacity() {
            return Err(Error::PayloadTooLarge {
                size: payload.len(),
                capacity: self.topic.payload_capacity(),
            });
        }
        self.attempts.fetch_add(1, Ordering::Relaxed);

        let mut state = match policy {
            PublishPolicy::Lazy => match self.topic.state.try_lock() {
                Some(state) => state,
                None => return Ok(self.fail(Status::PublishLocked)),
            },
            PublishPolicy::Determined | PublishPolicy::Enforcing => self.topic.state.lock(),
        };

        let mut index = state.ring.oldest();
        let mut id = state.ring.get(index).id;
        if state.ring.get(index).hrt_consumers_left > 0 {
            if policy != PublishPolicy::Enforcing {
                return Ok(self.fail(Status::PublishBlocked));
            }
            let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
            while state.ring.get(index).hrt_consumers_left > 0 {
                match deadline {
                    Some(deadline) => {
                        if self.topic.hrt_released.wait_until(&mut state, deadline).timed_out()
                            && state.ring.get(index).hrt_consumers_left > 0
                        {
                            drop(state);
                            return Ok(self.fail(Status::PublishTimeout));
                        }
                    }
                    None => self.topic.hrt_released.wait(&mut state),
                }
                // Another publisher used the slot meanwhile.
                if state.ring.get(index).id != id {
                    index = state.ring.oldest();
                    id = state.ring.get(index).id;
                }
            }
        }

        let origin = origin.unwrap_or_else(Instant::now);
        self.topic.publish_locked(&mut state, payload, origin);
        drop(state);

        self.topic.events.broadcast(0);
        Ok(Status::Ok)
    }

    fn fail(&self, status: Status) -> Status {
        self.fails.fetch_add(1, Ordering::Relaxed);
        log::debug!("[Publisher::publish] Topic {}: {}", self.topic.id(), status);
        status
    }

    /// Publish attempts so far.
    pub fn publish_attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Failed publish attempts so far.
    pub fn publish_fails(&self) -> u64 {
        self.fails.load(Ordering::Relaxed)
    }
}
