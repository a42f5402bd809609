// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Best-effort and soft real-time subscribers. Neither reports violations.

use super::{fetched, Fetch, SubscriberBase};
use crate::core::rt::Notification;
use crate::error::Result;
use crate::pubsub::topic::Topic;
use crate::status::{RtClass, Status};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Non real-time subscriber.
#[derive(Debug, Default)]
pub struct NrtSubscriber {
    base: SubscriberBase,
}

impl NrtSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rt_class(&self) -> RtClass {
        RtClass::Nrt
    }

    pub fn base(&self) -> &SubscriberBase {
        &self.base
    }

    pub fn subscribe(&mut self, topic: &Arc<Topic>, notification: Notification) -> Result<()> {
        self.base.subscribe(topic, notification)
    }

    pub fn fetch_next(&mut self, buf: &mut [u8]) -> Result<Fetch> {
        Ok(fetched(self.base.fetch_next(buf)?, Status::Ok))
    }

    pub fn fetch_latest(&mut self, buf: &mut [u8]) -> Result<Fetch> {
        Ok(fetched(self.base.fetch_latest(buf)?, Status::Ok))
    }

    pub fn unsubscribe(&mut self) -> Result<()> {
        self.base.unsubscribe()
    }
}

/// Maps a latency to a usefulness score in `[0, 1]`.
pub type UsefulnessFn = Arc<dyn Fn(Duration) -> f32 + Send + Sync>;

/// Soft real-time subscriber with an advisory usefulness score.
#[derive(Default)]
pub struct SrtSubscriber {
    base: SubscriberBase,
    usefulness: Option<UsefulnessFn>,
}

impl fmt::Debug for SrtSubscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SrtSubscriber")
            .field("base", &self.base)
            .field("usefulness", &self.usefulness.is_some())
            .finish()
    }
}

impl SrtSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rt_class(&self) -> RtClass {
        RtClass::Srt
    }

    pub fn base(&self) -> &SubscriberBase {
        &self.base
    }

    /// Subscribe, optionally with a usefulness function.
    pub fn subscribe(
        &mut self,
        topic: &Arc<Topic>,
        notification: Notification,
        usefulness: Option<UsefulnessFn>,
    ) -> Result<()> {
        self.base.subscribe(topic, notification)?;
        self.usefulness = usefulness;
        Ok(())
    }

    pub fn fetch_next(&mut self, buf: &mut [u8]) -> Result<Fetch> {
        Ok(fetched(self.base.fetch_next(buf)?, Status::Ok))
    }

    pub fn fetch_latest(&mut self, buf: &mut [u8]) -> Result<Fetch> {
        Ok(fetched(self.base.fetch_latest(buf)?, Status::Ok))
    }

    /// Usefulness of data of age `latency`, 0 without a function.
    pub fn usefulness(&self, latency: Duration) -> f32 {
        match &self.usefulness {
            Some(f) => {
                let score = f(latency);
                if score.is_nan() {
                    0.0
                } else {
                    score.clamp(0.0, 1.0)
                }
            }
            None => 0.0,
        }
    }

    pub fn unsubscribe(&mut self) -> Result<()> {
        self.base.unsubscribe()?;
        self.usefulness = None;
        Ok(())
    }
}
