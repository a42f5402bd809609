// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Firm real-time subscriber: violations are reported, never escalated.

use super::{fetched, Fetch, SubscriberBase};
use crate::core::rt::Notification;
use crate::error::Result;
use crate::pubsub::topic::Topic;
use crate::qos::{LatencyWindow, QosParams};
use crate::status::{RtClass, Status};
use std::sync::Arc;
use std::time::Duration;

/// Firm real-time subscriber with deadline and jitter checks.
///
/// The rate field of its [`QosParams`] is ignored.
#[derive(Debug, Default)]
pub struct FrtSubscriber {
    base: SubscriberBase,
    params: QosParams,
    window: LatencyWindow,
}

impl FrtSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rt_class(&self) -> RtClass {
        RtClass::Frt
    }

    pub fn base(&self) -> &SubscriberBase {
        &self.base
    }

    pub fn params(&self) -> &QosParams {
        &self.params
    }

    pub fn window(&self) -> &LatencyWindow {
        &self.window
    }

    /// Subscribe with `deadline` and `jitter` bounds (zero disables each).
    pub fn subscribe(
        &mut self,
        topic: &Arc<Topic>,
        notification: Notification,
        params: QosParams,
    ) -> Result<()> {
        self.base.subscribe(topic, notification)?;
        self.params = params;
        self.window.reset();
        Ok(())
    }

    pub fn fetch_next(&mut self, buf: &mut [u8]) -> Result<Fetch> {
        let sample = self.base.fetch_next(buf)?;
        Ok(self.checked(sample))
    }

    pub fn fetch_latest(&mut self, buf: &mut [u8]) -> Result<Fetch> {
        let sample = self.base.fetch_latest(buf)?;
        Ok(self.checked(sample))
    }

    fn checked(&mut self, sample: Option<super::Sample>) -> Fetch {
        let status = match (&sample, self.base.topic()) {
            (Some(sample), Some(topic)) => topic.checks().check_latency(
                sample.latency,
                self.params.deadline,
                self.params.jitter,
                &mut self.window,
            ),
            _ => Status::Ok,
        };
        if status.is_violation() {
            log::debug!("[FrtSubscriber::fetch] {}", status);
        }
        fetched(sample, status)
    }

    /// Whether data of age `latency` would pass the checks, without tracking it.
    pub fn calculate_validity(&self, latency: Duration) -> bool {
        match self.base.topic() {
            Some(topic) => topic.checks().is_valid(
                latency,
                self.params.deadline,
                self.params.jitter,
                &self.window,
            ),
            None => true,
        }
    }

    pub fn unsubscribe(&mut self) -> Result<()> {
        self.base.unsubscribe()
    }
}
