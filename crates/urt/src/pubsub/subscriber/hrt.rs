// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Hard real-time subscriber.
//!
//! On top of the firm checks a hard subscriber
//! - owes a read on every message published while it is subscribed, so the
//!   slot cannot be overwritten before it fetched or skipped it
//! - arms a QoS timer at the critical time of its oldest unread message
//! - escalates every violation through its [`Recovery`] (panic by default)
//!
//! The per-subscriber state the timer thread and the topic touch lives in a
//! link shared with the topic's criticality list.

use super::{fetched, Fetch, SubscriberBase};
use crate::config::QosChecks;
use crate::core::rt::{Notification, Timer};
use crate::core::Runtime;
use crate::error::Result;
use crate::pubsub::topic::{Topic, TopicState};
use crate::qos::recovery::Escalation;
use crate::qos::{LatencyWindow, QosParams, Recovery, ViolationLatch};
use crate::status::{RtClass, Status};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// QoS state guarded by the link lock.
#[derive(Debug, Default)]
pub(crate) struct HrtQos {
    pub(crate) window: LatencyWindow,
    /// Slot the timer is armed against.
    pub(crate) timer_message: Option<usize>,
    /// Generation of the pending timer, `None` when idle.
    pub(crate) armed: Option<u64>,
}

/// Shared part of a hard subscriber.
pub(crate) struct HrtLink {
    pub(crate) params: QosParams,
    pub(crate) qos: Mutex<HrtQos>,
    pub(crate) recovery: Recovery,
    pub(crate) latch: ViolationLatch,
    pub(crate) timer: Timer,
    runtime: Arc<Runtime>,
}

impl HrtLink {
    fn new(
        runtime: &Arc<Runtime>,
        params: QosParams,
        recovery: Recovery,
        latch: ViolationLatch,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<HrtLink>| {
            let link = weak.clone();
            let timer = runtime.timers.timer(move |generation| {
                if let Some(link) = link.upgrade() {
                    link.on_timer(generation);
                }
            });
            Self {
                params,
                qos: Mutex::new(HrtQos::default()),
                recovery,
                latch,
                timer,
                runtime: Arc::clone(runtime),
            }
        })
    }

    fn checks(&self) -> QosChecks {
        self.runtime.config.pubsub
    }

    /// The oldest unread message was not fetched in time.
    fn on_timer(&self, generation: u64) {
        let escalation = {
            let mut qos = self.qos.lock();
            if qos.armed != Some(generation) {
                return;
            }
            qos.armed = None;
            qos.timer_message = None;
            let reason = self
                .checks()
                .attribute(self.params.deadline, self.params.jitter, &qos.window);
            log::warn!("[HrtSubscriber::timer] {}", reason);
            self.recovery.escalate(&self.latch, reason)
        };
        if let Some(escalation) = escalation {
            escalation.dispatch(&self.runtime);
        }
    }

    /// Arm the timer for `slot`, or go idle when there is none or no constraint.
    fn arm_locked(&self, qos: &mut HrtQos, slot: Option<(usize, Instant)>) {
        let delay = self
            .checks()
            .critical_delay(self.params.deadline, self.params.jitter, &qos.window);
        match slot {
            Some((index, time)) if !delay.is_zero() => {
                qos.armed = Some(self.timer.set_at(time + delay));
                qos.timer_message = Some(index);
            }
            _ => {
                self.timer.reset();
                qos.armed = None;
                qos.timer_message = None;
            }
        }
    }
}

/// Hard real-time subscriber.
#[derive(Default)]
pub struct HrtSubscriber {
    base: SubscriberBase,
    link: Option<Arc<HrtLink>>,
    latch: ViolationLatch,
}

impl fmt::Debug for HrtSubscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HrtSubscriber")
            .field("base", &self.base)
            .field("params", &self.link.as_ref().map(|l| l.params))
            .field("violation", &self.latch.get())
            .finish()
    }
}

impl HrtSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rt_class(&self) -> RtClass {
        RtClass::Hrt
    }

    pub fn base(&self) -> &SubscriberBase {
        &self.base
    }

    /// QoS parameters, while subscribed.
    pub fn params(&self) -> Option<QosParams> {
        self.link.as_ref().map(|l| l.params)
    }

    /// Latency window, while subscribed.
    pub fn window(&self) -> Option<LatencyWindow> {
        self.link.as_ref().map(|l| l.qos.lock().window)
    }

    /// Violation awaiting recovery, `Status::Ok` when none.
    pub fn violation(&self) -> Status {
        self.latch.get()
    }

    /// Re-enable escalation after a recovery.
    pub fn clear_violation(&self) {
        self.latch.clear();
    }

    /// Subscribe with QoS `params` and a `recovery` strategy.
    ///
    /// The subscriber is inserted into the topic's criticality list. It only
    /// owes reads on messages published from now on.
    pub fn subscribe(
        &mut self,
        topic: &Arc<Topic>,
        notification: Notification,
        params: QosParams,
        recovery: Recovery,
    ) -> Result<()> {
        let mut state = topic.state.lock();
        self.base.bind_locked(topic, &mut state, notification)?;
        let link = HrtLink::new(&topic.runtime, params, recovery, self.latch.clone());
        topic.insert_hrt_locked(&mut state, Arc::clone(&link));
        state.profile.hrt_subscribers += 1;
        self.link = Some(link);
        log::debug!(
            "[HrtSubscriber::subscribe] Topic {} has {} hard subscribers",
            topic.id(),
            state.profile.hrt_subscribers
        );
        Ok(())
    }

    pub fn fetch_next(&mut self, buf: &mut [u8]) -> Result<Fetch> {
        let topic = self.base.bound_topic()?;
        let Some(link) = self.link.clone() else {
            return Ok(Fetch::NoMessage);
        };

        let (sample, status, escalation) = {
            let mut state = topic.state.lock();
            let Some(sample) = self.base.fetch_next_locked(&mut state, buf)? else {
                return Ok(Fetch::NoMessage);
            };
            let index = self.base.last_index();
            release_hrt(&topic, &mut state, index);

            let mut qos = link.qos.lock();
            let status = link.checks().check_latency(
                sample.latency,
                link.params.deadline,
                link.params.jitter,
                &mut qos.window,
            );
            // re-arm when the timer watched this message or already expired
            if qos.timer_message.is_none() || qos.timer_message == Some(index) {
                let next = self.next_unread(&state);
                link.arm_locked(&mut qos, next);
            }
            (sample, status, escalate(&link, status))
        };

        if let Some(escalation) = escalation {
            escalation.dispatch(&topic.runtime);
        }
        Ok(fetched(Some(sample), status))
    }

    /// Fetch the latest message, consuming every unread one.
    ///
    /// Each consumed message is checked; the first violation is returned and
    /// escalated once all of them were released.
    pub fn fetch_latest(&mut self, buf: &mut [u8]) -> Result<Fetch> {
        let topic = self.base.bound_topic()?;
        let Some(link) = self.link.clone() else {
            return Ok(Fetch::NoMessage);
        };

        let (sample, status, escalation) = {
            let mut state = topic.state.lock();
            let unread = self.base.unread_locked(&state);
            let Some(sample) = self.base.fetch_latest_locked(&mut state, buf)? else {
                return Ok(Fetch::NoMessage);
            };

            let now = Instant::now();
            let checks = link.checks();
            let mut qos = link.qos.lock();
            let mut status = Status::Ok;
            for index in unread {
                if !state.ring.get(index).is_valid() {
                    continue;
                }
                let latency = now.saturating_duration_since(state.ring.get(index).time);
                let checked = checks.check_latency(
                    latency,
                    link.params.deadline,
                    link.params.jitter,
                    &mut qos.window,
                );
                if status.is_ok() {
                    status = checked;
                }
                release_hrt(&topic, &mut state, index);
            }
            link.arm_locked(&mut qos, None);
            (sample, status, escalate(&link, status))
        };

        if let Some(escalation) = escalation {
            escalation.dispatch(&topic.runtime);
        }
        Ok(fetched(Some(sample), status))
    }

    /// Release every unread message and leave the topic.
    pub fn unsubscribe(&mut self) -> Result<()> {
        let topic = self.base.bound_topic()?;
        let mut state = topic.state.lock();
        if let Some(link) = self.link.take() {
            for index in self.base.unread_locked(&state) {
                release_hrt(&topic, &mut state, index);
            }
            topic.remove_hrt_locked(&mut state, &link);
            state.profile.hrt_subscribers = state.profile.hrt_subscribers.saturating_sub(1);
            link.arm_locked(&mut link.qos.lock(), None);
        }
        self.base.unbind_locked(&topic, &mut state);
        Ok(())
    }

    /// Whether data of age `latency` would pass the checks, without tracking it.
    pub fn calculate_validity(&self, latency: Duration) -> bool {
        match &self.link {
            Some(link) => link.checks().is_valid(
                latency,
                link.params.deadline,
                link.params.jitter,
                &link.qos.lock().window,
            ),
            None => true,
        }
    }

    fn next_unread(&self, state: &TopicState) -> Option<(usize, Instant)> {
        self.base
            .unread_locked(state)
            .first()
            .map(|&index| (index, state.ring.get(index).time))
    }
}

impl Drop for HrtSubscriber {
    fn drop(&mut self) {
        if self.base.is_subscribed() {
            let _ = self.unsubscribe();
        }
    }
}

/// Drop one hard read owed on `index`, waking blocked publishers on the last.
fn release_hrt(topic: &Topic, state: &mut TopicState, index: usize) {
    let message = state.ring.get_mut(index);
    if message.hrt_consumers_left == 0 {
        return;
    }
    message.hrt_consumers_left -= 1;
    if message.hrt_consumers_left == 0 {
        topic.hrt_released.notify_all();
    }
}

fn escalate(link: &HrtLink, status: Status) -> Option<Escalation> {
    if status.is_violation() {
        log::warn!("[HrtSubscriber::fetch] {}", status);
        link.recovery.escalate(&link.latch, status)
    } else {
        None
    }
}
