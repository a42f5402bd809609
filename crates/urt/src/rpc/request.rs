// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Requests: the client side of a service call.
//!
//! A request owns its payload buffer, which carries the call arguments on
//! submission and the answer after the service responded.
//!
//! ```text
//! acquire ──> submit ──> (queued) ──> dispatch ──> respond ──> retrieve
//!    ^                                                             |
//!    └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! While a service owns the request, `acquire` fails with
//! `RequestBadOwner`; after the response and before `retrieve` it fails
//! with `RequestPending`. [`RetrievePolicy::Enforcing`] takes a request
//! back from a service that still owns it.

use super::queue::QueueSlot;
use super::service::Service;
use crate::config::QosChecks;
use crate::core::rt::{Notification, Timer};
use crate::core::Runtime;
use crate::error::{Error, Result};
use crate::qos::{LatencyWindow, Recovery, ViolationLatch};
use crate::status::{RtClass, Status};
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// How `retrieve` treats a locked or still owned request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetrievePolicy {
    /// Wait for the request lock.
    #[default]
    Blocking,
    /// Fail with `RequestLocked` if the request lock is taken.
    Lazy,
    /// Wait for the lock and detach the request from its service if needed.
    Enforcing,
}

/// Outcome of a [`Request::retrieve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retrieved {
    pub status: Status,
    /// Size of the answer copied out, or of the detached request.
    pub size: usize,
    /// Time since submission, zero when no answer was pending.
    pub latency: Duration,
}

impl Retrieved {
    fn failed(status: Status) -> Self {
        Self {
            status,
            size: 0,
            latency: Duration::ZERO,
        }
    }
}

/// Request statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestProfile {
    pub calls: u64,
    /// Calls that never completed normally (detached by force).
    pub fails: u64,
    pub min_latency: Duration,
    pub max_latency: Duration,
    pub sum_latency: Duration,
}

impl Default for RequestProfile {
    fn default() -> Self {
        Self {
            calls: 0,
            fails: 0,
            min_latency: Duration::MAX,
            max_latency: Duration::ZERO,
            sum_latency: Duration::ZERO,
        }
    }
}

impl RequestProfile {
    fn track(&mut self, latency: Duration) {
        self.min_latency = self.min_latency.min(latency);
        self.max_latency = self.max_latency.max(latency);
        self.sum_latency = self.sum_latency.saturating_add(latency);
    }
}

/// Hard real-time part of a request.
pub(crate) struct HrtRequest {
    recovery: Recovery,
    latch: ViolationLatch,
    /// Created on the first submission, from the service's timer thread.
    timer: Option<Timer>,
    armed: Option<u64>,
}

/// Request state, guarded by the request lock.
pub(crate) struct RequestState {
    /// Service owning the request, from submit until respond.
    pub(crate) service: Option<Weak<Service>>,
    /// Queue position while not yet dispatched.
    pub(crate) queued: Option<QueueSlot>,
    pub(crate) submission: Option<Instant>,
    /// Incremented on every submission.
    pub(crate) generation: u64,
    /// Requester to signal on response; set while a response is pending.
    pub(crate) notification: Option<Notification>,
    /// Answer written by the service and not yet retrieved.
    pub(crate) responded: bool,
    pub(crate) payload: Box<[u8]>,
    pub(crate) size: usize,
    deadline: Duration,
    jitter: Duration,
    window: LatencyWindow,
    runtime: Option<Arc<Runtime>>,
    hrt: Option<HrtRequest>,
    profile: RequestProfile,
}

impl RequestState {
    fn checks(&self) -> QosChecks {
        self.runtime
            .as_ref()
            .map(|runtime| runtime.config.rpc)
            .unwrap_or_default()
    }

    pub(crate) fn is_owned_by(&self, service: &Service) -> bool {
        self.service
            .as_ref()
            .is_some_and(|owner| std::ptr::eq(owner.as_ptr(), service))
    }
}

pub(crate) struct RequestInner {
    class: RtClass,
    pub(crate) state: Mutex<RequestState>,
}

/// Request handle. Clones refer to the same request.
#[derive(Clone)]
pub struct Request {
    pub(crate) inner: Arc<RequestInner>,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("class", &self.inner.class)
            .finish_non_exhaustive()
    }
}

impl Request {
    fn with_class(class: RtClass, capacity: usize, jitter: Duration, hrt: Option<HrtRequest>) -> Self {
        Self {
            inner: Arc::new(RequestInner {
                class,
                state: Mutex::new(RequestState {
                    service: None,
                    queued: None,
                    submission: None,
                    generation: 0,
                    notification: None,
                    responded: false,
                    payload: vec![0u8; capacity].into_boxed_slice(),
                    size: 0,
                    deadline: Duration::ZERO,
                    jitter,
                    window: LatencyWindow::new(),
                    runtime: None,
                    hrt,
                    profile: RequestProfile::default(),
                }),
            }),
        }
    }

    /// Best-effort request with a `capacity` byte payload buffer.
    pub fn nrt(capacity: usize) -> Self {
        Self::with_class(RtClass::Nrt, capacity, Duration::ZERO, None)
    }

    /// Soft real-time request.
    pub fn srt(capacity: usize) -> Self {
        Self::with_class(RtClass::Srt, capacity, Duration::ZERO, None)
    }

    /// Firm real-time request with maximum `jitter` (zero disables).
    pub fn frt(capacity: usize, jitter: Duration) -> Self {
        Self::with_class(RtClass::Frt, capacity, jitter, None)
    }

    /// Hard real-time request with maximum `jitter` and a `recovery` strategy.
    pub fn hrt(capacity: usize, jitter: Duration, recovery: Recovery) -> Self {
        let hrt = HrtRequest {
            recovery,
            latch: ViolationLatch::new(),
            timer: None,
            armed: None,
        };
        Self::with_class(RtClass::Hrt, capacity, jitter, Some(hrt))
    }

    pub fn rt_class(&self) -> RtClass {
        self.inner.class
    }

    /// Payload buffer size in bytes.
    pub fn capacity(&self) -> usize {
        self.inner.state.lock().payload.len()
    }

    /// Take exclusive control of the request to fill and submit it.
    ///
    /// # Errors
    /// - `RequestBadOwner` while a service owns the request
    /// - `RequestPending` while a response awaits retrieval
    pub fn acquire(&self) -> std::result::Result<RequestGuard<'_>, Status> {
        self.check_free(self.inner.state.lock())
    }

    /// Like [`acquire`](Self::acquire), `RequestLocked` if the lock is taken.
    pub fn try_acquire(&self) -> std::result::Result<RequestGuard<'_>, Status> {
        match self.inner.state.try_lock() {
            Some(state) => self.check_free(state),
            None => Err(Status::RequestLocked),
        }
    }

    fn check_free<'a>(
        &'a self,
        state: MutexGuard<'a, RequestState>,
    ) -> std::result::Result<RequestGuard<'a>, Status> {
        if state.service.is_some() {
            Err(Status::RequestBadOwner)
        } else if state.notification.is_some() {
            Err(Status::RequestPending)
        } else {
            Ok(RequestGuard {
                request: self,
                state,
            })
        }
    }

    /// Collect the answer into `buf`.
    ///
    /// Firm and hard requests check the latency since submission; hard
    /// requests escalate violations before returning. A request detached by
    /// [`RetrievePolicy::Enforcing`] reports `RequestBadOwner` and copies
    /// nothing. Without an answer awaiting retrieval (never submitted, or
    /// already retrieved) the payload is copied with zero latency and
    /// nothing is tracked or checked.
    ///
    /// # Errors
    /// `BufferTooSmall` if the answer does not fit; the request is unchanged.
    pub fn retrieve(&self, policy: RetrievePolicy, buf: &mut [u8]) -> Result<Retrieved> {
        let mut guard = match policy {
            RetrievePolicy::Lazy => match self.inner.state.try_lock() {
                Some(state) => state,
                None => return Ok(Retrieved::failed(Status::RequestLocked)),
            },
            RetrievePolicy::Blocking | RetrievePolicy::Enforcing => self.inner.state.lock(),
        };

        let state = &mut *guard;
        let mut status = Status::Ok;
        if state.service.is_some() {
            if policy != RetrievePolicy::Enforcing {
                return Ok(Retrieved::failed(Status::RequestBadOwner));
            }
            detach_locked(state);
            status = Status::RequestBadOwner;
        } else {
            if buf.len() < state.size {
                return Err(Error::BufferTooSmall {
                    required: state.size,
                    available: buf.len(),
                });
            }
            let size = state.size;
            buf[..size].copy_from_slice(&state.payload[..size]);
            if !state.responded {
                return Ok(Retrieved {
                    status,
                    size,
                    latency: Duration::ZERO,
                });
            }
            state.responded = false;
        }

        let latency = state
            .submission
            .map_or(Duration::ZERO, |t| t.elapsed());
        state.profile.track(latency);

        let checks = state.checks();
        if let Some(hrt) = state.hrt.as_mut() {
            if let Some(timer) = &hrt.timer {
                timer.reset();
            }
            hrt.armed = None;
        }
        if status.is_ok() && matches!(self.inner.class, RtClass::Frt | RtClass::Hrt) {
            status = checks.check_latency(latency, state.deadline, state.jitter, &mut state.window);
        }
        let escalation = match (&state.hrt, status.is_violation()) {
            (Some(hrt), true) => {
                log::warn!("[Request::retrieve] {}", status);
                hrt.recovery.escalate(&hrt.latch, status)
            }
            _ => None,
        };
        let runtime = state.runtime.clone();
        let size = state.size;
        state.notification = None;
        drop(guard);

        if let (Some(escalation), Some(runtime)) = (escalation, runtime) {
            escalation.dispatch(&runtime);
        }
        Ok(Retrieved {
            status,
            size,
            latency,
        })
    }

    /// Time since the last submission, zero if never submitted.
    pub fn age(&self) -> Duration {
        self.inner
            .state
            .lock()
            .submission
            .map_or(Duration::ZERO, |t| t.elapsed())
    }

    /// Whether an answer of age `latency` would pass the checks, without
    /// tracking it. Best-effort and soft requests are always valid.
    pub fn calculate_validity(&self, latency: Duration) -> bool {
        if !matches!(self.inner.class, RtClass::Frt | RtClass::Hrt) {
            return true;
        }
        let state = self.inner.state.lock();
        state
            .checks()
            .is_valid(latency, state.deadline, state.jitter, &state.window)
    }

    /// Violation awaiting recovery, `Status::Ok` when none or not hard.
    pub fn violation(&self) -> Status {
        self.inner
            .state
            .lock()
            .hrt
            .as_ref()
            .map_or(Status::Ok, |hrt| hrt.latch.get())
    }

    /// Re-enable escalation after a recovery.
    pub fn clear_violation(&self) {
        if let Some(hrt) = self.inner.state.lock().hrt.as_ref() {
            hrt.latch.clear();
        }
    }

    pub fn window(&self) -> LatencyWindow {
        self.inner.state.lock().window
    }

    pub fn profile(&self) -> RequestProfile {
        self.inner.state.lock().profile
    }

    /// Hard QoS timer expiry.
    fn on_timer(&self, generation: u64) {
        let (escalation, runtime) = {
            let mut state = self.inner.state.lock();
            let checks = state.checks();
            let state = &mut *state;
            let Some(hrt) = state.hrt.as_mut() else {
                return;
            };
            if hrt.armed != Some(generation) {
                return;
            }
            hrt.armed = None;
            let reason = checks.attribute(state.deadline, state.jitter, &state.window);
            log::warn!("[Request::timer] {}", reason);
            (hrt.recovery.escalate(&hrt.latch, reason), state.runtime.clone())
        };
        if let (Some(escalation), Some(runtime)) = (escalation, runtime) {
            escalation.dispatch(&runtime);
        }
    }
}

/// Take the request back from its service.
fn detach_locked(state: &mut RequestState) {
    if let Some(service) = state.service.take().and_then(|s| s.upgrade()) {
        service.detach(state.queued.take());
        log::warn!("[Request::retrieve] Detached from service {}", service.id());
    }
    state.queued = None;
    state.notification = None;
    state.profile.fails += 1;
}

/// Exclusive access to a free request.
pub struct RequestGuard<'a> {
    request: &'a Request,
    state: MutexGuard<'a, RequestState>,
}

impl fmt::Debug for RequestGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestGuard")
            .field("request", self.request)
            .field("size", &self.state.size)
            .finish()
    }
}

impl RequestGuard<'_> {
    /// Current payload: the last answer, or the last submitted arguments.
    pub fn payload(&self) -> &[u8] {
        &self.state.payload[..self.state.size]
    }

    /// Submit `payload` to `service`.
    ///
    /// `notification` is signalled when the service responds; `None` makes a
    /// fire-and-forget call. `deadline` bounds the latency of firm and hard
    /// requests (zero disables) and is ignored otherwise.
    ///
    /// Hard requests arm their QoS timer relative to the submission time and
    /// enter the hard tier ordered by their absolute deadline.
    pub fn submit(
        mut self,
        service: &Arc<Service>,
        payload: &[u8],
        notification: Option<Notification>,
        deadline: Duration,
    ) -> Result<()> {
        let capacity = self.state.payload.len();
        if payload.len() > capacity {
            return Err(Error::PayloadTooLarge {
                size: payload.len(),
                capacity,
            });
        }
        if notification.as_ref().is_some_and(|n| n.mask() == 0) {
            return Err(Error::InvalidEventMask);
        }

        let class = self.request.inner.class;
        let checks = service.checks();
        let submission = Instant::now();
        let state = &mut *self.state;
        state.payload[..payload.len()].copy_from_slice(payload);
        state.size = payload.len();
        state.service = Some(Arc::downgrade(service));
        state.submission = Some(submission);
        state.generation = state.generation.wrapping_add(1);
        state.notification = notification;
        state.responded = false;
        state.runtime = Some(Arc::clone(service.runtime()));
        state.profile.calls += 1;
        if matches!(class, RtClass::Frt | RtClass::Hrt) {
            state.deadline = deadline;
        }

        let mut edf = None;
        if let Some(hrt) = state.hrt.as_mut() {
            let delay = checks.critical_delay(state.deadline, state.jitter, &state.window);
            if !delay.is_zero() {
                let timer = hrt.timer.get_or_insert_with(|| {
                    let weak = Arc::downgrade(&self.request.inner);
                    service.runtime().timers.timer(move |generation| {
                        if let Some(inner) = weak.upgrade() {
                            Request { inner }.on_timer(generation);
                        }
                    })
                });
                hrt.armed = Some(timer.set_at(submission + delay));
            }
            if checks.deadline || checks.jitter {
                edf = checks.absolute_deadline(submission, state.deadline, state.jitter, &state.window);
            }
        }

        state.queued = Some(service.enqueue(self.request.clone(), class, state.size, edf));
        drop(self);
        service.notify();
        Ok(())
    }
}
