// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Services: the server side of a call.
//!
//! The servicing node is signalled on every submission, then loops:
//!
//! ```ignore
//! while let Some(dispatched) = service.dispatch(&mut buf)? {
//!     let answer = handle(&buf[..dispatched.size()]);
//!     if dispatched.noreturn() {
//!         continue;
//!     }
//!     match service.acquire_request(&dispatched) {
//!         Ok(responder) => responder.respond(&answer)?,
//!         Err(status) => log::warn!("lost request: {}", status),
//!     }
//! }
//! ```

use super::queue::{QueueLengths, QueueSlot, RequestQueue};
use super::request::{Request, RequestState};
use crate::config::QosChecks;
use crate::core::rt::Notification;
use crate::core::Runtime;
use crate::error::{Error, Result};
use crate::status::{RtClass, Status};
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Service identifier.
pub type ServiceId = u32;

/// Service statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceProfile {
    /// Requests dispatched.
    pub calls: u64,
    /// Dispatched requests taken back by their requester before the
    /// response. Requests reclaimed while still queued are not counted.
    pub ownership_lost: u64,
}

#[derive(Debug)]
struct Queued {
    request: Request,
    size: usize,
}

struct ServiceState {
    queue: RequestQueue<Queued>,
    profile: ServiceProfile,
}

/// RPC service.
pub struct Service {
    id: ServiceId,
    notification: Notification,
    runtime: Arc<Runtime>,
    state: Mutex<ServiceState>,
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("id", &self.id)
            .field("notification", &self.notification)
            .finish_non_exhaustive()
    }
}

/// A request taken from the queue by [`Service::dispatch`].
#[derive(Debug, Clone)]
pub struct Dispatched {
    request: Request,
    generation: u64,
    submission: Instant,
    size: usize,
    noreturn: bool,
}

impl Dispatched {
    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn rt_class(&self) -> RtClass {
        self.request.rt_class()
    }

    pub fn submission(&self) -> Instant {
        self.submission
    }

    /// Payload size copied out on dispatch.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Fire-and-forget call: the requester expects no response.
    pub fn noreturn(&self) -> bool {
        self.noreturn
    }
}

impl Service {
    pub(crate) fn new(id: ServiceId, notification: Notification, runtime: Arc<Runtime>) -> Arc<Self> {
        Arc::new(Self {
            id,
            notification,
            runtime,
            state: Mutex::new(ServiceState {
                queue: RequestQueue::new(),
                profile: ServiceProfile::default(),
            }),
        })
    }

    pub fn id(&self) -> ServiceId {
        self.id
    }

    /// Notification signalled on every submission.
    pub fn notification(&self) -> &Notification {
        &self.notification
    }

    pub(crate) fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub(crate) fn checks(&self) -> QosChecks {
        self.runtime.config.rpc
    }

    pub(crate) fn notify(&self) {
        self.notification.signal();
    }

    /// Queue `request` in the tier of `class`.
    pub(crate) fn enqueue(
        &self,
        request: Request,
        class: RtClass,
        size: usize,
        deadline: Option<Instant>,
    ) -> QueueSlot {
        let queued = Queued { request, size };
        let mut state = self.state.lock();
        match class {
            RtClass::Hrt => state.queue.push_hrt(queued, deadline),
            RtClass::Frt | RtClass::Srt => state.queue.push_fsrt(queued),
            RtClass::Nrt => state.queue.push_nrt(queued),
        }
    }

    /// Drop a request its requester took back by force.
    ///
    /// `slot` is the queue position of a request not yet dispatched; `None`
    /// means the service was already working on it.
    pub(crate) fn detach(&self, slot: Option<QueueSlot>) {
        let mut state = self.state.lock();
        match slot {
            Some(slot) => {
                state.queue.remove(slot);
            }
            None => state.profile.ownership_lost += 1,
        }
    }

    /// Take the most urgent request and copy its payload into `buf`.
    ///
    /// The service keeps ownership of the request until it responds.
    ///
    /// # Errors
    /// `BufferTooSmall` if the front request's payload does not fit; it stays
    /// queued.
    pub fn dispatch(&self, buf: &mut [u8]) -> Result<Option<Dispatched>> {
        loop {
            let (slot, queued) = {
                let mut state = self.state.lock();
                match state.queue.peek_front() {
                    None => return Ok(None),
                    Some(front) if front.size > buf.len() => {
                        return Err(Error::BufferTooSmall {
                            required: front.size,
                            available: buf.len(),
                        })
                    }
                    Some(_) => {}
                }
                match state.queue.pop_front() {
                    Some(entry) => entry,
                    None => return Ok(None),
                }
            };

            let mut request = queued.request.inner.state.lock();
            // Taken back by its requester between pop and lock.
            if request.queued != Some(slot) || !request.is_owned_by(self) {
                continue;
            }
            request.queued = None;
            let size = request.size;
            buf[..size].copy_from_slice(&request.payload[..size]);
            let dispatched = Dispatched {
                generation: request.generation,
                submission: request.submission.unwrap_or_else(Instant::now),
                size,
                noreturn: request.notification.is_none(),
                request: queued.request.clone(),
            };
            drop(request);

            self.state.lock().profile.calls += 1;
            return Ok(Some(dispatched));
        }
    }

    /// Lock a dispatched request to respond to it.
    ///
    /// # Errors
    /// - `RequestBadOwner` if the requester took it back
    /// - `RequestObsolete` if it was taken back and submitted again
    pub fn acquire_request<'a>(
        &self,
        dispatched: &'a Dispatched,
    ) -> std::result::Result<Responder<'a>, Status> {
        self.check_owner(dispatched, dispatched.request.inner.state.lock())
    }

    /// Like [`acquire_request`](Self::acquire_request), `RequestLocked` if
    /// the request lock is taken.
    pub fn try_acquire_request<'a>(
        &self,
        dispatched: &'a Dispatched,
    ) -> std::result::Result<Responder<'a>, Status> {
        match dispatched.request.inner.state.try_lock() {
            Some(state) => self.check_owner(dispatched, state),
            None => Err(Status::RequestLocked),
        }
    }

    fn check_owner<'a>(
        &self,
        dispatched: &'a Dispatched,
        state: MutexGuard<'a, RequestState>,
    ) -> std::result::Result<Responder<'a>, Status> {
        if !state.is_owned_by(self) {
            Err(Status::RequestBadOwner)
        } else if state.generation != dispatched.generation {
            Err(Status::RequestObsolete)
        } else {
            Ok(Responder { state })
        }
    }

    /// Queued requests per tier.
    pub fn queue_length(&self) -> QueueLengths {
        self.state.lock().queue.lengths()
    }

    /// Classes of the queued requests in service order.
    pub fn queued_classes(&self) -> Vec<RtClass> {
        self.state
            .lock()
            .queue
            .iter()
            .map(|queued| queued.request.rt_class())
            .collect()
    }

    pub fn profile(&self) -> ServiceProfile {
        self.state.lock().profile
    }
}

/// Locked dispatched request, ready for the answer.
pub struct Responder<'a> {
    state: MutexGuard<'a, RequestState>,
}

impl fmt::Debug for Responder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("generation", &self.state.generation)
            .finish_non_exhaustive()
    }
}

impl Responder<'_> {
    /// Request payload buffer size.
    pub fn capacity(&self) -> usize {
        self.state.payload.len()
    }

    /// Copy the answer, hand the request back and signal the requester.
    ///
    /// # Errors
    /// `PayloadTooLarge` if `answer` exceeds the request's buffer; the
    /// service keeps ownership.
    pub fn respond(mut self, answer: &[u8]) -> Result<()> {
        let capacity = self.state.payload.len();
        if answer.len() > capacity {
            return Err(Error::PayloadTooLarge {
                size: answer.len(),
                capacity,
            });
        }
        let state = &mut *self.state;
        state.payload[..answer.len()].copy_from_slice(answer);
        state.size = answer.len();
        state.service = None;
        state.responded = true;
        if let Some(notification) = &state.notification {
            notification.signal();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::core::rt::Notifier;
    use crate::core::Core;
    use crate::rpc::RetrievePolicy;
    use std::time::Duration;

    fn setup() -> (Arc<Core>, Arc<Service>, Notifier) {
        let core = Core::new(CoreConfig::default()).expect("core");
        let notifier = Notifier::new();
        let service = core
            .create_service(4, Notification::new(notifier.clone(), 0x8))
            .expect("service");
        (core, service, notifier)
    }

    fn submit(service: &Arc<Service>, request: &Request, payload: &[u8]) {
        request
            .acquire()
            .expect("acquire")
            .submit(
                service,
                payload,
                Some(Notification::new(Notifier::new(), 0x1)),
                Duration::ZERO,
            )
            .expect("submit");
    }

    #[test]
    fn test_submit_signals_service() {
        let (_core, service, notifier) = setup();
        submit(&service, &Request::nrt(4), &[1]);
        assert_eq!(notifier.pending() & 0x8, 0x8);
        assert_eq!(service.queue_length().nrt, 1);
    }

    #[test]
    fn test_dispatch_order_and_payload() {
        let (_core, service, _) = setup();
        submit(&service, &Request::nrt(4), &[1]);
        submit(&service, &Request::frt(4, Duration::ZERO), &[2]);
        submit(&service, &Request::hrt(4, Duration::ZERO, crate::qos::Recovery::panic()), &[3]);

        let mut buf = [0u8; 4];
        let mut seen = Vec::new();
        while let Some(dispatched) = service.dispatch(&mut buf).expect("dispatch") {
            seen.push((dispatched.rt_class(), buf[0]));
        }
        assert_eq!(
            seen,
            vec![(RtClass::Hrt, 3), (RtClass::Frt, 2), (RtClass::Nrt, 1)]
        );
        assert_eq!(service.profile().calls, 3);
    }

    #[test]
    fn test_dispatch_buffer_too_small_keeps_request() {
        let (_core, service, _) = setup();
        submit(&service, &Request::nrt(4), &[1, 2, 3]);
        let mut small = [0u8; 2];
        assert!(matches!(
            service.dispatch(&mut small),
            Err(Error::BufferTooSmall { required: 3, available: 2 })
        ));
        assert_eq!(service.queue_length().total(), 1);
    }

    #[test]
    fn test_noreturn_request() {
        let (_core, service, _) = setup();
        let request = Request::nrt(4);
        request
            .acquire()
            .expect("acquire")
            .submit(&service, &[1], None, Duration::ZERO)
            .expect("submit");
        let dispatched = service.dispatch(&mut [0u8; 4]).expect("dispatch").expect("request");
        assert!(dispatched.noreturn());
        service
            .acquire_request(&dispatched)
            .expect("owned")
            .respond(&[])
            .expect("respond");
        assert!(request.acquire().is_ok());
    }

    #[test]
    fn test_enforced_retrieve_after_dispatch_loses_ownership() {
        let (_core, service, _) = setup();
        let request = Request::srt(4);
        submit(&service, &request, &[1]);
        let dispatched = service.dispatch(&mut [0u8; 4]).expect("dispatch").expect("request");

        let retrieved = request
            .retrieve(RetrievePolicy::Enforcing, &mut [0u8; 4])
            .expect("retrieve");
        assert_eq!(retrieved.status, Status::RequestBadOwner);
        assert_eq!(
            service.acquire_request(&dispatched).map(|_| ()),
            Err(Status::RequestBadOwner)
        );
        assert_eq!(service.profile().ownership_lost, 1);
        assert_eq!(request.profile().fails, 1);
    }

    #[test]
    fn test_enforced_retrieve_while_queued_keeps_ownership_count() {
        let (_core, service, _) = setup();
        let request = Request::nrt(4);
        submit(&service, &request, &[1]);

        let retrieved = request
            .retrieve(RetrievePolicy::Enforcing, &mut [0u8; 4])
            .expect("retrieve");
        assert_eq!(retrieved.status, Status::RequestBadOwner);
        assert_eq!(service.queue_length().total(), 0);
        assert_eq!(service.profile().ownership_lost, 0);
        assert_eq!(request.profile().fails, 1);
    }

    #[test]
    fn test_resubmitted_request_is_obsolete() {
        let (_core, service, _) = setup();
        let request = Request::nrt(4);
        submit(&service, &request, &[1]);
        let stale = service.dispatch(&mut [0u8; 4]).expect("dispatch").expect("request");
        request
            .retrieve(RetrievePolicy::Enforcing, &mut [0u8; 4])
            .expect("retrieve");
        submit(&service, &request, &[2]);
        assert_eq!(
            service.try_acquire_request(&stale).map(|_| ()),
            Err(Status::RequestObsolete)
        );
    }

    #[test]
    fn test_respond_too_large() {
        let (_core, service, _) = setup();
        let request = Request::nrt(2);
        submit(&service, &request, &[1]);
        let dispatched = service.dispatch(&mut [0u8; 4]).expect("dispatch").expect("request");
        let responder = service.acquire_request(&dispatched).expect("owned");
        assert_eq!(responder.capacity(), 2);
        assert!(matches!(
            responder.respond(&[1, 2, 3]),
            Err(Error::PayloadTooLarge { size: 3, capacity: 2 })
        ));
    }
}
