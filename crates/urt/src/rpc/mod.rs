// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Remote procedure calls between nodes.
//!
//! A [`Request`] is submitted to a [`Service`], whose queue serves hard
//! requests first (earliest deadline first), then soft and firm ones, then
//! best-effort ones. The servicing node dispatches, responds, and the
//! requester retrieves the answer.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use urt::core::rt::{Notification, Notifier};
//! use urt::rpc::{Request, RetrievePolicy};
//! use urt::{Core, CoreConfig, Status};
//!
//! let core = Core::new(CoreConfig::default()).unwrap();
//! let service = core.create_service(1, Notification::new(Notifier::new(), 0x1)).unwrap();
//!
//! let request = Request::frt(16, Duration::ZERO);
//! let requester = Notifier::new();
//! request
//!     .acquire()
//!     .unwrap()
//!     .submit(&service, b"ping", Some(Notification::new(requester.clone(), 0x2)), Duration::ZERO)
//!     .unwrap();
//!
//! let mut buf = [0u8; 16];
//! let dispatched = service.dispatch(&mut buf).unwrap().unwrap();
//! assert_eq!(&buf[..dispatched.size()], b"ping");
//! service.acquire_request(&dispatched).unwrap().respond(b"pong").unwrap();
//!
//! let retrieved = request.retrieve(RetrievePolicy::Blocking, &mut buf).unwrap();
//! assert_eq!(retrieved.status, Status::Ok);
//! assert_eq!(&buf[..retrieved.size], b"pong");
//! ```

pub mod queue;
pub mod request;
pub mod service;

pub use queue::{QueueLengths, QueueSlot, RequestQueue, Tier};
pub use request::{Request, RequestGuard, RequestProfile, RetrievePolicy, Retrieved};
pub use service::{Dispatched, Responder, Service, ServiceId, ServiceProfile};
