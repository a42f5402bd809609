// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for API misuse.

use std::fmt;
use std::io;

/// Result type for urt operations
pub type Result<T> = core::result::Result<T, Error>;

/// Errors returned when the middleware is used incorrectly.
#[derive(Debug)]
pub enum Error {
    // -- Registry ---------------------------------------------------------
    /// A topic with this id already exists
    DuplicateTopic(u32),

    /// A service with this id already exists
    DuplicateService(u32),

    // -- Subscription -----------------------------------------------------
    /// Subscriber is already bound to a topic
    AlreadySubscribed,

    /// Subscriber is not bound to any topic
    NotSubscribed,

    /// Event masks must have at least one bit set
    InvalidEventMask,

    // -- Synchronisation groups ---------------------------------------------
    /// Sync node is already member of a group
    AlreadyJoined,

    /// Sync node is not member of a group
    NotJoined,

    // -- Buffers ------------------------------------------------------------
    /// Payload does not fit into the slot it is copied to
    PayloadTooLarge { size: usize, capacity: usize },

    /// Output buffer is smaller than the data to copy
    BufferTooSmall { required: usize, available: usize },

    // -- Runtime ------------------------------------------------------------
    /// Failed to spawn a node or timer thread
    ThreadSpawn(io::Error),

    /// Invalid configuration
    Config(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateTopic(id) => write!(f, "Topic {} already registered", id),
            Self::DuplicateService(id) => write!(f, "Service {} already registered", id),
            Self::AlreadySubscribed => write!(f, "Subscriber already bound to a topic"),
            Self::NotSubscribed => write!(f, "Subscriber not bound to a topic"),
            Self::InvalidEventMask => write!(f, "Event mask must not be empty"),
            Self::AlreadyJoined => write!(f, "Sync node already joined a group"),
            Self::NotJoined => write!(f, "Sync node not member of a group"),
            Self::PayloadTooLarge { size, capacity } => {
                write!(f, "Payload of {} bytes exceeds capacity {}", size, capacity)
            }
            Self::BufferTooSmall {
                required,
                available,
            } => write!(
                f,
                "Buffer too small: {} bytes required, {} available",
                required, available
            ),
            Self::ThreadSpawn(e) => write!(f, "Failed to spawn thread: {}", e),
            Self::Config(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ThreadSpawn(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::ThreadSpawn(e)
    }
}
