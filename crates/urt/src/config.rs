// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! urt configuration: crate constants and the runtime [`CoreConfig`].
//!
//! # Architecture
//!
//! - **Level 1 (Static)**: compile-time constants (event bits, ids, names)
//! - **Level 2 (Dynamic)**: [`CoreConfig`], handed to [`crate::Core::new`]
//!
//! With the `config-loaders` feature a configuration can be read from YAML:
//!
//! ```yaml
//! timer_thread_name: urt-timer
//! pubsub:
//!   deadline: true
//!   jitter: true
//!   rate: false
//! rpc:
//!   jitter: false
//! ```
//!
//! Missing keys keep their defaults (every check enabled).

use crate::core::rt::event::{EventFlags, EventMask};

// =======================================================================
// Messages
// =======================================================================

/// Id carried by a slot that was never written.
///
/// Message ids skip this value when they wrap.
pub const MESSAGE_ID_INVALID: u64 = 0;

// =======================================================================
// Core events
// =======================================================================

/// Event bit reserved for core control events (emergency, terminate, proceed).
///
/// Application event masks must not use it.
pub const CORE_EVENT_MASK: EventMask = 1 << 31;

/// Every event bit.
pub const EVENT_MASK_ALL: EventMask = EventMask::MAX;

/// A core panic was raised; nodes leave their loop immediately.
pub const EVENT_FLAG_EMERGENCY: EventFlags = 1 << 0;

/// `stop_nodes` was called; nodes leave their loop and shut down.
pub const EVENT_FLAG_TERMINATE: EventFlags = 1 << 1;

/// All nodes reached the same synchronisation stage.
pub const EVENT_FLAG_PROCEED: EventFlags = 1 << 2;

// =======================================================================
// Synchronisation groups
// =======================================================================

/// A synchronisation group completed a round.
pub const SYNC_FLAG_PROCEED: EventFlags = 1 << 0;

/// The external synchronisation of a group failed.
pub const SYNC_FLAG_FAILED: EventFlags = 1 << 1;

// =======================================================================
// Threads
// =======================================================================

/// Name of the thread that fires QoS and rate timers.
pub const TIMER_THREAD_NAME: &str = "urt-timer";

/// Prefix for node thread names (`urt-node-<name>`).
pub const NODE_THREAD_PREFIX: &str = "urt-node-";

// =======================================================================
// Runtime configuration
// =======================================================================

/// Which QoS checks are compiled into one side of the middleware.
///
/// A disabled check is never evaluated, whatever the entity parameters say.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "config-loaders", derive(serde::Deserialize))]
#[cfg_attr(feature = "config-loaders", serde(default))]
pub struct QosChecks {
    /// Maximum age of information.
    pub deadline: bool,
    /// Adaptive latency window.
    pub jitter: bool,
    /// Expected inter-message period (publish-subscribe only).
    pub rate: bool,
}

impl QosChecks {
    /// Every check enabled.
    pub const fn all() -> Self {
        Self {
            deadline: true,
            jitter: true,
            rate: true,
        }
    }

    /// Every check disabled.
    pub const fn none() -> Self {
        Self {
            deadline: false,
            jitter: false,
            rate: false,
        }
    }

    /// True when the deadline or the jitter check is on.
    #[inline]
    pub const fn any_latency(&self) -> bool {
        self.deadline || self.jitter
    }
}

impl Default for QosChecks {
    fn default() -> Self {
        Self::all()
    }
}

/// Configuration for a [`crate::Core`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config-loaders", derive(serde::Deserialize))]
#[cfg_attr(feature = "config-loaders", serde(default))]
pub struct CoreConfig {
    /// Checks applied to topics and subscribers.
    pub pubsub: QosChecks,
    /// Checks applied to services and requests (`rate` is ignored).
    pub rpc: QosChecks,
    /// Name of the timer thread.
    pub timer_thread_name: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            pubsub: QosChecks::all(),
            rpc: QosChecks::all(),
            timer_thread_name: TIMER_THREAD_NAME.to_string(),
        }
    }
}

impl CoreConfig {
    /// Set the publish-subscribe checks.
    #[must_use]
    pub fn with_pubsub(mut self, checks: QosChecks) -> Self {
        self.pubsub = checks;
        self
    }

    /// Set the RPC checks.
    #[must_use]
    pub fn with_rpc(mut self, checks: QosChecks) -> Self {
        self.rpc = checks;
        self
    }

    /// Validate before use.
    pub fn validate(&self) -> crate::Result<()> {
        if self.timer_thread_name.is_empty() {
            return Err(crate::Error::Config(
                "timer_thread_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(feature = "config-loaders")]
impl CoreConfig {
    /// Parse a configuration from YAML text.
    pub fn from_yaml_str(yaml: &str) -> crate::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| crate::Error::Config(format!("Failed to parse YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> crate::Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read YAML file: {}", e)))?;
        Self::from_yaml_str(&yaml)
    }
}
