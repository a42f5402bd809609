// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Synchronisation groups: barriers across nodes.
//!
//! Each participant joins a [`SyncGroup`] through its own [`SyncNode`]. A
//! node calling [`SyncNode::synchronize`] turns pending; once every member
//! is pending the group releases them all, broadcasts [`SYNC_FLAG_PROCEED`]
//! on its event source and wakes the threads blocked in [`SyncNode::wait`].
//! Nodes may join and leave at any time, and a thread may take part in
//! several groups with one `SyncNode` per group.
//!
//! A group can additionally be synchronised with a party outside the
//! process through an [`ExternalSync`] hook: it is started when the first
//! member turns pending and finished when the last one does.
//!
//! ```text
//!   A: synchronize -> SyncPending ----wait----------+--> proceed
//!   B: synchronize -> SyncPending ----wait----------+--> proceed
//!   C: synchronize -> Ok (last one, releases group) +
//! ```
//!
//! # Example
//! ```ignore
//! let group = SyncGroup::new();
//! let mut sync = SyncNode::new();
//! sync.join(&group, ctx.notification(0x4))?;
//! // every cycle
//! sync.synchronize()?;
//! sync.wait(Some(Duration::from_millis(100)))?;
//! ```

use super::rt::{EventFlags, EventListener, EventSource, Notification};
use crate::config::{SYNC_FLAG_FAILED, SYNC_FLAG_PROCEED};
use crate::error::{Error, Result};
use crate::status::Status;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

static NEXT_SYNC_NODE: AtomicU64 = AtomicU64::new(1);

// =======================================================================
// External synchronisation
// =======================================================================

/// Which half of an external synchronisation a hook call performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    /// First member of the group turned pending.
    Initial,
    /// Last member turned pending (or left).
    Final,
}

/// Progress of an [`ExternalSync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Idle,
    Pending,
    Failed,
}

/// Hook synchronising a group with something outside the process.
///
/// Calls must not block.
/// - `Initial`: start synchronising, return `SyncPending` or `SyncError`.
///   Nothing may be broadcast.
/// - `Final`: return `Ok` after broadcasting `proceed` on `source`,
///   `SyncError` after broadcasting `failed`, or `SyncPending` when the
///   outcome arrives later through [`SyncGroup::complete_external`].
pub trait Synchronize: Send {
    fn synchronize(
        &mut self,
        stage: SyncStage,
        source: &EventSource,
        proceed: EventFlags,
        failed: EventFlags,
    ) -> Status;
}

impl<F> Synchronize for F
where
    F: FnMut(SyncStage, &EventSource, EventFlags, EventFlags) -> Status + Send,
{
    fn synchronize(
        &mut self,
        stage: SyncStage,
        source: &EventSource,
        proceed: EventFlags,
        failed: EventFlags,
    ) -> Status {
        self(stage, source, proceed, failed)
    }
}

/// External synchronisation attached to a group.
pub struct ExternalSync {
    hook: Box<dyn Synchronize>,
    state: SyncState,
}

impl fmt::Debug for ExternalSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalSync")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ExternalSync {
    pub fn new(hook: impl Synchronize + 'static) -> Self {
        Self {
            hook: Box::new(hook),
            state: SyncState::Idle,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Run the initial stage. On failure `failed` is broadcast on `source`.
    fn start(&mut self, source: &EventSource, failed: EventFlags) -> Status {
        match self.hook.synchronize(SyncStage::Initial, source, 0, 0) {
            Status::SyncError => {
                log::warn!("[SyncGroup] External synchronisation failed to start");
                self.state = SyncState::Failed;
                source.broadcast(failed);
                Status::SyncError
            }
            _ => {
                self.state = SyncState::Pending;
                Status::SyncPending
            }
        }
    }

    /// Run the final stage; the hook broadcasts the outcome itself.
    fn finish(&mut self, source: &EventSource, proceed: EventFlags, failed: EventFlags) -> Status {
        let status = self.hook.synchronize(SyncStage::Final, source, proceed, failed);
        self.state = match status {
            Status::Ok => SyncState::Idle,
            Status::SyncPending => SyncState::Pending,
            _ => {
                log::warn!("[SyncGroup] External synchronisation failed: {}", status);
                SyncState::Failed
            }
        };
        status
    }
}

// =======================================================================
// Groups
// =======================================================================

#[derive(Debug)]
struct Member {
    id: u64,
    pending: bool,
}

#[derive(Debug, Default)]
struct GroupState {
    members: Vec<Member>,
    external: Option<ExternalSync>,
    /// Completed synchronisation rounds.
    rounds: u64,
}

impl GroupState {
    fn all_pending(&self) -> bool {
        self.members.iter().all(|m| m.pending)
    }

    fn any_pending(&self) -> bool {
        self.members.iter().any(|m| m.pending)
    }

    fn external_state(&self) -> Option<SyncState> {
        self.external.as_ref().map(ExternalSync::state)
    }
}

/// Barrier shared by a set of nodes.
#[derive(Debug, Default)]
pub struct SyncGroup {
    state: Mutex<GroupState>,
    source: EventSource,
    released: Condvar,
}

impl SyncGroup {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Group that also synchronises through `external`.
    pub fn with_external(external: ExternalSync) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(GroupState {
                external: Some(external),
                ..GroupState::default()
            }),
            ..Self::default()
        })
    }

    /// True when no member is pending and the external synchronisation,
    /// if any, is idle.
    pub fn is_synchronized(&self) -> bool {
        let state = self.state.lock();
        let external_idle = state
            .external_state()
            .map_or(true, |s| s == SyncState::Idle);
        external_idle && !state.any_pending()
    }

    pub fn len(&self) -> usize {
        self.state.lock().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of completed synchronisation rounds.
    pub fn rounds(&self) -> u64 {
        self.state.lock().rounds
    }

    /// State of the external synchronisation, `None` without one.
    pub fn external_state(&self) -> Option<SyncState> {
        self.state.lock().external_state()
    }

    /// Source broadcasting [`SYNC_FLAG_PROCEED`] and [`SYNC_FLAG_FAILED`].
    ///
    /// Members are registered on join; other observers may register too.
    pub fn events(&self) -> &EventSource {
        &self.source
    }

    /// Report the late outcome of an external synchronisation whose final
    /// stage returned `SyncPending`.
    ///
    /// `Ok` completes the round, anything else marks it failed.
    pub fn complete_external(&self, outcome: Status) {
        let mut state = self.state.lock();
        let Some(external) = state.external.as_mut() else {
            return;
        };
        if outcome.is_ok() {
            external.state = SyncState::Idle;
            state.rounds += 1;
            self.source.broadcast(SYNC_FLAG_PROCEED);
        } else {
            log::warn!("[SyncGroup::complete_external] {}", outcome);
            external.state = SyncState::Failed;
            self.source.broadcast(SYNC_FLAG_FAILED);
        }
        self.released.notify_all();
    }

    /// Every member is pending: release them all and finish the round.
    fn release_locked(&self, state: &mut GroupState) -> Status {
        for member in &mut state.members {
            member.pending = false;
        }
        let status = match state.external.as_mut() {
            Some(external) => external.finish(&self.source, SYNC_FLAG_PROCEED, SYNC_FLAG_FAILED),
            None => {
                self.source.broadcast(SYNC_FLAG_PROCEED);
                Status::Ok
            }
        };
        if status.is_ok() {
            state.rounds += 1;
        }
        self.released.notify_all();
        status
    }
}

// =======================================================================
// Members
// =======================================================================

/// Membership of one participant in one [`SyncGroup`].
pub struct SyncNode {
    id: u64,
    listener: EventListener,
    group: Option<Arc<SyncGroup>>,
}

impl Default for SyncNode {
    fn default() -> Self {
        Self {
            id: NEXT_SYNC_NODE.fetch_add(1, Ordering::Relaxed),
            listener: EventListener::new(),
            group: None,
        }
    }
}

impl fmt::Debug for SyncNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncNode")
            .field("id", &self.id)
            .field("joined", &self.group.is_some())
            .finish()
    }
}

impl SyncNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flags received from the group's event source.
    pub fn listener(&self) -> &EventListener {
        &self.listener
    }

    pub fn is_joined(&self) -> bool {
        self.group.is_some()
    }

    fn group(&self) -> Result<&Arc<SyncGroup>> {
        self.group.as_ref().ok_or(Error::NotJoined)
    }

    /// Join `group`; its events signal `notification`.
    ///
    /// Returns `SyncPending` when the group is in the middle of a round, in
    /// which case this node has to synchronise too before it completes.
    ///
    /// # Errors
    /// `AlreadyJoined`, or `InvalidEventMask` for an empty mask.
    pub fn join(&mut self, group: &Arc<SyncGroup>, notification: Notification) -> Result<Status> {
        if self.group.is_some() {
            return Err(Error::AlreadyJoined);
        }
        if notification.mask() == 0 {
            return Err(Error::InvalidEventMask);
        }
        let mut state = group.state.lock();
        let pending = state.any_pending();
        state.members.push(Member { id: self.id, pending });
        group.source.register(&self.listener, notification);
        log::debug!(
            "[SyncNode::join] Group has {} members{}",
            state.members.len(),
            if pending { ", joined pending" } else { "" }
        );
        drop(state);
        self.group = Some(Arc::clone(group));
        Ok(if pending { Status::SyncPending } else { Status::Ok })
    }

    /// Leave the group.
    ///
    /// When every remaining member is pending the round completes as if
    /// this node had synchronised.
    pub fn leave(&mut self) -> Result<()> {
        let group = self.group.take().ok_or(Error::NotJoined)?;
        let mut state = group.state.lock();
        state.members.retain(|m| m.id != self.id);
        group.source.unregister(&self.listener);
        if !state.members.is_empty() && state.all_pending() {
            let status = group.release_locked(&mut state);
            log::debug!("[SyncNode::leave] Released waiting members: {}", status);
        }
        Ok(())
    }

    /// Mark this node as having reached the barrier.
    ///
    /// - `Ok`: this was the last member, the group is released
    /// - `SyncPending`: other members have not arrived yet, or this node
    ///   already waits
    /// - `SyncError`: the external synchronisation failed
    ///
    /// # Errors
    /// `NotJoined`.
    pub fn synchronize(&self) -> Result<Status> {
        let group = self.group()?;
        let mut state = group.state.lock();
        let member = state
            .members
            .iter_mut()
            .find(|m| m.id == self.id)
            .ok_or(Error::NotJoined)?;
        if member.pending {
            return Ok(Status::SyncPending);
        }
        member.pending = true;

        if state.all_pending() {
            return Ok(group.release_locked(&mut state));
        }
        let state = &mut *state;
        match state.external.as_mut() {
            Some(external) if external.state() == SyncState::Idle => {
                Ok(external.start(&group.source, SYNC_FLAG_FAILED))
            }
            _ => Ok(Status::SyncPending),
        }
    }

    /// Block until the round this node is part of completes.
    ///
    /// Returns `Ok` once released, `SyncError` when the external
    /// synchronisation failed and `SyncPending` if `timeout` elapsed first.
    ///
    /// # Errors
    /// `NotJoined`.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<Status> {
        let group = self.group()?;
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut state = group.state.lock();
        loop {
            let pending = state
                .members
                .iter()
                .find(|m| m.id == self.id)
                .ok_or(Error::NotJoined)?
                .pending;
            match state.external_state() {
                Some(SyncState::Failed) => return Ok(Status::SyncError),
                Some(SyncState::Pending) => {}
                _ if !pending => return Ok(Status::Ok),
                _ => {}
            }
            match deadline {
                Some(deadline) => {
                    if group.released.wait_until(&mut state, deadline).timed_out() {
                        return Ok(Status::SyncPending);
                    }
                }
                None => group.released.wait(&mut state),
            }
        }
    }
}

impl Drop for SyncNode {
    fn drop(&mut self) {
        if self.group.is_some() {
            let _ = self.leave();
        }
    }
}
