// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message slots and the circular ring of a topic.
//!
//! Slots live in an arena and link to each other by index, forming a single
//! cycle. `latest` is the newest written slot, `next(latest)` the oldest one
//! and the next to be overwritten. A consumer remembers `(slot, id)`: when the
//! slot's id changed, the ring wrapped over it.

use crate::config::MESSAGE_ID_INVALID;
use std::time::Instant;

/// One slot of a topic's ring.
#[derive(Debug)]
pub(crate) struct Message {
    pub(crate) next: usize,
    pub(crate) id: u64,
    pub(crate) time: Instant,
    pub(crate) payload: Box<[u8]>,
    pub(crate) size: usize,
    /// Hard real-time consumers that still have to read this message.
    pub(crate) hrt_consumers_left: usize,
    /// All consumers that still have to read this message.
    pub(crate) consumers_left: usize,
    /// Number of times the slot was written.
    pub(crate) utilizations: u64,
}

impl Message {
    fn new(next: usize, capacity: usize, now: Instant) -> Self {
        Self {
            next,
            id: MESSAGE_ID_INVALID,
            time: now,
            payload: vec![0u8; capacity].into_boxed_slice(),
            size: 0,
            hrt_consumers_left: 0,
            consumers_left: 0,
            utilizations: 0,
        }
    }

    #[inline]
    pub(crate) fn is_valid(&self) -> bool {
        self.id != MESSAGE_ID_INVALID
    }

    #[inline]
    pub(crate) fn data(&self) -> &[u8] {
        &self.payload[..self.size]
    }
}

/// Circular message buffer.
#[derive(Debug)]
pub(crate) struct MessageRing {
    slots: Vec<Message>,
    latest: usize,
    capacity: usize,
}

impl MessageRing {
    /// Ring with one mandatory slot linked to itself.
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            slots: vec![Message::new(0, capacity, Instant::now())],
            latest: 0,
            capacity,
        }
    }

    /// Splice `count` fresh slots directly after the latest message.
    pub(crate) fn add(&mut self, count: usize) {
        let now = Instant::now();
        for _ in 0..count {
            let index = self.slots.len();
            let next = self.slots[self.latest].next;
            self.slots.push(Message::new(next, self.capacity, now));
            self.slots[self.latest].next = index;
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub(crate) fn latest(&self) -> usize {
        self.latest
    }

    #[inline]
    pub(crate) fn set_latest(&mut self, index: usize) {
        self.latest = index;
    }

    /// Slot after `index` in ring order.
    #[inline]
    pub(crate) fn next(&self, index: usize) -> usize {
        self.slots[index].next
    }

    /// Oldest slot, the next to be overwritten.
    #[inline]
    pub(crate) fn oldest(&self) -> usize {
        self.next(self.latest)
    }

    #[inline]
    pub(crate) fn get(&self, index: usize) -> &Message {
        &self.slots[index]
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, index: usize) -> &mut Message {
        &mut self.slots[index]
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Message> {
        self.slots.iter()
    }

    /// Slots from `from` up to and including the latest, in ring order.
    pub(crate) fn pending_from(&self, from: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut index = from;
        loop {
            out.push(index);
            if index == self.latest || out.len() == self.slots.len() {
                break;
            }
            index = self.next(index);
        }
        out
    }

    /// Id following `id`, skipping the invalid id on wrap.
    pub(crate) fn next_id(id: u64) -> u64 {
        match id.wrapping_add(1) {
            MESSAGE_ID_INVALID => MESSAGE_ID_INVALID.wrapping_add(1),
            next => next,
        }
    }
}
