// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Three-tier request queue.
//!
//! ```text
//! front                                                       back
//!   | HRT (earliest deadline first) | SRT/FRT (FIFO) | NRT (FIFO) |
//!                          hrt_back ^       fsrt_back ^
//! ```
//!
//! Entries live in an arena and link to each other by index. Order is kept
//! purely by where each push inserts; nothing is ever sorted. A removed
//! entry's slot is reused under a new ticket, so stale [`QueueSlot`]s are
//! rejected.

use std::time::Instant;

/// Handle of a queued entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueSlot {
    index: usize,
    ticket: u64,
}

/// Queue tier of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Hrt,
    Fsrt,
    Nrt,
}

/// Number of queued entries per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueLengths {
    pub hrt: usize,
    pub fsrt: usize,
    pub nrt: usize,
}

impl QueueLengths {
    pub fn total(&self) -> usize {
        self.hrt + self.fsrt + self.nrt
    }
}

#[derive(Debug)]
struct Entry<T> {
    value: Option<T>,
    prev: Option<usize>,
    next: Option<usize>,
    tier: Tier,
    /// Absolute deadline of a hard entry, `None` meaning infinite.
    deadline: Option<Instant>,
    ticket: u64,
}

/// Request queue with a hard, a soft/firm and a best-effort tier.
#[derive(Debug)]
pub struct RequestQueue<T> {
    entries: Vec<Entry<T>>,
    free: Vec<usize>,
    front: Option<usize>,
    back: Option<usize>,
    hrt_back: Option<usize>,
    fsrt_back: Option<usize>,
    next_ticket: u64,
    len: usize,
}

impl<T> Default for RequestQueue<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            front: None,
            back: None,
            hrt_back: None,
            fsrt_back: None,
            next_ticket: 0,
            len: 0,
        }
    }
}

impl<T> RequestQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append at the very end.
    pub fn push_nrt(&mut self, value: T) -> QueueSlot {
        let index = self.alloc(value, Tier::Nrt, None);
        self.link_after(index, self.back);
        self.slot(index)
    }

    /// Insert after the last soft/firm entry, else after the last hard one,
    /// else at the front.
    pub fn push_fsrt(&mut self, value: T) -> QueueSlot {
        let index = self.alloc(value, Tier::Fsrt, None);
        self.link_after(index, self.fsrt_back.or(self.hrt_back));
        self.fsrt_back = Some(index);
        self.slot(index)
    }

    /// Insert into the hard tier before the first entry with a later deadline.
    ///
    /// `None` is an infinite deadline: the entry goes to the end of the tier.
    pub fn push_hrt(&mut self, value: T, deadline: Option<Instant>) -> QueueSlot {
        let index = self.alloc(value, Tier::Hrt, deadline);

        let mut after = None;
        let mut cursor = self.front;
        while let Some(current) = cursor {
            let entry = &self.entries[current];
            if entry.tier != Tier::Hrt || runs_out_later(entry.deadline, deadline) {
                break;
            }
            after = Some(current);
            if Some(current) == self.hrt_back {
                break;
            }
            cursor = entry.next;
        }

        self.link_after(index, after);
        if after == self.hrt_back {
            self.hrt_back = Some(index);
        }
        self.slot(index)
    }

    /// Remove and return the front entry.
    pub fn pop_front(&mut self) -> Option<(QueueSlot, T)> {
        let index = self.front?;
        let slot = self.slot(index);
        self.take(index).map(|value| (slot, value))
    }

    /// Front entry without removing it.
    pub fn peek_front(&self) -> Option<&T> {
        self.front.and_then(|index| self.entries[index].value.as_ref())
    }

    /// Remove the entry at `slot`. `None` if it is no longer queued.
    pub fn remove(&mut self, slot: QueueSlot) -> Option<T> {
        let entry = self.entries.get(slot.index)?;
        if entry.ticket != slot.ticket || entry.value.is_none() {
            return None;
        }
        self.take(slot.index)
    }

    /// Whether `slot` is still queued.
    pub fn contains(&self, slot: QueueSlot) -> bool {
        self.entries
            .get(slot.index)
            .is_some_and(|e| e.ticket == slot.ticket && e.value.is_some())
    }

    pub fn lengths(&self) -> QueueLengths {
        let mut lengths = QueueLengths::default();
        for (tier, _) in self.iter_tiers() {
            match tier {
                Tier::Hrt => lengths.hrt += 1,
                Tier::Fsrt => lengths.fsrt += 1,
                Tier::Nrt => lengths.nrt += 1,
            }
        }
        lengths
    }

    /// Entries in service order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.iter_tiers().map(|(_, value)| value)
    }

    /// Entries in service order, with their tier.
    pub fn iter_tiers(&self) -> Iter<'_, T> {
        Iter {
            queue: self,
            cursor: self.front,
        }
    }

    fn slot(&self, index: usize) -> QueueSlot {
        QueueSlot {
            index,
            ticket: self.entries[index].ticket,
        }
    }

    fn alloc(&mut self, value: T, tier: Tier, deadline: Option<Instant>) -> usize {
        let ticket = self.next_ticket;
        self.next_ticket = self.next_ticket.wrapping_add(1);
        self.len += 1;
        let entry = Entry {
            value: Some(value),
            prev: None,
            next: None,
            tier,
            deadline,
            ticket,
        };
        match self.free.pop() {
            Some(index) => {
                self.entries[index] = entry;
                index
            }
            None => {
                self.entries.push(entry);
                self.entries.len() - 1
            }
        }
    }

    /// Link `index` after `after`, or at the front for `None`.
    fn link_after(&mut self, index: usize, after: Option<usize>) {
        let next = match after {
            Some(a) => self.entries[a].next,
            None => self.front,
        };
        self.entries[index].prev = after;
        self.entries[index].next = next;
        match after {
            Some(a) => self.entries[a].next = Some(index),
            None => self.front = Some(index),
        }
        match next {
            Some(n) => self.entries[n].prev = Some(index),
            None => self.back = Some(index),
        }
    }

    fn take(&mut self, index: usize) -> Option<T> {
        let (prev, next) = (self.entries[index].prev, self.entries[index].next);

        match prev {
            Some(p) => self.entries[p].next = next,
            None => self.front = next,
        }
        match next {
            Some(n) => self.entries[n].prev = prev,
            None => self.back = prev,
        }
        if self.hrt_back == Some(index) {
            self.hrt_back = prev;
        } else if self.fsrt_back == Some(index) {
            self.fsrt_back = prev.filter(|&p| self.entries[p].tier == Tier::Fsrt);
        }

        let entry = &mut self.entries[index];
        entry.prev = None;
        entry.next = None;
        let value = entry.value.take();
        if value.is_some() {
            self.len -= 1;
            self.free.push(index);
        }
        value
    }
}

/// A hard entry with deadline `existing` is served after one with `new`.
fn runs_out_later(existing: Option<Instant>, new: Option<Instant>) -> bool {
    match (existing, new) {
        (Some(existing), Some(new)) => existing > new,
        (None, Some(_)) => true,
        (_, None) => false,
    }
}

/// Iterator over a [`RequestQueue`] in service order.
pub struct Iter<'a, T> {
    queue: &'a RequestQueue<T>,
    cursor: Option<usize>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (Tier, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(index) = self.cursor {
            let entry = &self.queue.entries[index];
            self.cursor = entry.next;
            if let Some(value) = entry.value.as_ref() {
                return Some((entry.tier, value));
            }
        }
        None
    }
}
