// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One-shot and periodic timers fired from a single background thread.
//!
//! Every [`Timer`] belongs to a [`TimerService`]. Arming sends a command over
//! a crossbeam channel; the service thread keeps armed entries in a min-heap
//! and sleeps on `recv_deadline` until the earliest one is due.
//!
//! Each arm bumps the timer's generation and the callback receives the
//! generation it was armed with. A reset only bumps the generation, so an
//! entry still queued in the heap becomes stale and is dropped when popped.
//! Owners that record the generation under their own lock can also detect a
//! fire that raced a concurrent reset.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Callback invoked on the timer thread with the firing generation.
pub type TimerCallback = Box<dyn Fn(u64) + Send + Sync>;

struct TimerSlot {
    generation: AtomicU64,
    callback: TimerCallback,
}

enum Command {
    Arm {
        slot: Arc<TimerSlot>,
        at: Instant,
        period: Option<Duration>,
        generation: u64,
    },
    Shutdown,
}

struct Entry {
    at: Instant,
    seq: u64,
    slot: Arc<TimerSlot>,
    period: Option<Duration>,
    generation: u64,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed: BinaryHeap is a max-heap, earliest entry must surface first.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Background thread firing [`Timer`] callbacks.
///
/// When dropped, signals the thread to stop and joins it.
pub struct TimerService {
    tx: Sender<Command>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl TimerService {
    /// Spawn the timer thread.
    pub fn spawn(name: &str) -> crate::Result<Self> {
        let (tx, rx) = channel::unbounded();
        let thread_name = name.to_string();
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(&thread_name, &rx))?;
        Ok(Self {
            tx,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Create a timer firing `callback` on this service.
    pub fn timer<F>(&self, callback: F) -> Timer
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        Timer {
            slot: Arc::new(TimerSlot {
                generation: AtomicU64::new(0),
                callback: Box::new(callback),
            }),
            tx: self.tx.clone(),
        }
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Some(handle) = self.thread.lock().take() {
            // The last owner may be released by a callback on the timer thread itself.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

fn run(name: &str, rx: &Receiver<Command>) {
    log::debug!("[{}] Started", name);
    let mut heap: BinaryHeap<Entry> = BinaryHeap::new();
    let mut seq: u64 = 0;

    loop {
        let command = match heap.peek() {
            Some(next) => match rx.recv_deadline(next.at) {
                Ok(cmd) => Some(cmd),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match rx.recv() {
                Ok(cmd) => Some(cmd),
                Err(_) => break,
            },
        };

        match command {
            Some(Command::Arm {
                slot,
                at,
                period,
                generation,
            }) => {
                seq = seq.wrapping_add(1);
                heap.push(Entry {
                    at,
                    seq,
                    slot,
                    period,
                    generation,
                });
            }
            Some(Command::Shutdown) => break,
            None => {}
        }

        let now = Instant::now();
        while heap.peek().is_some_and(|e| e.at <= now) {
            let Some(entry) = heap.pop() else { break };
            if entry.slot.generation.load(Ordering::Acquire) != entry.generation {
                continue;
            }
            (entry.slot.callback)(entry.generation);

            if let Some(period) = entry.period {
                if entry.slot.generation.load(Ordering::Acquire) == entry.generation {
                    seq = seq.wrapping_add(1);
                    heap.push(Entry {
                        at: entry.at + period,
                        seq,
                        slot: entry.slot,
                        period: entry.period,
                        generation: entry.generation,
                    });
                }
            }
        }
    }

    log::debug!("[{}] Stopped ({} timers pending)", name, heap.len());
}

/// Timer handle.
///
/// Dropping the handle cancels any pending fire.
pub struct Timer {
    slot: Arc<TimerSlot>,
    tx: Sender<Command>,
}

impl Timer {
    /// Arm a one-shot fire at `at`, replacing any previous arm.
    ///
    /// Returns the generation the callback will receive.
    pub fn set_at(&self, at: Instant) -> u64 {
        self.arm(at, None)
    }

    /// Fire every `period`, starting one period from now.
    pub fn set_periodic(&self, period: Duration) -> u64 {
        self.arm(Instant::now() + period, Some(period))
    }

    /// Cancel any pending fire.
    pub fn reset(&self) {
        self.slot.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Generation of the latest arm or reset.
    pub fn generation(&self) -> u64 {
        self.slot.generation.load(Ordering::Acquire)
    }

    fn arm(&self, at: Instant, period: Option<Duration>) -> u64 {
        let generation = self.slot.generation.fetch_add(1, Ordering::AcqRel) + 1;
        if self
            .tx
            .send(Command::Arm {
                slot: Arc::clone(&self.slot),
                at,
                period,
                generation,
            })
            .is_err()
        {
            log::debug!("[urt-timer] Arm ignored, timer thread stopped");
        }
        generation
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.reset();
    }
}
