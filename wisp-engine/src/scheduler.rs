// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! The discrete-event scheduler.
//!
//! Events are kept in a priority queue ordered by time. Events scheduled for
//! the same time are executed in the order in which they were scheduled.
//!
//! # Examples
//!
//! ```rust
//! use wisp_engine::scheduler::Scheduler;
//! use wisp_engine::time::SimTime;
//!
//! let mut scheduler = Scheduler::new();
//! let first = scheduler.schedule(SimTime::from_ns(10), "a");
//! scheduler.schedule(SimTime::from_ns(10), "b");
//! scheduler.cancel(first);
//! assert_eq!(scheduler.pop_next(), Some("b"));
//! assert_eq!(scheduler.now(), SimTime::from_ns(10));
//! ```

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::fmt;

use crate::sim_error;
use crate::time::SimTime;
use crate::types::SimResult;

/// Handle to a scheduled event which can be used to cancel it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EventId(u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ev{}", self.0)
    }
}

enum Slot<E> {
    Event(E),
    Stop,
}

struct Scheduled<E> {
    time: SimTime,
    seq: u64,
    slot: Slot<E>,
}

impl<E> PartialEq for Scheduled<E> {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl<E> Eq for Scheduled<E> {}

impl<E> PartialOrd for Scheduled<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Scheduled<E> {
    // Reversed so that the `BinaryHeap` pops the earliest (time, seq) first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A single global clock plus the queue of future events.
pub struct Scheduler<E> {
    now: SimTime,
    next_seq: u64,
    queue: BinaryHeap<Scheduled<E>>,
    pending: HashSet<u64>,
    stopped: bool,
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Scheduler<E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: SimTime::ZERO,
            next_seq: 0,
            queue: BinaryHeap::new(),
            pending: HashSet::new(),
            stopped: false,
        }
    }

    /// The current simulated time.
    #[must_use]
    pub fn now(&self) -> SimTime {
        self.now
    }

    fn push(&mut self, time: SimTime, slot: Slot<E>) -> EventId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Scheduled { time, seq, slot });
        self.pending.insert(seq);
        EventId(seq)
    }

    /// Schedule `event` to run `delay` after the current time.
    pub fn schedule(&mut self, delay: SimTime, event: E) -> EventId {
        let time = self.now + delay;
        self.push(time, Slot::Event(event))
    }

    /// Schedule `event` to run at the absolute time `time`.
    ///
    /// Returns an error if `time` is in the past.
    pub fn schedule_at(&mut self, time: SimTime, event: E) -> SimResult<EventId> {
        if time < self.now {
            return sim_error!("cannot schedule at {time}, current time is {}", self.now);
        }
        Ok(self.push(time, Slot::Event(event)))
    }

    /// Stop the simulation at the absolute time `time`.
    ///
    /// Events scheduled for the same time before this call still run.
    pub fn stop_at(&mut self, time: SimTime) -> SimResult<EventId> {
        if time < self.now {
            return sim_error!("cannot stop at {time}, current time is {}", self.now);
        }
        Ok(self.push(time, Slot::Stop))
    }

    /// Cancel a scheduled event.
    ///
    /// Returns `true` if the event was pending. Cancelling an event which has
    /// already fired or been cancelled does nothing.
    pub fn cancel(&mut self, id: EventId) -> bool {
        self.pending.remove(&id.0)
    }

    #[must_use]
    pub fn is_pending(&self, id: EventId) -> bool {
        self.pending.contains(&id.0)
    }

    /// Number of events still to run (including stop markers).
    #[must_use]
    pub fn num_pending(&self) -> usize {
        self.pending.len()
    }

    /// Whether a stop marker has been reached.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Advance time to the next live event and return it.
    ///
    /// Returns `None` once the queue is empty or a stop marker is reached.
    pub fn pop_next(&mut self) -> Option<E> {
        if self.stopped {
            return None;
        }
        while let Some(next) = self.queue.pop() {
            if !self.pending.remove(&next.seq) {
                // Cancelled
                continue;
            }
            self.now = next.time;
            match next.slot {
                Slot::Event(event) => return Some(event),
                Slot::Stop => {
                    self.stopped = true;
                    return None;
                }
            }
        }
        None
    }

    /// Drop every remaining event.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.pending.clear();
    }
}

/// Implemented by whatever owns the simulation state that events act upon.
pub trait EventHandler<E> {
    /// Process one event at `scheduler.now()`.
    fn handle(&mut self, scheduler: &mut Scheduler<E>, event: E) -> SimResult;
}
