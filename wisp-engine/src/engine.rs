// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use std::rc::Rc;

use wisp_track::entity::{Entity, toplevel};
use wisp_track::tracker::stdout_tracker;
use wisp_track::{Tracker, trace};

use crate::scheduler::{EventHandler, Scheduler};
use crate::time::SimTime;
use crate::types::SimResult;

/// Owns the top-level entity and the scheduler for one simulation.
pub struct Engine<E> {
    scheduler: Scheduler<E>,
    toplevel: Rc<Entity>,
    tracker: Tracker,
}

impl<E> Engine<E> {
    /// Create a standalone engine.
    pub fn new(tracker: &Tracker) -> Self {
        let toplevel = toplevel(tracker, "top");
        Self {
            scheduler: Scheduler::new(),
            toplevel,
            tracker: tracker.clone(),
        }
    }

    /// Run events until the queue is empty or a stop marker is reached.
    ///
    /// The first error returned by the handler ends the run.
    pub fn run(&mut self, handler: &mut impl EventHandler<E>) -> SimResult {
        let mut num_events: u64 = 0;
        while let Some(event) = self.scheduler.pop_next() {
            self.set_tracker_time();
            handler.handle(&mut self.scheduler, event)?;
            num_events += 1;
        }
        self.set_tracker_time();
        trace!(self.toplevel ; "ran {num_events} events, finished at {}", self.time_now());
        Ok(())
    }

    fn set_tracker_time(&self) {
        self.tracker
            .time(self.toplevel.id, self.scheduler.now().as_ns() as f64);
    }

    pub fn scheduler(&self) -> &Scheduler<E> {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler<E> {
        &mut self.scheduler
    }

    pub fn time_now(&self) -> SimTime {
        self.scheduler.now()
    }

    pub fn time_now_ns(&self) -> f64 {
        self.scheduler.now().as_ns() as f64
    }

    pub fn top(&self) -> &Rc<Entity> {
        &self.toplevel
    }

    pub fn tracker(&self) -> Tracker {
        self.tracker.clone()
    }
}

/// Create a default engine that sends [`Track`](wisp_track::Track) events to
/// stdout.
///
/// This is provided to keep documentation examples simple with fewer
/// concepts to have to consider at once.
impl<E> Default for Engine<E> {
    fn default() -> Self {
        let tracker = stdout_tracker(log::Level::Warn);
        Self::new(&tracker)
    }
}
