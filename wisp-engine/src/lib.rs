// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

#![doc(test(attr(warn(unused))))]

//! `WISP` - The Wireless Interconnect Simulation Platform
//!
//! This library provides the core of the [WISP Engine](crate::engine) which
//! executes discrete-event simulations. Unlike a free-running executor, every
//! action is an explicit event value held by the
//! [Scheduler](crate::scheduler::Scheduler) and dispatched to an
//! [EventHandler](crate::scheduler::EventHandler) that owns the model state.
//!
//! # Simple Application
//!
//! A very simple application would look like:
//!
//! ```rust
//! use wisp_engine::engine::Engine;
//! use wisp_engine::scheduler::{EventHandler, Scheduler};
//! use wisp_engine::time::SimTime;
//! use wisp_engine::types::SimResult;
//!
//! struct Ticker {
//!     ticks: usize,
//! }
//!
//! impl EventHandler<()> for Ticker {
//!     fn handle(&mut self, scheduler: &mut Scheduler<()>, _event: ()) -> SimResult {
//!         self.ticks += 1;
//!         if self.ticks < 10 {
//!             scheduler.schedule(SimTime::from_millis(1), ());
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let mut engine = Engine::default();
//! engine.scheduler_mut().schedule(SimTime::ZERO, ());
//! let mut ticker = Ticker { ticks: 0 };
//! engine.run(&mut ticker).unwrap();
//! assert_eq!(ticker.ticks, 10);
//! assert_eq!(engine.time_now(), SimTime::from_millis(9));
//! ```
//!
//! Simulated time is held as an integer number of nanoseconds
//! ([SimTime](crate::time::SimTime)) and events at equal times run in the
//! order in which they were scheduled.

pub mod engine;
pub mod scheduler;
pub mod test_helpers;
pub mod time;
pub mod types;
