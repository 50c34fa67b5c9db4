// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Applications that run on simulated nodes.
//!
//! An [`Application`] never schedules events itself. The host calls
//! [`activate`](Application::activate) at the start time and then
//! [`fire`](Application::fire) each time the delay returned in [`Next`]
//! elapses. The host keeps the handle of the single pending timer and
//! cancels it on [`deactivate`](Application::deactivate).

use wisp_engine::time::SimTime;
use wisp_engine::types::SimResult;
use wisp_models::datagram::Datagram;
use wisp_models::transport::DatagramStack;
use wisp_track::entity::GetEntity;

pub mod sink;
pub mod traffic_gen;

/// What an application wants to happen after it has run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Next {
    /// Call [`Application::fire`] again after this delay.
    After(SimTime),
    /// Nothing more to do until deactivated.
    Done,
}

/// The lifecycle interface of every application.
pub trait Application: GetEntity {
    /// Start running at the application's start time.
    fn activate(&mut self, now: SimTime, stack: &mut dyn DatagramStack) -> SimResult<Next>;

    /// The timer requested by the previous [`Next::After`] has expired.
    fn fire(&mut self, now: SimTime, stack: &mut dyn DatagramStack) -> SimResult<Next>;

    /// Stop running. Must be safe to call more than once.
    fn deactivate(&mut self, now: SimTime, stack: &mut dyn DatagramStack) -> SimResult;

    /// A datagram has arrived for an address this application bound.
    fn receive(&mut self, _now: SimTime, _datagram: &Datagram) {}
}
