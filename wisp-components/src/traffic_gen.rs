// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! A rate-controlled traffic generator.
//!
//! The generator owns one outbound flow: a socket connected to a single peer
//! over which it sends `packet_count` payloads of `packet_size` bytes, one
//! every `packet_size * 8 / data_rate` seconds. The first payload is sent
//! as soon as the generator is activated.
//!
//! ```text
//! Unconfigured --configure--> Idle --activate--> Active --last send--> Terminated
//!                               |                  |                      ^
//!                               +----deactivate----+------deactivate------+
//! ```

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::rc::Rc;

use wisp_engine::sim_error;
use wisp_engine::time::SimTime;
use wisp_engine::types::SimResult;
use wisp_models::data_rate::DataRate;
use wisp_models::transport::{DatagramStack, TransportError, UdpSocket};
use wisp_track::entity::{Entity, GetEntity};
use wisp_track::{debug, info, trace, warn};

use crate::{Application, Next};

/// The message carried in every payload.
pub const MESSAGE: &[u8] = b"Hello world";

/// Build a payload of exactly `packet_size` bytes from [`MESSAGE`],
/// truncated or padded with zeros.
#[must_use]
pub fn build_payload(packet_size: usize) -> Rc<[u8]> {
    let mut payload = vec![0; packet_size];
    let len = MESSAGE.len().min(packet_size);
    payload[..len].copy_from_slice(&MESSAGE[..len]);
    Rc::from(payload)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeneratorState {
    Unconfigured,
    Idle,
    Active,
    Terminated,
}

impl fmt::Display for GeneratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

struct Flow {
    socket: UdpSocket,
    peer: SocketAddrV4,
    payload: Rc<[u8]>,
    remaining: u64,
    interval: SimTime,
}

pub struct TrafficGenerator {
    pub entity: Rc<Entity>,
    state: GeneratorState,
    flow: Option<Flow>,
    num_sent: u64,
    num_failed: u64,
}

impl TrafficGenerator {
    #[must_use]
    pub fn new(parent: &Rc<Entity>, name: &str) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, name)),
            state: GeneratorState::Unconfigured,
            flow: None,
            num_sent: 0,
            num_failed: 0,
        }
    }

    /// One-time setup of the flow.
    ///
    /// The socket is connected to `peer` straight away.
    pub fn configure(
        &mut self,
        mut socket: UdpSocket,
        peer: SocketAddrV4,
        packet_size: usize,
        packet_count: u64,
        data_rate: DataRate,
    ) -> SimResult {
        if self.state != GeneratorState::Unconfigured {
            return sim_error!("{}: already configured ({})", self.entity, self.state);
        }
        if packet_size == 0 {
            return sim_error!("{}: packet size must be non-zero", self.entity);
        }
        if packet_count == 0 {
            return sim_error!("{}: packet count must be non-zero", self.entity);
        }
        if data_rate.bps() == 0 {
            return sim_error!("{}: data rate must be non-zero", self.entity);
        }

        socket.connect(peer);
        let interval = data_rate.tx_time(packet_size);
        debug!(self.entity ; "{packet_count} x {packet_size} bytes to {peer} every {interval}");
        self.flow = Some(Flow {
            socket,
            peer,
            payload: build_payload(packet_size),
            remaining: packet_count,
            interval,
        });
        self.state = GeneratorState::Idle;
        Ok(())
    }

    #[must_use]
    pub fn state(&self) -> GeneratorState {
        self.state
    }

    /// Payloads handed to the transport successfully.
    #[must_use]
    pub fn num_sent(&self) -> u64 {
        self.num_sent
    }

    /// Payloads the transport refused.
    #[must_use]
    pub fn num_failed(&self) -> u64 {
        self.num_failed
    }

    /// Payloads still to send.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.flow.as_ref().map_or(0, |flow| flow.remaining)
    }

    /// Delay between consecutive sends.
    #[must_use]
    pub fn interval(&self) -> Option<SimTime> {
        self.flow.as_ref().map(|flow| flow.interval)
    }

    #[must_use]
    pub fn peer(&self) -> Option<SocketAddrV4> {
        self.flow.as_ref().map(|flow| flow.peer)
    }

    fn transport_failure(&mut self, stack: &mut dyn DatagramStack, error: &TransportError) {
        self.num_failed += 1;
        warn!(self.entity ; "transport failure: {error}");
        stack.report_failure(&self.entity, error);
    }

    fn send_one(&mut self, now: SimTime, stack: &mut dyn DatagramStack) -> SimResult<Next> {
        let Some(flow) = self.flow.as_mut() else {
            return sim_error!("{}: active without a flow", self.entity);
        };

        let result = flow.socket.send(stack, flow.payload.clone());
        flow.remaining -= 1;
        let remaining = flow.remaining;
        let interval = flow.interval;

        match result {
            Ok(id) => {
                self.num_sent += 1;
                trace!(self.entity ; "sent {id} at {now}, {remaining} left");
            }
            Err(error) => self.transport_failure(stack, &error),
        }

        if remaining == 0 {
            self.state = GeneratorState::Terminated;
            info!(self.entity ; "finished at {now}: {} sent, {} failed", self.num_sent, self.num_failed);
            Ok(Next::Done)
        } else {
            Ok(Next::After(interval))
        }
    }
}

impl Application for TrafficGenerator {
    fn activate(&mut self, now: SimTime, stack: &mut dyn DatagramStack) -> SimResult<Next> {
        match self.state {
            GeneratorState::Idle => {}
            GeneratorState::Unconfigured => {
                return sim_error!("{}: activated before being configured", self.entity);
            }
            state => return sim_error!("{}: cannot activate when {state}", self.entity),
        }

        let Some(flow) = self.flow.as_mut() else {
            return sim_error!("{}: idle without a flow", self.entity);
        };
        let any = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
        let bind_result = flow.socket.bind(stack, any);
        flow.socket.connect(flow.peer);
        if let Err(error) = bind_result {
            self.transport_failure(stack, &error);
        }

        self.state = GeneratorState::Active;
        info!(self.entity ; "started at {now}");
        self.send_one(now, stack)
    }

    fn fire(&mut self, now: SimTime, stack: &mut dyn DatagramStack) -> SimResult<Next> {
        if self.state != GeneratorState::Active {
            debug!(self.entity ; "timer fired when {}", self.state);
            return Ok(Next::Done);
        }
        self.send_one(now, stack)
    }

    fn deactivate(&mut self, now: SimTime, stack: &mut dyn DatagramStack) -> SimResult {
        match self.state {
            GeneratorState::Unconfigured => {}
            GeneratorState::Idle | GeneratorState::Active => {
                info!(self.entity ; "stopped at {now} with {} left", self.remaining());
                self.state = GeneratorState::Terminated;
            }
            GeneratorState::Terminated => {}
        }
        if let Some(flow) = self.flow.as_mut() {
            flow.socket.close(stack);
        }
        Ok(())
    }
}

impl GetEntity for TrafficGenerator {
    fn entity(&self) -> &Rc<Entity> {
        &self.entity
    }
}

impl fmt::Display for TrafficGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.entity)
    }
}
