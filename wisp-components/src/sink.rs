// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! A passive packet sink.
//!
//! While active the sink counts every datagram delivered to its port. The
//! counts live in a shared [`SinkStats`] so they can be read after the sink
//! itself has been handed to the host. Only the first [`MAX_SAMPLES`]
//! payloads are kept.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::rc::Rc;

use wisp_engine::time::SimTime;
use wisp_engine::types::SimResult;
use wisp_models::datagram::Datagram;
use wisp_models::transport::{DatagramStack, UdpSocket};
use wisp_track::entity::{Entity, GetEntity};
use wisp_track::{enter, info, warn};

use crate::traffic_gen::MESSAGE;
use crate::{Application, Next};

/// Number of payloads a sink keeps for inspection.
pub const MAX_SAMPLES: usize = 16;

/// Counts of what a [`PacketSink`] has received.
pub struct SinkStats {
    port: u16,
    num_datagrams: Cell<usize>,
    num_bytes: Cell<usize>,
    num_with_message: Cell<usize>,
    samples: RefCell<Vec<Rc<[u8]>>>,
}

impl SinkStats {
    fn new(port: u16) -> Self {
        Self {
            port,
            num_datagrams: Cell::new(0),
            num_bytes: Cell::new(0),
            num_with_message: Cell::new(0),
            samples: RefCell::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn num_datagrams(&self) -> usize {
        self.num_datagrams.get()
    }

    /// Payload bytes received.
    #[must_use]
    pub fn num_bytes(&self) -> usize {
        self.num_bytes.get()
    }

    /// Datagrams whose payload starts with [`MESSAGE`].
    #[must_use]
    pub fn num_with_message(&self) -> usize {
        self.num_with_message.get()
    }

    /// The first [`MAX_SAMPLES`] payloads received, in arrival order.
    #[must_use]
    pub fn samples(&self) -> Vec<Rc<[u8]>> {
        self.samples.borrow().clone()
    }
}

impl fmt::Display for SinkStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "port {}: {} datagrams, {} bytes",
            self.port,
            self.num_datagrams(),
            self.num_bytes()
        )
    }
}

pub struct PacketSink {
    pub entity: Rc<Entity>,
    socket: UdpSocket,
    local: SocketAddrV4,
    active: bool,
    stats: Rc<SinkStats>,
}

impl PacketSink {
    /// Create a sink that will listen on `0.0.0.0:port`.
    #[must_use]
    pub fn new(parent: &Rc<Entity>, name: &str, port: u16) -> Self {
        let entity = Rc::new(Entity::new(parent, name));
        let socket = UdpSocket::new(&entity, "socket");
        Self {
            entity,
            socket,
            local: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port),
            active: false,
            stats: Rc::new(SinkStats::new(port)),
        }
    }

    #[must_use]
    pub fn stats(&self) -> Rc<SinkStats> {
        self.stats.clone()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Application for PacketSink {
    fn activate(&mut self, now: SimTime, stack: &mut dyn DatagramStack) -> SimResult<Next> {
        match self.socket.bind(stack, self.local) {
            Ok(bound) => {
                self.active = true;
                info!(self.entity ; "listening on {bound} from {now}");
            }
            Err(error) => {
                warn!(self.entity ; "unable to listen on {}: {error}", self.local);
                stack.report_failure(&self.entity, &error);
            }
        }
        Ok(Next::Done)
    }

    fn fire(&mut self, _now: SimTime, _stack: &mut dyn DatagramStack) -> SimResult<Next> {
        Ok(Next::Done)
    }

    fn deactivate(&mut self, now: SimTime, stack: &mut dyn DatagramStack) -> SimResult {
        if self.active {
            info!(self.entity ; "stopped at {now}: {}", self.stats);
        }
        self.active = false;
        self.socket.close(stack);
        Ok(())
    }

    fn receive(&mut self, _now: SimTime, datagram: &Datagram) {
        if !self.active {
            return;
        }
        enter!(self.entity ; datagram.id());
        let stats = &self.stats;
        stats.num_datagrams.set(stats.num_datagrams.get() + 1);
        let payload = datagram.payload();
        stats.num_bytes.set(stats.num_bytes.get() + payload.len());
        if payload.starts_with(MESSAGE) {
            stats.num_with_message.set(stats.num_with_message.get() + 1);
        }
        let mut samples = stats.samples.borrow_mut();
        if samples.len() < MAX_SAMPLES {
            samples.push(payload.clone());
        }
    }
}

impl GetEntity for PacketSink {
    fn entity(&self) -> &Rc<Entity> {
        &self.entity
    }
}

#[cfg(test)]
mod tests {
    use wisp_models::test_helpers::RecordingStack;
    use wisp_track::Id;
    use wisp_track::entity::toplevel;
    use wisp_track::tracker::dev_null_tracker;

    use super::*;

    fn datagram(id: u64) -> Datagram {
        Datagram::new(
            Id(id),
            SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 1), 49153),
            SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 2), 9),
            Rc::from(&b"Hello world"[..]),
        )
    }

    #[test]
    fn counts_only_while_active() {
        let top = toplevel(&dev_null_tracker(), "top");
        let mut stack = RecordingStack::new(Ipv4Addr::new(10, 2, 0, 2));
        let mut sink = PacketSink::new(&top, "sink9", 9);
        let stats = sink.stats();

        sink.receive(SimTime::ZERO, &datagram(1));
        assert_eq!(stats.num_datagrams(), 0);

        assert_eq!(sink.activate(SimTime::ZERO, &mut stack).unwrap(), Next::Done);
        assert!(stack.is_bound(9));
        sink.receive(SimTime::ZERO, &datagram(2));
        sink.receive(SimTime::ZERO, &datagram(3));
        assert_eq!(stats.num_datagrams(), 2);
        assert_eq!(stats.num_bytes(), 22);

        sink.deactivate(SimTime::from_millis(1), &mut stack).unwrap();
        assert!(!stack.is_bound(9));
        sink.receive(SimTime::from_millis(2), &datagram(4));
        assert_eq!(stats.num_datagrams(), 2);
        assert_eq!(stats.to_string(), "port 9: 2 datagrams, 22 bytes");
    }

    #[test]
    fn samples_are_bounded() {
        let top = toplevel(&dev_null_tracker(), "top");
        let mut stack = RecordingStack::new(Ipv4Addr::new(10, 2, 0, 2));
        let mut sink = PacketSink::new(&top, "sink9", 9);
        let stats = sink.stats();
        sink.activate(SimTime::ZERO, &mut stack).unwrap();

        let num_datagrams = MAX_SAMPLES as u64 * 3;
        for id in 0..num_datagrams {
            sink.receive(SimTime::ZERO, &datagram(id));
        }
        let other = Datagram::new(
            Id(num_datagrams),
            SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 1), 49153),
            SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 2), 9),
            Rc::from(&b"Goodbye"[..]),
        );
        sink.receive(SimTime::ZERO, &other);

        assert_eq!(stats.num_datagrams(), num_datagrams as usize + 1);
        assert_eq!(stats.num_with_message(), num_datagrams as usize);
        assert_eq!(stats.samples().len(), MAX_SAMPLES);
        assert_eq!(&*stats.samples()[0], MESSAGE);
    }

    #[test]
    fn port_in_use_is_reported() {
        let top = toplevel(&dev_null_tracker(), "top");
        let mut stack = RecordingStack::new(Ipv4Addr::new(10, 2, 0, 2));
        let mut first = PacketSink::new(&top, "first", 9);
        let mut second = PacketSink::new(&top, "second", 9);
        first.activate(SimTime::ZERO, &mut stack).unwrap();
        second.activate(SimTime::ZERO, &mut stack).unwrap();
        assert!(first.is_active());
        assert!(!second.is_active());
        assert_eq!(stack.failures().len(), 1);
        assert_eq!(stack.failures()[0].0, "top::second");
    }
}
