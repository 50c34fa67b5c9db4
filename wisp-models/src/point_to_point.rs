// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Point-to-point link with two ends (0 & 1).
//!
//! Each end is a [`PointToPointDevice`] with its own drop-tail transmit queue.
//! A device serialises one datagram at a time at the link data rate and the
//! datagram arrives at the other end after the link delay.
//!
//! The device does not schedule anything itself: [`PointToPointDevice::enqueue`]
//! and [`PointToPointDevice::transmit_complete`] return the [`Transmission`]
//! that has just started so that the owner can schedule the completion and
//! arrival events.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::net::Ipv4Addr;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use wisp_engine::sim_error;
use wisp_engine::time::SimTime;
use wisp_engine::types::SimResult;
use wisp_track::entity::{Entity, GetEntity};
use wisp_track::{enter, exit, trace};

use crate::address::Ipv4Network;
use crate::capture::{Capture, CaptureEvent};
use crate::data_rate::DataRate;
use crate::datagram::Datagram;

// Default values for a point-to-point link
pub const DEFAULT_DATA_RATE: DataRate = DataRate::from_mbps(5);
pub const DEFAULT_DELAY_MS: u64 = 2;
pub const DEFAULT_QUEUE_PACKETS: usize = 100;

/// Link parameters shared by both ends.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointToPointConfig {
    pub data_rate: DataRate,
    pub delay_ms: u64,
    pub queue_packets: usize,
}

impl Default for PointToPointConfig {
    fn default() -> Self {
        Self {
            data_rate: DEFAULT_DATA_RATE,
            delay_ms: DEFAULT_DELAY_MS,
            queue_packets: DEFAULT_QUEUE_PACKETS,
        }
    }
}

impl PointToPointConfig {
    pub fn validate(&self) -> SimResult {
        if self.queue_packets == 0 {
            return sim_error!("point-to-point queue must hold at least one packet");
        }
        Ok(())
    }

    #[must_use]
    pub fn delay(&self) -> SimTime {
        SimTime::from_millis(self.delay_ms)
    }
}

/// Identifies one end of one link.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId {
    pub link: usize,
    pub end: usize,
}

impl DeviceId {
    /// The device at the other end of the same link.
    #[must_use]
    pub fn peer(&self) -> DeviceId {
        DeviceId {
            link: self.link,
            end: 1 - self.end,
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link{}.{}", self.link, self.end)
    }
}

/// A datagram that has started serialisation onto the link.
#[derive(Clone, Debug)]
pub struct Transmission {
    pub datagram: Datagram,
    /// When the device becomes free again.
    pub complete_at: SimTime,
    /// When the datagram reaches the peer device.
    pub arrive_at: SimTime,
}

/// What happened to an enqueued datagram.
#[derive(Debug)]
pub enum EnqueueResult {
    /// The device was idle and started transmitting straight away.
    Started(Transmission),
    /// Waiting behind other datagrams.
    Queued,
    /// The queue was full.
    Dropped,
}

/// Per-device packet and byte counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceCounters {
    pub tx_packets: usize,
    pub tx_bytes: usize,
    pub rx_packets: usize,
    pub rx_bytes: usize,
    pub drops: usize,
}

struct DeviceState {
    queue: VecDeque<Datagram>,
    transmitting: bool,
    counters: DeviceCounters,
}

/// One end of a point-to-point link.
pub struct PointToPointDevice {
    pub entity: Rc<Entity>,
    id: DeviceId,
    config: PointToPointConfig,
    address: Cell<Option<(Ipv4Addr, Ipv4Network)>>,
    state: RefCell<DeviceState>,
    captures: RefCell<Vec<Rc<dyn Capture>>>,
}

impl PointToPointDevice {
    fn new(parent: &Rc<Entity>, id: DeviceId, config: PointToPointConfig) -> Rc<Self> {
        let entity = Rc::new(Entity::new(parent, &format!("dev{}", id.end)));
        Rc::new(Self {
            entity,
            id,
            config,
            address: Cell::new(None),
            state: RefCell::new(DeviceState {
                queue: VecDeque::new(),
                transmitting: false,
                counters: DeviceCounters::default(),
            }),
            captures: RefCell::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Attach a capture which will see every subsequent device event.
    pub fn attach_capture(&self, capture: Rc<dyn Capture>) {
        self.captures.borrow_mut().push(capture);
    }

    pub fn set_address(&self, address: Ipv4Addr, network: Ipv4Network) {
        self.address.set(Some((address, network)));
    }

    #[must_use]
    pub fn address(&self) -> Option<Ipv4Addr> {
        self.address.get().map(|(addr, _)| addr)
    }

    #[must_use]
    pub fn network(&self) -> Option<Ipv4Network> {
        self.address.get().map(|(_, net)| net)
    }

    #[must_use]
    pub fn counters(&self) -> DeviceCounters {
        self.state.borrow().counters
    }

    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.state.borrow().queue.len()
    }

    fn capture(&self, event: CaptureEvent, now: SimTime, datagram: &Datagram) {
        let name = self.entity.full_name();
        for capture in self.captures.borrow().iter() {
            capture.record(event, now, &name, datagram);
        }
    }

    fn start(&self, state: &mut DeviceState, now: SimTime) -> Option<Transmission> {
        let datagram = state.queue.pop_front()?;
        self.capture(CaptureEvent::Dequeue, now, &datagram);
        exit!(self.entity ; datagram.id());

        let bytes = datagram.wire_bytes();
        state.transmitting = true;
        state.counters.tx_packets += 1;
        state.counters.tx_bytes += bytes;

        let complete_at = now + self.config.data_rate.tx_time(bytes);
        Some(Transmission {
            datagram,
            complete_at,
            arrive_at: complete_at + self.config.delay(),
        })
    }

    /// Offer a datagram for transmission.
    pub fn enqueue(&self, now: SimTime, datagram: Datagram) -> EnqueueResult {
        let mut state = self.state.borrow_mut();
        if state.queue.len() >= self.config.queue_packets {
            state.counters.drops += 1;
            trace!(self.entity ; "queue full, drop {}", datagram.id());
            self.capture(CaptureEvent::Drop, now, &datagram);
            return EnqueueResult::Dropped;
        }

        enter!(self.entity ; datagram.id());
        self.capture(CaptureEvent::Enqueue, now, &datagram);
        state.queue.push_back(datagram);

        if state.transmitting {
            return EnqueueResult::Queued;
        }
        match self.start(&mut state, now) {
            Some(tx) => EnqueueResult::Started(tx),
            None => EnqueueResult::Queued,
        }
    }

    /// The current transmission has finished; start the next one if any.
    pub fn transmit_complete(&self, now: SimTime) -> Option<Transmission> {
        let mut state = self.state.borrow_mut();
        state.transmitting = false;
        self.start(&mut state, now)
    }

    /// A datagram has arrived from the peer.
    pub fn receive(&self, now: SimTime, datagram: &Datagram) {
        {
            let mut state = self.state.borrow_mut();
            state.counters.rx_packets += 1;
            state.counters.rx_bytes += datagram.wire_bytes();
        }
        self.capture(CaptureEvent::Receive, now, datagram);
    }

    /// Flush every attached capture.
    pub fn flush_captures(&self) {
        for capture in self.captures.borrow().iter() {
            capture.flush();
        }
    }
}

impl GetEntity for PointToPointDevice {
    fn entity(&self) -> &Rc<Entity> {
        &self.entity
    }
}

impl fmt::Display for PointToPointDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.entity)
    }
}

/// A link holding its two devices.
pub struct PointToPointLink {
    pub entity: Rc<Entity>,
    devices: [Rc<PointToPointDevice>; 2],
}

impl PointToPointLink {
    pub fn new(
        parent: &Rc<Entity>,
        name: &str,
        index: usize,
        config: PointToPointConfig,
    ) -> SimResult<Self> {
        config.validate()?;
        let entity = Rc::new(Entity::new(parent, name));
        let devices = [0, 1].map(|end| {
            PointToPointDevice::new(&entity, DeviceId { link: index, end }, config)
        });
        Ok(Self { entity, devices })
    }

    #[must_use]
    pub fn device(&self, end: usize) -> &Rc<PointToPointDevice> {
        &self.devices[end & 1]
    }

    #[must_use]
    pub fn devices(&self) -> &[Rc<PointToPointDevice>; 2] {
        &self.devices
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddrV4;

    use wisp_track::Id;
    use wisp_track::entity::toplevel;
    use wisp_track::tracker::dev_null_tracker;

    use super::*;
    use crate::capture::CaptureCounter;

    fn datagram(id: u64) -> Datagram {
        Datagram::new(
            Id(id),
            SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 1), 49153),
            SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 2), 9),
            Rc::from(vec![0; 1024]),
        )
    }

    fn link(queue_packets: usize) -> PointToPointLink {
        let top = toplevel(&dev_null_tracker(), "top");
        let config = PointToPointConfig {
            queue_packets,
            ..Default::default()
        };
        PointToPointLink::new(&top, "mon0", 0, config).unwrap()
    }

    #[test]
    fn idle_device_starts_immediately() {
        let link = link(10);
        let dev = link.device(0);
        let now = SimTime::from_millis(1000);
        let EnqueueResult::Started(tx) = dev.enqueue(now, datagram(1)) else {
            panic!("expected transmission to start");
        };
        // 1052 bytes at 5Mb/s then 2ms
        assert_eq!(tx.complete_at, now + SimTime::from_ns(1_683_200));
        assert_eq!(tx.arrive_at, tx.complete_at + SimTime::from_millis(2));
        assert_eq!(dev.counters().tx_packets, 1);
    }

    #[test]
    fn busy_device_queues_then_drops() {
        let link = link(2);
        let dev = link.device(0);
        let counter = Rc::new(CaptureCounter::default());
        dev.attach_capture(counter.clone());

        assert!(matches!(dev.enqueue(SimTime::ZERO, datagram(1)), EnqueueResult::Started(_)));
        assert!(matches!(dev.enqueue(SimTime::ZERO, datagram(2)), EnqueueResult::Queued));
        assert!(matches!(dev.enqueue(SimTime::ZERO, datagram(3)), EnqueueResult::Queued));
        assert!(matches!(dev.enqueue(SimTime::ZERO, datagram(4)), EnqueueResult::Dropped));
        assert_eq!(dev.queue_len(), 2);
        assert_eq!(dev.counters().drops, 1);

        let next = dev.transmit_complete(SimTime::from_ns(1_683_200)).unwrap();
        assert_eq!(next.datagram.id(), Id(2));
        assert_eq!(next.complete_at, SimTime::from_ns(2 * 1_683_200));

        assert_eq!(counter.count(CaptureEvent::Enqueue), 3);
        assert_eq!(counter.count(CaptureEvent::Dequeue), 2);
        assert_eq!(counter.count(CaptureEvent::Drop), 1);
    }

    #[test]
    fn receive_counts() {
        let link = link(1);
        let dev = link.device(1);
        dev.receive(SimTime::ZERO, &datagram(9));
        assert_eq!(dev.counters().rx_packets, 1);
        assert_eq!(dev.counters().rx_bytes, 1052);
        assert_eq!(dev.id().peer(), DeviceId { link: 0, end: 0 });
        assert_eq!(dev.entity.full_name(), "top::mon0::dev1");
    }

    #[test]
    fn zero_queue_rejected() {
        let top = toplevel(&dev_null_tracker(), "top");
        let config = PointToPointConfig {
            queue_packets: 0,
            ..Default::default()
        };
        assert!(PointToPointLink::new(&top, "mon0", 0, config).is_err());
    }
}
