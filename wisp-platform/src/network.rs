// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! The transport substrate that applications send over.
//!
//! A datagram leaving a traffic node goes out on the shared medium when its
//! destination is on the shared network, or straight onto the node's
//! monitoring link when its destination is on that link. Every datagram put
//! on the shared medium is also mirrored onto the sender's monitoring link so
//! that the monitoring node sees all traffic.
//!
//! Arriving datagrams are handed to whichever application bound the
//! destination port on the receiving node. The destination address is not
//! checked, so the monitoring node accepts everything that is mirrored to it.

use std::collections::BTreeMap;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::rc::Rc;

use wisp_engine::scheduler::Scheduler;
use wisp_engine::sim_error;
use wisp_engine::time::SimTime;
use wisp_engine::types::SimResult;
use wisp_models::datagram::Datagram;
use wisp_models::point_to_point::{DeviceId, EnqueueResult, PointToPointDevice, Transmission};
use wisp_models::transport::{DatagramStack, TransportError};
use wisp_models::wifi::{Reception, WifiInterfaceId};
use wisp_track::entity::{Entity, GetEntity};
use wisp_track::{error, trace};

use crate::topology::{NodeId, Topology};

/// First port handed out for port 0 binds.
pub const FIRST_EPHEMERAL_PORT: u16 = 49153;
const NUM_EPHEMERAL_PORTS: u32 = u16::MAX as u32 - FIRST_EPHEMERAL_PORT as u32 + 1;

/// Index of an application hosted on a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppId(pub usize);

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "app{}", self.0)
    }
}

/// Every event of a running simulation.
#[derive(Clone, Debug)]
pub enum NetEvent {
    AppStart(AppId),
    AppTimer(AppId),
    AppStop(AppId),
    /// A frame reaches its receiver on the shared medium.
    WifiRx {
        to: WifiInterfaceId,
        datagram: Datagram,
    },
    /// A link device has finished serialising its current datagram.
    P2pTxComplete(DeviceId),
    /// A datagram reaches `device` from the other end of its link.
    P2pRx {
        device: DeviceId,
        datagram: Datagram,
    },
}

/// Why a datagram went no further.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DropReason {
    /// Arrived below the receiver sensitivity.
    TooWeak,
    /// No interface on the shared medium owns the destination.
    NoReceiver,
    /// A link transmit queue was full.
    QueueFull,
    /// Nothing bound to the destination port.
    NoListener,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DropReason::TooWeak => "too weak",
            DropReason::NoReceiver => "no receiver",
            DropReason::QueueFull => "queue full",
            DropReason::NoListener => "no listener",
        };
        write!(f, "{s}")
    }
}

/// A transport failure reported by an application.
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    pub at: SimTime,
    pub reporter: String,
    pub error: TransportError,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.at, self.reporter, self.error)
    }
}

/// Datagram counts for the whole network.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NetCounters {
    /// Put on the shared medium.
    pub sent: usize,
    /// Arrived at an interface on the shared medium.
    pub received: usize,
    /// Copies accepted onto a monitoring link.
    pub mirrored: usize,
    /// Arrived at the monitoring node.
    pub monitored: usize,
    pub drops: BTreeMap<DropReason, usize>,
}

impl NetCounters {
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.drops.values().sum()
    }

    #[must_use]
    pub fn drops_for(&self, reason: DropReason) -> usize {
        self.drops.get(&reason).copied().unwrap_or(0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Route {
    Wifi(WifiInterfaceId),
    Link(DeviceId),
}

pub struct Network {
    pub entity: Rc<Entity>,
    topology: Topology,
    /// Per node, which application owns each bound port.
    bindings: Vec<BTreeMap<u16, AppId>>,
    next_ephemeral: Vec<u16>,
    counters: NetCounters,
    diagnostics: Vec<Diagnostic>,
}

impl Network {
    #[must_use]
    pub fn new(parent: &Rc<Entity>, topology: Topology) -> Self {
        let num_nodes = topology.num_traffic_nodes() + 1;
        Self {
            entity: Rc::new(Entity::new(parent, "net")),
            topology,
            bindings: vec![BTreeMap::new(); num_nodes],
            next_ephemeral: vec![FIRST_EPHEMERAL_PORT; num_nodes],
            counters: NetCounters::default(),
            diagnostics: Vec::new(),
        }
    }

    #[must_use]
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    #[must_use]
    pub fn counters(&self) -> &NetCounters {
        &self.counters
    }

    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.bindings.len()
    }

    /// The stack seen by application `app` running on `node`.
    pub fn stack<'a>(
        &'a mut self,
        scheduler: &'a mut Scheduler<NetEvent>,
        node: NodeId,
        app: AppId,
    ) -> NodeStack<'a> {
        NodeStack {
            network: self,
            scheduler,
            node,
            app,
        }
    }

    /// Flush the captures attached to every link device.
    pub fn flush_captures(&self) {
        for link in &self.topology.links {
            for device in link.devices() {
                device.flush_captures();
            }
        }
    }

    fn drop_datagram(&mut self, reason: DropReason, datagram: &Datagram) {
        trace!(self.entity ; "drop {} ({reason})", datagram.id());
        *self.counters.drops.entry(reason).or_default() += 1;
    }

    fn device(&self, id: DeviceId) -> SimResult<Rc<PointToPointDevice>> {
        match self.topology.links.get(id.link) {
            Some(link) => Ok(link.device(id.end).clone()),
            None => sim_error!("{}: no link {}", self.entity, id.link),
        }
    }

    /// The node owning a link device.
    fn device_node(&self, id: DeviceId) -> NodeId {
        if id.end == 1 {
            self.topology.monitor_id()
        } else {
            NodeId(id.link)
        }
    }

    fn route(&self, node: NodeId, dst: Ipv4Addr) -> Option<Route> {
        if node == self.topology.monitor_id() {
            return self
                .topology
                .monitor_devices()
                .find(|device| device.network().is_some_and(|net| net.contains(dst)))
                .map(|device| Route::Link(device.id()));
        }

        if let Some(iface) = self.topology.medium.interfaces.get(node.0) {
            if iface.network().is_some_and(|net| net.contains(dst)) {
                return Some(Route::Wifi(iface.id()));
            }
        }
        let device = self.topology.links.get(node.0)?.device(0);
        if device.network().is_some_and(|net| net.contains(dst)) {
            return Some(Route::Link(device.id()));
        }
        None
    }

    fn source_address(&self, node: NodeId, dst: Ipv4Addr) -> Result<Ipv4Addr, TransportError> {
        let address = match self.route(node, dst) {
            Some(Route::Wifi(id)) => self
                .topology
                .medium
                .channel
                .interface(id)
                .and_then(|iface| iface.address()),
            Some(Route::Link(id)) => self.device(id).ok().and_then(|device| device.address()),
            None => None,
        };
        address.ok_or(TransportError::NoRoute(dst))
    }

    fn ephemeral_port(&mut self, node: NodeId) -> Option<u16> {
        let ports = &self.bindings[node.0];
        let offset = u32::from(self.next_ephemeral[node.0] - FIRST_EPHEMERAL_PORT);
        let port = (0..NUM_EPHEMERAL_PORTS)
            .map(|i| FIRST_EPHEMERAL_PORT + ((offset + i) % NUM_EPHEMERAL_PORTS) as u16)
            .find(|port| !ports.contains_key(port))?;
        self.next_ephemeral[node.0] = if port == u16::MAX {
            FIRST_EPHEMERAL_PORT
        } else {
            port + 1
        };
        Some(port)
    }

    /// Schedule the completion and arrival of a transmission that has just
    /// started on device `id`.
    fn schedule_link_tx(&self, scheduler: &mut Scheduler<NetEvent>, id: DeviceId, tx: Transmission) {
        let now = scheduler.now();
        scheduler.schedule(tx.complete_at - now, NetEvent::P2pTxComplete(id));
        scheduler.schedule(
            tx.arrive_at - now,
            NetEvent::P2pRx {
                device: id.peer(),
                datagram: tx.datagram,
            },
        );
    }

    fn enqueue_on_link(
        &mut self,
        scheduler: &mut Scheduler<NetEvent>,
        id: DeviceId,
        datagram: Datagram,
    ) -> SimResult<bool> {
        let device = self.device(id)?;
        let copy = datagram.clone();
        match device.enqueue(scheduler.now(), datagram) {
            EnqueueResult::Started(tx) => self.schedule_link_tx(scheduler, id, tx),
            EnqueueResult::Queued => {}
            EnqueueResult::Dropped => {
                self.drop_datagram(DropReason::QueueFull, &copy);
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn send_on_wifi(
        &mut self,
        scheduler: &mut Scheduler<NetEvent>,
        node: NodeId,
        from: WifiInterfaceId,
        datagram: &Datagram,
    ) -> SimResult {
        let now = scheduler.now();
        let positions = self.topology.positions(now);
        let channel = &self.topology.medium.channel;
        let to = channel.find_by_address(*datagram.dst().ip());
        let tx = channel.transmit(now, from, to, datagram.wire_bytes(), &positions)?;
        self.counters.sent += 1;
        trace!(self.entity ; "{node} {from} sends {} from {} to {}", datagram.id(), tx.start, tx.end);

        match tx.reception {
            Reception::Delivered { to, at, .. } => {
                scheduler.schedule(
                    at - now,
                    NetEvent::WifiRx {
                        to,
                        datagram: datagram.clone(),
                    },
                );
            }
            Reception::TooWeak { .. } => self.drop_datagram(DropReason::TooWeak, datagram),
            Reception::NoReceiver => self.drop_datagram(DropReason::NoReceiver, datagram),
        }
        Ok(())
    }

    /// Send a datagram from `node`.
    fn send(
        &mut self,
        scheduler: &mut Scheduler<NetEvent>,
        node: NodeId,
        datagram: Datagram,
    ) -> Result<(), TransportError> {
        let dst = *datagram.dst().ip();
        let result = match self.route(node, dst) {
            None => return Err(TransportError::NoRoute(dst)),
            Some(Route::Link(id)) => self.enqueue_on_link(scheduler, id, datagram).map(|_| ()),
            Some(Route::Wifi(from)) => self
                .send_on_wifi(scheduler, node, from, &datagram)
                .and_then(|()| self.mirror(scheduler, node, datagram)),
        };

        // Only an inconsistent topology can fail here
        result.map_err(|e| {
            error!(self.entity ; "{node}: {e}");
            TransportError::NoRoute(dst)
        })
    }

    /// Copy a datagram onto the monitoring link of `node`.
    fn mirror(
        &mut self,
        scheduler: &mut Scheduler<NetEvent>,
        node: NodeId,
        datagram: Datagram,
    ) -> SimResult {
        let id = DeviceId {
            link: node.0,
            end: 0,
        };
        if self.enqueue_on_link(scheduler, id, datagram)? {
            self.counters.mirrored += 1;
        }
        Ok(())
    }

    /// Find the application listening on the destination port at `node`.
    fn deliver(&mut self, node: NodeId, datagram: Datagram) -> Option<(AppId, Datagram)> {
        let port = datagram.dst().port();
        match self.bindings.get(node.0).and_then(|ports| ports.get(&port)) {
            Some(app) => Some((*app, datagram)),
            None => {
                self.drop_datagram(DropReason::NoListener, &datagram);
                None
            }
        }
    }

    /// Handle a network event.
    ///
    /// Returns the application a datagram has been delivered to, if any.
    pub fn handle(
        &mut self,
        scheduler: &mut Scheduler<NetEvent>,
        event: NetEvent,
    ) -> SimResult<Option<(AppId, Datagram)>> {
        let now = scheduler.now();
        match event {
            NetEvent::WifiRx { to, datagram } => {
                let Some(iface) = self.topology.medium.channel.interface(to).cloned() else {
                    return sim_error!("{}: no interface {to}", self.entity);
                };
                iface.receive();
                self.counters.received += 1;
                Ok(self.deliver(NodeId(iface.node()), datagram))
            }
            NetEvent::P2pTxComplete(id) => {
                if let Some(tx) = self.device(id)?.transmit_complete(now) {
                    self.schedule_link_tx(scheduler, id, tx);
                }
                Ok(None)
            }
            NetEvent::P2pRx { device, datagram } => {
                self.device(device)?.receive(now, &datagram);
                let node = self.device_node(device);
                if node == self.topology.monitor_id() {
                    self.counters.monitored += 1;
                }
                Ok(self.deliver(node, datagram))
            }
            NetEvent::AppStart(app) | NetEvent::AppTimer(app) | NetEvent::AppStop(app) => {
                sim_error!("{}: {app} event is not a network event", self.entity)
            }
        }
    }
}

impl GetEntity for Network {
    fn entity(&self) -> &Rc<Entity> {
        &self.entity
    }
}

/// A node's network stack as seen by one of its applications.
pub struct NodeStack<'a> {
    network: &'a mut Network,
    scheduler: &'a mut Scheduler<NetEvent>,
    node: NodeId,
    app: AppId,
}

impl DatagramStack for NodeStack<'_> {
    fn bind(&mut self, local: SocketAddrV4) -> Result<SocketAddrV4, TransportError> {
        let port = if local.port() == 0 {
            self.network
                .ephemeral_port(self.node)
                .ok_or(TransportError::AddressInUse(local))?
        } else {
            local.port()
        };
        let ports = &mut self.network.bindings[self.node.0];
        if ports.contains_key(&port) {
            return Err(TransportError::AddressInUse(SocketAddrV4::new(*local.ip(), port)));
        }
        ports.insert(port, self.app);
        Ok(SocketAddrV4::new(*local.ip(), port))
    }

    fn unbind(&mut self, local: SocketAddrV4) {
        let ports = &mut self.network.bindings[self.node.0];
        if ports.get(&local.port()) == Some(&self.app) {
            ports.remove(&local.port());
        }
    }

    fn source_address(&self, dst: Ipv4Addr) -> Result<Ipv4Addr, TransportError> {
        self.network.source_address(self.node, dst)
    }

    fn send(&mut self, datagram: Datagram) -> Result<(), TransportError> {
        self.network.send(self.scheduler, self.node, datagram)
    }

    fn report_failure(&mut self, reporter: &Entity, error: &TransportError) {
        self.network.diagnostics.push(Diagnostic {
            at: self.scheduler.now(),
            reporter: reporter.full_name(),
            error: error.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use wisp_track::Id;
    use wisp_track::entity::toplevel;
    use wisp_track::tracker::dev_null_tracker;

    use super::*;
    use wisp_models::model_config::ModelConfig;

    use crate::config::SimulationConfig;
    use crate::topology::TopologyBuilder;

    /// All nodes stationary and within range of each other.
    fn network(num_nodes: usize) -> (Network, Scheduler<NetEvent>) {
        let top = toplevel(&dev_null_tracker(), "top");
        let mut config = SimulationConfig::default();
        config.num_nodes = num_nodes;
        config.mobility = ModelConfig::new("ConstantPosition");
        let topology = TopologyBuilder::new(&top, &config).build().unwrap();
        (Network::new(&top, topology), Scheduler::new())
    }

    fn datagram(src: SocketAddrV4, dst: SocketAddrV4) -> Datagram {
        Datagram::new(Id(1000), src, dst, Rc::from(&b"Hello world"[..]))
    }

    #[test]
    fn bind_ports() {
        let (mut network, mut scheduler) = network(2);
        let any = |port| SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);

        let mut stack = network.stack(&mut scheduler, NodeId(0), AppId(0));
        assert_eq!(stack.bind(any(0)).unwrap().port(), FIRST_EPHEMERAL_PORT);
        assert_eq!(stack.bind(any(0)).unwrap().port(), FIRST_EPHEMERAL_PORT + 1);
        assert_eq!(stack.bind(any(9)).unwrap().port(), 9);
        assert!(matches!(
            stack.bind(any(9)),
            Err(TransportError::AddressInUse(_))
        ));

        // Only the owner can release a port
        let mut other = network.stack(&mut scheduler, NodeId(0), AppId(1));
        other.unbind(any(9));
        assert!(other.bind(any(9)).is_err());

        // Ports are per node
        let mut stack = network.stack(&mut scheduler, NodeId(1), AppId(2));
        assert_eq!(stack.bind(any(9)).unwrap().port(), 9);
    }

    #[test]
    fn routes_and_source_addresses() {
        let (mut network, mut scheduler) = network(3);
        let stack = network.stack(&mut scheduler, NodeId(1), AppId(0));
        assert_eq!(
            stack.source_address(Ipv4Addr::new(10, 1, 1, 3)),
            Ok(Ipv4Addr::new(10, 1, 1, 2))
        );
        assert_eq!(
            stack.source_address(Ipv4Addr::new(10, 2, 0, 6)),
            Ok(Ipv4Addr::new(10, 2, 0, 5))
        );
        assert_eq!(
            stack.source_address(Ipv4Addr::new(10, 2, 0, 2)),
            Err(TransportError::NoRoute(Ipv4Addr::new(10, 2, 0, 2)))
        );

        let monitor = network.topology().monitor_id();
        let stack = network.stack(&mut scheduler, monitor, AppId(1));
        assert_eq!(
            stack.source_address(Ipv4Addr::new(10, 2, 0, 9)),
            Ok(Ipv4Addr::new(10, 2, 0, 10))
        );
        assert!(stack.source_address(Ipv4Addr::new(10, 1, 1, 1)).is_err());
    }

    #[test]
    fn wifi_send_is_mirrored() {
        let (mut network, mut scheduler) = network(2);
        let src = SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 1), FIRST_EPHEMERAL_PORT);
        let dst = SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 2), 9);

        let mut stack = network.stack(&mut scheduler, NodeId(0), AppId(0));
        stack.send(datagram(src, dst)).unwrap();
        assert_eq!(network.counters().sent, 1);
        assert_eq!(network.counters().mirrored, 1);

        // Wifi arrival, link completion and link arrival
        assert_eq!(scheduler.num_pending(), 3);
        let mut delivered = Vec::new();
        while let Some(event) = scheduler.pop_next() {
            if let Some(delivery) = network.handle(&mut scheduler, event).unwrap() {
                delivered.push(delivery);
            }
        }
        // Nothing is listening on either node
        assert!(delivered.is_empty());
        assert_eq!(network.counters().received, 1);
        assert_eq!(network.counters().monitored, 1);
        assert_eq!(network.counters().drops_for(DropReason::NoListener), 2);
        assert_eq!(
            network.topology().links[0].device(1).counters().rx_packets,
            1
        );
    }

    #[test]
    fn monitor_accepts_any_destination() {
        let (mut network, mut scheduler) = network(2);
        let monitor = network.topology().monitor_id();
        let mut sink = network.stack(&mut scheduler, monitor, AppId(7));
        sink.bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 9)).unwrap();

        let src = SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 2), FIRST_EPHEMERAL_PORT);
        let dst = SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 1), 9);
        let mut stack = network.stack(&mut scheduler, NodeId(1), AppId(0));
        stack.send(datagram(src, dst)).unwrap();

        let mut delivered = Vec::new();
        while let Some(event) = scheduler.pop_next() {
            if let Some((app, datagram)) = network.handle(&mut scheduler, event).unwrap() {
                delivered.push((app, datagram.dst()));
            }
        }
        assert_eq!(delivered, vec![(AppId(7), dst)]);
    }

    #[test]
    fn unknown_destination() {
        let (mut network, mut scheduler) = network(2);
        let src = SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 1), FIRST_EPHEMERAL_PORT);

        let mut stack = network.stack(&mut scheduler, NodeId(0), AppId(0));
        let offnet = SocketAddrV4::new(Ipv4Addr::new(192, 168, 0, 1), 9);
        assert_eq!(
            stack.send(datagram(src, offnet)),
            Err(TransportError::NoRoute(Ipv4Addr::new(192, 168, 0, 1)))
        );

        // On the shared network but not assigned to anyone
        let unassigned = SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 77), 9);
        let mut stack = network.stack(&mut scheduler, NodeId(0), AppId(0));
        stack.send(datagram(src, unassigned)).unwrap();
        assert_eq!(network.counters().drops_for(DropReason::NoReceiver), 1);
        assert_eq!(network.counters().mirrored, 1);
    }

    #[test]
    fn failures_become_diagnostics() {
        let (mut network, mut scheduler) = network(1);
        let top = toplevel(&dev_null_tracker(), "top");
        let reporter = Entity::new(&top, "gen0->1");
        let mut stack = network.stack(&mut scheduler, NodeId(0), AppId(0));
        stack.report_failure(&reporter, &TransportError::NotBound);
        assert_eq!(network.diagnostics().len(), 1);
        assert_eq!(network.diagnostics()[0].reporter, "top::gen0->1");
        assert_eq!(
            network.diagnostics()[0].to_string(),
            "0.000000000s top::gen0->1: socket not bound"
        );
    }
}
