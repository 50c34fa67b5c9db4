// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Construction of the nodes, the shared medium and the monitoring links.
//!
//! Link `i` joins traffic node `i` (end 0) to the monitoring node (end 1).
//! Everything except the mobility models is deterministic for a given
//! configuration.

use std::cell::RefCell;
use std::fmt;
use std::net::Ipv4Addr;
use std::rc::Rc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use wisp_engine::sim_error;
use wisp_engine::time::SimTime;
use wisp_engine::types::SimResult;
use wisp_models::address::{AddressBlock, Ipv4Network, SubnetAllocator};
use wisp_models::mobility::{MobilityModel, Position, build_mobility};
use wisp_models::point_to_point::{PointToPointDevice, PointToPointLink};
use wisp_models::propagation::{build_delay, build_loss};
use wisp_models::wifi::{WifiChannel, WifiInterface};
use wisp_track::entity::{Entity, GetEntity};
use wisp_track::{debug, info};

use crate::config::SimulationConfig;

/// Prefix length of every monitoring link network.
pub const LINK_PREFIX_LEN: u8 = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeRole {
    Traffic,
    Monitor,
}

pub struct Node {
    pub entity: Rc<Entity>,
    id: NodeId,
    role: NodeRole,
    mobility: RefCell<Box<dyn MobilityModel>>,
}

impl Node {
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub fn role(&self) -> NodeRole {
        self.role
    }

    /// Position at `now`. Must not be asked for an earlier time than a
    /// previous call.
    pub fn position_at(&self, now: SimTime) -> Position {
        self.mobility.borrow_mut().position_at(now)
    }
}

impl GetEntity for Node {
    fn entity(&self) -> &Rc<Entity> {
        &self.entity
    }
}

/// The traffic nodes and the single monitoring node.
pub struct Nodes {
    pub traffic: Vec<Node>,
    pub monitor: Node,
}

/// The shared wireless channel and each traffic node's interface on it.
pub struct SharedMedium {
    pub channel: WifiChannel,
    /// Indexed by traffic node.
    pub interfaces: Vec<Rc<WifiInterface>>,
}

/// Everything a simulation runs over.
pub struct Topology {
    pub nodes: Nodes,
    pub medium: SharedMedium,
    /// Indexed by traffic node.
    pub links: Vec<PointToPointLink>,
    /// Shared medium address of each traffic node.
    pub addresses: Vec<Ipv4Addr>,
    /// Network of each monitoring link.
    pub link_networks: Vec<Ipv4Network>,
}

impl Topology {
    #[must_use]
    pub fn num_traffic_nodes(&self) -> usize {
        self.nodes.traffic.len()
    }

    #[must_use]
    pub fn monitor_id(&self) -> NodeId {
        self.nodes.monitor.id
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        if id == self.nodes.monitor.id {
            Some(&self.nodes.monitor)
        } else {
            self.nodes.traffic.get(id.0)
        }
    }

    /// The device of every monitoring link at the monitoring node.
    pub fn monitor_devices(&self) -> impl Iterator<Item = &Rc<PointToPointDevice>> {
        self.links.iter().map(|link| link.device(1))
    }

    /// Positions of the traffic nodes at `now`.
    #[must_use]
    pub fn positions(&self, now: SimTime) -> Vec<Position> {
        self.nodes
            .traffic
            .iter()
            .map(|node| node.position_at(now))
            .collect()
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Traffic nodes:")?;
        for (i, node) in self.nodes.traffic.iter().enumerate() {
            write!(f, "  {i}: {}", node.entity)?;
            if let Some(addr) = self.addresses.get(i) {
                write!(f, " {addr}")?;
            }
            if let Some(net) = self.link_networks.get(i) {
                write!(f, " via {net}")?;
            }
            writeln!(f)?;
        }
        writeln!(f, "Monitor: {}", self.nodes.monitor.entity)
    }
}

pub struct TopologyBuilder<'a> {
    parent: Rc<Entity>,
    config: &'a SimulationConfig,
}

impl<'a> TopologyBuilder<'a> {
    #[must_use]
    pub fn new(parent: &Rc<Entity>, config: &'a SimulationConfig) -> Self {
        Self {
            parent: parent.clone(),
            config,
        }
    }

    /// Create `num_traffic_nodes` mobile nodes and one stationary monitoring
    /// node. Node ids run from 0 with the monitor last.
    pub fn build_nodes(&self, num_traffic_nodes: usize) -> SimResult<Nodes> {
        if num_traffic_nodes == 0 {
            return sim_error!("at least one traffic node is required");
        }

        let mut traffic = Vec::with_capacity(num_traffic_nodes);
        for i in 0..num_traffic_nodes {
            let rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(i as u64));
            let mobility = build_mobility(&self.config.mobility, rng)?;
            traffic.push(Node {
                entity: Rc::new(Entity::new(&self.parent, &format!("node{i}"))),
                id: NodeId(i),
                role: NodeRole::Traffic,
                mobility: RefCell::new(mobility),
            });
        }

        let rng = StdRng::seed_from_u64(self.config.seed);
        let monitor = Node {
            entity: Rc::new(Entity::new(&self.parent, "monitor")),
            id: NodeId(num_traffic_nodes),
            role: NodeRole::Monitor,
            mobility: RefCell::new(build_mobility(&self.config.monitor_mobility, rng)?),
        };
        Ok(Nodes { traffic, monitor })
    }

    /// Attach every traffic node to one wireless channel.
    pub fn build_shared_medium(&self, nodes: &[Node]) -> SimResult<SharedMedium> {
        let loss = build_loss(&self.config.propagation_loss)?;
        let delay = build_delay(&self.config.propagation_delay)?;
        let mut channel = WifiChannel::new(&self.parent, "wifi", self.config.wifi, loss, delay)?;
        let interfaces = nodes.iter().map(|node| channel.attach(node.id.0)).collect();
        Ok(SharedMedium {
            channel,
            interfaces,
        })
    }

    /// One point-to-point link from each traffic node to the monitor, in
    /// node order.
    pub fn build_monitoring_links(
        &self,
        traffic_nodes: &[Node],
        monitor: &Node,
    ) -> SimResult<Vec<PointToPointLink>> {
        traffic_nodes
            .iter()
            .enumerate()
            .map(|(i, node)| {
                let link = PointToPointLink::new(&self.parent, &format!("link{i}"), i, self.config.p2p)?;
                debug!(link.entity ; "{} <-> {}", node.entity, monitor.entity);
                Ok(link)
            })
            .collect()
    }

    /// Give each interface the next address of the shared block, in order.
    pub fn assign_addresses(&self, interfaces: &[Rc<WifiInterface>]) -> SimResult<Vec<Ipv4Addr>> {
        let network = self.config.shared_network;
        let mut block = AddressBlock::new(network);
        if interfaces.len() > block.remaining() as usize {
            return sim_error!(
                "{} interfaces do not fit in {network} ({} addresses)",
                interfaces.len(),
                block.remaining()
            );
        }
        interfaces
            .iter()
            .map(|iface| {
                let addr = block.allocate()?;
                iface.set_address(addr, network);
                Ok(addr)
            })
            .collect()
    }

    /// Give each link its own /30: `.1` at the traffic node and `.2` at the
    /// monitor.
    pub fn assign_link_addresses(&self, links: &[PointToPointLink]) -> SimResult<Vec<Ipv4Network>> {
        let mut subnets = SubnetAllocator::new(self.config.monitor_network, LINK_PREFIX_LEN)?;
        if links.len() as u64 > subnets.capacity() {
            return sim_error!(
                "{} links do not fit in {} ({} subnets)",
                links.len(),
                self.config.monitor_network,
                subnets.capacity()
            );
        }
        links
            .iter()
            .map(|link| {
                let network = subnets.next_subnet()?;
                let mut block = AddressBlock::new(network);
                for device in link.devices() {
                    device.set_address(block.allocate()?, network);
                }
                Ok(network)
            })
            .collect()
    }

    /// Build and address the whole topology.
    pub fn build(&self) -> SimResult<Topology> {
        let nodes = self.build_nodes(self.config.num_nodes)?;
        let medium = self.build_shared_medium(&nodes.traffic)?;
        let links = self.build_monitoring_links(&nodes.traffic, &nodes.monitor)?;
        let addresses = self.assign_addresses(&medium.interfaces)?;
        let link_networks = self.assign_link_addresses(&links)?;
        info!(self.parent ; "built {} traffic nodes on {}, {} monitoring links",
            nodes.traffic.len(), self.config.shared_network, links.len());
        Ok(Topology {
            nodes,
            medium,
            links,
            addresses,
            link_networks,
        })
    }
}
