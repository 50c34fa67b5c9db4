// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! A shared wireless channel.
//!
//! Every attached [`WifiInterface`] hears every transmission, attenuated by
//! the channel's [`PropagationLoss`] and delayed by its [`PropagationDelay`].
//! A frame reaches its receiver only if the received power clears the
//! receiver sensitivity.
//!
//! Medium access is deliberately simple: an interface sends one frame at a
//! time at the PHY data rate, and defers while it can sense another
//! transmission above the energy detection threshold. There are no
//! collisions, retransmissions or acknowledgements.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::net::Ipv4Addr;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use wisp_engine::sim_error;
use wisp_engine::time::SimTime;
use wisp_engine::types::SimResult;
use wisp_track::entity::{Entity, GetEntity};
use wisp_track::trace;

use crate::address::Ipv4Network;
use crate::data_rate::DataRate;
use crate::mobility::Position;
use crate::propagation::{PropagationDelay, PropagationLoss};

/// 802.11 MAC header, LLC/SNAP and FCS added to every frame.
pub const MAC_OVERHEAD_BYTES: usize = 36;

/// Thermal noise density at 290K in dBm/Hz.
const THERMAL_NOISE_DBM_HZ: f64 = -174.0;

/// Physical layer settings shared by every interface on a channel.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WifiPhyConfig {
    pub tx_power_dbm: f64,
    pub tx_gain_db: f64,
    pub rx_gain_db: f64,
    pub rx_sensitivity_dbm: f64,
    /// Energy detection threshold used when sensing the channel.
    pub cca_ed_threshold_dbm: f64,
    pub rx_noise_figure_db: f64,
    pub channel_width_mhz: f64,
    pub data_rate: DataRate,
}

impl Default for WifiPhyConfig {
    fn default() -> Self {
        Self {
            tx_power_dbm: 16.0206,
            tx_gain_db: 0.0,
            rx_gain_db: 0.0,
            rx_sensitivity_dbm: -101.0,
            cca_ed_threshold_dbm: -62.8,
            rx_noise_figure_db: 7.0,
            channel_width_mhz: 20.0,
            data_rate: DataRate::from_mbps(65),
        }
    }
}

impl WifiPhyConfig {
    pub fn validate(&self) -> SimResult {
        if self.channel_width_mhz <= 0.0 {
            return sim_error!("wifi channel width must be positive");
        }
        if self.cca_ed_threshold_dbm < self.rx_sensitivity_dbm {
            return sim_error!(
                "energy detection threshold {} below rx sensitivity {}",
                self.cca_ed_threshold_dbm,
                self.rx_sensitivity_dbm
            );
        }
        Ok(())
    }

    /// Receiver noise floor in dBm.
    #[must_use]
    pub fn noise_floor_dbm(&self) -> f64 {
        THERMAL_NOISE_DBM_HZ + 10.0 * (self.channel_width_mhz * 1e6).log10() + self.rx_noise_figure_db
    }
}

/// Index of an interface on its channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WifiInterfaceId(pub usize);

impl fmt::Display for WifiInterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wifi{}", self.0)
    }
}

/// Frame counters for one interface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WifiCounters {
    pub tx_frames: usize,
    pub rx_frames: usize,
    /// Frames addressed to this interface that arrived too weak.
    pub rx_too_weak: usize,
}

/// A node's attachment to a [`WifiChannel`].
pub struct WifiInterface {
    pub entity: Rc<Entity>,
    id: WifiInterfaceId,
    node: usize,
    address: Cell<Option<(Ipv4Addr, Ipv4Network)>>,
    busy_until: Cell<SimTime>,
    counters: Cell<WifiCounters>,
}

impl WifiInterface {
    #[must_use]
    pub fn id(&self) -> WifiInterfaceId {
        self.id
    }

    /// Index of the node that owns this interface.
    #[must_use]
    pub fn node(&self) -> usize {
        self.node
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
    pub fn counters(&self) -> WifiCounters {
        self.counters.get()
    }

    fn update_counters(&self, f: impl FnOnce(&mut WifiCounters)) {
        let mut counters = self.counters.get();
        f(&mut counters);
        self.counters.set(counters);
    }

    /// Record a frame that has been successfully received.
    pub fn receive(&self) {
        self.update_counters(|c| c.rx_frames += 1);
    }
}

impl GetEntity for WifiInterface {
    fn entity(&self) -> &Rc<Entity> {
        &self.entity
    }
}

/// What happens to a frame at its intended receiver.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Reception {
    /// The frame arrives at `at`.
    Delivered {
        to: WifiInterfaceId,
        at: SimTime,
        rx_power_dbm: f64,
    },
    /// The received power was below the sensitivity.
    TooWeak { to: WifiInterfaceId, rx_power_dbm: f64 },
    /// No interface on the channel owns the destination address.
    NoReceiver,
}

/// Result of putting a frame on the channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WifiTransmission {
    pub start: SimTime,
    pub end: SimTime,
    pub reception: Reception,
}

/// The shared medium.
pub struct WifiChannel {
    pub entity: Rc<Entity>,
    phy: WifiPhyConfig,
    loss: Box<dyn PropagationLoss>,
    delay: Box<dyn PropagationDelay>,
    interfaces: Vec<Rc<WifiInterface>>,
    ongoing: RefCell<Vec<(WifiInterfaceId, SimTime)>>,
}

impl WifiChannel {
    pub fn new(
        parent: &Rc<Entity>,
        name: &str,
        phy: WifiPhyConfig,
        loss: Box<dyn PropagationLoss>,
        delay: Box<dyn PropagationDelay>,
    ) -> SimResult<Self> {
        phy.validate()?;
        Ok(Self {
            entity: Rc::new(Entity::new(parent, name)),
            phy,
            loss,
            delay,
            interfaces: Vec::new(),
            ongoing: RefCell::new(Vec::new()),
        })
    }

    /// Attach a new interface owned by node `node`.
    pub fn attach(&mut self, node: usize) -> Rc<WifiInterface> {
        let id = WifiInterfaceId(self.interfaces.len());
        let iface = Rc::new(WifiInterface {
            entity: Rc::new(Entity::new(&self.entity, &format!("if{}", id.0))),
            id,
            node,
            address: Cell::new(None),
            busy_until: Cell::new(SimTime::ZERO),
            counters: Cell::new(WifiCounters::default()),
        });
        self.interfaces.push(iface.clone());
        iface
    }

    #[must_use]
    pub fn phy(&self) -> &WifiPhyConfig {
        &self.phy
    }

    #[must_use]
    pub fn interface(&self, id: WifiInterfaceId) -> Option<&Rc<WifiInterface>> {
        self.interfaces.get(id.0)
    }

    #[must_use]
    pub fn interfaces(&self) -> &[Rc<WifiInterface>] {
        &self.interfaces
    }

    /// Find the interface holding `address`.
    #[must_use]
    pub fn find_by_address(&self, address: Ipv4Addr) -> Option<WifiInterfaceId> {
        self.interfaces
            .iter()
            .find(|iface| iface.address() == Some(address))
            .map(|iface| iface.id)
    }

    fn power_at(&self, from: &Position, to: &Position) -> f64 {
        let eirp = self.phy.tx_power_dbm + self.phy.tx_gain_db;
        self.loss.rx_power_dbm(eirp, from, to) + self.phy.rx_gain_db
    }

    /// Earliest time at or after `earliest` when `from` senses the medium
    /// idle.
    fn sense_idle(&self, from: &WifiInterface, earliest: SimTime, positions: &[Position]) -> SimTime {
        let my_pos = positions[from.node];
        let mut start = earliest;
        let ongoing = self.ongoing.borrow();
        loop {
            let mut deferred = false;
            for (other, end) in ongoing.iter() {
                if *other == from.id || *end <= start {
                    continue;
                }
                let other_node = self.interfaces[other.0].node;
                if self.power_at(&positions[other_node], &my_pos) >= self.phy.cca_ed_threshold_dbm {
                    start = *end;
                    deferred = true;
                }
            }
            if !deferred {
                return start;
            }
        }
    }

    /// Put a frame of `num_bytes` from interface `from` onto the medium.
    ///
    /// `positions` holds the position of every node at `now`, indexed by
    /// node. `to` is the intended receiver, if any interface owns the
    /// destination address.
    pub fn transmit(
        &self,
        now: SimTime,
        from: WifiInterfaceId,
        to: Option<WifiInterfaceId>,
        num_bytes: usize,
        positions: &[Position],
    ) -> SimResult<WifiTransmission> {
        let Some(sender) = self.interfaces.get(from.0) else {
            return sim_error!("{}: no interface {from}", self.entity);
        };
        if sender.node >= positions.len() {
            return sim_error!("{}: no position for node {}", self.entity, sender.node);
        }

        self.ongoing.borrow_mut().retain(|(_, end)| *end > now);

        let earliest = now.max(sender.busy_until.get());
        let start = self.sense_idle(sender, earliest, positions);
        let end = start + self.phy.data_rate.tx_time(num_bytes + MAC_OVERHEAD_BYTES);
        sender.busy_until.set(end);
        sender.update_counters(|c| c.tx_frames += 1);
        self.ongoing.borrow_mut().push((from, end));

        let reception = match to.and_then(|id| self.interfaces.get(id.0)) {
            None => Reception::NoReceiver,
            Some(receiver) => {
                let from_pos = &positions[sender.node];
                let Some(to_pos) = positions.get(receiver.node) else {
                    return sim_error!("{}: no position for node {}", self.entity, receiver.node);
                };
                let rx_power_dbm = self.power_at(from_pos, to_pos);
                trace!(self.entity ; "{from} -> {}: {rx_power_dbm:.2}dBm, snr {:.2}dB",
                    receiver.id, rx_power_dbm - self.phy.noise_floor_dbm());
                if rx_power_dbm < self.phy.rx_sensitivity_dbm {
                    receiver.update_counters(|c| c.rx_too_weak += 1);
                    Reception::TooWeak {
                        to: receiver.id,
                        rx_power_dbm,
                    }
                } else {
                    Reception::Delivered {
                        to: receiver.id,
                        at: end + self.delay.delay(from_pos, to_pos),
                        rx_power_dbm,
                    }
                }
            }
        };

        Ok(WifiTransmission {
            start,
            end,
            reception,
        })
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use wisp_track::entity::toplevel;
    use wisp_track::tracker::dev_null_tracker;

    use super::*;
    use crate::propagation::{ConstantSpeedDelay, LogDistanceLoss};

    fn channel(num_nodes: usize) -> WifiChannel {
        let top = toplevel(&dev_null_tracker(), "top");
        let mut channel = WifiChannel::new(
            &top,
            "wifi",
            WifiPhyConfig::default(),
            Box::new(LogDistanceLoss::default()),
            Box::new(ConstantSpeedDelay::default()),
        )
        .unwrap();
        for node in 0..num_nodes {
            channel.attach(node);
        }
        channel
    }

    // 1052 + 36 bytes at 65Mb/s
    const FRAME_NS: u64 = 133_908;

    #[test]
    fn noise_floor() {
        assert_relative_eq!(
            WifiPhyConfig::default().noise_floor_dbm(),
            -174.0 + 73.0103 + 7.0,
            epsilon = 1e-3
        );
    }

    #[test]
    fn close_nodes_deliver() {
        let channel = channel(2);
        let positions = [Position::new(0.0, 0.0), Position::new(299.792458, 0.0)];
        let tx = channel
            .transmit(
                SimTime::from_millis(1000),
                WifiInterfaceId(0),
                Some(WifiInterfaceId(1)),
                1052,
                &positions,
            )
            .unwrap();
        assert_eq!(tx.start, SimTime::from_millis(1000));
        assert_eq!(tx.end, tx.start + SimTime::from_ns(FRAME_NS));
        // 16.0206 - 46.6777 - 30 log10(299.79) = -104.97dBm: too weak
        assert!(matches!(tx.reception, Reception::TooWeak { .. }));

        let positions = [Position::new(0.0, 0.0), Position::new(100.0, 0.0)];
        let tx = channel
            .transmit(
                SimTime::from_millis(2000),
                WifiInterfaceId(0),
                Some(WifiInterfaceId(1)),
                1052,
                &positions,
            )
            .unwrap();
        let Reception::Delivered { to, at, rx_power_dbm } = tx.reception else {
            panic!("expected delivery");
        };
        assert_eq!(to, WifiInterfaceId(1));
        assert_eq!(at, tx.end + SimTime::from_ns(334));
        assert_relative_eq!(rx_power_dbm, 16.0206 - 46.6777 - 60.0, epsilon = 1e-9);
        assert_eq!(channel.interfaces()[0].counters().tx_frames, 2);
        assert_eq!(channel.interfaces()[1].counters().rx_too_weak, 1);
    }

    #[test]
    fn frames_serialise_per_interface() {
        let channel = channel(2);
        let positions = [Position::default(), Position::new(1.0, 0.0)];
        let now = SimTime::from_millis(1);
        let first = channel
            .transmit(now, WifiInterfaceId(0), Some(WifiInterfaceId(1)), 1052, &positions)
            .unwrap();
        let second = channel
            .transmit(now, WifiInterfaceId(0), Some(WifiInterfaceId(1)), 1052, &positions)
            .unwrap();
        assert_eq!(second.start, first.end);
    }

    #[test]
    fn sender_defers_to_nearby_transmission() {
        let channel = channel(3);
        // Node 2 is close to node 0 so senses it above the threshold
        let positions = [
            Position::default(),
            Position::new(5.0, 0.0),
            Position::new(2.0, 0.0),
        ];
        let now = SimTime::from_millis(1);
        let first = channel
            .transmit(now, WifiInterfaceId(0), Some(WifiInterfaceId(1)), 1052, &positions)
            .unwrap();
        let second = channel
            .transmit(now, WifiInterfaceId(2), Some(WifiInterfaceId(1)), 1052, &positions)
            .unwrap();
        assert_eq!(second.start, first.end);

        // Far away nodes do not defer
        let positions = [
            Position::default(),
            Position::new(5.0, 0.0),
            Position::new(400.0, 0.0),
        ];
        let later = SimTime::from_millis(10);
        channel
            .transmit(later, WifiInterfaceId(0), None, 1052, &positions)
            .unwrap();
        let far = channel
            .transmit(later, WifiInterfaceId(2), None, 1052, &positions)
            .unwrap();
        assert_eq!(far.start, later);
        assert_eq!(far.reception, Reception::NoReceiver);
    }

    #[test]
    fn find_interface_by_address() {
        let channel = channel(2);
        let net: Ipv4Network = "10.1.1.0/24".parse().unwrap();
        channel.interfaces()[1].set_address(Ipv4Addr::new(10, 1, 1, 2), net);
        assert_eq!(
            channel.find_by_address(Ipv4Addr::new(10, 1, 1, 2)),
            Some(WifiInterfaceId(1))
        );
        assert_eq!(channel.find_by_address(Ipv4Addr::new(10, 1, 1, 1)), None);
    }
}
