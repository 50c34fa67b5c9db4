// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use std::collections::HashSet;

use wisp_engine::time::SimTime;
use wisp_models::data_rate::DataRate;
use wisp_platform::config::SimulationConfig;
use wisp_platform::simulation::Simulation;
use wisp_platform::topology::{LINK_PREFIX_LEN, NodeId, TopologyBuilder};
use wisp_track::entity::toplevel;
use wisp_track::tracker::dev_null_tracker;

fn config(num_nodes: usize) -> SimulationConfig {
    SimulationConfig {
        num_nodes,
        ..SimulationConfig::default()
    }
}

#[test]
fn all_ordered_pairs() {
    for num_nodes in [1, 2, 3, 10] {
        let mut simulation = Simulation::new(&dev_null_tracker(), config(num_nodes)).unwrap();
        simulation.build_topology().unwrap();
        let pairs = simulation
            .build_traffic_matrix(
                9,
                1024,
                2,
                DataRate::from_kbps(500),
                SimTime::from_millis(1000),
                SimTime::from_millis(100_000),
            )
            .unwrap();

        assert_eq!(pairs.len(), num_nodes * (num_nodes - 1));
        assert_eq!(simulation.num_generators(), pairs.len());
        assert!(pairs.iter().all(|(from, to)| from != to));
        let unique: HashSet<_> = pairs.iter().collect();
        assert_eq!(unique.len(), pairs.len());
        assert!(pairs.iter().all(|(from, to)| from.0 < num_nodes && to.0 < num_nodes));
    }
}

#[test]
fn one_link_per_traffic_node() {
    let top = toplevel(&dev_null_tracker(), "top");
    let config = config(10);
    let topology = TopologyBuilder::new(&top, &config).build().unwrap();

    assert_eq!(topology.num_traffic_nodes(), 10);
    assert_eq!(topology.links.len(), 10);
    assert_eq!(topology.monitor_id(), NodeId(10));
    for (i, link) in topology.links.iter().enumerate() {
        assert_eq!(link.device(0).id().link, i);
        assert_eq!(link.device(1).id().end, 1);
        assert_eq!(link.entity.full_name(), format!("top::link{i}"));
    }
    assert_eq!(topology.monitor_devices().count(), 10);
}

#[test]
fn distinct_shared_addresses() {
    let top = toplevel(&dev_null_tracker(), "top");
    let config = config(10);
    let topology = TopologyBuilder::new(&top, &config).build().unwrap();

    let addresses: HashSet<_> = topology.addresses.iter().collect();
    assert_eq!(addresses.len(), 10);
    assert!(topology.addresses.iter().all(|a| config.shared_network.contains(*a)));
    assert_eq!(topology.addresses[0].to_string(), "10.1.1.1");
    assert_eq!(topology.addresses[9].to_string(), "10.1.1.10");
    for (iface, address) in topology.medium.interfaces.iter().zip(&topology.addresses) {
        assert_eq!(iface.address(), Some(*address));
    }
}

#[test]
fn link_addresses_never_collide() {
    let top = toplevel(&dev_null_tracker(), "top");
    let config = config(10);
    let topology = TopologyBuilder::new(&top, &config).build().unwrap();

    let mut seen: HashSet<_> = topology.addresses.iter().copied().collect();
    for (link, network) in topology.links.iter().zip(&topology.link_networks) {
        assert_eq!(network.prefix_len(), LINK_PREFIX_LEN);
        assert!(!network.overlaps(&config.shared_network));
        for device in link.devices() {
            let address = device.address().unwrap();
            assert!(network.contains(address));
            assert!(seen.insert(address), "{address} assigned twice");
        }
    }
    for (i, a) in topology.link_networks.iter().enumerate() {
        for b in &topology.link_networks[i + 1..] {
            assert!(!a.overlaps(b));
        }
    }
}

#[test]
fn shared_block_exhausted() {
    let top = toplevel(&dev_null_tracker(), "top");
    let mut config = config(7);
    config.shared_network = "10.1.1.0/29".parse().unwrap();
    assert!(TopologyBuilder::new(&top, &config).build().is_err());

    config.num_nodes = 6;
    let topology = TopologyBuilder::new(&top, &config).build().unwrap();
    assert_eq!(topology.addresses.len(), 6);
}

#[test]
fn link_block_exhausted() {
    let top = toplevel(&dev_null_tracker(), "top");
    let mut config = config(5);
    config.monitor_network = "10.2.0.0/28".parse().unwrap();
    assert!(TopologyBuilder::new(&top, &config).build().is_err());

    config.num_nodes = 4;
    TopologyBuilder::new(&top, &config).build().unwrap();
}

#[test]
fn zero_nodes() {
    assert!(Simulation::new(&dev_null_tracker(), config(0)).is_err());

    let top = toplevel(&dev_null_tracker(), "top");
    assert!(TopologyBuilder::new(&top, &config(0)).build().is_err());
}

#[test]
fn same_seed_same_positions() {
    let positions = |seed| {
        let top = toplevel(&dev_null_tracker(), "top");
        let mut config = config(4);
        config.seed = seed;
        let topology = TopologyBuilder::new(&top, &config).build().unwrap();
        topology.positions(SimTime::from_millis(30_000))
    };
    assert_eq!(positions(1), positions(1));
    assert_ne!(positions(1), positions(2));
}
