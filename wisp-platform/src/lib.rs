// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Build and run the all-to-all wireless scenario.
//!
//! A number of mobile traffic nodes share one wireless channel. Every node
//! runs a [traffic generator](wisp_components::traffic_gen) towards every
//! other node. Each traffic node also has a point-to-point link to a single
//! stationary monitoring node, which receives a copy of everything sent on
//! the shared channel and counts it in one or more
//! [sinks](wisp_components::sink).
//!
//! The usual entry point is [`run_scenario`](simulation::run_scenario); the
//! individual steps are available on [`Simulation`](simulation::Simulation).
//!
//! ```no_run
//! use wisp_platform::config::SimulationConfig;
//! use wisp_platform::simulation::run_scenario;
//! use wisp_track::tracker::dev_null_tracker;
//!
//! let config = SimulationConfig::default();
//! let summary = run_scenario(&dev_null_tracker(), &config, None).unwrap();
//! println!("{summary}");
//! ```

pub mod config;
pub mod network;
pub mod simulation;
pub mod topology;
