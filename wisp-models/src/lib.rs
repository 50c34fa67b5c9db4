// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Models of the network substrate that applications run over.
//!
//! These are deliberately simple: they decide where datagrams go and when
//! they arrive, but make no claim of physical fidelity. None of the models
//! schedule events themselves; they return what happened and leave the
//! scheduling to the owner of the
//! [Scheduler](wisp_engine::scheduler::Scheduler).

pub mod address;
pub mod capture;
pub mod data_rate;
pub mod datagram;
pub mod mobility;
pub mod model_config;
pub mod point_to_point;
pub mod propagation;
pub mod test_helpers;
pub mod transport;
pub mod wifi;
