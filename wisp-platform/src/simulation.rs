// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! The orchestrator that builds and runs one scenario.
//!
//! ```text
//! Unbuilt --build_topology--> Wired --traffic matrix + sink--> Populated
//!                                                                  |
//!                         Terminated <--run_to_completion-- Running
//! ```
//!
//! Any operation called in the wrong state fails without side effects.

use std::fmt;
use std::net::SocketAddrV4;
use std::rc::Rc;

use wisp_components::sink::{PacketSink, SinkStats};
use wisp_components::traffic_gen::TrafficGenerator;
use wisp_components::{Application, Next};
use wisp_engine::engine::Engine;
use wisp_engine::scheduler::{EventHandler, EventId, Scheduler};
use wisp_engine::sim_error;
use wisp_engine::time::SimTime;
use wisp_engine::types::SimResult;
use wisp_models::capture::Capture;
use wisp_models::data_rate::DataRate;
use wisp_models::transport::UdpSocket;
use wisp_track::entity::{Entity, GetEntity};
use wisp_track::{Tracker, debug, info};

use crate::config::SimulationConfig;
use crate::network::{AppId, Diagnostic, NetCounters, NetEvent, Network, NodeStack};
use crate::topology::{NodeId, Topology, TopologyBuilder};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimulationState {
    Unbuilt,
    Wired,
    Populated,
    Running,
    Terminated,
}

impl fmt::Display for SimulationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

struct HostedApp {
    app: Box<dyn Application>,
    node: NodeId,
    /// The one outstanding timer of this application.
    pending: Option<EventId>,
}

/// The network plus every application running on it.
struct World {
    network: Network,
    apps: Vec<HostedApp>,
}

impl World {
    fn host(&mut self, app: Box<dyn Application>, node: NodeId) -> AppId {
        let id = AppId(self.apps.len());
        debug!(self.network.entity ; "{} on {node} is {id}", app.entity());
        self.apps.push(HostedApp {
            app,
            node,
            pending: None,
        });
        id
    }

    fn with_app<T>(
        &mut self,
        scheduler: &mut Scheduler<NetEvent>,
        id: AppId,
        f: impl FnOnce(&mut dyn Application, &mut NodeStack<'_>) -> SimResult<T>,
    ) -> SimResult<T> {
        let Some(hosted) = self.apps.get_mut(id.0) else {
            return sim_error!("{}: no {id}", self.network.entity);
        };
        let mut stack = self.network.stack(scheduler, hosted.node, id);
        f(hosted.app.as_mut(), &mut stack)
    }

    fn cancel_pending(&mut self, scheduler: &mut Scheduler<NetEvent>, id: AppId) {
        if let Some(pending) = self.apps.get_mut(id.0).and_then(|hosted| hosted.pending.take()) {
            scheduler.cancel(pending);
        }
    }

    fn reschedule(&mut self, scheduler: &mut Scheduler<NetEvent>, id: AppId, next: Next) {
        self.cancel_pending(scheduler, id);
        if let (Next::After(delay), Some(hosted)) = (next, self.apps.get_mut(id.0)) {
            hosted.pending = Some(scheduler.schedule(delay, NetEvent::AppTimer(id)));
        }
    }

    fn stop_app(&mut self, scheduler: &mut Scheduler<NetEvent>, id: AppId) -> SimResult {
        self.cancel_pending(scheduler, id);
        let now = scheduler.now();
        self.with_app(scheduler, id, |app, stack| app.deactivate(now, stack))
    }

    /// Stop every application and discard anything still queued.
    fn teardown(&mut self, scheduler: &mut Scheduler<NetEvent>) -> SimResult {
        for i in 0..self.apps.len() {
            self.stop_app(scheduler, AppId(i))?;
        }
        self.network.flush_captures();
        scheduler.clear();
        Ok(())
    }
}

impl EventHandler<NetEvent> for World {
    fn handle(&mut self, scheduler: &mut Scheduler<NetEvent>, event: NetEvent) -> SimResult {
        let now = scheduler.now();
        match event {
            NetEvent::AppStart(id) => {
                let next = self.with_app(scheduler, id, |app, stack| app.activate(now, stack))?;
                self.reschedule(scheduler, id, next);
            }
            NetEvent::AppTimer(id) => {
                if let Some(hosted) = self.apps.get_mut(id.0) {
                    hosted.pending = None;
                }
                let next = self.with_app(scheduler, id, |app, stack| app.fire(now, stack))?;
                self.reschedule(scheduler, id, next);
            }
            NetEvent::AppStop(id) => self.stop_app(scheduler, id)?,
            event => {
                if let Some((id, datagram)) = self.network.handle(scheduler, event)? {
                    if let Some(hosted) = self.apps.get_mut(id.0) {
                        hosted.app.receive(now, &datagram);
                    }
                }
            }
        }
        Ok(())
    }
}

/// What happened during a run.
pub struct RunSummary {
    pub end_time: SimTime,
    pub num_generators: usize,
    pub counters: NetCounters,
    pub sinks: Vec<Rc<SinkStats>>,
    pub diagnostics: Vec<Diagnostic>,
}

impl RunSummary {
    /// The first sink installed on `port`.
    #[must_use]
    pub fn sink(&self, port: u16) -> Option<&Rc<SinkStats>> {
        self.sinks.iter().find(|sink| sink.port() == port)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counters = &self.counters;
        writeln!(f, "Finished at {}", self.end_time)?;
        writeln!(f, "  generators: {}", self.num_generators)?;
        writeln!(f, "  sent on shared medium: {}", counters.sent)?;
        writeln!(f, "  delivered on shared medium: {}", counters.received)?;
        writeln!(f, "  mirrored to monitor: {}", counters.mirrored)?;
        writeln!(f, "  arrived at monitor: {}", counters.monitored)?;
        writeln!(f, "  dropped: {}", counters.dropped())?;
        for (reason, count) in &counters.drops {
            writeln!(f, "    {reason}: {count}")?;
        }
        for sink in &self.sinks {
            writeln!(f, "  sink {sink}")?;
        }
        writeln!(f, "  diagnostics: {}", self.diagnostics.len())?;
        for diagnostic in &self.diagnostics {
            writeln!(f, "    {diagnostic}")?;
        }
        Ok(())
    }
}

pub struct Simulation {
    engine: Engine<NetEvent>,
    config: SimulationConfig,
    state: SimulationState,
    world: Option<World>,
    /// Set once a traffic matrix is installed, even an empty one.
    matrix_built: bool,
    num_generators: usize,
    sinks: Vec<Rc<SinkStats>>,
}

impl Simulation {
    pub fn new(tracker: &Tracker, config: SimulationConfig) -> SimResult<Self> {
        config.validate()?;
        Ok(Self {
            engine: Engine::new(tracker),
            config,
            state: SimulationState::Unbuilt,
            world: None,
            matrix_built: false,
            num_generators: 0,
            sinks: Vec::new(),
        })
    }

    #[must_use]
    pub fn state(&self) -> SimulationState {
        self.state
    }

    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    #[must_use]
    pub fn topology(&self) -> Option<&Topology> {
        self.world.as_ref().map(|world| world.network.topology())
    }

    #[must_use]
    pub fn network(&self) -> Option<&Network> {
        self.world.as_ref().map(|world| &world.network)
    }

    #[must_use]
    pub fn num_generators(&self) -> usize {
        self.num_generators
    }

    #[must_use]
    pub fn num_pending_events(&self) -> usize {
        self.engine.scheduler().num_pending()
    }

    #[must_use]
    pub fn time_now(&self) -> SimTime {
        self.engine.time_now()
    }

    fn expect_state(&self, allowed: &[SimulationState], action: &str) -> SimResult {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            sim_error!("{}: cannot {action} in state {}", self.entity(), self.state)
        }
    }

    fn check_window(&self, start: SimTime, stop: SimTime) -> SimResult {
        if start > stop {
            return sim_error!("{}: start {start} is after stop {stop}", self.entity());
        }
        Ok(())
    }

    fn world_mut(&mut self) -> SimResult<&mut World> {
        match self.world.as_mut() {
            Some(world) => Ok(world),
            None => sim_error!("no topology has been built"),
        }
    }

    fn update_populated(&mut self) {
        if self.state == SimulationState::Wired && self.matrix_built && !self.sinks.is_empty() {
            self.state = SimulationState::Populated;
            info!(self.entity() ; "populated: {} generators, {} sinks",
                self.num_generators, self.sinks.len());
        }
    }

    /// Create and address the nodes, the shared medium and the monitoring
    /// links.
    pub fn build_topology(&mut self) -> SimResult {
        self.expect_state(&[SimulationState::Unbuilt], "build the topology")?;
        let topology = TopologyBuilder::new(self.engine.top(), &self.config).build()?;
        debug!(self.entity() ; "\n{topology}");
        self.world = Some(World {
            network: Network::new(self.engine.top(), topology),
            apps: Vec::new(),
        });
        self.state = SimulationState::Wired;
        Ok(())
    }

    /// Attach `capture` to both ends of every monitoring link.
    pub fn attach_capture(&self, capture: &Rc<dyn Capture>) -> SimResult {
        self.expect_state(
            &[SimulationState::Wired, SimulationState::Populated],
            "attach a capture",
        )?;
        if let Some(topology) = self.topology() {
            for link in &topology.links {
                for device in link.devices() {
                    device.attach_capture(capture.clone());
                }
            }
        }
        Ok(())
    }

    /// Install one generator for every ordered pair of distinct traffic
    /// nodes, each sending to the shared medium address of its peer.
    ///
    /// Returns the (sender, receiver) pairs in the order they were
    /// installed.
    pub fn build_traffic_matrix(
        &mut self,
        port: u16,
        packet_size: usize,
        packet_count: u64,
        data_rate: DataRate,
        start: SimTime,
        stop: SimTime,
    ) -> SimResult<Vec<(NodeId, NodeId)>> {
        self.expect_state(&[SimulationState::Wired], "build the traffic matrix")?;
        if self.matrix_built {
            return sim_error!("{}: traffic matrix already built", self.entity());
        }
        self.check_window(start, stop)?;

        // Configure everything before hosting anything so a failure leaves
        // no partial matrix behind
        let world = self.world_mut()?;
        let topology = world.network.topology();
        let mut generators = Vec::new();
        for sender in &topology.nodes.traffic {
            let from = sender.id();
            for (j, address) in topology.addresses.iter().enumerate() {
                let to = NodeId(j);
                if to == from {
                    continue;
                }
                let mut generator = TrafficGenerator::new(&sender.entity, &format!("gen{}->{j}", from.0));
                let socket = UdpSocket::new(&generator.entity, "socket");
                generator.configure(
                    socket,
                    SocketAddrV4::new(*address, port),
                    packet_size,
                    packet_count,
                    data_rate,
                )?;
                generators.push((from, to, generator));
            }
        }

        let Some(world) = self.world.as_mut() else {
            return sim_error!("no topology has been built");
        };
        let scheduler = self.engine.scheduler_mut();
        let mut pairs = Vec::with_capacity(generators.len());
        for (from, to, generator) in generators {
            let id = world.host(Box::new(generator), from);
            scheduler.schedule_at(start, NetEvent::AppStart(id))?;
            scheduler.schedule_at(stop, NetEvent::AppStop(id))?;
            pairs.push((from, to));
        }

        self.matrix_built = true;
        self.num_generators = pairs.len();
        info!(self.entity() ; "{} generators to port {port}, {packet_count} x {packet_size}B at {data_rate}",
            self.num_generators);
        self.update_populated();
        Ok(pairs)
    }

    /// Install a sink on the monitoring node listening on `port` between
    /// `start` and `stop`.
    pub fn install_monitoring_sink(
        &mut self,
        port: u16,
        start: SimTime,
        stop: SimTime,
    ) -> SimResult<Rc<SinkStats>> {
        self.expect_state(
            &[SimulationState::Wired, SimulationState::Populated],
            "install a monitoring sink",
        )?;
        self.check_window(start, stop)?;

        let Some(world) = self.world.as_mut() else {
            return sim_error!("no topology has been built");
        };
        let monitor = &world.network.topology().nodes.monitor;
        let monitor_id = monitor.id();
        let sink = PacketSink::new(&monitor.entity, &format!("sink{port}"), port);
        let stats = sink.stats();
        let id = world.host(Box::new(sink), monitor_id);

        let scheduler = self.engine.scheduler_mut();
        scheduler.schedule_at(start, NetEvent::AppStart(id))?;
        scheduler.schedule_at(stop, NetEvent::AppStop(id))?;

        self.sinks.push(stats.clone());
        self.update_populated();
        Ok(stats)
    }

    /// Run until `stop` (or until nothing is left to do), then stop every
    /// application and release the network.
    pub fn run_to_completion(&mut self, stop: SimTime) -> SimResult<RunSummary> {
        self.expect_state(&[SimulationState::Populated], "run")?;
        let Some(mut world) = self.world.take() else {
            return sim_error!("no topology has been built");
        };

        self.state = SimulationState::Running;
        let result = self
            .engine
            .scheduler_mut()
            .stop_at(stop)
            .and_then(|_| self.engine.run(&mut world));
        let teardown = world.teardown(self.engine.scheduler_mut());
        self.state = SimulationState::Terminated;

        let summary = RunSummary {
            end_time: self.engine.time_now(),
            num_generators: self.num_generators,
            counters: world.network.counters().clone(),
            sinks: self.sinks.clone(),
            diagnostics: world.network.diagnostics().to_vec(),
        };
        self.world = Some(world);
        result?;
        teardown?;
        info!(self.entity() ; "finished at {}", summary.end_time);
        Ok(summary)
    }
}

impl GetEntity for Simulation {
    fn entity(&self) -> &Rc<Entity> {
        self.engine.top()
    }
}

/// Build and run the complete scenario described by `config`.
///
/// Sinks listen on `config.port` until the generators stop and on
/// `config.monitor_port` until the end of the run, one second later.
pub fn run_scenario(
    tracker: &Tracker,
    config: &SimulationConfig,
    capture: Option<Rc<dyn Capture>>,
) -> SimResult<RunSummary> {
    let mut simulation = Simulation::new(tracker, config.clone())?;
    simulation.build_topology()?;
    if let Some(capture) = &capture {
        simulation.attach_capture(capture)?;
    }

    let Ok(packet_size) = usize::try_from(config.packet_size) else {
        return sim_error!("packet size {} too large", config.packet_size);
    };
    simulation.build_traffic_matrix(
        config.port,
        packet_size,
        config.packet_count,
        config.data_rate,
        config.start_time(),
        config.stop_time(),
    )?;
    simulation.install_monitoring_sink(config.port, SimTime::ZERO, config.stop_time())?;
    simulation.install_monitoring_sink(config.monitor_port, SimTime::ZERO, config.end_time())?;
    simulation.run_to_completion(config.end_time())
}
