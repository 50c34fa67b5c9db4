// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use std::net::{Ipv4Addr, SocketAddrV4};

use approx::assert_relative_eq;
use wisp_components::traffic_gen::{GeneratorState, MESSAGE, TrafficGenerator};
use wisp_components::{Application, Next};
use wisp_engine::engine::Engine;
use wisp_engine::scheduler::{EventHandler, EventId, Scheduler};
use wisp_engine::test_helpers::start_test;
use wisp_engine::time::SimTime;
use wisp_engine::types::SimResult;
use wisp_models::data_rate::DataRate;
use wisp_models::test_helpers::RecordingStack;
use wisp_models::transport::{TransportError, UdpSocket};

#[derive(Debug, Clone, Copy)]
enum AppEvent {
    Start,
    Timer,
    Stop,
}

/// Hosts a single generator the way a node does: it owns the one pending
/// timer and cancels it on stop.
struct Host {
    generator: TrafficGenerator,
    stack: RecordingStack,
    pending: Option<EventId>,
    send_times: Vec<SimTime>,
}

impl Host {
    fn reschedule(&mut self, scheduler: &mut Scheduler<AppEvent>, next: Next) {
        if let Some(pending) = self.pending.take() {
            scheduler.cancel(pending);
        }
        if let Next::After(delay) = next {
            self.pending = Some(scheduler.schedule(delay, AppEvent::Timer));
        }
    }
}

impl EventHandler<AppEvent> for Host {
    fn handle(&mut self, scheduler: &mut Scheduler<AppEvent>, event: AppEvent) -> SimResult {
        let now = scheduler.now();
        let sent_before = self.generator.num_sent();
        match event {
            AppEvent::Start => {
                let next = self.generator.activate(now, &mut self.stack)?;
                self.reschedule(scheduler, next);
            }
            AppEvent::Timer => {
                self.pending = None;
                let next = self.generator.fire(now, &mut self.stack)?;
                self.reschedule(scheduler, next);
            }
            AppEvent::Stop => {
                if let Some(pending) = self.pending.take() {
                    scheduler.cancel(pending);
                }
                self.generator.deactivate(now, &mut self.stack)?;
            }
        }
        if self.generator.num_sent() > sent_before {
            self.send_times.push(now);
        }
        Ok(())
    }
}

fn peer() -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 2), 9)
}

fn setup(
    packet_size: usize,
    packet_count: u64,
    rate: DataRate,
    start: SimTime,
    stop: SimTime,
) -> (Engine<AppEvent>, Host) {
    let mut engine = start_test(file!());
    let mut generator = TrafficGenerator::new(engine.top(), "gen0->1");
    let socket = UdpSocket::new(&generator.entity, "socket");
    generator
        .configure(socket, peer(), packet_size, packet_count, rate)
        .unwrap();

    engine
        .scheduler_mut()
        .schedule_at(start, AppEvent::Start)
        .unwrap();
    engine
        .scheduler_mut()
        .schedule_at(stop, AppEvent::Stop)
        .unwrap();

    let host = Host {
        generator,
        stack: RecordingStack::new(Ipv4Addr::new(10, 1, 1, 1)),
        pending: None,
        send_times: Vec::new(),
    };
    (engine, host)
}

fn run_count(packet_count: u64) -> Host {
    let (mut engine, mut host) = setup(
        1024,
        packet_count,
        DataRate::from_kbps(500),
        SimTime::from_millis(1000),
        SimTime::from_millis(100_000),
    );
    engine.run(&mut host).unwrap();
    host
}

#[test]
fn sends_exactly_one() {
    let host = run_count(1);
    assert_eq!(host.stack.sent().len(), 1);
    assert_eq!(host.send_times, vec![SimTime::from_millis(1000)]);
    assert_eq!(host.generator.state(), GeneratorState::Terminated);
}

#[test]
fn sends_exactly_five() {
    let host = run_count(5);
    assert_eq!(host.stack.sent().len(), 5);
    assert_eq!(host.generator.num_sent(), 5);
    assert_eq!(host.generator.remaining(), 0);
}

#[test]
fn sends_exactly_one_hundred() {
    let host = run_count(100);
    assert_eq!(host.stack.sent().len(), 100);
    let last = *host.send_times.last().unwrap();
    assert_eq!(last, SimTime::from_millis(1000) + SimTime::from_ns(99 * 16_384_000));
}

#[test]
fn paced_at_data_rate() {
    let host = run_count(5);
    let expected_s = 1024.0 * 8.0 / 500_000.0;
    assert_relative_eq!(expected_s, 0.016384);
    for pair in host.send_times.windows(2) {
        assert_relative_eq!((pair[1] - pair[0]).as_secs_f64(), expected_s, epsilon = 1e-12);
    }
    assert_eq!(host.generator.interval(), Some(SimTime::from_ns(16_384_000)));
}

#[test]
fn payloads_carry_message() {
    let host = run_count(2);
    for datagram in host.stack.sent() {
        assert_eq!(datagram.payload().len(), 1024);
        assert_eq!(&datagram.payload()[..MESSAGE.len()], MESSAGE);
        assert_eq!(datagram.dst(), peer());
        assert_eq!(datagram.header().length, 1032);
    }
}

#[test]
fn stop_cancels_pending_send() {
    // Sends at 1000ms, 1016.384ms, 1032.768ms then stop at 1040ms
    let (mut engine, mut host) = setup(
        1024,
        100,
        DataRate::from_kbps(500),
        SimTime::from_millis(1000),
        SimTime::from_millis(1040),
    );
    engine.run(&mut host).unwrap();

    assert_eq!(host.stack.sent().len(), 3);
    assert!(host.send_times.iter().all(|t| *t <= SimTime::from_millis(1040)));
    assert_eq!(host.generator.state(), GeneratorState::Terminated);
    assert_eq!(host.generator.remaining(), 97);
    assert_eq!(engine.scheduler().num_pending(), 0);
    assert!(!host.stack.is_bound(49153));
}

#[test]
fn stop_after_exhaustion_is_safe() {
    let (mut engine, mut host) = setup(
        1024,
        2,
        DataRate::from_kbps(500),
        SimTime::from_millis(1000),
        SimTime::from_millis(2000),
    );
    engine.run(&mut host).unwrap();
    assert_eq!(host.stack.sent().len(), 2);

    // A second stop is a no-op
    host.generator
        .deactivate(engine.time_now(), &mut host.stack)
        .unwrap();
    assert_eq!(host.generator.state(), GeneratorState::Terminated);
}

#[test]
fn transport_failure_consumes_budget() {
    let (mut engine, mut host) = setup(
        1024,
        3,
        DataRate::from_kbps(500),
        SimTime::from_millis(1000),
        SimTime::from_millis(100_000),
    );
    host.stack
        .fail_next_send(TransportError::NoRoute(Ipv4Addr::new(10, 1, 1, 2)));
    engine.run(&mut host).unwrap();

    assert_eq!(host.stack.sent().len(), 2);
    assert_eq!(host.generator.num_sent(), 2);
    assert_eq!(host.generator.num_failed(), 1);
    assert_eq!(host.stack.failures().len(), 1);
    assert_eq!(host.stack.failures()[0].0, "top::gen0->1");
}

#[test]
fn configuration_errors() {
    let engine: Engine<AppEvent> = start_test(file!());
    let rate = DataRate::from_kbps(500);

    for (size, count, rate) in [
        (0, 1, rate),
        (1024, 0, rate),
        (1024, 1, DataRate::from_bps(0)),
    ] {
        let mut generator = TrafficGenerator::new(engine.top(), "gen");
        let socket = UdpSocket::new(&generator.entity, "socket");
        assert!(generator.configure(socket, peer(), size, count, rate).is_err());
        assert_eq!(generator.state(), GeneratorState::Unconfigured);
    }

    let mut generator = TrafficGenerator::new(engine.top(), "gen");
    let socket = UdpSocket::new(&generator.entity, "socket");
    generator.configure(socket, peer(), 1024, 1, rate).unwrap();
    let socket = UdpSocket::new(&generator.entity, "socket2");
    assert!(generator.configure(socket, peer(), 1024, 1, rate).is_err());
}

#[test]
fn lifecycle_errors() {
    let engine: Engine<AppEvent> = start_test(file!());
    let mut stack = RecordingStack::new(Ipv4Addr::new(10, 1, 1, 1));

    let mut generator = TrafficGenerator::new(engine.top(), "gen");
    assert!(generator.activate(SimTime::ZERO, &mut stack).is_err());
    assert!(stack.sent().is_empty());

    let socket = UdpSocket::new(&generator.entity, "socket");
    generator
        .configure(socket, peer(), 1024, 1, DataRate::from_kbps(500))
        .unwrap();
    assert_eq!(
        generator.activate(SimTime::ZERO, &mut stack).unwrap(),
        Next::Done
    );
    assert_eq!(generator.state(), GeneratorState::Terminated);
    assert!(generator.activate(SimTime::ZERO, &mut stack).is_err());
    assert_eq!(stack.sent().len(), 1);
}
