// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use approx::assert_relative_eq;
use wisp_engine::scheduler::{EventHandler, EventId, Scheduler};
use wisp_engine::test_helpers::start_test;
use wisp_engine::time::SimTime;
use wisp_engine::types::{SimError, SimResult};
use wisp_engine::sim_error;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Ev {
    Tick,
    Cancel,
    Fail,
}

#[derive(Default)]
struct Recorder {
    ticks: Vec<SimTime>,
    pending: Option<EventId>,
}

impl EventHandler<Ev> for Recorder {
    fn handle(&mut self, scheduler: &mut Scheduler<Ev>, event: Ev) -> SimResult {
        match event {
            Ev::Tick => {
                self.ticks.push(scheduler.now());
                self.pending = Some(scheduler.schedule(SimTime::from_millis(10), Ev::Tick));
            }
            Ev::Cancel => {
                if let Some(pending) = self.pending.take() {
                    scheduler.cancel(pending);
                }
            }
            Ev::Fail => return sim_error!("failed at {}", scheduler.now()),
        }
        Ok(())
    }
}

#[test]
fn cancel_stops_ticking() {
    let mut engine = start_test(file!());
    let mut recorder = Recorder::default();
    engine.scheduler_mut().schedule(SimTime::ZERO, Ev::Tick);
    engine
        .scheduler_mut()
        .schedule(SimTime::from_millis(35), Ev::Cancel);

    engine.run(&mut recorder).unwrap();

    assert_eq!(
        recorder.ticks,
        vec![
            SimTime::ZERO,
            SimTime::from_millis(10),
            SimTime::from_millis(20),
            SimTime::from_millis(30)
        ]
    );
    assert_eq!(engine.time_now(), SimTime::from_millis(35));
    assert_eq!(engine.scheduler().num_pending(), 0);
}

#[test]
fn stop_ends_run() {
    let mut engine = start_test(file!());
    let mut recorder = Recorder::default();
    engine.scheduler_mut().schedule(SimTime::ZERO, Ev::Tick);
    engine
        .scheduler_mut()
        .stop_at(SimTime::from_millis(25))
        .unwrap();

    engine.run(&mut recorder).unwrap();

    assert_eq!(recorder.ticks.len(), 3);
    assert_relative_eq!(engine.time_now_ns(), 25_000_000.0);
    assert!(engine.scheduler().is_stopped());
}

#[test]
fn handler_error_ends_run() {
    let mut engine = start_test(file!());
    let mut recorder = Recorder::default();
    engine.scheduler_mut().schedule(SimTime::ZERO, Ev::Tick);
    engine
        .scheduler_mut()
        .schedule(SimTime::from_millis(15), Ev::Fail);

    let result = engine.run(&mut recorder);
    assert_eq!(
        result,
        Err(SimError("failed at 0.015000000s".to_string()))
    );
    assert_eq!(recorder.ticks.len(), 2);
}
