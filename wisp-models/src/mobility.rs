// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Node mobility.
//!
//! Positions are only ever requested for the current simulated time, which
//! never decreases, so models advance lazily when queried.

use std::f64::consts::TAU;
use std::fmt;

use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use wisp_engine::sim_error;
use wisp_engine::time::SimTime;
use wisp_engine::types::SimResult;

use crate::model_config::ModelConfig;

/// A point on the plane in metres.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn distance_to(&self, other: &Position) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
    }
}

/// An axis aligned rectangle in metres.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rectangle {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Rectangle {
    pub fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> SimResult<Self> {
        if !(x_min < x_max && y_min < y_max) {
            return sim_error!("invalid bounds x [{x_min}, {x_max}] y [{y_min}, {y_max}]");
        }
        Ok(Self {
            x_min,
            x_max,
            y_min,
            y_max,
        })
    }

    #[must_use]
    pub fn contains(&self, p: &Position) -> bool {
        p.x >= self.x_min && p.x <= self.x_max && p.y >= self.y_min && p.y <= self.y_max
    }

    fn clamp(&self, p: Position) -> Position {
        Position::new(
            p.x.clamp(self.x_min, self.x_max),
            p.y.clamp(self.y_min, self.y_max),
        )
    }
}

/// Anything that can report where a node is.
pub trait MobilityModel {
    /// Position at time `now`. Calls must not go back in time.
    fn position_at(&mut self, now: SimTime) -> Position;
}

/// A node that never moves.
pub struct ConstantPosition {
    position: Position,
}

impl ConstantPosition {
    #[must_use]
    pub fn new(position: Position) -> Self {
        Self { position }
    }
}

impl MobilityModel for ConstantPosition {
    fn position_at(&mut self, _now: SimTime) -> Position {
        self.position
    }
}

/// Parameters of a [`RandomWalk2d`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RandomWalkConfig {
    pub bounds: Rectangle,
    pub min_speed: f64,
    pub max_speed: f64,
    /// Distance travelled before a new speed and direction are chosen.
    pub distance: f64,
}

impl RandomWalkConfig {
    fn validate(&self) -> SimResult {
        if !(self.min_speed > 0.0 && self.min_speed <= self.max_speed) {
            return sim_error!(
                "random walk speed range [{}, {}] invalid",
                self.min_speed,
                self.max_speed
            );
        }
        if self.distance <= 0.0 {
            return sim_error!("random walk distance {} must be positive", self.distance);
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
enum SegmentEnd {
    /// The walk reaches the end of its leg.
    LegDone,
    /// The walk hits a vertical and/or horizontal boundary.
    Rebound { x_wall: bool, y_wall: bool },
}

/// A 2-D random walk in distance mode.
///
/// Each leg picks a speed uniformly from `[min_speed, max_speed]` and a
/// direction uniformly from `[0, 2pi)` then travels `distance` metres.
/// Hitting the bounds reflects the velocity and the leg continues.
pub struct RandomWalk2d {
    config: RandomWalkConfig,
    rng: StdRng,
    origin: Position,
    velocity: (f64, f64),
    segment_start: SimTime,
    segment_end: SimTime,
    end_kind: SegmentEnd,
    leg_end: SimTime,
}

impl RandomWalk2d {
    pub fn new(config: RandomWalkConfig, start: Position, rng: StdRng) -> SimResult<Self> {
        config.validate()?;
        if !config.bounds.contains(&start) {
            return sim_error!("random walk start {start} outside bounds");
        }
        let mut walk = Self {
            config,
            rng,
            origin: start,
            velocity: (0.0, 0.0),
            segment_start: SimTime::ZERO,
            segment_end: SimTime::ZERO,
            end_kind: SegmentEnd::LegDone,
            leg_end: SimTime::ZERO,
        };
        walk.start_leg(SimTime::ZERO, start);
        Ok(walk)
    }

    fn start_leg(&mut self, now: SimTime, from: Position) {
        let speed = self
            .rng
            .gen_range(self.config.min_speed..=self.config.max_speed);
        let direction = self.rng.gen_range(0.0..TAU);
        self.velocity = (speed * direction.cos(), speed * direction.sin());
        self.leg_end = now + SimTime::from_secs_f64(self.config.distance / speed);
        self.start_segment(now, from);
    }

    fn start_segment(&mut self, now: SimTime, from: Position) {
        self.origin = from;
        self.segment_start = now;

        let bounds = &self.config.bounds;
        let (vx, vy) = self.velocity;
        let time_to = |pos: f64, v: f64, min: f64, max: f64| {
            if v > 0.0 {
                (max - pos) / v
            } else if v < 0.0 {
                (min - pos) / v
            } else {
                f64::INFINITY
            }
        };
        let tx = time_to(from.x, vx, bounds.x_min, bounds.x_max);
        let ty = time_to(from.y, vy, bounds.y_min, bounds.y_max);
        let t_wall = tx.min(ty);

        let leg_left = (self.leg_end - now).as_secs_f64();
        if t_wall < leg_left {
            self.segment_end = now + SimTime::from_secs_f64(t_wall);
            self.end_kind = SegmentEnd::Rebound {
                x_wall: tx <= ty,
                y_wall: ty <= tx,
            };
        } else {
            self.segment_end = self.leg_end;
            self.end_kind = SegmentEnd::LegDone;
        }
    }

    fn position_in_segment(&self, now: SimTime) -> Position {
        let dt = (now - self.segment_start).as_secs_f64();
        self.config.bounds.clamp(Position::new(
            self.origin.x + self.velocity.0 * dt,
            self.origin.y + self.velocity.1 * dt,
        ))
    }

    /// Current velocity in m/s.
    #[must_use]
    pub fn velocity(&self) -> (f64, f64) {
        self.velocity
    }
}

impl MobilityModel for RandomWalk2d {
    fn position_at(&mut self, now: SimTime) -> Position {
        while self.segment_end <= now {
            let end = self.segment_end;
            let pos = self.position_in_segment(end);
            match self.end_kind {
                SegmentEnd::LegDone => self.start_leg(end, pos),
                SegmentEnd::Rebound { x_wall, y_wall } => {
                    if x_wall {
                        self.velocity.0 = -self.velocity.0;
                    }
                    if y_wall {
                        self.velocity.1 = -self.velocity.1;
                    }
                    self.start_segment(end, pos);
                }
            }
        }
        self.position_in_segment(now)
    }
}

/// Build a mobility model from its name and parameters.
///
/// Supported kinds:
///  - `ConstantPosition`: `x`, `y`
///  - `RandomWalk2d`: `x_min`, `x_max`, `y_min`, `y_max`, `min_speed`,
///    `max_speed`, `distance`, and the start position `x`, `y`
pub fn build_mobility(config: &ModelConfig, rng: StdRng) -> SimResult<Box<dyn MobilityModel>> {
    let start = Position::new(config.param_or("x", 0.0), config.param_or("y", 0.0));
    match config.kind.as_str() {
        "ConstantPosition" => {
            config.check_params(&["x", "y"])?;
            Ok(Box::new(ConstantPosition::new(start)))
        }
        "RandomWalk2d" => {
            config.check_params(&[
                "x", "y", "x_min", "x_max", "y_min", "y_max", "min_speed", "max_speed",
                "distance",
            ])?;
            let bounds = Rectangle::new(
                config.param_or("x_min", -500.0),
                config.param_or("x_max", 500.0),
                config.param_or("y_min", -500.0),
                config.param_or("y_max", 500.0),
            )?;
            let walk_config = RandomWalkConfig {
                bounds,
                min_speed: config.param_or("min_speed", 2.0),
                max_speed: config.param_or("max_speed", 4.0),
                distance: config.param_or("distance", 1.0),
            };
            Ok(Box::new(RandomWalk2d::new(walk_config, start, rng)?))
        }
        kind => sim_error!("unknown mobility model '{kind}'"),
    }
}
