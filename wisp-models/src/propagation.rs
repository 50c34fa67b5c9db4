// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Propagation loss and delay between two positions.

use wisp_engine::sim_error;
use wisp_engine::time::SimTime;
use wisp_engine::types::SimResult;

use crate::mobility::Position;
use crate::model_config::ModelConfig;

/// Speed of light in a vacuum (m/s).
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Loss of signal power between a transmitter and a receiver.
pub trait PropagationLoss {
    /// Received power (dBm) for a transmission at `tx_power_dbm`.
    fn rx_power_dbm(&self, tx_power_dbm: f64, from: &Position, to: &Position) -> f64;
}

/// Time taken for a signal to travel between two points.
pub trait PropagationDelay {
    fn delay(&self, from: &Position, to: &Position) -> SimTime;
}

/// Log-distance path loss.
///
/// `L = L0 + 10 n log10(d / d0)` for `d > d0`, and `L0` otherwise.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LogDistanceLoss {
    pub exponent: f64,
    /// Reference distance `d0` in metres.
    pub reference_distance: f64,
    /// Loss `L0` at the reference distance in dB.
    pub reference_loss: f64,
}

impl Default for LogDistanceLoss {
    fn default() -> Self {
        Self {
            exponent: 3.0,
            reference_distance: 1.0,
            reference_loss: 46.6777,
        }
    }
}

impl PropagationLoss for LogDistanceLoss {
    fn rx_power_dbm(&self, tx_power_dbm: f64, from: &Position, to: &Position) -> f64 {
        let distance = from.distance_to(to);
        if distance <= self.reference_distance {
            return tx_power_dbm - self.reference_loss;
        }
        let path_loss = 10.0 * self.exponent * (distance / self.reference_distance).log10();
        tx_power_dbm - self.reference_loss - path_loss
    }
}

/// Propagation at a constant speed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConstantSpeedDelay {
    pub speed: f64,
}

impl Default for ConstantSpeedDelay {
    fn default() -> Self {
        Self {
            speed: SPEED_OF_LIGHT,
        }
    }
}

impl PropagationDelay for ConstantSpeedDelay {
    fn delay(&self, from: &Position, to: &Position) -> SimTime {
        SimTime::from_secs_f64(from.distance_to(to) / self.speed)
    }
}

/// Build a loss model from its name and parameters.
///
/// Only `LogDistance` (`exponent`, `reference_distance`, `reference_loss`)
/// is supported.
pub fn build_loss(config: &ModelConfig) -> SimResult<Box<dyn PropagationLoss>> {
    match config.kind.as_str() {
        "LogDistance" => {
            config.check_params(&["exponent", "reference_distance", "reference_loss"])?;
            let defaults = LogDistanceLoss::default();
            let model = LogDistanceLoss {
                exponent: config.param_or("exponent", defaults.exponent),
                reference_distance: config
                    .param_or("reference_distance", defaults.reference_distance),
                reference_loss: config.param_or("reference_loss", defaults.reference_loss),
            };
            if model.reference_distance <= 0.0 {
                return sim_error!("LogDistance: reference_distance must be positive");
            }
            Ok(Box::new(model))
        }
        kind => sim_error!("unknown propagation loss model '{kind}'"),
    }
}

/// Build a delay model from its name and parameters.
///
/// Only `ConstantSpeed` (`speed`) is supported.
pub fn build_delay(config: &ModelConfig) -> SimResult<Box<dyn PropagationDelay>> {
    match config.kind.as_str() {
        "ConstantSpeed" => {
            config.check_params(&["speed"])?;
            let speed = config.param_or("speed", SPEED_OF_LIGHT);
            if speed <= 0.0 {
                return sim_error!("ConstantSpeed: speed must be positive");
            }
            Ok(Box::new(ConstantSpeedDelay { speed }))
        }
        kind => sim_error!("unknown propagation delay model '{kind}'"),
    }
}
