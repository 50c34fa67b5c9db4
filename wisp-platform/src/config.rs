// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Scenario configuration.
//!
//! Every field has a default so a configuration file only needs to set what
//! it changes. Layers are merged with [figment]: defaults, then an optional
//! TOML file, then `WISP_` environment variables (use `__` to reach nested
//! fields, e.g. `WISP_WIFI__TX_POWER_DBM`).

use std::path::Path;

use byte_unit::Byte;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize, de};
use wisp_engine::sim_error;
use wisp_engine::time::SimTime;
use wisp_engine::types::{SimError, SimResult};
use wisp_models::address::Ipv4Network;
use wisp_models::data_rate::DataRate;
use wisp_models::datagram::MAX_UDP_PAYLOAD;
use wisp_models::model_config::ModelConfig;
use wisp_models::point_to_point::PointToPointConfig;
use wisp_models::wifi::WifiPhyConfig;

pub const DEFAULT_NUM_NODES: usize = 10;
pub const DEFAULT_DURATION_S: f64 = 100.0;
pub const DEFAULT_PACKET_SIZE: u64 = 1024;
pub const DEFAULT_PACKET_COUNT: u64 = 100;
pub const DEFAULT_DATA_RATE: DataRate = DataRate::from_kbps(500);
pub const DEFAULT_PORT: u16 = 9;
pub const DEFAULT_MONITOR_PORT: u16 = 9999;
pub const DEFAULT_START_S: f64 = 1.0;
pub const DEFAULT_SEED: u64 = 1;
pub const DEFAULT_SHARED_NETWORK: &str = "10.1.1.0/24";
pub const DEFAULT_MONITOR_NETWORK: &str = "10.2.0.0/16";

/// Prefix given to environment variables that override the configuration.
pub const ENV_PREFIX: &str = "WISP_";

#[derive(Deserialize)]
#[serde(untagged)]
enum ByteValue {
    Number(u64),
    Text(String),
}

/// Parse a value which could be an integer or a string and return u64 value
///
/// The string can be a Byte string that specifies units, for example:
///  1024, 1KiB, 1.5KB
pub fn parse_byte_str<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: de::Deserializer<'de>,
{
    match ByteValue::deserialize(deserializer)? {
        ByteValue::Number(number) => Ok(number),
        ByteValue::Text(s) => {
            let ignore_case = false;
            let num_bytes = Byte::parse_str(&s, ignore_case).map_err(|e| {
                de::Error::custom(format!("Unable to parse {s} as Byte string: {e}"))
            })?;
            Ok(num_bytes.as_u64())
        }
    }
}

fn network(s: &str) -> Ipv4Network {
    s.parse().expect("default networks are valid")
}

/// All the parameters of the all-to-all wireless scenario.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of traffic nodes (the monitoring node is extra).
    pub num_nodes: usize,

    /// Generators stop and the port sink closes at this time.
    pub duration_s: f64,

    /// Payload bytes per datagram.
    #[serde(deserialize_with = "parse_byte_str")]
    pub packet_size: u64,

    /// Datagrams sent by each generator.
    pub packet_count: u64,

    pub data_rate: DataRate,

    /// Destination port of the generated traffic.
    pub port: u16,

    /// Port of the second monitoring sink.
    pub monitor_port: u16,

    /// Generators start at this time.
    pub start_s: f64,

    /// Seed for the mobility models.
    pub seed: u64,

    pub mobility: ModelConfig,
    pub monitor_mobility: ModelConfig,
    pub propagation_loss: ModelConfig,
    pub propagation_delay: ModelConfig,

    /// Block the shared medium addresses come from.
    pub shared_network: Ipv4Network,

    /// Block the per-link /30 networks are carved out of.
    pub monitor_network: Ipv4Network,

    pub wifi: WifiPhyConfig,
    pub p2p: PointToPointConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            num_nodes: DEFAULT_NUM_NODES,
            duration_s: DEFAULT_DURATION_S,
            packet_size: DEFAULT_PACKET_SIZE,
            packet_count: DEFAULT_PACKET_COUNT,
            data_rate: DEFAULT_DATA_RATE,
            port: DEFAULT_PORT,
            monitor_port: DEFAULT_MONITOR_PORT,
            start_s: DEFAULT_START_S,
            seed: DEFAULT_SEED,
            mobility: ModelConfig::new("RandomWalk2d")
                .with("x_min", -500.0)
                .with("x_max", 500.0)
                .with("y_min", -500.0)
                .with("y_max", 500.0),
            monitor_mobility: ModelConfig::new("ConstantPosition"),
            propagation_loss: ModelConfig::new("LogDistance"),
            propagation_delay: ModelConfig::new("ConstantSpeed"),
            shared_network: network(DEFAULT_SHARED_NETWORK),
            monitor_network: network(DEFAULT_MONITOR_NETWORK),
            wifi: WifiPhyConfig::default(),
            p2p: PointToPointConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// The layered configuration: defaults, then `file` if given, then the
    /// environment.
    #[must_use]
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(SimulationConfig::default()));
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Parse a configuration from TOML text on top of the defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, SimError> {
        Figment::from(Serialized::defaults(SimulationConfig::default()))
            .merge(Toml::string(s))
            .extract()
            .map_err(|e| SimError(format!("Invalid configuration: {e}")))
    }

    /// Check the parameters that would otherwise fail part way through a
    /// build.
    pub fn validate(&self) -> SimResult {
        if self.num_nodes == 0 {
            return sim_error!("at least one traffic node is required");
        }
        if self.duration_s.is_nan() || self.duration_s <= 0.0 {
            return sim_error!("duration must be positive, got {}s", self.duration_s);
        }
        if self.start_s.is_nan() || self.start_s < 0.0 || self.start_s > self.duration_s {
            return sim_error!(
                "start {}s must be within the duration {}s",
                self.start_s,
                self.duration_s
            );
        }
        if self.packet_size == 0 || self.packet_size > MAX_UDP_PAYLOAD as u64 {
            return sim_error!(
                "packet size {} must be between 1 and {MAX_UDP_PAYLOAD} bytes",
                self.packet_size
            );
        }
        if self.packet_count == 0 {
            return sim_error!("packet count must be non-zero");
        }
        if self.data_rate.bps() == 0 {
            return sim_error!("data rate must be non-zero");
        }
        if self.shared_network.overlaps(&self.monitor_network) {
            return sim_error!(
                "shared network {} overlaps monitor network {}",
                self.shared_network,
                self.monitor_network
            );
        }
        self.wifi.validate()?;
        self.p2p.validate()
    }

    #[must_use]
    pub fn start_time(&self) -> SimTime {
        SimTime::from_secs_f64(self.start_s)
    }

    #[must_use]
    pub fn stop_time(&self) -> SimTime {
        SimTime::from_secs_f64(self.duration_s)
    }

    /// The global stop, one second after the generators stop.
    #[must_use]
    pub fn end_time(&self) -> SimTime {
        SimTime::from_secs_f64(self.duration_s + 1.0)
    }
}
