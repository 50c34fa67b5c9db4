// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Data rates in bits per second.
//!
//! Rates can be parsed from strings such as `"500kb/s"`, `"5Mbps"` or
//! `"65Mb/s"`. Decimal prefixes are used (`k` = 1000) and a capital `B`
//! denotes bytes rather than bits.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use wisp_engine::sim_error;
use wisp_engine::time::SimTime;
use wisp_engine::types::SimError;

const NS_PER_SEC: u128 = 1_000_000_000;

static RATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([0-9]+(?:\.[0-9]+)?)\s*([kKmMgG]?)(b/s|bps|B/s|Bps|bit/s)?\s*$")
        .expect("rate regex is valid")
});

/// A data rate in bits per second.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DataRate(u64);

impl DataRate {
    #[must_use]
    pub const fn from_bps(bps: u64) -> Self {
        Self(bps)
    }

    #[must_use]
    pub const fn from_kbps(kbps: u64) -> Self {
        Self(kbps * 1_000)
    }

    #[must_use]
    pub const fn from_mbps(mbps: u64) -> Self {
        Self(mbps * 1_000_000)
    }

    #[must_use]
    pub const fn bps(&self) -> u64 {
        self.0
    }

    /// Time taken to put `num_bytes` onto a medium at this rate.
    ///
    /// Rounded to the nearest nanosecond. A zero rate never completes.
    #[must_use]
    pub fn tx_time(&self, num_bytes: usize) -> SimTime {
        if self.0 == 0 {
            return SimTime::MAX;
        }
        let bits = num_bytes as u128 * 8;
        let bps = self.0 as u128;
        let ns = (bits * NS_PER_SEC + bps / 2) / bps;
        SimTime::from_ns(u64::try_from(ns).unwrap_or(u64::MAX))
    }
}

impl FromStr for DataRate {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some(caps) = RATE_RE.captures(s) else {
            return sim_error!("unable to parse data rate '{s}'");
        };
        let value: f64 = match caps[1].parse() {
            Ok(v) => v,
            Err(e) => return sim_error!("unable to parse data rate '{s}': {e}"),
        };
        let multiplier = match caps.get(2).map(|m| m.as_str()) {
            Some("k" | "K") => 1e3,
            Some("m" | "M") => 1e6,
            Some("g" | "G") => 1e9,
            _ => 1.0,
        };
        let bits_per_unit = match caps.get(3).map(|m| m.as_str()) {
            Some("B/s" | "Bps") => 8.0,
            _ => 1.0,
        };
        let bps = (value * multiplier * bits_per_unit).round();
        if bps < 1.0 || bps >= u64::MAX as f64 {
            return sim_error!("data rate '{s}' out of range");
        }
        Ok(Self(bps as u64))
    }
}

impl TryFrom<String> for DataRate {
    type Error = SimError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DataRate> for String {
    fn from(rate: DataRate) -> String {
        rate.to_string()
    }
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bps", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_units() {
        assert_eq!("500kb/s".parse::<DataRate>().unwrap(), DataRate::from_kbps(500));
        assert_eq!("5Mbps".parse::<DataRate>().unwrap(), DataRate::from_mbps(5));
        assert_eq!("65Mb/s".parse::<DataRate>().unwrap(), DataRate::from_mbps(65));
        assert_eq!("1.5Mbps".parse::<DataRate>().unwrap(), DataRate::from_bps(1_500_000));
        assert_eq!("1kB/s".parse::<DataRate>().unwrap(), DataRate::from_bps(8_000));
        assert_eq!("1200".parse::<DataRate>().unwrap(), DataRate::from_bps(1200));
    }

    #[test]
    fn parse_errors() {
        assert!("".parse::<DataRate>().is_err());
        assert!("fast".parse::<DataRate>().is_err());
        assert!("0kb/s".parse::<DataRate>().is_err());
        assert!("5Tb/s".parse::<DataRate>().is_err());
    }

    #[test]
    fn display_parses_back() {
        let rate = DataRate::from_kbps(500);
        assert_eq!(rate.to_string().parse::<DataRate>().unwrap(), rate);
    }

    #[test]
    fn tx_time() {
        let rate = DataRate::from_kbps(500);
        assert_eq!(rate.tx_time(1024), SimTime::from_ns(16_384_000));
        assert_eq!(DataRate::from_mbps(5).tx_time(1052), SimTime::from_ns(1_683_200));
        assert_eq!(DataRate::from_bps(0).tx_time(1), SimTime::MAX);
    }
}
