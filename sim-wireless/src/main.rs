// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Simulate mobile nodes sending to each other over a shared wireless
//! channel while a monitoring node counts everything they send.
//!
//! Settings are taken from the defaults, then `--config`, then `WISP_*`
//! environment variables, then the command line.
use std::fs;
use std::io::BufWriter;
use std::path::PathBuf;
use std::rc::Rc;

use clap::Parser;
use figment::providers::Serialized;
use serde::Serialize;
use wisp_engine::types::SimError;
use wisp_models::capture::{AsciiTrace, Capture};
use wisp_platform::config::SimulationConfig;
use wisp_platform::simulation::run_scenario;
use wisp_track::builder::{TrackerConfig, TrackersConfig, setup_trackers};
use wisp_track::entity::toplevel;
use wisp_track::{Tracker, info};

/// Command-line arguments.
#[derive(Parser)]
#[command(about = "Wireless all-to-all traffic with a monitoring node")]
struct Cli {
    /// Enable logging to the console.
    #[arg(long, default_value = "false")]
    stdout: bool,

    /// Level of log message to display.
    #[arg(long, default_value = "Info")]
    stdout_level: log::Level,

    /// Set a regular expression for which entites should have logging level set
    /// to `--stdout-level`. Others will have level set to `Error`.
    #[arg(long, default_value = "")]
    stdout_filter_regex: String,

    /// Enable logging to a text file.
    #[arg(long, default_value = "false")]
    log: bool,

    /// Level of log message to write to the log file.
    #[arg(long, default_value = "Trace")]
    log_level: log::Level,

    /// Set a regular expression for which entites should have log file output
    /// level set to `--log-level`. Others will have level set to `Error`.
    #[arg(long, default_value = "")]
    log_filter_regex: String,

    /// The filename log output is written to.
    #[arg(long, default_value = "wireless.log")]
    log_file: String,

    /// Write an ASCII trace of the monitoring links.
    #[arg(long, default_value = "false")]
    capture: bool,

    /// The filename the ASCII trace is written to.
    #[arg(long, default_value = "wireless-capture.tr")]
    capture_file: String,

    /// TOML file with scenario settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of mobile traffic nodes.
    #[arg(long)]
    num_nodes: Option<usize>,

    /// Seconds until the generators stop.
    #[arg(long)]
    duration: Option<f64>,

    /// Payload size of each datagram, e.g. `1024` or `1KiB`.
    #[arg(long)]
    packet_size: Option<String>,

    /// Number of datagrams each generator sends.
    #[arg(long)]
    packet_count: Option<u64>,

    /// Rate of each generator, e.g. `500kb/s`.
    #[arg(long)]
    data_rate: Option<String>,

    /// Destination port of the generated traffic.
    #[arg(long)]
    port: Option<u16>,

    /// Seed for the mobility models.
    #[arg(long)]
    seed: Option<u64>,
}

/// The settings given on the command line, in configuration form.
#[derive(Serialize)]
struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    num_nodes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_s: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    packet_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    packet_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data_rate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

impl From<&Cli> for Overrides {
    fn from(args: &Cli) -> Self {
        Self {
            num_nodes: args.num_nodes,
            duration_s: args.duration,
            packet_size: args.packet_size.clone(),
            packet_count: args.packet_count,
            data_rate: args.data_rate.clone(),
            port: args.port,
            seed: args.seed,
        }
    }
}

fn setup_all_trackers(args: &Cli) -> Result<Tracker, SimError> {
    let config = TrackersConfig {
        stdout: TrackerConfig {
            enable: args.stdout,
            level: args.stdout_level,
            filter_regex: &args.stdout_filter_regex,
            file: None,
        },
        log_file: TrackerConfig {
            enable: args.log,
            level: args.log_level,
            filter_regex: &args.log_filter_regex,
            file: Some(&args.log_file),
        },
    };
    setup_trackers(&config).map_err(|e| SimError(e.to_string()))
}

fn load_config(args: &Cli) -> Result<SimulationConfig, SimError> {
    SimulationConfig::figment(args.config.as_deref())
        .merge(Serialized::defaults(Overrides::from(args)))
        .extract()
        .map_err(|e| SimError(format!("Invalid configuration: {e}")))
}

fn open_capture(path: &str) -> Result<Rc<dyn Capture>, SimError> {
    let file =
        fs::File::create(path).map_err(|e| SimError(format!("Unable to create {path}: {e}")))?;
    Ok(Rc::new(AsciiTrace::new(Box::new(BufWriter::new(file)))))
}

fn main() -> Result<(), SimError> {
    let args = Cli::parse();

    let tracker = setup_all_trackers(&args)?;
    let config = load_config(&args)?;
    let capture = if args.capture {
        Some(open_capture(&args.capture_file)?)
    } else {
        None
    };

    let top = toplevel(&tracker, "sim-wireless");
    info!(top ;
        "{} nodes for {}s, each sending {} x {}B at {} to port {}",
        config.num_nodes,
        config.duration_s,
        config.packet_count,
        config.packet_size,
        config.data_rate,
        config.port
    );

    let result = run_scenario(&tracker, &config, capture);
    tracker.shutdown();
    let summary = result?;

    print!("{summary}");
    if args.capture {
        println!("Capture written to {}", args.capture_file);
    }
    Ok(())
}
