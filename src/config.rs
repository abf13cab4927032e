//! Host configuration

use std::time::Duration;

use cadence_core::{timing, FaultPolicy, SchedulerConfig};
use clap::Parser;

use crate::safety::SafetyConfig;

/// Where driver events come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    /// Built-in demo script
    #[default]
    Scripted,
    /// Line commands on stdin
    Interactive,
}

/// Configuration for the control loop host
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Control loop period
    pub period: Duration,
    /// Stop after this many ticks; run until stopped when `None`
    pub cycles: Option<u64>,
    pub input: InputMode,
    pub scheduler: SchedulerConfig,
    pub safety: SafetyConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            period: timing::DEFAULT_PERIOD,
            // Long enough for the demo script to play out
            cycles: Some(400),
            input: InputMode::Scripted,
            scheduler: SchedulerConfig::default(),
            safety: SafetyConfig::default(),
        }
    }
}

/// Command-line flags for the host
#[derive(Debug, Parser)]
#[command(name = "cadence-host", about = "Run the robot control loop")]
pub struct Cli {
    /// Read driver commands from stdin instead of the demo script
    #[arg(long)]
    pub interactive: bool,

    /// Stop after this many ticks (0 runs until stopped)
    #[arg(long)]
    pub cycles: Option<u64>,

    /// Control loop period in milliseconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub period_ms: Option<u64>,

    /// Abort the tick on the first command fault
    #[arg(long)]
    pub propagate_faults: bool,
}

impl From<Cli> for HostConfig {
    fn from(cli: Cli) -> Self {
        let mut config = Self::default();

        if cli.interactive {
            config.input = InputMode::Interactive;
            // Interactive sessions run until the driver stops them
            config.cycles = None;
        }
        if let Some(cycles) = cli.cycles {
            config.cycles = (cycles > 0).then_some(cycles);
        }
        if let Some(ms) = cli.period_ms {
            config.period = Duration::from_millis(ms);
        }
        if cli.propagate_faults {
            config.scheduler.fault_policy = FaultPolicy::Propagate;
        }
        config
    }
}
