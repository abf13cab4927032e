//! Safety Module
//!
//! Tracks the robot lifecycle and forces it out of `Enabled` when the
//! control loop misbehaves (too many command faults, sustained overruns).

mod monitor;
mod state_machine;

pub use monitor::{SafetyAction, SafetyConfig, SafetyMonitor};
pub use state_machine::{RobotEvent, RobotState};
