//! Cadence Command Scheduler
//!
//! This crate provides the cooperative command-scheduling engine used by the
//! robot host loop:
//! - The `Command` contract and small closure-based command adapters
//! - Subsystems as the unit of mutual exclusion
//! - Sequential and parallel command groups
//! - Edge-detecting triggers with scheduling bindings
//! - The `CommandScheduler` that admits, runs and retires commands once per tick
//!
//! Everything here is single-threaded: the host calls `CommandScheduler::tick`
//! once per control period and no command body may block.

pub mod clock;
pub mod command;
pub mod error;
pub mod group;
pub mod scheduler;
pub mod subsystem;
pub mod trigger;

// Re-export commonly used types at crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{
    Command, CommandExt, CommandRef, ConditionalCommand, FunctionalCommand, InstantCommand,
    PerpetualCommand, ProxyCommand, Requirements, RunCommand, ScheduleCommand, StartEndCommand,
    WaitCommand, WaitUntilCommand,
};
pub use error::{CommandError, CommandFault, FaultPhase, GroupError, SchedulerError};
pub use group::{Completion, ParallelGroup, SequentialGroup};
pub use scheduler::{
    CommandInfo, CommandScheduler, CycleReport, FaultPolicy, ScheduleOutcome, SchedulerConfig,
    SchedulerHandle,
};
pub use subsystem::{Subsystem, SubsystemId, SubsystemRef};
pub use trigger::{Binding, Edge, EdgeKind, Trigger};

/// Scheduling defaults shared by hosts
pub mod timing {
    use std::time::Duration;

    /// Nominal control period of the host loop
    pub const DEFAULT_PERIOD: Duration = Duration::from_millis(20);
}
