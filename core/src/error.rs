//! Error types for scheduling, group construction and command faults

use std::fmt;

use thiserror::Error;

use crate::subsystem::SubsystemId;

/// Error returned by a command's `initialize` or `execute` hook
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct CommandError {
    message: String,
}

impl CommandError {
    /// Create a new command error with a human-readable message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Lifecycle hook in which a command faulted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPhase {
    Initialize,
    Execute,
    IsFinished,
    End,
}

impl fmt::Display for FaultPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultPhase::Initialize => write!(f, "initialize"),
            FaultPhase::Execute => write!(f, "execute"),
            FaultPhase::IsFinished => write!(f, "is_finished"),
            FaultPhase::End => write!(f, "end"),
        }
    }
}

/// A runtime fault raised inside a command body (error return or panic)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("command '{command}' faulted in {phase}: {message}")]
pub struct CommandFault {
    pub command: String,
    pub phase: FaultPhase,
    pub message: String,
}

/// Errors reported by the scheduler
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("default command '{command}' must require exactly subsystem {subsystem}")]
    DefaultCommandRequirements {
        command: String,
        subsystem: SubsystemId,
    },

    #[error("default command '{command}' is already finished")]
    DefaultCommandFinishes { command: String },

    #[error("subsystem {0} is not registered with the scheduler")]
    UnregisteredSubsystem(SubsystemId),

    #[error(transparent)]
    CommandFault(#[from] CommandFault),
}

/// Errors raised while composing command groups
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GroupError {
    #[error("commands '{first}' and '{second}' in one group both require subsystem {subsystem}")]
    OverlappingRequirements {
        first: String,
        second: String,
        subsystem: SubsystemId,
    },
}
