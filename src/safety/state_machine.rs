//! Robot State Machine
//!
//! Defines valid robot-state transitions and the safety-critical events that
//! force the robot out of `Enabled`.

use std::fmt;

/// Lifecycle state of the robot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotState {
    /// Host starting up, scheduler not ticking yet
    Init,
    Disabled,
    Enabled,
    /// Latched until an explicit reset
    EmergencyStopped,
    /// Host shutting down
    Stopped,
}

impl RobotState {
    /// Whether commands may run that do not run when disabled
    pub fn is_enabled(self) -> bool {
        self == RobotState::Enabled
    }
}

impl fmt::Display for RobotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Events that can trigger state transitions
#[derive(Debug, Clone, PartialEq)]
pub enum RobotEvent {
    /// Host startup complete
    Initialized,
    /// Driver requested enable
    Enable,
    /// Driver requested disable
    Disable,
    /// Too many command faults in the recent window
    FaultBudgetExceeded { faults: usize },
    /// Control loop could not keep its period
    LoopOverrun { consecutive: u32 },
    /// Driver hit the emergency stop
    EmergencyStop,
    /// Emergency stop cleared
    Reset,
    Shutdown,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionResult {
    /// Transition was valid; the new state
    Success(RobotState),
    /// Transition was invalid from the current state
    Invalid { from: RobotState, event: RobotEvent },
    /// The robot was forced to disabled
    ForcedDisable { reason: String },
    /// The robot was emergency stopped
    EmergencyStop { reason: String },
}

/// The robot lifecycle state machine
#[derive(Debug)]
pub struct RobotStateMachine {
    current_state: RobotState,
}

impl Default for RobotStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RobotStateMachine {
    /// Create a new state machine in `Init`
    pub fn new() -> Self {
        Self {
            current_state: RobotState::Init,
        }
    }

    pub fn state(&self) -> RobotState {
        self.current_state
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: RobotEvent) -> TransitionResult {
        use RobotState::*;

        // Safety-critical events first
        match &event {
            RobotEvent::EmergencyStop if self.current_state != Stopped => {
                let prev = self.current_state;
                self.current_state = EmergencyStopped;
                return TransitionResult::EmergencyStop {
                    reason: format!("Emergency stop from {}", prev),
                };
            }
            RobotEvent::LoopOverrun { consecutive } if self.current_state == Enabled => {
                self.current_state = EmergencyStopped;
                return TransitionResult::EmergencyStop {
                    reason: format!("Control loop overran {} periods in a row", consecutive),
                };
            }
            RobotEvent::FaultBudgetExceeded { faults } if self.current_state == Enabled => {
                self.current_state = Disabled;
                return TransitionResult::ForcedDisable {
                    reason: format!("{} command faults in the fault window", faults),
                };
            }
            _ => {}
        }

        match self.next_state(&event) {
            Some(state) => {
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }

    fn next_state(&self, event: &RobotEvent) -> Option<RobotState> {
        use RobotEvent::*;
        use RobotState::*;

        match (self.current_state, event) {
            (Init, Initialized) => Some(Disabled),

            (Disabled, Enable) => Some(Enabled),
            (Disabled, Disable) => Some(Disabled),

            (Enabled, Enable) => Some(Enabled),
            (Enabled, Disable) => Some(Disabled),

            // Safety events outside Enabled change nothing
            (Disabled | EmergencyStopped, FaultBudgetExceeded { .. } | LoopOverrun { .. }) => {
                Some(self.current_state)
            }

            (EmergencyStopped, Reset) => Some(Disabled),

            (Stopped, _) => None,
            (_, Shutdown) => Some(Stopped),

            _ => None,
        }
    }
}
