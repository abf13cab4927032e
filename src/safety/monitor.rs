//! Safety Monitor
//!
//! Owns the robot state machine and watches every control cycle:
//! - Command faults are counted over a sliding window of cycles; exceeding
//!   the budget while enabled forces the robot to disabled
//! - Cycles that overrun the loop period are counted; too many in a row
//!   emergency stops the robot

use std::collections::VecDeque;
use std::time::Duration;

use cadence_core::CycleReport;
use tracing::{error, info, warn};

use super::state_machine::{RobotEvent, RobotState, RobotStateMachine, TransitionResult};

/// Safety thresholds
#[derive(Debug, Clone)]
pub struct SafetyConfig {
    /// Faults tolerated within `fault_window` cycles
    pub fault_budget: usize,
    /// Length of the fault window in cycles
    pub fault_window: u64,
    /// Consecutive overrunning cycles before an emergency stop
    pub max_consecutive_overruns: u32,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            fault_budget: 3,
            fault_window: 50,
            max_consecutive_overruns: 5,
        }
    }
}

/// Actions the control loop must carry out
#[derive(Debug, Clone, PartialEq)]
pub enum SafetyAction {
    /// Robot forced to disabled
    Disable { reason: String },
    /// Robot emergency stopped; cancel everything
    EmergencyStop { reason: String },
    StateChanged { from: RobotState, to: RobotState },
}

pub struct SafetyMonitor {
    config: SafetyConfig,
    period: Duration,
    fsm: RobotStateMachine,
    /// Cycle number of each recent fault
    recent_faults: VecDeque<u64>,
    consecutive_overruns: u32,
}

impl SafetyMonitor {
    pub fn new(config: SafetyConfig, period: Duration) -> Self {
        Self {
            config,
            period,
            fsm: RobotStateMachine::new(),
            recent_faults: VecDeque::new(),
            consecutive_overruns: 0,
        }
    }

    pub fn state(&self) -> RobotState {
        self.fsm.state()
    }

    /// Feed a lifecycle event (driver request, startup, shutdown)
    pub fn handle_event(&mut self, event: RobotEvent) -> Vec<SafetyAction> {
        let from = self.fsm.state();
        let result = self.fsm.process_event(event);
        self.action_for(from, result).into_iter().collect()
    }

    /// Inspect one finished cycle and how long it took
    pub fn observe(&mut self, report: &CycleReport, elapsed: Duration) -> Vec<SafetyAction> {
        let mut actions = Vec::new();

        for _ in &report.faults {
            self.recent_faults.push_back(report.cycle);
        }
        self.record_window(report.cycle, &mut actions);
        self.record_timing(elapsed, &mut actions);

        actions
    }

    /// Count a tick that aborted with an error as one faulted cycle
    pub fn observe_aborted(&mut self, cycle: u64, elapsed: Duration) -> Vec<SafetyAction> {
        let mut actions = Vec::new();
        self.recent_faults.push_back(cycle);
        self.record_window(cycle, &mut actions);
        self.record_timing(elapsed, &mut actions);
        actions
    }

    pub fn recent_fault_count(&self) -> usize {
        self.recent_faults.len()
    }

    fn record_window(&mut self, cycle: u64, actions: &mut Vec<SafetyAction>) {
        let oldest = cycle.saturating_sub(self.config.fault_window);
        while self.recent_faults.front().is_some_and(|&c| c <= oldest) {
            self.recent_faults.pop_front();
        }

        let faults = self.recent_faults.len();
        if faults > self.config.fault_budget {
            warn!("[SAFETY] {} faults in the last {} cycles", faults, self.config.fault_window);
            if self.fsm.state().is_enabled() {
                actions.extend(self.handle_event(RobotEvent::FaultBudgetExceeded { faults }));
            }
            self.recent_faults.clear();
        }
    }

    fn record_timing(&mut self, elapsed: Duration, actions: &mut Vec<SafetyAction>) {
        if elapsed <= self.period {
            self.consecutive_overruns = 0;
            return;
        }

        self.consecutive_overruns += 1;
        warn!(
            "[SAFETY] Loop overrun: {:?} > {:?} ({} in a row)",
            elapsed, self.period, self.consecutive_overruns
        );
        if self.consecutive_overruns >= self.config.max_consecutive_overruns {
            let consecutive = self.consecutive_overruns;
            self.consecutive_overruns = 0;
            actions.extend(self.handle_event(RobotEvent::LoopOverrun { consecutive }));
        }
    }

    fn action_for(&self, from: RobotState, result: TransitionResult) -> Option<SafetyAction> {
        match result {
            TransitionResult::Success(to) if from != to => {
                info!("[SAFETY] Transition: {} -> {}", from, to);
                Some(SafetyAction::StateChanged { from, to })
            }
            TransitionResult::Success(_) => None,
            TransitionResult::Invalid { from, event } => {
                warn!("[SAFETY] Ignored {:?} in state {}", event, from);
                None
            }
            TransitionResult::ForcedDisable { reason } => {
                warn!("[SAFETY] FORCED DISABLE: {}", reason);
                Some(SafetyAction::Disable { reason })
            }
            TransitionResult::EmergencyStop { reason } => {
                error!("[SAFETY] EMERGENCY STOP: {}", reason);
                Some(SafetyAction::EmergencyStop { reason })
            }
        }
    }
}
