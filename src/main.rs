mod config;
mod input;
mod robot;
mod safety;

use std::rc::Rc;
use std::time::Instant;

use anyhow::Result;
use cadence_core::{Clock, CommandScheduler, CycleReport, SystemClock};
use clap::Parser;
use config::{Cli, HostConfig, InputMode};
use input::{spawn_input, DriverEvent, Gamepad, InputSource, ScriptedInput, StdinInput};
use robot::Robot;
use safety::{RobotEvent, SafetyAction, SafetyMonitor};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::{interval, MissedTickBehavior};

use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = HostConfig::from(Cli::parse());

    info!("Cadence host starting");
    info!("  Period: {:?}", config.period);
    info!("  Input: {:?}", config.input);
    info!("  Fault policy: {:?}", config.scheduler.fault_policy);

    let clock: Rc<dyn Clock> = Rc::new(SystemClock::new());
    let gamepad = Gamepad::new();
    let mut scheduler = CommandScheduler::new(config.scheduler.clone());
    let robot = Robot::build(&mut scheduler, &gamepad, clock, config.period)?;

    let mut monitor = SafetyMonitor::new(config.safety.clone(), config.period);
    let actions = monitor.handle_event(RobotEvent::Initialized);
    handle_safety_actions(actions, &mut scheduler, &gamepad);

    // Spawn the driver station
    let source: Box<dyn InputSource> = match config.input {
        InputMode::Scripted => Box::new(ScriptedInput::demo()),
        InputMode::Interactive => Box::new(StdinInput::stdin()),
    };
    let (mut events, input_task) = spawn_input(source);
    let mut input_open = true;

    let mut ticker = interval(config.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    // Main control loop
    'control: loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Ctrl-C received, shutting down");
                break;
            }
            _ = ticker.tick() => {}
        }

        while input_open {
            match events.try_recv() {
                Ok(DriverEvent::Quit) => {
                    info!("[DS] Driver requested stop");
                    break 'control;
                }
                Ok(event) => {
                    let actions = handle_driver_event(event, &mut monitor, &gamepad);
                    handle_safety_actions(actions, &mut scheduler, &gamepad);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("[DS] Input channel closed");
                    input_open = false;
                }
            }
        }

        scheduler.set_disabled(!monitor.state().is_enabled());

        let started = Instant::now();
        let result = scheduler.tick();
        let elapsed = started.elapsed();

        let actions = match result {
            Ok(report) => {
                log_cycle(&report);
                monitor.observe(&report, elapsed)
            }
            Err(e) => {
                error!("[SCHED] Tick {} aborted: {}", scheduler.cycle(), e);
                monitor.observe_aborted(scheduler.cycle(), elapsed)
            }
        };
        handle_safety_actions(actions, &mut scheduler, &gamepad);

        if config.cycles.is_some_and(|limit| scheduler.cycle() >= limit) {
            info!("Reached {} cycles", scheduler.cycle());
            break;
        }
    }

    let actions = monitor.handle_event(RobotEvent::Shutdown);
    handle_safety_actions(actions, &mut scheduler, &gamepad);
    scheduler.cancel_all();
    input_task.abort();

    let drivetrain = robot.drivetrain.borrow();
    let (x, y) = drivetrain.position();
    info!(
        "Final odometry: x={:.2} m y={:.2} m heading={:.2} rad, lift at {:.2} m",
        x,
        y,
        drivetrain.heading(),
        robot.lift.borrow().position()
    );
    Ok(())
}

/// Route a driver event to the robot state machine or the gamepad
fn handle_driver_event(
    event: DriverEvent,
    monitor: &mut SafetyMonitor,
    gamepad: &Gamepad,
) -> Vec<SafetyAction> {
    match event {
        DriverEvent::Enable => monitor.handle_event(RobotEvent::Enable),
        DriverEvent::Disable => monitor.handle_event(RobotEvent::Disable),
        DriverEvent::EmergencyStop => monitor.handle_event(RobotEvent::EmergencyStop),
        DriverEvent::Reset => monitor.handle_event(RobotEvent::Reset),
        DriverEvent::Quit => Vec::new(),
        DriverEvent::Press(_) | DriverEvent::Release(_) | DriverEvent::Axis(..) => {
            gamepad.apply(&event);
            Vec::new()
        }
    }
}

/// Carry out safety actions raised by the monitor
fn handle_safety_actions(
    actions: Vec<SafetyAction>,
    scheduler: &mut CommandScheduler,
    gamepad: &Gamepad,
) {
    for action in actions {
        match action {
            SafetyAction::StateChanged { from, to } => {
                info!("[MAIN] State changed: {} -> {}", from, to);
            }
            SafetyAction::Disable { reason } => {
                warn!("[MAIN] Robot disabled: {}", reason);
                gamepad.reset();
            }
            SafetyAction::EmergencyStop { reason } => {
                error!("[MAIN] EMERGENCY STOP: {}", reason);
                gamepad.reset();
                scheduler.set_disabled(true);
                scheduler.cancel_all();
            }
        }
    }
}

fn log_cycle(report: &CycleReport) {
    if !report.finished.is_empty() || !report.interrupted.is_empty() {
        debug!(
            "[SCHED] Cycle {}: executed={} finished={:?} interrupted={:?}",
            report.cycle, report.executed, report.finished, report.interrupted
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::{RobotState, SafetyConfig};
    use std::time::Duration;

    fn monitor() -> SafetyMonitor {
        let mut monitor = SafetyMonitor::new(SafetyConfig::default(), Duration::from_millis(20));
        monitor.handle_event(RobotEvent::Initialized);
        monitor
    }

    #[test]
    fn test_driver_events_reach_state_machine() {
        let mut monitor = monitor();
        let gamepad = Gamepad::new();

        let actions = handle_driver_event(DriverEvent::Enable, &mut monitor, &gamepad);
        assert_eq!(monitor.state(), RobotState::Enabled);
        assert_eq!(actions.len(), 1);

        handle_driver_event(DriverEvent::EmergencyStop, &mut monitor, &gamepad);
        assert_eq!(monitor.state(), RobotState::EmergencyStopped);
    }

    #[test]
    fn test_button_events_reach_gamepad() {
        let mut monitor = monitor();
        let gamepad = Gamepad::new();

        let actions = handle_driver_event(
            DriverEvent::Press(input::Button::A),
            &mut monitor,
            &gamepad,
        );
        assert!(actions.is_empty());
        assert!(gamepad.is_pressed(input::Button::A));
    }

    #[test]
    fn test_emergency_stop_cancels_commands() {
        let mut scheduler = CommandScheduler::default();
        let gamepad = Gamepad::new();
        let _robot = Robot::build(
            &mut scheduler,
            &gamepad,
            Rc::new(SystemClock::new()),
            Duration::from_millis(20),
        )
        .unwrap();
        scheduler.tick().unwrap();
        assert!(scheduler.active_count() > 0);

        gamepad.apply(&DriverEvent::Press(input::Button::A));
        handle_safety_actions(
            vec![SafetyAction::EmergencyStop {
                reason: "test".into(),
            }],
            &mut scheduler,
            &gamepad,
        );

        assert_eq!(scheduler.active_count(), 0);
        assert!(scheduler.is_disabled());
        assert!(!gamepad.is_pressed(input::Button::A));
    }
}
