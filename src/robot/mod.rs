//! Simulated Robot
//!
//! Subsystems, commands and the driver's button map:
//! - A raises the lift, B lowers it
//! - X runs the scoring sequence, Y cancels it
//! - Right bumper creeps forward while held
//! - Start cancels everything

mod commands;
mod drivetrain;
mod lift;

pub use commands::{score_sequence, HoldLift, MoveLiftTo, ScoreParams, TeleopDrive};
pub use drivetrain::Drivetrain;
pub use lift::{Lift, LIFT_MAX_HEIGHT};

use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result};
use cadence_core::subsystem::shared;
use cadence_core::{
    Binding, Clock, CommandExt, CommandRef, CommandScheduler, EdgeKind, StartEndCommand,
    SubsystemRef,
};
use tracing::info;

use crate::input::{Button, Gamepad};

/// Creep demand for the right bumper
const CREEP_SPEED: f64 = 0.2;

/// Handles to the robot's subsystems and named commands
pub struct Robot {
    pub drivetrain: SubsystemRef<Drivetrain>,
    pub lift: SubsystemRef<Lift>,
    pub score: CommandRef,
}

impl Robot {
    /// Create the subsystems, register them, install default commands and
    /// bind the gamepad
    pub fn build(
        scheduler: &mut CommandScheduler,
        gamepad: &Gamepad,
        clock: Rc<dyn Clock>,
        period: Duration,
    ) -> Result<Self> {
        let drivetrain = shared(Drivetrain::new(period));
        let lift = shared(Lift::new());

        let drive_id = scheduler.register_subsystem(&drivetrain);
        let lift_id = scheduler.register_subsystem(&lift);

        scheduler
            .set_default_command(
                drive_id,
                TeleopDrive::new(drivetrain.clone(), gamepad.clone()).into_ref(),
            )
            .context("drivetrain default command")?;
        scheduler
            .set_default_command(lift_id, HoldLift::new(lift.clone()).into_ref())
            .context("lift default command")?;

        let score = score_sequence(&drivetrain, &lift, clock, &ScoreParams::default())
            .context("building score sequence")?
            .into_ref();

        let raise = MoveLiftTo::new(lift.clone(), LIFT_MAX_HEIGHT).into_ref();
        let lower = MoveLiftTo::new(lift.clone(), 0.0).into_ref();
        let creep = {
            let (start, stop) = (drivetrain.clone(), drivetrain.clone());
            StartEndCommand::new(
                move || start.borrow_mut().arcade(CREEP_SPEED, 0.0),
                move || stop.borrow_mut().stop(),
            )
            .requiring([drive_id])
            .into_ref()
        };

        scheduler.register_trigger(Binding::new(gamepad.button(Button::A)).when_pressed(raise));
        scheduler.register_trigger(Binding::new(gamepad.button(Button::B)).when_pressed(lower));
        scheduler.register_trigger(
            Binding::new(gamepad.button(Button::X)).when_pressed(score.clone()),
        );
        scheduler.register_trigger(
            Binding::new(gamepad.button(Button::Y)).cancel_when_pressed(score.clone()),
        );
        scheduler.register_trigger(
            Binding::new(gamepad.button(Button::RightBumper)).while_held(creep),
        );
        scheduler.register_trigger(Binding::new(gamepad.button(Button::Start)).on(
            EdgeKind::Rising,
            |scheduler| {
                info!("Driver cancelled all commands");
                scheduler.cancel_all();
            },
        ));

        info!("Robot ready: drivetrain {}, lift {}", drive_id, lift_id);
        Ok(Self {
            drivetrain,
            lift,
            score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{Axis, DriverEvent};
    use cadence_core::{ManualClock, SubsystemId};

    const PERIOD: Duration = Duration::from_millis(20);

    struct Harness {
        scheduler: CommandScheduler,
        gamepad: Gamepad,
        clock: ManualClock,
        robot: Robot,
    }

    impl Harness {
        fn new() -> Self {
            let mut scheduler = CommandScheduler::default();
            let gamepad = Gamepad::new();
            let clock = ManualClock::new();
            let robot =
                Robot::build(&mut scheduler, &gamepad, Rc::new(clock.clone()), PERIOD).unwrap();
            Self {
                scheduler,
                gamepad,
                clock,
                robot,
            }
        }

        fn run(&mut self, ticks: usize) {
            for _ in 0..ticks {
                self.scheduler.tick().unwrap();
                self.clock.advance(PERIOD);
            }
        }

        fn tap(&mut self, button: Button) {
            self.gamepad.apply(&DriverEvent::Press(button));
            self.run(1);
            self.gamepad.apply(&DriverEvent::Release(button));
            self.run(1);
        }

        fn drive_owner(&self) -> Option<String> {
            self.scheduler
                .requiring(SubsystemId::of(&self.robot.drivetrain))
                .map(|c| c.name())
        }
    }

    #[test]
    fn test_defaults_installed_on_first_tick() {
        let mut h = Harness::new();
        h.run(1);
        assert_eq!(h.drive_owner().as_deref(), Some("TeleopDrive"));
        assert_eq!(h.scheduler.active_names(), vec!["TeleopDrive", "HoldLift"]);
    }

    #[test]
    fn test_teleop_drives_from_sticks() {
        let mut h = Harness::new();
        h.gamepad.apply(&DriverEvent::Axis(Axis::Forward, 1.0));
        h.run(11);
        assert!(h.robot.drivetrain.borrow().distance() > 0.5);
    }

    #[test]
    fn test_a_raises_lift_then_hold_resumes() {
        let mut h = Harness::new();
        h.run(1);
        h.tap(Button::A);
        h.run(80);

        assert!((h.robot.lift.borrow().position() - LIFT_MAX_HEIGHT).abs() < 0.01);
        assert!(h.scheduler.active_names().contains(&"HoldLift".to_string()));
    }

    #[test]
    fn test_y_cancels_score_and_teleop_returns() {
        let mut h = Harness::new();
        h.run(1);
        h.tap(Button::X);
        assert!(h.scheduler.is_scheduled(&h.robot.score));
        assert_eq!(h.drive_owner().as_deref(), Some("SequentialGroup"));

        h.tap(Button::Y);
        assert!(!h.scheduler.is_scheduled(&h.robot.score));
        assert_eq!(h.drive_owner().as_deref(), Some("TeleopDrive"));
    }

    #[test]
    fn test_creep_only_while_held() {
        let mut h = Harness::new();
        h.run(1);
        h.gamepad.apply(&DriverEvent::Press(Button::RightBumper));
        h.run(5);
        assert_eq!(h.drive_owner().as_deref(), Some("StartEndCommand"));
        let crept = h.robot.drivetrain.borrow().distance();
        assert!(crept > 0.0);

        h.gamepad.apply(&DriverEvent::Release(Button::RightBumper));
        h.run(2);
        assert_eq!(h.drive_owner().as_deref(), Some("TeleopDrive"));
    }

    #[test]
    fn test_start_cancels_everything() {
        let mut h = Harness::new();
        h.run(1);
        h.gamepad.apply(&DriverEvent::Press(Button::Start));
        h.scheduler.tick().unwrap();

        // Defaults come straight back at the end of the same tick
        assert_eq!(h.scheduler.active_names(), vec!["TeleopDrive", "HoldLift"]);
    }

    #[test]
    fn test_disabled_robot_runs_nothing() {
        let mut h = Harness::new();
        h.run(1);
        h.scheduler.set_disabled(true);
        h.run(1);
        assert_eq!(h.scheduler.active_count(), 0);

        h.tap(Button::X);
        assert!(!h.scheduler.is_scheduled(&h.robot.score));
    }
}
