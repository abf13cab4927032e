//! Robot commands

use std::rc::Rc;
use std::time::Duration;

use cadence_core::{
    Clock, Command, CommandError, CommandExt, GroupError, InstantCommand, ParallelGroup,
    Requirements, SequentialGroup, SubsystemId, SubsystemRef, WaitCommand,
};
use tracing::{debug, info};

use super::drivetrain::Drivetrain;
use super::lift::{Lift, LIFT_MAX_HEIGHT};
use crate::input::{Axis, Gamepad};

fn requiring<S>(subsystem: &SubsystemRef<S>) -> Requirements {
    Requirements::from([SubsystemId::of(subsystem)])
}

/// Drive from the sticks; default command of the drivetrain
pub struct TeleopDrive {
    drivetrain: SubsystemRef<Drivetrain>,
    gamepad: Gamepad,
}

impl TeleopDrive {
    pub fn new(drivetrain: SubsystemRef<Drivetrain>, gamepad: Gamepad) -> Self {
        Self {
            drivetrain,
            gamepad,
        }
    }
}

impl Command for TeleopDrive {
    fn execute(&mut self) -> Result<(), CommandError> {
        self.drivetrain.borrow_mut().arcade(
            self.gamepad.axis(Axis::Forward),
            self.gamepad.axis(Axis::Turn),
        );
        Ok(())
    }

    fn end(&mut self, _interrupted: bool) {
        self.drivetrain.borrow_mut().stop();
    }

    fn requirements(&self) -> Requirements {
        requiring(&self.drivetrain)
    }

    fn name(&self) -> &str {
        "TeleopDrive"
    }
}

/// Drive straight until `meters` have been covered
pub struct DriveDistance {
    drivetrain: SubsystemRef<Drivetrain>,
    meters: f64,
    speed: f64,
    start: f64,
}

impl DriveDistance {
    /// Negative `meters` drives backwards
    pub fn new(drivetrain: SubsystemRef<Drivetrain>, meters: f64, speed: f64) -> Self {
        Self {
            drivetrain,
            meters,
            speed,
            start: 0.0,
        }
    }

    fn travelled(&self) -> f64 {
        (self.drivetrain.borrow().distance() - self.start).abs()
    }
}

impl Command for DriveDistance {
    fn initialize(&mut self) -> Result<(), CommandError> {
        if !(self.speed > 0.0 && self.speed <= 1.0) {
            return Err(CommandError::new(format!(
                "drive speed {} outside (0, 1]",
                self.speed
            )));
        }
        self.start = self.drivetrain.borrow().distance();
        debug!("DriveDistance: {:.2} m from {:.2}", self.meters, self.start);
        Ok(())
    }

    fn execute(&mut self) -> Result<(), CommandError> {
        let demand = self.speed.copysign(self.meters);
        self.drivetrain.borrow_mut().arcade(demand, 0.0);
        Ok(())
    }

    fn end(&mut self, _interrupted: bool) {
        self.drivetrain.borrow_mut().stop();
    }

    fn is_finished(&self) -> bool {
        self.travelled() >= self.meters.abs()
    }

    fn requirements(&self) -> Requirements {
        requiring(&self.drivetrain)
    }

    fn name(&self) -> &str {
        "DriveDistance"
    }
}

/// Move the lift to a height and finish once it arrives
pub struct MoveLiftTo {
    lift: SubsystemRef<Lift>,
    height: f64,
}

impl MoveLiftTo {
    pub fn new(lift: SubsystemRef<Lift>, height: f64) -> Self {
        Self { lift, height }
    }
}

impl Command for MoveLiftTo {
    fn initialize(&mut self) -> Result<(), CommandError> {
        if !(0.0..=LIFT_MAX_HEIGHT).contains(&self.height) {
            return Err(CommandError::new(format!(
                "lift height {:.2} m out of range",
                self.height
            )));
        }
        self.lift.borrow_mut().set_setpoint(self.height);
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.lift.borrow().at_setpoint()
    }

    fn requirements(&self) -> Requirements {
        requiring(&self.lift)
    }

    fn name(&self) -> &str {
        "MoveLiftTo"
    }
}

/// Hold the lift where it is; default command of the lift
pub struct HoldLift {
    lift: SubsystemRef<Lift>,
}

impl HoldLift {
    pub fn new(lift: SubsystemRef<Lift>) -> Self {
        Self { lift }
    }
}

impl Command for HoldLift {
    fn initialize(&mut self) -> Result<(), CommandError> {
        let mut lift = self.lift.borrow_mut();
        let here = lift.position();
        lift.set_setpoint(here);
        Ok(())
    }

    fn requirements(&self) -> Requirements {
        requiring(&self.lift)
    }

    fn name(&self) -> &str {
        "HoldLift"
    }
}

/// Scoring routine parameters
#[derive(Debug, Clone)]
pub struct ScoreParams {
    pub approach_meters: f64,
    pub approach_speed: f64,
    pub score_height: f64,
    /// Pause at the goal before the routine reports done
    pub settle: Duration,
}

impl Default for ScoreParams {
    fn default() -> Self {
        Self {
            approach_meters: 0.5,
            approach_speed: 0.4,
            score_height: 1.0,
            settle: Duration::from_millis(250),
        }
    }
}

/// Approach the goal while raising the lift, settle, then report
pub fn score_sequence(
    drivetrain: &SubsystemRef<Drivetrain>,
    lift: &SubsystemRef<Lift>,
    clock: Rc<dyn Clock>,
    params: &ScoreParams,
) -> Result<SequentialGroup, GroupError> {
    let approach = ParallelGroup::new(vec![
        Box::new(DriveDistance::new(
            drivetrain.clone(),
            params.approach_meters,
            params.approach_speed,
        )),
        Box::new(MoveLiftTo::new(lift.clone(), params.score_height)),
    ])?;

    approach
        .and_then(WaitCommand::with_clock(params.settle, clock))?
        .and_then(InstantCommand::new(|| info!("Scored")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::subsystem::shared;
    use cadence_core::{CommandScheduler, ManualClock, Subsystem};
    use crate::input::DriverEvent;

    const PERIOD: Duration = Duration::from_millis(20);

    #[test]
    fn test_drive_distance_stops_at_target() {
        let drive = shared(Drivetrain::new(PERIOD));
        let mut scheduler = CommandScheduler::default();
        scheduler.register_subsystem(&drive);

        let cmd = DriveDistance::new(drive.clone(), 0.3, 0.5).into_ref();
        scheduler.schedule(&cmd);

        // 0.03 m per tick at half speed
        let mut ticks = 0;
        while scheduler.is_scheduled(&cmd) && ticks < 100 {
            scheduler.tick().unwrap();
            ticks += 1;
        }

        assert!(ticks <= 12);
        assert!(drive.borrow().distance() >= 0.3 - 1e-9);
        assert!(!drive.borrow().is_moving());
    }

    #[test]
    fn test_drive_distance_backwards() {
        let drive = shared(Drivetrain::new(PERIOD));
        let mut cmd = DriveDistance::new(drive.clone(), -0.1, 1.0);
        cmd.initialize().unwrap();
        cmd.execute().unwrap();
        drive.borrow_mut().periodic();

        assert!(drive.borrow().distance() < 0.0);
    }

    #[test]
    fn test_invalid_speed_faults_on_initialize() {
        let drive = shared(Drivetrain::new(PERIOD));
        let mut scheduler = CommandScheduler::default();
        let cmd = DriveDistance::new(drive, 1.0, 0.0).into_ref();

        let outcome = scheduler.schedule(&cmd);
        assert!(matches!(outcome, cadence_core::ScheduleOutcome::Faulted(_)));
        assert!(!scheduler.is_scheduled(&cmd));
    }

    #[test]
    fn test_move_lift_rejects_out_of_range() {
        let lift = shared(Lift::new());
        let mut cmd = MoveLiftTo::new(lift, LIFT_MAX_HEIGHT + 0.5);
        assert!(cmd.initialize().is_err());
    }

    #[test]
    fn test_hold_lift_freezes_setpoint() {
        let lift = shared(Lift::new());
        lift.borrow_mut().set_setpoint(1.0);
        lift.borrow_mut().periodic();

        let mut hold = HoldLift::new(lift.clone());
        hold.initialize().unwrap();
        let here = lift.borrow().position();
        lift.borrow_mut().periodic();

        assert_eq!(lift.borrow().setpoint(), here);
        assert!(lift.borrow().at_setpoint());
    }

    #[test]
    fn test_teleop_follows_sticks_and_stops_on_end() {
        let drive = shared(Drivetrain::new(PERIOD));
        let gamepad = Gamepad::new();
        let mut teleop = TeleopDrive::new(drive.clone(), gamepad.clone());

        gamepad.apply(&DriverEvent::Axis(Axis::Forward, 0.8));
        teleop.execute().unwrap();
        assert!(drive.borrow().is_moving());

        teleop.end(true);
        assert!(!drive.borrow().is_moving());
    }

    #[test]
    fn test_score_sequence_runs_to_completion() {
        let drive = shared(Drivetrain::new(PERIOD));
        let lift = shared(Lift::new());
        let clock = ManualClock::new();
        let mut scheduler = CommandScheduler::default();
        scheduler.register_subsystem(&drive);
        scheduler.register_subsystem(&lift);

        let params = ScoreParams::default();
        let score = score_sequence(&drive, &lift, Rc::new(clock.clone()), &params)
            .unwrap()
            .into_ref();
        assert_eq!(score.name(), "SequentialGroup");
        scheduler.schedule(&score);

        let mut ticks = 0;
        while scheduler.is_scheduled(&score) && ticks < 500 {
            scheduler.tick().unwrap();
            clock.advance(PERIOD);
            ticks += 1;
        }

        assert!(!scheduler.is_scheduled(&score));
        assert!(drive.borrow().distance() >= params.approach_meters - 1e-9);
        assert!((lift.borrow().position() - params.score_height).abs() <= 0.005);
    }

    #[test]
    fn test_score_sequence_requires_both_subsystems() {
        let drive = shared(Drivetrain::new(PERIOD));
        let lift = shared(Lift::new());
        let score = score_sequence(
            &drive,
            &lift,
            Rc::new(ManualClock::new()),
            &ScoreParams::default(),
        )
        .unwrap();

        let requirements = score.requirements();
        assert!(requirements.contains(&SubsystemId::of(&drive)));
        assert!(requirements.contains(&SubsystemId::of(&lift)));
    }
}
