//! Simulated lift with a position setpoint

use cadence_core::Subsystem;

/// Highest reachable lift position, meters
pub const LIFT_MAX_HEIGHT: f64 = 1.2;
/// Distance the carriage moves per tick at most
const LIFT_STEP: f64 = 0.02;
/// Positions within this distance of the setpoint count as arrived
pub const LIFT_TOLERANCE: f64 = 0.005;

#[derive(Debug, Default)]
pub struct Lift {
    position: f64,
    setpoint: f64,
}

impl Lift {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clamped to the travel range
    pub fn set_setpoint(&mut self, height: f64) {
        self.setpoint = height.clamp(0.0, LIFT_MAX_HEIGHT);
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn at_setpoint(&self) -> bool {
        (self.position - self.setpoint).abs() <= LIFT_TOLERANCE
    }
}

impl Subsystem for Lift {
    fn periodic(&mut self) {
        let error = self.setpoint - self.position;
        self.position += error.clamp(-LIFT_STEP, LIFT_STEP);
    }

    fn name(&self) -> &str {
        "Lift"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moves_toward_setpoint_at_limited_rate() {
        let mut lift = Lift::new();
        lift.set_setpoint(0.1);

        lift.periodic();
        assert!((lift.position() - LIFT_STEP).abs() < 1e-9);
        assert!(!lift.at_setpoint());

        for _ in 0..10 {
            lift.periodic();
        }
        assert!(lift.at_setpoint());
        assert!((lift.position() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_setpoint_clamped() {
        let mut lift = Lift::new();
        lift.set_setpoint(5.0);
        assert_eq!(lift.setpoint(), LIFT_MAX_HEIGHT);
        lift.set_setpoint(-1.0);
        assert_eq!(lift.setpoint(), 0.0);
    }
}
