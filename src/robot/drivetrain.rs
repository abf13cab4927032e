//! Simulated differential drivetrain

use std::time::Duration;

use cadence_core::Subsystem;

/// Top speed at full stick, meters per second
pub const MAX_SPEED_MPS: f64 = 3.0;
/// Top turn rate at full stick, radians per second
pub const MAX_TURN_RATE: f64 = std::f64::consts::PI;

/// Drivetrain with dead-reckoned odometry, integrated once per tick
#[derive(Debug)]
pub struct Drivetrain {
    dt: f64,
    forward: f64,
    turn: f64,
    /// Total distance travelled, signed
    distance: f64,
    heading: f64,
    x: f64,
    y: f64,
}

impl Drivetrain {
    pub fn new(period: Duration) -> Self {
        Self {
            dt: period.as_secs_f64(),
            forward: 0.0,
            turn: 0.0,
            distance: 0.0,
            heading: 0.0,
            x: 0.0,
            y: 0.0,
        }
    }

    /// Set the drive demand, both in [-1, 1]
    pub fn arcade(&mut self, forward: f64, turn: f64) {
        self.forward = forward.clamp(-1.0, 1.0);
        self.turn = turn.clamp(-1.0, 1.0);
    }

    pub fn stop(&mut self) {
        self.arcade(0.0, 0.0);
    }

    pub fn is_moving(&self) -> bool {
        self.forward != 0.0 || self.turn != 0.0
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn heading(&self) -> f64 {
        self.heading
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

impl Subsystem for Drivetrain {
    fn periodic(&mut self) {
        let step = self.forward * MAX_SPEED_MPS * self.dt;
        self.heading += self.turn * MAX_TURN_RATE * self.dt;
        self.x += step * self.heading.cos();
        self.y += step * self.heading.sin();
        self.distance += step;
    }

    fn name(&self) -> &str {
        "Drivetrain"
    }
}
