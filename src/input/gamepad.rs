//! Shared gamepad state and driver events
//!
//! The input task produces `DriverEvent`s; the main loop applies them to the
//! `Gamepad` before each tick, and button triggers read it when sampled.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use anyhow::{anyhow, bail};
use cadence_core::Trigger;

/// Gamepad buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Button {
    A,
    B,
    X,
    Y,
    LeftBumper,
    RightBumper,
    Start,
}

impl FromStr for Button {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "a" => Ok(Button::A),
            "b" => Ok(Button::B),
            "x" => Ok(Button::X),
            "y" => Ok(Button::Y),
            "lb" | "left_bumper" => Ok(Button::LeftBumper),
            "rb" | "right_bumper" => Ok(Button::RightBumper),
            "start" => Ok(Button::Start),
            other => bail!("unknown button '{}'", other),
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Analog sticks, already mapped to drive axes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Forward,
    Turn,
}

impl FromStr for Axis {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "forward" | "fwd" => Ok(Axis::Forward),
            "turn" => Ok(Axis::Turn),
            other => bail!("unknown axis '{}'", other),
        }
    }
}

/// Events from the driver station
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    Enable,
    Disable,
    EmergencyStop,
    /// Clear an emergency stop (robot comes back disabled)
    Reset,
    Press(Button),
    Release(Button),
    Axis(Axis, f64),
    Quit,
}

impl FromStr for DriverEvent {
    type Err = anyhow::Error;

    /// Parse a driver-station line such as `enable`, `press a` or `axis forward 0.5`
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words
            .next()
            .ok_or_else(|| anyhow!("empty command"))?
            .to_ascii_lowercase();

        let event = match verb.as_str() {
            "enable" => DriverEvent::Enable,
            "disable" => DriverEvent::Disable,
            "estop" => DriverEvent::EmergencyStop,
            "reset" => DriverEvent::Reset,
            "stop" | "quit" | "exit" => DriverEvent::Quit,
            "press" => DriverEvent::Press(required(words.next(), "button")?.parse()?),
            "release" => DriverEvent::Release(required(words.next(), "button")?.parse()?),
            "axis" => {
                let axis = required(words.next(), "axis")?.parse()?;
                let value: f64 = required(words.next(), "value")?
                    .parse()
                    .map_err(|e| anyhow!("invalid axis value: {}", e))?;
                if !value.is_finite() {
                    bail!("axis value must be finite, got {}", value);
                }
                DriverEvent::Axis(axis, value)
            }
            other => bail!("unknown command '{}'", other),
        };

        if let Some(extra) = words.next() {
            bail!("unexpected argument '{}'", extra);
        }
        Ok(event)
    }
}

fn required<'a>(word: Option<&'a str>, what: &str) -> anyhow::Result<&'a str> {
    word.ok_or_else(|| anyhow!("missing {}", what))
}

#[derive(Debug, Default)]
struct GamepadState {
    pressed: BTreeSet<Button>,
    forward: f64,
    turn: f64,
}

/// Gamepad state shared between the main loop and trigger conditions
#[derive(Clone, Default)]
pub struct Gamepad {
    state: Rc<RefCell<GamepadState>>,
}

impl Gamepad {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a button or axis event; other events and non-finite axes are
    /// ignored
    pub fn apply(&self, event: &DriverEvent) {
        let mut state = self.state.borrow_mut();
        match event {
            DriverEvent::Press(button) => {
                state.pressed.insert(*button);
            }
            DriverEvent::Release(button) => {
                state.pressed.remove(button);
            }
            DriverEvent::Axis(_, value) if !value.is_finite() => {}
            DriverEvent::Axis(Axis::Forward, value) => state.forward = value.clamp(-1.0, 1.0),
            DriverEvent::Axis(Axis::Turn, value) => state.turn = value.clamp(-1.0, 1.0),
            _ => {}
        }
    }

    /// Release every button and center the sticks
    pub fn reset(&self) {
        *self.state.borrow_mut() = GamepadState::default();
    }

    pub fn is_pressed(&self, button: Button) -> bool {
        self.state.borrow().pressed.contains(&button)
    }

    pub fn axis(&self, axis: Axis) -> f64 {
        let state = self.state.borrow();
        match axis {
            Axis::Forward => state.forward,
            Axis::Turn => state.turn,
        }
    }

    /// Trigger that is active while `button` is held
    pub fn button(&self, button: Button) -> Trigger {
        let gamepad = self.clone();
        Trigger::new(move || gamepad.is_pressed(button))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_driver_lines() {
        assert_eq!("enable".parse::<DriverEvent>().unwrap(), DriverEvent::Enable);
        assert_eq!(
            "press A".parse::<DriverEvent>().unwrap(),
            DriverEvent::Press(Button::A)
        );
        assert_eq!(
            "release rb".parse::<DriverEvent>().unwrap(),
            DriverEvent::Release(Button::RightBumper)
        );
        assert_eq!(
            "axis forward 0.5".parse::<DriverEvent>().unwrap(),
            DriverEvent::Axis(Axis::Forward, 0.5)
        );
        assert_eq!("quit".parse::<DriverEvent>().unwrap(), DriverEvent::Quit);
    }

    #[test]
    fn test_parse_rejects_bad_lines() {
        assert!("".parse::<DriverEvent>().is_err());
        assert!("press".parse::<DriverEvent>().is_err());
        assert!("press z".parse::<DriverEvent>().is_err());
        assert!("axis turn fast".parse::<DriverEvent>().is_err());
        assert!("enable now".parse::<DriverEvent>().is_err());
        assert!("jump".parse::<DriverEvent>().is_err());
    }

    #[test]
    fn test_parse_rejects_non_finite_axis() {
        assert!("axis forward NaN".parse::<DriverEvent>().is_err());
        assert!("axis turn inf".parse::<DriverEvent>().is_err());
        assert!("axis turn -inf".parse::<DriverEvent>().is_err());
    }

    #[test]
    fn test_non_finite_axis_keeps_last_value() {
        let gamepad = Gamepad::new();
        gamepad.apply(&DriverEvent::Axis(Axis::Forward, 0.4));
        gamepad.apply(&DriverEvent::Axis(Axis::Forward, f64::NAN));
        assert_eq!(gamepad.axis(Axis::Forward), 0.4);
    }

    #[test]
    fn test_button_trigger_follows_state() {
        let gamepad = Gamepad::new();
        let a = gamepad.button(Button::A);

        assert!(!a.get());
        gamepad.apply(&DriverEvent::Press(Button::A));
        assert!(a.get());
        gamepad.apply(&DriverEvent::Release(Button::A));
        assert!(!a.get());
    }

    #[test]
    fn test_axis_clamped_and_reset() {
        let gamepad = Gamepad::new();
        gamepad.apply(&DriverEvent::Axis(Axis::Turn, 3.0));
        assert_eq!(gamepad.axis(Axis::Turn), 1.0);

        gamepad.apply(&DriverEvent::Press(Button::X));
        gamepad.reset();
        assert_eq!(gamepad.axis(Axis::Turn), 0.0);
        assert!(!gamepad.is_pressed(Button::X));
    }
}
