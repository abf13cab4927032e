//! Timed demo script standing in for a driver

use std::collections::VecDeque;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::sleep;

use super::gamepad::{Axis, Button, DriverEvent};
use super::traits::InputSource;

/// Replays a fixed list of events, each after its delay
pub struct ScriptedInput {
    steps: VecDeque<(Duration, DriverEvent)>,
}

impl ScriptedInput {
    pub fn new(steps: impl IntoIterator<Item = (Duration, DriverEvent)>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }

    /// A short match: enable, drive, raise the lift, run the scoring
    /// sequence, then disable
    pub fn demo() -> Self {
        let ms = Duration::from_millis;
        Self::new([
            (ms(200), DriverEvent::Enable),
            (ms(200), DriverEvent::Axis(Axis::Forward, 0.6)),
            (ms(600), DriverEvent::Axis(Axis::Forward, 0.0)),
            (ms(100), DriverEvent::Press(Button::A)),
            (ms(100), DriverEvent::Release(Button::A)),
            (ms(800), DriverEvent::Press(Button::X)),
            (ms(100), DriverEvent::Release(Button::X)),
            (ms(1500), DriverEvent::Press(Button::B)),
            (ms(100), DriverEvent::Release(Button::B)),
            (ms(800), DriverEvent::Disable),
        ])
    }
}

#[async_trait]
impl InputSource for ScriptedInput {
    async fn next_event(&mut self) -> Result<Option<DriverEvent>> {
        let Some((delay, event)) = self.steps.pop_front() else {
            return Ok(None);
        };
        sleep(delay).await;
        Ok(Some(event))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
