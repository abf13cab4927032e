//! Input source abstraction for pluggable driver stations

use anyhow::Result;
use async_trait::async_trait;

use super::gamepad::DriverEvent;

/// A source of driver-station events
#[async_trait]
pub trait InputSource: Send {
    /// Wait for the next event; `None` once the source is exhausted
    async fn next_event(&mut self) -> Result<Option<DriverEvent>>;

    /// Human-readable name for this source
    fn name(&self) -> &'static str;
}
