//! Driver Station Module
//!
//! Reads driver events from a pluggable source on its own task and forwards
//! them to the control loop over a channel.

mod gamepad;
mod scripted;
mod stdin;
mod traits;

pub use gamepad::{Axis, Button, DriverEvent, Gamepad};
pub use scripted::ScriptedInput;
pub use stdin::StdinInput;
pub use traits::InputSource;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Buffered events between the input task and the control loop
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Spawn a task pumping `source` into a channel
///
/// The channel closes when the source is exhausted or fails.
pub fn spawn_input(
    mut source: Box<dyn InputSource>,
) -> (mpsc::Receiver<DriverEvent>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let handle = tokio::spawn(async move {
        let name = source.name();
        info!("[DS] Input source started: {}", name);
        loop {
            match source.next_event().await {
                Ok(Some(event)) => {
                    debug!("[DS] {:?}", event);
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    info!("[DS] Input source {} finished", name);
                    break;
                }
                Err(e) => {
                    error!("[DS] Input source {} failed: {}", name, e);
                    break;
                }
            }
        }
    });

    (rx, handle)
}
