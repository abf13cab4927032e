//! Interactive driver station reading line commands
//!
//! Accepted lines: `enable`, `disable`, `estop`, `reset`, `press <button>`,
//! `release <button>`, `axis <forward|turn> <value>`, `stop`.

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::warn;

use super::gamepad::DriverEvent;
use super::traits::InputSource;

/// Reads driver events from any line-oriented async reader
pub struct LineInput<R> {
    lines: Lines<R>,
}

/// Line input over the process's standard input
pub type StdinInput = LineInput<BufReader<Stdin>>;

impl StdinInput {
    pub fn stdin() -> Self {
        LineInput::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin> LineInput<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> InputSource for LineInput<R> {
    async fn next_event(&mut self) -> Result<Option<DriverEvent>> {
        while let Some(line) = self.lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.parse::<DriverEvent>() {
                Ok(event) => return Ok(Some(event)),
                Err(e) => warn!("[DS] Ignoring '{}': {}", line, e),
            }
        }
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "stdin"
    }
}
