//! Cycle pacing for the control loop.
//!
//! The delay runs at the top of every cycle, measured from the end of the
//! previous one. It goes through `tokio::time`, so tests drive it with a
//! paused clock instead of sleeping for real.

use std::time::Duration;

#[derive(Debug)]
pub struct CycleTicker {
    delay: Duration,
    ticks: u64,
}

impl CycleTicker {
    pub fn new(delay: Duration) -> Self {
        Self { delay, ticks: 0 }
    }

    /// Wait out the delay and return the 1-based number of the cycle to run.
    pub async fn tick(&mut self) -> u64 {
        tokio::time::sleep(self.delay).await;
        self.ticks += 1;
        self.ticks
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}
