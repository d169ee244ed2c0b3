use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::warn;

use crate::{is_interrupted, ForkError};

const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Re-runs one fallible operation a fixed number of times with a fixed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// `op` receives the 1-based attempt number. Exhaustion yields
    /// `ForkError::RetriesExhausted` carrying the last failure.
    pub fn run<T, F>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        let mut last_error = String::new();
        for attempt in 1..=self.attempts {
            if is_interrupted() {
                return Err(ForkError::Interrupted.into());
            }
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(
                        operation,
                        attempt,
                        attempts = self.attempts,
                        "attempt failed: {err:#}"
                    );
                    last_error = format!("{err:#}");
                }
            }
            if attempt < self.attempts {
                self.pause()?;
            }
        }

        Err(ForkError::RetriesExhausted {
            operation: operation.to_string(),
            attempts: self.attempts,
            last_error,
        }
        .into())
    }

    fn pause(&self) -> Result<()> {
        let deadline = Instant::now() + self.delay;
        loop {
            if is_interrupted() {
                return Err(ForkError::Interrupted.into());
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}
