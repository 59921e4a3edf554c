//! Fixed-step accumulator driving the simulation at [`TICK_RATE`](crate::TICK_RATE).

use crate::{MAX_TICKS_PER_FRAME, TICK_RATE};
use log::debug;
use std::time::Duration;

/// Duration of one simulation tick.
pub const TICK_DURATION: Duration = Duration::from_nanos(1_000_000_000 / TICK_RATE);

/// Converts real elapsed time into whole simulation ticks.
///
/// Leftover time stays in the accumulator for the next frame. A frame never
/// yields more than `MAX_TICKS_PER_FRAME` ticks; time beyond that is dropped
/// so a long stall does not turn into a burst of catch-up ticks.
#[derive(Debug, Clone, Default)]
pub struct FixedStep {
    accumulator: Duration,
    total_ticks: u64,
}

impl FixedStep {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `elapsed` and returns how many ticks to run this frame.
    pub fn advance(&mut self, elapsed: Duration) -> u32 {
        self.accumulator += elapsed;

        let mut ticks = 0;
        while self.accumulator >= TICK_DURATION && ticks < MAX_TICKS_PER_FRAME {
            self.accumulator -= TICK_DURATION;
            ticks += 1;
        }

        if self.accumulator >= TICK_DURATION {
            debug!(
                "Frame fell {:?} behind, dropping accumulated time",
                self.accumulator
            );
            self.accumulator = Duration::ZERO;
        }

        self.total_ticks += ticks as u64;
        ticks
    }

    /// Fraction of a tick sitting in the accumulator, in `[0, 1)`.
    pub fn alpha(&self) -> f32 {
        self.accumulator.as_secs_f32() / TICK_DURATION.as_secs_f32()
    }

    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }
}
