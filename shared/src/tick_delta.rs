//! Arrival spacing statistics.
//!
//! The server keeps one tracker per player (spacing of input batches) and the
//! client keeps one for the server broadcast. Both feed the recent worst-case
//! spacing into a target delay and consume `tick_catchup` extra ticks whenever
//! their backlog exceeds it.

use crate::TICK_DELTA_WINDOW;

#[derive(Debug, Clone)]
pub struct TickDeltaTracker {
    deltas: [u16; TICK_DELTA_WINDOW],
    index: usize,
    last_tick: u64,
    tick_catchup: u64,
}

impl TickDeltaTracker {
    pub fn new() -> Self {
        Self {
            deltas: [0; TICK_DELTA_WINDOW],
            index: 0,
            last_tick: 0,
            tick_catchup: 0,
        }
    }

    pub fn last_tick(&self) -> u64 {
        self.last_tick
    }

    pub fn tick_catchup(&self) -> u64 {
        self.tick_catchup
    }

    /// Spends one tick of catch-up budget, returning false if there was none.
    pub fn consume_catchup(&mut self) -> bool {
        if self.tick_catchup == 0 {
            return false;
        }
        self.tick_catchup -= 1;
        true
    }

    /// Records `new_tick`; returns true when it produced a new delta sample.
    ///
    /// The first non-zero tick only establishes the baseline.
    pub fn add_tick(&mut self, new_tick: u64) -> bool {
        if new_tick == self.last_tick {
            return false;
        }
        if self.last_tick == 0 {
            self.last_tick = new_tick;
            return false;
        }

        let delta = new_tick.saturating_sub(self.last_tick).min(u16::MAX as u64);
        self.deltas[self.index] = delta as u16;
        self.index = (self.index + 1) % TICK_DELTA_WINDOW;
        self.last_tick = new_tick;
        true
    }

    /// Largest delta in the window.
    pub fn max_delta(&self) -> u64 {
        self.deltas.iter().copied().max().unwrap_or(0) as u64
    }

    /// Delay the consumer should settle at: worst recent spacing plus ~6% and 4 ticks.
    pub fn target_delay(&self) -> u64 {
        let max_delta = self.max_delta();
        max_delta + max_delta / 16 + 4
    }

    pub fn update_catchup(&mut self, current_delay: u64) {
        if self.last_tick == 0 {
            return;
        }
        self.tick_catchup = current_delay.saturating_sub(self.target_delay());
    }
}

impl Default for TickDeltaTracker {
    fn default() -> Self {
        Self::new()
    }
}
