//! Per-object snapshot history and interpolation
//!
//! Every network slot has its own [`SnapshotStore`]: a tick-indexed ring of the
//! last `NET_CLIENT_MAX_SNAPSHOTS` replicated states. Updates may arrive late,
//! twice, or not at all; the store keeps `[oldest_server_tick,
//! latest_server_tick]` as the window of usable history and answers queries for
//! ticks that were never received by interpolating between the nearest
//! received neighbours.
//!
//! Once an interpolation has been handed out for a bracket `(prev, next)`, the
//! ticks strictly inside it are locked: a late insert there would change a
//! result that playback has already consumed.

use log::debug;
use shared::ring::TickRing;
use shared::{ObjectSyncState, NET_CLIENT_MAX_SNAPSHOTS, NET_MAX_TICK_JUMP};
use thiserror::Error;

const CAPACITY: u64 = NET_CLIENT_MAX_SNAPSHOTS as u64;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotReject {
    #[error("tick {0} is inside the locked interpolation bracket ({1}, {2})")]
    LockedBracket(u64, u64, u64),
    #[error("tick {0} is older than the history floor {1}")]
    TooOld(u64, u64),
    #[error("tick {0} is implausibly far ahead of {1}")]
    TooFarAhead(u64, u64),
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    ring: TickRing<ObjectSyncState, NET_CLIENT_MAX_SNAPSHOTS>,
    populated: bool,
    oldest_server_tick: u64,
    latest_server_tick: u64,
    recent_lerp_start_tick: u64,
    recent_lerp_end_tick: u64,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether anything has been inserted yet.
    pub fn is_populated(&self) -> bool {
        self.populated
    }

    pub fn oldest_server_tick(&self) -> u64 {
        self.oldest_server_tick
    }

    pub fn latest_server_tick(&self) -> u64 {
        self.latest_server_tick
    }

    /// The bracket locked by the last interpolating query, if any.
    pub fn lerp_bracket(&self) -> Option<(u64, u64)> {
        (self.recent_lerp_start_tick < self.recent_lerp_end_tick)
            .then_some((self.recent_lerp_start_tick, self.recent_lerp_end_tick))
    }

    /// Stores `state` as the object's state at `tick`.
    pub fn insert(&mut self, tick: u64, state: ObjectSyncState) -> Result<(), SnapshotReject> {
        if let Some((start, end)) = self.lerp_bracket() {
            if start < tick && tick < end {
                return Err(SnapshotReject::LockedBracket(tick, start, end));
            }
        }

        if !self.populated {
            self.ring.clear();
            self.populated = true;
            self.oldest_server_tick = tick;
            self.latest_server_tick = tick;
        } else if tick > self.latest_server_tick {
            if tick - self.latest_server_tick > NET_MAX_TICK_JUMP {
                return Err(SnapshotReject::TooFarAhead(tick, self.latest_server_tick));
            }
            self.advance_latest(tick);
        }

        let floor = self.floor();
        if tick < floor {
            return Err(SnapshotReject::TooOld(tick, floor));
        }
        if tick < self.oldest_server_tick {
            self.oldest_server_tick = tick;
        }

        *self.ring.slot_mut(tick) = state;
        Ok(())
    }

    fn advance_latest(&mut self, tick: u64) {
        let old_latest = self.latest_server_tick;
        if tick - old_latest >= CAPACITY {
            debug!(
                "Snapshot gap {} -> {} exceeds history, clearing",
                old_latest, tick
            );
            self.ring.clear();
            self.oldest_server_tick = tick;
            self.recent_lerp_start_tick = 0;
            self.recent_lerp_end_tick = 0;
        } else {
            // skipped ticks must not alias data from the previous lap
            for skipped in old_latest + 1..tick {
                self.ring.reset(skipped);
            }

            let floor = tick.saturating_add(1).saturating_sub(CAPACITY);
            if self.oldest_server_tick < floor {
                self.oldest_server_tick = (floor..=old_latest)
                    .find(|&t| self.ring.slot(t).init)
                    .unwrap_or(tick);
            }
        }
        self.latest_server_tick = tick;
    }

    /// Oldest tick that still fits in the ring.
    fn floor(&self) -> u64 {
        self.latest_server_tick.saturating_add(1).saturating_sub(CAPACITY)
    }

    /// State of the object at `tick`, clamped to the stored window.
    ///
    /// A received tick is returned unchanged. A missing tick between two received
    /// ones is interpolated and locks that bracket; with only one neighbour that
    /// neighbour is returned as-is.
    pub fn lerp_at_tick(&mut self, tick: u64) -> ObjectSyncState {
        if !self.populated {
            return ObjectSyncState::default();
        }

        let tick = tick.clamp(self.oldest_server_tick, self.latest_server_tick);
        let exact = *self.ring.slot(tick);
        if exact.init {
            return exact;
        }

        let prev = (self.oldest_server_tick..tick)
            .rev()
            .find(|&t| self.ring.slot(t).init);
        let next = (tick.saturating_add(1)..=self.latest_server_tick)
            .find(|&t| self.ring.slot(t).init);

        match (prev, next) {
            (Some(prev), Some(next)) => {
                self.recent_lerp_start_tick = prev;
                self.recent_lerp_end_tick = next;
                let t = (tick - prev) as f32 / (next - prev) as f32;
                ObjectSyncState::lerp(self.ring.slot(prev), self.ring.slot(next), t)
            }
            (Some(only), None) | (None, Some(only)) => *self.ring.slot(only),
            (None, None) => exact,
        }
    }
}
