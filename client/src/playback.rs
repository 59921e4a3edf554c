//! Client playback of replicated state
//!
//! Playback walks a single `next_playback_tick` through the window that every
//! populated snapshot store can answer, producing one interpolated state per
//! network slot per step. How far playback trails the newest data is fed to a
//! [`TickDeltaTracker`]; when the lag grows past its target, one extra step is
//! taken per client tick until it is back in range.

use crate::snapshot::{SnapshotReject, SnapshotStore};
use log::debug;
use shared::{ObjectLocalState, ObjectSyncState, TickDeltaTracker, OBJ_MAX_NETWORK_OBJECTS};

#[derive(Debug, Clone)]
pub struct Playback {
    stores: Vec<SnapshotStore>,
    states: Vec<ObjectSyncState>,
    local: Vec<ObjectLocalState>,
    next_playback_tick: u64,
    tick_delta: TickDeltaTracker,
}

impl Playback {
    pub fn new() -> Self {
        Self {
            stores: vec![SnapshotStore::new(); OBJ_MAX_NETWORK_OBJECTS],
            states: vec![ObjectSyncState::default(); OBJ_MAX_NETWORK_OBJECTS],
            local: vec![ObjectLocalState::default(); OBJ_MAX_NETWORK_OBJECTS],
            next_playback_tick: 0,
            tick_delta: TickDeltaTracker::new(),
        }
    }

    /// Records a received state for network slot `net_index`.
    pub fn insert(
        &mut self,
        net_index: usize,
        tick: u64,
        state: ObjectSyncState,
    ) -> Result<(), SnapshotReject> {
        match self.stores.get_mut(net_index) {
            Some(store) => store.insert(tick, state),
            None => Ok(()),
        }
    }

    pub fn store(&self, net_index: usize) -> Option<&SnapshotStore> {
        self.stores.get(net_index)
    }

    /// Current interpolated state of every network slot.
    pub fn states(&self) -> &[ObjectSyncState] {
        &self.states
    }

    pub fn state(&self, net_index: usize) -> Option<&ObjectSyncState> {
        self.states.get(net_index)
    }

    pub fn local_states(&self) -> &[ObjectLocalState] {
        &self.local
    }

    pub fn next_playback_tick(&self) -> u64 {
        self.next_playback_tick
    }

    pub fn tick_catchup(&self) -> u64 {
        self.tick_delta.tick_catchup()
    }

    /// One client tick of playback; returns how many steps were taken (0 to 2).
    pub fn playback_tick(&mut self) -> u32 {
        if !self.advance_once() {
            return 0;
        }
        if self.tick_delta.consume_catchup() && self.advance_once() {
            return 2;
        }
        1
    }

    fn advance_once(&mut self) -> bool {
        let mut smallest_latest: Option<u64> = None;
        let mut biggest_oldest = 0;
        for store in self.stores.iter().filter(|s| s.is_populated()) {
            let latest = store.latest_server_tick();
            smallest_latest = Some(smallest_latest.map_or(latest, |s| s.min(latest)));
            biggest_oldest = biggest_oldest.max(store.oldest_server_tick());
        }
        let Some(smallest_latest) = smallest_latest else {
            return false;
        };

        if self.next_playback_tick < biggest_oldest {
            debug!(
                "Playback skipped ahead from {} to {}",
                self.next_playback_tick, biggest_oldest
            );
            self.next_playback_tick = biggest_oldest;
        }
        if smallest_latest < self.next_playback_tick || self.next_playback_tick == u64::MAX {
            return false;
        }

        let delay = smallest_latest - self.next_playback_tick;
        if self.tick_delta.add_tick(smallest_latest) {
            self.tick_delta.update_catchup(delay);
        }

        let tick = self.next_playback_tick;
        for (store, state) in self.stores.iter_mut().zip(self.states.iter_mut()) {
            if store.is_populated() {
                *state = store.lerp_at_tick(tick);
            }
        }
        self.next_playback_tick += 1;
        true
    }

    /// Eases the display-only state toward the current interpolated states.
    pub fn update_local(&mut self, dt: f32) {
        for (local, sync) in self.local.iter_mut().zip(self.states.iter()) {
            local.update(sync, dt);
        }
    }
}

impl Default for Playback {
    fn default() -> Self {
        Self::new()
    }
}
