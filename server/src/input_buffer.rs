//! Per-player input FIFO
//!
//! Clients re-send a sliding window of their most recent inputs with every
//! packet, so most batches overlap earlier ones. The buffer turns those
//! overlapping windows into a strict FIFO with one entry per client tick and
//! hands the simulation exactly one input per server tick, skipping ahead when
//! the backlog grows past what recent arrival jitter justifies.

use log::debug;
use shared::ring::RingQueue;
use shared::{TickDeltaTracker, TickInput, NET_MAX_INPUT_TICKS, NET_MAX_TICK_JUMP};

#[derive(Debug, Clone, Default)]
pub struct PlayerInputBuffer {
    queue: RingQueue<TickInput, NET_MAX_INPUT_TICKS>,
    /// Highest client tick id of any accepted batch; 0 until the first one.
    latest_client_tick_id: u64,
    /// Last input handed out, reused when the queue runs dry.
    last_input: TickInput,
    tick_delta: TickDeltaTracker,
}

impl PlayerInputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorbs one `Inputs` window whose last entry belongs to `net_msg_tick_id`.
    ///
    /// Returns the number of inputs that were new and got queued.
    pub fn insert_batch(&mut self, inputs: &[TickInput], net_msg_tick_id: u64) -> usize {
        if net_msg_tick_id <= self.latest_client_tick_id {
            debug!(
                "Ignoring stale input batch {} (latest {})",
                net_msg_tick_id, self.latest_client_tick_id
            );
            return 0;
        }
        if net_msg_tick_id - self.latest_client_tick_id > NET_MAX_TICK_JUMP {
            debug!(
                "Ignoring input batch {} too far ahead of {}",
                net_msg_tick_id, self.latest_client_tick_id
            );
            return 0;
        }

        // A batch cannot cover ticks before 0, nor more than the FIFO holds
        let possible = net_msg_tick_id.saturating_add(1).min(NET_MAX_INPUT_TICKS as u64) as usize;
        let batch = &inputs[inputs.len().saturating_sub(possible)..];
        let first_tick = net_msg_tick_id - (batch.len() as u64).saturating_sub(1);

        let delay_before = self.queue.len() as u64;
        let mut queued = 0;
        for (offset, input) in batch.iter().enumerate() {
            let tick = first_tick + offset as u64;
            if tick <= self.latest_client_tick_id {
                continue;
            }
            if self.queue.push(*input).is_some() {
                debug!("Input FIFO full, dropped oldest input");
            }
            queued += 1;
        }

        self.latest_client_tick_id = net_msg_tick_id;
        if self.tick_delta.add_tick(net_msg_tick_id) {
            self.tick_delta.update_catchup(delay_before);
        }
        queued
    }

    /// Produces the input to apply this simulation tick.
    pub fn get_input_for_tick(&mut self) -> TickInput {
        let mut input = match self.queue.pop() {
            Some(input) => {
                self.last_input = input;
                input
            }
            None => {
                // Keep moving the same way, but never re-issue a stale destination
                let mut input = self.last_input;
                input.is_pathing = false;
                input.pathing_dest_p = Default::default();
                input
            }
        };

        if self.queue.len() > 1 && self.tick_delta.consume_catchup() {
            if let Some(extra) = self.queue.pop() {
                self.last_input = extra;
                input.move_dir += extra.move_dir;
                if extra.is_pathing {
                    input.is_pathing = true;
                    input.pathing_dest_p = extra.pathing_dest_p;
                }
            }
        }

        input.normalized()
    }

    /// Inputs waiting in the FIFO.
    pub fn delay(&self) -> usize {
        self.queue.len()
    }

    pub fn latest_client_tick_id(&self) -> u64 {
        self.latest_client_tick_id
    }

    pub fn tick_catchup(&self) -> u64 {
        self.tick_delta.tick_catchup()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use glam::Vec2;

    /// Inputs for ticks `first..=last`, each tagged with its tick in `move_dir.x`.
    fn window(first: u64, last: u64) -> Vec<TickInput> {
        (first..=last)
            .map(|tick| TickInput::moving(Vec2::new(tick as f32, 0.0)))
            .collect()
    }

    fn drain_raw(buffer: &mut PlayerInputBuffer) -> Vec<f32> {
        let mut ticks = Vec::new();
        while let Some(input) = buffer.queue.pop() {
            ticks.push(input.move_dir.x);
        }
        ticks
    }

    #[test]
    fn test_overlapping_batches_deduplicated() {
        let mut buffer = PlayerInputBuffer::new();
        assert_eq!(buffer.insert_batch(&window(10, 15), 15), 6);
        assert_eq!(buffer.insert_batch(&window(12, 17), 17), 2);

        let ticks = drain_raw(&mut buffer);
        let expected: Vec<f32> = (10..=17).map(|t| t as f32).collect();
        assert_eq!(ticks, expected);
    }

    #[test]
    fn test_stale_batch_ignored() {
        let mut buffer = PlayerInputBuffer::new();
        buffer.insert_batch(&window(5, 9), 9);
        assert_eq!(buffer.insert_batch(&window(3, 8), 8), 0);
        assert_eq!(buffer.insert_batch(&window(5, 9), 9), 0);
        assert_eq!(buffer.latest_client_tick_id(), 9);
        assert_eq!(buffer.delay(), 5);
    }

    #[test]
    fn test_impossible_count_truncated_from_front() {
        let mut buffer = PlayerInputBuffer::new();
        // ten inputs cannot all belong to ticks 0..=2
        let inputs = window(100, 109);
        assert_eq!(buffer.insert_batch(&inputs, 2), 2);
        // the most recent two survive, assigned to ticks 1 and 2
        assert_eq!(drain_raw(&mut buffer), vec![108.0, 109.0]);
    }

    #[test]
    fn test_oversized_batch_keeps_most_recent() {
        let mut buffer = PlayerInputBuffer::new();
        let inputs = window(1, 40);
        buffer.insert_batch(&inputs, 40);
        let ticks = drain_raw(&mut buffer);
        assert_eq!(ticks.len(), NET_MAX_INPUT_TICKS);
        assert_eq!(ticks[0], 9.0);
        assert_eq!(ticks[NET_MAX_INPUT_TICKS - 1], 40.0);
    }

    #[test]
    fn test_starved_buffer_extrapolates_without_pathing() {
        let mut buffer = PlayerInputBuffer::new();
        let input = TickInput {
            move_dir: Vec2::new(0.0, 2.0),
            is_pathing: true,
            pathing_dest_p: Vec2::new(50.0, 50.0),
        };
        buffer.insert_batch(&[input], 1);

        let first = buffer.get_input_for_tick();
        assert!(first.is_pathing);
        assert_approx_eq!(first.move_dir.y, 1.0, 1e-6);

        let starved = buffer.get_input_for_tick();
        assert!(!starved.is_pathing);
        assert_eq!(starved.pathing_dest_p, Vec2::ZERO);
        assert_approx_eq!(starved.move_dir.y, 1.0, 1e-6);
    }

    #[test]
    fn test_empty_buffer_yields_idle_input() {
        let mut buffer = PlayerInputBuffer::new();
        assert_eq!(buffer.get_input_for_tick(), TickInput::default());
    }

    #[test]
    fn test_catchup_merges_two_inputs() {
        let mut buffer = PlayerInputBuffer::new();
        // one batch per tick while the simulation consumes nothing
        for tick in 1..=22 {
            buffer.insert_batch(&[TickInput::moving(Vec2::X)], tick);
        }
        assert!(buffer.tick_catchup() > 0);

        let before = buffer.delay();
        let merged = buffer.get_input_for_tick();
        assert_eq!(buffer.delay(), before - 2);
        assert_approx_eq!(merged.move_dir.x, 1.0, 1e-6);
        assert!(!merged.is_pathing);
    }

    #[test]
    fn test_catchup_drains_backlog_to_target() {
        let mut buffer = PlayerInputBuffer::new();
        // client sends one batch per tick; the server stalled and let 24 pile up
        let mut client_tick = 0;
        for _ in 0..24 {
            client_tick += 1;
            buffer.insert_batch(&[TickInput::moving(Vec2::X)], client_tick);
        }

        for _ in 0..200 {
            client_tick += 1;
            buffer.insert_batch(&[TickInput::moving(Vec2::X)], client_tick);
            buffer.get_input_for_tick();
        }

        // target delay for one batch per tick is 1 + 0 + 4
        assert!(buffer.delay() <= 6, "delay stuck at {}", buffer.delay());
    }

    #[test]
    fn test_extra_pathing_overrides() {
        let mut buffer = PlayerInputBuffer::new();
        buffer.tick_delta.add_tick(1);
        buffer.tick_delta.add_tick(2);
        buffer.tick_delta.update_catchup(100);

        buffer.queue.push(TickInput::moving(Vec2::Y));
        buffer.queue.push(TickInput::path_to(Vec2::new(3.0, 4.0)));
        buffer.queue.push(TickInput::default());

        let merged = buffer.get_input_for_tick();
        assert!(merged.is_pathing);
        assert_eq!(merged.pathing_dest_p, Vec2::new(3.0, 4.0));
        assert_eq!(buffer.delay(), 1);
    }

    #[test]
    fn test_tick_id_at_u64_max_rejected() {
        let mut buffer = PlayerInputBuffer::new();
        assert_eq!(buffer.insert_batch(&[TickInput::moving(Vec2::X)], u64::MAX), 0);
        assert_eq!(buffer.latest_client_tick_id(), 0);

        // the player is not locked out by the bogus batch
        assert_eq!(buffer.insert_batch(&window(1, 3), 3), 3);
        assert_eq!(buffer.insert_batch(&window(1, 4), u64::MAX), 0);
        assert_eq!(buffer.latest_client_tick_id(), 3);
        assert_eq!(buffer.delay(), 3);
    }

    #[test]
    fn test_jump_within_bound_accepted() {
        let mut buffer = PlayerInputBuffer::new();
        buffer.insert_batch(&window(1, 2), 2);
        let far = 2 + NET_MAX_TICK_JUMP;
        assert_eq!(buffer.insert_batch(&window(1, 4), far), 4);
        assert_eq!(buffer.latest_client_tick_id(), far);
    }
}
