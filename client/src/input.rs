//! Per-tick input sampling
//!
//! The client produces exactly one [`TickInput`] per client tick. Where it comes
//! from is behind [`InputSource`]; the headless binary drives its player with
//! [`WanderInput`], which alternates between pathing to random destinations
//! and short bursts of manual movement.

use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{ObjectSyncState, TickInput, TICK_RATE, WORLD_HEIGHT, WORLD_WIDTH};

/// Keeps wander destinations away from the world border.
const WANDER_MARGIN: f32 = 60.0;

pub trait InputSource {
    /// Input for client tick `tick`; `player` is the latest interpolated state
    /// of the local player once its key is known.
    fn sample(&mut self, tick: u64, player: Option<&ObjectSyncState>) -> TickInput;
}

/// Always the same input; useful for tests and scripted runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantInput(pub TickInput);

impl InputSource for ConstantInput {
    fn sample(&mut self, _tick: u64, _player: Option<&ObjectSyncState>) -> TickInput {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum WanderMode {
    Idle { until: u64 },
    Pathing { dest: Vec2, until: u64 },
    Manual { dir: Vec2, until: u64 },
}

/// Random walk over the world with seeded, reproducible choices.
#[derive(Debug, Clone)]
pub struct WanderInput {
    rng: StdRng,
    mode: WanderMode,
    /// Pathing intent goes out only on the tick it was chosen.
    path_sent: bool,
}

impl WanderInput {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            mode: WanderMode::Idle { until: 0 },
            path_sent: false,
        }
    }

    fn next_mode(&mut self, tick: u64) -> WanderMode {
        let roll: f32 = self.rng.gen();
        if roll < 0.6 {
            let dest = Vec2::new(
                self.rng.gen_range(WANDER_MARGIN..WORLD_WIDTH - WANDER_MARGIN),
                self.rng.gen_range(WANDER_MARGIN..WORLD_HEIGHT - WANDER_MARGIN),
            );
            WanderMode::Pathing {
                dest,
                until: tick + TICK_RATE * 4,
            }
        } else if roll < 0.9 {
            let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
            WanderMode::Manual {
                dir: Vec2::from_angle(angle),
                until: tick + self.rng.gen_range(TICK_RATE / 2..TICK_RATE * 2),
            }
        } else {
            WanderMode::Idle {
                until: tick + self.rng.gen_range(TICK_RATE / 4..TICK_RATE),
            }
        }
    }
}

impl InputSource for WanderInput {
    fn sample(&mut self, tick: u64, player: Option<&ObjectSyncState>) -> TickInput {
        let expired = match self.mode {
            WanderMode::Idle { until } | WanderMode::Manual { until, .. } => tick >= until,
            WanderMode::Pathing { dest, until } => {
                let arrived = player.is_some_and(|p| p.p.distance_squared(dest) <= 1.0);
                arrived || tick >= until
            }
        };
        if expired {
            self.mode = self.next_mode(tick);
            self.path_sent = false;
        }

        match self.mode {
            WanderMode::Idle { .. } => TickInput::default(),
            WanderMode::Manual { dir, .. } => TickInput::moving(dir),
            WanderMode::Pathing { dest, .. } => {
                if self.path_sent {
                    TickInput::default()
                } else {
                    self.path_sent = true;
                    TickInput::path_to(dest)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(seed: u64, ticks: u64) -> Vec<TickInput> {
        let mut input = WanderInput::new(seed);
        (1..=ticks).map(|tick| input.sample(tick, None)).collect()
    }

    #[test]
    fn test_wander_is_reproducible() {
        assert_eq!(run(42, 500), run(42, 500));
        assert_ne!(run(42, 500), run(43, 500));
    }

    #[test]
    fn test_wander_destinations_inside_world() {
        for input in run(7, 5000).into_iter().filter(|i| i.is_pathing) {
            let d = input.pathing_dest_p;
            assert!(d.x >= WANDER_MARGIN && d.x <= WORLD_WIDTH - WANDER_MARGIN);
            assert!(d.y >= WANDER_MARGIN && d.y <= WORLD_HEIGHT - WANDER_MARGIN);
        }
    }

    #[test]
    fn test_path_intent_sent_once_per_destination() {
        let inputs = run(3, 5000);
        let mut previous_dest = None;
        for input in inputs.iter().filter(|i| i.is_pathing) {
            assert_ne!(Some(input.pathing_dest_p), previous_dest);
            previous_dest = Some(input.pathing_dest_p);
        }
        assert!(previous_dest.is_some());
    }

    #[test]
    fn test_manual_moves_are_unit_length() {
        for input in run(11, 5000) {
            let len = input.move_dir.length();
            assert!(len == 0.0 || (len - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_arrival_ends_pathing() {
        let mut input = WanderInput::new(5);
        let mut tick = 1;
        // find a pathing leg
        let dest = loop {
            let sample = input.sample(tick, None);
            if sample.is_pathing {
                break sample.pathing_dest_p;
            }
            tick += 1;
        };

        let arrived = ObjectSyncState {
            p: dest,
            ..ObjectSyncState::default()
        };
        tick += 1;
        input.sample(tick, Some(&arrived));
        assert!(!matches!(input.mode, WanderMode::Pathing { dest: d, .. } if d == dest));
    }

    #[test]
    fn test_constant_input() {
        let mut input = ConstantInput(TickInput::moving(Vec2::X));
        assert_eq!(input.sample(9, None), TickInput::moving(Vec2::X));
    }
}
