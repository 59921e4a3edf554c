//! Authoritative fixed-step simulation
//!
//! One call to [`SimulationState::tick`] is one server tick: remember previous
//! positions, apply each player's input, integrate, resolve collisions and
//! advance animation. All replicated state lives in the object pool, whose
//! slot indices are the network indices clients receive.

use crate::physics;
use crate::pool::ObjectPool;
use glam::Vec2;
use log::{debug, info};
use shared::{
    CollisionShape, ObjectKey, ObjectSyncState, TickInput, PLAYER_HALF_SIZE, PLAYER_SPEED,
    TIME_STEP, WORLD_HEIGHT, WORLD_WIDTH,
};

const WALL_THICKNESS: f32 = 20.0;

const PLAYER_COLORS: [[f32; 4]; 6] = [
    [0.90, 0.30, 0.25, 1.0],
    [0.25, 0.60, 0.90, 1.0],
    [0.30, 0.80, 0.40, 1.0],
    [0.95, 0.80, 0.25, 1.0],
    [0.70, 0.40, 0.90, 1.0],
    [0.95, 0.55, 0.20, 1.0],
];

const WALL_COLOR: [f32; 4] = [0.35, 0.35, 0.40, 1.0];

#[derive(Debug, Clone)]
pub struct SimulationState {
    /// Id of the last completed tick.
    pub tick: u64,
    pub objects: ObjectPool,
    players_spawned: usize,
}

impl SimulationState {
    /// Empty simulation with no objects at all.
    pub fn empty() -> Self {
        Self {
            tick: 0,
            objects: ObjectPool::new(),
            players_spawned: 0,
        }
    }

    /// Simulation with the static world already in place.
    pub fn new() -> Self {
        let mut state = Self::empty();
        state.spawn_world();
        state
    }

    fn spawn_world(&mut self) {
        let (w, h, t) = (WORLD_WIDTH, WORLD_HEIGHT, WALL_THICKNESS);
        let walls = [
            (Vec2::new(w / 2.0, -t / 2.0), Vec2::new(w / 2.0 + t, t / 2.0), 0.0),
            (Vec2::new(w / 2.0, h + t / 2.0), Vec2::new(w / 2.0 + t, t / 2.0), 0.0),
            (Vec2::new(-t / 2.0, h / 2.0), Vec2::new(t / 2.0, h / 2.0), 0.0),
            (Vec2::new(w + t / 2.0, h / 2.0), Vec2::new(t / 2.0, h / 2.0), 0.0),
            (Vec2::new(w * 0.3, h * 0.5), Vec2::new(80.0, 30.0), 0.0),
            (Vec2::new(w * 0.7, h * 0.35), Vec2::new(60.0, 60.0), 0.6),
        ];

        for (p, half_extents, rotation) in walls {
            self.spawn_static(p, half_extents, rotation);
        }
    }

    pub fn spawn_static(&mut self, p: Vec2, half_extents: Vec2, rotation: f32) -> Option<ObjectKey> {
        self.objects.spawn(ObjectSyncState {
            has_collision: true,
            p,
            prev_p: p,
            color: WALL_COLOR,
            rotation,
            collision: CollisionShape::rect(half_extents),
            ..ObjectSyncState::default()
        })
    }

    /// Spawns a player on the next free spawn point.
    pub fn spawn_player(&mut self) -> Option<ObjectKey> {
        let n = self.players_spawned;
        let column = (n % 4) as f32;
        let row = ((n / 4) % 3) as f32;
        let p = Vec2::new(WORLD_WIDTH * (0.15 + 0.2 * column), WORLD_HEIGHT * (0.2 + 0.3 * row));

        let key = self.objects.spawn(ObjectSyncState {
            has_collision: true,
            p,
            prev_p: p,
            color: PLAYER_COLORS[n % PLAYER_COLORS.len()],
            collision: CollisionShape::rect(Vec2::splat(PLAYER_HALF_SIZE)),
            ..ObjectSyncState::default()
        })?;

        self.players_spawned += 1;
        info!("Spawned player {:?} at ({:.0}, {:.0})", key, p.x, p.y);
        Some(key)
    }

    pub fn despawn(&mut self, key: ObjectKey) -> bool {
        let removed = self.objects.despawn(key);
        if removed {
            debug!("Despawned {:?}", key);
        }
        removed
    }

    /// Runs one simulation tick with one resolved input per player.
    pub fn tick(&mut self, inputs: &[(ObjectKey, TickInput)]) {
        self.tick += 1;

        for object in self.objects.slots_mut() {
            if !object.is_free() {
                object.sync.prev_p = object.sync.p;
            }
        }

        for (key, input) in inputs {
            if let Some(sync) = self.objects.get_mut(*key) {
                physics::apply_input(sync, input, PLAYER_SPEED, TIME_STEP);
            }
        }

        let objects = self.objects.slots_mut();
        for object in objects.iter_mut() {
            if !object.is_free() && object.sync.is_moving {
                physics::integrate(&mut object.sync, TIME_STEP);
            }
        }

        for index in 0..objects.len() {
            if !objects[index].is_free() && objects[index].sync.is_moving {
                physics::resolve_collisions(objects, index);
            }
        }

        for object in objects.iter_mut() {
            if !object.is_free() {
                physics::advance_animation(object, TIME_STEP);
            }
        }
    }
}

impl Default for SimulationState {
    fn default() -> Self {
        Self::new()
    }
}
