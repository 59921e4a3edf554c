//! Movement and collision for the authoritative simulation
//!
//! Collision uses the separating axis theorem on convex polygons. For each
//! pair the candidate axes are the face normals of both shapes; any axis with
//! a positive gap proves the pair is apart. Otherwise the axis with the least
//! overlap is the push-out direction.

use crate::pool::PooledObject;
use glam::Vec2;
use shared::{
    ObjectSyncState, TickInput, ANIMATION_FRAME_COUNT, COLLISION_MAX_ITERATIONS,
    COLLISION_MAX_VERTICES,
};

/// Distance travelled per animation frame.
pub const ANIMATION_STRIDE: f32 = 6.0;
/// Frames per second the animation drifts while standing still.
pub const IDLE_ANIMATION_RATE: f32 = 2.0;
/// Overlaps at or below this depth count as resting contact.
const CONTACT_SLOP: f32 = 1e-4;

/// Resolves one tick of player intent into velocity.
///
/// Any non-zero movement direction cancels pathing. A pathing input sets a new
/// destination which the object keeps seeking on later ticks until it is
/// within one unit of it.
pub fn apply_input(sync: &mut ObjectSyncState, input: &TickInput, speed: f32, dt: f32) {
    if input.move_dir != Vec2::ZERO {
        sync.is_pathing = false;
    } else if input.is_pathing {
        sync.is_pathing = true;
        sync.pathing_dest_p = input.pathing_dest_p;
    }

    sync.dp = if sync.is_pathing {
        let to_dest = sync.pathing_dest_p - sync.p;
        if to_dest.length_squared() > 1.0 {
            // land on the destination instead of overshooting it
            let speed = speed.min(to_dest.length() / dt);
            to_dest.normalize_or_zero() * speed
        } else {
            sync.is_pathing = false;
            Vec2::ZERO
        }
    } else {
        input.move_dir * speed
    };
    sync.is_moving = sync.dp != Vec2::ZERO;
}

pub fn integrate(sync: &mut ObjectSyncState, dt: f32) {
    sync.p += sync.dp * dt;
}

/// Push-out needed to separate a moving object from an obstacle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Penetration {
    /// Unit normal pointing from the obstacle toward the mover.
    pub normal: Vec2,
    pub depth: f32,
}

struct WorldShape {
    points: [Vec2; COLLISION_MAX_VERTICES],
    len: usize,
}

impl WorldShape {
    fn of(sync: &ObjectSyncState) -> Self {
        let mut points = [Vec2::ZERO; COLLISION_MAX_VERTICES];
        let mut len = 0;
        for (slot, point) in points.iter_mut().zip(sync.world_vertices()) {
            *slot = point;
            len += 1;
        }
        Self { points, len }
    }

    fn points(&self) -> &[Vec2] {
        &self.points[..self.len]
    }

    fn project(&self, axis: Vec2) -> (f32, f32) {
        self.points()
            .iter()
            .map(|p| p.dot(axis))
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), d| {
                (min.min(d), max.max(d))
            })
    }

    fn centroid(&self) -> Vec2 {
        self.points().iter().copied().sum::<Vec2>() / self.len.max(1) as f32
    }
}

/// Tests `mover` against `obstacle`; `None` if a separating axis exists.
pub fn sat_penetration(mover: &ObjectSyncState, obstacle: &ObjectSyncState) -> Option<Penetration> {
    let a = WorldShape::of(mover);
    let b = WorldShape::of(obstacle);
    if a.len == 0 || b.len == 0 {
        return None;
    }

    let mut best: Option<(f32, Vec2)> = None;
    for axis in mover.world_normals().chain(obstacle.world_normals()) {
        if axis == Vec2::ZERO {
            continue;
        }

        let (a_min, a_max) = a.project(axis);
        let (b_min, b_max) = b.project(axis);
        let separation = (b_min - a_max).max(a_min - b_max);
        if separation > 0.0 {
            return None;
        }
        if best.map_or(true, |(least, _)| separation > least) {
            best = Some((separation, axis));
        }
    }

    let (separation, mut normal) = best?;
    if normal.dot(a.centroid() - b.centroid()) < 0.0 {
        normal = -normal;
    }
    Some(Penetration {
        normal,
        depth: -separation,
    })
}

/// Pushes the object in slot `index` out of every collidable object it overlaps.
///
/// Runs up to `COLLISION_MAX_ITERATIONS` passes, stopping at the first pass
/// with no overlap. Only the velocity component pointing into an obstacle is
/// removed, so the object keeps sliding along it. Returns whether anything was hit.
pub fn resolve_collisions(objects: &mut [PooledObject], index: usize) -> bool {
    let Some(mut mover) = objects.get(index).map(|object| object.sync) else {
        return false;
    };
    if !mover.has_collision || mover.collision.is_empty() {
        return false;
    }

    let mut collided = false;
    for _ in 0..COLLISION_MAX_ITERATIONS {
        let mut overlapped = false;
        for (other_index, other) in objects.iter().enumerate() {
            if other_index == index
                || other.is_free()
                || !other.sync.is_active
                || !other.sync.has_collision
            {
                continue;
            }
            let Some(hit) = sat_penetration(&mover, &other.sync) else {
                continue;
            };
            if hit.depth <= CONTACT_SLOP {
                continue;
            }

            mover.p += hit.normal * hit.depth;
            let into = mover.dp.dot(hit.normal);
            if into < 0.0 {
                mover.dp -= hit.normal * into;
            }
            overlapped = true;
        }

        if !overlapped {
            break;
        }
        collided = true;
    }

    mover.did_collide = collided;
    objects[index].sync = mover;
    collided
}

/// Advances the walk cycle by distance covered this tick plus a slow idle drift.
pub fn advance_animation(object: &mut PooledObject, dt: f32) {
    let moved = object.sync.p.distance(object.sync.prev_p);
    let frames = ANIMATION_FRAME_COUNT as f32;
    object.animation_t = (object.animation_t + moved / ANIMATION_STRIDE + IDLE_ANIMATION_RATE * dt) % frames;
    object.sync.animation_frame = object.animation_t as u32 % ANIMATION_FRAME_COUNT;
}
