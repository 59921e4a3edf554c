//! Replicated object data model.
//!
//! [`ObjectSyncState`] is the authoritative, network-replicated part of a
//! simulated object. It is fixed-size so every `ObjUpdate` message has the
//! same length on the wire. [`ObjectLocalState`] is the client-only visual
//! smoothing layered on top of it and never leaves the process.

use crate::{ANIMATION_FRAME_COUNT, COLLISION_MAX_VERTICES};
use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Stable reference to a pooled object.
///
/// A key is valid only while the object in slot `index` still carries the
/// same `serial`. Serial 0 is never handed out, so `ObjectKey::default()` is a
/// key that never resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ObjectKey {
    pub serial: u32,
    pub index: u32,
}

impl ObjectKey {
    pub fn new(serial: u32, index: u32) -> Self {
        Self { serial, index }
    }

    pub fn is_none(&self) -> bool {
        self.serial == 0
    }
}

/// Convex collision polygon in object-local space.
///
/// `normals[i]` is the outward normal of the edge `vertices[i] -> vertices[i + 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CollisionShape {
    pub vertices: [Vec2; COLLISION_MAX_VERTICES],
    pub normals: [Vec2; COLLISION_MAX_VERTICES],
    pub count: u32,
}

impl CollisionShape {
    /// Builds a shape from a convex polygon, in either winding order.
    ///
    /// Points beyond `COLLISION_MAX_VERTICES` are ignored.
    pub fn from_polygon(points: &[Vec2]) -> Self {
        let count = points.len().min(COLLISION_MAX_VERTICES);
        let mut shape = Self {
            count: count as u32,
            ..Self::default()
        };
        if count == 0 {
            return shape;
        }

        shape.vertices[..count].copy_from_slice(&points[..count]);
        let centroid = points[..count].iter().copied().sum::<Vec2>() / count as f32;

        for i in 0..count {
            let a = shape.vertices[i];
            let b = shape.vertices[(i + 1) % count];
            let edge = b - a;
            let mut normal = Vec2::new(edge.y, -edge.x).normalize_or_zero();
            if normal.dot(a - centroid) < 0.0 {
                normal = -normal;
            }
            shape.normals[i] = normal;
        }

        shape
    }

    /// Axis-aligned rectangle centred on the object origin.
    pub fn rect(half_extents: Vec2) -> Self {
        let h = half_extents;
        Self::from_polygon(&[
            Vec2::new(-h.x, -h.y),
            Vec2::new(h.x, -h.y),
            Vec2::new(h.x, h.y),
            Vec2::new(-h.x, h.y),
        ])
    }

    pub fn len(&self) -> usize {
        (self.count as usize).min(COLLISION_MAX_VERTICES)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices[..self.len()]
    }

    pub fn normals(&self) -> &[Vec2] {
        &self.normals[..self.len()]
    }
}

/// One tick of player intent, as sampled on the client.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TickInput {
    pub move_dir: Vec2,
    pub is_pathing: bool,
    pub pathing_dest_p: Vec2,
}

impl TickInput {
    pub fn moving(dir: Vec2) -> Self {
        Self {
            move_dir: dir,
            ..Self::default()
        }
    }

    pub fn path_to(dest: Vec2) -> Self {
        Self {
            is_pathing: true,
            pathing_dest_p: dest,
            ..Self::default()
        }
    }

    /// Returns the input with a unit-length (or zero) movement direction.
    ///
    /// Non-finite directions collapse to zero.
    pub fn normalized(mut self) -> Self {
        if !self.move_dir.is_finite() {
            self.move_dir = Vec2::ZERO;
        }
        self.move_dir = self.move_dir.normalize_or_zero();
        if !self.pathing_dest_p.is_finite() {
            self.is_pathing = false;
            self.pathing_dest_p = Vec2::ZERO;
        }
        self
    }
}

/// Network-replicated subset of an object's state.
///
/// `init` distinguishes a written slot from a never-written one; an `ObjEmpty`
/// message produces `init == true` with every other field at its default,
/// which is how an unused network slot looks.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectSyncState {
    pub init: bool,
    pub is_active: bool,
    pub is_moving: bool,
    pub has_collision: bool,
    pub p: Vec2,
    pub prev_p: Vec2,
    /// Velocity in units per second.
    pub dp: Vec2,
    pub color: [f32; 4],
    pub rotation: f32,
    pub is_pathing: bool,
    pub pathing_dest_p: Vec2,
    pub did_collide: bool,
    pub animation_frame: u32,
    pub collision: CollisionShape,
}

impl ObjectSyncState {
    /// The state an `ObjEmpty` message stands for.
    pub fn empty() -> Self {
        Self {
            init: true,
            ..Self::default()
        }
    }

    /// Collision vertices transformed into world space.
    pub fn world_vertices(&self) -> impl Iterator<Item = Vec2> + '_ {
        let rot = Vec2::from_angle(self.rotation);
        let p = self.p;
        self.collision
            .vertices()
            .iter()
            .map(move |v| p + rot.rotate(*v))
    }

    /// Collision normals rotated into world space.
    pub fn world_normals(&self) -> impl Iterator<Item = Vec2> + '_ {
        let rot = Vec2::from_angle(self.rotation);
        self.collision.normals().iter().map(move |n| rot.rotate(*n))
    }

    /// Linear blend between two snapshots with `t` in `[0, 1]`.
    ///
    /// Continuous fields are interpolated, discrete counters are rounded to
    /// the nearest value and the remaining fields are taken from `a`.
    pub fn lerp(a: &Self, b: &Self, t: f32) -> Self {
        let mut out = *a;
        out.p = lerp_vec2(a.p, b.p, t);
        out.prev_p = lerp_vec2(a.prev_p, b.prev_p, t);
        out.dp = lerp_vec2(a.dp, b.dp, t);
        for (c, (ca, cb)) in out.color.iter_mut().zip(a.color.iter().zip(b.color.iter())) {
            *c = lerp_f32(*ca, *cb, t);
        }
        out.rotation = lerp_f32(a.rotation, b.rotation, t);
        out.animation_frame =
            lerp_f32(a.animation_frame as f32, b.animation_frame as f32, t).round() as u32;
        let collided = lerp_f32(a.did_collide as u8 as f32, b.did_collide as u8 as f32, t);
        out.did_collide = collided.round() >= 1.0;
        out
    }
}

fn lerp_f32(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

fn lerp_vec2(a: Vec2, b: Vec2, t: f32) -> Vec2 {
    Vec2::new(lerp_f32(a.x, b.x, t), lerp_f32(a.y, b.y, t))
}

/// Teleports farther than this snap the display position instead of easing.
const SNAP_DISTANCE: f32 = 96.0;
/// Fraction of the remaining display error closed per second (exponential).
const SMOOTHING_RATE: f32 = 18.0;

/// Client-only display state; never replicated, never used for gameplay.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ObjectLocalState {
    pub animated_p: Vec2,
    pub animated_rotation: f32,
    pub animation_phase: f32,
    pub visible: bool,
}

impl ObjectLocalState {
    /// Eases the display state toward the latest interpolated sync state.
    pub fn update(&mut self, sync: &ObjectSyncState, dt: f32) {
        if !sync.is_active {
            *self = Self::default();
            return;
        }

        let appeared = !self.visible;
        let teleported = self.animated_p.distance(sync.p) > SNAP_DISTANCE;
        if appeared || teleported {
            self.animated_p = sync.p;
            self.animated_rotation = sync.rotation;
        } else {
            let k = 1.0 - (-SMOOTHING_RATE * dt.max(0.0)).exp();
            self.animated_p += (sync.p - self.animated_p) * k;
            self.animated_rotation += (sync.rotation - self.animated_rotation) * k;
        }

        let target_phase = sync.animation_frame as f32 / ANIMATION_FRAME_COUNT as f32;
        self.animation_phase = target_phase.fract();
        self.visible = true;
    }
}
