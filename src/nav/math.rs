//! Geometry and ballistics helpers shared by the navigation stages.
//!
//! Everything here is pure and works in whatever frame the caller passes in.

use bevy::prelude::*;

/// Squared distance under which two points count as the same funnel vertex.
pub const VERTEX_EPSILON_SQ: f32 = 1e-6;

/// Move `current` toward `target` by at most `max_delta` without overshooting.
pub fn move_towards(current: Vec3, target: Vec3, max_delta: f32) -> Vec3 {
    let delta = target - current;
    let distance = delta.length();
    if distance <= max_delta || distance <= f32::EPSILON {
        target
    } else {
        current + delta / distance * max_delta
    }
}

/// Drop the vertical component.
#[inline]
pub fn flatten(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

/// Twice the signed area of triangle (a, b, c) projected onto XZ.
///
/// Positive when `c` lies to the right of the ray `a -> b` (Y up).
#[inline]
pub fn tri_area_xz(a: Vec3, b: Vec3, c: Vec3) -> f32 {
    let ab = b - a;
    let ac = c - a;
    ab.x * ac.z - ab.z * ac.x
}

/// Whether two points coincide on the XZ plane.
#[inline]
pub fn same_xz(a: Vec3, b: Vec3) -> bool {
    let dx = a.x - b.x;
    let dz = a.z - b.z;
    dx * dx + dz * dz < VERTEX_EPSILON_SQ
}

/// Rotation that faces `direction` with `up` as the up vector.
///
/// Returns `None` when the direction is degenerate or parallel to `up`.
pub fn look_rotation(direction: Vec3, up: Vec3) -> Option<Quat> {
    let forward = Dir3::new(direction).ok()?;
    let up = Dir3::new(up).unwrap_or(Dir3::Y);
    if forward.dot(*up).abs() > 0.9999 {
        return None;
    }
    Some(Transform::IDENTITY.looking_to(forward, up).rotation)
}

/// Launch velocity for a ballistic jump.
///
/// Derived from the range equation `d = v² · sin(2θ) / g`, so
/// `v = sqrt(d · g / sin(2θ))`, `horizontal = v · cos θ`, `vertical = v · sin θ`.
/// Multipliers are applied by the caller when integrating.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JumpArc {
    pub speed: f32,
    pub horizontal: f32,
    pub vertical: f32,
}

impl JumpArc {
    /// Solve the launch velocity that covers `distance` at `degrees` under `gravity`.
    ///
    /// Angles at 0° or 90° have no finite solution for a non-zero distance; the
    /// `sin(2θ)` term is clamped away from zero so the result stays finite.
    pub fn solve(distance: f32, degrees: f32, gravity: f32) -> Self {
        let theta = degrees.to_radians();
        let sin_2theta = (2.0 * theta).sin().max(1e-4);
        let speed = (distance.max(0.0) * gravity.max(0.0) / sin_2theta).sqrt();
        Self {
            speed,
            horizontal: speed * theta.cos(),
            vertical: speed * theta.sin(),
        }
    }

    /// Vertical displacement for one tick, `elapsed` seconds after launch.
    pub fn vertical_step(&self, gravity: f32, elapsed: f32, delta: f32, multiplier_y: f32) -> f32 {
        (self.vertical - gravity * elapsed) * delta * multiplier_y
    }

    /// Seconds until the arc returns to its launch height.
    pub fn flight_seconds(&self, gravity: f32) -> f32 {
        if gravity <= 0.0 {
            return 0.0;
        }
        2.0 * self.vertical / gravity
    }
}
