// Surface geometry on a spherical planet.
//
// Every agent lives on the surface of a sphere. Directions are projected onto
// the local tangent plane, positions are snapped back onto the sphere after
// each step, and rotations are built so that local +Y is the surface normal
// and local +Z is the tangent forward direction.

use bevy_ecs::prelude::*;
use glam::{Mat3, Quat, Vec3};

use super::error::{KernelError, KernelResult};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Squared length below which a tangent projection is considered degenerate.
pub const TANGENT_EPSILON_SQ: f32 = 1e-3;

/// Relative tolerance of the surface invariant: `|p - c|` must be within
/// `SURFACE_TOLERANCE * radius` of `radius`.
pub const SURFACE_TOLERANCE: f32 = 1e-4;

// ============================================================================
// FREE FUNCTIONS
// ============================================================================

/// Remove the component of `direction` along `normal` and normalise the rest.
///
/// Returns `Vec3::ZERO` when the residual is too short to carry a direction
/// (e.g. `direction` parallel to `normal`). Callers treat zero as "no valid
/// tangent this tick" and skip movement. `normal` must be unit length.
#[inline]
pub fn project_onto_tangent(direction: Vec3, normal: Vec3) -> Vec3 {
    let residual = direction - normal * direction.dot(normal);
    if residual.length_squared() < TANGENT_EPSILON_SQ {
        Vec3::ZERO
    } else {
        residual.normalize()
    }
}

/// Remove the normal component without normalising. Used for forces, whose
/// magnitude matters.
#[inline]
pub fn reject_normal(vector: Vec3, normal: Vec3) -> Vec3 {
    vector - normal * vector.dot(normal)
}

/// Unit vector from `center` through `position`.
#[inline]
pub fn surface_normal(position: Vec3, center: Vec3) -> Vec3 {
    (position - center).normalize()
}

/// Radially project `position` onto the sphere.
///
/// Undefined for `position == center`; spawn validation rejects that case and
/// no resolver ever produces it.
#[inline]
pub fn snap_to_surface(position: Vec3, center: Vec3, radius: f32) -> Vec3 {
    debug_assert!(position != center, "snap_to_surface at planet center");
    center + (position - center).normalize() * radius
}

/// Rotation with local +Z along `forward` and local +Y along `up`.
///
/// `forward` is re-projected onto the plane of `up`. When it is zero or
/// parallel to `up` the result is the shortest-arc rotation taking +Y to `up`,
/// and identity if `up` itself is degenerate.
pub fn surface_rotation(forward: Vec3, up: Vec3) -> Quat {
    let Some(up) = up.try_normalize() else {
        return Quat::IDENTITY;
    };
    let f = project_onto_tangent(forward, up);
    if f == Vec3::ZERO {
        return Quat::from_rotation_arc(Vec3::Y, up);
    }
    let right = up.cross(f).normalize();
    let up = f.cross(right);
    Quat::from_mat3(&Mat3::from_cols(right, up, f)).normalize()
}

/// Local forward (+Z) axis of a rotation.
#[inline]
pub fn forward_axis(rotation: Quat) -> Vec3 {
    rotation * Vec3::Z
}

/// Arc length between two points measured along the sphere.
pub fn great_circle_distance(a: Vec3, b: Vec3, center: Vec3, radius: f32) -> f32 {
    let na = (a - center).normalize();
    let nb = (b - center).normalize();
    na.dot(nb).clamp(-1.0, 1.0).acos() * radius
}

/// One surface step from `from` toward `toward`.
///
/// The chord to the target is projected onto the tangent plane at `from`, the
/// position advances `step` along it, and the result is snapped back onto the
/// sphere. A degenerate tangent (target coincident or antipodal) leaves the
/// position where it is, snapped.
pub fn step_toward(from: Vec3, toward: Vec3, step: f32, center: Vec3, radius: f32) -> Vec3 {
    let normal = surface_normal(from, center);
    let dir = project_onto_tangent(toward - from, normal);
    snap_to_surface(from + dir * step, center, radius)
}

// ============================================================================
// PLANET
// ============================================================================

/// A spherical world. Immutable for the lifetime of a simulation.
#[derive(Resource, Debug, Clone, Copy, PartialEq)]
pub struct Planet {
    center: Vec3,
    radius: f32,
}

impl Planet {
    pub fn new(center: Vec3, radius: f32) -> KernelResult<Self> {
        if !center.is_finite() {
            return Err(KernelError::InvalidPlanetCenter);
        }
        if !radius.is_finite() || radius <= 0.0 {
            return Err(KernelError::InvalidPlanetRadius(radius));
        }
        Ok(Self { center, radius })
    }

    pub fn center(&self) -> Vec3 {
        self.center
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Half the circumference: the largest possible surface distance.
    pub fn half_circumference(&self) -> f32 {
        std::f32::consts::PI * self.radius
    }

    pub fn normal_at(&self, position: Vec3) -> Vec3 {
        surface_normal(position, self.center)
    }

    pub fn snap(&self, position: Vec3) -> Vec3 {
        snap_to_surface(position, self.center, self.radius)
    }

    pub fn surface_distance(&self, a: Vec3, b: Vec3) -> f32 {
        great_circle_distance(a, b, self.center, self.radius)
    }

    pub fn step_toward(&self, from: Vec3, toward: Vec3, step: f32) -> Vec3 {
        step_toward(from, toward, step, self.center, self.radius)
    }

    /// Distance of `position` from the surface (signed, outward positive).
    pub fn altitude(&self, position: Vec3) -> f32 {
        (position - self.center).length() - self.radius
    }

    pub fn is_on_surface(&self, position: Vec3) -> bool {
        self.altitude(position).abs() < SURFACE_TOLERANCE * self.radius
    }
}
