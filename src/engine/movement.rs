// Movement resolvers: linear, follow-target and orbit.
//
// Each resolver is a pure function of the current transform, the mode's
// parameters, the planet and dt. `None` means "leave the transform as it is"
// (degenerate heading, missing target, missing orbit center).

use glam::{Quat, Vec3};
use rayon::prelude::*;

use super::components::{MovementMode, PositionIndex, SurfaceTransform};
use super::geometry::{
    Planet, TANGENT_EPSILON_SQ, forward_axis, project_onto_tangent, reject_normal, surface_rotation,
};

/// Tangent heading for a linear mover at `position`. Zero if degenerate.
#[inline]
pub fn linear_heading(planet: &Planet, position: Vec3, direction: Vec3) -> Vec3 {
    project_onto_tangent(direction, planet.normal_at(position))
}

/// Advance along a fixed world direction.
///
/// The direction is re-projected onto the tangent plane at the current
/// position. Steering is added as a tangent displacement.
pub fn resolve_linear(
    current: &SurfaceTransform,
    direction: Vec3,
    speed: f32,
    steering: Vec3,
    planet: &Planet,
    dt: f32,
) -> Option<SurfaceTransform> {
    let normal = planet.normal_at(current.position);
    let heading = project_onto_tangent(direction, normal);
    if heading == Vec3::ZERO {
        return None;
    }
    let displacement = heading * speed * dt + reject_normal(steering, normal) * dt;
    let position = planet.snap(current.position + displacement);
    Some(SurfaceTransform {
        position,
        rotation: surface_rotation(heading, planet.normal_at(position)),
    })
}

/// One surface step toward a live target position.
///
/// Never oversteps: the step is capped at the remaining surface distance
/// minus `stop_distance`. If the heading is degenerate the agent keeps its
/// current forward axis for rotation. A target on the far side of the planet
/// is still approached, along the forward axis when no tangent points at it.
pub fn resolve_follow(
    current: &SurfaceTransform,
    target: Option<Vec3>,
    speed: f32,
    stop_distance: f32,
    steering: Vec3,
    planet: &Planet,
    dt: f32,
) -> Option<SurfaceTransform> {
    let target = target?;
    let normal = planet.normal_at(current.position);
    let to_target = target - current.position;
    let heading = project_onto_tangent(to_target, normal);

    let remaining = planet.surface_distance(current.position, target);
    let step = (speed * dt).min((remaining - stop_distance).max(0.0));
    let antipodal = heading == Vec3::ZERO && to_target.length_squared() >= TANGENT_EPSILON_SQ;
    let travel = if !antipodal || step <= 0.0 {
        heading
    } else {
        // Every great circle leads to the antipode.
        reject_normal(to_target, normal)
            .try_normalize()
            .or_else(|| project_onto_tangent(forward_axis(current.rotation), normal).try_normalize())
            .unwrap_or_else(|| normal.any_orthonormal_vector())
    };
    let position = planet.snap(current.position + travel * step + reject_normal(steering, normal) * dt);

    let facing = if heading == Vec3::ZERO {
        forward_axis(current.rotation)
    } else {
        heading
    };
    Some(SurfaceTransform {
        position,
        rotation: surface_rotation(facing, planet.normal_at(position)),
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitStep {
    pub transform: SurfaceTransform,
    /// Offset to store back for the next tick.
    pub offset: Vec3,
}

/// Rotate the orbit offset around the center's surface normal.
///
/// The stored offset is first flattened onto the center's tangent plane (the
/// center may have moved), rescaled to `radius`, then rotated by
/// `angular_speed * dt`. The absolute position is snapped onto the planet.
pub fn resolve_orbit(
    center: Option<Vec3>,
    offset: Vec3,
    radius: f32,
    angular_speed: f32,
    planet: &Planet,
    dt: f32,
) -> Option<OrbitStep> {
    let center = center?;
    let axis = planet.normal_at(center);

    let flat = reject_normal(offset, axis);
    let flat = if flat.length_squared() < TANGENT_EPSILON_SQ {
        axis.any_orthonormal_vector()
    } else {
        flat.normalize()
    };
    let offset = Quat::from_axis_angle(axis, angular_speed * dt) * (flat * radius);

    let position = planet.snap(center + offset);
    let along = if angular_speed < 0.0 {
        offset.cross(axis)
    } else {
        axis.cross(offset)
    };
    Some(OrbitStep {
        transform: SurfaceTransform {
            position,
            rotation: surface_rotation(along, planet.normal_at(position)),
        },
        offset,
    })
}

// ============================================================================
// BATCH RESOLVE
// ============================================================================

/// Read-only data for one mover, collected from ECS before the pass.
#[derive(Debug, Clone, Copy)]
pub struct MoverSnapshot {
    pub entity: bevy_ecs::entity::Entity,
    pub transform: SurfaceTransform,
    pub mode: MovementMode,
    pub steering: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveOutcome {
    pub transform: Option<SurfaceTransform>,
    /// New orbit offset, for orbit movers that resolved.
    pub orbit_offset: Option<Vec3>,
}

/// Dispatch one mover to its resolver.
pub fn resolve(mover: &MoverSnapshot, positions: &PositionIndex, planet: &Planet, dt: f32) -> MoveOutcome {
    match mover.mode {
        MovementMode::None => MoveOutcome {
            transform: None,
            orbit_offset: None,
        },
        MovementMode::Linear { direction, speed } => MoveOutcome {
            transform: resolve_linear(&mover.transform, direction, speed, mover.steering, planet, dt),
            orbit_offset: None,
        },
        MovementMode::FollowTarget {
            target,
            speed,
            stop_distance,
        } => MoveOutcome {
            transform: resolve_follow(
                &mover.transform,
                positions.get(target),
                speed,
                stop_distance,
                mover.steering,
                planet,
                dt,
            ),
            orbit_offset: None,
        },
        MovementMode::Orbit {
            center,
            radius,
            angular_speed,
            offset,
        } => {
            let step = resolve_orbit(positions.get(center), offset, radius, angular_speed, planet, dt);
            MoveOutcome {
                transform: step.map(|s| s.transform),
                orbit_offset: step.map(|s| s.offset),
            }
        }
    }
}

/// Resolve every mover in parallel. Output order matches `movers`.
pub fn resolve_all(
    movers: &[MoverSnapshot],
    positions: &PositionIndex,
    planet: &Planet,
    dt: f32,
) -> Vec<MoveOutcome> {
    movers
        .par_iter()
        .map(|m| resolve(m, positions, planet, dt))
        .collect()
}
