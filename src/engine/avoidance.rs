// Surface avoidance: overlap-based repulsion over the spatial hash grid.
//
// Each active agent pushes away from every overlapping neighbour (agents and
// static obstacles) found in its 3×3×3 cell block. The summed force is
// flattened onto the local tangent plane and clamped, so steering never pulls
// an agent off the planet.
//
// The pass reads a frozen grid and writes one force per agent. Agents are
// independent, so the solve runs as a rayon parallel map over a snapshot
// slice, collected from the ECS before the pass runs.

use bevy_ecs::prelude::*;
use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use super::geometry::{Planet, reject_normal};
use super::spatial::SpatialHashGrid;

/// Distance below which two entries are treated as coincident.
pub const COINCIDENT_DISTANCE: f32 = 1e-3;
/// Gain applied to every repulsion contribution.
pub const REPULSION_GAIN: f32 = 5.0;

/// Read-only data for one agent, collected from ECS before the solve.
#[derive(Debug, Clone, Copy)]
pub struct AvoidanceSnapshot {
    pub entity: Entity,
    pub position: Vec3,
    pub radius: f32,
    /// Scales the final tangent force for this agent.
    pub avoidance_weight: f32,
}

/// Unit vector derived only from the unordered pair `(a, b)`.
///
/// Used to separate coincident entries. The lower-index side gets `+v` and
/// the other side `-v`, so the two members of a pair are pushed apart and the
/// result never depends on evaluation order.
pub fn pair_separation_direction(a: Entity, b: Entity) -> Vec3 {
    let seed = u64::from(a.index() ^ b.index()).max(1);
    let mut rng = StdRng::seed_from_u64(seed);
    let v = loop {
        let candidate = Vec3::new(
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
        );
        let len_sq = candidate.length_squared();
        if len_sq > 1e-4 && len_sq <= 1.0 {
            break candidate / len_sq.sqrt();
        }
    };
    if a < b { v } else { -v }
}

/// Repulsion that `other` exerts on `self_pos`, or `None` when they do not
/// overlap.
pub fn repulsion(
    self_entity: Entity,
    self_pos: Vec3,
    self_radius: f32,
    other_entity: Entity,
    other_pos: Vec3,
    other_radius: f32,
    other_weight: f32,
) -> Option<Vec3> {
    let combined = self_radius + other_radius;
    let offset = self_pos - other_pos;
    let dist_sq = offset.length_squared();
    if dist_sq >= combined * combined {
        return None;
    }
    let dist = dist_sq.sqrt();
    if dist > COINCIDENT_DISTANCE {
        Some(offset / dist * (combined - dist) * other_weight * REPULSION_GAIN)
    } else {
        Some(pair_separation_direction(self_entity, other_entity) * REPULSION_GAIN)
    }
}

/// Tangent steering force for one agent.
///
/// Neighbours are visited in the grid's deterministic bucket order, so equal
/// inputs give bit-identical output. An agent with no overlapping neighbour
/// gets `Vec3::ZERO`.
pub fn compute_steering(
    agent: &AvoidanceSnapshot,
    grid: &SpatialHashGrid,
    planet: &Planet,
    max_force: f32,
) -> Vec3 {
    let mut force = Vec3::ZERO;
    for other in grid.query_neighborhood(agent.position) {
        if other.entity == agent.entity {
            continue;
        }
        if let Some(push) = repulsion(
            agent.entity,
            agent.position,
            agent.radius,
            other.entity,
            other.position,
            other.radius,
            other.weight,
        ) {
            force += push;
        }
    }
    if force == Vec3::ZERO {
        return force;
    }

    let normal = planet.normal_at(agent.position);
    let tangent = reject_normal(force, normal).clamp_length_max(max_force);
    tangent * agent.avoidance_weight
}

/// Solve every agent in parallel. Output order matches `agents`.
pub fn solve_all(
    agents: &[AvoidanceSnapshot],
    grid: &SpatialHashGrid,
    planet: &Planet,
    max_force: f32,
) -> Vec<Vec3> {
    agents
        .par_iter()
        .map(|a| compute_steering(a, grid, planet, max_force))
        .collect()
}
