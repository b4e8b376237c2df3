// ECS systems for one simulation tick.
// Each system is one pass; schedule.rs fixes the order. Heavy passes collect
// a snapshot from their query, solve it in parallel, then write back by entity.

use bevy_ecs::prelude::*;
use glam::Vec3;
use log::{trace, warn};

use super::avoidance::{AvoidanceSnapshot, solve_all};
use super::components::*;
use super::config::KernelConfig;
use super::geometry::Planet;
use super::lod::{LodGate, classify_position};
use super::movement::{MoverSnapshot, resolve_all};
use super::spatial::{GridEntry, SpatialHashGrid};
use super::targeting::{Caster, Targetable, drain_pending, resolve_target};

/// Rebuild the start-of-tick position snapshot and the target index.
pub fn snapshot_system(
    mut status: ResMut<TickStatus>,
    mut positions: ResMut<PositionIndex>,
    mut targets: ResMut<TargetIndex>,
    config: Res<KernelConfig>,
    transforms: Query<(Entity, &SurfaceTransform)>,
    targetables: Query<(Entity, &SurfaceTransform, &Targetable)>,
) {
    *status = TickStatus::default();

    positions.clear();
    for (entity, transform) in transforms.iter() {
        positions.insert(entity, transform.position);
    }

    let entries: Vec<GridEntry> = targetables
        .iter()
        .map(|(entity, transform, targetable)| GridEntry {
            position: transform.position,
            entity,
            radius: targetable.radius,
            weight: 0.0,
            is_obstacle: false,
        })
        .collect();
    match SpatialHashGrid::build(config.cell_size, &entries, config.max_grid_entries) {
        Ok(grid) => {
            targets.grid = grid;
            targets.teams.clear();
            for (entity, _, targetable) in targetables.iter() {
                targets.teams.insert(entity, targetable.team);
            }
        }
        Err(err) => {
            warn!("target index build failed: {err}");
            status.aborted = Some(err);
        }
    }
}

/// Toggle avoidance participation by distance to the player, on an interval.
pub fn lod_gate_system(
    clock: Res<TickClock>,
    config: Res<KernelConfig>,
    player: Res<PlayerRef>,
    positions: Res<PositionIndex>,
    mut gate: ResMut<LodGate>,
    mut status: ResMut<TickStatus>,
    mut agents: Query<(&SurfaceTransform, &mut Avoidance)>,
) {
    if status.aborted.is_some() || !gate.advance(clock.dt) {
        return;
    }
    let Some(player_pos) = player.0.and_then(|p| positions.get(p)) else {
        trace!("lod gate: no player reference, states kept");
        return;
    };
    status.lod_evaluated = true;

    let threshold_sq = config.lod_distance_sq();
    let mut transitions = 0;
    for (transform, mut avoidance) in agents.iter_mut() {
        let state = classify_position(transform.position, player_pos, threshold_sq);
        if state != avoidance.lod {
            avoidance.lod = state;
            transitions += 1;
        }
    }
    status.lod_transitions = transitions;
    trace!("lod gate: {transitions} transitions");
}

/// Rebuild the avoidance grid from active agents and all obstacles.
pub fn grid_build_system(
    config: Res<KernelConfig>,
    mut grid: ResMut<SpatialHashGrid>,
    mut status: ResMut<TickStatus>,
    agents: Query<(Entity, &SurfaceTransform, &Avoidance)>,
    obstacles: Query<(Entity, &SurfaceTransform, &Obstacle)>,
) {
    if status.aborted.is_some() {
        return;
    }
    let mut entries: Vec<GridEntry> = agents
        .iter()
        .filter(|(_, _, a)| a.lod.is_active())
        .map(|(entity, transform, a)| GridEntry {
            position: transform.position,
            entity,
            radius: a.radius,
            weight: a.weight,
            is_obstacle: false,
        })
        .collect();
    status.active_agents = entries.len();
    entries.extend(obstacles.iter().map(|(entity, transform, o)| GridEntry {
        position: transform.position,
        entity,
        radius: o.radius,
        weight: o.weight,
        is_obstacle: true,
    }));

    match SpatialHashGrid::build(config.cell_size, &entries, config.max_grid_entries) {
        Ok(built) => {
            status.grid_entries = built.len();
            *grid = built;
        }
        Err(err) => {
            warn!("avoidance grid build failed: {err}");
            grid.clear();
            status.aborted = Some(err);
        }
    }
}

/// Compute tangent steering for every active agent.
pub fn avoidance_system(
    config: Res<KernelConfig>,
    planet: Res<Planet>,
    grid: Res<SpatialHashGrid>,
    status: Res<TickStatus>,
    mut agents: Query<(Entity, &SurfaceTransform, &Avoidance, &mut Steering)>,
) {
    if status.aborted.is_some() {
        return;
    }
    let mut snapshots = Vec::with_capacity(status.active_agents);
    for (entity, transform, avoidance, mut steering) in agents.iter_mut() {
        if avoidance.lod.is_active() {
            snapshots.push(AvoidanceSnapshot {
                entity,
                position: transform.position,
                radius: avoidance.radius,
                avoidance_weight: avoidance.weight,
            });
        } else {
            steering.0 = Vec3::ZERO;
        }
    }

    let forces = solve_all(&snapshots, &grid, &planet, config.max_steering_force);
    for (snapshot, force) in snapshots.iter().zip(forces) {
        if let Ok((_, _, _, mut steering)) = agents.get_mut(snapshot.entity) {
            steering.0 = force;
        }
    }
}

/// Run every movement resolver; results wait in `NextTransform`.
pub fn movement_system(
    clock: Res<TickClock>,
    planet: Res<Planet>,
    positions: Res<PositionIndex>,
    status: Res<TickStatus>,
    mut movers: Query<(
        Entity,
        &SurfaceTransform,
        &mut MovementMode,
        Option<&Steering>,
        &mut NextTransform,
    )>,
) {
    if status.aborted.is_some() {
        return;
    }
    let snapshots: Vec<MoverSnapshot> = movers
        .iter()
        .filter(|(_, _, mode, _, _)| **mode != MovementMode::None)
        .map(|(entity, transform, mode, steering, _)| MoverSnapshot {
            entity,
            transform: *transform,
            mode: *mode,
            steering: steering.map(|s| s.0).unwrap_or(Vec3::ZERO),
        })
        .collect();

    let outcomes = resolve_all(&snapshots, &positions, &planet, clock.dt);
    for (snapshot, outcome) in snapshots.iter().zip(outcomes) {
        let Ok((_, _, mut mode, _, mut next)) = movers.get_mut(snapshot.entity) else {
            continue;
        };
        next.0 = outcome.transform;
        if let (MovementMode::Orbit { offset, .. }, Some(new_offset)) = (&mut *mode, outcome.orbit_offset) {
            *offset = new_offset;
        }
    }
}

/// Apply this tick's pending transforms, or drop them if the tick aborted.
pub fn commit_system(
    mut status: ResMut<TickStatus>,
    mut agents: Query<(&mut SurfaceTransform, &mut NextTransform)>,
) {
    let aborted = status.aborted.is_some();
    let mut moved = 0;
    for (mut transform, mut next) in agents.iter_mut() {
        let Some(t) = next.0.take() else {
            continue;
        };
        if !aborted {
            *transform = t;
            moved += 1;
        }
    }
    status.moved = moved;
}

/// Drain ability queues and emit cast intents for in-range targets.
pub fn targeting_system(
    clock: Res<TickClock>,
    planet: Res<Planet>,
    positions: Res<PositionIndex>,
    targets: Res<TargetIndex>,
    mut intents: ResMut<CastIntents>,
    mut status: ResMut<TickStatus>,
    mut casters: Query<(Entity, &mut Caster)>,
) {
    if status.aborted.is_some() {
        return;
    }
    let mut scratch = Vec::new();
    let mut casts = 0;
    for (entity, mut caster) in casters.iter_mut() {
        let Some(position) = positions.get(entity) else {
            continue;
        };
        let target = if caster.pending().is_empty() {
            None
        } else {
            resolve_target(entity, position, &caster, &positions, &targets, &planet, &mut scratch)
        };
        casts += drain_pending(entity, position, &mut caster, target, clock.dt, &mut intents.0);
    }
    status.casts = casts;
}
