// Core ECS components and per-tick resources for the surface simulation.
// Pure math lives in geometry/movement/targeting; this file only holds data.

use bevy_ecs::prelude::*;
use glam::{Quat, Vec3};
use hashbrown::HashMap;

use super::error::{KernelError, KernelResult};
use super::geometry::{Planet, surface_rotation};
use super::lod::LodState;
use super::spatial::SpatialHashGrid;
use super::targeting::CastIntent;

// ============================================================================
// TRANSFORM
// ============================================================================

/// Position on the planet surface plus a tangent-aligned rotation
/// (local +Y = surface normal, local +Z = forward).
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct SurfaceTransform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl SurfaceTransform {
    /// Snap `position` onto `planet` and face `forward` along the surface.
    pub fn on_surface(planet: &Planet, position: Vec3, forward: Vec3) -> Self {
        let position = planet.snap(position);
        Self {
            position,
            rotation: surface_rotation(forward, planet.normal_at(position)),
        }
    }
}

/// Transform produced by this tick's movement pass, applied at commit.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct NextTransform(pub Option<SurfaceTransform>);

// ============================================================================
// MOVEMENT
// ============================================================================

/// Exactly one movement mode per entity.
#[derive(Component, Debug, Clone, Copy, PartialEq, Default)]
pub enum MovementMode {
    #[default]
    None,
    /// Move along a world-space direction, re-projected onto the tangent
    /// plane every tick.
    Linear { direction: Vec3, speed: f32 },
    /// Chase a live entity, stopping `stop_distance` short of it.
    FollowTarget {
        target: Entity,
        speed: f32,
        stop_distance: f32,
    },
    /// Circle around a (possibly moving) entity.
    Orbit {
        center: Entity,
        radius: f32,
        angular_speed: f32,
        /// Current tangent offset from the center. Re-normalised each tick.
        offset: Vec3,
    },
}

impl MovementMode {
    pub fn validate(&self) -> KernelResult<()> {
        match *self {
            MovementMode::None => Ok(()),
            MovementMode::Linear { direction, speed } => {
                if !direction.is_finite() {
                    return Err(KernelError::InvalidMovement("linear direction must be finite"));
                }
                non_negative(speed, "linear speed must be finite and >= 0")
            }
            MovementMode::FollowTarget {
                speed,
                stop_distance,
                ..
            } => {
                non_negative(speed, "follow speed must be finite and >= 0")?;
                non_negative(stop_distance, "follow stop distance must be finite and >= 0")
            }
            MovementMode::Orbit {
                radius,
                angular_speed,
                offset,
                ..
            } => {
                if !radius.is_finite() || radius <= 0.0 {
                    return Err(KernelError::InvalidMovement("orbit radius must be finite and > 0"));
                }
                if !angular_speed.is_finite() {
                    return Err(KernelError::InvalidMovement("orbit angular speed must be finite"));
                }
                if !offset.is_finite() {
                    return Err(KernelError::InvalidMovement("orbit offset must be finite"));
                }
                Ok(())
            }
        }
    }
}

fn non_negative(value: f32, reason: &'static str) -> KernelResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(KernelError::InvalidMovement(reason))
    }
}

// ============================================================================
// AVOIDANCE
// ============================================================================

/// Participation in the avoidance pass.
///
/// `radius` is the avoidance extent. `weight` both scales this agent's own
/// steering and is the push it exerts on neighbours. `lod` is toggled by the
/// LOD gate; only `Active` agents enter the grid.
#[derive(Component, Debug, Clone, Copy)]
pub struct Avoidance {
    pub radius: f32,
    pub weight: f32,
    pub lod: LodState,
}

impl Avoidance {
    pub fn new(radius: f32, weight: f32) -> KernelResult<Self> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(KernelError::InvalidAvoidance("radius must be finite and > 0"));
        }
        if !weight.is_finite() || weight < 0.0 {
            return Err(KernelError::InvalidAvoidance("weight must be finite and >= 0"));
        }
        Ok(Self {
            radius,
            weight,
            lod: LodState::Inactive,
        })
    }
}

/// Tangent steering force computed this tick. Zero when inactive.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Steering(pub Vec3);

/// Static repulsor. Never moved, never LOD gated.
#[derive(Component, Debug, Clone, Copy)]
pub struct Obstacle {
    pub radius: f32,
    pub weight: f32,
}

// ============================================================================
// RESOURCES
// ============================================================================

/// Time step and counter for the tick being run.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct TickClock {
    pub dt: f32,
    pub tick: u64,
}

/// The entity whose position drives the LOD gate.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct PlayerRef(pub Option<Entity>);

/// Start-of-tick positions of every surface entity.
///
/// Passes that need other entities' positions read from here, never from live
/// transforms, so no pass observes a half-written tick.
#[derive(Resource, Debug, Default)]
pub struct PositionIndex {
    positions: HashMap<Entity, Vec3>,
}

impl PositionIndex {
    pub fn clear(&mut self) {
        self.positions.clear();
    }

    pub fn insert(&mut self, entity: Entity, position: Vec3) {
        self.positions.insert(entity, position);
    }

    /// `None` when the entity no longer exists (or never had a transform).
    pub fn get(&self, entity: Entity) -> Option<Vec3> {
        self.positions.get(&entity).copied()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Per-tick index of `Targetable` entities for overlap queries.
#[derive(Resource, Debug, Clone)]
pub struct TargetIndex {
    pub grid: SpatialHashGrid,
    pub teams: HashMap<Entity, u32>,
}

impl TargetIndex {
    pub fn new(cell_size: f32) -> Self {
        Self {
            grid: SpatialHashGrid::new(cell_size),
            teams: HashMap::new(),
        }
    }
}

/// Cast intents emitted since the caller last drained them.
#[derive(Resource, Debug, Default)]
pub struct CastIntents(pub Vec<CastIntent>);

/// Outcome bookkeeping for the tick being run.
#[derive(Resource, Debug, Clone, Default)]
pub struct TickStatus {
    /// Set by a pass that could not complete. Later passes skip, and commit
    /// discards pending transforms.
    pub aborted: Option<KernelError>,
    pub lod_evaluated: bool,
    pub lod_transitions: usize,
    pub active_agents: usize,
    pub grid_entries: usize,
    pub moved: usize,
    pub casts: usize,
}
