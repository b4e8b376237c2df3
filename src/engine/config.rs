// Kernel tunables.
//
// These started life as hard-coded constants in the avoidance and LOD passes.
// They stay as named defaults here but every one can be overridden per
// simulation.

use bevy_ecs::prelude::*;

use super::error::{KernelError, KernelResult};

/// Side length of one spatial hash cell in world units.
pub const DEFAULT_CELL_SIZE: f32 = 16.0;
/// Agents closer than this to the player take part in avoidance.
pub const DEFAULT_LOD_DISTANCE: f32 = 60.0;
/// Seconds of simulated time between LOD gate evaluations.
pub const DEFAULT_LOD_INTERVAL: f32 = 0.5;
/// Magnitude cap applied to the tangent avoidance force.
pub const DEFAULT_MAX_STEERING_FORCE: f32 = 100.0;
/// Upper bound on entries in one grid build.
pub const DEFAULT_MAX_GRID_ENTRIES: usize = 1 << 20;

#[derive(Resource, Debug, Clone, Copy, PartialEq)]
pub struct KernelConfig {
    /// Must be at least twice the largest avoidance radius, so every
    /// overlapping pair shares a 3×3×3 cell block. Spawns enforce it.
    pub cell_size: f32,
    /// Compared squared against the agent-to-player distance.
    pub lod_distance: f32,
    pub lod_interval: f32,
    pub max_steering_force: f32,
    pub max_grid_entries: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            cell_size: DEFAULT_CELL_SIZE,
            lod_distance: DEFAULT_LOD_DISTANCE,
            lod_interval: DEFAULT_LOD_INTERVAL,
            max_steering_force: DEFAULT_MAX_STEERING_FORCE,
            max_grid_entries: DEFAULT_MAX_GRID_ENTRIES,
        }
    }
}

impl KernelConfig {
    pub fn with_cell_size(mut self, cell_size: f32) -> Self {
        self.cell_size = cell_size;
        self
    }

    pub fn with_lod_distance(mut self, distance: f32) -> Self {
        self.lod_distance = distance;
        self
    }

    pub fn with_lod_interval(mut self, interval: f32) -> Self {
        self.lod_interval = interval;
        self
    }

    pub fn with_max_steering_force(mut self, force: f32) -> Self {
        self.max_steering_force = force;
        self
    }

    pub fn with_max_grid_entries(mut self, entries: usize) -> Self {
        self.max_grid_entries = entries;
        self
    }

    /// Largest avoidance radius the grid can resolve.
    pub fn max_avoidance_radius(&self) -> f32 {
        self.cell_size * 0.5
    }

    pub fn lod_distance_sq(&self) -> f32 {
        self.lod_distance * self.lod_distance
    }

    pub fn validate(&self) -> KernelResult<()> {
        positive("cell_size", self.cell_size)?;
        positive("lod_distance", self.lod_distance)?;
        positive("lod_interval", self.lod_interval)?;
        positive("max_steering_force", self.max_steering_force)?;
        if self.max_grid_entries == 0 {
            return Err(KernelError::InvalidConfig {
                field: "max_grid_entries",
                value: 0.0,
            });
        }
        Ok(())
    }
}

fn positive(field: &'static str, value: f32) -> KernelResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(KernelError::InvalidConfig { field, value })
    }
}
