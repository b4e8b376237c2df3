// Error taxonomy for the simulation kernel.
//
// Degenerate geometry (zero tangents, coincident agents, dangling entity
// references) is never an error: it is resolved locally by the component that
// meets it. Only setup-time configuration problems and grid allocation
// failures surface here.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum KernelError {
    #[error("planet radius must be finite and > 0, got {0}")]
    InvalidPlanetRadius(f32),

    #[error("planet center must be finite")]
    InvalidPlanetCenter,

    #[error("config field `{field}` must be finite and > 0, got {value}")]
    InvalidConfig { field: &'static str, value: f32 },

    #[error("invalid movement parameters: {0}")]
    InvalidMovement(&'static str),

    #[error("invalid avoidance parameters: {0}")]
    InvalidAvoidance(&'static str),

    /// Overlapping pairs would fall outside each other's 3×3×3 cell block.
    #[error("avoidance radius {radius} exceeds half the grid cell size {cell_size}")]
    RadiusExceedsCell { radius: f32, cell_size: f32 },

    #[error("spawn position coincides with the planet center")]
    SpawnAtCenter,

    /// Grid would exceed the configured entry cap.
    #[error("spatial grid capacity exceeded: {requested} entries, limit {limit}")]
    GridCapacity { requested: usize, limit: usize },

    /// The allocator refused to grow the grid.
    #[error("spatial grid allocation failed for {requested} entries")]
    GridAllocation { requested: usize },
}

pub type KernelResult<T> = Result<T, KernelError>;
