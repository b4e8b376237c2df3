// Engine module - planet-surface simulation kernel
// Pure geometry/spatial/avoidance/movement/targeting code plus the ECS passes
// that drive it once per tick.

pub mod avoidance;
pub mod components;
pub mod config;
pub mod error;
pub mod export;
pub mod geometry;
pub mod lod;
pub mod movement;
pub mod schedule;
pub mod simulation;
pub mod spatial;
pub mod systems;
pub mod targeting;

// Re-export commonly used items
pub use components::*;
pub use config::KernelConfig;
pub use error::{KernelError, KernelResult};
pub use export::TransformInstance;
pub use geometry::Planet;
pub use lod::LodState;
pub use schedule::TickPass;
pub use simulation::{AgentSpec, Simulation, TickReport};
pub use spatial::{GridEntry, OverlapQuery, SpatialHashGrid};
pub use targeting::{Ability, CastIntent, Caster, SurfaceRange, Targetable, TargetingMode};
