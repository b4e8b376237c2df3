//! Spatial simulation kernel for agents living on the surface of a spherical
//! planet: surface geometry, a spatial-hash broad phase, overlap avoidance, a
//! distance-based LOD gate, movement resolvers and arc-length targeting, all
//! scheduled as `bevy_ecs` passes.

pub mod engine;

pub use engine::*;
