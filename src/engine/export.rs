// Packed per-agent output for downstream consumers (renderers, collision).
// Byte layout is stable so a slice can be uploaded with one copy:
//   position: vec3<f32>, pad, rotation: vec4<f32>, steering: vec3<f32>, pad

use bevy_ecs::prelude::*;

use super::components::{Steering, SurfaceTransform};

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TransformInstance {
    pub position: [f32; 3],
    _padding: f32, // Align to 16 bytes
    pub rotation: [f32; 4],
    pub steering: [f32; 3],
    _padding2: f32,
}

impl TransformInstance {
    pub fn new(transform: &SurfaceTransform, steering: Option<&Steering>) -> Self {
        Self {
            position: transform.position.to_array(),
            _padding: 0.0,
            rotation: transform.rotation.to_array(),
            steering: steering.map(|s| s.0).unwrap_or_default().to_array(),
            _padding2: 0.0,
        }
    }
}

/// Replace the contents of `out` with one instance per surface entity.
pub fn collect_instances(world: &mut World, out: &mut Vec<TransformInstance>) {
    out.clear();
    let mut query = world.query::<(&SurfaceTransform, Option<&Steering>)>();
    for (transform, steering) in query.iter(world) {
        out.push(TransformInstance::new(transform, steering));
    }
}
