// Level-of-detail gate for avoidance.
//
// Avoidance cost grows with active agents × local density. The gate keeps the
// active set bounded by enabling avoidance only for agents near the player.
// It runs on a fixed interval of simulated time, not every tick.

use bevy_ecs::prelude::*;
use glam::Vec3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LodState {
    #[default]
    Inactive,
    Active,
}

impl LodState {
    pub fn is_active(self) -> bool {
        self == LodState::Active
    }
}

/// `Active` iff the squared distance is strictly below the threshold.
#[inline]
pub fn classify(distance_sq: f32, threshold_sq: f32) -> LodState {
    if distance_sq < threshold_sq {
        LodState::Active
    } else {
        LodState::Inactive
    }
}

/// Classify an agent against the player reference position.
#[inline]
pub fn classify_position(agent: Vec3, player: Vec3, threshold_sq: f32) -> LodState {
    classify(agent.distance_squared(player), threshold_sq)
}

/// Interval timer for the gate.
///
/// Starts due so the very first tick evaluates every agent.
#[derive(Resource, Debug, Clone)]
pub struct LodGate {
    interval: f32,
    elapsed: f32,
    evaluations: u64,
}

impl LodGate {
    pub fn new(interval: f32) -> Self {
        Self {
            interval,
            elapsed: interval,
            evaluations: 0,
        }
    }

    /// Advance by `dt`. Returns `true` when the gate should evaluate this tick.
    pub fn advance(&mut self, dt: f32) -> bool {
        self.elapsed += dt;
        if self.elapsed < self.interval {
            return false;
        }
        self.elapsed -= self.interval;
        if self.elapsed >= self.interval {
            // A long stall; do not try to catch up.
            self.elapsed = 0.0;
        }
        self.evaluations += 1;
        true
    }

    /// Force an evaluation on the next tick.
    pub fn make_due(&mut self) {
        self.elapsed = self.interval;
    }

    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }
}
