// Surface targeting: range checks and cast-intent emission.
//
// A cast range is an arc length on the planet. Comparing arc lengths directly
// needs an acos per candidate, so each ability caches the equivalent chord
// length once and the per-candidate test is a squared euclidean distance.
//
//   chord = 2 R sin(arc / 2R)     (monotonic for arc in [0, πR])
//
// Ranges of πR or more cover the whole sphere and skip the test entirely.

use bevy_ecs::prelude::*;
use glam::Vec3;

use super::components::{PositionIndex, TargetIndex};
use super::error::{KernelError, KernelResult};
use super::geometry::Planet;
use super::spatial::{GridEntry, OverlapQuery};

// ============================================================================
// RANGE
// ============================================================================

/// Straight-line length of the chord subtending `arc` on a sphere of `radius`.
#[inline]
pub fn chord_threshold(arc: f32, radius: f32) -> f32 {
    2.0 * radius * (arc / (2.0 * radius)).sin()
}

/// An arc-length range with its chord threshold cached for one planet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceRange {
    arc: f32,
    /// `None` when the range covers the whole sphere.
    chord_sq: Option<f32>,
}

impl SurfaceRange {
    pub fn new(arc: f32, planet: &Planet) -> Self {
        let arc = arc.max(0.0);
        let chord_sq = if arc >= planet.half_circumference() {
            None
        } else {
            let chord = chord_threshold(arc, planet.radius());
            Some(chord * chord)
        };
        Self { arc, chord_sq }
    }

    pub fn arc(&self) -> f32 {
        self.arc
    }

    pub fn is_unbounded(&self) -> bool {
        self.chord_sq.is_none()
    }

    /// Same decision as `surface_distance(a, b) <= arc` for points on the
    /// planet, without the acos.
    #[inline]
    pub fn contains(&self, a: Vec3, b: Vec3) -> bool {
        match self.chord_sq {
            None => true,
            Some(threshold) => a.distance_squared(b) <= threshold,
        }
    }
}

/// One-off range test. Hot paths should keep a `SurfaceRange` instead.
pub fn is_in_range(caster: Vec3, target: Vec3, cast_range: f32, planet: &Planet) -> bool {
    SurfaceRange::new(cast_range, planet).contains(caster, target)
}

// ============================================================================
// CASTER DATA
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ability {
    pub range: SurfaceRange,
    pub cooldown: f32,
    /// Seconds until the ability is ready again.
    pub remaining: f32,
}

impl Ability {
    pub fn new(cast_range: f32, cooldown: f32, planet: &Planet) -> KernelResult<Self> {
        if !cast_range.is_finite() || cast_range < 0.0 {
            return Err(KernelError::InvalidConfig {
                field: "cast_range",
                value: cast_range,
            });
        }
        if !cooldown.is_finite() || cooldown < 0.0 {
            return Err(KernelError::InvalidConfig {
                field: "cooldown",
                value: cooldown,
            });
        }
        Ok(Self {
            range: SurfaceRange::new(cast_range, planet),
            cooldown,
            remaining: 0.0,
        })
    }

    pub fn is_ready(&self) -> bool {
        self.remaining <= 0.0
    }
}

/// How a caster picks its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetingMode {
    #[default]
    None,
    Locked(Entity),
    /// Closest `Targetable` on another team.
    Nearest,
}

#[derive(Component, Debug, Clone, Default)]
pub struct Caster {
    pub team: u32,
    pub targeting: TargetingMode,
    pub abilities: Vec<Ability>,
    pending: Vec<usize>,
}

impl Caster {
    pub fn new(team: u32, targeting: TargetingMode, abilities: Vec<Ability>) -> Self {
        Self {
            team,
            targeting,
            abilities,
            pending: Vec::new(),
        }
    }

    /// Queue an activation. Returns `false` for an unknown ability index.
    pub fn activate(&mut self, ability_index: usize) -> bool {
        if ability_index >= self.abilities.len() {
            return false;
        }
        self.pending.push(ability_index);
        true
    }

    pub fn pending(&self) -> &[usize] {
        &self.pending
    }
}

/// Marks an entity as a valid target for `TargetingMode::Nearest`.
#[derive(Component, Debug, Clone, Copy)]
pub struct Targetable {
    pub team: u32,
    pub radius: f32,
}

/// Emitted for a downstream combat resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CastIntent {
    pub caster: Entity,
    pub target: Entity,
    pub ability_index: usize,
}

/// Transient pairing of a caster, its target and one ability's range.
#[derive(Debug, Clone, Copy)]
pub struct TargetingQuery {
    pub caster: Entity,
    pub target: Entity,
    pub range: SurfaceRange,
}

// ============================================================================
// RESOLVE
// ============================================================================

/// Closest targetable entity on another team within `reach` (euclidean).
///
/// Arc ranges are never shorter than their chord, so an arc used as the
/// euclidean reach is a safe superset.
pub fn nearest_target(
    index: &TargetIndex,
    caster: Entity,
    team: u32,
    position: Vec3,
    reach: f32,
    scratch: &mut Vec<GridEntry>,
) -> Option<(Entity, Vec3)> {
    scratch.clear();
    index.grid.overlap_sphere(position, reach, scratch);
    scratch
        .iter()
        .filter(|e| e.entity != caster)
        .filter(|e| index.teams.get(&e.entity).is_some_and(|t| *t != team))
        .min_by(|a, b| {
            a.position
                .distance_squared(position)
                .total_cmp(&b.position.distance_squared(position))
                .then(a.entity.cmp(&b.entity))
        })
        .map(|e| (e.entity, e.position))
}

/// Resolve the caster's target from the start-of-tick snapshot.
pub fn resolve_target(
    caster_entity: Entity,
    caster_position: Vec3,
    caster: &Caster,
    positions: &PositionIndex,
    targets: &TargetIndex,
    planet: &Planet,
    scratch: &mut Vec<GridEntry>,
) -> Option<(Entity, Vec3)> {
    match caster.targeting {
        TargetingMode::None => None,
        TargetingMode::Locked(target) => positions.get(target).map(|p| (target, p)),
        TargetingMode::Nearest => {
            let longest = caster
                .abilities
                .iter()
                .map(|a| a.range.arc())
                .fold(0.0f32, f32::max);
            let reach = longest.min(2.0 * planet.radius());
            nearest_target(targets, caster_entity, caster.team, caster_position, reach, scratch)
        }
    }
}

/// Count down cooldowns and drain pending activations.
///
/// Every ready, in-range activation emits one intent and restarts its
/// cooldown; everything else in the queue is dropped.
pub fn drain_pending(
    caster_entity: Entity,
    caster_position: Vec3,
    caster: &mut Caster,
    target: Option<(Entity, Vec3)>,
    dt: f32,
    out: &mut Vec<CastIntent>,
) -> usize {
    for ability in &mut caster.abilities {
        ability.remaining = (ability.remaining - dt).max(0.0);
    }
    let mut emitted = 0;
    let pending = std::mem::take(&mut caster.pending);
    let Some((target, target_position)) = target else {
        return 0;
    };
    for index in pending {
        let Some(ability) = caster.abilities.get_mut(index) else {
            continue;
        };
        let query = TargetingQuery {
            caster: caster_entity,
            target,
            range: ability.range,
        };
        if !ability.is_ready() || !query.range.contains(caster_position, target_position) {
            continue;
        }
        ability.remaining = ability.cooldown;
        out.push(CastIntent {
            caster: query.caster,
            target: query.target,
            ability_index: index,
        });
        emitted += 1;
    }
    emitted
}
