// Simulation facade: owns the ECS world and the tick schedule.
//
// Setup (planet, config, spawns) is validated once here; ticks never see
// invalid parameters.

use bevy_ecs::prelude::*;
use glam::Vec3;
use log::{debug, info, warn};

use super::components::*;
use super::config::KernelConfig;
use super::error::{KernelError, KernelResult};
use super::export::{TransformInstance, collect_instances};
use super::geometry::Planet;
use super::lod::{LodGate, LodState};
use super::schedule::build_schedule;
use super::spatial::SpatialHashGrid;
use super::targeting::{CastIntent, Caster, Targetable};

/// Everything needed to spawn one agent.
#[derive(Debug, Clone)]
pub struct AgentSpec {
    pub position: Vec3,
    pub forward: Vec3,
    pub movement: MovementMode,
    /// `(radius, weight)`; `None` opts out of avoidance.
    pub avoidance: Option<(f32, f32)>,
    pub caster: Option<Caster>,
    pub targetable: Option<Targetable>,
}

impl AgentSpec {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            forward: Vec3::Z,
            movement: MovementMode::None,
            avoidance: None,
            caster: None,
            targetable: None,
        }
    }

    pub fn facing(mut self, forward: Vec3) -> Self {
        self.forward = forward;
        self
    }

    pub fn with_movement(mut self, movement: MovementMode) -> Self {
        self.movement = movement;
        self
    }

    pub fn with_avoidance(mut self, radius: f32, weight: f32) -> Self {
        self.avoidance = Some((radius, weight));
        self
    }

    pub fn with_caster(mut self, caster: Caster) -> Self {
        self.caster = Some(caster);
        self
    }

    pub fn targetable(mut self, team: u32, radius: f32) -> Self {
        self.targetable = Some(Targetable { team, radius });
        self
    }
}

/// Summary of one completed tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub lod_evaluated: bool,
    pub lod_transitions: usize,
    pub active_agents: usize,
    pub grid_entries: usize,
    pub moved: usize,
    pub casts: usize,
}

pub struct Simulation {
    world: World,
    schedule: Schedule,
}

impl Simulation {
    pub fn new(planet: Planet, config: KernelConfig) -> KernelResult<Self> {
        config.validate()?;

        let mut world = World::new();
        world.insert_resource(planet);
        world.insert_resource(config);
        world.insert_resource(LodGate::new(config.lod_interval));
        world.insert_resource(SpatialHashGrid::new(config.cell_size));
        world.insert_resource(TargetIndex::new(config.cell_size));
        world.init_resource::<PositionIndex>();
        world.init_resource::<CastIntents>();
        world.init_resource::<TickClock>();
        world.init_resource::<TickStatus>();
        world.init_resource::<PlayerRef>();

        info!(
            "simulation created: planet r={} at {}, cell {}, lod {} every {}s",
            planet.radius(),
            planet.center(),
            config.cell_size,
            config.lod_distance,
            config.lod_interval
        );
        Ok(Self {
            world,
            schedule: build_schedule(),
        })
    }

    pub fn planet(&self) -> Planet {
        *self.world.resource::<Planet>()
    }

    pub fn config(&self) -> KernelConfig {
        *self.world.resource::<KernelConfig>()
    }

    pub fn spawn_agent(&mut self, spec: AgentSpec) -> KernelResult<Entity> {
        let planet = self.planet();
        let result = validate_spawn(&planet, &self.config(), &spec);
        if let Err(err) = &result {
            warn!("agent spawn rejected: {err}");
        }
        let avoidance = result?;

        let transform = SurfaceTransform::on_surface(&planet, spec.position, spec.forward);
        let mut entity = self
            .world
            .spawn((transform, NextTransform::default(), spec.movement));
        if let Some(avoidance) = avoidance {
            entity.insert((avoidance, Steering::default()));
        }
        if let Some(caster) = spec.caster {
            entity.insert(caster);
        }
        if let Some(targetable) = spec.targetable {
            entity.insert(targetable);
        }
        Ok(entity.id())
    }

    /// Obstacles keep their position as given; they are never snapped or moved.
    pub fn spawn_obstacle(&mut self, position: Vec3, radius: f32, weight: f32) -> KernelResult<Entity> {
        let planet = self.planet();
        check_position(&planet, position)?;
        // Same rules as agents.
        let obstacle = Avoidance::new(radius, weight)?;
        check_radius(&self.config(), obstacle.radius)?;
        let transform = SurfaceTransform {
            position,
            rotation: super::geometry::surface_rotation(Vec3::Z, planet.normal_at(position)),
        };
        Ok(self.world.spawn((transform, Obstacle { radius, weight })).id())
    }

    /// Designate the entity whose position drives the LOD gate.
    pub fn set_player(&mut self, entity: Entity) {
        self.world.resource_mut::<PlayerRef>().0 = Some(entity);
        self.world.resource_mut::<LodGate>().make_due();
    }

    pub fn despawn(&mut self, entity: Entity) -> bool {
        self.world.despawn(entity)
    }

    /// Queue an ability activation for the next tick.
    pub fn activate(&mut self, caster: Entity, ability_index: usize) -> bool {
        self.world
            .get_mut::<Caster>(caster)
            .is_some_and(|mut c| c.activate(ability_index))
    }

    /// Run one tick. On error nothing moved and no intents were emitted.
    pub fn tick(&mut self, dt: f32) -> KernelResult<TickReport> {
        if !dt.is_finite() || dt < 0.0 {
            return Err(KernelError::InvalidConfig { field: "dt", value: dt });
        }
        let tick = {
            let mut clock = self.world.resource_mut::<TickClock>();
            clock.dt = dt;
            clock.tick += 1;
            clock.tick
        };

        self.schedule.run(&mut self.world);

        let status = self.world.resource::<TickStatus>();
        if let Some(err) = status.aborted.clone() {
            warn!("tick {tick} aborted: {err}");
            return Err(err);
        }
        let report = TickReport {
            tick,
            lod_evaluated: status.lod_evaluated,
            lod_transitions: status.lod_transitions,
            active_agents: status.active_agents,
            grid_entries: status.grid_entries,
            moved: status.moved,
            casts: status.casts,
        };
        debug!(
            "tick {}: active {}, grid {}, moved {}, casts {}",
            report.tick, report.active_agents, report.grid_entries, report.moved, report.casts
        );
        Ok(report)
    }

    pub fn drain_cast_intents(&mut self) -> Vec<CastIntent> {
        std::mem::take(&mut self.world.resource_mut::<CastIntents>().0)
    }

    pub fn transform(&self, entity: Entity) -> Option<SurfaceTransform> {
        self.world.get::<SurfaceTransform>(entity).copied()
    }

    pub fn steering(&self, entity: Entity) -> Option<Vec3> {
        self.world.get::<Steering>(entity).map(|s| s.0)
    }

    pub fn lod_state(&self, entity: Entity) -> Option<LodState> {
        self.world.get::<Avoidance>(entity).map(|a| a.lod)
    }

    pub fn movement(&self, entity: Entity) -> Option<MovementMode> {
        self.world.get::<MovementMode>(entity).copied()
    }

    /// Replace an entity's movement mode. Only one mode is ever active.
    pub fn set_movement(&mut self, entity: Entity, movement: MovementMode) -> KernelResult<bool> {
        movement.validate()?;
        Ok(match self.world.get_mut::<MovementMode>(entity) {
            Some(mut mode) => {
                *mode = movement;
                true
            }
            None => false,
        })
    }

    pub fn write_instances(&mut self, out: &mut Vec<TransformInstance>) {
        collect_instances(&mut self.world, out);
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}

fn validate_spawn(
    planet: &Planet,
    config: &KernelConfig,
    spec: &AgentSpec,
) -> KernelResult<Option<Avoidance>> {
    check_position(planet, spec.position)?;
    spec.movement.validate()?;
    let avoidance = spec
        .avoidance
        .map(|(radius, weight)| Avoidance::new(radius, weight))
        .transpose()?;
    if let Some(a) = &avoidance {
        check_radius(config, a.radius)?;
    }
    Ok(avoidance)
}

fn check_radius(config: &KernelConfig, radius: f32) -> KernelResult<()> {
    if radius > config.max_avoidance_radius() {
        return Err(KernelError::RadiusExceedsCell {
            radius,
            cell_size: config.cell_size,
        });
    }
    Ok(())
}

fn check_position(planet: &Planet, position: Vec3) -> KernelResult<()> {
    if !position.is_finite() {
        return Err(KernelError::InvalidMovement("spawn position must be finite"));
    }
    if position.distance_squared(planet.center()) < f32::EPSILON {
        return Err(KernelError::SpawnAtCenter);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim() -> Simulation {
        Simulation::new(Planet::new(Vec3::ZERO, 50.0).unwrap(), KernelConfig::default()).unwrap()
    }

    #[test]
    fn rejects_invalid_config() {
        let planet = Planet::new(Vec3::ZERO, 50.0).unwrap();
        let err = Simulation::new(planet, KernelConfig::default().with_cell_size(-1.0));
        assert!(matches!(err, Err(KernelError::InvalidConfig { field: "cell_size", .. })));
    }

    #[test]
    fn spawn_snaps_to_surface() {
        let mut sim = sim();
        let e = sim.spawn_agent(AgentSpec::at(Vec3::new(10.0, 0.0, 0.0))).unwrap();
        let t = sim.transform(e).unwrap();
        assert!((t.position - Vec3::new(50.0, 0.0, 0.0)).length() < 1e-4);
        assert!((t.rotation * Vec3::Y).distance(Vec3::X) < 1e-4);
    }

    #[test]
    fn spawn_rejects_bad_parameters() {
        let mut sim = sim();
        assert_eq!(sim.spawn_agent(AgentSpec::at(Vec3::ZERO)), Err(KernelError::SpawnAtCenter));
        let bad_orbit = MovementMode::Orbit {
            center: Entity::from_raw(0),
            radius: 0.0,
            angular_speed: 1.0,
            offset: Vec3::X,
        };
        assert!(sim.spawn_agent(AgentSpec::at(Vec3::X).with_movement(bad_orbit)).is_err());
        assert!(sim.spawn_agent(AgentSpec::at(Vec3::X).with_avoidance(-2.0, 1.0)).is_err());
        assert!(sim.spawn_obstacle(Vec3::X * 50.0, 1.0, -1.0).is_err());
    }

    #[test]
    fn avoidance_radius_must_fit_cell() {
        let mut sim = sim();
        let cell = sim.config().cell_size;
        assert!(sim.spawn_agent(AgentSpec::at(Vec3::X).with_avoidance(cell * 0.5, 1.0)).is_ok());
        assert_eq!(
            sim.spawn_agent(AgentSpec::at(Vec3::X).with_avoidance(cell * 0.5 + 0.1, 1.0)),
            Err(KernelError::RadiusExceedsCell { radius: cell * 0.5 + 0.1, cell_size: cell })
        );
        assert!(matches!(
            sim.spawn_obstacle(Vec3::X * 50.0, cell, 1.0),
            Err(KernelError::RadiusExceedsCell { .. })
        ));
        assert!(sim.spawn_obstacle(Vec3::X * 50.0, 3.0, 1.0).is_ok());
    }

    #[test]
    fn tick_rejects_bad_dt() {
        let mut sim = sim();
        assert!(sim.tick(f32::NAN).is_err());
        assert!(sim.tick(-0.1).is_err());
        assert_eq!(sim.tick(0.0).map(|r| r.tick), Ok(1));
    }

    #[test]
    fn set_movement_swaps_mode() {
        let mut sim = sim();
        let e = sim.spawn_agent(AgentSpec::at(Vec3::X)).unwrap();
        let linear = MovementMode::Linear { direction: Vec3::Y, speed: 3.0 };
        assert_eq!(sim.set_movement(e, linear), Ok(true));
        assert_eq!(sim.movement(e), Some(linear));
        let bad = MovementMode::Linear { direction: Vec3::Y, speed: -3.0 };
        assert!(sim.set_movement(e, bad).is_err());
    }
}
