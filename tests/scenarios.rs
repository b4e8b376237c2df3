// End-to-end scenarios through the full tick pipeline.

use bevy_ecs::entity::Entity;
use glam::Vec3;
use planet_swarm::engine::geometry::{project_onto_tangent, reject_normal};
use planet_swarm::{
    Ability, AgentSpec, Avoidance, Caster, KernelConfig, KernelError, LodState, MovementMode, Planet,
    Simulation, SurfaceTransform, TargetingMode,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const R: f32 = 50.0;
const DT: f32 = 1.0 / 60.0;

fn planet() -> Planet {
    Planet::new(Vec3::ZERO, R).unwrap()
}

fn sim_with(config: KernelConfig) -> Simulation {
    Simulation::new(planet(), config).unwrap()
}

fn sim() -> Simulation {
    sim_with(KernelConfig::default())
}

/// Surface point at angle `theta` from +X in the XY plane.
fn on_equator(theta: f32) -> Vec3 {
    Vec3::new(R * theta.cos(), R * theta.sin(), 0.0)
}

/// Angle whose chord from +X has the given length.
fn theta_for_chord(chord: f32) -> f32 {
    2.0 * (chord / (2.0 * R)).asin()
}

fn assert_on_surface(sim: &Simulation, t: &SurfaceTransform) {
    let planet = sim.planet();
    assert!(t.position.is_finite());
    assert!(
        planet.altitude(t.position).abs() < 1e-4 * planet.radius(),
        "altitude {}",
        planet.altitude(t.position)
    );
    let up = t.rotation * Vec3::Y;
    assert!(up.distance(planet.normal_at(t.position)) < 1e-3);
}

#[test]
fn crowd_stays_on_surface() {
    let mut sim = sim();
    let mut rng = StdRng::seed_from_u64(99);
    let planet = sim.planet();
    let player = sim
        .spawn_agent(
            AgentSpec::at(Vec3::Y)
                .with_movement(MovementMode::Linear { direction: Vec3::X, speed: 5.0 })
                .with_avoidance(1.0, 1.0),
        )
        .unwrap();
    sim.set_player(player);

    let mut agents = vec![player];
    for _ in 0..300 {
        let p = Vec3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(0.1..1.0),
        );
        let e = sim
            .spawn_agent(
                AgentSpec::at(planet.snap(p))
                    .with_movement(MovementMode::FollowTarget {
                        target: player,
                        speed: 4.0,
                        stop_distance: 1.0,
                    })
                    .with_avoidance(1.0, 1.0),
            )
            .unwrap();
        agents.push(e);
    }
    for _ in 0..5 {
        sim.spawn_obstacle(planet.snap(Vec3::new(rng.gen_range(-1.0..1.0), 1.0, 0.2)), 3.0, 2.0)
            .unwrap();
    }

    for _ in 0..240 {
        sim.tick(DT).unwrap();
        for e in &agents {
            let t = sim.transform(*e).unwrap();
            assert_on_surface(&sim, &t);
        }
    }
}

#[test]
fn overlapping_pair_steers_apart() {
    let mut sim = sim();
    let a = sim
        .spawn_agent(AgentSpec::at(on_equator(0.0)).with_avoidance(2.0, 1.0))
        .unwrap();
    let b = sim
        .spawn_agent(AgentSpec::at(on_equator(0.01)).with_avoidance(2.0, 1.0))
        .unwrap();
    sim.set_player(a);
    let report = sim.tick(DT).unwrap();
    assert_eq!(report.active_agents, 2);

    let pa = sim.transform(a).unwrap().position;
    let pb = sim.transform(b).unwrap().position;
    let sa = sim.steering(a).unwrap();
    let sb = sim.steering(b).unwrap();

    let overlap = 4.0 - pa.distance(pb);
    assert!(overlap > 3.0);
    assert!(sa.dot(sim.planet().normal_at(pa)).abs() < 1e-4);
    assert!(sa.dot(pb - pa) < 0.0);
    assert!((sa.length() - overlap * 5.0).abs() < 0.05 * overlap * 5.0);
    assert!((sa.length() - sb.length()).abs() < 1e-3);
}

#[test]
fn steering_feeds_same_tick_movement() {
    fn pair(avoid: bool) -> (Simulation, Entity, Entity) {
        let mut sim = sim();
        let mut spawn = |theta: f32| {
            let mut spec = AgentSpec::at(on_equator(theta))
                .with_movement(MovementMode::Linear { direction: Vec3::Z, speed: 3.0 });
            if avoid {
                spec = spec.with_avoidance(2.0, 1.0);
            }
            sim.spawn_agent(spec).unwrap()
        };
        let a = spawn(0.0);
        let b = spawn(0.01);
        sim.set_player(a);
        (sim, a, b)
    }

    let (mut steered, a, b) = pair(true);
    let (mut plain, pa, pb) = pair(false);
    let starts = [steered.transform(a).unwrap(), steered.transform(b).unwrap()];
    steered.tick(DT).unwrap();
    plain.tick(DT).unwrap();

    let planet = steered.planet();
    for ((entity, plain_entity), start) in [(a, pa), (b, pb)].into_iter().zip(starts) {
        let steering = steered.steering(entity).unwrap();
        assert!(steering.length() > 10.0);

        let normal = planet.normal_at(start.position);
        let heading = project_onto_tangent(Vec3::Z, normal);
        let expected = planet.snap(
            start.position + heading * 3.0 * DT + reject_normal(steering, normal) * DT,
        );
        let moved = steered.transform(entity).unwrap().position;
        assert!(moved.distance(expected) < 1e-4, "{moved} vs {expected}");

        let unsteered = plain.transform(plain_entity).unwrap().position;
        assert!((moved.distance(unsteered) - steering.length() * DT).abs() < 0.01);
    }
    // Pushed apart, not together.
    let gap_before = starts[0].position.distance(starts[1].position);
    let gap_after = steered
        .transform(a)
        .unwrap()
        .position
        .distance(steered.transform(b).unwrap().position);
    assert!(gap_after > gap_before);
}

#[test]
fn lod_gate_toggles_on_interval() {
    let mut sim = sim_with(KernelConfig::default().with_lod_distance(60.0).with_lod_interval(0.5));
    let player = sim.spawn_agent(AgentSpec::at(on_equator(0.0))).unwrap();
    let inside = sim
        .spawn_agent(AgentSpec::at(on_equator(theta_for_chord(59.9))).with_avoidance(1.0, 1.0))
        .unwrap();
    let outside = sim
        .spawn_agent(AgentSpec::at(on_equator(theta_for_chord(60.1))).with_avoidance(1.0, 1.0))
        .unwrap();
    sim.set_player(player);

    let report = sim.tick(DT).unwrap();
    assert!(report.lod_evaluated);
    assert_eq!(sim.lod_state(inside), Some(LodState::Active));
    assert_eq!(sim.lod_state(outside), Some(LodState::Inactive));
    assert_eq!(report.active_agents, 1);

    // Move the outside agent in; it stays inactive until the gate runs again.
    let moved = SurfaceTransform::on_surface(&sim.planet(), on_equator(theta_for_chord(30.0)), Vec3::Z);
    *sim.world_mut().get_mut::<SurfaceTransform>(outside).unwrap() = moved;
    let report = sim.tick(DT).unwrap();
    assert!(!report.lod_evaluated);
    assert_eq!(sim.lod_state(outside), Some(LodState::Inactive));
    assert_eq!(sim.steering(outside), Some(Vec3::ZERO));

    let mut evaluated = false;
    for _ in 0..40 {
        evaluated |= sim.tick(DT).unwrap().lod_evaluated;
        if evaluated {
            break;
        }
    }
    assert!(evaluated);
    assert_eq!(sim.lod_state(outside), Some(LodState::Active));
}

#[test]
fn orbit_around_moving_player_stays_on_surface() {
    let mut sim = sim();
    let player = sim
        .spawn_agent(
            AgentSpec::at(on_equator(0.3))
                .with_movement(MovementMode::Linear { direction: Vec3::Y, speed: 3.0 }),
        )
        .unwrap();
    let orbiter = sim
        .spawn_agent(AgentSpec::at(on_equator(0.4)).with_movement(MovementMode::Orbit {
            center: player,
            radius: 5.0,
            angular_speed: 4.0,
            offset: Vec3::Y,
        }))
        .unwrap();

    for _ in 0..1_000 {
        sim.tick(DT).unwrap();
        let t = sim.transform(orbiter).unwrap();
        assert_on_surface(&sim, &t);
        let MovementMode::Orbit { offset, .. } = sim.movement(orbiter).unwrap() else {
            panic!("orbit mode lost");
        };
        assert!((offset.length() - 5.0).abs() < 1e-3);
        // One tick of lag behind the player, so the chord stays near the orbit radius.
        let p = sim.transform(player).unwrap().position;
        assert!(t.position.distance(p) < 5.5);
    }
}

#[test]
fn follow_target_destroyed_leaves_transform_unchanged() {
    let mut sim = sim();
    let target = sim.spawn_agent(AgentSpec::at(on_equator(0.5))).unwrap();
    let chaser = sim
        .spawn_agent(AgentSpec::at(on_equator(0.0)).with_movement(MovementMode::FollowTarget {
            target,
            speed: 5.0,
            stop_distance: 0.0,
        }))
        .unwrap();

    sim.tick(DT).unwrap();
    let after_move = sim.transform(chaser).unwrap();
    assert!(after_move.position.distance(on_equator(0.0)) > 0.0);

    assert!(sim.despawn(target));
    let report = sim.tick(DT).unwrap();
    assert_eq!(report.moved, 0);
    let t = sim.transform(chaser).unwrap();
    assert_eq!(t, after_move);
    assert!(t.position.is_finite() && t.rotation.is_finite());
}

#[test]
fn locked_caster_emits_only_in_range() {
    let mut sim = sim();
    let planet = sim.planet();
    let target = sim.spawn_agent(AgentSpec::at(on_equator(0.1))).unwrap();
    let far_target = sim.spawn_agent(AgentSpec::at(on_equator(1.5))).unwrap();

    // 0.1 rad * 50 = 5 units of arc.
    let caster_near = sim
        .spawn_agent(AgentSpec::at(on_equator(0.0)).with_caster(Caster::new(
            0,
            TargetingMode::Locked(target),
            vec![Ability::new(6.0, 1.0, &planet).unwrap()],
        )))
        .unwrap();
    let caster_far = sim
        .spawn_agent(AgentSpec::at(on_equator(0.0)).with_caster(Caster::new(
            0,
            TargetingMode::Locked(far_target),
            vec![Ability::new(6.0, 1.0, &planet).unwrap()],
        )))
        .unwrap();

    assert!(sim.activate(caster_near, 0));
    assert!(sim.activate(caster_far, 0));
    assert!(!sim.activate(caster_near, 3));
    let report = sim.tick(DT).unwrap();
    assert_eq!(report.casts, 1);
    let intents = sim.drain_cast_intents();
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].caster, caster_near);
    assert_eq!(intents[0].target, target);
    assert_eq!(intents[0].ability_index, 0);
    assert!(sim.drain_cast_intents().is_empty());

    // On cooldown.
    sim.activate(caster_near, 0);
    sim.tick(DT).unwrap();
    assert!(sim.drain_cast_intents().is_empty());

    // Dead target resolves to nothing.
    sim.despawn(target);
    for _ in 0..70 {
        sim.tick(DT).unwrap();
    }
    sim.activate(caster_near, 0);
    sim.tick(DT).unwrap();
    assert!(sim.drain_cast_intents().is_empty());
}

#[test]
fn nearest_caster_picks_closest_enemy() {
    let mut sim = sim();
    let planet = sim.planet();
    let caster = sim
        .spawn_agent(
            AgentSpec::at(on_equator(0.0))
                .with_caster(Caster::new(
                    0,
                    TargetingMode::Nearest,
                    vec![Ability::new(20.0, 0.0, &planet).unwrap()],
                ))
                .targetable(0, 1.0),
        )
        .unwrap();
    let _ally = sim.spawn_agent(AgentSpec::at(on_equator(0.02)).targetable(0, 1.0)).unwrap();
    let near = sim.spawn_agent(AgentSpec::at(on_equator(0.1)).targetable(1, 1.0)).unwrap();
    let _far = sim.spawn_agent(AgentSpec::at(on_equator(0.3)).targetable(1, 1.0)).unwrap();

    sim.activate(caster, 0);
    sim.tick(DT).unwrap();
    let intents = sim.drain_cast_intents();
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].target, near);
}

#[test]
fn grid_overflow_aborts_without_moving() {
    let mut sim = sim_with(KernelConfig::default().with_max_grid_entries(2));
    let player = sim
        .spawn_agent(
            AgentSpec::at(on_equator(0.0))
                .with_movement(MovementMode::Linear { direction: Vec3::Y, speed: 5.0 })
                .with_avoidance(1.0, 1.0),
        )
        .unwrap();
    sim.set_player(player);
    for i in 1..=2 {
        sim.spawn_agent(AgentSpec::at(on_equator(0.05 * i as f32)).with_avoidance(1.0, 1.0))
            .unwrap();
    }
    let before = sim.transform(player).unwrap();
    let err = sim.tick(DT).unwrap_err();
    assert_eq!(err, KernelError::GridCapacity { requested: 3, limit: 2 });
    assert_eq!(sim.transform(player).unwrap(), before);

    // Dropping an agent lets the next tick through.
    let victims: Vec<Entity> = {
        let world = sim.world_mut();
        let mut q = world.query::<(Entity, &Avoidance)>();
        q.iter(world).map(|(e, _)| e).filter(|e| *e != player).collect()
    };
    sim.despawn(victims[0]);
    let report = sim.tick(DT).unwrap();
    assert_eq!(report.moved, 1);
}

#[test]
fn identical_runs_are_bit_identical() {
    fn run() -> Vec<[u32; 7]> {
        let mut sim = sim();
        let mut rng = StdRng::seed_from_u64(5);
        let planet = sim.planet();
        let player = sim
            .spawn_agent(
                AgentSpec::at(Vec3::Y)
                    .with_movement(MovementMode::Linear { direction: Vec3::Z, speed: 4.0 })
                    .with_avoidance(1.0, 1.0),
            )
            .unwrap();
        sim.set_player(player);
        let mut agents = vec![player];
        for _ in 0..150 {
            let p = planet.snap(Vec3::new(
                rng.gen_range(-0.3..0.3),
                1.0,
                rng.gen_range(-0.3..0.3),
            ));
            agents.push(
                sim.spawn_agent(
                    AgentSpec::at(p)
                        .with_movement(MovementMode::FollowTarget {
                            target: player,
                            speed: 3.0,
                            stop_distance: 0.5,
                        })
                        .with_avoidance(1.5, 1.0),
                )
                .unwrap(),
            );
        }
        for _ in 0..120 {
            sim.tick(DT).unwrap();
        }
        agents
            .iter()
            .map(|e| {
                let t = sim.transform(*e).unwrap();
                let p = t.position.to_array();
                let q = t.rotation.to_array();
                [p[0], p[1], p[2], q[0], q[1], q[2], q[3]].map(f32::to_bits)
            })
            .collect()
    }
    assert_eq!(run(), run());
}

#[test]
fn instances_export_every_surface_entity() {
    let mut sim = sim();
    sim.spawn_agent(AgentSpec::at(on_equator(0.0)).with_avoidance(1.0, 1.0)).unwrap();
    sim.spawn_agent(AgentSpec::at(on_equator(1.0))).unwrap();
    sim.spawn_obstacle(on_equator(2.0), 2.0, 1.0).unwrap();
    sim.tick(DT).unwrap();
    let mut out = Vec::new();
    sim.write_instances(&mut out);
    assert_eq!(out.len(), 3);
    let bytes: &[u8] = bytemuck::cast_slice(&out);
    assert_eq!(bytes.len(), 3 * 48);
}
