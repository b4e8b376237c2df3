// Headless demo: a player walking around a small planet while a wave of
// followers chases it, a few orbiters circle it and rocks get in the way.
// Run with RUST_LOG=debug to see the per-tick pass summary.

use glam::Vec3;
use planet_swarm::{
    Ability, AgentSpec, Caster, KernelConfig, KernelResult, MovementMode, Planet, Simulation,
    TargetingMode,
};
use rand::Rng;

// ============================================================================
// CONSTANTS
// ============================================================================

const PLANET_RADIUS: f32 = 120.0;
const FOLLOWER_COUNT: usize = 1500;
const ORBITER_COUNT: usize = 8;
const OBSTACLE_COUNT: usize = 60;
const TICK_RATE: f32 = 60.0;
const RUN_SECONDS: u32 = 20;

const PLAYER_TEAM: u32 = 0;
const ENEMY_TEAM: u32 = 1;

// ============================================================================
// SPAWNING
// ============================================================================

fn random_surface_point(rng: &mut impl Rng, planet: &Planet) -> Vec3 {
    loop {
        let v = Vec3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        );
        if v.length_squared() > 0.01 && v.length_squared() <= 1.0 {
            return planet.snap(planet.center() + v);
        }
    }
}

fn spawn_wave(sim: &mut Simulation) -> KernelResult<()> {
    let mut rng = rand::thread_rng();
    let planet = sim.planet();

    let bolt = Ability::new(40.0, 0.75, &planet)?;
    let nova = Ability::new(12.0, 3.0, &planet)?;
    let player = sim.spawn_agent(
        AgentSpec::at(planet.center() + Vec3::Y)
            .with_movement(MovementMode::Linear {
                direction: Vec3::X,
                speed: 6.0,
            })
            .with_avoidance(1.0, 1.0)
            .with_caster(Caster::new(PLAYER_TEAM, TargetingMode::Nearest, vec![bolt, nova]))
            .targetable(PLAYER_TEAM, 1.0),
    )?;
    sim.set_player(player);

    for _ in 0..FOLLOWER_COUNT {
        let position = random_surface_point(&mut rng, &planet);
        sim.spawn_agent(
            AgentSpec::at(position)
                .with_movement(MovementMode::FollowTarget {
                    target: player,
                    speed: rng.gen_range(3.0..5.5),
                    stop_distance: 1.5,
                })
                .with_avoidance(rng.gen_range(0.6..1.2), 1.0)
                .targetable(ENEMY_TEAM, 0.8),
        )?;
    }

    for i in 0..ORBITER_COUNT {
        let angle = i as f32 / ORBITER_COUNT as f32 * std::f32::consts::TAU;
        sim.spawn_agent(
            AgentSpec::at(planet.center() + Vec3::Y).with_movement(MovementMode::Orbit {
                center: player,
                radius: 5.0,
                angular_speed: 4.0,
                offset: Vec3::new(angle.cos(), 0.0, angle.sin()),
            }),
        )?;
    }

    for _ in 0..OBSTACLE_COUNT {
        let position = random_surface_point(&mut rng, &planet);
        sim.spawn_obstacle(position, rng.gen_range(1.5..4.0), 2.0)?;
    }

    println!(
        "Spawned player, {} followers, {} orbiters, {} obstacles",
        FOLLOWER_COUNT, ORBITER_COUNT, OBSTACLE_COUNT
    );
    Ok(())
}

// ============================================================================
// MAIN
// ============================================================================

fn main() -> KernelResult<()> {
    env_logger::init();

    let planet = Planet::new(Vec3::ZERO, PLANET_RADIUS)?;
    let mut sim = Simulation::new(planet, KernelConfig::default())?;
    spawn_wave(&mut sim)?;

    let dt = 1.0 / TICK_RATE;
    let ticks_per_second = TICK_RATE as u32;
    let mut casts = 0;
    let mut last_summary = std::time::Instant::now();

    for tick in 1..=RUN_SECONDS * ticks_per_second {
        // Fire everything the player has, every half second.
        if tick % (ticks_per_second / 2) == 0 {
            if let Some(player) = sim.world().resource::<planet_swarm::PlayerRef>().0 {
                sim.activate(player, 0);
                sim.activate(player, 1);
            }
        }

        let report = sim.tick(dt)?;
        casts += sim.drain_cast_intents().len();

        if tick % ticks_per_second == 0 {
            let elapsed_ms = last_summary.elapsed().as_secs_f32() * 1000.0;
            println!(
                "t={:>3}s | active {:>4} | grid {:>4} | moved {:>4} | casts {:>3} | {:.1} ms/s",
                tick / ticks_per_second,
                report.active_agents,
                report.grid_entries,
                report.moved,
                casts,
                elapsed_ms
            );
            casts = 0;
            last_summary = std::time::Instant::now();
        }
    }
    Ok(())
}
