// Tick scheduling.
//
// Pass order within one tick:
//
//   Snapshot → Lod → Grid → Avoidance → Movement → Commit
//                       ↘ Targeting
//
// Targeting only reads the start-of-tick snapshot, so it depends on nothing
// but Snapshot; it is placed after Grid so that a failed grid build aborts it
// too. The executor is single-threaded: pass order is fixed and the
// data-parallel work happens inside passes on the rayon pool.

use bevy_ecs::prelude::*;
use bevy_ecs::schedule::ExecutorKind;

use super::systems::*;

#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickPass {
    Snapshot,
    Lod,
    Grid,
    Avoidance,
    Movement,
    Commit,
    Targeting,
}

pub fn build_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.set_executor_kind(ExecutorKind::SingleThreaded);
    schedule.configure_sets(
        (
            TickPass::Snapshot,
            TickPass::Lod,
            TickPass::Grid,
            TickPass::Avoidance,
            TickPass::Movement,
            TickPass::Commit,
        )
            .chain(),
    );
    schedule.configure_sets(TickPass::Targeting.after(TickPass::Grid));

    schedule.add_systems((
        snapshot_system.in_set(TickPass::Snapshot),
        lod_gate_system.in_set(TickPass::Lod),
        grid_build_system.in_set(TickPass::Grid),
        avoidance_system.in_set(TickPass::Avoidance),
        movement_system.in_set(TickPass::Movement),
        commit_system.in_set(TickPass::Commit),
        targeting_system.in_set(TickPass::Targeting),
    ));
    schedule
}
