//! Arena setup and match phase progression

use bevy::prelude::*;
use lightyear::prelude::*;
use lightyear::prelude::server::*;

use shared::{BlockingGeometry, MatchPhase};

/// Seconds of warmup before combat opens
const WARMUP_SECONDS: f32 = 5.0;

/// Tracks that the match phase entity has been spawned
#[derive(Resource)]
pub struct MatchPhaseSpawned;

/// Static arena geometry: the shared arena definition is the set of blocking
/// volumes every line-of-sight and impact query runs against.
pub fn setup_world(mut commands: Commands) {
    let blocking = BlockingGeometry::default_arena();
    info!("Arena ready: {} blocking volumes", blocking.volumes.len());
    commands.insert_resource(blocking);
}

/// Spawn the replicated match phase entity once the server is started.
pub fn spawn_match_phase_once(
    mut commands: Commands,
    spawned: Option<Res<MatchPhaseSpawned>>,
) {
    if spawned.is_some() {
        return;
    }
    commands.insert_resource(MatchPhaseSpawned);

    commands.spawn((
        MatchPhase::Warmup,
        Replicate::new(ReplicationMode::SingleServer(NetworkTarget::All)),
    ));
    info!("Match phase spawned: warmup for {WARMUP_SECONDS}s");
}

/// Open combat once the warmup window has elapsed.
pub fn tick_match_phase(time: Res<Time>, mut phase: Query<&mut MatchPhase>) {
    for mut phase in phase.iter_mut() {
        if *phase == MatchPhase::Warmup && time.elapsed_secs() >= WARMUP_SECONDS {
            *phase = MatchPhase::Combat;
            info!("Match phase: combat");
        }
    }
}
