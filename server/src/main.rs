//! Fire-control server - headless Bevy app that owns the authoritative
//! combat simulation.
//!
//! Lightyear 0.25 / Bevy 0.17

mod fire_control;
mod projectiles;
mod systems;
mod validation;
mod world;

use bevy::app::ScheduleRunnerPlugin;
use bevy::prelude::*;
use lightyear::prelude::server::*;
use lightyear::prelude::*;
use std::net::SocketAddr;

use shared::{
    get_server_bind_addr, protocol::tick_duration, EntityPool, PooledKind, ProtocolPlugin,
    PRIVATE_KEY, PROTOCOL_ID, SERVER_PORT,
};

use fire_control::{CombatRules, PendingClaims, SeedSource};

/// How many projectiles to pool ahead of demand
const PROJECTILE_PREWARM: usize = 32;
/// Effect proxies churn faster than projectiles; pool more of them
const EFFECT_PREWARM: usize = 64;

/// Marker for our server entity
#[derive(Component)]
struct GameServer;

/// Spawn the server entity with all required networking components
fn spawn_server(mut commands: Commands) {
    let bind_addr = get_server_bind_addr();
    let server_addr: SocketAddr = format!("{}:{}", bind_addr, SERVER_PORT)
        .parse()
        .expect("Invalid server bind address");

    info!("Spawning server entity, binding to {:?}", server_addr);

    commands.spawn((
        GameServer,
        Server::default(),
        ServerUdpIo::default(),
        LocalAddr(server_addr),
        NetcodeServer::new(NetcodeConfig {
            protocol_id: PROTOCOL_ID,
            private_key: PRIVATE_KEY,
            ..default()
        }),
    ));
}

/// Start the server after it's spawned
fn start_server(
    mut commands: Commands,
    server_query: Query<Entity, (With<GameServer>, Without<Started>, Without<Starting>)>,
) {
    for server_entity in server_query.iter() {
        info!("Starting server...");
        commands.trigger(Start { entity: server_entity });
    }
}

/// Check if server is started (run condition)
fn server_is_started(server_query: Query<(), (With<GameServer>, With<Started>)>) -> bool {
    !server_query.is_empty()
}

/// Fill the pools before the first shot needs them.
fn prewarm_pool(mut commands: Commands, mut pool: ResMut<EntityPool>) {
    pool.prewarm(&mut commands, PooledKind::Projectile, PROJECTILE_PREWARM);
    pool.prewarm(&mut commands, PooledKind::Tracer, EFFECT_PREWARM);
    pool.prewarm(&mut commands, PooledKind::ImpactMark, EFFECT_PREWARM);
}

fn main() {
    let mut app = App::new();

    // Headless plugins (no rendering)
    // IMPORTANT: run the main loop at the same rate as our fixed tick, so
    // message buffers are not cleared before FixedUpdate reads them.
    app.add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(tick_duration())));
    app.add_plugins(bevy::log::LogPlugin::default());

    // Combat state
    app.insert_resource(EntityPool::new(true));
    app.init_resource::<CombatRules>();
    app.init_resource::<SeedSource>();
    app.init_resource::<PendingClaims>();

    // Lightyear server plugins (tick_duration = 60Hz)
    app.add_plugins(ServerPlugins {
        tick_duration: tick_duration(),
    });

    // Protocol plugin (component/message registration)
    app.add_plugins(ProtocolPlugin);

    app.add_systems(Startup, (world::setup_world, prewarm_pool, spawn_server));

    // Start server after spawning
    app.add_systems(Update, start_server);

    // Spawn the match phase entity after the server is started
    app.add_systems(
        Update,
        world::spawn_match_phase_once.run_if(server_is_started),
    );

    // Fixed tick: connections and requests first, then simulation.
    app.add_systems(
        FixedUpdate,
        (
            world::tick_match_phase,
            systems::handle_connections,
            systems::handle_disconnections,
            systems::handle_join_requests,
            systems::ensure_weapon_config,
            systems::handle_aim_updates,
            fire_control::handle_hit_claims,
            fire_control::handle_fire_requests,
            fire_control::handle_reload_requests,
            fire_control::handle_weapon_switch,
            fire_control::tick_reloads,
            projectiles::simulate_projectiles,
            projectiles::detect_projectile_hits,
            projectiles::expire_projectiles,
            projectiles::expire_effect_proxies,
            projectiles::sync_pool_replication,
        )
            .chain()
            .run_if(server_is_started),
    );

    info!("Starting server on port {}", SERVER_PORT);
    app.run();
}
