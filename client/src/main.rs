//! Combat client - connects to the server, predicts shots locally, and
//! reconciles against authoritative results.
//!
//! Presentation-agnostic: player intent enters through the `InputState`
//! resource and effect hooks log instead of render.
//!
//! Lightyear 0.25 / Bevy 0.17

mod controller;
mod input;
mod reconcile;

use bevy::app::ScheduleRunnerPlugin;
use bevy::prelude::*;
use lightyear::prelude::client::*;
use lightyear::prelude::*;
use std::net::SocketAddr;

use shared::{
    protocol::tick_duration, AimUpdate, AmmoSync, BlockingGeometry, FireEffectBroadcast,
    FireRequest, HitClaim, ImpactBroadcast, JoinRequest, ProtocolPlugin, RejectFire,
    ReloadRequest, SpreadSeedSync, SwitchWeapon, PRIVATE_KEY, PROTOCOL_ID, SERVER_ADDR,
    SERVER_PORT,
};

use controller::LocalClientId;

/// Marker component for our client entity
#[derive(Component)]
pub struct GameClient;

/// Spawn the client entity and initiate the connection.
fn start_connection(mut commands: Commands, local_id: Res<LocalClientId>) {
    let server_addr: SocketAddr = format!("{}:{}", SERVER_ADDR, SERVER_PORT)
        .parse()
        .expect("Invalid server address");
    let local_addr: SocketAddr = "0.0.0.0:0".parse().expect("Invalid local address");

    info!("Connecting to server at {}...", server_addr);

    let auth = Authentication::Manual {
        server_addr,
        protocol_id: PROTOCOL_ID,
        private_key: PRIVATE_KEY,
        client_id: local_id.0,
    };

    let client_entity = commands
        .spawn((
            GameClient,
            Client::default(),
            UdpIo::default(),
            LocalAddr(local_addr),
            PeerAddr(server_addr),
            NetcodeClient::new(auth, NetcodeConfig::default())
                .expect("Failed to create netcode client"),
            // Without this the client never receives replicated state.
            ReplicationReceiver::default(),
            // The message components are grouped so the whole spawn stays
            // within the tuple Bundle arity limit.
            // Client -> Server
            (
                MessageSender::<JoinRequest>::default(),
                MessageSender::<AimUpdate>::default(),
                MessageSender::<FireRequest>::default(),
                MessageSender::<HitClaim>::default(),
                MessageSender::<ReloadRequest>::default(),
                MessageSender::<SwitchWeapon>::default(),
            ),
            // Server -> Client
            (
                MessageReceiver::<SpreadSeedSync>::default(),
                MessageReceiver::<AmmoSync>::default(),
                MessageReceiver::<FireEffectBroadcast>::default(),
                MessageReceiver::<ImpactBroadcast>::default(),
                MessageReceiver::<RejectFire>::default(),
            ),
        ))
        .id();

    commands.trigger(Connect { entity: client_entity });
}

/// Log connection state transitions.
fn check_connection(
    new_connections: Query<Entity, (With<GameClient>, Added<Connected>)>,
    new_disconnections: Query<Entity, (With<GameClient>, Added<Disconnected>)>,
) {
    for _entity in new_connections.iter() {
        info!("Connected to server");
    }
    for _entity in new_disconnections.iter() {
        warn!("Connection failed or disconnected");
    }
}

fn main() {
    let mut app = App::new();

    // Headless loop at the simulation tick rate, same reasoning as the
    // server: message buffers are cleared per frame and read in FixedUpdate.
    app.add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(tick_duration())));
    app.add_plugins(bevy::log::LogPlugin::default());

    // Lightyear client plugins (tick_duration = 60Hz)
    app.add_plugins(ClientPlugins {
        tick_duration: tick_duration(),
    });
    app.add_plugins(ProtocolPlugin);

    let client_id = rand::random::<u64>();
    app.insert_resource(LocalClientId(client_id));

    // Prediction runs against the same arena the server resolves in.
    app.insert_resource(BlockingGeometry::default_arena());

    app.init_resource::<input::InputState>();
    app.init_resource::<controller::ControllerState>();
    app.init_resource::<reconcile::LatestSeeds>();
    app.init_resource::<reconcile::AmmoMirror>();
    app.init_resource::<reconcile::PredictedImpacts>();

    app.add_systems(Startup, start_connection);
    app.add_systems(Update, (check_connection, controller::join_once));

    // Fixed tick: apply authoritative traffic, then act on intent.
    app.add_systems(
        FixedUpdate,
        (
            controller::tag_local_player,
            reconcile::receive_seed_sync,
            reconcile::receive_ammo_sync,
            reconcile::receive_impacts,
            reconcile::receive_rejects,
            reconcile::receive_fire_effects,
            controller::drive_weapon_controller,
            reconcile::attach_projectile_transforms,
            reconcile::extrapolate_projectiles,
            reconcile::observe_effect_proxies,
        )
            .chain(),
    );

    info!(
        "Starting client, server at {}:{}, client_id: {}",
        SERVER_ADDR, SERVER_PORT, client_id
    );
    app.run();
}
