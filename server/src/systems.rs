//! Connection lifecycle and actor spawning

use bevy::prelude::*;
use lightyear::prelude::*;
use lightyear::prelude::server::*;

use shared::{
    AimUpdate, AmmoSync, EquippedWeapon, FireEffectBroadcast, FireRequest, Health, HitClaim,
    ImpactBroadcast, JoinRequest, Player, PlayerPosition, PlayerRotation, RejectFire,
    ReloadRequest, SpreadSeedSync, SwitchWeapon, SPAWN_POSITION,
};

use crate::fire_control::PendingClaims;

/// Handle new client connections - attach replication and message I/O to the
/// connection entity. Actor spawning waits for an explicit join request.
pub fn handle_connections(
    mut commands: Commands,
    new_clients: Query<(Entity, &RemoteId), Added<Connected>>,
    client_filter: Query<(), With<ClientOf>>,
) {
    for (client_entity, remote_id) in new_clients.iter() {
        if client_filter.get(client_entity).is_err() {
            continue;
        }

        info!("Client connected: {:?} - awaiting join request", remote_id.0);

        // Lightyear 0.25 requires these on the connection entity; without
        // them no replication or message traffic happens.
        commands.entity(client_entity).insert((
            ReplicationSender::new(
                shared::protocol::tick_duration(),
                SendUpdatesMode::SinceLastAck,
                false,
            ),
            // Client -> Server
            MessageReceiver::<JoinRequest>::default(),
            MessageReceiver::<AimUpdate>::default(),
            MessageReceiver::<FireRequest>::default(),
            MessageReceiver::<HitClaim>::default(),
            MessageReceiver::<ReloadRequest>::default(),
            MessageReceiver::<SwitchWeapon>::default(),
        ));

        commands.entity(client_entity).insert((
            // Server -> Client
            MessageSender::<SpreadSeedSync>::default(),
            MessageSender::<AmmoSync>::default(),
            MessageSender::<FireEffectBroadcast>::default(),
            MessageSender::<ImpactBroadcast>::default(),
            MessageSender::<RejectFire>::default(),
        ));
    }
}

/// Spawn an actor for each join request. Teams alternate by join order.
pub fn handle_join_requests(
    mut commands: Commands,
    mut client_links: Query<(Entity, &RemoteId, &mut MessageReceiver<JoinRequest>), With<ClientOf>>,
    existing_players: Query<&Player>,
) {
    for (client_entity, remote_id, mut receiver) in client_links.iter_mut() {
        let peer_id = remote_id.0;

        for _join in receiver.receive() {
            if existing_players.iter().any(|p| p.client_id == peer_id) {
                continue;
            }

            let team = (existing_players.iter().count() % 2) as u8;
            info!("Spawning actor for {:?} on team {}", peer_id, team);

            commands.spawn((
                Player { client_id: peer_id, team },
                PlayerPosition(SPAWN_POSITION),
                PlayerRotation::default(),
                Health::default(),
                EquippedWeapon::default(),
                Replicate::new(ReplicationMode::SingleServer(NetworkTarget::All)),
                ControlledBy {
                    owner: client_entity,
                    lifetime: Lifetime::default(),
                },
            ));
        }
    }
}

/// Apply the latest look angles from each client to its actor's replicated
/// rotation. This runs before fire handling, so the authoritative forward
/// used by hitscan and the aim-cone check reflects the aim that produced the
/// shot rather than the spawn-time default.
pub fn handle_aim_updates(
    mut client_links: Query<(&RemoteId, &mut MessageReceiver<AimUpdate>), With<ClientOf>>,
    mut players: Query<(&Player, &mut PlayerRotation)>,
) {
    for (remote_id, mut receiver) in client_links.iter_mut() {
        let peer_id = remote_id.0;
        let Some(update) = receiver.receive().last() else {
            continue;
        };
        for (player, mut rotation) in players.iter_mut() {
            if player.client_id == peer_id {
                rotation.yaw = update.yaw;
                rotation.pitch = update.pitch;
                break;
            }
        }
    }
}

/// Despawn actors whose connection dropped and drop their buffered claims.
pub fn handle_disconnections(
    mut commands: Commands,
    mut claims: ResMut<PendingClaims>,
    disconnected: Query<&RemoteId, Added<Disconnected>>,
    players: Query<(Entity, &Player)>,
) {
    for remote_id in disconnected.iter() {
        let peer_id = remote_id.0;
        claims.latest.remove(&peer_id);

        for (entity, player) in players.iter() {
            if player.client_id == peer_id {
                info!("Client {:?} disconnected, despawning actor", peer_id);
                commands.entity(entity).despawn();
            }
        }
    }
}

/// Any actor that lost its weapon configuration gets the default kind back.
pub fn ensure_weapon_config(
    mut commands: Commands,
    unarmed: Query<(Entity, &Player), Without<EquippedWeapon>>,
) {
    for (entity, player) in unarmed.iter() {
        warn!(
            "actor {:?} has no weapon configuration, provisioning default",
            player.client_id
        );
        commands.entity(entity).insert(EquippedWeapon::default());
    }
}
