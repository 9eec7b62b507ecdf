//! Client-side weapon controller
//!
//! Paces trigger pulls by fire mode, runs the optimistic local checks (ammo
//! and reload only; the cooldown stays server-side), predicts the shot with
//! the best-known spread seed, and sends the hit claim immediately before
//! its fire request on the ordered channel.

use bevy::prelude::*;
use lightyear::prelude::*;

use shared::raycast::first_hit;
use shared::weapons::spread::apply_spread;
use shared::weapons::trigger::TriggerState;
use shared::{
    actor_muzzle, peer_id_to_u64, ActorTarget, AimUpdate, BlockingGeometry, CombatChannel,
    EquippedWeapon, FireRequest, Health, HitClaim, JoinRequest, LocalPlayer, MatchPhase, Player,
    PlayerPosition, PlayerRotation, ReloadRequest, SwitchWeapon,
};

use crate::input::InputState;
use crate::reconcile::{AmmoMirror, LatestSeeds, PredictedImpact, PredictedImpacts};
use crate::GameClient;

/// The client id we authenticated with
#[derive(Resource)]
pub struct LocalClientId(pub u64);

/// Trigger pacing state for the local weapon
#[derive(Resource, Default)]
pub struct ControllerState {
    pub trigger: TriggerState,
    /// Last look angles shipped to the server; unchanged aim sends nothing
    last_sent_aim: Option<(f32, f32)>,
}

/// Ask the server for an actor once the connection is up.
pub fn join_once(
    mut new_connections: Query<&mut MessageSender<JoinRequest>, (With<GameClient>, Added<Connected>)>,
) {
    for mut sender in new_connections.iter_mut() {
        info!("Connected, requesting actor spawn");
        sender.send::<CombatChannel>(JoinRequest);
    }
}

/// Tag the replicated actor that belongs to this client.
pub fn tag_local_player(
    mut commands: Commands,
    local_id: Res<LocalClientId>,
    new_players: Query<(Entity, &Player), Added<Player>>,
) {
    for (entity, player) in new_players.iter() {
        if peer_id_to_u64(player.client_id) == local_id.0 {
            info!("Local actor replicated, tagging");
            commands.entity(entity).insert(LocalPlayer);
        }
    }
}

/// Drive the local weapon from player intent, once per fixed tick.
pub fn drive_weapon_controller(
    time: Res<Time>,
    mut input: ResMut<InputState>,
    mut state: ResMut<ControllerState>,
    local_id: Res<LocalClientId>,
    seeds: Res<LatestSeeds>,
    ammo: Res<AmmoMirror>,
    blocking: Res<BlockingGeometry>,
    mut predicted: ResMut<PredictedImpacts>,
    phase: Query<&MatchPhase>,
    local: Query<(&PlayerPosition, &EquippedWeapon), With<LocalPlayer>>,
    others: Query<(&Player, &PlayerPosition, &Health), Without<LocalPlayer>>,
    mut client: Query<
        (
            &mut MessageSender<AimUpdate>,
            &mut MessageSender<HitClaim>,
            &mut MessageSender<FireRequest>,
            &mut MessageSender<ReloadRequest>,
            &mut MessageSender<SwitchWeapon>,
        ),
        With<GameClient>,
    >,
) {
    let now = time.elapsed_secs();
    let Ok((position, weapon)) = local.single() else {
        return;
    };
    let Ok((mut aim_sender, mut claim_sender, mut fire_sender, mut reload_sender, mut switch_sender)) =
        client.single_mut()
    else {
        return;
    };

    // Keep the authoritative rotation current. On the ordered channel this
    // lands before any claim or fire request sent this tick.
    if state.last_sent_aim != Some((input.yaw, input.pitch)) {
        aim_sender.send::<CombatChannel>(AimUpdate { yaw: input.yaw, pitch: input.pitch });
        state.last_sent_aim = Some((input.yaw, input.pitch));
    }

    if let Some(kind) = input.take_switch() {
        switch_sender.send::<CombatChannel>(SwitchWeapon { kind });
        // A pending burst does not carry over to the new weapon.
        state.trigger.reset();
    }
    if input.take_reload() {
        reload_sender.send::<CombatChannel>(ReloadRequest);
    }

    let stats = weapon.kind.stats();
    let wants_shot = state
        .trigger
        .tick(stats.fire_mode, input.fire_held, now, weapon.kind.fire_cooldown());

    if !wants_shot || !phase.iter().any(|p| p.is_combat_allowed()) {
        return;
    }

    // Optimistic resource check: ammo and reload state from the latest
    // server sync, never the cooldown.
    let (current, reserve) = ammo.for_shooter(local_id.0).unwrap_or((
        weapon.ammo_in_mag,
        weapon.reserve_ammo,
    ));
    if current == 0 || weapon.is_reloading() {
        // Empty-mag feedback stays local; the server would only reject.
        debug!("trigger pulled on empty magazine ({} in reserve)", reserve);
        return;
    }

    let forward = PlayerRotation { yaw: input.yaw, pitch: input.pitch }.forward();
    let muzzle = actor_muzzle(position.0);

    if weapon.kind.is_projectile() {
        // Projectiles carry no claim; the server simulates the flight.
        fire_sender.send::<CombatChannel>(FireRequest {
            direction: forward,
            client_timestamp: now,
            aiming: input.aiming,
        });
        return;
    }

    // Predict with the best-known seed. The first shot after connect has no
    // seed yet and predicts an unspread ray; the authoritative impact
    // overwrites it either way.
    let seed = seeds.for_shooter(local_id.0).unwrap_or_default();
    let spread = if input.aiming { stats.spread_aim } else { stats.spread_hip };
    let direction = apply_spread(forward, seed, spread);

    let actors: Vec<ActorTarget> = others
        .iter()
        .filter(|(_, _, health)| !health.is_dead())
        .map(|(player, position, _)| ActorTarget {
            id: peer_id_to_u64(player.client_id),
            team: player.team,
            position: position.0,
        })
        .collect();

    let claim = match first_hit(muzzle, direction, stats.range, local_id.0, &actors, &blocking) {
        Some(candidate) => {
            predicted.last = Some(PredictedImpact {
                point: candidate.point,
                normal: candidate.normal,
                body_hit: candidate.actor_id().is_some(),
            });
            HitClaim {
                point: candidate.point,
                normal: candidate.normal,
                distance: candidate.distance,
                target_id: candidate.actor_id(),
            }
        }
        None => {
            let point = muzzle + direction * stats.range;
            predicted.last = Some(PredictedImpact {
                point,
                normal: -direction,
                body_hit: false,
            });
            HitClaim {
                point,
                normal: -direction,
                distance: stats.range,
                target_id: None,
            }
        }
    };

    // Claim first, then the request it belongs to. Per-channel ordering
    // keeps them adjacent on the server.
    claim_sender.send::<CombatChannel>(claim);
    fire_sender.send::<CombatChannel>(FireRequest {
        direction: forward,
        client_timestamp: now,
        aiming: input.aiming,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::WeaponKind;

    #[test]
    fn prediction_and_server_agree_on_seeded_ray() {
        // Client prediction and the authoritative raycast draw the same
        // direction from the same seed.
        let seed = 0xDEAD_BEEF;
        let spread = WeaponKind::Carbine.stats().spread_hip;
        let forward = Vec3::NEG_Z;
        let a = apply_spread(forward, seed, spread);
        let b = apply_spread(forward, seed, spread);
        assert_eq!(a.x.to_bits(), b.x.to_bits());
        assert_eq!(a.y.to_bits(), b.y.to_bits());
        assert_eq!(a.z.to_bits(), b.z.to_bits());
    }

    #[test]
    fn miss_claims_environment_at_max_range() {
        let blocking = BlockingGeometry::default();
        let stats = WeaponKind::Carbine.stats();
        let muzzle = actor_muzzle(Vec3::ZERO);
        let direction = Vec3::NEG_Z;
        let hit = first_hit(muzzle, direction, stats.range, 1, &[], &blocking);
        assert!(hit.is_none());
        // The controller falls back to a null-target claim at max range.
        let point = muzzle + direction * stats.range;
        assert!((point.z + stats.range).abs() < 1e-3);
    }
}
