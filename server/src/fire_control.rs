//! Server-side fire control
//!
//! Every trigger pull runs the same pipeline: gate on match phase, check the
//! cooldown and magazine, validate any buffered hit claim, draw the spread
//! seed, then resolve the shot. The seed broadcast goes out before any impact
//! traffic for the same shot; the ordered channel keeps it that way on the
//! wire.

use bevy::prelude::*;
use lightyear::prelude::*;
use lightyear::prelude::server::*;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;

use shared::raycast::first_hit;
use shared::weapons::damage::{self, DamageKind, HitZone, TargetRelation};
use shared::weapons::spread::apply_spread;
use shared::{
    actor_muzzle, peer_id_to_u64, ActorTarget, AmmoSync, BlockingGeometry, CombatChannel,
    EntityPool, EquippedWeapon, FireEffectBroadcast, FireRequest, Health, HitClaim,
    ImpactBroadcast, ImpactMark, ImpactSurface, MatchPhase, Player, PlayerPosition,
    PlayerRotation, PooledKind, Projectile, ProjectilePrevPosition, ProjectileVelocity,
    RejectFire, ReloadRequest, SpreadSeedSync, SwitchWeapon, Tracer, WeaponKind,
    MAX_LAG_COMPENSATION,
};

use crate::validation::{validate_hit_claim, ClaimContext, ValidatedClaim, ValidationError};

/// Match configuration that affects damage resolution
#[derive(Resource)]
pub struct CombatRules {
    pub friendly_fire: bool,
}

impl Default for CombatRules {
    fn default() -> Self {
        Self { friendly_fire: false }
    }
}

/// Authoritative spread seed generator. One draw per accepted shot.
#[derive(Resource)]
pub struct SeedSource(ChaCha8Rng);

impl Default for SeedSource {
    fn default() -> Self {
        Self(ChaCha8Rng::from_entropy())
    }
}

impl SeedSource {
    pub fn next_seed(&mut self) -> u64 {
        self.0.next_u64()
    }
}

/// Latest unconsumed hit claim per client. A claim arrives on the ordered
/// channel immediately before its fire request, so at most one is pending
/// when the request is processed; newer claims overwrite older ones.
#[derive(Resource, Default)]
pub struct PendingClaims {
    pub latest: HashMap<PeerId, HitClaim>,
}

/// Broadcast senders attached to each connected client link
type CombatSenders<'w, 's> = Query<
    'w,
    's,
    (
        &'static RemoteId,
        &'static mut MessageSender<SpreadSeedSync>,
        &'static mut MessageSender<AmmoSync>,
        &'static mut MessageSender<FireEffectBroadcast>,
        &'static mut MessageSender<ImpactBroadcast>,
        &'static mut MessageSender<RejectFire>,
    ),
    (With<ClientOf>, With<Connected>),
>;

/// Drain incoming hit claims into the per-client buffer.
pub fn handle_hit_claims(
    mut claims: ResMut<PendingClaims>,
    mut client_links: Query<(&RemoteId, &mut MessageReceiver<HitClaim>), With<ClientOf>>,
) {
    for (remote_id, mut receiver) in client_links.iter_mut() {
        for claim in receiver.receive() {
            claims.latest.insert(remote_id.0, claim);
        }
    }
}

/// Everything needed to finish resolving one accepted shot after the
/// per-shooter borrows are released.
struct AcceptedShot {
    shooter_id: u64,
    shooter_team: u8,
    seed: u64,
    muzzle: Vec3,
    direction: Vec3,
    kind: WeaponKind,
    ammo_in_mag: u32,
    reserve_ammo: u32,
    claim: Option<Result<ValidatedClaim, ValidationError>>,
}

/// Process fire requests: the heart of the pipeline.
pub fn handle_fire_requests(
    mut commands: Commands,
    time: Res<Time>,
    rules: Res<CombatRules>,
    blocking: Res<BlockingGeometry>,
    mut seeds: ResMut<SeedSource>,
    mut claims: ResMut<PendingClaims>,
    mut pool: ResMut<EntityPool>,
    phase: Query<&MatchPhase>,
    mut client_links: Query<(&RemoteId, &mut MessageReceiver<FireRequest>), With<ClientOf>>,
    mut players: Query<(
        &Player,
        &PlayerPosition,
        &PlayerRotation,
        &mut EquippedWeapon,
        &mut Health,
    )>,
    mut senders: CombatSenders,
) {
    let now = time.elapsed_secs();
    let combat_allowed = phase.iter().any(|p| p.is_combat_allowed());

    // Scene snapshot for validation and the authoritative raycast. Dead
    // actors are not targets.
    let actors: Vec<ActorTarget> = players
        .iter()
        .filter(|(_, _, _, _, health)| !health.is_dead())
        .map(|(player, position, _, _, _)| ActorTarget {
            id: peer_id_to_u64(player.client_id),
            team: player.team,
            position: position.0,
        })
        .collect();

    let mut accepted: Vec<AcceptedShot> = Vec::new();
    let mut rejected: Vec<PeerId> = Vec::new();

    for (remote_id, mut receiver) in client_links.iter_mut() {
        let peer_id = remote_id.0;

        for request in receiver.receive() {
            let Some((player, position, rotation, mut weapon, health)) = players
                .iter_mut()
                .find(|(p, _, _, _, _)| p.client_id == peer_id)
            else {
                continue;
            };

            weapon.aiming = request.aiming;

            if !combat_allowed || health.is_dead() {
                rejected.push(peer_id);
                continue;
            }
            if !weapon.can_fire(now) {
                debug!("fire rejected for {:?}: cooldown or resources", peer_id);
                rejected.push(peer_id);
                continue;
            }

            let shooter_id = peer_id_to_u64(player.client_id);

            // Validate the buffered claim against pre-commit weapon state;
            // committing first would make the rate check self-defeating.
            let claim = claims.latest.remove(&peer_id).map(|claim| {
                validate_hit_claim(
                    &claim,
                    &ClaimContext {
                        now,
                        shooter_id,
                        shooter_position: position.0,
                        shooter_forward: rotation.forward(),
                        weapon: Some(&weapon),
                        actors: &actors,
                        blocking: &blocking,
                    },
                )
            });
            if let Some(Err(reason)) = &claim {
                warn!("hit claim from {:?} failed validation: {:?}", peer_id, reason);
            }

            // Bounded lag tolerance; informational only, the raycast always
            // runs against current positions.
            let lag = (now - request.client_timestamp).clamp(0.0, MAX_LAG_COMPENSATION);
            debug!("shot from {:?} with {:.0}ms lag allowance", peer_id, lag * 1000.0);

            let seed = seeds.next_seed();
            let spread = weapon.current_spread();
            weapon.commit_fire(now);
            if weapon.ammo_in_mag == 0 && weapon.begin_reload(now) {
                info!("auto-reload started for {:?}", peer_id);
            }

            // Hitscan aims from the authoritative rotation; projectiles take
            // the client direction as their launch basis.
            let base_dir = if weapon.kind.is_projectile() {
                let dir = request.direction.normalize_or_zero();
                if dir == Vec3::ZERO {
                    rotation.forward()
                } else {
                    dir
                }
            } else {
                rotation.forward()
            };

            accepted.push(AcceptedShot {
                shooter_id,
                shooter_team: player.team,
                seed,
                muzzle: actor_muzzle(position.0),
                direction: apply_spread(base_dir, seed, spread),
                kind: weapon.kind,
                ammo_in_mag: weapon.ammo_in_mag,
                reserve_ammo: weapon.reserve_ammo,
                claim,
            });
        }
    }

    for peer_id in rejected {
        for (remote_id, _, _, _, _, mut reject_sender) in senders.iter_mut() {
            if remote_id.0 == peer_id {
                reject_sender.send::<CombatChannel>(RejectFire);
            }
        }
    }

    for shot in accepted {
        let stats = shot.kind.stats();

        // Seed first. Everything else about this shot follows it on the
        // ordered channel.
        for (_, mut seed_sender, mut ammo_sender, mut effect_sender, _, _) in senders.iter_mut() {
            seed_sender.send::<CombatChannel>(SpreadSeedSync {
                shooter_id: shot.shooter_id,
                seed: shot.seed,
            });
            ammo_sender.send::<CombatChannel>(AmmoSync {
                shooter_id: shot.shooter_id,
                current: shot.ammo_in_mag,
                reserve: shot.reserve_ammo,
            });
            effect_sender.send::<CombatChannel>(FireEffectBroadcast {
                shooter_id: shot.shooter_id,
                muzzle_position: shot.muzzle,
                muzzle_direction: shot.direction,
            });
        }

        if shot.kind.is_projectile() {
            let orientation = Quat::from_rotation_arc(Vec3::NEG_Z, shot.direction);
            let entity = pool.acquire(&mut commands, PooledKind::Projectile, shot.muzzle, orientation);
            commands.entity(entity).insert((
                Projectile {
                    shooter_id: shot.shooter_id,
                    shooter_team: shot.shooter_team,
                    kind: shot.kind,
                    spawn_position: shot.muzzle,
                    spawn_time: now,
                },
                ProjectileVelocity(shot.direction * stats.projectile_speed),
                ProjectilePrevPosition(shot.muzzle),
            ));
            continue;
        }

        // Authoritative raycast. A direct actor hit wins; a validated claim
        // only awards damage when the server's own ray found nothing but
        // environment. Exactly one damage resolution per accepted shot.
        let server_hit = first_hit(
            shot.muzzle,
            shot.direction,
            stats.range,
            shot.shooter_id,
            &actors,
            &blocking,
        );

        // Where the shot ended up, plus target data when damage may resolve.
        let outcome = match server_hit {
            Some(candidate) => match candidate.target {
                shared::HitTarget::Actor { id, team, zone } => Some((
                    candidate.point,
                    candidate.normal,
                    Some((id, team, zone, candidate.distance)),
                )),
                shared::HitTarget::Environment => match shot.claim {
                    Some(Ok(ValidatedClaim::ActorHit {
                        target_id,
                        target_team,
                        zone,
                        point,
                        normal,
                        distance,
                    })) => Some((point, normal, Some((target_id, target_team, zone, distance)))),
                    _ => Some((candidate.point, candidate.normal, None)),
                },
            },
            None => match shot.claim {
                Some(Ok(ValidatedClaim::ActorHit {
                    target_id,
                    target_team,
                    zone,
                    point,
                    normal,
                    distance,
                })) => Some((point, normal, Some((target_id, target_team, zone, distance)))),
                Some(Ok(ValidatedClaim::Environment { point, normal })) => {
                    Some((point, normal, None))
                }
                _ => None,
            },
        };

        // Tracer runs from the muzzle to wherever the shot stopped, or out
        // to max range on a clean miss.
        let tracer_end = outcome
            .map(|(point, _, _)| point)
            .unwrap_or(shot.muzzle + shot.direction * stats.range);
        let orientation = Quat::from_rotation_arc(Vec3::NEG_Z, shot.direction);
        let tracer = pool.acquire(&mut commands, PooledKind::Tracer, shot.muzzle, orientation);
        commands.entity(tracer).insert(Tracer {
            shooter_id: shot.shooter_id,
            start: shot.muzzle,
            end: tracer_end,
            spawn_time: now,
        });

        let Some((point, normal, actor)) = outcome else {
            continue;
        };

        let Some((target_id, target_team, zone, distance)) = actor else {
            let surface = classify_surface(normal);
            spawn_impact_mark(&mut commands, &mut pool, point, normal, surface, now);
            broadcast_impact(
                &mut senders,
                ImpactBroadcast {
                    shooter_id: shot.shooter_id,
                    point,
                    normal,
                    surface,
                    is_body_hit: false,
                    is_critical: false,
                },
            );
            continue;
        };

        let relation = TargetRelation {
            attacker_id: shot.shooter_id,
            attacker_team: shot.shooter_team,
            target_id,
            target_team,
        };
        let event = damage::resolve_hit(
            stats.base_damage,
            stats.range,
            distance,
            Some(zone),
            &relation,
            rules.friendly_fire,
            DamageKind::Hitscan,
            point,
            normal,
        );

        if let Some(event) = &event {
            apply_damage(&mut players, target_id, event.amount, shot.shooter_id, zone);
        }

        broadcast_impact(
            &mut senders,
            ImpactBroadcast {
                shooter_id: shot.shooter_id,
                point,
                normal,
                surface: ImpactSurface::Actor,
                is_body_hit: true,
                is_critical: event.as_ref().is_some_and(|e| e.critical),
            },
        );
    }
}

/// Classify an environment impact by the surface it entered through.
pub fn classify_surface(normal: Vec3) -> ImpactSurface {
    if normal.y > 0.5 {
        ImpactSurface::Ground
    } else {
        ImpactSurface::Wall
    }
}

/// Put a pooled decal proxy at an environment impact. Actor hits get their
/// effects from the impact broadcast alone.
pub fn spawn_impact_mark(
    commands: &mut Commands,
    pool: &mut EntityPool,
    point: Vec3,
    normal: Vec3,
    surface: ImpactSurface,
    now: f32,
) {
    let orientation = Quat::from_rotation_arc(Vec3::NEG_Z, normal);
    let entity = pool.acquire(commands, PooledKind::ImpactMark, point, orientation);
    commands.entity(entity).insert(ImpactMark {
        surface,
        point,
        normal,
        spawn_time: now,
    });
}

fn broadcast_impact(senders: &mut CombatSenders, impact: ImpactBroadcast) {
    for (_, _, _, _, mut impact_sender, _) in senders.iter_mut() {
        impact_sender.send::<CombatChannel>(impact.clone());
    }
}

fn apply_damage(
    players: &mut Query<(
        &Player,
        &PlayerPosition,
        &PlayerRotation,
        &mut EquippedWeapon,
        &mut Health,
    )>,
    target_id: u64,
    amount: u32,
    shooter_id: u64,
    zone: HitZone,
) {
    for (player, _, _, _, mut health) in players.iter_mut() {
        if peer_id_to_u64(player.client_id) == target_id {
            let killed = health.apply_damage(amount);
            info!(
                "hit: {} -> {} ({:?}) for {} damage (kill: {})",
                shooter_id, target_id, zone, amount, killed
            );
            return;
        }
    }
}

/// Begin a reload on request. Completion is deadline-driven in
/// `tick_reloads`; a weapon switch cancels it.
pub fn handle_reload_requests(
    time: Res<Time>,
    mut client_links: Query<(&RemoteId, &mut MessageReceiver<ReloadRequest>), With<ClientOf>>,
    mut players: Query<(&Player, &mut EquippedWeapon)>,
) {
    let now = time.elapsed_secs();
    for (remote_id, mut receiver) in client_links.iter_mut() {
        let peer_id = remote_id.0;
        for _msg in receiver.receive() {
            for (player, mut weapon) in players.iter_mut() {
                if player.client_id == peer_id {
                    if weapon.begin_reload(now) {
                        info!("{:?} started reloading {:?}", peer_id, weapon.kind);
                    }
                    break;
                }
            }
        }
    }
}

/// Complete reloads whose deadline has passed and sync the new ammo state.
pub fn tick_reloads(
    time: Res<Time>,
    mut players: Query<(&Player, &mut EquippedWeapon)>,
    mut senders: CombatSenders,
) {
    let now = time.elapsed_secs();
    for (player, mut weapon) in players.iter_mut() {
        let Some(deadline) = weapon.reloading_until else {
            continue;
        };
        if now < deadline {
            continue;
        }
        weapon.finish_reload();
        info!(
            "{:?} finished reloading: {}/{}",
            player.client_id, weapon.ammo_in_mag, weapon.reserve_ammo
        );

        let sync = AmmoSync {
            shooter_id: peer_id_to_u64(player.client_id),
            current: weapon.ammo_in_mag,
            reserve: weapon.reserve_ammo,
        };
        for (_, _, mut ammo_sender, _, _, _) in senders.iter_mut() {
            ammo_sender.send::<CombatChannel>(sync);
        }
    }
}

/// Handle weapon switch requests. Switching cancels any in-flight reload.
pub fn handle_weapon_switch(
    mut client_links: Query<(&RemoteId, &mut MessageReceiver<SwitchWeapon>), With<ClientOf>>,
    mut players: Query<(&Player, &mut EquippedWeapon)>,
    mut senders: CombatSenders,
) {
    for (remote_id, mut receiver) in client_links.iter_mut() {
        let peer_id = remote_id.0;
        for request in receiver.receive() {
            for (player, mut weapon) in players.iter_mut() {
                if player.client_id == peer_id {
                    weapon.switch_to(request.kind);
                    info!("{:?} switched to {:?}", peer_id, request.kind);

                    let sync = AmmoSync {
                        shooter_id: peer_id_to_u64(player.client_id),
                        current: weapon.ammo_in_mag,
                        reserve: weapon.reserve_ammo,
                    };
                    for (_, _, mut ammo_sender, _, _, _) in senders.iter_mut() {
                        ammo_sender.send::<CombatChannel>(sync);
                    }
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_classification_by_normal() {
        assert_eq!(classify_surface(Vec3::Y), ImpactSurface::Ground);
        assert_eq!(classify_surface(Vec3::X), ImpactSurface::Wall);
        assert_eq!(classify_surface(Vec3::new(0.3, 0.4, 0.0)), ImpactSurface::Wall);
    }

    #[test]
    fn seed_source_never_repeats_consecutively() {
        let mut source = SeedSource::default();
        let a = source.next_seed();
        let b = source.next_seed();
        assert_ne!(a, b);
    }
}
