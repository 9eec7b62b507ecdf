//! Server-side projectile simulation
//!
//! Pooled projectiles integrate under gravity each tick and sweep the
//! segment they traveled against actors and blocking geometry. The first
//! candidate along the segment resolves the shot; the entity then goes back
//! to the pool instead of being despawned.

use bevy::prelude::*;
use lightyear::prelude::*;
use lightyear::prelude::server::*;

use shared::raycast::sweep_scene;
use shared::weapons::ballistics;
use shared::weapons::damage::{self, DamageKind, TargetRelation};
use shared::{
    peer_id_to_u64, ActorTarget, BlockingGeometry, CombatChannel, EntityPool, Health,
    ImpactBroadcast, ImpactMark, ImpactSurface, NetworkPresence, Player, PlayerPosition,
    PoolInactive, Projectile, ProjectilePrevPosition, ProjectileVelocity, Tracer,
    FIXED_TIMESTEP_HZ, IMPACT_MARK_LIFETIME, TRACER_LIFETIME,
};

use crate::fire_control::{classify_surface, spawn_impact_mark, CombatRules};

/// Advance active projectiles by one fixed tick.
pub fn simulate_projectiles(
    mut projectiles: Query<
        (
            &mut ProjectileVelocity,
            &mut ProjectilePrevPosition,
            &mut Transform,
        ),
        (With<Projectile>, Without<PoolInactive>),
    >,
) {
    let dt = 1.0 / FIXED_TIMESTEP_HZ as f32;

    for (mut velocity, mut prev_pos, mut transform) in projectiles.iter_mut() {
        prev_pos.0 = transform.translation;
        let (new_pos, new_vel) =
            ballistics::step_projectile(transform.translation, velocity.0, dt);
        transform.translation = new_pos;
        velocity.0 = new_vel;
    }
}

/// Sweep each projectile's last segment and resolve the first hit.
pub fn detect_projectile_hits(
    mut commands: Commands,
    time: Res<Time>,
    rules: Res<CombatRules>,
    blocking: Res<BlockingGeometry>,
    mut pool: ResMut<EntityPool>,
    projectiles: Query<
        (Entity, &Projectile, &ProjectilePrevPosition, &Transform),
        Without<PoolInactive>,
    >,
    mut players: Query<(&Player, &PlayerPosition, &mut Health)>,
    mut impact_senders: Query<&mut MessageSender<ImpactBroadcast>, (With<ClientOf>, With<Connected>)>,
) {
    let actors: Vec<ActorTarget> = players
        .iter()
        .filter(|(_, _, health)| !health.is_dead())
        .map(|(player, position, _)| ActorTarget {
            id: peer_id_to_u64(player.client_id),
            team: player.team,
            position: position.0,
        })
        .collect();

    for (entity, projectile, prev_pos, transform) in projectiles.iter() {
        let start = prev_pos.0;
        let end = transform.translation;
        let segment = end - start;
        let length = segment.length();
        if length < 1e-4 {
            continue;
        }

        let Some(candidate) = sweep_scene(
            start,
            segment / length,
            length,
            projectile.shooter_id,
            &actors,
            &blocking,
        )
        .into_iter()
        .next() else {
            continue;
        };

        let stats = projectile.kind.stats();
        let distance = (candidate.point - projectile.spawn_position).length();

        let impact = match candidate.target {
            shared::HitTarget::Actor { id, team, zone } => {
                let relation = TargetRelation {
                    attacker_id: projectile.shooter_id,
                    attacker_team: projectile.shooter_team,
                    target_id: id,
                    target_team: team,
                };
                let event = damage::resolve_hit(
                    stats.base_damage,
                    stats.range,
                    distance,
                    Some(zone),
                    &relation,
                    rules.friendly_fire,
                    DamageKind::Projectile,
                    candidate.point,
                    candidate.normal,
                );
                if let Some(event) = &event {
                    for (player, _, mut health) in players.iter_mut() {
                        if peer_id_to_u64(player.client_id) == id {
                            let killed = health.apply_damage(event.amount);
                            info!(
                                "projectile hit: {} -> {} ({:?}) for {} damage (kill: {})",
                                projectile.shooter_id, id, zone, event.amount, killed
                            );
                            break;
                        }
                    }
                }
                ImpactBroadcast {
                    shooter_id: projectile.shooter_id,
                    point: candidate.point,
                    normal: candidate.normal,
                    surface: ImpactSurface::Actor,
                    is_body_hit: true,
                    is_critical: event.as_ref().is_some_and(|e| e.critical),
                }
            }
            shared::HitTarget::Environment => {
                let surface = classify_surface(candidate.normal);
                spawn_impact_mark(
                    &mut commands,
                    &mut pool,
                    candidate.point,
                    candidate.normal,
                    surface,
                    time.elapsed_secs(),
                );
                ImpactBroadcast {
                    shooter_id: projectile.shooter_id,
                    point: candidate.point,
                    normal: candidate.normal,
                    surface,
                    is_body_hit: false,
                    is_critical: false,
                }
            }
        };

        for mut sender in impact_senders.iter_mut() {
            sender.send::<CombatChannel>(impact.clone());
        }

        pool.release(&mut commands, entity);
    }
}

/// Reclaim projectiles that outlived their flight time or fell out of the
/// world without hitting anything.
pub fn expire_projectiles(
    mut commands: Commands,
    time: Res<Time>,
    mut pool: ResMut<EntityPool>,
    projectiles: Query<(Entity, &Projectile, &Transform), Without<PoolInactive>>,
) {
    let now = time.elapsed_secs();
    for (entity, projectile, transform) in projectiles.iter() {
        if ballistics::is_expired(projectile.spawn_time, now) || transform.translation.y < -50.0 {
            pool.release(&mut commands, entity);
        }
    }
}

/// Reclaim tracers and impact marks whose display window has passed.
pub fn expire_effect_proxies(
    mut commands: Commands,
    time: Res<Time>,
    mut pool: ResMut<EntityPool>,
    tracers: Query<(Entity, &Tracer), Without<PoolInactive>>,
    marks: Query<(Entity, &ImpactMark), Without<PoolInactive>>,
) {
    let now = time.elapsed_secs();
    for (entity, tracer) in tracers.iter() {
        if now - tracer.spawn_time >= TRACER_LIFETIME {
            pool.release(&mut commands, entity);
        }
    }
    for (entity, mark) in marks.iter() {
        if now - mark.spawn_time >= IMPACT_MARK_LIFETIME {
            pool.release(&mut commands, entity);
        }
    }
}

/// Map pool activation onto replication. The pool only toggles the
/// `NetworkPresence` marker; this is the one place that knows what marker
/// presence means on the authoritative side.
pub fn sync_pool_replication(
    mut commands: Commands,
    activated: Query<Entity, Added<NetworkPresence>>,
    mut deactivated: RemovedComponents<NetworkPresence>,
) {
    for entity in activated.iter() {
        commands
            .entity(entity)
            .insert(Replicate::new(ReplicationMode::SingleServer(NetworkTarget::All)));
    }
    for entity in deactivated.read() {
        if let Ok(mut entry) = commands.get_entity(entity) {
            entry.remove::<Replicate>();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::ecs::system::RunSystemOnce;
    use shared::PooledKind;
    use std::time::Duration;

    fn spawn_proxies(mut commands: Commands, mut pool: ResMut<EntityPool>) {
        let tracer = pool.acquire(&mut commands, PooledKind::Tracer, Vec3::ZERO, Quat::IDENTITY);
        commands.entity(tracer).insert(Tracer {
            shooter_id: 1,
            start: Vec3::ZERO,
            end: Vec3::NEG_Z * 10.0,
            spawn_time: 0.0,
        });
        spawn_impact_mark(
            &mut commands,
            &mut pool,
            Vec3::NEG_Z * 10.0,
            Vec3::Z,
            ImpactSurface::Wall,
            0.0,
        );
    }

    #[test]
    fn effect_proxies_return_to_pool_after_their_lifetime() {
        let mut world = World::new();
        world.insert_resource(EntityPool::new(true));
        world.insert_resource(Time::<()>::default());
        world.run_system_once(spawn_proxies).unwrap();

        // Tracer window is much shorter than the mark's.
        world
            .resource_mut::<Time>()
            .advance_by(Duration::from_secs_f32(TRACER_LIFETIME + 0.05));
        world.run_system_once(expire_effect_proxies).unwrap();
        let pool = world.resource::<EntityPool>();
        assert_eq!(pool.idle_count(PooledKind::Tracer), 1);
        assert_eq!(pool.idle_count(PooledKind::ImpactMark), 0);

        world
            .resource_mut::<Time>()
            .advance_by(Duration::from_secs_f32(IMPACT_MARK_LIFETIME));
        world.run_system_once(expire_effect_proxies).unwrap();
        assert_eq!(world.resource::<EntityPool>().idle_count(PooledKind::ImpactMark), 1);
    }
}
