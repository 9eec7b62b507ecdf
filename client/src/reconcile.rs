//! Server reconciliation
//!
//! Authoritative combat traffic lands here: seed syncs feed the next
//! prediction, ammo syncs refresh the local mirror, impacts overwrite
//! whatever was predicted, and rejects clear the pending prediction without
//! any rollback (nothing durable was committed client-side).

use bevy::prelude::*;
use lightyear::prelude::*;
use std::collections::HashMap;

use shared::weapons::ballistics;
use shared::{
    AmmoSync, FireEffectBroadcast, ImpactBroadcast, ImpactMark, Projectile, ProjectileVelocity,
    RejectFire, SpreadSeedSync, Tracer, FIXED_TIMESTEP_HZ,
};

use crate::GameClient;

/// Latest spread seed per shooter, for predicting the next shot
#[derive(Resource, Default)]
pub struct LatestSeeds {
    per_shooter: HashMap<u64, u64>,
}

impl LatestSeeds {
    pub fn for_shooter(&self, shooter_id: u64) -> Option<u64> {
        self.per_shooter.get(&shooter_id).copied()
    }
}

/// Read-only ammo mirror, refreshed by `AmmoSync`
#[derive(Resource, Default)]
pub struct AmmoMirror {
    per_shooter: HashMap<u64, (u32, u32)>,
}

impl AmmoMirror {
    /// (magazine, reserve) for a shooter, if the server has synced it
    pub fn for_shooter(&self, shooter_id: u64) -> Option<(u32, u32)> {
        self.per_shooter.get(&shooter_id).copied()
    }
}

/// The impact the local controller predicted for its last shot
#[derive(Clone, Copy, Debug)]
pub struct PredictedImpact {
    pub point: Vec3,
    pub normal: Vec3,
    pub body_hit: bool,
}

/// Holds the pending prediction until the server confirms or rejects it
#[derive(Resource, Default)]
pub struct PredictedImpacts {
    pub last: Option<PredictedImpact>,
}

/// Apply incoming spread seeds. Ordering with the matching impact is
/// guaranteed by the channel, so by the time an impact arrives the seed that
/// produced it has been applied.
pub fn receive_seed_sync(
    mut seeds: ResMut<LatestSeeds>,
    mut client: Query<&mut MessageReceiver<SpreadSeedSync>, With<GameClient>>,
) {
    for mut receiver in client.iter_mut() {
        for sync in receiver.receive() {
            seeds.per_shooter.insert(sync.shooter_id, sync.seed);
        }
    }
}

/// Refresh the ammo mirror from authoritative syncs.
pub fn receive_ammo_sync(
    mut ammo: ResMut<AmmoMirror>,
    mut client: Query<&mut MessageReceiver<AmmoSync>, With<GameClient>>,
) {
    for mut receiver in client.iter_mut() {
        for sync in receiver.receive() {
            ammo.per_shooter
                .insert(sync.shooter_id, (sync.current, sync.reserve));
        }
    }
}

/// Authoritative impacts replace the local prediction outright.
pub fn receive_impacts(
    mut predicted: ResMut<PredictedImpacts>,
    mut client: Query<&mut MessageReceiver<ImpactBroadcast>, With<GameClient>>,
) {
    for mut receiver in client.iter_mut() {
        for impact in receiver.receive() {
            if let Some(prediction) = predicted.last.take() {
                let divergence = (prediction.point - impact.point).length();
                if divergence > 0.5 {
                    debug!(
                        "predicted impact off by {:.2}m (body hit: {} -> {})",
                        divergence, prediction.body_hit, impact.is_body_hit
                    );
                }
            }
            // Effect spawning hooks off here: surface kind, crit flag, point
            // and normal are all authoritative.
            debug!(
                "impact from {} on {:?} at {:?} (critical: {})",
                impact.shooter_id, impact.surface, impact.point, impact.is_critical
            );
        }
    }
}

/// A reject clears the pending prediction. Nothing was committed locally,
/// so there is no state to roll back.
pub fn receive_rejects(
    mut predicted: ResMut<PredictedImpacts>,
    mut client: Query<&mut MessageReceiver<RejectFire>, With<GameClient>>,
) {
    for mut receiver in client.iter_mut() {
        for _reject in receiver.receive() {
            debug!("fire request rejected, dropping prediction");
            predicted.last = None;
        }
    }
}

/// Muzzle flash notifications for every shooter, local player included.
pub fn receive_fire_effects(
    mut client: Query<&mut MessageReceiver<FireEffectBroadcast>, With<GameClient>>,
) {
    for mut receiver in client.iter_mut() {
        for effect in receiver.receive() {
            debug!(
                "muzzle flash for {} at {:?}",
                effect.shooter_id, effect.muzzle_position
            );
        }
    }
}

/// Render hook for replicated effect proxies. The server pools and expires
/// them; the client only draws what exists.
pub fn observe_effect_proxies(
    new_tracers: Query<&Tracer, Added<Tracer>>,
    new_marks: Query<&ImpactMark, Added<ImpactMark>>,
) {
    for tracer in new_tracers.iter() {
        debug!(
            "tracer from {} ({:?} -> {:?})",
            tracer.shooter_id, tracer.start, tracer.end
        );
    }
    for mark in new_marks.iter() {
        debug!("impact mark on {:?} at {:?}", mark.surface, mark.point);
    }
}

/// Give replicated projectiles a transform to render from.
pub fn attach_projectile_transforms(
    mut commands: Commands,
    new_projectiles: Query<(Entity, &Projectile), (Added<Projectile>, Without<Transform>)>,
) {
    for (entity, projectile) in new_projectiles.iter() {
        commands
            .entity(entity)
            .insert(Transform::from_translation(projectile.spawn_position));
    }
}

/// Replay projectile flight locally between replication updates with the
/// same integrator the server runs, so the visual arc matches.
pub fn extrapolate_projectiles(
    mut projectiles: Query<(&mut ProjectileVelocity, &mut Transform), With<Projectile>>,
) {
    let dt = 1.0 / FIXED_TIMESTEP_HZ as f32;
    for (mut velocity, mut transform) in projectiles.iter_mut() {
        let (new_pos, new_vel) =
            ballistics::step_projectile(transform.translation, velocity.0, dt);
        transform.translation = new_pos;
        velocity.0 = new_vel;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirrors_return_latest_value() {
        let mut seeds = LatestSeeds::default();
        seeds.per_shooter.insert(9, 111);
        seeds.per_shooter.insert(9, 222);
        assert_eq!(seeds.for_shooter(9), Some(222));
        assert_eq!(seeds.for_shooter(1), None);

        let mut ammo = AmmoMirror::default();
        ammo.per_shooter.insert(9, (29, 90));
        assert_eq!(ammo.for_shooter(9), Some((29, 90)));
    }
}
