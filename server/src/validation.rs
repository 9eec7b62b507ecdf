//! Anti-cheat validation for client-reported hit claims
//!
//! Checks run in a fixed order and the first failure wins. Failures are
//! logged server-side and the claim is dropped silently; the client only
//! ever sees the generic reject/ammo-sync traffic.

use bevy::prelude::*;

use shared::raycast::{sweep_scene, BlockingGeometry, HitTarget};
use shared::weapons::damage::HitZone;
use shared::{actor_muzzle, ActorTarget, EquippedWeapon, HitClaim};

/// Maximum angle between the authoritative forward and the claimed hit
/// direction (cosine threshold; 90 degrees).
const AIM_CONE_MIN_DOT: f32 = 0.0;

/// Why a hit claim was dropped. Never serialized to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationError {
    ConfigurationMissing,
    RateLimitViolation,
    ResourceViolation,
    RangeViolation,
    AngleViolation,
    LineOfSightViolation,
}

/// A claim that survived the full check sequence
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ValidatedClaim {
    /// Null target: environment hit, resolved impact-only
    Environment { point: Vec3, normal: Vec3 },
    /// The claimed target was reachable; zone/point come from the server's
    /// own recast toward the claimed point, not from the client data.
    ActorHit {
        target_id: u64,
        target_team: u8,
        zone: HitZone,
        point: Vec3,
        normal: Vec3,
        distance: f32,
    },
}

/// Everything the validator may consult about the shooter and the scene
pub struct ClaimContext<'a> {
    pub now: f32,
    pub shooter_id: u64,
    /// Authoritative feet position of the shooter
    pub shooter_position: Vec3,
    /// Authoritative forward, never the client-submitted one
    pub shooter_forward: Vec3,
    pub weapon: Option<&'a EquippedWeapon>,
    pub actors: &'a [ActorTarget],
    pub blocking: &'a BlockingGeometry,
}

/// Run the fixed validation sequence on one claim.
pub fn validate_hit_claim(
    claim: &HitClaim,
    ctx: &ClaimContext,
) -> Result<ValidatedClaim, ValidationError> {
    // 1. Null target: environment hit, skip every remaining check.
    let Some(target_id) = claim.target_id else {
        return Ok(ValidatedClaim::Environment {
            point: claim.point,
            normal: claim.normal,
        });
    };

    // 2. Weapon configuration must exist.
    let weapon = ctx.weapon.ok_or(ValidationError::ConfigurationMissing)?;

    // 3. Rate.
    if ctx.now < weapon.next_fire_time {
        return Err(ValidationError::RateLimitViolation);
    }

    // 4. Ammo / reload.
    if !weapon.has_resources() {
        return Err(ValidationError::ResourceViolation);
    }

    // 5. Range.
    let stats = weapon.kind.stats();
    if claim.distance > stats.range {
        return Err(ValidationError::RangeViolation);
    }

    // 6. Aim cone against the authoritative forward.
    let origin = actor_muzzle(ctx.shooter_position);
    let to_hit = (claim.point - origin).normalize_or_zero();
    if to_hit == Vec3::ZERO || ctx.shooter_forward.normalize_or_zero().dot(to_hit) < AIM_CONE_MIN_DOT
    {
        return Err(ValidationError::AngleViolation);
    }

    // 7. Line of sight: recast from the authoritative origin toward the
    // claimed point. The claimed target must be the first candidate; the
    // scan stops on the first blocking candidate either way, which matches
    // the upstream ordering semantics (see tests).
    let claimed_distance = (claim.point - origin).length();
    let candidates = sweep_scene(
        origin,
        to_hit,
        claimed_distance + shared::ACTOR_RADIUS,
        ctx.shooter_id,
        ctx.actors,
        ctx.blocking,
    );

    for candidate in candidates {
        return match candidate.target {
            HitTarget::Actor { id, team, zone } if id == target_id => Ok(ValidatedClaim::ActorHit {
                target_id: id,
                target_team: team,
                zone,
                point: candidate.point,
                normal: candidate.normal,
                distance: candidate.distance,
            }),
            _ => {
                debug!(
                    "hit claim blocked: candidate at {:.2}m ahead of claimed target ({:.2}m)",
                    candidate.distance, claimed_distance
                );
                Err(ValidationError::LineOfSightViolation)
            }
        };
    }

    // Nothing between origin and the claimed point matched the target.
    Err(ValidationError::LineOfSightViolation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::raycast::Aabb;
    use shared::weapons::WeaponKind;
    use shared::actor_head_center;

    fn scene_target(z: f32) -> ActorTarget {
        ActorTarget { id: 2, team: 1, position: Vec3::new(0.0, 0.0, z) }
    }

    fn ctx<'a>(
        weapon: &'a EquippedWeapon,
        actors: &'a [ActorTarget],
        blocking: &'a BlockingGeometry,
    ) -> ClaimContext<'a> {
        ClaimContext {
            now: 10.0,
            shooter_id: 1,
            shooter_position: Vec3::ZERO,
            shooter_forward: Vec3::NEG_Z,
            weapon: Some(weapon),
            actors,
            blocking,
        }
    }

    fn claim_on(target: &ActorTarget) -> HitClaim {
        let point = actor_head_center(target.position);
        HitClaim {
            point,
            normal: Vec3::Z,
            distance: (point - actor_muzzle(Vec3::ZERO)).length(),
            target_id: Some(target.id),
        }
    }

    #[test]
    fn null_target_short_circuits_to_environment() {
        let weapon = EquippedWeapon::new(WeaponKind::Carbine);
        let blocking = BlockingGeometry::default();
        // Deliberately implausible claim data: none of the later checks run.
        let claim = HitClaim {
            point: Vec3::new(0.0, 1.0, -9999.0),
            normal: Vec3::Z,
            distance: 9999.0,
            target_id: None,
        };
        let result = validate_hit_claim(&claim, &ctx(&weapon, &[], &blocking)).unwrap();
        assert!(matches!(result, ValidatedClaim::Environment { .. }));
    }

    #[test]
    fn missing_configuration_rejected() {
        let blocking = BlockingGeometry::default();
        let target = scene_target(-10.0);
        let actors = [target];
        let weapon = EquippedWeapon::default();
        let mut context = ctx(&weapon, &actors, &blocking);
        context.weapon = None;
        assert_eq!(
            validate_hit_claim(&claim_on(&target), &context),
            Err(ValidationError::ConfigurationMissing)
        );
    }

    #[test]
    fn cooldown_violation_rejected_regardless_of_claim() {
        let mut weapon = EquippedWeapon::new(WeaponKind::Carbine);
        weapon.next_fire_time = 11.0; // ctx.now = 10.0
        let blocking = BlockingGeometry::default();
        let target = scene_target(-10.0);
        let actors = [target];
        assert_eq!(
            validate_hit_claim(&claim_on(&target), &ctx(&weapon, &actors, &blocking)),
            Err(ValidationError::RateLimitViolation)
        );
    }

    #[test]
    fn empty_magazine_rejected() {
        let mut weapon = EquippedWeapon::new(WeaponKind::Carbine);
        weapon.ammo_in_mag = 0;
        let blocking = BlockingGeometry::default();
        let target = scene_target(-10.0);
        let actors = [target];
        assert_eq!(
            validate_hit_claim(&claim_on(&target), &ctx(&weapon, &actors, &blocking)),
            Err(ValidationError::ResourceViolation)
        );
    }

    #[test]
    fn reloading_counts_as_resource_violation() {
        let mut weapon = EquippedWeapon::new(WeaponKind::Carbine);
        weapon.commit_fire(0.0);
        assert!(weapon.begin_reload(9.0));
        let blocking = BlockingGeometry::default();
        let target = scene_target(-10.0);
        let actors = [target];
        assert_eq!(
            validate_hit_claim(&claim_on(&target), &ctx(&weapon, &actors, &blocking)),
            Err(ValidationError::ResourceViolation)
        );
    }

    #[test]
    fn claim_beyond_weapon_range_rejected() {
        let weapon = EquippedWeapon::new(WeaponKind::Carbine);
        let range = weapon.kind.stats().range;
        let target = scene_target(-(range + 1.0));
        let actors = [target];
        let blocking = BlockingGeometry::default();
        let mut claim = claim_on(&target);
        claim.distance = range + 1.0;
        assert_eq!(
            validate_hit_claim(&claim, &ctx(&weapon, &actors, &blocking)),
            Err(ValidationError::RangeViolation)
        );
    }

    #[test]
    fn behind_the_back_claim_rejected() {
        let weapon = EquippedWeapon::new(WeaponKind::Carbine);
        // Target behind the shooter while facing -Z.
        let target = scene_target(10.0);
        let actors = [target];
        let blocking = BlockingGeometry::default();
        assert_eq!(
            validate_hit_claim(&claim_on(&target), &ctx(&weapon, &actors, &blocking)),
            Err(ValidationError::AngleViolation)
        );
    }

    #[test]
    fn synced_aim_accepts_claim_the_spawn_rotation_rejects() {
        // The aim cone must be evaluated against the rotation the client's
        // latest aim update produced. Frozen at the spawn default, every
        // legitimate sideways shot would be thrown away.
        use shared::PlayerRotation;

        let weapon = EquippedWeapon::new(WeaponKind::Carbine);
        let target = ActorTarget { id: 2, team: 1, position: Vec3::new(10.0, 0.0, 5.0) };
        let actors = [target];
        let blocking = BlockingGeometry::default();
        let mut context = ctx(&weapon, &actors, &blocking);

        assert_eq!(
            validate_hit_claim(&claim_on(&target), &context),
            Err(ValidationError::AngleViolation)
        );

        // Same angles handle_aim_updates would apply for a shooter looking
        // straight at the target.
        let aimed = PlayerRotation { yaw: (-10.0f32).atan2(-5.0), pitch: 0.0 };
        context.shooter_forward = aimed.forward();
        assert!(matches!(
            validate_hit_claim(&claim_on(&target), &context),
            Ok(ValidatedClaim::ActorHit { target_id: 2, .. })
        ));
    }

    #[test]
    fn wall_between_shooter_and_target_rejected() {
        let weapon = EquippedWeapon::new(WeaponKind::Carbine);
        let target = scene_target(-20.0);
        let actors = [target];
        let blocking = BlockingGeometry {
            volumes: vec![Aabb {
                min: Vec3::new(-5.0, 0.0, -10.5),
                max: Vec3::new(5.0, 3.0, -9.5),
            }],
        };
        assert_eq!(
            validate_hit_claim(&claim_on(&target), &ctx(&weapon, &actors, &blocking)),
            Err(ValidationError::LineOfSightViolation)
        );
    }

    #[test]
    fn clean_line_of_sight_accepted_with_server_zone() {
        let weapon = EquippedWeapon::new(WeaponKind::Carbine);
        let target = scene_target(-20.0);
        let actors = [target];
        let blocking = BlockingGeometry::default();
        let result =
            validate_hit_claim(&claim_on(&target), &ctx(&weapon, &actors, &blocking)).unwrap();
        match result {
            ValidatedClaim::ActorHit { target_id, zone, distance, .. } => {
                assert_eq!(target_id, 2);
                assert_eq!(zone, HitZone::Head);
                assert!(distance > 18.0 && distance < 21.0);
            }
            other => panic!("expected actor hit, got {other:?}"),
        }
    }

    #[test]
    fn scan_stops_on_first_candidate_even_when_target_reachable() {
        // Pins the upstream ordering semantics: a third actor standing just
        // in front of the claimed target ends the scan, even though the
        // claimed target is only barely behind them and arguably reachable.
        let weapon = EquippedWeapon::new(WeaponKind::Carbine);
        let bystander = ActorTarget { id: 3, team: 1, position: Vec3::new(0.0, 0.0, -18.5) };
        let target = scene_target(-20.0);
        let actors = [target, bystander];
        let blocking = BlockingGeometry::default();
        assert_eq!(
            validate_hit_claim(&claim_on(&target), &ctx(&weapon, &actors, &blocking)),
            Err(ValidationError::LineOfSightViolation)
        );
    }
}
