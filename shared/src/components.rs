//! Shared ECS components used by both server and client

use bevy::prelude::*;
use lightyear::prelude::PeerId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::protocol::ImpactSurface;
use crate::weapons::WeaponKind;

// =============================================================================
// ACTORS
// =============================================================================

/// Standing height of the actor capsule (m)
pub const ACTOR_HEIGHT: f32 = 1.8;
/// Radius of the actor body capsule (m)
pub const ACTOR_RADIUS: f32 = 0.4;
/// Radius of the head sphere sitting on top of the capsule (m)
pub const ACTOR_HEAD_RADIUS: f32 = 0.25;
/// Muzzle height above the actor origin (m)
pub const MUZZLE_HEIGHT: f32 = ACTOR_HEIGHT * 0.8;

pub const SPAWN_POSITION: Vec3 = Vec3::new(0.0, 0.0, 0.0);

/// Marker component for player-controlled actors
#[derive(Component, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Player {
    pub client_id: PeerId,
    pub team: u8,
}

/// Actor position (feet), replicated across the network
#[derive(Component, Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct PlayerPosition(pub Vec3);

/// Actor look rotation, replicated across the network.
///
/// This is the authoritative forward used for aim-cone and line-of-sight
/// checks; client-submitted directions never replace it for hitscan.
#[derive(Component, Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct PlayerRotation {
    pub yaw: f32,
    pub pitch: f32,
}

impl PlayerRotation {
    /// World-space forward vector for this rotation
    pub fn forward(&self) -> Vec3 {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        Vec3::new(-sin_yaw * cos_pitch, sin_pitch, -cos_yaw * cos_pitch).normalize()
    }
}

/// Marker for the local player (client-side only)
#[derive(Component)]
pub struct LocalPlayer;

/// Capsule segment endpoints for an actor standing at `pos` (feet)
pub fn actor_capsule_endpoints(pos: Vec3) -> (Vec3, Vec3) {
    (
        pos + Vec3::new(0.0, ACTOR_RADIUS, 0.0),
        pos + Vec3::new(0.0, ACTOR_HEIGHT - ACTOR_HEAD_RADIUS * 2.0, 0.0),
    )
}

/// Center of the head sphere for an actor standing at `pos`
pub fn actor_head_center(pos: Vec3) -> Vec3 {
    pos + Vec3::new(0.0, ACTOR_HEIGHT - ACTOR_HEAD_RADIUS, 0.0)
}

/// Muzzle position for an actor standing at `pos`
pub fn actor_muzzle(pos: Vec3) -> Vec3 {
    pos + Vec3::new(0.0, MUZZLE_HEIGHT, 0.0)
}

// =============================================================================
// MATCH PHASE
// =============================================================================

/// Server-authoritative match phase, replicated to clients.
///
/// The fire-control pipeline consults this gate before accepting any fire
/// action; nothing else about the phase machine is modeled here.
#[derive(Component, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MatchPhase {
    #[default]
    Warmup,
    Combat,
    Ended,
}

impl MatchPhase {
    pub fn is_combat_allowed(&self) -> bool {
        matches!(self, MatchPhase::Combat)
    }
}

// =============================================================================
// HEALTH
// =============================================================================

/// Health component for damageable entities.
///
/// Damage amounts are integers by the time they reach this; all rounding
/// happens in the damage resolver.
#[derive(Component, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Health {
    pub current: i32,
    pub max: i32,
}

impl Default for Health {
    fn default() -> Self {
        Self { current: 100, max: 100 }
    }
}

impl Health {
    pub fn new(max: i32) -> Self {
        Self { current: max, max }
    }

    /// Apply damage; returns true when this kills the target
    pub fn apply_damage(&mut self, amount: u32) -> bool {
        self.current = (self.current - amount as i32).max(0);
        self.current == 0
    }

    pub fn is_dead(&self) -> bool {
        self.current == 0
    }
}

// =============================================================================
// WEAPONS
// =============================================================================

/// Currently equipped weapon instance.
///
/// Ammo, cooldown, and the reload deadline are owned by the server; clients
/// hold read-only mirrors updated through `AmmoSync`.
#[derive(Component, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EquippedWeapon {
    pub kind: WeaponKind,
    pub ammo_in_mag: u32,
    pub reserve_ammo: u32,
    /// Earliest time the next shot may be accepted (game time, seconds)
    pub next_fire_time: f32,
    /// Reload deadline, checked each simulation tick; cleared on completion
    /// or cancelled by a weapon switch
    pub reloading_until: Option<f32>,
    pub aiming: bool,
    /// Magazine/reserve state of kinds not currently equipped. Switching
    /// stows the outgoing weapon and restores the incoming one, so cycling
    /// weapons never refills a magazine.
    stowed: HashMap<WeaponKind, (u32, u32)>,
}

impl Default for EquippedWeapon {
    fn default() -> Self {
        Self::new(WeaponKind::default())
    }
}

impl EquippedWeapon {
    pub fn new(kind: WeaponKind) -> Self {
        let stats = kind.stats();
        Self {
            kind,
            ammo_in_mag: stats.magazine_size,
            reserve_ammo: stats.initial_reserve,
            next_fire_time: 0.0,
            reloading_until: None,
            aiming: false,
            stowed: HashMap::new(),
        }
    }

    pub fn is_reloading(&self) -> bool {
        self.reloading_until.is_some()
    }

    /// Local resource check used by the optimistic client path: ammo and
    /// reload only. Cooldown is deliberately not part of this.
    pub fn has_resources(&self) -> bool {
        self.ammo_in_mag > 0 && !self.is_reloading()
    }

    /// Full authoritative check: resources plus the per-weapon cooldown
    pub fn can_fire(&self, now: f32) -> bool {
        self.has_resources() && now >= self.next_fire_time
    }

    /// Consume one round and advance the cooldown. Caller must have checked
    /// `can_fire`; a redundant guard keeps ammo from ever going negative.
    pub fn commit_fire(&mut self, now: f32) {
        if self.ammo_in_mag == 0 {
            return;
        }
        self.ammo_in_mag -= 1;
        self.next_fire_time = now + self.kind.fire_cooldown();
    }

    /// Start a reload. Returns false when there is nothing to do (magazine
    /// full, no reserve, or already reloading).
    pub fn begin_reload(&mut self, now: f32) -> bool {
        let stats = self.kind.stats();
        if self.is_reloading() || self.ammo_in_mag >= stats.magazine_size || self.reserve_ammo == 0
        {
            return false;
        }
        self.reloading_until = Some(now + stats.reload_time);
        true
    }

    /// Complete a reload whose deadline has passed: move rounds from reserve
    /// into the magazine, capped by magazine size.
    pub fn finish_reload(&mut self) {
        self.reloading_until = None;
        let stats = self.kind.stats();
        let needed = stats.magazine_size - self.ammo_in_mag;
        let taken = needed.min(self.reserve_ammo);
        self.ammo_in_mag += taken;
        self.reserve_ammo -= taken;
    }

    pub fn cancel_reload(&mut self) {
        self.reloading_until = None;
    }

    /// Swap to another weapon kind. Cancels any in-flight reload. Ammo is
    /// stowed per kind and restored on the way back; the cooldown carries
    /// over, so switching never grants rounds or an earlier shot.
    pub fn switch_to(&mut self, kind: WeaponKind) {
        if kind == self.kind {
            return;
        }
        self.cancel_reload();
        self.stowed.insert(self.kind, (self.ammo_in_mag, self.reserve_ammo));

        let (mag, reserve) = self.stowed.remove(&kind).unwrap_or_else(|| {
            let stats = kind.stats();
            (stats.magazine_size, stats.initial_reserve)
        });
        self.kind = kind;
        self.ammo_in_mag = mag;
        self.reserve_ammo = reserve;
        self.aiming = false;
    }

    /// Spread cone for the current stance
    pub fn current_spread(&self) -> f32 {
        let stats = self.kind.stats();
        if self.aiming {
            stats.spread_aim
        } else {
            stats.spread_hip
        }
    }
}

// =============================================================================
// PROJECTILES
// =============================================================================

/// Arc-traveling projectile, server authoritative, replicated to clients
#[derive(Component, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Projectile {
    /// Shooter id; the projectile never collides with its own shooter
    pub shooter_id: u64,
    pub shooter_team: u8,
    pub kind: WeaponKind,
    /// Where the projectile was launched (for damage falloff)
    pub spawn_position: Vec3,
    /// Launch time (game time, seconds)
    pub spawn_time: f32,
}

/// Projectile velocity, updated each physics tick
#[derive(Component, Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct ProjectileVelocity(pub Vec3);

/// Previous tick position, kept for the segment sweep (not replicated)
#[derive(Component, Clone, Debug, Default)]
pub struct ProjectilePrevPosition(pub Vec3);

// =============================================================================
// EFFECT PROXIES
// =============================================================================

/// How long a tracer stays up before returning to the pool (s)
pub const TRACER_LIFETIME: f32 = 0.1;
/// How long an impact mark stays up before returning to the pool (s)
pub const IMPACT_MARK_LIFETIME: f32 = 4.0;

/// Pooled hitscan tracer line, spawned per accepted shot and replicated.
/// Clients draw it; the server reclaims it after `TRACER_LIFETIME`.
#[derive(Component, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Tracer {
    pub shooter_id: u64,
    pub start: Vec3,
    pub end: Vec3,
    pub spawn_time: f32,
}

/// Pooled surface decal proxy at an environment impact point, replicated
#[derive(Component, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ImpactMark {
    pub surface: ImpactSurface,
    pub point: Vec3,
    pub normal: Vec3,
    pub spawn_time: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weapons::WeaponKind;

    #[test]
    fn ammo_never_negative_across_fires() {
        let mut weapon = EquippedWeapon::new(WeaponKind::Carbine);
        let initial = weapon.ammo_in_mag;
        let cooldown = weapon.kind.fire_cooldown();

        let mut now = 0.0;
        let mut accepted = 0u32;
        for _ in 0..(initial + 10) {
            if weapon.can_fire(now) {
                weapon.commit_fire(now);
                accepted += 1;
            }
            now += cooldown;
        }

        assert_eq!(accepted, initial);
        assert_eq!(weapon.ammo_in_mag, 0);
    }

    #[test]
    fn magazine_scenario_thirty_one_pulls() {
        let mut weapon = EquippedWeapon::new(WeaponKind::Carbine);
        assert_eq!(weapon.kind.stats().magazine_size, 30);
        weapon.reserve_ammo = 0;

        let cooldown = weapon.kind.fire_cooldown();
        let mut successes = 0;
        for i in 0..31 {
            let now = i as f32 * cooldown;
            if weapon.can_fire(now) {
                weapon.commit_fire(now);
                successes += 1;
            }
        }
        assert_eq!(successes, 30);
        // Shot 31: empty, nothing changes.
        assert_eq!(weapon.ammo_in_mag, 0);
        assert!(!weapon.has_resources());
    }

    #[test]
    fn cooldown_rejects_early_fire() {
        let mut weapon = EquippedWeapon::new(WeaponKind::Marksman);
        assert!(weapon.can_fire(0.0));
        weapon.commit_fire(0.0);
        assert!(!weapon.can_fire(weapon.kind.fire_cooldown() * 0.5));
        assert!(weapon.can_fire(weapon.kind.fire_cooldown()));
    }

    #[test]
    fn reload_moves_reserve_capped_by_magazine() {
        let mut weapon = EquippedWeapon::new(WeaponKind::Carbine);
        weapon.ammo_in_mag = 5;
        weapon.reserve_ammo = 100;
        assert!(weapon.begin_reload(1.0));
        assert!(weapon.is_reloading());
        assert!(!weapon.has_resources());
        weapon.finish_reload();
        assert_eq!(weapon.ammo_in_mag, 30);
        assert_eq!(weapon.reserve_ammo, 75);
    }

    #[test]
    fn reload_with_short_reserve() {
        let mut weapon = EquippedWeapon::new(WeaponKind::Carbine);
        weapon.ammo_in_mag = 0;
        weapon.reserve_ammo = 7;
        assert!(weapon.begin_reload(0.0));
        weapon.finish_reload();
        assert_eq!(weapon.ammo_in_mag, 7);
        assert_eq!(weapon.reserve_ammo, 0);
    }

    #[test]
    fn switch_cancels_reload() {
        let mut weapon = EquippedWeapon::new(WeaponKind::Carbine);
        weapon.ammo_in_mag = 0;
        assert!(weapon.begin_reload(0.0));
        weapon.switch_to(WeaponKind::Marksman);
        assert!(!weapon.is_reloading());
        assert_eq!(weapon.kind, WeaponKind::Marksman);
    }

    #[test]
    fn switch_cycle_preserves_ammo_and_cooldown() {
        let mut weapon = EquippedWeapon::new(WeaponKind::Carbine);
        weapon.commit_fire(0.0);
        weapon.commit_fire(0.2);
        let carbine_state = (weapon.ammo_in_mag, weapon.reserve_ammo);

        weapon.switch_to(WeaponKind::Marksman);
        weapon.commit_fire(1.0);
        let marksman_mag = weapon.ammo_in_mag;
        let cooldown_after = weapon.next_fire_time;

        // Cycling back and forth restores the stowed state exactly; no
        // magazine refill, no cooldown reset.
        weapon.switch_to(WeaponKind::Carbine);
        assert_eq!((weapon.ammo_in_mag, weapon.reserve_ammo), carbine_state);
        assert_eq!(weapon.next_fire_time, cooldown_after);
        assert!(!weapon.can_fire(1.0));

        weapon.switch_to(WeaponKind::Marksman);
        assert_eq!(weapon.ammo_in_mag, marksman_mag);
    }

    #[test]
    fn switch_to_same_kind_is_a_no_op() {
        let mut weapon = EquippedWeapon::new(WeaponKind::Carbine);
        weapon.commit_fire(0.0);
        let before = weapon.clone();
        weapon.switch_to(WeaponKind::Carbine);
        assert_eq!(weapon, before);
    }

    #[test]
    fn health_floors_at_zero() {
        let mut health = Health::new(30);
        assert!(!health.apply_damage(20));
        assert!(health.apply_damage(50));
        assert_eq!(health.current, 0);
        assert!(health.is_dead());
    }

    #[test]
    fn rotation_forward_matches_axes() {
        let level = PlayerRotation { yaw: 0.0, pitch: 0.0 };
        assert!((level.forward() - Vec3::NEG_Z).length() < 1e-6);

        let up = PlayerRotation { yaw: 0.0, pitch: std::f32::consts::FRAC_PI_2 };
        assert!((up.forward() - Vec3::Y).length() < 1e-5);
    }
}
