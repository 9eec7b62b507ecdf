//! Damage resolution
//!
//! Converts a validated hit candidate into a damage event: zone multiplier,
//! range falloff, then team rules. Environment hits produce no damage but
//! still get an impact broadcast (handled by the caller).

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// Friendly-fire damage is always scaled down, never dealt at full value.
pub const FRIENDLY_FIRE_MULTIPLIER: f32 = 0.5;

/// Body zones for hit detection with different damage multipliers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HitZone {
    Head,
    Chest,
    Stomach,
    Limb,
}

impl HitZone {
    /// Damage multiplier for this zone
    pub fn multiplier(&self) -> f32 {
        match self {
            HitZone::Head => 2.5,
            HitZone::Chest => 1.0,
            HitZone::Stomach => 0.9,
            HitZone::Limb => 0.75,
        }
    }

    /// Head hits flag the damage event as critical
    pub fn is_critical(&self) -> bool {
        matches!(self, HitZone::Head)
    }

    /// Classify a hit by its height on the body capsule.
    /// `relative_height` is 0.0 at the feet, 1.0 at the top of the head.
    pub fn from_relative_height(relative_height: f32) -> Self {
        if relative_height > 0.85 {
            HitZone::Head
        } else if relative_height > 0.6 {
            HitZone::Chest
        } else if relative_height > 0.4 {
            HitZone::Stomach
        } else {
            HitZone::Limb
        }
    }
}

impl Default for HitZone {
    fn default() -> Self {
        HitZone::Chest
    }
}

/// What produced the damage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DamageKind {
    Hitscan,
    Projectile,
}

/// A resolved damage event, delivered once to the health collaborator.
#[derive(Clone, Debug, PartialEq)]
pub struct DamageEvent {
    /// Final integer damage
    pub amount: u32,
    pub attacker_id: u64,
    pub kind: DamageKind,
    pub point: Vec3,
    pub normal: Vec3,
    pub critical: bool,
}

/// Attacker/target identity used by the team rules
#[derive(Clone, Copy, Debug)]
pub struct TargetRelation {
    pub attacker_id: u64,
    pub attacker_team: u8,
    pub target_id: u64,
    pub target_team: u8,
}

/// Distance-based falloff: full damage at the muzzle, zero at max range.
pub fn falloff(distance: f32, range: f32) -> f32 {
    if range <= 0.0 {
        return 0.0;
    }
    (1.0 - distance / range).clamp(0.0, 1.0)
}

/// Team scaling. `None` means the hit is rejected outright.
///
/// Self-damage is never allowed. Same-team damage is allowed only when
/// friendly fire is enabled, and then always at the reduced multiplier.
pub fn team_factor(relation: &TargetRelation, friendly_fire: bool) -> Option<f32> {
    if relation.attacker_id == relation.target_id {
        return None;
    }
    if relation.attacker_team == relation.target_team {
        if friendly_fire {
            Some(FRIENDLY_FIRE_MULTIPLIER)
        } else {
            None
        }
    } else {
        Some(1.0)
    }
}

/// Resolve a hit on a damageable target into a damage event.
///
/// `zone` is `None` for plain damageable targets without hit-zone capability
/// (multiplier 1.0, never critical). Returns `None` when the team rules
/// reject the hit or the rounded amount is zero (out of range).
pub fn resolve_hit(
    base_damage: f32,
    range: f32,
    distance: f32,
    zone: Option<HitZone>,
    relation: &TargetRelation,
    friendly_fire: bool,
    kind: DamageKind,
    point: Vec3,
    normal: Vec3,
) -> Option<DamageEvent> {
    let team = team_factor(relation, friendly_fire)?;
    let zone_mult = zone.map_or(1.0, |z| z.multiplier());
    let amount = (base_damage * zone_mult * falloff(distance, range) * team).round() as u32;
    if amount == 0 {
        return None;
    }
    Some(DamageEvent {
        amount,
        attacker_id: relation.attacker_id,
        kind,
        point,
        normal,
        critical: zone.is_some_and(|z| z.is_critical()),
    })
}
