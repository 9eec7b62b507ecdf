//! Weapon system - kinds, stats, and fire modes
//!
//! Weapon variants are a closed set dispatched through one stats table;
//! there is no per-variant type hierarchy.

pub mod ballistics;
pub mod damage;
pub mod spread;
pub mod trigger;

use serde::{Deserialize, Serialize};

/// Available weapon kinds
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub enum WeaponKind {
    #[default]
    Carbine,
    Marksman,
    BurstRifle,
    Launcher,
}

/// Trigger behavior for a weapon kind
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum FireMode {
    /// One shot per trigger press
    Semi,
    /// Continuous fire while the trigger is held
    Auto,
    /// Fixed-size volley per trigger press, at the weapon's cadence
    Burst(u8),
}

/// Complete stats for a weapon kind
#[derive(Clone, Debug)]
pub struct WeaponStats {
    /// Base damage per shot, before zone/falloff/team scaling
    pub base_damage: f32,
    /// Fire rate in rounds per second
    pub fire_rate: f32,
    /// Magazine capacity
    pub magazine_size: u32,
    /// Reserve ammo granted on equip
    pub initial_reserve: u32,
    /// Reload time in seconds
    pub reload_time: f32,
    /// Spread cone scale when hip-firing
    pub spread_hip: f32,
    /// Spread cone scale when aiming
    pub spread_aim: f32,
    /// Maximum effective range in meters; damage falls to zero here
    pub range: f32,
    /// Muzzle velocity in m/s (projectile kinds only; hitscan resolves instantly)
    pub projectile_speed: f32,
    pub fire_mode: FireMode,
}

impl WeaponKind {
    /// Get the stats for this weapon kind
    pub fn stats(&self) -> WeaponStats {
        match self {
            WeaponKind::Carbine => WeaponStats {
                base_damage: 24.0,
                fire_rate: 9.0,
                magazine_size: 30,
                initial_reserve: 90,
                reload_time: 2.2,
                spread_hip: 0.030,
                spread_aim: 0.006,
                range: 120.0,
                projectile_speed: 0.0,
                fire_mode: FireMode::Auto,
            },
            WeaponKind::Marksman => WeaponStats {
                base_damage: 60.0,
                fire_rate: 1.4,
                magazine_size: 6,
                initial_reserve: 24,
                reload_time: 3.0,
                spread_hip: 0.050,
                spread_aim: 0.001,
                range: 300.0,
                projectile_speed: 0.0,
                fire_mode: FireMode::Semi,
            },
            WeaponKind::BurstRifle => WeaponStats {
                base_damage: 20.0,
                fire_rate: 12.0,
                magazine_size: 24,
                initial_reserve: 72,
                reload_time: 2.0,
                spread_hip: 0.025,
                spread_aim: 0.004,
                range: 100.0,
                projectile_speed: 0.0,
                fire_mode: FireMode::Burst(3),
            },
            WeaponKind::Launcher => WeaponStats {
                base_damage: 80.0,
                fire_rate: 0.8,
                magazine_size: 1,
                initial_reserve: 6,
                reload_time: 2.8,
                spread_hip: 0.015,
                spread_aim: 0.010,
                range: 90.0,
                projectile_speed: 28.0,
                fire_mode: FireMode::Semi,
            },
        }
    }

    /// Get the fire cooldown in seconds
    pub fn fire_cooldown(&self) -> f32 {
        1.0 / self.stats().fire_rate
    }

    /// Projectile kinds are simulated in flight; everything else is hitscan
    pub fn is_projectile(&self) -> bool {
        self.stats().projectile_speed > 0.0
    }
}

impl Default for WeaponStats {
    fn default() -> Self {
        WeaponKind::Carbine.stats()
    }
}
