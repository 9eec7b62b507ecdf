//! Projectile flight integration
//!
//! Shared between the authoritative simulation and the client-side visual
//! replay so both trace the same arc. Only the server resolves hits.

use bevy::prelude::*;

/// Gravity acceleration for projectiles (m/s²)
pub const PROJECTILE_GRAVITY: f32 = -9.81;

/// Maximum projectile lifetime in seconds before it is reclaimed
pub const PROJECTILE_MAX_LIFETIME: f32 = 6.0;

/// Radius of the swept collision volume (m)
pub const PROJECTILE_SWEEP_RADIUS: f32 = 0.15;

/// Advance a projectile by one tick.
///
/// Returns (new_position, new_velocity). Position integrates the current
/// velocity; gravity is applied to the velocity afterwards, for the next
/// tick.
pub fn step_projectile(position: Vec3, velocity: Vec3, dt: f32) -> (Vec3, Vec3) {
    let new_pos = position + velocity * dt;
    let mut new_vel = velocity;
    new_vel.y += PROJECTILE_GRAVITY * dt;
    (new_pos, new_vel)
}

/// Lifetime check; expired projectiles go back to the pool even without a hit.
pub fn is_expired(spawn_time: f32, now: f32) -> bool {
    now - spawn_time > PROJECTILE_MAX_LIFETIME
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrates_position_before_gravity() {
        let vel = Vec3::new(0.0, 0.0, -20.0);
        let (pos, new_vel) = step_projectile(Vec3::ZERO, vel, 0.5);
        // First tick moves along the undropped velocity.
        assert_eq!(pos, Vec3::new(0.0, 0.0, -10.0));
        // Gravity only shows up in the velocity for the next tick.
        assert!(new_vel.y < 0.0);
        assert_eq!(new_vel.z, -20.0);
    }

    #[test]
    fn arc_drops_over_time() {
        let mut pos = Vec3::new(0.0, 1.5, 0.0);
        let mut vel = Vec3::new(0.0, 2.0, -28.0);
        let dt = 1.0 / 60.0;
        for _ in 0..120 {
            let (p, v) = step_projectile(pos, vel, dt);
            pos = p;
            vel = v;
        }
        assert!(vel.y < 0.0);
        assert!(pos.z < -50.0);
    }

    #[test]
    fn lifetime_expiry() {
        assert!(!is_expired(10.0, 10.0 + PROJECTILE_MAX_LIFETIME - 0.1));
        assert!(is_expired(10.0, 10.0 + PROJECTILE_MAX_LIFETIME + 0.1));
    }
}
