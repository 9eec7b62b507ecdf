//! Deterministic per-shot spread
//!
//! The predicting client and the authoritative server must compute the exact
//! same offset from the same seed, so the generator is pinned to ChaCha8
//! seeded per shot - never a platform-default RNG.

use bevy::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Per-shot RNG seed. Generated server-side on fire acceptance and synced to
/// every participant before any dependent raycast result.
pub type SpreadSeed = u64;

/// Draw the 2D aim offset for a seed.
///
/// Two independent values in [-1, 1], scaled by the spread cone. The first
/// draw is the local-X component, the second local-Y.
pub fn spread_offset(seed: SpreadSeed, spread: f32) -> Vec2 {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let x: f32 = rng.gen_range(-1.0..=1.0);
    let y: f32 = rng.gen_range(-1.0..=1.0);
    Vec2::new(x * spread, y * spread)
}

/// Apply the seeded offset to an aim direction.
///
/// The offset lives in the direction's local X/Y plane; the result is
/// renormalized.
pub fn apply_spread(direction: Vec3, seed: SpreadSeed, spread: f32) -> Vec3 {
    let direction = direction.normalize_or_zero();
    if spread <= 0.0 {
        return direction;
    }

    let offset = spread_offset(seed, spread);

    let up = if direction.y.abs() < 0.9 { Vec3::Y } else { Vec3::X };
    let right = direction.cross(up).normalize();
    let local_up = right.cross(direction).normalize();

    (direction + right * offset.x + local_up * offset.y).normalize()
}
