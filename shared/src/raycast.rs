//! Raycast and sweep queries against actors and blocking geometry
//!
//! Used by the authoritative hitscan path, the line-of-sight validator, the
//! projectile sweep, and the client prediction raycast, so everyone agrees
//! on what a shot can hit.

use bevy::prelude::*;

use crate::components::{
    actor_capsule_endpoints, actor_head_center, ACTOR_HEAD_RADIUS, ACTOR_RADIUS,
};
use crate::weapons::damage::HitZone;
use crate::components::ACTOR_HEIGHT;

/// Axis-aligned blocking volume (walls, structures)
#[derive(Clone, Copy, Debug)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

/// Static blocking geometry for line-of-sight and impact queries
#[derive(Resource, Default, Clone, Debug)]
pub struct BlockingGeometry {
    pub volumes: Vec<Aabb>,
}

impl BlockingGeometry {
    /// The arena both sides simulate: a ground slab with its top face at
    /// y = 0 and three cover walls around the spawn area. Client prediction
    /// raycasts must run against the same volumes as the server.
    pub fn default_arena() -> Self {
        Self {
            volumes: vec![
                Aabb {
                    min: Vec3::new(-200.0, -1.0, -200.0),
                    max: Vec3::new(200.0, 0.0, 200.0),
                },
                Aabb {
                    min: Vec3::new(-10.0, 0.0, -30.5),
                    max: Vec3::new(10.0, 3.0, -29.5),
                },
                Aabb {
                    min: Vec3::new(-30.5, 0.0, -10.0),
                    max: Vec3::new(-29.5, 3.0, 10.0),
                },
                Aabb {
                    min: Vec3::new(29.5, 0.0, -10.0),
                    max: Vec3::new(30.5, 3.0, 10.0),
                },
            ],
        }
    }
}

/// A sweepable actor target
#[derive(Clone, Copy, Debug)]
pub struct ActorTarget {
    pub id: u64,
    pub team: u8,
    /// Feet position
    pub position: Vec3,
}

/// What a hit candidate struck
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum HitTarget {
    /// Walls and other non-damageable geometry
    Environment,
    /// A damageable actor, with the zone the ray entered through
    Actor { id: u64, team: u8, zone: HitZone },
}

/// One raycast/sweep result, ordered by distance from the origin
#[derive(Clone, Copy, Debug)]
pub struct HitCandidate {
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
    pub target: HitTarget,
}

impl HitCandidate {
    pub fn actor_id(&self) -> Option<u64> {
        match self.target {
            HitTarget::Actor { id, .. } => Some(id),
            HitTarget::Environment => None,
        }
    }
}

/// Sweep a ray segment against every actor (except the shooter) and all
/// blocking volumes. Returns candidates sorted by ascending distance.
pub fn sweep_scene(
    origin: Vec3,
    dir: Vec3,
    max_distance: f32,
    shooter_id: u64,
    actors: &[ActorTarget],
    blocking: &BlockingGeometry,
) -> Vec<HitCandidate> {
    let dir = dir.normalize_or_zero();
    let mut candidates = Vec::new();
    if dir == Vec3::ZERO || max_distance <= 0.0 {
        return candidates;
    }

    for actor in actors {
        if actor.id == shooter_id {
            continue;
        }
        if let Some(hit) = intersect_actor(origin, dir, max_distance, actor) {
            candidates.push(hit);
        }
    }

    for volume in &blocking.volumes {
        let end = origin + dir * max_distance;
        if let Some((t, point, normal)) = segment_aabb_intersection(origin, end, volume.min, volume.max)
        {
            candidates.push(HitCandidate {
                point,
                normal,
                distance: t * max_distance,
                target: HitTarget::Environment,
            });
        }
    }

    candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    candidates
}

/// Closest hit of a scene sweep, if any
pub fn first_hit(
    origin: Vec3,
    dir: Vec3,
    max_distance: f32,
    shooter_id: u64,
    actors: &[ActorTarget],
    blocking: &BlockingGeometry,
) -> Option<HitCandidate> {
    sweep_scene(origin, dir, max_distance, shooter_id, actors, blocking)
        .into_iter()
        .next()
}

/// Intersect one actor: head sphere first, then the body capsule.
fn intersect_actor(
    origin: Vec3,
    dir: Vec3,
    max_distance: f32,
    actor: &ActorTarget,
) -> Option<HitCandidate> {
    let head = actor_head_center(actor.position);
    if let Some((t, point)) = ray_sphere_intersection(origin, dir, max_distance, head, ACTOR_HEAD_RADIUS)
    {
        let normal = (point - head).normalize_or_zero();
        return Some(HitCandidate {
            point,
            normal,
            distance: t,
            target: HitTarget::Actor {
                id: actor.id,
                team: actor.team,
                zone: HitZone::Head,
            },
        });
    }

    let (a, b) = actor_capsule_endpoints(actor.position);
    if let Some((t, point)) = ray_capsule_intersection(origin, dir, max_distance, a, b, ACTOR_RADIUS) {
        let relative_height = ((point.y - actor.position.y) / ACTOR_HEIGHT).clamp(0.0, 1.0);
        let zone = HitZone::from_relative_height(relative_height);

        let ab = b - a;
        let s = if ab.length_squared() > 1e-6 {
            ((point - a).dot(ab) / ab.length_squared()).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let closest = a + ab * s;
        let normal = (point - closest).normalize_or_zero();

        return Some(HitCandidate {
            point,
            normal,
            distance: t,
            target: HitTarget::Actor {
                id: actor.id,
                team: actor.team,
                zone,
            },
        });
    }

    None
}

/// Ray-sphere intersection. Returns (distance, entry point).
pub fn ray_sphere_intersection(
    ray_origin: Vec3,
    ray_dir: Vec3,
    max_t: f32,
    center: Vec3,
    radius: f32,
) -> Option<(f32, Vec3)> {
    let to_center = center - ray_origin;
    let proj = to_center.dot(ray_dir);
    let closest = ray_origin + ray_dir * proj.clamp(0.0, max_t);
    let dist_sq = (closest - center).length_squared();
    if dist_sq > radius * radius {
        return None;
    }

    // Back up from the closest approach to the sphere surface.
    let back = (radius * radius - dist_sq).sqrt();
    let t = (proj.clamp(0.0, max_t) - back).max(0.0);
    if t > max_t {
        return None;
    }
    Some((t, ray_origin + ray_dir * t))
}

/// Ray-capsule intersection via closest approach between the ray segment and
/// the capsule axis. Returns (distance, approximate entry point).
pub fn ray_capsule_intersection(
    ray_origin: Vec3,
    ray_dir: Vec3,
    max_t: f32,
    capsule_a: Vec3,
    capsule_b: Vec3,
    radius: f32,
) -> Option<(f32, Vec3)> {
    let ray_end = ray_origin + ray_dir * max_t;
    let (t_ray, _t_axis, dist_sq) = closest_points_segments(ray_origin, ray_end, capsule_a, capsule_b);
    if dist_sq > radius * radius {
        return None;
    }

    let t = (t_ray * max_t - (radius * radius - dist_sq).sqrt()).clamp(0.0, max_t);
    Some((t, ray_origin + ray_dir * t))
}

/// Closest points between segments p1->q1 and p2->q2.
/// Returns (s, t, squared distance) with s, t in [0, 1].
fn closest_points_segments(p1: Vec3, q1: Vec3, p2: Vec3, q2: Vec3) -> (f32, f32, f32) {
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.length_squared();
    let e = d2.length_squared();
    let f = d2.dot(r);

    let (mut s, mut t);
    if a <= 1e-8 && e <= 1e-8 {
        s = 0.0;
        t = 0.0;
    } else if a <= 1e-8 {
        s = 0.0;
        t = (f / e).clamp(0.0, 1.0);
    } else {
        let c = d1.dot(r);
        if e <= 1e-8 {
            t = 0.0;
            s = (-c / a).clamp(0.0, 1.0);
        } else {
            let b = d1.dot(d2);
            let denom = a * e - b * b;
            s = if denom > 1e-8 {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            t = (b * s + f) / e;
            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
        }
    }

    let c1 = p1 + d1 * s;
    let c2 = p2 + d2 * t;
    (s, t, (c1 - c2).length_squared())
}

/// Segment vs AABB intersection. Returns (t in [0,1], entry point, normal).
pub fn segment_aabb_intersection(
    start: Vec3,
    end: Vec3,
    aabb_min: Vec3,
    aabb_max: Vec3,
) -> Option<(f32, Vec3, Vec3)> {
    let dir = end - start;
    let mut tmin = 0.0_f32;
    let mut tmax = 1.0_f32;
    let mut hit_normal = Vec3::ZERO;

    for axis in 0..3 {
        let s = start[axis];
        let d = dir[axis];
        let min = aabb_min[axis];
        let max = aabb_max[axis];

        if d.abs() < 1e-6 {
            if s < min || s > max {
                return None;
            }
            continue;
        }

        let inv_d = 1.0 / d;
        let mut t1 = (min - s) * inv_d;
        let mut t2 = (max - s) * inv_d;

        let mut n = Vec3::ZERO;
        n[axis] = if d > 0.0 { -1.0 } else { 1.0 };

        if t1 > t2 {
            std::mem::swap(&mut t1, &mut t2);
            n = -n;
        }

        if t1 > tmin {
            tmin = t1;
            hit_normal = n;
        }

        tmax = tmax.min(t2);

        if tmin > tmax {
            return None;
        }
    }

    if !(0.0..=1.0).contains(&tmin) {
        return None;
    }

    Some((tmin, start + dir * tmin, hit_normal))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wall_between() -> BlockingGeometry {
        BlockingGeometry {
            volumes: vec![Aabb {
                min: Vec3::new(-5.0, 0.0, -10.5),
                max: Vec3::new(5.0, 3.0, -9.5),
            }],
        }
    }

    fn actor_at(id: u64, z: f32) -> ActorTarget {
        ActorTarget { id, team: 1, position: Vec3::new(0.0, 0.0, z) }
    }

    #[test]
    fn wall_sorts_before_actor_behind_it() {
        let actors = [actor_at(2, -20.0)];
        let origin = Vec3::new(0.0, 1.4, 0.0);
        let candidates = sweep_scene(origin, Vec3::NEG_Z, 50.0, 1, &actors, &wall_between());

        assert!(candidates.len() >= 2);
        assert_eq!(candidates[0].target, HitTarget::Environment);
        assert!(candidates[0].distance < candidates[1].distance);
        assert_eq!(candidates[1].actor_id(), Some(2));
    }

    #[test]
    fn shooter_own_body_is_skipped() {
        let actors = [actor_at(1, 0.0), actor_at(2, -20.0)];
        let origin = Vec3::new(0.0, 1.4, 0.0);
        let hit = first_hit(origin, Vec3::NEG_Z, 50.0, 1, &actors, &BlockingGeometry::default())
            .unwrap();
        assert_eq!(hit.actor_id(), Some(2));
    }

    #[test]
    fn head_sphere_classifies_as_head() {
        let target = actor_at(2, -10.0);
        let head = actor_head_center(target.position);
        let origin = Vec3::new(0.0, head.y, 0.0);
        let hit = first_hit(origin, Vec3::NEG_Z, 50.0, 1, &[target], &BlockingGeometry::default())
            .unwrap();
        match hit.target {
            HitTarget::Actor { zone, .. } => assert_eq!(zone, HitZone::Head),
            HitTarget::Environment => panic!("expected actor hit"),
        }
    }

    #[test]
    fn torso_hit_classifies_below_head() {
        let target = actor_at(2, -10.0);
        let origin = Vec3::new(0.0, 1.2, 0.0);
        let hit = first_hit(origin, Vec3::NEG_Z, 50.0, 1, &[target], &BlockingGeometry::default())
            .unwrap();
        match hit.target {
            HitTarget::Actor { zone, .. } => assert_ne!(zone, HitZone::Head),
            HitTarget::Environment => panic!("expected actor hit"),
        }
    }

    #[test]
    fn miss_returns_nothing() {
        let target = actor_at(2, -10.0);
        let origin = Vec3::new(0.0, 1.4, 0.0);
        assert!(first_hit(origin, Vec3::Z, 50.0, 1, &[target], &BlockingGeometry::default())
            .is_none());
    }

    #[test]
    fn aabb_entry_normal_faces_ray() {
        let (t, point, normal) = segment_aabb_intersection(
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, -20.0),
            Vec3::new(-5.0, 0.0, -10.5),
            Vec3::new(5.0, 3.0, -9.5),
        )
        .unwrap();
        assert!(t > 0.0 && t < 1.0);
        assert!((point.z - -9.5).abs() < 1e-4);
        assert_eq!(normal, Vec3::Z);
    }
}
