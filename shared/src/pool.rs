//! Recyclable entity pool for transient networked objects
//!
//! Projectiles and effect proxies are spawned per shot; recycling them keeps
//! the hot path free of allocation/despawn churn. Network visibility is
//! expressed through the `NetworkPresence` marker, which the authoritative
//! side maps onto replication in one explicit glue system.

use bevy::prelude::*;
use std::collections::{HashMap, HashSet, VecDeque};

/// Prefab identity of a pooled entity
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum PooledKind {
    Projectile,
    Tracer,
    ImpactMark,
}

/// Pool membership tag carried by every pooled entity
#[derive(Component, Clone, Copy, Debug)]
pub struct Pooled {
    pub kind: PooledKind,
}

/// Marker on queued (inactive) pooled entities. Simulation queries filter it
/// out; an entity is never simultaneously queued and in use.
#[derive(Component, Default)]
pub struct PoolInactive;

/// Marker for "this entity should be visible on the network". Present only
/// while the entity is active and the owning pool is authoritative.
#[derive(Component, Default)]
pub struct NetworkPresence;

/// The pool itself. One per side; the server's is authoritative.
#[derive(Resource)]
pub struct EntityPool {
    authoritative: bool,
    free: HashMap<PooledKind, VecDeque<Entity>>,
    members: HashMap<Entity, PooledKind>,
    active: HashSet<Entity>,
}

impl EntityPool {
    pub fn new(authoritative: bool) -> Self {
        Self {
            authoritative,
            free: HashMap::new(),
            members: HashMap::new(),
            active: HashSet::new(),
        }
    }

    /// Instantiate `count` inactive entities of `kind` ahead of demand.
    pub fn prewarm(&mut self, commands: &mut Commands, kind: PooledKind, count: usize) {
        for _ in 0..count {
            let entity = commands
                .spawn((Pooled { kind }, PoolInactive, Transform::default()))
                .id();
            self.members.insert(entity, kind);
            self.free.entry(kind).or_default().push_back(entity);
        }
    }

    /// Take an entity of `kind` from the queue, instantiating one on demand.
    /// The entity comes back activated and placed; the caller attaches its
    /// kind-specific components.
    pub fn acquire(
        &mut self,
        commands: &mut Commands,
        kind: PooledKind,
        position: Vec3,
        orientation: Quat,
    ) -> Entity {
        let entity = match self.free.entry(kind).or_default().pop_front() {
            Some(entity) => entity,
            None => {
                let entity = commands.spawn((Pooled { kind }, Transform::default())).id();
                self.members.insert(entity, kind);
                entity
            }
        };

        let mut entry = commands.entity(entity);
        entry.remove::<PoolInactive>();
        entry.insert(Transform::from_translation(position).with_rotation(orientation));
        if self.authoritative {
            entry.insert(NetworkPresence);
        }
        self.active.insert(entity);
        entity
    }

    /// Return an entity to the queue. An entity with no pool membership is
    /// despawned instead of leaked into the queue; releasing an already
    /// queued entity is a no-op.
    pub fn release(&mut self, commands: &mut Commands, entity: Entity) {
        let Some(&kind) = self.members.get(&entity) else {
            commands.entity(entity).despawn();
            return;
        };
        if !self.active.remove(&entity) {
            return;
        }

        let mut entry = commands.entity(entity);
        entry.insert(PoolInactive);
        if self.authoritative {
            entry.remove::<NetworkPresence>();
        }
        self.free.entry(kind).or_default().push_back(entity);
    }

    pub fn is_active(&self, entity: Entity) -> bool {
        self.active.contains(&entity)
    }

    pub fn idle_count(&self, kind: PooledKind) -> usize {
        self.free.get(&kind).map_or(0, VecDeque::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::ecs::world::CommandQueue;

    fn with_commands<R>(
        world: &mut World,
        f: impl FnOnce(&mut Commands, &mut EntityPool) -> R,
        pool: &mut EntityPool,
    ) -> R {
        let mut queue = CommandQueue::default();
        let mut commands = Commands::new(&mut queue, world);
        let out = f(&mut commands, pool);
        queue.apply(world);
        out
    }

    #[test]
    fn prewarmed_entities_start_inactive() {
        let mut world = World::new();
        let mut pool = EntityPool::new(true);
        with_commands(&mut world, |c, p| p.prewarm(c, PooledKind::Projectile, 4), &mut pool);

        assert_eq!(pool.idle_count(PooledKind::Projectile), 4);
        let mut query = world.query_filtered::<Entity, (With<Pooled>, With<PoolInactive>)>();
        assert_eq!(query.iter(&world).count(), 4);
    }

    #[test]
    fn acquire_activates_and_release_requeues() {
        let mut world = World::new();
        let mut pool = EntityPool::new(true);
        with_commands(&mut world, |c, p| p.prewarm(c, PooledKind::Projectile, 1), &mut pool);

        let entity = with_commands(
            &mut world,
            |c, p| p.acquire(c, PooledKind::Projectile, Vec3::ONE, Quat::IDENTITY),
            &mut pool,
        );

        assert!(pool.is_active(entity));
        assert_eq!(pool.idle_count(PooledKind::Projectile), 0);
        assert!(world.get::<PoolInactive>(entity).is_none());
        assert!(world.get::<NetworkPresence>(entity).is_some());
        assert_eq!(world.get::<Transform>(entity).unwrap().translation, Vec3::ONE);

        with_commands(&mut world, |c, p| p.release(c, entity), &mut pool);
        assert!(!pool.is_active(entity));
        assert_eq!(pool.idle_count(PooledKind::Projectile), 1);
        assert!(world.get::<PoolInactive>(entity).is_some());
        assert!(world.get::<NetworkPresence>(entity).is_none());
    }

    #[test]
    fn acquire_grows_when_queue_is_empty() {
        let mut world = World::new();
        let mut pool = EntityPool::new(false);

        let a = with_commands(
            &mut world,
            |c, p| p.acquire(c, PooledKind::Tracer, Vec3::ZERO, Quat::IDENTITY),
            &mut pool,
        );
        let b = with_commands(
            &mut world,
            |c, p| p.acquire(c, PooledKind::Tracer, Vec3::ZERO, Quat::IDENTITY),
            &mut pool,
        );

        assert_ne!(a, b);
        assert!(pool.is_active(a) && pool.is_active(b));
        // Non-authoritative pools never tag network presence.
        assert!(world.get::<NetworkPresence>(a).is_none());
    }

    #[test]
    fn no_entity_is_handed_out_twice() {
        let mut world = World::new();
        let mut pool = EntityPool::new(true);
        with_commands(&mut world, |c, p| p.prewarm(c, PooledKind::Projectile, 1), &mut pool);

        let first = with_commands(
            &mut world,
            |c, p| p.acquire(c, PooledKind::Projectile, Vec3::ZERO, Quat::IDENTITY),
            &mut pool,
        );
        let second = with_commands(
            &mut world,
            |c, p| p.acquire(c, PooledKind::Projectile, Vec3::ZERO, Quat::IDENTITY),
            &mut pool,
        );
        // Queue was empty, so the second acquire must be a fresh entity.
        assert_ne!(first, second);
    }

    #[test]
    fn double_release_does_not_requeue_twice() {
        let mut world = World::new();
        let mut pool = EntityPool::new(true);
        with_commands(&mut world, |c, p| p.prewarm(c, PooledKind::ImpactMark, 1), &mut pool);

        let entity = with_commands(
            &mut world,
            |c, p| p.acquire(c, PooledKind::ImpactMark, Vec3::ZERO, Quat::IDENTITY),
            &mut pool,
        );
        with_commands(&mut world, |c, p| p.release(c, entity), &mut pool);
        with_commands(&mut world, |c, p| p.release(c, entity), &mut pool);
        assert_eq!(pool.idle_count(PooledKind::ImpactMark), 1);
    }

    #[test]
    fn foreign_entity_is_discarded_not_queued() {
        let mut world = World::new();
        let mut pool = EntityPool::new(true);
        let stray = world.spawn(Transform::default()).id();

        with_commands(&mut world, |c, p| p.release(c, stray), &mut pool);
        assert_eq!(pool.idle_count(PooledKind::Projectile), 0);
        assert!(world.get_entity(stray).is_err());
    }
}
