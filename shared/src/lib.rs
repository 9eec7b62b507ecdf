//! Shared fire-control core: protocol, components, weapon data, and the
//! deterministic pieces both sides must agree on.

pub mod components;
pub mod pool;
pub mod protocol;
pub mod raycast;
pub mod weapons;

pub use components::{
    actor_capsule_endpoints, actor_head_center, actor_muzzle, EquippedWeapon, Health, ImpactMark,
    LocalPlayer, MatchPhase, Player, PlayerPosition, PlayerRotation, Projectile,
    ProjectilePrevPosition, ProjectileVelocity, Tracer, ACTOR_HEAD_RADIUS, ACTOR_HEIGHT,
    ACTOR_RADIUS, IMPACT_MARK_LIFETIME, MUZZLE_HEIGHT, SPAWN_POSITION, TRACER_LIFETIME,
};
pub use pool::{EntityPool, NetworkPresence, PoolInactive, Pooled, PooledKind};
pub use protocol::{
    get_server_bind_addr, peer_id_to_u64, tick_duration, AimUpdate, AmmoSync, CombatChannel,
    FireEffectBroadcast, FireRequest, HitClaim, ImpactBroadcast, ImpactSurface, JoinRequest,
    ProtocolPlugin, RejectFire, ReloadRequest, SpreadSeedSync, SwitchWeapon, FIXED_TIMESTEP_HZ,
    MAX_LAG_COMPENSATION, PRIVATE_KEY, PROTOCOL_ID, SERVER_ADDR, SERVER_PORT,
};
pub use raycast::{ActorTarget, Aabb, BlockingGeometry, HitCandidate, HitTarget};
pub use weapons::{FireMode, WeaponKind, WeaponStats};
