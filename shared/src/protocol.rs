//! Network protocol definition
//!
//! All combat traffic is one-way messages on a per-connection ordered
//! reliable channel. The ordering invariant of the fire pipeline (seed sync
//! observed before the matching impact) is enforced by that channel mode,
//! never inferred from message contents.

use bevy::prelude::*;
use lightyear::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::components::{
    EquippedWeapon, Health, ImpactMark, MatchPhase, Player, PlayerPosition, PlayerRotation,
    Projectile, ProjectileVelocity, Tracer,
};
use crate::weapons::WeaponKind;

// --- Messages: client -> server ---

/// Ask the server to spawn an actor for this connection
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct JoinRequest;

/// A single trigger pull
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct FireRequest {
    /// Client-side aim direction. Advisory for hitscan (the server aims from
    /// its own transform); used as the launch direction basis for
    /// projectiles after authoritative spread is applied.
    pub direction: Vec3,
    /// Client-reported send time, for the bounded lag-tolerance computation
    pub client_timestamp: f32,
    /// Whether the client was aiming (selects the spread cone)
    pub aiming: bool,
}

/// Client-predicted hitscan hit, validated by the anti-cheat sequence before
/// it can award damage. Sent on the ordered channel immediately before the
/// `FireRequest` it belongs to; `target_id = None` claims an environment hit.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct HitClaim {
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
    pub target_id: Option<u64>,
}

/// Latest look angles for this client's actor. Applied to the replicated
/// rotation before any fire request from the same client is processed, so
/// the authoritative forward used by hitscan and the aim-cone check tracks
/// where the player is actually looking.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Copy)]
pub struct AimUpdate {
    pub yaw: f32,
    pub pitch: f32,
}

/// Ask the server to start reloading the current weapon
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct ReloadRequest;

/// Ask the server to switch the equipped weapon
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct SwitchWeapon {
    pub kind: WeaponKind,
}

// --- Messages: server -> clients ---

/// Per-shot spread seed. Broadcast to everyone strictly before any raycast
/// result that depends on it.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Copy)]
pub struct SpreadSeedSync {
    pub shooter_id: u64,
    pub seed: u64,
}

/// Authoritative ammo mirror for one actor's equipped weapon
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Copy)]
pub struct AmmoSync {
    pub shooter_id: u64,
    pub current: u32,
    pub reserve: u32,
}

/// Muzzle flash / shot notification, consumed by effect collaborators
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct FireEffectBroadcast {
    pub shooter_id: u64,
    pub muzzle_position: Vec3,
    pub muzzle_direction: Vec3,
}

/// Surface classification for impact effects
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
pub enum ImpactSurface {
    Wall,
    Ground,
    Actor,
}

/// Authoritative impact. Sent for every resolved shot, environment hits
/// included; overwrites whatever the client predicted.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct ImpactBroadcast {
    pub shooter_id: u64,
    pub point: Vec3,
    pub normal: Vec3,
    pub surface: ImpactSurface,
    pub is_body_hit: bool,
    pub is_critical: bool,
}

/// Generic fire rejection, sent only to the requesting client. Deliberately
/// carries no reason: validation detail stays server-side.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct RejectFire;

// --- Channels ---

/// Ordered reliable channel for all combat messages. Per-connection ordering
/// on this channel is what guarantees a seed sync is applied before the
/// impact that used it.
pub struct CombatChannel;

// --- Protocol Plugin ---

pub struct ProtocolPlugin;

impl Plugin for ProtocolPlugin {
    fn build(&self, app: &mut App) {
        // === ACTOR COMPONENTS ===
        app.register_component::<Player>()
            .add_prediction();

        app.register_component::<PlayerPosition>()
            .add_prediction();

        app.register_component::<PlayerRotation>()
            .add_prediction();

        app.register_component::<Health>()
            .add_prediction();

        app.register_component::<EquippedWeapon>()
            .add_prediction();

        // === MATCH COMPONENTS ===
        app.register_component::<MatchPhase>()
            .add_prediction();

        // === PROJECTILE COMPONENTS ===
        app.register_component::<Projectile>()
            .add_prediction();

        app.register_component::<ProjectileVelocity>()
            .add_prediction();

        // === EFFECT PROXIES ===
        app.register_component::<Tracer>()
            .add_prediction();

        app.register_component::<ImpactMark>()
            .add_prediction();

        // === MESSAGES ===

        // Client -> Server
        app.register_message::<JoinRequest>()
            .add_direction(NetworkDirection::ClientToServer);
        app.register_message::<FireRequest>()
            .add_direction(NetworkDirection::ClientToServer);
        app.register_message::<HitClaim>()
            .add_direction(NetworkDirection::ClientToServer);
        app.register_message::<AimUpdate>()
            .add_direction(NetworkDirection::ClientToServer);
        app.register_message::<ReloadRequest>()
            .add_direction(NetworkDirection::ClientToServer);
        app.register_message::<SwitchWeapon>()
            .add_direction(NetworkDirection::ClientToServer);

        // Server -> Client
        app.register_message::<SpreadSeedSync>()
            .add_direction(NetworkDirection::ServerToClient);
        app.register_message::<AmmoSync>()
            .add_direction(NetworkDirection::ServerToClient);
        app.register_message::<FireEffectBroadcast>()
            .add_direction(NetworkDirection::ServerToClient);
        app.register_message::<ImpactBroadcast>()
            .add_direction(NetworkDirection::ServerToClient);
        app.register_message::<RejectFire>()
            .add_direction(NetworkDirection::ServerToClient);

        // === CHANNELS ===

        app.add_channel::<CombatChannel>(ChannelSettings {
            mode: ChannelMode::OrderedReliable(ReliableSettings::default()),
            ..default()
        })
        .add_direction(NetworkDirection::Bidirectional);
    }
}

/// Stable u64 identity for a peer, used as the shooter/target id in combat
/// messages and ownership fields.
pub fn peer_id_to_u64(peer_id: PeerId) -> u64 {
    match peer_id {
        PeerId::Netcode(id) => id,
        PeerId::Steam(id) => id,
        PeerId::Local(id) => id,
        PeerId::Entity(id) => id,
        PeerId::Raw(addr) => {
            use std::hash::{Hash, Hasher};
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            addr.hash(&mut hasher);
            hasher.finish()
        }
        PeerId::Server => 0,
    }
}

// --- Network Configuration ---

pub const SERVER_PORT: u16 = 5000;
pub const SERVER_ADDR: &str = "127.0.0.1";
pub const PROTOCOL_ID: u64 = 0x46495245_43544C;

/// Server bind address; 0.0.0.0 covers local and hosted deployments.
pub fn get_server_bind_addr() -> &'static str {
    "0.0.0.0"
}

/// Shared private key for local development (use proper key management in production!)
pub const PRIVATE_KEY: [u8; 32] = [
    0x21, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
    0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f, 0x10,
    0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18,
    0x19, 0x1a, 0x1b, 0x1c, 0x1d, 0x1e, 0x1f, 0x20,
];

/// Fixed timestep for the simulation tick (60 Hz)
pub const FIXED_TIMESTEP_HZ: f64 = 60.0;

/// Maximum client clock skew tolerated by the lag-compensation bound (s)
pub const MAX_LAG_COMPENSATION: f32 = 0.5;

/// Tick duration for lightyear plugins
pub fn tick_duration() -> Duration {
    Duration::from_secs_f64(1.0 / FIXED_TIMESTEP_HZ)
}
