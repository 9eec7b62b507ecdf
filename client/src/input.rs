//! Player intent
//!
//! The combat client is presentation-agnostic: whatever layer sits on top
//! (window input, a bot driver, tests) writes into `InputState` and the
//! weapon controller consumes it each fixed tick.

use bevy::prelude::*;

use shared::WeaponKind;

/// The player's current combat intent
#[derive(Resource, Default)]
pub struct InputState {
    /// Trigger held this tick
    pub fire_held: bool,
    /// Aiming down sights (selects the tighter spread cone)
    pub aiming: bool,
    /// Look angles, matching the replicated rotation convention
    pub yaw: f32,
    pub pitch: f32,
    /// One-shot: reload requested
    pub reload_pressed: bool,
    /// One-shot: switch to this weapon
    pub switch_to: Option<WeaponKind>,
}

impl InputState {
    /// Take the one-shot reload edge, clearing it.
    pub fn take_reload(&mut self) -> bool {
        std::mem::take(&mut self.reload_pressed)
    }

    /// Take the one-shot weapon switch, clearing it.
    pub fn take_switch(&mut self) -> Option<WeaponKind> {
        self.switch_to.take()
    }
}
