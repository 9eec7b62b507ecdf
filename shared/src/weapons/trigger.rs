//! Fire-mode trigger logic
//!
//! Pure, tick-driven shaping of trigger input into fire requests. This paces
//! how often the controller *asks* to fire; whether a shot is accepted is
//! decided solely by the authoritative cooldown on the server.

use super::FireMode;

/// Per-actor trigger state, advanced once per tick by the weapon controller.
#[derive(Clone, Copy, Debug, Default)]
pub struct TriggerState {
    held_prev: bool,
    burst_remaining: u8,
    next_shot_time: f32,
}

impl TriggerState {
    /// Advance one tick. Returns true when a fire request should be issued.
    pub fn tick(&mut self, mode: FireMode, held: bool, now: f32, cadence: f32) -> bool {
        let pressed = held && !self.held_prev;
        self.held_prev = held;

        match mode {
            FireMode::Semi => pressed,
            FireMode::Auto => {
                if held && now >= self.next_shot_time {
                    self.next_shot_time = now + cadence;
                    true
                } else {
                    false
                }
            }
            FireMode::Burst(count) => {
                if pressed && self.burst_remaining == 0 {
                    self.burst_remaining = count;
                }
                if self.burst_remaining > 0 && now >= self.next_shot_time {
                    self.burst_remaining -= 1;
                    self.next_shot_time = now + cadence;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Drop any queued burst shots (weapon switch, reload, death).
    pub fn reset(&mut self) {
        self.burst_remaining = 0;
        self.next_shot_time = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn run(mode: FireMode, held: &[bool], cadence: f32) -> u32 {
        let mut trigger = TriggerState::default();
        let mut shots = 0;
        for (i, &h) in held.iter().enumerate() {
            if trigger.tick(mode, h, i as f32 * DT, cadence) {
                shots += 1;
            }
        }
        shots
    }

    #[test]
    fn semi_fires_once_per_press() {
        let held = [true; 30];
        assert_eq!(run(FireMode::Semi, &held, 0.1), 1);

        let tapped = [true, false, true, false, true];
        assert_eq!(run(FireMode::Semi, &tapped, 0.1), 3);
    }

    #[test]
    fn auto_fires_at_cadence_while_held() {
        // 1 second held at 10 rps: shot at t=0 plus nine more.
        let held = [true; 60];
        assert_eq!(run(FireMode::Auto, &held, 0.1), 10);
    }

    #[test]
    fn burst_fires_exactly_count_per_press() {
        // Hold for a full second: one burst of 3, no retrigger while held.
        let held = [true; 60];
        assert_eq!(run(FireMode::Burst(3), &held, 1.0 / 12.0), 3);
    }

    #[test]
    fn burst_retriggers_after_release() {
        let mut trigger = TriggerState::default();
        let cadence = 1.0 / 12.0;
        let mut shots = 0;
        let mut t = 0.0;
        // Press, wait out the burst, release, press again.
        for held in [true; 30] {
            if trigger.tick(FireMode::Burst(3), held, t, cadence) {
                shots += 1;
            }
            t += DT;
        }
        trigger.tick(FireMode::Burst(3), false, t, cadence);
        t += DT;
        for held in [true; 30] {
            if trigger.tick(FireMode::Burst(3), held, t, cadence) {
                shots += 1;
            }
            t += DT;
        }
        assert_eq!(shots, 6);
    }

    #[test]
    fn reset_cancels_pending_burst() {
        let mut trigger = TriggerState::default();
        let cadence = 1.0 / 12.0;
        assert!(trigger.tick(FireMode::Burst(3), true, 0.0, cadence));
        trigger.reset();
        // Remaining burst shots are gone; still held, no new press.
        let mut shots = 0;
        for i in 1..60 {
            if trigger.tick(FireMode::Burst(3), true, i as f32 * DT, cadence) {
                shots += 1;
            }
        }
        assert_eq!(shots, 0);
    }
}
