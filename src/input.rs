// ==============================================================================
// input.rs — CONTROL INPUT
// ------------------------------------------------------------------------------
// Raw key-down / key-up events land in an `InputState` owned by the session.
// Once per fixed tick the scheduler takes a `ControlInput` snapshot; the
// controller only ever sees that copy, so a key event arriving mid-tick can
// never tear a physics step.
// ==============================================================================

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    ThrottleForward,
    ThrottleReverse,
    Handbrake,
    SteerLeft,
    SteerRight,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::ThrottleForward,
        Action::ThrottleReverse,
        Action::Handbrake,
        Action::SteerLeft,
        Action::SteerRight,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "throttleForward" => Some(Action::ThrottleForward),
            "throttleReverse" => Some(Action::ThrottleReverse),
            "brakeHandbrake" | "handbrake" => Some(Action::Handbrake),
            "steerLeft" => Some(Action::SteerLeft),
            "steerRight" => Some(Action::SteerRight),
            _ => None,
        }
    }

    /// Maps a browser key name (QWERTY or AZERTY, arrows, space) to an action.
    pub fn from_key(key: &str) -> Option<Self> {
        match key.to_ascii_lowercase().as_str() {
            "w" | "z" | "arrowup" | "keyw" => Some(Action::ThrottleForward),
            "s" | "arrowdown" | "keys" => Some(Action::ThrottleReverse),
            "a" | "q" | "arrowleft" | "keya" => Some(Action::SteerLeft),
            "d" | "arrowright" | "keyd" => Some(Action::SteerRight),
            " " | "space" | "spacebar" => Some(Action::Handbrake),
            _ => None,
        }
    }

    fn bit(self) -> u8 {
        match self {
            Action::ThrottleForward => 1 << 0,
            Action::ThrottleReverse => 1 << 1,
            Action::Handbrake => 1 << 2,
            Action::SteerLeft => 1 << 3,
            Action::SteerRight => 1 << 4,
        }
    }
}

/// One tick's worth of control flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ControlInput {
    pub throttle_forward: bool,
    pub throttle_reverse: bool,
    pub handbrake: bool,
    pub steer_left: bool,
    pub steer_right: bool,
}

impl ControlInput {
    /// +1 left, -1 right, 0 for none or both.
    pub fn steer_direction(&self) -> f32 {
        match (self.steer_left, self.steer_right) {
            (true, false) => 1.0,
            (false, true) => -1.0,
            _ => 0.0,
        }
    }

    pub fn is_steering(&self) -> bool {
        self.steer_direction() != 0.0
    }

    pub fn any_throttle(&self) -> bool {
        self.throttle_forward || self.throttle_reverse
    }
}

#[derive(Debug, Clone)]
pub struct InputState {
    pressed: u8,
    enabled: bool,
}

impl Default for InputState {
    fn default() -> Self {
        Self::new()
    }
}

impl InputState {
    pub fn new() -> Self {
        Self { pressed: 0, enabled: true }
    }

    pub fn key_down(&mut self, key: &str) -> bool {
        match Action::from_key(key) {
            Some(action) => {
                self.set(action, true);
                true
            }
            None => false,
        }
    }

    pub fn key_up(&mut self, key: &str) -> bool {
        match Action::from_key(key) {
            Some(action) => {
                self.set(action, false);
                true
            }
            None => false,
        }
    }

    /// Presses are ignored while disabled; releases always go through.
    pub fn set(&mut self, action: Action, down: bool) {
        if down {
            if self.enabled {
                self.pressed |= action.bit();
            }
        } else {
            self.pressed &= !action.bit();
        }
    }

    pub fn is_pressed(&self, action: Action) -> bool {
        self.pressed & action.bit() != 0
    }

    /// Unknown action names are simply not pressed.
    pub fn is_pressed_name(&self, name: &str) -> bool {
        Action::from_name(name).is_some_and(|a| self.is_pressed(a))
    }

    /// Clears every flag in one store so no key stays stuck across a
    /// disable/enable cycle.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.pressed = 0;
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn clear(&mut self) {
        self.pressed = 0;
    }

    pub fn snapshot(&self) -> ControlInput {
        ControlInput {
            throttle_forward: self.is_pressed(Action::ThrottleForward),
            throttle_reverse: self.is_pressed(Action::ThrottleReverse),
            handbrake: self.is_pressed(Action::Handbrake),
            steer_left: self.is_pressed(Action::SteerLeft),
            steer_right: self.is_pressed(Action::SteerRight),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_map_to_actions() {
        let mut input = InputState::new();
        assert!(input.key_down("ArrowUp"));
        assert!(input.key_down("q"));
        assert!(input.key_down(" "));
        assert!(!input.key_down("F5"));

        assert!(input.is_pressed(Action::ThrottleForward));
        assert!(input.is_pressed(Action::SteerLeft));
        assert!(input.is_pressed(Action::Handbrake));
        assert!(!input.is_pressed(Action::SteerRight));

        input.key_up("ArrowUp");
        assert!(!input.is_pressed(Action::ThrottleForward));
    }

    #[test]
    fn disable_clears_held_throttle() {
        let mut input = InputState::new();
        input.key_down("w");
        assert!(input.is_pressed_name("throttleForward"));

        input.disable();
        assert!(!input.is_pressed_name("throttleForward"));

        // still held physically, but presses are dropped until re-enabled
        input.key_down("w");
        assert!(!input.is_pressed(Action::ThrottleForward));

        input.enable();
        assert_eq!(input.snapshot(), ControlInput::default());
        input.key_down("w");
        assert!(input.is_pressed(Action::ThrottleForward));
    }

    #[test]
    fn unknown_action_is_not_pressed() {
        let mut input = InputState::new();
        for a in Action::ALL {
            input.set(a, true);
        }
        assert!(!input.is_pressed_name("nitro"));
        assert!(input.is_pressed_name("brakeHandbrake"));
    }

    #[test]
    fn snapshot_is_a_copy() {
        let mut input = InputState::new();
        input.key_down("d");
        let snap = input.snapshot();
        input.key_up("d");
        input.key_down("a");

        assert!(snap.steer_right);
        assert!(!snap.steer_left);
        assert_eq!(snap.steer_direction(), -1.0);
    }

    #[test]
    fn opposite_steering_cancels() {
        let c = ControlInput { steer_left: true, steer_right: true, ..Default::default() };
        assert_eq!(c.steer_direction(), 0.0);
        assert!(!c.is_steering());
    }
}
