//! Translation of raw device events into a device's cached [`GamepadState`]

use serde::{Deserialize, Serialize};

use super::analog::{dpad_allowed, hat_to_dpad, normalize_trigger};
use super::keycodes::control_for_keycode;
use super::state::{Button, Control, GamepadState};

/// How the L2/R2 triggers are sourced from a physical controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    /// Digital trigger buttons drive the axis to 0 or 1
    Button,
    /// Analog trigger axes from motion events
    #[default]
    Axis,
    /// Either source
    Both,
}

impl TriggerMode {
    fn accepts_buttons(self) -> bool {
        matches!(self, TriggerMode::Button | TriggerMode::Both)
    }

    fn accepts_axes(self) -> bool {
        matches!(self, TriggerMode::Axis | TriggerMode::Both)
    }
}

/// One joystick motion report
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionSample {
    pub lx: f32,
    pub ly: f32,
    pub rx: f32,
    pub ry: f32,
    pub l_trigger: f32,
    pub r_trigger: f32,
    pub hat_x: f32,
    pub hat_y: f32,
}

/// Apply a key press/release
///
/// Returns `true` when the key code is a gamepad control, even if the trigger
/// mode means it was consumed without effect.
pub fn apply_key(state: &mut GamepadState, code: i32, pressed: bool, mode: TriggerMode) -> bool {
    let Some(control) = control_for_keycode(code) else {
        return false;
    };

    match control {
        Control::Button(button @ (Button::L2 | Button::R2)) => {
            if mode.accepts_buttons() {
                let value = if pressed { 1.0 } else { 0.0 };
                if button == Button::L2 {
                    state.trigger_l = value;
                } else {
                    state.trigger_r = value;
                }
                state.set_pressed(button, pressed);
            }
        }
        Control::Button(button) => state.set_pressed(button, pressed),
        Control::Dpad(dir) => {
            let allowed = pressed && dpad_allowed(dir, state);
            state.set_dpad(dir, allowed);
        }
    }
    true
}

/// Apply a motion report (sticks, triggers, hat)
pub fn apply_motion(state: &mut GamepadState, sample: &MotionSample, mode: TriggerMode) {
    state.thumb_lx = sample.lx;
    state.thumb_ly = sample.ly;
    state.thumb_rx = sample.rx;
    state.thumb_ry = sample.ry;

    if mode.accepts_axes() {
        state.trigger_l = normalize_trigger(sample.l_trigger);
        state.trigger_r = normalize_trigger(sample.r_trigger);
        state.set_pressed(Button::L2, state.trigger_l > 0.0);
        state.set_pressed(Button::R2, state.trigger_r > 0.0);
    }

    state.dpad = hat_to_dpad(sample.hat_x, sample.hat_y, state);
    state.clamp();
}
