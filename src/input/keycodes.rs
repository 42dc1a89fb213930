//! Platform key codes delivered by the device input source
//!
//! The host input layer reports gamepad buttons with the same numeric codes
//! the platform uses for `KEYCODE_BUTTON_*` / `KEYCODE_DPAD_*`.

use super::state::{Button, Control, Dpad};

pub const KEYCODE_DPAD_UP: i32 = 19;
pub const KEYCODE_DPAD_DOWN: i32 = 20;
pub const KEYCODE_DPAD_LEFT: i32 = 21;
pub const KEYCODE_DPAD_RIGHT: i32 = 22;
pub const KEYCODE_BUTTON_A: i32 = 96;
pub const KEYCODE_BUTTON_B: i32 = 97;
pub const KEYCODE_BUTTON_C: i32 = 98;
pub const KEYCODE_BUTTON_X: i32 = 99;
pub const KEYCODE_BUTTON_Y: i32 = 100;
pub const KEYCODE_BUTTON_Z: i32 = 101;
pub const KEYCODE_BUTTON_L1: i32 = 102;
pub const KEYCODE_BUTTON_R1: i32 = 103;
pub const KEYCODE_BUTTON_L2: i32 = 104;
pub const KEYCODE_BUTTON_R2: i32 = 105;
pub const KEYCODE_BUTTON_THUMBL: i32 = 106;
pub const KEYCODE_BUTTON_THUMBR: i32 = 107;
pub const KEYCODE_BUTTON_START: i32 = 108;
pub const KEYCODE_BUTTON_SELECT: i32 = 109;

/// Map a platform key code to the logical control it drives
///
/// Returns `None` for codes that are not gamepad controls (C/Z included).
pub fn control_for_keycode(code: i32) -> Option<Control> {
    let control = match code {
        KEYCODE_BUTTON_A => Control::Button(Button::A),
        KEYCODE_BUTTON_B => Control::Button(Button::B),
        KEYCODE_BUTTON_X => Control::Button(Button::X),
        KEYCODE_BUTTON_Y => Control::Button(Button::Y),
        KEYCODE_BUTTON_L1 => Control::Button(Button::LB),
        KEYCODE_BUTTON_R1 => Control::Button(Button::RB),
        KEYCODE_BUTTON_L2 => Control::Button(Button::L2),
        KEYCODE_BUTTON_R2 => Control::Button(Button::R2),
        KEYCODE_BUTTON_THUMBL => Control::Button(Button::L3),
        KEYCODE_BUTTON_THUMBR => Control::Button(Button::R3),
        KEYCODE_BUTTON_START => Control::Button(Button::Start),
        KEYCODE_BUTTON_SELECT => Control::Button(Button::Back),
        KEYCODE_DPAD_UP => Control::Dpad(Dpad::Up),
        KEYCODE_DPAD_DOWN => Control::Dpad(Dpad::Down),
        KEYCODE_DPAD_LEFT => Control::Dpad(Dpad::Left),
        KEYCODE_DPAD_RIGHT => Control::Dpad(Dpad::Right),
        _ => return None,
    };
    Some(control)
}
