//! Analog value processing (deadzones, trigger floor, hat decoding)

use super::state::{Dpad, GamepadState};

/// D-pad presses are dropped while the left stick is deflected past this on
/// the matching axis, so a stick-emulated hat does not double up.
pub const STICK_DEAD_ZONE: f32 = 0.15;

/// Trigger readings at or below this are treated as released
pub const TRIGGER_FLOOR: f32 = 0.01;

/// Snap small trigger readings to zero and clamp to [0, 1]
pub fn normalize_trigger(raw: f32) -> f32 {
    if raw.is_nan() || raw <= TRIGGER_FLOOR {
        0.0
    } else {
        raw.min(1.0)
    }
}

/// Zero a value whose magnitude is below `deadzone`
///
/// Unlike a rescaling deadzone this keeps the value untouched above the
/// threshold; callers scale afterwards.
pub fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    if value.abs() < deadzone {
        0.0
    } else {
        value
    }
}

/// Negate when `invert` is set
pub fn apply_inversion(value: f32, invert: bool) -> f32 {
    if invert {
        -value
    } else {
        value
    }
}

/// Whether a D-pad direction may register given the current stick position
pub fn dpad_allowed(dir: Dpad, state: &GamepadState) -> bool {
    match dir {
        Dpad::Up | Dpad::Down => state.thumb_ly.abs() < STICK_DEAD_ZONE,
        Dpad::Left | Dpad::Right => state.thumb_lx.abs() < STICK_DEAD_ZONE,
    }
}

/// Decode a hat (x, y) pair into D-pad directions
///
/// Only full deflection (exactly ±1) counts; y = -1 is up.
pub fn hat_to_dpad(hat_x: f32, hat_y: f32, state: &GamepadState) -> [bool; 4] {
    let mut dpad = [false; 4];
    dpad[Dpad::Up.index()] = hat_y == -1.0 && dpad_allowed(Dpad::Up, state);
    dpad[Dpad::Right.index()] = hat_x == 1.0 && dpad_allowed(Dpad::Right, state);
    dpad[Dpad::Down.index()] = hat_y == 1.0 && dpad_allowed(Dpad::Down, state);
    dpad[Dpad::Left.index()] = hat_x == -1.0 && dpad_allowed(Dpad::Left, state);
    dpad
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_floor() {
        assert_eq!(normalize_trigger(0.005), 0.0);
        assert_eq!(normalize_trigger(0.01), 0.0);
        assert_eq!(normalize_trigger(0.5), 0.5);
        assert_eq!(normalize_trigger(1.02), 1.0);
        assert_eq!(normalize_trigger(f32::NAN), 0.0);
    }

    #[test]
    fn test_deadzone_filters_small_values() {
        assert_eq!(apply_deadzone(0.01, 0.05), 0.0);
        assert_eq!(apply_deadzone(-0.04, 0.05), 0.0);
        assert_eq!(apply_deadzone(0.5, 0.05), 0.5);
        assert_eq!(apply_deadzone(-0.5, 0.05), -0.5);
    }

    #[test]
    fn test_inversion() {
        assert_eq!(apply_inversion(0.5, false), 0.5);
        assert_eq!(apply_inversion(0.5, true), -0.5);
    }

    #[test]
    fn test_hat_respects_stick_deadzone() {
        let mut state = GamepadState::default();
        assert_eq!(hat_to_dpad(0.0, -1.0, &state), [true, false, false, false]);
        assert_eq!(hat_to_dpad(1.0, 1.0, &state), [false, true, true, false]);

        // Left stick pushed down: vertical hat ignored, horizontal still works
        state.thumb_ly = 0.8;
        assert_eq!(hat_to_dpad(-1.0, 1.0, &state), [false, false, false, true]);
    }
}
