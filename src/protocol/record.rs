//! The 64-byte shared-memory gamepad record
//!
//! ```text
//! 0   i16 × 6   LX, LY, RX, RY, LT, RT
//! 12  u8 × 15   buttons, SDL order
//! 27  u8        hat (always 0, D-pad travels as buttons)
//! 28  ..        reserved
//! 32  u16       rumble low frequency   (written by the guest)
//! 34  u16       rumble high frequency  (written by the guest)
//! 36  ..        reserved
//! ```
//!
//! The host owns bytes `0..28` and never touches the rest, so the guest's
//! rumble fields survive every publish.

use bytes::{Buf, BufMut};

use crate::input::{Button, Dpad, GamepadState};

pub const RECORD_SIZE: usize = 64;

pub const AXES_OFFSET: usize = 0;
pub const AXIS_COUNT: usize = 6;
pub const BUTTONS_OFFSET: usize = AXES_OFFSET + AXIS_COUNT * 2;
pub const BUTTON_SLOTS: usize = 15;
pub const HAT_OFFSET: usize = BUTTONS_OFFSET + BUTTON_SLOTS;
/// End of the host-written prefix
pub const HOST_REGION_END: usize = HAT_OFFSET + 1;
pub const RUMBLE_LOW_OFFSET: usize = 32;
pub const RUMBLE_HIGH_OFFSET: usize = 34;

const _: () = assert!(BUTTONS_OFFSET == 12);
const _: () = assert!(HAT_OFFSET == 27);
const _: () = assert!(HOST_REGION_END <= RUMBLE_LOW_OFFSET);
const _: () = assert!(RUMBLE_HIGH_OFFSET + 2 <= RECORD_SIZE);

/// Button flag order the guest's SDL mapping expects
///
/// Index 5 is the guide button, which the host never reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SdlButton {
    Button(Button),
    Dpad(Dpad),
    Guide,
}

const SDL_ORDER: [SdlButton; BUTTON_SLOTS] = [
    SdlButton::Button(Button::A),
    SdlButton::Button(Button::B),
    SdlButton::Button(Button::X),
    SdlButton::Button(Button::Y),
    SdlButton::Button(Button::Back),
    SdlButton::Guide,
    SdlButton::Button(Button::Start),
    SdlButton::Button(Button::L3),
    SdlButton::Button(Button::R3),
    SdlButton::Button(Button::LB),
    SdlButton::Button(Button::RB),
    SdlButton::Dpad(Dpad::Up),
    SdlButton::Dpad(Dpad::Down),
    SdlButton::Dpad(Dpad::Left),
    SdlButton::Dpad(Dpad::Right),
];

const AXIS_MAX: f32 = 32767.0;
const TRIGGER_SPAN: f32 = 65534.0;

/// Host-owned part of one record, already in wire units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Record {
    pub axes: [i16; AXIS_COUNT],
    pub buttons: [u8; BUTTON_SLOTS],
    pub hat: u8,
}

impl Record {
    pub fn from_state(state: &GamepadState) -> Self {
        let mut buttons = [0u8; BUTTON_SLOTS];
        for (flag, entry) in buttons.iter_mut().zip(SDL_ORDER.iter()) {
            let pressed = match *entry {
                SdlButton::Button(b) => state.is_pressed(b),
                SdlButton::Dpad(d) => state.dpad(d),
                SdlButton::Guide => false,
            };
            *flag = u8::from(pressed);
        }

        Self {
            axes: [
                encode_stick(state.thumb_lx),
                encode_stick(state.thumb_ly),
                encode_stick(state.thumb_rx),
                encode_stick(state.thumb_ry),
                encode_trigger(state.trigger_l),
                encode_trigger(state.trigger_r),
            ],
            buttons,
            hat: 0,
        }
    }

    /// Write bytes `0..HOST_REGION_END` of `region`
    ///
    /// `region` must be at least [`HOST_REGION_END`] bytes long.
    pub fn write_to(&self, region: &mut [u8]) {
        let mut out = &mut region[..HOST_REGION_END];
        for axis in self.axes {
            out.put_i16_le(axis);
        }
        out.put_slice(&self.buttons);
        out.put_u8(self.hat);
    }

    pub fn read_from(region: &[u8]) -> Self {
        let mut input = &region[..HOST_REGION_END];
        let mut record = Record::default();
        for axis in record.axes.iter_mut() {
            *axis = input.get_i16_le();
        }
        input.copy_to_slice(&mut record.buttons);
        record.hat = input.get_u8();
        record
    }

    /// Reconstruct a state within curve-rounding tolerance
    pub fn to_state(&self) -> GamepadState {
        let mut state = GamepadState {
            thumb_lx: decode_stick(self.axes[0]),
            thumb_ly: decode_stick(self.axes[1]),
            thumb_rx: decode_stick(self.axes[2]),
            thumb_ry: decode_stick(self.axes[3]),
            trigger_l: decode_trigger(self.axes[4]),
            trigger_r: decode_trigger(self.axes[5]),
            ..Default::default()
        };
        for (flag, entry) in self.buttons.iter().zip(SDL_ORDER.iter()) {
            match *entry {
                SdlButton::Button(b) => state.set_pressed(b, *flag != 0),
                SdlButton::Dpad(d) => state.set_dpad(d, *flag != 0),
                SdlButton::Guide => {}
            }
        }
        state.set_pressed(Button::L2, self.axes[4] > -(AXIS_MAX as i16));
        state.set_pressed(Button::R2, self.axes[5] > -(AXIS_MAX as i16));
        state
    }
}

/// Rumble (low, high) as last written by the guest
pub fn read_rumble(region: &[u8]) -> (u16, u16) {
    let mut low = &region[RUMBLE_LOW_OFFSET..RUMBLE_LOW_OFFSET + 2];
    let mut high = &region[RUMBLE_HIGH_OFFSET..RUMBLE_HIGH_OFFSET + 2];
    (low.get_u16_le(), high.get_u16_le())
}

pub fn encode_stick(value: f32) -> i16 {
    (sanitize(value).clamp(-1.0, 1.0) * AXIS_MAX) as i16
}

/// Square-root curve onto the full signed range; released is -32767
pub fn encode_trigger(value: f32) -> i16 {
    let curved = sanitize(value).clamp(0.0, 1.0).sqrt();
    ((curved * TRIGGER_SPAN).round() - AXIS_MAX) as i16
}

pub fn decode_stick(raw: i16) -> f32 {
    raw as f32 / AXIS_MAX
}

pub fn decode_trigger(raw: i16) -> f32 {
    let curved = (raw as f32 + AXIS_MAX) / TRIGGER_SPAN;
    curved * curved
}

fn sanitize(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value
    }
}
