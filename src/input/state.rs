//! Canonical per-slot gamepad snapshot and the logical control enumeration

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Logical buttons, in the index order used by the button bitmask on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Button {
    A = 0,
    B = 1,
    X = 2,
    Y = 3,
    LB = 4,
    RB = 5,
    Back = 6,
    Start = 7,
    L3 = 8,
    R3 = 9,
    L2 = 10,
    R2 = 11,
}

impl Button {
    pub const COUNT: usize = 12;

    pub const ALL: [Button; Button::COUNT] = [
        Button::A,
        Button::B,
        Button::X,
        Button::Y,
        Button::LB,
        Button::RB,
        Button::Back,
        Button::Start,
        Button::L3,
        Button::R3,
        Button::L2,
        Button::R2,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Button::A => "a",
            Button::B => "b",
            Button::X => "x",
            Button::Y => "y",
            Button::LB => "lb",
            Button::RB => "rb",
            Button::Back => "back",
            Button::Start => "start",
            Button::L3 => "l3",
            Button::R3 => "r3",
            Button::L2 => "l2",
            Button::R2 => "r2",
        }
    }
}

/// D-pad directions, in the order the host stores them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dpad {
    Up = 0,
    Right = 1,
    Down = 2,
    Left = 3,
}

impl Dpad {
    pub const ALL: [Dpad; 4] = [Dpad::Up, Dpad::Right, Dpad::Down, Dpad::Left];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Dpad::Up => "up",
            Dpad::Right => "right",
            Dpad::Down => "down",
            Dpad::Left => "left",
        }
    }
}

/// Any discrete control: one of the 12 buttons or one of the 4 D-pad directions
///
/// Indices 0..12 are buttons, 12..16 are D-pad directions. Turbo masks are
/// indexed the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Control {
    Button(Button),
    Dpad(Dpad),
}

impl Control {
    pub const COUNT: usize = Button::COUNT + 4;

    pub fn index(self) -> usize {
        match self {
            Control::Button(b) => b.index(),
            Control::Dpad(d) => Button::COUNT + d.index(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Control::Button(b) => b.name(),
            Control::Dpad(d) => d.name(),
        }
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Control {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        if let Some(b) = Button::ALL.iter().find(|b| b.name() == lower) {
            return Ok(Control::Button(*b));
        }
        if let Some(d) = Dpad::ALL.iter().find(|d| d.name() == lower) {
            return Ok(Control::Dpad(*d));
        }
        // Common aliases from other controller layouts
        match lower.as_str() {
            "l1" => Ok(Control::Button(Button::LB)),
            "r1" => Ok(Control::Button(Button::RB)),
            "select" | "minus" => Ok(Control::Button(Button::Back)),
            "plus" => Ok(Control::Button(Button::Start)),
            _ => Err(format!("unknown control name: {}", s)),
        }
    }
}

impl TryFrom<String> for Control {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Control> for String {
    fn from(value: Control) -> Self {
        value.name().to_string()
    }
}

/// Snapshot of one logical gamepad
///
/// Sticks are in [-1, 1], triggers in [0, 1]. One long-lived instance per slot
/// is overwritten in place by the aggregator; everything else works on copies.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GamepadState {
    pub thumb_lx: f32,
    pub thumb_ly: f32,
    pub thumb_rx: f32,
    pub thumb_ry: f32,
    pub trigger_l: f32,
    pub trigger_r: f32,
    /// Bit `i` set when `Button` with index `i` is pressed
    pub buttons: u16,
    /// Up, right, down, left
    pub dpad: [bool; 4],
}

impl GamepadState {
    pub fn is_pressed(&self, button: Button) -> bool {
        self.buttons & (1 << button.index()) != 0
    }

    pub fn set_pressed(&mut self, button: Button, pressed: bool) {
        if pressed {
            self.buttons |= 1 << button.index();
        } else {
            self.buttons &= !(1 << button.index());
        }
    }

    pub fn dpad(&self, dir: Dpad) -> bool {
        self.dpad[dir.index()]
    }

    pub fn set_dpad(&mut self, dir: Dpad, pressed: bool) {
        self.dpad[dir.index()] = pressed;
    }

    pub fn is_active(&self, control: Control) -> bool {
        match control {
            Control::Button(b) => self.is_pressed(b),
            Control::Dpad(d) => self.dpad(d),
        }
    }

    pub fn set_active(&mut self, control: Control, pressed: bool) {
        match control {
            Control::Button(b) => self.set_pressed(b, pressed),
            Control::Dpad(d) => self.set_dpad(d, pressed),
        }
    }

    /// Zero every field without reallocating
    pub fn reset(&mut self) {
        *self = GamepadState::default();
    }

    /// Clamp axes to their declared ranges; NaN becomes 0
    pub fn clamp(&mut self) {
        for axis in [
            &mut self.thumb_lx,
            &mut self.thumb_ly,
            &mut self.thumb_rx,
            &mut self.thumb_ry,
        ] {
            *axis = clamp_unit(*axis, -1.0);
        }
        for trigger in [&mut self.trigger_l, &mut self.trigger_r] {
            *trigger = clamp_unit(*trigger, 0.0);
        }
    }

    /// Merge another contributor into this state
    ///
    /// Buttons and D-pad are OR-ed. Each axis takes the other value when it is
    /// non-zero, so the last non-zero contributor wins (no averaging).
    pub fn merge_from(&mut self, other: &GamepadState) {
        self.buttons |= other.buttons;
        for (mine, theirs) in self.dpad.iter_mut().zip(other.dpad.iter()) {
            *mine |= *theirs;
        }
        merge_axis(&mut self.thumb_lx, other.thumb_lx);
        merge_axis(&mut self.thumb_ly, other.thumb_ly);
        merge_axis(&mut self.thumb_rx, other.thumb_rx);
        merge_axis(&mut self.thumb_ry, other.thumb_ry);
        merge_axis(&mut self.trigger_l, other.trigger_l);
        merge_axis(&mut self.trigger_r, other.trigger_r);
    }

    /// POV hat value: -1 centred, 0..7 clockwise starting at up
    pub fn pov_hat(&self) -> i8 {
        let [up, right, down, left] = self.dpad;
        match (up, right, down, left) {
            (true, true, _, _) => 1,
            (_, true, true, _) => 3,
            (_, _, true, true) => 5,
            (true, _, _, true) => 7,
            (true, _, _, _) => 0,
            (_, true, _, _) => 2,
            (_, _, true, _) => 4,
            (_, _, _, true) => 6,
            _ => -1,
        }
    }
}

fn merge_axis(target: &mut f32, value: f32) {
    if value != 0.0 {
        *target = value;
    }
}

fn clamp_unit(value: f32, min: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(min, 1.0)
    }
}
