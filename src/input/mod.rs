//! Gamepad input model
//!
//! Canonical gamepad state, the logical control enumeration, device identity
//! and the translation of raw device events into per-device state.

pub mod analog;
pub mod device;
pub mod keycodes;
pub mod state;
pub mod translate;

pub use device::{DeviceId, DeviceInfo, InputSource, SiblingKey};
pub use state::{Button, Control, Dpad, GamepadState};
pub use translate::{MotionSample, TriggerMode};

/// Logical player index 0..=3
pub type Slot = usize;

/// Number of player slots the guest can address
pub const MAX_SLOTS: usize = 4;
