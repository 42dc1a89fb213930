//! Turbo/autofire: a shared phase clock and per-slot enable masks
//!
//! The phase clock is shared by every slot. While it is OFF, controls whose
//! turbo bit is set read as released regardless of the physical state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::TurboConfig;
use crate::input::{Button, Control, Dpad, GamepadState, Slot, MAX_SLOTS};

/// Nominal phase length
pub const TURBO_PERIOD_MS: u64 = 33;

/// Shared on/off clock
///
/// Cloned handles observe the same phase. The clock only advances while it is
/// armed (some slot has a turbo mask); disarmed it rests in the ON phase.
#[derive(Clone)]
pub struct PhaseClock {
    start_instant: Instant,
    period_ms: u64,
    phase_on: Arc<AtomicBool>,
    armed: Arc<AtomicBool>,
    /// Milliseconds since `start_instant` of the last flip
    last_flip_ms: Arc<AtomicU64>,
}

impl PhaseClock {
    pub fn new(period_ms: u64) -> Self {
        Self {
            start_instant: Instant::now(),
            period_ms,
            phase_on: Arc::new(AtomicBool::new(true)),
            armed: Arc::new(AtomicBool::new(false)),
            last_flip_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    fn current_time_ms(&self) -> u64 {
        self.start_instant.elapsed().as_millis() as u64
    }

    pub fn is_on(&self) -> bool {
        self.phase_on.load(Ordering::Relaxed)
    }

    pub fn set_armed(&self, armed: bool) {
        self.armed.store(armed, Ordering::Relaxed);
        if !armed {
            self.phase_on.store(true, Ordering::Relaxed);
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Relaxed)
    }

    /// Advance the clock; returns `true` when the phase flipped
    pub fn tick(&self) -> bool {
        if !self.is_armed() {
            return false;
        }
        let now = self.current_time_ms();
        let last = self.last_flip_ms.load(Ordering::Relaxed);
        if now.saturating_sub(last) < self.period_ms {
            return false;
        }
        self.last_flip_ms.store(now, Ordering::Relaxed);
        self.phase_on.fetch_xor(true, Ordering::Relaxed);
        true
    }
}

impl Default for PhaseClock {
    fn default() -> Self {
        Self::new(TURBO_PERIOD_MS)
    }
}

/// Per-slot turbo enable bits, indexed by [`Control::index`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurboMasks {
    masks: [[bool; Control::COUNT]; MAX_SLOTS],
    include_triggers: [bool; MAX_SLOTS],
}

impl TurboMasks {
    pub fn from_config(config: &TurboConfig) -> Self {
        let mut masks = TurboMasks::default();
        for entry in &config.slots {
            if entry.slot >= MAX_SLOTS {
                continue;
            }
            for control in &entry.buttons {
                masks.set(entry.slot, *control, true);
            }
            masks.include_triggers[entry.slot] = entry.include_triggers;
        }
        masks
    }

    pub fn set(&mut self, slot: Slot, control: Control, enabled: bool) {
        if let Some(mask) = self.masks.get_mut(slot) {
            mask[control.index()] = enabled;
        }
    }

    pub fn set_include_triggers(&mut self, slot: Slot, enabled: bool) {
        if let Some(flag) = self.include_triggers.get_mut(slot) {
            *flag = enabled;
        }
    }

    pub fn is_enabled(&self, slot: Slot, control: Control) -> bool {
        self.masks
            .get(slot)
            .is_some_and(|mask| mask[control.index()])
    }

    /// Whether anything would oscillate at all
    pub fn any_enabled(&self) -> bool {
        self.masks.iter().flatten().any(|enabled| *enabled)
            || self.include_triggers.iter().any(|enabled| *enabled)
    }

    /// Gate `state` for `slot` according to the current phase
    ///
    /// A no-op while the phase is ON. While OFF, masked controls are released
    /// and, with `include_triggers`, both trigger axes drop to zero.
    pub fn apply_mask(&self, slot: Slot, state: &mut GamepadState, phase_on: bool) {
        if phase_on || slot >= MAX_SLOTS {
            return;
        }
        for (index, enabled) in self.masks[slot].iter().enumerate() {
            if *enabled {
                state.set_active(control_at(index), false);
            }
        }
        if self.include_triggers[slot] {
            state.trigger_l = 0.0;
            state.trigger_r = 0.0;
        }
    }
}

fn control_at(index: usize) -> Control {
    if index < Button::COUNT {
        Control::Button(Button::ALL[index])
    } else {
        Control::Dpad(Dpad::ALL[index - Button::COUNT])
    }
}
