//! Gyroscope-to-stick fusion and its activation state machine
//!
//! Raw angular velocity goes through deadzone, inversion, gain and
//! exponential smoothing into a 2-D offset. The offset is blended into the
//! chosen stick of slot 0 when a snapshot is published; it is never written
//! back into the aggregated state.

use crate::config::{GyroActivator, GyroConfig, GyroMode, GyroStick};
use crate::input::analog::{apply_deadzone, apply_inversion};
use crate::input::GamepadState;

/// Horizontal base gain
pub const BASE_GAIN_X: f32 = 0.6;
/// Vertical base gain (pitch feels faster than yaw at equal rates)
pub const BASE_GAIN_Y: f32 = 0.45;
/// Headroom below the hard stick limit
pub const MAX_OFFSET: f32 = 0.95;
/// Smallest offset change worth publishing
pub const PUBLISH_EPSILON: f32 = 1e-4;
/// Trigger travel that counts as "held" for trigger activators
pub const TRIGGER_ACTIVATION: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct GyroEngine {
    config: GyroConfig,
    active: bool,
    /// Last observed activator level, for toggle edges
    activator_held: bool,
    smooth_x: f32,
    smooth_y: f32,
    offset_x: f32,
    offset_y: f32,
}

impl GyroEngine {
    pub fn new(config: GyroConfig) -> Self {
        Self {
            config,
            active: false,
            activator_held: false,
            smooth_x: 0.0,
            smooth_y: 0.0,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }

    /// Apply a reloaded config; the session restarts from rest
    pub fn configure(&mut self, config: GyroConfig) {
        *self = GyroEngine::new(config);
    }

    pub fn config(&self) -> &GyroConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn offset(&self) -> (f32, f32) {
        (self.offset_x, self.offset_y)
    }

    /// Whether the configured activator is held in `state`
    pub fn activator_pressed(&self, state: &GamepadState) -> bool {
        match self.config.activator {
            GyroActivator::Control(control) => state.is_active(control),
            GyroActivator::LeftTrigger => state.trigger_l > TRIGGER_ACTIVATION,
            GyroActivator::RightTrigger => state.trigger_r > TRIGGER_ACTIVATION,
        }
    }

    /// Feed the current activator level
    ///
    /// Hold mode follows the level. Toggle mode flips on a press edge and
    /// ignores releases. Returns `true` when the offset changed as a result
    /// (deactivation releases the stick).
    pub fn update_activator(&mut self, pressed: bool) -> bool {
        let was_active = self.active;
        match self.config.mode {
            GyroMode::Hold => self.active = pressed,
            GyroMode::Toggle => {
                if pressed && !self.activator_held {
                    self.active = !self.active;
                }
            }
        }
        self.activator_held = pressed;

        if was_active && !self.active {
            return self.release().is_some();
        }
        false
    }

    /// Process one raw sample
    ///
    /// Returns the new offset when it should be published. Non-finite
    /// samples are dropped without touching the accumulators.
    pub fn fuse(&mut self, raw_x: f32, raw_y: f32) -> Option<(f32, f32)> {
        if !raw_x.is_finite() || !raw_y.is_finite() {
            return None;
        }
        if !self.config.enabled || !self.active {
            return self.release();
        }

        let cfg = &self.config;
        let x = apply_inversion(apply_deadzone(raw_x, cfg.deadzone), cfg.invert_x)
            * BASE_GAIN_X
            * cfg.sensitivity_x;
        let y = apply_inversion(apply_deadzone(raw_y, cfg.deadzone), cfg.invert_y)
            * BASE_GAIN_Y
            * cfg.sensitivity_y;

        self.smooth_x = smooth(self.smooth_x, x, cfg.smoothing);
        self.smooth_y = smooth(self.smooth_y, y, cfg.smoothing);

        let next_x = self.smooth_x.clamp(-MAX_OFFSET, MAX_OFFSET);
        let next_y = self.smooth_y.clamp(-MAX_OFFSET, MAX_OFFSET);

        if (next_x - self.offset_x).abs() > PUBLISH_EPSILON
            || (next_y - self.offset_y).abs() > PUBLISH_EPSILON
        {
            self.offset_x = next_x;
            self.offset_y = next_y;
            Some((next_x, next_y))
        } else {
            None
        }
    }

    /// Add the offset to the configured stick of an outgoing snapshot
    pub fn blend(&self, state: &mut GamepadState) {
        if self.offset_x == 0.0 && self.offset_y == 0.0 {
            return;
        }
        let (x, y) = match self.config.stick {
            GyroStick::Left => (&mut state.thumb_lx, &mut state.thumb_ly),
            GyroStick::Right => (&mut state.thumb_rx, &mut state.thumb_ry),
        };
        *x = (*x + self.offset_x).clamp(-1.0, 1.0);
        *y = (*y + self.offset_y).clamp(-1.0, 1.0);
    }

    /// Zero the session; returns the zero offset once if one was published
    fn release(&mut self) -> Option<(f32, f32)> {
        self.smooth_x = 0.0;
        self.smooth_y = 0.0;
        if self.offset_x == 0.0 && self.offset_y == 0.0 {
            return None;
        }
        self.offset_x = 0.0;
        self.offset_y = 0.0;
        Some((0.0, 0.0))
    }
}

/// A zero input snaps to rest instead of decaying
fn smooth(previous: f32, sample: f32, factor: f32) -> f32 {
    if sample == 0.0 {
        0.0
    } else {
        previous * factor + sample * (1.0 - factor)
    }
}
