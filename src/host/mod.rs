//! Interfaces to the host-side collaborators the gateway consumes
//!
//! The gateway never talks to the OS input stack, the touch overlay or the
//! vibrator directly. Embedders implement these traits; the bundled
//! implementations cover the standalone binary and tests.

pub mod assignments;

use parking_lot::RwLock;
use tracing::debug;

use crate::config::SlotAssignment;
use crate::input::{DeviceId, GamepadState, SiblingKey, Slot};
use crate::protocol::ProcessInfo;

pub use assignments::MemoryAssignmentStore;

/// Persisted slot → device assignment
pub trait AssignmentStore: Send + Sync {
    fn slot_for_device(&self, id: DeviceId) -> Option<Slot>;

    /// Slot of a stored device with the same vendor/product/name identity
    fn slot_for_sibling(&self, _key: &SiblingKey) -> Option<Slot> {
        None
    }

    fn is_slot_enabled(&self, slot: Slot) -> bool;

    fn is_vibration_enabled(&self, slot: Slot) -> bool;

    /// Static assignments from a reloaded config; stores fed from elsewhere
    /// keep their own data
    fn reload(&self, _assignments: &[SlotAssignment]) {}
}

/// Identity the virtual gamepad presents in GET_GAMEPAD replies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualProfile {
    pub id: i32,
    pub name: String,
}

/// On-screen virtual gamepad / touch overlay
pub trait VirtualSource: Send + Sync {
    fn current_virtual_state(&self) -> Option<GamepadState>;

    fn is_virtual_gamepad_active(&self) -> bool;

    fn profile(&self) -> Option<VirtualProfile> {
        None
    }
}

/// Vibration target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HapticTarget {
    /// The controller's own motor
    Device(DeviceId),
    /// The host body actuator
    Host,
}

pub trait HapticActuator: Send + Sync {
    fn has_actuator(&self, target: HapticTarget) -> bool;

    /// One-shot vibration; `amplitude` is 1..=255
    fn vibrate(&self, target: HapticTarget, amplitude: u8, duration_ms: u64);

    fn cancel(&self, target: HapticTarget);
}

/// Receives process descriptors reported by the guest
pub trait ProcessInfoListener: Send + Sync {
    /// `info` is `None` for an empty listing
    fn on_process_info(&self, index: i16, count: i16, info: Option<ProcessInfo>);
}

/// Virtual source that never has input
#[derive(Debug, Default)]
pub struct NoVirtualSource;

impl VirtualSource for NoVirtualSource {
    fn current_virtual_state(&self) -> Option<GamepadState> {
        None
    }

    fn is_virtual_gamepad_active(&self) -> bool {
        false
    }
}

/// Virtual source whose state is pushed by the embedder
#[derive(Debug, Default)]
pub struct SharedVirtualSource {
    inner: RwLock<SharedVirtual>,
}

#[derive(Debug, Default)]
struct SharedVirtual {
    state: Option<GamepadState>,
    active: bool,
    profile: Option<VirtualProfile>,
}

impl SharedVirtualSource {
    pub fn new(profile: Option<VirtualProfile>) -> Self {
        Self {
            inner: RwLock::new(SharedVirtual {
                profile,
                ..Default::default()
            }),
        }
    }

    pub fn set_state(&self, state: GamepadState) {
        self.inner.write().state = Some(state);
    }

    pub fn set_active(&self, active: bool) {
        self.inner.write().active = active;
    }
}

impl VirtualSource for SharedVirtualSource {
    fn current_virtual_state(&self) -> Option<GamepadState> {
        self.inner.read().state
    }

    fn is_virtual_gamepad_active(&self) -> bool {
        self.inner.read().active
    }

    fn profile(&self) -> Option<VirtualProfile> {
        self.inner.read().profile.clone()
    }
}

/// Actuator that only logs; used when no vibrator is available
#[derive(Debug, Default)]
pub struct LoggingHaptics;

impl HapticActuator for LoggingHaptics {
    fn has_actuator(&self, target: HapticTarget) -> bool {
        matches!(target, HapticTarget::Host)
    }

    fn vibrate(&self, target: HapticTarget, amplitude: u8, duration_ms: u64) {
        debug!(?target, amplitude, duration_ms, "Vibrate");
    }

    fn cancel(&self, target: HapticTarget) {
        debug!(?target, "Cancel vibration");
    }
}

/// Listener that logs every reported process
#[derive(Debug, Default)]
pub struct LoggingProcessListener;

impl ProcessInfoListener for LoggingProcessListener {
    fn on_process_info(&self, index: i16, count: i16, info: Option<ProcessInfo>) {
        match info {
            Some(info) => debug!(
                index,
                count,
                pid = info.pid,
                name = %info.name,
                memory = info.memory_usage,
                "Guest process"
            ),
            None => debug!("Guest process list empty"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Button;

    #[test]
    fn test_shared_virtual_source() {
        let source = SharedVirtualSource::new(Some(VirtualProfile {
            id: 3,
            name: "Touch".into(),
        }));
        assert!(!source.is_virtual_gamepad_active());
        assert_eq!(source.current_virtual_state(), None);

        let mut state = GamepadState::default();
        state.set_pressed(Button::Y, true);
        source.set_state(state);
        source.set_active(true);

        assert!(source.is_virtual_gamepad_active());
        assert_eq!(source.current_virtual_state(), Some(state));
        assert_eq!(source.profile().map(|p| p.id), Some(3));
    }
}
