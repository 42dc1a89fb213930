//! Per-slot controller state aggregation
//!
//! Every physical device keeps its own cached [`GamepadState`]. A slot's
//! state is rebuilt from scratch by merging the caches of every device that
//! resolves to it, plus the virtual gamepad for slot 0.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::host::{AssignmentStore, VirtualSource};
use crate::input::translate::{apply_key, apply_motion};
use crate::input::{
    DeviceId, DeviceInfo, GamepadState, InputSource, MotionSample, SiblingKey, Slot, TriggerMode,
    MAX_SLOTS,
};

/// Aggregation knobs taken from the `input` config section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorSettings {
    pub trigger_mode: TriggerMode,
    pub virtual_exclusive: bool,
    pub adopt_unassigned: bool,
    pub players: usize,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            trigger_mode: TriggerMode::default(),
            virtual_exclusive: false,
            adopt_unassigned: true,
            players: MAX_SLOTS,
        }
    }
}

/// Result of feeding one raw input event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Not a gamepad event, or the device has no enabled slot
    Ignored,
    /// Swallowed without effect (virtual exclusivity)
    Consumed,
    /// The slot's merged state was rebuilt
    Updated(Slot),
}

impl EventOutcome {
    pub fn handled(self) -> bool {
        !matches!(self, EventOutcome::Ignored)
    }
}

/// Identity of the controller currently driving slot 0
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveController {
    pub source: InputSource,
    pub device_id: i32,
    pub name: String,
}

/// Name reported when the virtual gamepad has no profile
pub const VIRTUAL_GAMEPAD_NAME: &str = "Virtual Gamepad";
const VIRTUAL_GAMEPAD_ID: i32 = 1;

#[derive(Debug)]
struct DeviceEntry {
    info: DeviceInfo,
    state: GamepadState,
}

pub struct Aggregator {
    settings: AggregatorSettings,
    store: Arc<dyn AssignmentStore>,
    virtual_source: Arc<dyn VirtualSource>,
    /// Announced devices, ordered so merges are deterministic
    devices: BTreeMap<DeviceId, DeviceEntry>,
    /// Store-assigned id last seen for each identity, kept across
    /// disconnects so a re-enumerated controller finds its slot again
    departed: HashMap<SiblingKey, DeviceId>,
    slots: [GamepadState; MAX_SLOTS],
}

impl Aggregator {
    pub fn new(
        settings: AggregatorSettings,
        store: Arc<dyn AssignmentStore>,
        virtual_source: Arc<dyn VirtualSource>,
    ) -> Self {
        Self {
            settings,
            store,
            virtual_source,
            devices: BTreeMap::new(),
            departed: HashMap::new(),
            slots: [GamepadState::default(); MAX_SLOTS],
        }
    }

    pub fn configure(&mut self, settings: AggregatorSettings) {
        self.settings = settings;
    }

    pub fn settings(&self) -> AggregatorSettings {
        self.settings
    }

    pub fn players(&self) -> usize {
        self.settings.players.clamp(1, MAX_SLOTS)
    }

    /// Merged state of `slot` as of the last rebuild
    pub fn slot_state(&self, slot: Slot) -> GamepadState {
        self.slots.get(slot).copied().unwrap_or_default()
    }

    /// Register a device descriptor; returns the slot it resolves to
    pub fn device_connected(&mut self, info: DeviceInfo) -> Option<Slot> {
        let id = info.id;
        self.devices
            .entry(id)
            .and_modify(|entry| entry.info = info.clone())
            .or_insert_with(|| DeviceEntry {
                info,
                state: GamepadState::default(),
            });
        let slot = self.resolve_slot(id);
        debug!(device = %id, ?slot, "Device connected");
        slot
    }

    /// Drop a device and rebuild the slot it was feeding
    pub fn device_disconnected(&mut self, id: DeviceId) -> Option<Slot> {
        let slot = self.resolve_slot(id);
        let entry = self.devices.remove(&id)?;
        let anchor = self
            .store
            .slot_for_device(id)
            .map(|_| id)
            .or_else(|| self.live_sibling_anchor(&entry.info.sibling_key(), id));
        if let Some(anchor) = anchor {
            self.departed.insert(entry.info.sibling_key(), anchor);
        }
        debug!(device = %id, ?slot, "Device disconnected");
        if let Some(slot) = slot {
            self.update_merged_state(slot);
        }
        slot
    }

    /// Slot a device feeds, if any
    ///
    /// Only announced devices resolve. Tries the store's exact id first, then
    /// the same vendor/product/name identity (a controller re-enumerated
    /// under a new id, whether or not the old id is still connected), then
    /// adoption into slot 0.
    pub fn resolve_slot(&self, id: DeviceId) -> Option<Slot> {
        let entry = self.devices.get(&id)?;
        let slot = self
            .store
            .slot_for_device(id)
            .or_else(|| self.sibling_slot(id, &entry.info.sibling_key()))
            .or(self.settings.adopt_unassigned.then_some(0))?;

        (slot < self.players() && self.store.is_slot_enabled(slot)).then_some(slot)
    }

    fn sibling_slot(&self, id: DeviceId, key: &SiblingKey) -> Option<Slot> {
        self.live_sibling_anchor(key, id)
            .or_else(|| self.departed.get(key).copied())
            .and_then(|anchor| self.store.slot_for_device(anchor))
            .or_else(|| self.store.slot_for_sibling(key))
    }

    /// Connected device other than `id` with the same identity and a stored slot
    fn live_sibling_anchor(&self, key: &SiblingKey, id: DeviceId) -> Option<DeviceId> {
        self.devices
            .iter()
            .filter(|(other, entry)| **other != id && entry.info.sibling_key() == *key)
            .map(|(other, _)| *other)
            .find(|other| self.store.slot_for_device(*other).is_some())
    }

    /// Devices currently feeding `slot`
    pub fn devices_in_slot(&self, slot: Slot) -> Vec<DeviceId> {
        self.devices
            .keys()
            .copied()
            .filter(|id| self.resolve_slot(*id) == Some(slot))
            .collect()
    }

    fn virtual_engaged(&self) -> bool {
        self.settings.virtual_exclusive && self.virtual_source.is_virtual_gamepad_active()
    }

    pub fn on_key_event(&mut self, id: DeviceId, code: i32, pressed: bool) -> EventOutcome {
        let Some(slot) = self.resolve_slot(id) else {
            return EventOutcome::Ignored;
        };
        if slot == 0 && self.virtual_engaged() {
            return EventOutcome::Consumed;
        }

        let mode = self.settings.trigger_mode;
        let Some(entry) = self.devices.get_mut(&id) else {
            return EventOutcome::Ignored;
        };
        if !apply_key(&mut entry.state, code, pressed, mode) {
            return EventOutcome::Ignored;
        }
        trace!(device = %id, code, pressed, slot, "Key event");

        self.update_merged_state(slot);
        EventOutcome::Updated(slot)
    }

    pub fn on_motion_event(&mut self, id: DeviceId, sample: &MotionSample) -> EventOutcome {
        let Some(slot) = self.resolve_slot(id) else {
            return EventOutcome::Ignored;
        };
        if slot == 0 && self.virtual_engaged() {
            return EventOutcome::Consumed;
        }

        let mode = self.settings.trigger_mode;
        let Some(entry) = self.devices.get_mut(&id) else {
            return EventOutcome::Ignored;
        };
        apply_motion(&mut entry.state, sample, mode);

        self.update_merged_state(slot);
        EventOutcome::Updated(slot)
    }

    /// Rebuild `slot` from every contributing source
    ///
    /// Buttons are OR-ed; each axis keeps the last non-zero contributor, so
    /// two devices pushing opposite directions do not cancel out.
    pub fn update_merged_state(&mut self, slot: Slot) {
        if slot >= MAX_SLOTS {
            return;
        }
        let mut merged = GamepadState::default();

        let skip_physical = slot == 0 && self.virtual_engaged();
        if !skip_physical {
            for (id, entry) in &self.devices {
                if self.resolve_slot(*id) == Some(slot) {
                    merged.merge_from(&entry.state);
                }
            }
        }

        if slot == 0 && self.virtual_source.is_virtual_gamepad_active() {
            if let Some(virtual_state) = self.virtual_source.current_virtual_state() {
                merged.merge_from(&virtual_state);
            }
        }

        merged.clamp();
        self.slots[slot] = merged;
    }

    pub fn update_all(&mut self) {
        for slot in 0..self.players() {
            self.update_merged_state(slot);
        }
    }

    /// Identity of the virtual gamepad while it is active
    pub fn virtual_controller(&self) -> Option<ActiveController> {
        if !self.virtual_source.is_virtual_gamepad_active() {
            return None;
        }
        let (device_id, name) = match self.virtual_source.profile() {
            Some(profile) => (profile.id, profile.name),
            None => (VIRTUAL_GAMEPAD_ID, VIRTUAL_GAMEPAD_NAME.to_string()),
        };
        Some(ActiveController {
            source: InputSource::Virtual,
            device_id,
            name,
        })
    }

    /// Controller presented to the guest, if slot 0 has one
    pub fn active_controller(&self) -> Option<ActiveController> {
        if self.settings.virtual_exclusive {
            if let Some(controller) = self.virtual_controller() {
                return Some(controller);
            }
        }

        let physical = self.devices.iter().find_map(|(id, entry)| {
            (self.resolve_slot(*id) == Some(0)).then(|| ActiveController {
                source: InputSource::Physical(*id),
                device_id: id.0,
                name: entry.info.name.clone(),
            })
        });

        physical.or_else(|| self.virtual_controller())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeviceMatch, SlotAssignment};
    use crate::host::{MemoryAssignmentStore, NoVirtualSource, SharedVirtualSource, VirtualProfile};
    use crate::input::keycodes::*;
    use crate::input::Button;

    fn store_with(slot: Slot, ids: &[i32]) -> Arc<MemoryAssignmentStore> {
        Arc::new(MemoryAssignmentStore::new(vec![SlotAssignment {
            slot,
            enabled: true,
            vibration: true,
            devices: ids
                .iter()
                .map(|id| DeviceMatch {
                    id: Some(*id),
                    ..Default::default()
                })
                .collect(),
        }]))
    }

    fn strict() -> AggregatorSettings {
        AggregatorSettings {
            adopt_unassigned: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_sibling_devices_merge_into_one_slot() {
        let mut agg = Aggregator::new(strict(), store_with(1, &[10]), Arc::new(NoVirtualSource));
        agg.device_connected(DeviceInfo::new(10, 0x045e, 0x028e, "Xbox 360 Controller"));
        // Same controller re-enumerated under a new id
        agg.device_connected(DeviceInfo::new(11, 0x045e, 0x028e, "Xbox 360 Controller"));

        assert_eq!(agg.resolve_slot(DeviceId(11)), Some(1));

        agg.on_key_event(DeviceId(10), KEYCODE_BUTTON_A, true);
        assert_eq!(
            agg.on_key_event(DeviceId(11), KEYCODE_BUTTON_B, true),
            EventOutcome::Updated(1)
        );

        let state = agg.slot_state(1);
        assert!(state.is_pressed(Button::A));
        assert!(state.is_pressed(Button::B));

        // Releasing on one device keeps the other's press
        agg.on_key_event(DeviceId(10), KEYCODE_BUTTON_A, false);
        agg.on_key_event(DeviceId(11), KEYCODE_BUTTON_A, true);
        assert!(agg.slot_state(1).is_pressed(Button::A));
    }

    #[test]
    fn test_reconnect_under_new_id_keeps_slot() {
        let mut agg = Aggregator::new(strict(), store_with(1, &[10]), Arc::new(NoVirtualSource));
        assert_eq!(
            agg.device_connected(DeviceInfo::new(10, 0x045e, 0x028e, "Xbox 360 Controller")),
            Some(1)
        );
        assert_eq!(agg.device_disconnected(DeviceId(10)), Some(1));

        assert_eq!(
            agg.device_connected(DeviceInfo::new(11, 0x045e, 0x028e, "Xbox 360 Controller")),
            Some(1)
        );
        assert_eq!(agg.resolve_slot(DeviceId(11)), Some(1));
        assert_eq!(
            agg.on_key_event(DeviceId(11), KEYCODE_BUTTON_A, true),
            EventOutcome::Updated(1)
        );

        // A different controller does not inherit the slot
        agg.device_connected(DeviceInfo::new(12, 0x054c, 0x0ce6, "DualSense"));
        assert_eq!(agg.resolve_slot(DeviceId(12)), None);
    }

    #[test]
    fn test_unannounced_device_is_ignored() {
        let mut agg = Aggregator::new(
            AggregatorSettings::default(),
            Arc::new(MemoryAssignmentStore::new(vec![])),
            Arc::new(NoVirtualSource),
        );

        assert_eq!(agg.resolve_slot(DeviceId(99)), None);
        assert_eq!(
            agg.on_key_event(DeviceId(99), KEYCODE_DPAD_UP, true),
            EventOutcome::Ignored
        );
        let sample = MotionSample {
            lx: 1.0,
            ..Default::default()
        };
        assert_eq!(agg.on_motion_event(DeviceId(99), &sample), EventOutcome::Ignored);

        assert_eq!(agg.slot_state(0), GamepadState::default());
        assert!(agg.devices_in_slot(0).is_empty());
        assert_eq!(agg.active_controller(), None);
    }

    #[test]
    fn test_unassigned_device() {
        let mut agg = Aggregator::new(strict(), store_with(1, &[10]), Arc::new(NoVirtualSource));
        agg.device_connected(DeviceInfo::new(20, 1, 2, "Other Pad"));
        assert_eq!(agg.resolve_slot(DeviceId(20)), None);
        assert_eq!(
            agg.on_key_event(DeviceId(20), KEYCODE_BUTTON_A, true),
            EventOutcome::Ignored
        );

        agg.configure(AggregatorSettings::default());
        assert_eq!(agg.resolve_slot(DeviceId(20)), Some(0));
        assert!(agg.on_key_event(DeviceId(20), KEYCODE_BUTTON_A, true).handled());
        assert!(agg.slot_state(0).is_pressed(Button::A));
    }

    #[test]
    fn test_slot_beyond_players_is_ignored() {
        let settings = AggregatorSettings {
            players: 1,
            ..strict()
        };
        let agg = Aggregator::new(settings, store_with(2, &[5]), Arc::new(NoVirtualSource));
        assert_eq!(agg.resolve_slot(DeviceId(5)), None);
    }

    #[test]
    fn test_disconnect_clears_contribution() {
        let mut agg = Aggregator::new(strict(), store_with(2, &[7]), Arc::new(NoVirtualSource));
        agg.device_connected(DeviceInfo::new(7, 1, 1, "Pad"));
        agg.on_key_event(DeviceId(7), KEYCODE_BUTTON_X, true);
        assert!(agg.slot_state(2).is_pressed(Button::X));

        assert_eq!(agg.device_disconnected(DeviceId(7)), Some(2));
        assert_eq!(agg.slot_state(2), GamepadState::default());
        assert_eq!(agg.device_disconnected(DeviceId(7)), None);
    }

    #[test]
    fn test_virtual_merges_additively() {
        let virtual_source = Arc::new(SharedVirtualSource::new(None));
        let mut pad = GamepadState::default();
        pad.set_pressed(Button::Y, true);
        virtual_source.set_state(pad);
        virtual_source.set_active(true);

        let mut agg = Aggregator::new(
            AggregatorSettings::default(),
            Arc::new(MemoryAssignmentStore::new(vec![])),
            virtual_source.clone(),
        );
        agg.device_connected(DeviceInfo::new(3, 1, 1, "Pad"));
        agg.on_key_event(DeviceId(3), KEYCODE_BUTTON_A, true);

        let state = agg.slot_state(0);
        assert!(state.is_pressed(Button::A));
        assert!(state.is_pressed(Button::Y));
        // Physical controller wins the GET_GAMEPAD identity when not exclusive
        assert_eq!(agg.active_controller().unwrap().device_id, 3);
    }

    #[test]
    fn test_virtual_exclusive_ignores_physical_slot0() {
        let virtual_source = Arc::new(SharedVirtualSource::new(Some(VirtualProfile {
            id: 9,
            name: "Overlay".into(),
        })));
        virtual_source.set_active(true);
        virtual_source.set_state(GamepadState::default());

        let settings = AggregatorSettings {
            virtual_exclusive: true,
            ..Default::default()
        };
        let mut agg = Aggregator::new(
            settings,
            Arc::new(MemoryAssignmentStore::new(vec![])),
            virtual_source.clone(),
        );
        agg.device_connected(DeviceInfo::new(3, 1, 1, "Pad"));

        assert_eq!(
            agg.on_key_event(DeviceId(3), KEYCODE_BUTTON_A, true),
            EventOutcome::Consumed
        );
        assert!(!agg.slot_state(0).is_pressed(Button::A));

        let controller = agg.active_controller().unwrap();
        assert_eq!(controller.source, InputSource::Virtual);
        assert_eq!(controller.device_id, 9);
        assert_eq!(controller.name, "Overlay");

        virtual_source.set_active(false);
        assert!(agg.on_key_event(DeviceId(3), KEYCODE_BUTTON_A, true).handled());
        assert!(agg.slot_state(0).is_pressed(Button::A));
    }

    #[test]
    fn test_motion_event_updates_axes() {
        let mut agg = Aggregator::new(
            AggregatorSettings::default(),
            store_with(0, &[1]),
            Arc::new(NoVirtualSource),
        );
        agg.device_connected(DeviceInfo::new(1, 1, 1, "Pad"));
        let sample = MotionSample {
            lx: 0.5,
            r_trigger: 0.8,
            ..Default::default()
        };
        assert_eq!(agg.on_motion_event(DeviceId(1), &sample), EventOutcome::Updated(0));
        let state = agg.slot_state(0);
        assert_eq!(state.thumb_lx, 0.5);
        assert_eq!(state.trigger_r, 0.8);
        assert!(state.is_pressed(Button::R2));
    }

    #[test]
    fn test_no_controller_without_sources() {
        let agg = Aggregator::new(strict(), store_with(1, &[1]), Arc::new(NoVirtualSource));
        assert_eq!(agg.active_controller(), None);
    }
}
