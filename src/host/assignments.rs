//! In-memory assignment store backed by the `assignments` config section

use parking_lot::RwLock;

use super::AssignmentStore;
use crate::config::{DeviceMatch, SlotAssignment};
use crate::input::device::sanitize_name;
use crate::input::{DeviceId, SiblingKey, Slot, MAX_SLOTS};

/// Slots without an entry are enabled with vibration on
pub struct MemoryAssignmentStore {
    slots: RwLock<Vec<SlotAssignment>>,
}

impl MemoryAssignmentStore {
    pub fn new(assignments: Vec<SlotAssignment>) -> Self {
        Self {
            slots: RwLock::new(assignments),
        }
    }

    /// Swap in a reloaded assignment list
    pub fn replace(&self, assignments: Vec<SlotAssignment>) {
        *self.slots.write() = assignments;
    }

    fn find_slot(&self, pred: impl Fn(&DeviceMatch) -> bool) -> Option<Slot> {
        self.slots
            .read()
            .iter()
            .filter(|entry| entry.slot < MAX_SLOTS)
            .find(|entry| entry.devices.iter().any(&pred))
            .map(|entry| entry.slot)
    }

    fn slot_flag(&self, slot: Slot, flag: impl Fn(&SlotAssignment) -> bool) -> bool {
        self.slots
            .read()
            .iter()
            .find(|entry| entry.slot == slot)
            .map_or(true, flag)
    }
}

impl AssignmentStore for MemoryAssignmentStore {
    fn slot_for_device(&self, id: DeviceId) -> Option<Slot> {
        self.find_slot(|device| device.id == Some(id.0))
    }

    fn slot_for_sibling(&self, key: &SiblingKey) -> Option<Slot> {
        self.find_slot(|device| {
            device.vendor_id == Some(key.vendor_id)
                && device.product_id == Some(key.product_id)
                && device
                    .name
                    .as_deref()
                    .map_or(true, |name| sanitize_name(name) == key.name)
        })
    }

    fn is_slot_enabled(&self, slot: Slot) -> bool {
        slot < MAX_SLOTS && self.slot_flag(slot, |entry| entry.enabled)
    }

    fn is_vibration_enabled(&self, slot: Slot) -> bool {
        self.slot_flag(slot, |entry| entry.vibration)
    }

    fn reload(&self, assignments: &[SlotAssignment]) {
        self.replace(assignments.to_vec());
    }
}
