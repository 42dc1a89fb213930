//! Rumble relay and the 5 ms poller that also drives the turbo clock
//!
//! The guest writes rumble strengths into bytes 32..36 of each slot's
//! shared-memory record. Changes are turned into one-shot pulses on the
//! slot's controller, or on the host body actuator for slot 0.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, info, trace};

use crate::config::RumbleConfig;
use crate::engine::PhaseClock;
use crate::gateway::{stopped, PublisherHandle};
use crate::host::{AssignmentStore, HapticActuator, HapticTarget};
use crate::input::{DeviceId, Slot, MAX_SLOTS};
use crate::shm::SharedMemoryPublisher;

pub const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Exponent applied before driving the host body actuator
pub const HOST_CURVE_EXPONENT: f32 = 0.6;

/// First controller feeding each slot, kept current by the publisher actor
pub type SlotDeviceTable = Arc<RwLock<[Option<DeviceId>; MAX_SLOTS]>>;

/// Single-channel amplitude 1..=255 from the guest's two motor strengths
///
/// 1 means "off".
pub fn amplitude(low: u16, high: u16) -> u8 {
    let strongest = low.max(high) as f32 / u16::MAX as f32;
    let scaled = (strongest * 254.0).round() as u32 + 1;
    scaled.min(255) as u8
}

/// Perceptual curve for the host actuator; `None` when too weak to feel
pub fn host_amplitude(amplitude: u8) -> Option<u8> {
    let curved = (amplitude as f32 / 255.0).powf(HOST_CURVE_EXPONENT) * 255.0;
    // Truncates; the float-to-int cast saturates at 255
    let curved = curved as u8;
    (curved > 1).then_some(curved)
}

pub struct RumbleRelay {
    shm: Arc<SharedMemoryPublisher>,
    haptics: Arc<dyn HapticActuator>,
    store: Arc<dyn AssignmentStore>,
    slot_devices: SlotDeviceTable,
    config: Arc<RwLock<RumbleConfig>>,
    last: [(u16, u16); MAX_SLOTS],
    /// Target currently vibrating per slot, for cancellation
    active: [Option<HapticTarget>; MAX_SLOTS],
}

impl RumbleRelay {
    pub fn new(
        shm: Arc<SharedMemoryPublisher>,
        haptics: Arc<dyn HapticActuator>,
        store: Arc<dyn AssignmentStore>,
        slot_devices: SlotDeviceTable,
        config: Arc<RwLock<RumbleConfig>>,
    ) -> Self {
        Self {
            shm,
            haptics,
            store,
            slot_devices,
            config,
            last: [(0, 0); MAX_SLOTS],
            active: [None; MAX_SLOTS],
        }
    }

    /// Read every mapped slot once and react to changes
    pub fn poll(&mut self) {
        for slot in 0..MAX_SLOTS {
            let Some(values) = self.shm.read_rumble(slot) else {
                continue;
            };
            if values != self.last[slot] {
                self.last[slot] = values;
                self.drive(slot, values.0, values.1);
            }
        }
    }

    fn target_for(&self, slot: Slot) -> Option<HapticTarget> {
        let device = self.slot_devices.read()[slot]
            .map(HapticTarget::Device)
            .filter(|target| self.haptics.has_actuator(*target));
        device.or_else(|| {
            (slot == 0 && self.haptics.has_actuator(HapticTarget::Host))
                .then_some(HapticTarget::Host)
        })
    }

    fn drive(&mut self, slot: Slot, low: u16, high: u16) {
        let config = self.config.read().clone();
        let amp = amplitude(low, high);
        trace!(slot, low, high, amp, "Rumble change");

        if !config.enabled || !self.store.is_vibration_enabled(slot) || amp <= 1 {
            self.stop(slot);
            return;
        }

        let Some(target) = self.target_for(slot) else {
            return;
        };
        let strength = match target {
            HapticTarget::Device(_) => Some(amp),
            HapticTarget::Host => host_amplitude(amp),
        };
        let Some(strength) = strength else {
            self.stop(slot);
            return;
        };

        if let Some(previous) = self.active[slot].filter(|previous| *previous != target) {
            self.haptics.cancel(previous);
        }
        self.haptics.vibrate(target, strength, config.pulse_ms);
        self.active[slot] = Some(target);
    }

    fn stop(&mut self, slot: Slot) {
        if let Some(target) = self.active[slot].take() {
            self.haptics.cancel(target);
            debug!(slot, ?target, "Rumble stopped");
        }
    }

    /// Cancel everything still vibrating
    pub fn stop_all(&mut self) {
        for slot in 0..MAX_SLOTS {
            self.stop(slot);
        }
    }
}

/// Poll rumble and advance the turbo clock until the gateway stops
///
/// A turbo phase flip triggers a full republish so held turbo buttons
/// visibly oscillate without waiting for new input.
pub(crate) async fn run_poller(
    mut relay: RumbleRelay,
    clock: PhaseClock,
    publisher: PublisherHandle,
    mut running: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stopped(&mut running) => break,
        }

        if clock.tick() {
            publisher.publish_cycle();
        }
        relay.poll();
    }

    relay.stop_all();
    info!("Rumble poller stopped");
}
