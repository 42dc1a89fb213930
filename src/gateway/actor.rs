//! PublisherActor - single owner of all per-slot controller state
//!
//! Every producer (input events, gyro samples, the fixed-rate ticker, the
//! turbo clock, guest queries) talks to this actor through a channel. The
//! actor aggregates, applies gyro and turbo at publish time, writes the
//! shared-memory records and pushes slot 0 to UDP subscribers.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace};

use super::commands::StateCommand;
use super::direct::DirectSender;
use super::handle::PublisherHandle;
use super::input_api::InputApiPolicy;
use crate::config::AppConfig;
use crate::engine::{
    ActiveController, Aggregator, AggregatorSettings, EventOutcome, GyroEngine, PhaseClock,
    TurboMasks,
};
use crate::host::{AssignmentStore, VirtualSource};
use crate::input::{GamepadState, InputSource, Slot};
use crate::protocol::{GamepadInfo, HostMessage};
use crate::rumble::SlotDeviceTable;
use crate::shm::SharedMemoryPublisher;

/// Everything the actor needs from the gateway at spawn time
pub(crate) struct PublisherParts {
    pub store: Arc<dyn AssignmentStore>,
    pub virtual_source: Arc<dyn VirtualSource>,
    pub shm: Arc<SharedMemoryPublisher>,
    pub direct: Arc<DirectSender>,
    pub clock: PhaseClock,
    pub slot_devices: SlotDeviceTable,
    pub initialized: watch::Receiver<bool>,
}

pub(crate) fn aggregator_settings(config: &AppConfig) -> AggregatorSettings {
    AggregatorSettings {
        trigger_mode: config.input.trigger_mode,
        virtual_exclusive: config.input.virtual_exclusive,
        adopt_unassigned: config.input.adopt_unassigned,
        players: config.shared_memory.players,
    }
}

pub struct PublisherActor {
    aggregator: Aggregator,
    gyro: GyroEngine,
    turbo: TurboMasks,
    clock: PhaseClock,
    policy: InputApiPolicy,
    dinput_mapper_type: u8,

    /// Reply addresses that asked for unsolicited state pushes
    subscribers: Vec<SocketAddr>,
    /// Set when the guest polled a different id than the physical slot-0
    /// controller; cleared by the next GET_GAMEPAD or slot-0 input
    physical_detached: bool,

    shm: Arc<SharedMemoryPublisher>,
    direct: Arc<DirectSender>,
    slot_devices: SlotDeviceTable,
    initialized: watch::Receiver<bool>,

    command_rx: mpsc::UnboundedReceiver<StateCommand>,

    /// Number of publish cycles processed
    cycle_count: u64,
}

impl PublisherActor {
    /// Spawn the actor and return a handle for interacting with it
    pub(crate) fn spawn(config: &AppConfig, parts: PublisherParts) -> PublisherHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let turbo = TurboMasks::from_config(&config.turbo);
        parts.clock.set_armed(turbo.any_enabled());

        let actor = PublisherActor {
            aggregator: Aggregator::new(
                aggregator_settings(config),
                parts.store,
                parts.virtual_source,
            ),
            gyro: GyroEngine::new(config.gyro.clone()),
            turbo,
            clock: parts.clock,
            policy: InputApiPolicy::new(config.input.preferred_input_api),
            dinput_mapper_type: config.input.dinput_mapper_type,
            subscribers: Vec::new(),
            physical_detached: false,
            shm: parts.shm,
            direct: parts.direct,
            slot_devices: parts.slot_devices,
            initialized: parts.initialized,
            command_rx: cmd_rx,
            cycle_count: 0,
        };

        tokio::spawn(actor.run());

        info!("PublisherActor spawned");

        PublisherHandle::new(cmd_tx)
    }

    async fn run(mut self) {
        debug!("PublisherActor run loop started");

        while let Some(cmd) = self.command_rx.recv().await {
            trace!(?cmd, "Processing command");

            match cmd {
                // Hot path commands (no response)
                StateCommand::GyroSample { x, y } => {
                    if self.gyro.fuse(x, y).is_some() {
                        self.publish_slot(0);
                        self.push_slot0();
                    }
                }
                StateCommand::PublishCycle => self.publish_cycle(),
                StateCommand::DeviceConnected(info) => {
                    let slot = self.aggregator.device_connected(info);
                    self.refresh_slot_devices();
                    if let Some(slot) = slot {
                        self.aggregator.update_merged_state(slot);
                        self.on_slot_updated(slot);
                    }
                }
                StateCommand::DeviceDisconnected(id) => {
                    let slot = self.aggregator.device_disconnected(id);
                    self.refresh_slot_devices();
                    if let Some(slot) = slot {
                        self.on_slot_updated(slot);
                    }
                }
                StateCommand::ApplyConfig(config) => self.apply_config(&config),
                StateCommand::ReleaseGamepad => {
                    self.subscribers.clear();
                    self.policy.release();
                    debug!("Gamepad released, subscribers cleared");
                }

                // Request-response commands
                StateCommand::KeyEvent {
                    device,
                    code,
                    pressed,
                    response,
                } => {
                    let outcome = self.aggregator.on_key_event(device, code, pressed);
                    if let EventOutcome::Updated(slot) = outcome {
                        self.on_input(slot);
                    }
                    let _ = response.send(outcome.handled());
                }
                StateCommand::MotionEvent {
                    device,
                    sample,
                    response,
                } => {
                    let outcome = self.aggregator.on_motion_event(device, &sample);
                    if let EventOutcome::Updated(slot) = outcome {
                        self.on_input(slot);
                    }
                    let _ = response.send(outcome.handled());
                }
                StateCommand::GetGamepad {
                    is_xinput,
                    notify,
                    process_id,
                    reply_to,
                    response,
                } => {
                    let reply = self.handle_get_gamepad(is_xinput, notify, process_id, reply_to);
                    let _ = response.send(reply);
                }
                StateCommand::GetGamepadState {
                    gamepad_id,
                    response,
                } => {
                    let reply = self.handle_get_gamepad_state(gamepad_id);
                    let _ = response.send(reply);
                }
                StateCommand::Snapshot { slot, response } => {
                    let _ = response.send(self.snapshot(slot));
                }
                StateCommand::SubscriberCount { response } => {
                    let _ = response.send(self.subscribers.len());
                }
                StateCommand::Shutdown => {
                    info!("PublisherActor received shutdown command");
                    break;
                }
            }
        }

        info!(
            cycles = self.cycle_count,
            "PublisherActor run loop terminated"
        );
    }

    /// Outgoing view of a slot: merged state, gyro offset, turbo gate
    fn snapshot(&self, slot: Slot) -> GamepadState {
        let mut state = self.aggregator.slot_state(slot);
        if slot == 0 {
            self.gyro.blend(&mut state);
        }
        self.turbo.apply_mask(slot, &mut state, self.clock.is_on());
        state
    }

    fn publish_slot(&self, slot: Slot) {
        self.shm.publish(slot, &self.snapshot(slot));
    }

    /// One unsolicited GET_GAMEPAD_STATE packet per subscriber
    fn push_slot0(&self) {
        if self.subscribers.is_empty() || !*self.initialized.borrow() {
            return;
        }
        let message = HostMessage::GamepadState(
            self.presented_controller()
                .map(|controller| (controller.device_id, self.snapshot(0))),
        );
        for target in &self.subscribers {
            self.direct.send_to(&message, *target);
        }
    }

    fn sync_gyro_activator(&mut self) {
        let pressed = self.gyro.activator_pressed(&self.aggregator.slot_state(0));
        self.gyro.update_activator(pressed);
    }

    /// Controller the guest currently sees on slot 0
    fn presented_controller(&self) -> Option<ActiveController> {
        let controller = self.aggregator.active_controller()?;
        match controller.source {
            InputSource::Physical(_) if self.physical_detached => {
                self.aggregator.virtual_controller()
            }
            _ => Some(controller),
        }
    }

    fn on_input(&mut self, slot: Slot) {
        if slot == 0 && self.physical_detached {
            debug!("Slot-0 input re-attached the physical controller");
            self.physical_detached = false;
        }
        self.on_slot_updated(slot);
    }

    fn on_slot_updated(&mut self, slot: Slot) {
        if slot == 0 {
            self.sync_gyro_activator();
        }
        self.publish_slot(slot);
        if slot == 0 {
            self.push_slot0();
        }
    }

    fn publish_cycle(&mut self) {
        self.cycle_count += 1;
        // Virtual input has no events of its own; pick it up here
        self.aggregator.update_merged_state(0);
        self.sync_gyro_activator();
        for slot in 0..self.aggregator.players() {
            self.publish_slot(slot);
        }
        self.push_slot0();
    }

    /// Replies for the controller presented when the poll arrived and echoes
    /// the requested id. A physical controller whose id differs from the
    /// poll stops being presented until it is picked up again.
    fn handle_get_gamepad_state(&mut self, gamepad_id: i32) -> HostMessage {
        let Some(controller) = self.presented_controller() else {
            return HostMessage::GamepadState(None);
        };
        if matches!(controller.source, InputSource::Physical(_))
            && controller.device_id != gamepad_id
        {
            debug!(
                requested = gamepad_id,
                current = controller.device_id,
                "GET_GAMEPAD_STATE for another id, detaching controller"
            );
            self.physical_detached = true;
        }
        HostMessage::GamepadState(Some((gamepad_id, self.snapshot(0))))
    }

    fn handle_get_gamepad(
        &mut self,
        is_xinput: bool,
        notify: bool,
        process_id: i32,
        reply_to: SocketAddr,
    ) -> HostMessage {
        self.physical_detached = false;
        let Some(controller) = self.presented_controller() else {
            self.subscribers.retain(|addr| *addr != reply_to);
            debug!(%reply_to, "GET_GAMEPAD: no controller");
            return HostMessage::GamepadInfo(None);
        };

        let enabled = self.policy.allows(is_xinput, process_id);

        if notify {
            if !self.subscribers.contains(&reply_to) {
                self.subscribers.push(reply_to);
                debug!(%reply_to, "Added gamepad subscriber");
            }
        } else {
            self.subscribers.retain(|addr| *addr != reply_to);
        }

        debug!(
            device_id = controller.device_id,
            name = %controller.name,
            is_xinput,
            process_id,
            enabled,
            "GET_GAMEPAD"
        );

        HostMessage::GamepadInfo(enabled.then(|| GamepadInfo {
            device_id: controller.device_id,
            input_type: self.dinput_mapper_type,
            name: controller.name,
        }))
    }

    fn apply_config(&mut self, config: &AppConfig) {
        self.aggregator.configure(aggregator_settings(config));
        if self.gyro.config() != &config.gyro {
            self.gyro.configure(config.gyro.clone());
        }
        self.turbo = TurboMasks::from_config(&config.turbo);
        self.clock.set_armed(self.turbo.any_enabled());
        self.policy.set_preferred(config.input.preferred_input_api);
        self.dinput_mapper_type = config.input.dinput_mapper_type;

        self.refresh_slot_devices();
        self.aggregator.update_all();
        self.publish_cycle();
        info!("Gateway settings applied");
    }

    fn refresh_slot_devices(&self) {
        let mut table = self.slot_devices.write();
        for (slot, entry) in table.iter_mut().enumerate() {
            *entry = self.aggregator.devices_in_slot(slot).first().copied();
        }
    }
}
