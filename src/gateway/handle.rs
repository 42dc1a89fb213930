//! Handles for interacting with a running gateway
//!
//! [`PublisherHandle`] wraps the publisher actor's command channel.
//! [`GatewayHandle`] is the public surface embedders hold: it feeds input
//! into the actor and queues host→guest commands.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use super::commands::StateCommand;
use super::sender::{Action, ActionQueue};
use super::{PointerPosition, PointerState, SharedListener};
use crate::config::{AppConfig, RumbleConfig};
use crate::host::{AssignmentStore, ProcessInfoListener};
use crate::input::{DeviceId, DeviceInfo, GamepadState, MotionSample, Slot};
use crate::protocol::HostMessage;

/// Handle for the publisher actor
///
/// # Hot Path Methods (fire-and-forget)
/// - `gyro_sample`, `publish_cycle`, `device_connected`, `device_disconnected`
///
/// # Query Methods (async with response)
/// - `key_event` / `motion_event` - returns whether the event was consumed
/// - `get_gamepad` / `get_gamepad_state` - guest query replies
/// - `snapshot` - published view of a slot
#[derive(Clone)]
pub struct PublisherHandle {
    cmd_tx: mpsc::UnboundedSender<StateCommand>,
}

impl PublisherHandle {
    pub fn new(cmd_tx: mpsc::UnboundedSender<StateCommand>) -> Self {
        Self { cmd_tx }
    }

    fn send(&self, cmd: StateCommand) {
        let _ = self.cmd_tx.send(cmd);
    }

    async fn query<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> StateCommand) -> Option<T> {
        let (response_tx, response_rx) = oneshot::channel();
        if self.cmd_tx.send(build(response_tx)).is_err() {
            return None;
        }
        response_rx.await.ok()
    }

    // =========================================================================
    // Hot path methods (fire-and-forget, no await)
    // =========================================================================

    pub fn gyro_sample(&self, x: f32, y: f32) {
        self.send(StateCommand::GyroSample { x, y });
    }

    pub fn publish_cycle(&self) {
        self.send(StateCommand::PublishCycle);
    }

    pub fn device_connected(&self, info: DeviceInfo) {
        self.send(StateCommand::DeviceConnected(info));
    }

    pub fn device_disconnected(&self, id: DeviceId) {
        self.send(StateCommand::DeviceDisconnected(id));
    }

    pub fn apply_config(&self, config: AppConfig) {
        self.send(StateCommand::ApplyConfig(Box::new(config)));
    }

    pub fn release_gamepad(&self) {
        self.send(StateCommand::ReleaseGamepad);
    }

    pub fn shutdown(&self) {
        self.send(StateCommand::Shutdown);
    }

    // =========================================================================
    // Query methods (async with response)
    // =========================================================================

    pub async fn key_event(&self, device: DeviceId, code: i32, pressed: bool) -> bool {
        self.query(|response| StateCommand::KeyEvent {
            device,
            code,
            pressed,
            response,
        })
        .await
        .unwrap_or(false)
    }

    pub async fn motion_event(&self, device: DeviceId, sample: MotionSample) -> bool {
        self.query(|response| StateCommand::MotionEvent {
            device,
            sample,
            response,
        })
        .await
        .unwrap_or(false)
    }

    pub async fn get_gamepad(
        &self,
        is_xinput: bool,
        notify: bool,
        process_id: i32,
        reply_to: SocketAddr,
    ) -> Option<HostMessage> {
        self.query(|response| StateCommand::GetGamepad {
            is_xinput,
            notify,
            process_id,
            reply_to,
            response,
        })
        .await
    }

    pub async fn get_gamepad_state(&self, gamepad_id: i32) -> Option<HostMessage> {
        self.query(|response| StateCommand::GetGamepadState {
            gamepad_id,
            response,
        })
        .await
    }

    /// Published view of a slot, with turbo and gyro applied
    pub async fn snapshot(&self, slot: Slot) -> GamepadState {
        self.query(|response| StateCommand::Snapshot { slot, response })
            .await
            .unwrap_or_default()
    }

    pub async fn subscriber_count(&self) -> usize {
        self.query(|response| StateCommand::SubscriberCount { response })
            .await
            .unwrap_or(0)
    }
}

/// Every consumer of reloadable settings
///
/// Shared by the public handle and the INIT reload so both paths update the
/// assignment store, the rumble relay and the actor together. Network and
/// shared-memory sections stay at their startup values.
#[derive(Clone)]
pub(crate) struct LiveSettings {
    pub startup: Arc<AppConfig>,
    pub store: Arc<dyn AssignmentStore>,
    pub rumble: Arc<RwLock<RumbleConfig>>,
    pub publisher: PublisherHandle,
}

impl LiveSettings {
    pub(crate) fn apply(&self, config: AppConfig) {
        if self.startup.needs_restart_for(&config) {
            warn!("Network and shared-memory changes apply after a restart");
        }
        let config = self.startup.merge_live(config);
        self.store.reload(&config.assignments);
        *self.rumble.write() = config.rumble.clone();
        self.publisher.apply_config(config);
    }
}

/// Public handle to a running gateway; cheap to clone
#[derive(Clone)]
pub struct GatewayHandle {
    publisher: PublisherHandle,
    actions: ActionQueue,
    client: SocketAddr,
    initialized: watch::Receiver<bool>,
    pointer: PointerState,
    listener: SharedListener,
    settings: LiveSettings,
}

impl GatewayHandle {
    pub(crate) fn new(
        publisher: PublisherHandle,
        actions: ActionQueue,
        client: SocketAddr,
        initialized: watch::Receiver<bool>,
        pointer: PointerState,
        listener: SharedListener,
        settings: LiveSettings,
    ) -> Self {
        Self {
            publisher,
            actions,
            client,
            initialized,
            pointer,
            listener,
            settings,
        }
    }

    pub fn publisher(&self) -> &PublisherHandle {
        &self.publisher
    }

    /// Whether the guest has sent INIT
    pub fn is_initialized(&self) -> bool {
        *self.initialized.borrow()
    }

    /// Guest address host-initiated commands are sent to
    pub fn client_addr(&self) -> SocketAddr {
        self.client
    }

    fn enqueue(&self, message: HostMessage) {
        self.actions.push(Action::Send {
            message,
            target: self.client,
        });
    }

    // =========================================================================
    // Host → guest commands (queued, sent after INIT in FIFO order)
    // =========================================================================

    pub fn exec(&self, file: &str, params: &str) {
        self.enqueue(HostMessage::Exec {
            file: file.to_string(),
            params: params.to_string(),
        });
    }

    /// Kill by name, by pid, or both; the guest matches whichever is set
    pub fn kill_process(&self, name: Option<&str>, pid: i32) {
        self.enqueue(HostMessage::KillProcess {
            name: name.map(str::to_string),
            pid,
        });
    }

    pub fn list_processes(&self) {
        self.enqueue(HostMessage::ListProcesses);
    }

    pub fn set_process_affinity_by_name(&self, name: &str, mask: i32) {
        self.enqueue(HostMessage::SetAffinityByName {
            name: name.to_string(),
            mask,
        });
    }

    pub fn set_process_affinity_by_pid(&self, pid: i32, mask: i32) {
        self.enqueue(HostMessage::SetAffinityByPid { pid, mask });
    }

    pub fn bring_to_front(&self, name: &str, handle: i64) {
        self.enqueue(HostMessage::BringToFront {
            name: name.to_string(),
            handle,
        });
    }

    /// Synthetic pointer input; dropped before INIT
    pub fn mouse_event(&self, flags: i32, dx: i16, dy: i16, wheel: i16) {
        if !self.is_initialized() {
            debug!("Mouse event dropped, guest not initialized");
            return;
        }
        self.enqueue(HostMessage::MouseEvent {
            flags,
            dx,
            dy,
            wheel,
        });
    }

    /// Synthetic key input; dropped before INIT
    pub fn keyboard_event(&self, vkey: u8, flags: i32) {
        if !self.is_initialized() {
            debug!("Keyboard event dropped, guest not initialized");
            return;
        }
        self.enqueue(HostMessage::KeyboardEvent { vkey, flags });
    }

    pub fn set_clipboard_data(&self, text: &str) {
        self.actions.push(Action::Clipboard {
            text: text.to_string(),
            target: self.client,
        });
    }

    // =========================================================================
    // Input from host collaborators
    // =========================================================================

    /// Returns `true` when the event was consumed by the gamepad path
    pub async fn on_key_event(&self, device: DeviceId, code: i32, pressed: bool) -> bool {
        self.publisher.key_event(device, code, pressed).await
    }

    pub async fn on_motion_event(&self, device: DeviceId, sample: MotionSample) -> bool {
        self.publisher.motion_event(device, sample).await
    }

    pub fn on_gyro_sample(&self, x: f32, y: f32) {
        self.publisher.gyro_sample(x, y);
    }

    pub fn device_connected(&self, info: DeviceInfo) {
        self.publisher.device_connected(info);
    }

    pub fn device_disconnected(&self, id: DeviceId) {
        self.publisher.device_disconnected(id);
    }

    pub fn set_process_listener(&self, listener: Option<Arc<dyn ProcessInfoListener>>) {
        *self.listener.write() = listener;
    }

    /// Swap in new settings without restarting the socket
    ///
    /// Reloads the assignment store as well. Network and shared-memory
    /// location changes need a restart.
    pub fn apply_config(&self, config: AppConfig) {
        self.settings.apply(config);
    }

    pub async fn snapshot(&self, slot: Slot) -> GamepadState {
        self.publisher.snapshot(slot).await
    }

    /// Last pointer position reported by the guest
    pub fn pointer(&self) -> PointerPosition {
        self.pointer.get()
    }
}
