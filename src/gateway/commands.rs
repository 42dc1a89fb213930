//! Commands for the publisher actor
//!
//! Commands are divided into two categories:
//! - **Hot path** (no response): input samples and publish ticks
//! - **Request-response**: guest queries answered through a oneshot channel

use std::net::SocketAddr;

use tokio::sync::oneshot;

use crate::config::AppConfig;
use crate::input::{DeviceId, DeviceInfo, GamepadState, MotionSample};
use crate::protocol::HostMessage;

pub enum StateCommand {
    // -------------------------------------------------------------------------
    // Hot path commands (no response - fire and forget)
    // -------------------------------------------------------------------------
    /// One raw gyroscope sample
    GyroSample { x: f32, y: f32 },

    /// Rewrite every slot's shared-memory record and push slot 0 to subscribers
    ///
    /// Sent by the fixed-rate ticker and on every turbo phase flip.
    PublishCycle,

    DeviceConnected(DeviceInfo),

    DeviceDisconnected(DeviceId),

    /// Swap in reloaded settings
    ApplyConfig(Box<AppConfig>),

    /// Guest released its controller: drop subscribers and API claims
    ReleaseGamepad,

    // -------------------------------------------------------------------------
    // Request-response commands
    // -------------------------------------------------------------------------
    /// Physical key event; responds with "handled"
    KeyEvent {
        device: DeviceId,
        code: i32,
        pressed: bool,
        response: oneshot::Sender<bool>,
    },

    /// Physical motion event; responds with "handled"
    MotionEvent {
        device: DeviceId,
        sample: MotionSample,
        response: oneshot::Sender<bool>,
    },

    /// GET_GAMEPAD: register/deregister `reply_to` and build the reply
    GetGamepad {
        is_xinput: bool,
        notify: bool,
        process_id: i32,
        reply_to: SocketAddr,
        response: oneshot::Sender<HostMessage>,
    },

    /// GET_GAMEPAD_STATE: build the one-shot reply for slot 0
    GetGamepadState {
        gamepad_id: i32,
        response: oneshot::Sender<HostMessage>,
    },

    /// Published snapshot of a slot (turbo and gyro applied)
    Snapshot {
        slot: usize,
        response: oneshot::Sender<GamepadState>,
    },

    /// Number of push subscribers
    SubscriberCount { response: oneshot::Sender<usize> },

    Shutdown,
}

impl std::fmt::Debug for StateCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateCommand::GyroSample { x, y } => {
                f.debug_struct("GyroSample").field("x", x).field("y", y).finish()
            }
            StateCommand::PublishCycle => write!(f, "PublishCycle"),
            StateCommand::DeviceConnected(info) => {
                f.debug_tuple("DeviceConnected").field(&info.id).finish()
            }
            StateCommand::DeviceDisconnected(id) => {
                f.debug_tuple("DeviceDisconnected").field(id).finish()
            }
            StateCommand::ApplyConfig(_) => write!(f, "ApplyConfig"),
            StateCommand::ReleaseGamepad => write!(f, "ReleaseGamepad"),
            StateCommand::KeyEvent {
                device,
                code,
                pressed,
                ..
            } => f
                .debug_struct("KeyEvent")
                .field("device", device)
                .field("code", code)
                .field("pressed", pressed)
                .finish(),
            StateCommand::MotionEvent { device, .. } => {
                f.debug_struct("MotionEvent").field("device", device).finish()
            }
            StateCommand::GetGamepad {
                is_xinput,
                notify,
                process_id,
                reply_to,
                ..
            } => f
                .debug_struct("GetGamepad")
                .field("is_xinput", is_xinput)
                .field("notify", notify)
                .field("process_id", process_id)
                .field("reply_to", reply_to)
                .finish(),
            StateCommand::GetGamepadState { gamepad_id, .. } => f
                .debug_struct("GetGamepadState")
                .field("gamepad_id", gamepad_id)
                .finish(),
            StateCommand::Snapshot { slot, .. } => {
                f.debug_struct("Snapshot").field("slot", slot).finish()
            }
            StateCommand::SubscriberCount { .. } => write!(f, "SubscriberCount"),
            StateCommand::Shutdown => write!(f, "Shutdown"),
        }
    }
}
