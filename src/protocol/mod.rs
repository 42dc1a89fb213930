//! Guest wire protocol
//!
//! UDP datagrams are little-endian, at most 64 bytes, and start with a
//! one-byte request code. The shared-memory gamepad record lives in
//! [`record`].

pub mod codec;
pub mod record;

pub use codec::{decode_request, GamepadInfo, HostMessage, ProcessInfo, Request};

/// Port the host listens on
pub const SERVER_PORT: u16 = 7947;

/// Port the guest listens on for host-initiated commands
pub const CLIENT_PORT: u16 = 7946;

/// Upper bound for every datagram except the clipboard payload
pub const MAX_PACKET_SIZE: usize = 64;

/// First byte of every datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RequestCode {
    Init = 1,
    Exec = 2,
    KillProcess = 3,
    ListProcesses = 4,
    GetProcess = 5,
    SetProcessAffinity = 6,
    MouseEvent = 7,
    GetGamepad = 8,
    GetGamepadState = 9,
    ReleaseGamepad = 10,
    KeyboardEvent = 11,
    BringToFront = 12,
    CursorPosFeedback = 13,
    SetClipboardData = 14,
}

impl RequestCode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for RequestCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let code = match value {
            1 => RequestCode::Init,
            2 => RequestCode::Exec,
            3 => RequestCode::KillProcess,
            4 => RequestCode::ListProcesses,
            5 => RequestCode::GetProcess,
            6 => RequestCode::SetProcessAffinity,
            7 => RequestCode::MouseEvent,
            8 => RequestCode::GetGamepad,
            9 => RequestCode::GetGamepadState,
            10 => RequestCode::ReleaseGamepad,
            11 => RequestCode::KeyboardEvent,
            12 => RequestCode::BringToFront,
            13 => RequestCode::CursorPosFeedback,
            14 => RequestCode::SetClipboardData,
            other => return Err(other),
        };
        Ok(code)
    }
}

/// Windows `MOUSEEVENTF_*` flags carried by MOUSE_EVENT
pub mod mouse_flags {
    pub const MOVE: i32 = 0x0001;
    pub const LEFT_DOWN: i32 = 0x0002;
    pub const LEFT_UP: i32 = 0x0004;
    pub const RIGHT_DOWN: i32 = 0x0008;
    pub const RIGHT_UP: i32 = 0x0010;
    pub const MIDDLE_DOWN: i32 = 0x0020;
    pub const MIDDLE_UP: i32 = 0x0040;
    pub const WHEEL: i32 = 0x0800;
}
