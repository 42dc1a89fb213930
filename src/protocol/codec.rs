//! Datagram encode/decode
//!
//! Pure functions over byte buffers. Outbound encoders truncate strings
//! deterministically to stay inside the 64-byte budget instead of failing:
//! the guest has no way to report an oversized packet back.

use bytes::{Buf, BufMut, BytesMut};

use super::{mouse_flags, RequestCode, MAX_PACKET_SIZE};
use crate::error::DecodeError;
use crate::input::GamepadState;

/// Longest controller name carried by a GET_GAMEPAD reply
pub const MAX_GAMEPAD_NAME: usize = 54;
/// Longest process name carried by KILL_PROCESS
pub const MAX_KILL_NAME: usize = 55;
/// Longest process name carried by BRING_TO_FRONT
pub const MAX_FRONT_NAME: usize = 51;
/// Longest process name carried by SET_PROCESS_AFFINITY
pub const MAX_AFFINITY_NAME: usize = 50;
/// Combined file + parameter budget carried by EXEC
pub const MAX_EXEC_ARGS: usize = MAX_PACKET_SIZE - 1 - 12;

const PROCESS_NAME_FIELD: usize = 32;
const GET_PROCESS_PAYLOAD: usize = 4 + 2 + 2 + 4 + 8 + 4 + 1 + PROCESS_NAME_FIELD;
const GET_GAMEPAD_PAYLOAD: usize = 1 + 1 + 4;
const GET_GAMEPAD_STATE_PAYLOAD: usize = 4;
const CURSOR_FEEDBACK_PAYLOAD: usize = 2 + 2;

/// Guest process descriptor reported through GET_PROCESS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: i32,
    pub name: String,
    pub memory_usage: i64,
    pub affinity_mask: i32,
    pub wow64: bool,
}

/// Guest → host request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Init,
    GetProcess {
        index: i16,
        count: i16,
        info: ProcessInfo,
    },
    GetGamepad {
        is_xinput: bool,
        notify: bool,
        process_id: i32,
    },
    GetGamepadState {
        gamepad_id: i32,
    },
    ReleaseGamepad,
    CursorPosFeedback {
        x: i16,
        y: i16,
    },
}

/// Identity the slot-0 controller presents to the guest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GamepadInfo {
    pub device_id: i32,
    pub input_type: u8,
    pub name: String,
}

/// Host → guest message
#[derive(Debug, Clone, PartialEq)]
pub enum HostMessage {
    Exec { file: String, params: String },
    KillProcess { name: Option<String>, pid: i32 },
    ListProcesses,
    SetAffinityByName { name: String, mask: i32 },
    SetAffinityByPid { pid: i32, mask: i32 },
    MouseEvent { flags: i32, dx: i16, dy: i16, wheel: i16 },
    KeyboardEvent { vkey: u8, flags: i32 },
    BringToFront { name: String, handle: i64 },
    ClipboardHeader { len: usize },
    /// `None` encodes the "no controller" reply
    GamepadInfo(Option<GamepadInfo>),
    /// `None` encodes the "disabled" state reply
    GamepadState(Option<(i32, GamepadState)>),
}

/// Decode one inbound datagram
pub fn decode_request(datagram: &[u8]) -> Result<Request, DecodeError> {
    let (&raw_code, rest) = datagram.split_first().ok_or(DecodeError::Empty)?;
    let code = RequestCode::try_from(raw_code).map_err(DecodeError::UnknownCode)?;
    let mut payload = rest;

    match code {
        RequestCode::Init => Ok(Request::Init),
        RequestCode::GetProcess => {
            require(raw_code, payload, GET_PROCESS_PAYLOAD)?;
            payload.advance(4);
            let count = payload.get_i16_le();
            let index = payload.get_i16_le();
            let pid = payload.get_i32_le();
            let memory_usage = payload.get_i64_le();
            let affinity_mask = payload.get_i32_le();
            let wow64 = payload.get_u8() == 1;
            let name = from_ansi(&payload[..PROCESS_NAME_FIELD]);
            Ok(Request::GetProcess {
                index,
                count,
                info: ProcessInfo {
                    pid,
                    name,
                    memory_usage,
                    affinity_mask,
                    wow64,
                },
            })
        }
        RequestCode::GetGamepad => {
            require(raw_code, payload, GET_GAMEPAD_PAYLOAD)?;
            let is_xinput = payload.get_u8() == 1;
            let notify = payload.get_u8() == 1;
            let process_id = payload.get_i32_le();
            Ok(Request::GetGamepad {
                is_xinput,
                notify,
                process_id,
            })
        }
        RequestCode::GetGamepadState => {
            require(raw_code, payload, GET_GAMEPAD_STATE_PAYLOAD)?;
            Ok(Request::GetGamepadState {
                gamepad_id: payload.get_i32_le(),
            })
        }
        RequestCode::ReleaseGamepad => Ok(Request::ReleaseGamepad),
        RequestCode::CursorPosFeedback => {
            require(raw_code, payload, CURSOR_FEEDBACK_PAYLOAD)?;
            let x = payload.get_i16_le();
            let y = payload.get_i16_le();
            Ok(Request::CursorPosFeedback { x, y })
        }
        _ => Err(DecodeError::WrongDirection(raw_code)),
    }
}

fn require(code: u8, payload: &[u8], needed: usize) -> Result<(), DecodeError> {
    if payload.len() < needed {
        return Err(DecodeError::Truncated {
            code,
            needed,
            got: payload.len(),
        });
    }
    Ok(())
}

/// NUL-terminated ANSI string, decoded lossily
fn from_ansi(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// First `max` bytes of `s`, cut on the byte boundary like the guest expects
pub fn truncated(s: &str, max: usize) -> &[u8] {
    let bytes = s.as_bytes();
    &bytes[..bytes.len().min(max)]
}

impl HostMessage {
    pub fn code(&self) -> RequestCode {
        match self {
            HostMessage::Exec { .. } => RequestCode::Exec,
            HostMessage::KillProcess { .. } => RequestCode::KillProcess,
            HostMessage::ListProcesses => RequestCode::ListProcesses,
            HostMessage::SetAffinityByName { .. } | HostMessage::SetAffinityByPid { .. } => {
                RequestCode::SetProcessAffinity
            }
            HostMessage::MouseEvent { .. } => RequestCode::MouseEvent,
            HostMessage::KeyboardEvent { .. } => RequestCode::KeyboardEvent,
            HostMessage::BringToFront { .. } => RequestCode::BringToFront,
            HostMessage::ClipboardHeader { .. } => RequestCode::SetClipboardData,
            HostMessage::GamepadInfo(_) => RequestCode::GetGamepad,
            HostMessage::GamepadState(_) => RequestCode::GetGamepadState,
        }
    }

    /// Encode into `buf`, replacing its contents
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.clear();
        buf.put_u8(self.code().as_u8());

        match self {
            HostMessage::Exec { file, params } => {
                let file = truncated(file, MAX_EXEC_ARGS);
                let params = truncated(params, MAX_EXEC_ARGS - file.len());
                buf.put_i32_le((file.len() + params.len() + 8) as i32);
                buf.put_i32_le(file.len() as i32);
                buf.put_i32_le(params.len() as i32);
                buf.put_slice(file);
                buf.put_slice(params);
            }
            HostMessage::KillProcess { name, pid } => {
                match name {
                    Some(name) => {
                        let name = truncated(name, MAX_KILL_NAME);
                        buf.put_i32_le(name.len() as i32);
                        buf.put_slice(name);
                    }
                    None => buf.put_i32_le(0),
                }
                buf.put_i32_le(*pid);
            }
            HostMessage::ListProcesses => buf.put_i32_le(0),
            HostMessage::SetAffinityByName { name, mask } => {
                let name = truncated(name, MAX_AFFINITY_NAME);
                buf.put_i32_le(name.len() as i32 + 9);
                buf.put_i32_le(0);
                buf.put_i32_le(*mask);
                buf.put_u8(name.len() as u8);
                buf.put_slice(name);
            }
            HostMessage::SetAffinityByPid { pid, mask } => {
                buf.put_i32_le(9);
                buf.put_i32_le(*pid);
                buf.put_i32_le(*mask);
                buf.put_u8(0);
            }
            HostMessage::MouseEvent {
                flags,
                dx,
                dy,
                wheel,
            } => {
                buf.put_i32_le(10);
                buf.put_i32_le(*flags);
                buf.put_i16_le(*dx);
                buf.put_i16_le(*dy);
                buf.put_i16_le(*wheel);
                // Ask the guest to report the resulting cursor position
                buf.put_u8(u8::from(flags & mouse_flags::MOVE != 0));
            }
            HostMessage::KeyboardEvent { vkey, flags } => {
                buf.put_u8(*vkey);
                buf.put_i32_le(*flags);
            }
            HostMessage::BringToFront { name, handle } => {
                let name = truncated(name, MAX_FRONT_NAME);
                buf.put_i32_le(name.len() as i32);
                buf.put_slice(name);
                buf.put_i64_le(*handle);
            }
            HostMessage::ClipboardHeader { len } => {
                buf.put_i32_le(i32::try_from(*len).unwrap_or(i32::MAX));
            }
            HostMessage::GamepadInfo(Some(info)) => {
                let name = truncated(&info.name, MAX_GAMEPAD_NAME);
                buf.put_i32_le(info.device_id);
                buf.put_u8(info.input_type);
                buf.put_i32_le(name.len() as i32);
                buf.put_slice(name);
            }
            HostMessage::GamepadInfo(None) => {
                buf.put_i32_le(0);
                buf.put_u8(0);
                buf.put_i32_le(0);
            }
            HostMessage::GamepadState(Some((id, state))) => {
                buf.put_u8(1);
                buf.put_i32_le(*id);
                put_gamepad_state(buf, state);
            }
            HostMessage::GamepadState(None) => buf.put_u8(0),
        }
    }
}

/// 6×f32 axes, u16 button mask, i8 POV hat
fn put_gamepad_state(buf: &mut BytesMut, state: &GamepadState) {
    buf.put_f32_le(state.thumb_lx);
    buf.put_f32_le(state.thumb_ly);
    buf.put_f32_le(state.thumb_rx);
    buf.put_f32_le(state.thumb_ry);
    buf.put_f32_le(state.trigger_l);
    buf.put_f32_le(state.trigger_r);
    buf.put_u16_le(state.buttons);
    buf.put_i8(state.pov_hat());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{Button, Dpad};

    fn encode(message: &HostMessage) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(MAX_PACKET_SIZE);
        message.encode(&mut buf);
        buf.to_vec()
    }

    #[test]
    fn test_decode_get_gamepad() {
        let datagram = [8u8, 1, 1, 0x39, 0x05, 0, 0];
        assert_eq!(
            decode_request(&datagram),
            Ok(Request::GetGamepad {
                is_xinput: true,
                notify: true,
                process_id: 0x0539,
            })
        );
    }

    #[test]
    fn test_decode_get_process() {
        let mut datagram = vec![5u8];
        datagram.extend_from_slice(&[0; 4]);
        datagram.extend_from_slice(&3i16.to_le_bytes());
        datagram.extend_from_slice(&1i16.to_le_bytes());
        datagram.extend_from_slice(&4242i32.to_le_bytes());
        datagram.extend_from_slice(&(64 * 1024 * 1024i64).to_le_bytes());
        datagram.extend_from_slice(&0x0fi32.to_le_bytes());
        datagram.push(1);
        let mut name = [0u8; 32];
        name[..11].copy_from_slice(b"explorer.ex");
        datagram.extend_from_slice(&name);

        let Ok(Request::GetProcess { index, count, info }) = decode_request(&datagram) else {
            panic!("expected GetProcess");
        };
        assert_eq!((index, count), (1, 3));
        assert_eq!(info.pid, 4242);
        assert_eq!(info.name, "explorer.ex");
        assert_eq!(info.memory_usage, 64 * 1024 * 1024);
        assert_eq!(info.affinity_mask, 0x0f);
        assert!(info.wow64);
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(decode_request(&[]), Err(DecodeError::Empty));
        assert_eq!(decode_request(&[0]), Err(DecodeError::UnknownCode(0)));
        assert_eq!(decode_request(&[200]), Err(DecodeError::UnknownCode(200)));
        assert_eq!(
            decode_request(&[9, 1, 2]),
            Err(DecodeError::Truncated {
                code: 9,
                needed: 4,
                got: 2
            })
        );
        assert_eq!(decode_request(&[2, 0, 0]), Err(DecodeError::WrongDirection(2)));
    }

    #[test]
    fn test_decode_cursor_feedback() {
        let datagram = [13u8, 0x20, 0x03, 0xff, 0xff];
        assert_eq!(
            decode_request(&datagram),
            Ok(Request::CursorPosFeedback { x: 800, y: -1 })
        );
    }

    #[test]
    fn test_long_gamepad_name_is_truncated() {
        let name = "N".repeat(80);
        let bytes = encode(&HostMessage::GamepadInfo(Some(GamepadInfo {
            device_id: 7,
            input_type: 1,
            name,
        })));
        assert_eq!(bytes.len(), MAX_PACKET_SIZE);
        assert_eq!(bytes[0], RequestCode::GetGamepad.as_u8());
        assert_eq!(i32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]), 7);
        assert_eq!(bytes[5], 1);
        assert_eq!(i32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]), 54);
        assert_eq!(&bytes[10..], "N".repeat(54).as_bytes());
    }

    #[test]
    fn test_disabled_gamepad_info() {
        assert_eq!(encode(&HostMessage::GamepadInfo(None)), vec![8, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_gamepad_state_layout() {
        let mut state = GamepadState {
            thumb_lx: 0.5,
            trigger_r: 1.0,
            ..Default::default()
        };
        state.set_pressed(Button::A, true);
        state.set_pressed(Button::Start, true);
        state.set_dpad(Dpad::Down, true);

        let bytes = encode(&HostMessage::GamepadState(Some((3, state))));
        assert_eq!(bytes.len(), 33);
        assert_eq!(bytes[1], 1);
        assert_eq!(&bytes[2..6], &3i32.to_le_bytes());
        assert_eq!(&bytes[6..10], &0.5f32.to_le_bytes());
        assert_eq!(&bytes[26..30], &1.0f32.to_le_bytes());
        assert_eq!(u16::from_le_bytes([bytes[30], bytes[31]]), 0b1000_0001);
        assert_eq!(bytes[32] as i8, 4);

        assert_eq!(encode(&HostMessage::GamepadState(None)), vec![9, 0]);
    }

    #[test]
    fn test_exec_layout_and_truncation() {
        let bytes = encode(&HostMessage::Exec {
            file: "wfm.exe".into(),
            params: "C:\\".into(),
        });
        assert_eq!(&bytes[1..5], &(7 + 3 + 8i32).to_le_bytes());
        assert_eq!(&bytes[5..9], &7i32.to_le_bytes());
        assert_eq!(&bytes[9..13], &3i32.to_le_bytes());
        assert_eq!(&bytes[13..], b"wfm.exeC:\\");

        let long = encode(&HostMessage::Exec {
            file: "f".repeat(40),
            params: "p".repeat(40),
        });
        assert_eq!(long.len(), MAX_PACKET_SIZE);
        assert_eq!(&long[9..13], &11i32.to_le_bytes());
    }

    #[test]
    fn test_fixed_budget_messages_fit() {
        let name = "x".repeat(100);
        for message in [
            HostMessage::KillProcess {
                name: Some(name.clone()),
                pid: 1,
            },
            HostMessage::BringToFront {
                name: name.clone(),
                handle: 0x1234,
            },
            HostMessage::SetAffinityByName {
                name: name.clone(),
                mask: 3,
            },
        ] {
            assert_eq!(encode(&message).len(), MAX_PACKET_SIZE, "{:?}", message.code());
        }
    }

    #[test]
    fn test_mouse_move_requests_feedback() {
        let moved = encode(&HostMessage::MouseEvent {
            flags: mouse_flags::MOVE,
            dx: -5,
            dy: 7,
            wheel: 0,
        });
        assert_eq!(moved.len(), 16);
        assert_eq!(moved[15], 1);

        let click = encode(&HostMessage::MouseEvent {
            flags: mouse_flags::LEFT_DOWN,
            dx: 0,
            dy: 0,
            wheel: 0,
        });
        assert_eq!(click[15], 0);
    }

    #[test]
    fn test_affinity_by_pid() {
        let bytes = encode(&HostMessage::SetAffinityByPid { pid: 99, mask: 0b11 });
        assert_eq!(bytes, vec![6, 9, 0, 0, 0, 99, 0, 0, 0, 3, 0, 0, 0, 0]);
    }
}
