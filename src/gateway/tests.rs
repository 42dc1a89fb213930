//! Loopback tests for the gateway

use super::*;
use crate::config::{DeviceMatch, SlotAssignment, TurboSlotConfig};
use crate::input::keycodes::{KEYCODE_BUTTON_A, KEYCODE_BUTTON_B, KEYCODE_BUTTON_L1};
use crate::input::{Button, Control, DeviceId, DeviceInfo, GamepadState, Slot};
use crate::protocol::record::Record;
use crate::protocol::{mouse_flags, RequestCode};
use std::time::Duration;
use tokio::time::timeout;

const PAD_ID: i32 = 7;
/// Assigned to slot 1 by [`second_slot`]
const SECOND_PAD_ID: i32 = 8;

struct Harness {
    gateway: Gateway,
    handle: GatewayHandle,
    guest: UdpSocket,
    server: SocketAddr,
    dir: tempfile::TempDir,
}

impl Harness {
    async fn send(&self, datagram: &[u8]) {
        self.guest.send_to(datagram, self.server).await.unwrap();
    }

    async fn recv(&self) -> Option<Vec<u8>> {
        self.recv_within(Duration::from_millis(1000)).await
    }

    async fn recv_within(&self, wait: Duration) -> Option<Vec<u8>> {
        let mut buf = [0u8; 256];
        match timeout(wait, self.guest.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => Some(buf[..len].to_vec()),
            _ => None,
        }
    }

    async fn expect_silence(&self) {
        assert_eq!(self.recv_within(Duration::from_millis(100)).await, None);
    }

    async fn init(&self) {
        self.send(&[RequestCode::Init.as_u8()]).await;
        for _ in 0..100 {
            if self.handle.is_initialized() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("gateway never saw INIT");
    }

    fn connect_pad(&self) {
        self.handle
            .device_connected(DeviceInfo::new(PAD_ID, 0x045e, 0x028e, "Test Pad"));
    }

    async fn get_gamepad(&self, is_xinput: bool, notify: bool, pid: i32) -> Vec<u8> {
        let mut datagram = vec![
            RequestCode::GetGamepad.as_u8(),
            u8::from(is_xinput),
            u8::from(notify),
        ];
        datagram.extend_from_slice(&pid.to_le_bytes());
        self.send(&datagram).await;
        self.recv().await.expect("GET_GAMEPAD reply")
    }

    async fn poll_state(&self, gamepad_id: i32) -> Vec<u8> {
        let mut poll = vec![RequestCode::GetGamepadState.as_u8()];
        poll.extend_from_slice(&gamepad_id.to_le_bytes());
        self.send(&poll).await;
        self.recv().await.expect("GET_GAMEPAD_STATE reply")
    }

    fn read_slot(&self, slot: Slot) -> GamepadState {
        let bytes = std::fs::read(SharedMemoryPublisher::region_path(self.dir.path(), slot)).unwrap();
        Record::read_from(&bytes).to_state()
    }

    async fn wait_for_subscribers(&self, expected: usize) {
        for _ in 0..100 {
            if self.handle.publisher().subscriber_count().await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("subscriber count never reached {}", expected);
    }
}

async fn harness() -> Harness {
    harness_with(AppConfig::default()).await
}

async fn harness_with(config: AppConfig) -> Harness {
    harness_from(config, None).await
}

async fn harness_from(mut config: AppConfig, config_path: Option<PathBuf>) -> Harness {
    let guest = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    config.network.bind_address = "127.0.0.1".to_string();
    config.network.server_port = 0;
    config.network.client_port = guest.local_addr().unwrap().port();
    config.shared_memory.players = 2;

    let dir = tempfile::tempdir().unwrap();
    let mut options = GatewayOptions::new(dir.path());
    options.publish_interval = None;
    options.config_path = config_path;

    let collaborators = Collaborators::from_config(&config);
    let gateway = Gateway::start(config, collaborators, options)
        .await
        .unwrap();
    let server = gateway.local_addr();
    let handle = gateway.handle();

    Harness {
        gateway,
        handle,
        guest,
        server,
        dir,
    }
}

fn i32_at(packet: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes(packet[offset..offset + 4].try_into().unwrap())
}

fn f32_at(packet: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes(packet[offset..offset + 4].try_into().unwrap())
}

/// Buttons word of a 33-byte GET_GAMEPAD_STATE packet
fn buttons_of(packet: &[u8]) -> u16 {
    u16::from_le_bytes([packet[30], packet[31]])
}

fn second_slot() -> SlotAssignment {
    SlotAssignment {
        slot: 1,
        enabled: true,
        vibration: true,
        devices: vec![DeviceMatch {
            id: Some(SECOND_PAD_ID),
            ..Default::default()
        }],
    }
}

#[tokio::test]
async fn test_get_gamepad_reply_and_push_per_cycle() {
    let h = harness().await;
    h.init().await;
    h.connect_pad();

    let reply = h.get_gamepad(true, true, 100).await;
    assert_eq!(reply[0], RequestCode::GetGamepad.as_u8());
    assert_eq!(i32_at(&reply, 1), PAD_ID);
    assert_eq!(reply[5], 1);
    assert_eq!(i32_at(&reply, 6), 8);
    assert_eq!(&reply[10..], b"Test Pad");
    h.wait_for_subscribers(1).await;

    for _ in 0..3 {
        h.handle.publisher().publish_cycle();
    }
    for _ in 0..3 {
        let push = h.recv().await.expect("state push");
        assert_eq!(push[0], RequestCode::GetGamepadState.as_u8());
        assert_eq!(push[1], 1);
        assert_eq!(i32_at(&push, 2), PAD_ID);
    }
    h.expect_silence().await;

    h.gateway.stop().await;
}

#[tokio::test]
async fn test_release_stops_pushes() {
    let h = harness().await;
    h.init().await;
    h.connect_pad();
    h.get_gamepad(false, true, 100).await;
    h.wait_for_subscribers(1).await;

    h.send(&[RequestCode::ReleaseGamepad.as_u8()]).await;
    h.wait_for_subscribers(0).await;

    h.handle.publisher().publish_cycle();
    h.expect_silence().await;

    h.gateway.stop().await;
}

#[tokio::test]
async fn test_get_gamepad_without_controller_is_disabled() {
    let h = harness().await;
    h.init().await;

    let reply = h.get_gamepad(true, true, 100).await;
    assert_eq!(reply, vec![RequestCode::GetGamepad.as_u8(), 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(h.handle.publisher().subscriber_count().await, 0);

    h.gateway.stop().await;
}

#[tokio::test]
async fn test_preferred_api_disables_other_api() {
    let mut config = AppConfig::default();
    config.input.preferred_input_api = crate::config::PreferredInputApi::Xinput;
    let h = harness_with(config).await;
    h.init().await;
    h.connect_pad();

    let reply = h.get_gamepad(false, false, 100).await;
    assert_eq!(i32_at(&reply, 1), 0);

    let reply = h.get_gamepad(true, false, 100).await;
    assert_eq!(i32_at(&reply, 1), PAD_ID);

    h.gateway.stop().await;
}

#[tokio::test]
async fn test_commands_wait_for_init_in_order() {
    let h = harness().await;

    h.handle.exec("notepad.exe", "a.txt");
    h.handle.kill_process(Some("game.exe"), 0);
    h.handle.list_processes();
    // Pointer and key input are not queued before INIT
    h.handle.mouse_event(mouse_flags::MOVE, 5, 5, 0);
    h.handle.keyboard_event(0x41, 0);
    h.expect_silence().await;

    h.init().await;
    let codes: Vec<u8> = [
        h.recv().await.unwrap(),
        h.recv().await.unwrap(),
        h.recv().await.unwrap(),
    ]
    .iter()
    .map(|packet| packet[0])
    .collect();
    assert_eq!(
        codes,
        vec![
            RequestCode::Exec.as_u8(),
            RequestCode::KillProcess.as_u8(),
            RequestCode::ListProcesses.as_u8(),
        ]
    );
    h.expect_silence().await;

    h.handle.keyboard_event(0x41, 0);
    let key = h.recv().await.unwrap();
    assert_eq!(key[0], RequestCode::KeyboardEvent.as_u8());
    assert_eq!(key[1], 0x41);

    h.gateway.stop().await;
}

#[tokio::test]
async fn test_clipboard_sends_header_then_text() {
    let h = harness().await;
    h.init().await;

    let text = "x".repeat(200);
    h.handle.set_clipboard_data(&text);

    let header = h.recv().await.unwrap();
    assert_eq!(header[0], RequestCode::SetClipboardData.as_u8());
    assert_eq!(i32_at(&header, 1), 200);
    let body = h.recv().await.unwrap();
    assert_eq!(body, text.as_bytes());

    h.gateway.stop().await;
}

#[tokio::test]
async fn test_malformed_datagrams_are_dropped() {
    let h = harness().await;

    h.send(&[]).await;
    h.send(&[0]).await;
    h.send(&[99, 1, 2, 3]).await;
    h.send(&[RequestCode::GetGamepad.as_u8(), 1]).await;
    h.send(&[RequestCode::Exec.as_u8(), 0, 0, 0, 0]).await;
    h.expect_silence().await;

    // The loop is still alive
    let mut poll = vec![RequestCode::GetGamepadState.as_u8()];
    poll.extend_from_slice(&1i32.to_le_bytes());
    h.send(&poll).await;
    let reply = h.recv().await.unwrap();
    assert_eq!(reply, vec![RequestCode::GetGamepadState.as_u8(), 0]);

    h.gateway.stop().await;
}

#[tokio::test]
async fn test_state_poll_bypasses_init_gate() {
    let h = harness().await;
    h.connect_pad();
    assert!(h.handle.on_key_event(DeviceId(PAD_ID), KEYCODE_BUTTON_A, true).await);

    let mut poll = vec![RequestCode::GetGamepadState.as_u8()];
    poll.extend_from_slice(&42i32.to_le_bytes());
    h.send(&poll).await;

    let reply = h.recv().await.unwrap();
    assert_eq!(reply.len(), 33);
    assert_eq!(reply[1], 1);
    assert_eq!(i32_at(&reply, 2), 42);
    let buttons = u16::from_le_bytes([reply[30], reply[31]]);
    assert_eq!(buttons, 1 << Button::A.index());
    // Centred hat
    assert_eq!(reply[32] as i8, -1);

    h.gateway.stop().await;
}

#[tokio::test]
async fn test_key_events_reach_shared_memory() {
    let h = harness().await;
    h.connect_pad();
    assert!(h.handle.on_key_event(DeviceId(PAD_ID), KEYCODE_BUTTON_B, true).await);

    // Snapshot is answered after the publish for the key event
    let state = h.handle.snapshot(0).await;
    assert!(state.is_pressed(Button::B));

    let bytes = std::fs::read(h.dir.path().join("gamepad.mem")).unwrap();
    let record = Record::read_from(&bytes);
    assert!(record.to_state().is_pressed(Button::B));

    h.handle.device_disconnected(DeviceId(PAD_ID));
    assert!(!h.handle.snapshot(0).await.is_pressed(Button::B));

    h.gateway.stop().await;
}

#[tokio::test]
async fn test_cursor_feedback_updates_pointer() {
    let h = harness().await;

    let mut datagram = vec![RequestCode::CursorPosFeedback.as_u8()];
    datagram.extend_from_slice(&640i16.to_le_bytes());
    datagram.extend_from_slice(&(-12i16).to_le_bytes());
    h.send(&datagram).await;

    for _ in 0..100 {
        if h.handle.pointer().generation == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(
        h.handle.pointer(),
        PointerPosition {
            x: 640,
            y: -12,
            generation: 1
        }
    );

    h.gateway.stop().await;
}

#[tokio::test]
async fn test_get_process_reaches_listener() {
    use crate::protocol::ProcessInfo;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recording(Mutex<Vec<(i16, i16, Option<ProcessInfo>)>>);

    impl ProcessInfoListener for Recording {
        fn on_process_info(&self, index: i16, count: i16, info: Option<ProcessInfo>) {
            self.0.lock().push((index, count, info));
        }
    }

    let h = harness().await;
    let listener = Arc::new(Recording::default());
    h.handle.set_process_listener(Some(listener.clone()));

    let mut datagram = vec![RequestCode::GetProcess.as_u8()];
    datagram.extend_from_slice(&0i32.to_le_bytes());
    datagram.extend_from_slice(&3i16.to_le_bytes());
    datagram.extend_from_slice(&1i16.to_le_bytes());
    datagram.extend_from_slice(&1234i32.to_le_bytes());
    datagram.extend_from_slice(&4096i64.to_le_bytes());
    datagram.extend_from_slice(&0xFi32.to_le_bytes());
    datagram.push(1);
    let mut name = [0u8; 32];
    name[..8].copy_from_slice(b"game.exe");
    datagram.extend_from_slice(&name);
    h.send(&datagram).await;

    for _ in 0..100 {
        if !listener.0.lock().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let calls = listener.0.lock().clone();
    assert_eq!(calls.len(), 1);
    let (index, count, info) = &calls[0];
    assert_eq!((*index, *count), (1, 3));
    let info = info.as_ref().unwrap();
    assert_eq!(info.pid, 1234);
    assert_eq!(info.name, "game.exe");
    assert!(info.wow64);

    h.gateway.stop().await;
}

#[tokio::test]
async fn test_turbo_phase_flips_republish_every_slot() {
    let mut config = AppConfig::default();
    config.turbo.slots = vec![
        TurboSlotConfig {
            slot: 0,
            buttons: vec![Control::Button(Button::A)],
            include_triggers: false,
        },
        TurboSlotConfig {
            slot: 1,
            buttons: vec![Control::Button(Button::B)],
            include_triggers: false,
        },
    ];
    config.assignments = vec![second_slot()];
    let h = harness_with(config).await;
    h.init().await;
    h.connect_pad();
    h.handle
        .device_connected(DeviceInfo::new(SECOND_PAD_ID, 0x054c, 0x0ce6, "Second Pad"));

    h.get_gamepad(true, true, 100).await;
    h.wait_for_subscribers(1).await;

    assert!(h.handle.on_key_event(DeviceId(PAD_ID), KEYCODE_BUTTON_A, true).await);
    assert!(h.handle.on_key_event(DeviceId(SECOND_PAD_ID), KEYCODE_BUTTON_B, true).await);

    // No ticker runs here; only the turbo clock drives these publishes
    let a_bit = 1u16 << Button::A.index();
    let (mut push_on, mut push_off) = (false, false);
    let (mut slot1_on, mut slot1_off) = (false, false);
    for _ in 0..60 {
        if let Some(push) = h.recv_within(Duration::from_millis(20)).await {
            assert_eq!(push[0], RequestCode::GetGamepadState.as_u8());
            assert_eq!(i32_at(&push, 2), PAD_ID);
            if buttons_of(&push) & a_bit != 0 {
                push_on = true;
            } else {
                push_off = true;
            }
        }
        if h.read_slot(1).is_pressed(Button::B) {
            slot1_on = true;
        } else {
            slot1_off = true;
        }
        if push_on && push_off && slot1_on && slot1_off {
            break;
        }
    }
    assert!(push_on && push_off, "slot-0 pushes never toggled A");
    assert!(slot1_on && slot1_off, "slot 1 record never toggled B");

    h.gateway.stop().await;
}

#[tokio::test]
async fn test_gyro_offset_blends_into_slot0() {
    let mut config = AppConfig::default();
    config.gyro.enabled = true;
    config.gyro.smoothing = 0.0;
    let h = harness_with(config).await;
    h.init().await;
    h.connect_pad();
    h.get_gamepad(true, true, 100).await;
    h.wait_for_subscribers(1).await;

    // LB is the default activator in hold mode
    assert!(h.handle.on_key_event(DeviceId(PAD_ID), KEYCODE_BUTTON_L1, true).await);
    let press = h.recv().await.expect("push for the activator press");
    assert_eq!(f32_at(&press, 14), 0.0);

    h.handle.on_gyro_sample(0.5, 0.0);
    let push = h.recv().await.expect("push for the gyro sample");
    let state = h.handle.snapshot(0).await;
    assert!(state.thumb_rx > 0.2);
    assert_eq!(state.thumb_lx, 0.0);
    assert_eq!(f32_at(&push, 14), state.thumb_rx);

    let record = h.read_slot(0);
    assert!((record.thumb_rx - state.thumb_rx).abs() < 1e-3);
    assert!(record.is_pressed(Button::LB));

    // Releasing the activator returns the stick to rest
    assert!(h.handle.on_key_event(DeviceId(PAD_ID), KEYCODE_BUTTON_L1, false).await);
    assert_eq!(h.handle.snapshot(0).await.thumb_rx, 0.0);
    assert!(h.read_slot(0).thumb_rx.abs() < 1e-3);

    h.gateway.stop().await;
}

#[tokio::test]
async fn test_state_poll_for_other_id_detaches_controller() {
    let h = harness().await;
    h.init().await;
    h.connect_pad();

    let reply = h.poll_state(PAD_ID).await;
    assert_eq!(reply.len(), 33);

    // Mismatched id: answered once, then the controller stops being presented
    let reply = h.poll_state(99).await;
    assert_eq!(reply.len(), 33);
    assert_eq!(i32_at(&reply, 2), 99);
    assert_eq!(h.poll_state(PAD_ID).await, vec![RequestCode::GetGamepadState.as_u8(), 0]);

    // Slot-0 input picks it up again
    assert!(h.handle.on_key_event(DeviceId(PAD_ID), KEYCODE_BUTTON_A, true).await);
    let reply = h.poll_state(PAD_ID).await;
    assert_eq!(reply.len(), 33);
    assert_eq!(buttons_of(&reply), 1 << Button::A.index());

    // So does GET_GAMEPAD
    h.poll_state(99).await;
    let reply = h.get_gamepad(true, false, 100).await;
    assert_eq!(i32_at(&reply, 1), PAD_ID);

    h.gateway.stop().await;
}

#[tokio::test]
async fn test_init_reload_applies_assignments() {
    let file_dir = tempfile::tempdir().unwrap();
    let path = file_dir.path().join("gateway.yaml");
    std::fs::write(
        &path,
        format!(
            "assignments:\n  - slot: 1\n    devices:\n      - id: {}\n",
            SECOND_PAD_ID
        ),
    )
    .unwrap();

    let h = harness_from(AppConfig::default(), Some(path)).await;
    h.handle
        .device_connected(DeviceInfo::new(SECOND_PAD_ID, 0x054c, 0x0ce6, "Second Pad"));

    // Unassigned until the file is read, so it drives slot 0
    assert!(h.handle.on_key_event(DeviceId(SECOND_PAD_ID), KEYCODE_BUTTON_A, true).await);
    assert!(h.handle.snapshot(0).await.is_pressed(Button::A));

    h.init().await;
    let mut moved = false;
    for _ in 0..100 {
        if !h.handle.snapshot(0).await.is_pressed(Button::A) {
            moved = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(moved, "INIT reload never reassigned the device");

    assert!(h.handle.snapshot(1).await.is_pressed(Button::A));
    assert!(h.read_slot(1).is_pressed(Button::A));

    // Startup network settings stay in force
    h.handle.exec("notepad.exe", "");
    assert_eq!(h.recv().await.unwrap()[0], RequestCode::Exec.as_u8());

    h.gateway.stop().await;
}

#[tokio::test]
async fn test_stop_terminates_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.network.server_port = 0;
    let gateway = Gateway::start(config, Collaborators::default(), GatewayOptions::new(dir.path()))
        .await
        .unwrap();

    timeout(Duration::from_secs(2), gateway.stop())
        .await
        .expect("stop should not hang");
}
