//! Receive loop: decodes guest datagrams and dispatches them

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use super::direct::DirectSender;
use super::handle::{LiveSettings, PublisherHandle};
use super::sender::{Action, ActionQueue};
use super::{stopped, PointerState, SharedListener};
use crate::config::AppConfig;
use crate::protocol::{decode_request, Request};

/// Inbound datagrams are at most 64 bytes; anything longer is malformed anyway
const RECV_BUFFER_SIZE: usize = 512;

pub(crate) struct Receiver {
    pub socket: Arc<UdpSocket>,
    pub publisher: PublisherHandle,
    pub actions: ActionQueue,
    pub direct: Arc<DirectSender>,
    pub initialized: watch::Sender<bool>,
    pub pointer: PointerState,
    pub listener: SharedListener,
    pub settings: LiveSettings,
    pub config_path: Option<PathBuf>,
    pub running: watch::Receiver<bool>,
}

impl Receiver {
    pub(crate) async fn run(mut self) {
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        debug!("Receive loop started");

        loop {
            let received = tokio::select! {
                received = self.socket.recv_from(&mut buf) => received,
                _ = stopped(&mut self.running) => break,
            };

            match received {
                Ok((len, source)) => self.handle_datagram(&buf[..len], source).await,
                Err(e) => {
                    if !*self.running.borrow() {
                        break;
                    }
                    // ICMP port-unreachable from an earlier send surfaces here on some platforms
                    warn!("UDP receive error: {}", e);
                }
            }
        }

        info!("Receive loop stopped");
    }

    async fn handle_datagram(&self, data: &[u8], source: SocketAddr) {
        let request = match decode_request(data) {
            Ok(request) => request,
            Err(e) => {
                debug!(%source, "Dropping datagram: {}", e);
                return;
            }
        };
        trace!(%source, ?request, "Guest request");

        match request {
            Request::Init => self.on_init().await,
            Request::GetProcess { index, count, info } => {
                let listener = self.listener.read().clone();
                if let Some(listener) = listener {
                    listener.on_process_info(index, count, Some(info));
                }
            }
            Request::GetGamepad {
                is_xinput,
                notify,
                process_id,
            } => {
                if let Some(message) = self
                    .publisher
                    .get_gamepad(is_xinput, notify, process_id, source)
                    .await
                {
                    self.actions.push(Action::Send {
                        message,
                        target: source,
                    });
                }
            }
            Request::GetGamepadState { gamepad_id } => {
                if let Some(message) = self.publisher.get_gamepad_state(gamepad_id).await {
                    self.direct.send_to(&message, source);
                }
            }
            Request::ReleaseGamepad => self.publisher.release_gamepad(),
            Request::CursorPosFeedback { x, y } => self.pointer.update(x, y),
        }
    }

    async fn on_init(&self) {
        let first = !self.initialized.send_replace(true);
        info!(first, "Guest INIT received");

        let Some(path) = &self.config_path else {
            self.publisher.publish_cycle();
            return;
        };

        match AppConfig::load(path).await {
            Ok(config) => self.settings.apply(config),
            Err(e) => {
                warn!("Keeping current settings, reload on INIT failed: {:#}", e);
                self.publisher.publish_cycle();
            }
        }
    }
}
