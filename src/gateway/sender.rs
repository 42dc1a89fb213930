//! FIFO action queue and its single consumer task
//!
//! Host→guest commands and GET_GAMEPAD replies are queued here and sent in
//! order, but only once the guest's INIT has arrived. Gamepad-state packets
//! never go through this queue; see [`super::direct`].

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use super::{stopped, SharedListener};
use crate::protocol::{HostMessage, MAX_PACKET_SIZE};

/// One deferred outbound packet
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Send {
        message: HostMessage,
        target: SocketAddr,
    },
    /// Length header followed by the raw text as a second datagram
    Clipboard { text: String, target: SocketAddr },
}

/// Producer side of the queue; cheap to clone
#[derive(Clone)]
pub struct ActionQueue {
    tx: mpsc::UnboundedSender<Action>,
}

impl ActionQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Action>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn push(&self, action: Action) {
        if self.tx.send(action).is_err() {
            debug!("Action queue closed, dropping action");
        }
    }
}

pub(crate) struct ActionSender {
    socket: Arc<UdpSocket>,
    rx: mpsc::UnboundedReceiver<Action>,
    initialized: watch::Receiver<bool>,
    running: watch::Receiver<bool>,
    listener: SharedListener,
    buffer: BytesMut,
    sent: u64,
}

impl ActionSender {
    pub(crate) fn new(
        socket: Arc<UdpSocket>,
        rx: mpsc::UnboundedReceiver<Action>,
        initialized: watch::Receiver<bool>,
        running: watch::Receiver<bool>,
        listener: SharedListener,
    ) -> Self {
        Self {
            socket,
            rx,
            initialized,
            running,
            listener,
            buffer: BytesMut::with_capacity(MAX_PACKET_SIZE),
            sent: 0,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!("Action sender waiting for INIT");

        let ready = tokio::select! {
            ready = wait_for_init(&mut self.initialized) => ready,
            _ = stopped(&mut self.running) => false,
        };
        if !ready {
            return;
        }
        debug!("Action sender started");

        loop {
            let action = tokio::select! {
                action = self.rx.recv() => match action {
                    Some(action) => action,
                    None => break,
                },
                _ = stopped(&mut self.running) => break,
            };
            self.dispatch(action).await;
        }

        info!(sent = self.sent, "Action sender stopped");
    }

    async fn dispatch(&mut self, action: Action) {
        match action {
            Action::Send { message, target } => {
                message.encode(&mut self.buffer);
                if self.send(target).await {
                    trace!(%target, code = ?message.code(), "Action sent");
                } else if message == HostMessage::ListProcesses {
                    // The guest will never answer; close the listing
                    let listener = self.listener.read().clone();
                    if let Some(listener) = listener {
                        listener.on_process_info(0, 0, None);
                    }
                }
            }
            Action::Clipboard { text, target } => {
                HostMessage::ClipboardHeader { len: text.len() }.encode(&mut self.buffer);
                if self.send(target).await {
                    self.buffer.clear();
                    self.buffer.extend_from_slice(text.as_bytes());
                    self.send(target).await;
                }
            }
        }
    }

    async fn send(&mut self, target: SocketAddr) -> bool {
        match self.socket.send_to(&self.buffer, target).await {
            Ok(_) => {
                self.sent += 1;
                true
            }
            Err(e) => {
                warn!(%target, "Failed to send action: {}", e);
                false
            }
        }
    }
}

async fn wait_for_init(initialized: &mut watch::Receiver<bool>) -> bool {
    initialized.wait_for(|ready| *ready).await.is_ok()
}
