//! Direct send path for gamepad-state packets
//!
//! Bypasses the action queue: holds its own lock and reusable buffer and
//! never waits on the socket. A datagram that cannot be sent immediately is
//! dropped; the next publish cycle supersedes it anyway.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tracing::{debug, trace};

use crate::protocol::{HostMessage, MAX_PACKET_SIZE};

pub struct DirectSender {
    socket: Arc<UdpSocket>,
    buffer: Mutex<BytesMut>,
}

impl DirectSender {
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self {
            socket,
            buffer: Mutex::new(BytesMut::with_capacity(MAX_PACKET_SIZE)),
        }
    }

    /// Encode and send without awaiting; returns `true` when the datagram left
    pub fn send_to(&self, message: &HostMessage, target: SocketAddr) -> bool {
        let mut buffer = self.buffer.lock();
        message.encode(&mut buffer);
        match self.socket.try_send_to(&buffer, target) {
            Ok(_) => {
                trace!(%target, code = ?message.code(), "Direct send");
                true
            }
            Err(e) => {
                debug!(%target, "Direct send failed: {}", e);
                false
            }
        }
    }
}
