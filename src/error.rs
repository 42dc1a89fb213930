//! Error types shared across the gateway
//!
//! Transport failures inside task loops are logged rather than returned; these
//! types cover the places where a caller can actually react.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to decode an inbound guest datagram
///
/// Decode errors never produce a reply: the guest protocol has no error
/// channel, so the receive loop drops the packet and moves on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty datagram")]
    Empty,

    #[error("unknown request code {0}")]
    UnknownCode(u8),

    #[error("request code {code} needs {needed} payload bytes, got {got}")]
    Truncated { code: u8, needed: usize, got: usize },

    #[error("request code {0} is host-to-guest only")]
    WrongDirection(u8),
}

/// Failure to create or map a per-slot shared-memory file
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to map {path}: {source}")]
    Map {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure to bring the gateway up
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to bind UDP socket on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}
