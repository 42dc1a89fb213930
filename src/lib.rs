//! WinHandler GW - host-side gateway for an emulated Windows guest
//!
//! Aggregates physical and virtual gamepads into four player slots, applies
//! turbo and gyro, publishes each slot into a 64-byte shared-memory record,
//! relays guest rumble back to the host, and speaks the guest's UDP protocol
//! for gamepad queries and process control.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod host;
pub mod input;
pub mod paths;
pub mod protocol;
pub mod rumble;
pub mod shm;

pub use config::AppConfig;
pub use error::{DecodeError, GatewayError, MappingError};
pub use gateway::{Collaborators, Gateway, GatewayHandle, GatewayOptions};
