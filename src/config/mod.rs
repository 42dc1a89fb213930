//! Configuration management for the gateway
//!
//! Handles loading, parsing, and hot-reloading of YAML configuration files.
//! Every section is optional; a missing file section falls back to defaults.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::input::{Button, Control, TriggerMode, MAX_SLOTS};
use crate::protocol::{CLIENT_PORT, SERVER_PORT};

pub use watcher::ConfigWatcher;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub shared_memory: SharedMemoryConfig,
    pub input: InputConfig,
    pub gyro: GyroConfig,
    pub turbo: TurboConfig,
    pub rumble: RumbleConfig,
    pub assignments: Vec<SlotAssignment>,
}

/// UDP endpoints
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub server_port: u16,
    pub client_port: u16,
    pub bind_address: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_port: SERVER_PORT,
            client_port: CLIENT_PORT,
            bind_address: "127.0.0.1".to_string(),
        }
    }
}

/// Location and count of the per-slot gamepad files
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SharedMemoryConfig {
    /// Defaults to `<data>/imagefs/tmp` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    pub players: usize,
}

impl Default for SharedMemoryConfig {
    fn default() -> Self {
        Self {
            directory: None,
            players: MAX_SLOTS,
        }
    }
}

/// Which input API identity the guest may see a controller under
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PreferredInputApi {
    /// First XInput request from a process claims it
    Auto,
    Dinput,
    Xinput,
    #[default]
    Both,
}

/// Physical input handling
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct InputConfig {
    pub trigger_mode: TriggerMode,
    /// Ignore physical slot-0 input while the virtual gamepad is active
    pub virtual_exclusive: bool,
    pub preferred_input_api: PreferredInputApi,
    /// Input type byte reported in GET_GAMEPAD replies
    pub dinput_mapper_type: u8,
    /// Route devices with no assignment to slot 0
    pub adopt_unassigned: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            trigger_mode: TriggerMode::default(),
            virtual_exclusive: false,
            preferred_input_api: PreferredInputApi::default(),
            dinput_mapper_type: 1,
            adopt_unassigned: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GyroStick {
    Left,
    #[default]
    Right,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GyroMode {
    #[default]
    Hold,
    Toggle,
}

/// Control that activates gyro aiming
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum GyroActivator {
    Control(Control),
    /// Left trigger axis past half travel
    LeftTrigger,
    /// Right trigger axis past half travel
    RightTrigger,
}

impl Default for GyroActivator {
    fn default() -> Self {
        GyroActivator::Control(Control::Button(Button::LB))
    }
}

impl TryFrom<String> for GyroActivator {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "lt" | "left_trigger" => Ok(GyroActivator::LeftTrigger),
            "rt" | "right_trigger" => Ok(GyroActivator::RightTrigger),
            _ => value.parse().map(GyroActivator::Control),
        }
    }
}

impl From<GyroActivator> for String {
    fn from(value: GyroActivator) -> Self {
        match value {
            GyroActivator::Control(control) => control.to_string(),
            GyroActivator::LeftTrigger => "lt".to_string(),
            GyroActivator::RightTrigger => "rt".to_string(),
        }
    }
}

/// Gyroscope-to-stick fusion
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GyroConfig {
    pub enabled: bool,
    pub stick: GyroStick,
    pub sensitivity_x: f32,
    pub sensitivity_y: f32,
    /// Exponential smoothing factor in [0, 1); 0 disables smoothing
    pub smoothing: f32,
    pub deadzone: f32,
    pub invert_x: bool,
    pub invert_y: bool,
    pub activator: GyroActivator,
    pub mode: GyroMode,
}

impl Default for GyroConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            stick: GyroStick::default(),
            sensitivity_x: 1.0,
            sensitivity_y: 1.0,
            smoothing: 0.9,
            deadzone: 0.05,
            invert_x: false,
            invert_y: false,
            activator: GyroActivator::default(),
            mode: GyroMode::default(),
        }
    }
}

/// Turbo masks for every slot
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TurboConfig {
    pub slots: Vec<TurboSlotConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TurboSlotConfig {
    pub slot: usize,
    #[serde(default)]
    pub buttons: Vec<Control>,
    #[serde(default)]
    pub include_triggers: bool,
}

/// Rumble relay from the guest to host actuators
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RumbleConfig {
    pub enabled: bool,
    /// Length of the one-shot pulse fired on every amplitude change
    pub pulse_ms: u64,
}

impl Default for RumbleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pulse_ms: 50,
        }
    }
}

/// Static slot assignment served by the bundled assignment store
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SlotAssignment {
    pub slot: usize,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub vibration: bool,
    #[serde(default)]
    pub devices: Vec<DeviceMatch>,
}

/// Device selector: an exact id, or a vendor/product/name identity
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DeviceMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl AppConfig {
    /// Whether `next` changes a section that is only read at startup
    pub fn needs_restart_for(&self, next: &AppConfig) -> bool {
        self.network != next.network || self.shared_memory != next.shared_memory
    }

    /// `next` with the startup-only sections taken from `self`
    pub fn merge_live(&self, next: AppConfig) -> AppConfig {
        AppConfig {
            network: self.network.clone(),
            shared_memory: self.shared_memory.clone(),
            ..next
        }
    }

    /// Load configuration from file with validation
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;

        config.validate()?;

        Ok(config)
    }

    /// Serialize to YAML (used by `--print-default-config`)
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config to YAML")
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.network.server_port == 0 || self.network.client_port == 0 {
            anyhow::bail!("network ports must be non-zero");
        }
        if self.network.server_port == self.network.client_port {
            anyhow::bail!(
                "server_port and client_port must differ (both {})",
                self.network.server_port
            );
        }

        let players = self.shared_memory.players;
        if !(1..=MAX_SLOTS).contains(&players) {
            anyhow::bail!("shared_memory.players must be 1-{} (got {})", MAX_SLOTS, players);
        }

        let gyro = &self.gyro;
        if !(0.0..1.0).contains(&gyro.smoothing) {
            anyhow::bail!("gyro.smoothing must be in [0, 1) (got {})", gyro.smoothing);
        }
        if !(0.0..1.0).contains(&gyro.deadzone) {
            anyhow::bail!("gyro.deadzone must be in [0, 1) (got {})", gyro.deadzone);
        }
        if !(gyro.sensitivity_x > 0.0 && gyro.sensitivity_y > 0.0) {
            anyhow::bail!("gyro sensitivities must be positive");
        }

        for entry in &self.turbo.slots {
            if entry.slot >= MAX_SLOTS {
                anyhow::bail!("turbo slot {} is out of range (0-{})", entry.slot, MAX_SLOTS - 1);
            }
        }

        for assignment in &self.assignments {
            if assignment.slot >= MAX_SLOTS {
                anyhow::bail!(
                    "assignment slot {} is out of range (0-{})",
                    assignment.slot,
                    MAX_SLOTS - 1
                );
            }
            for device in &assignment.devices {
                let by_identity = device.vendor_id.is_some() && device.product_id.is_some();
                if device.id.is_none() && !by_identity {
                    anyhow::bail!(
                        "device in slot {} needs an id or a vendor_id/product_id pair",
                        assignment.slot
                    );
                }
            }
        }

        Ok(())
    }
}

fn default_true() -> bool {
    true
}
