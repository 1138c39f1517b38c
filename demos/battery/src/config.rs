//! Demo configuration, read from an optional TOML file.

use crate::device::BatteryStatus;
use anyhow::Context;
use platform_channel_core::BridgeConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub bridge: BridgeConfig,
    pub device: DeviceConfig,
    pub screen: ScreenConfig,
    pub ui: UiConfig,
}

/// The simulated battery.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Raw level; negative means "not available".
    pub battery_level: i32,
    pub battery_scale: i32,
    pub status: BatteryStatus,
    /// Raw status code as the battery broadcast reports it; overrides
    /// `status` when set.
    pub status_code: Option<i32>,
    /// Statuses played in order after the UI starts listening.
    pub charging_script: Vec<BatteryStatus>,
    pub event_interval_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            battery_level: 80,
            battery_scale: 100,
            status: BatteryStatus::Discharging,
            status_code: None,
            charging_script: vec![
                BatteryStatus::Charging,
                BatteryStatus::Full,
                BatteryStatus::Unknown,
                BatteryStatus::Discharging,
            ],
            event_interval_ms: 200,
        }
    }
}

impl DeviceConfig {
    pub fn initial_status(&self) -> BatteryStatus {
        self.status_code.map_or(self.status, BatteryStatus::from_code)
    }

    pub fn event_interval(&self) -> Duration {
        Duration::from_millis(self.event_interval_ms)
    }
}

/// How the scripted second screen behaves.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    pub dwell_ms: u64,
    pub press_change: bool,
    pub rename_to: Option<String>,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            dwell_ms: 300,
            press_change: false,
            rename_to: Some("Bob".to_string()),
        }
    }
}

impl ScreenConfig {
    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }
}

/// What the UI driver sends.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub name: String,
    /// How many charging events to show before cancelling.
    pub charging_events: usize,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            name: "Alice".to_string(),
            charging_events: 5,
        }
    }
}

impl DemoConfig {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads `path`, or returns the defaults when there is none.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }
}
