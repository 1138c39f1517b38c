//! Battery demo protocol: channel names, methods and the transfer record.

use crate::device::BatteryStatus;
use platform_channel_core::{
    BridgeConfig, EventPayload, MethodResult, Parcel, ParcelError, Parcelable, ValueMap,
};
use serde_json::Value;

pub const BATTERY: &str = "battery";
pub const CHARGING: &str = "charging";
pub const INTENT: &str = "intent";

pub const GET_BATTERY_LEVEL: &str = "getBatteryLevel";
pub const OPEN_PAGE: &str = "openPage";
pub const ON_RESULT: &str = "onResult";

pub const UNAVAILABLE: &str = "UNAVAILABLE";

/// Fully qualified names of the three channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channels {
    pub battery: String,
    pub charging: String,
    pub intent: String,
}

impl Channels {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            battery: config.channel_name(BATTERY),
            charging: config.channel_name(CHARGING),
            intent: config.channel_name(INTENT),
        }
    }
}

/// Answer to `getBatteryLevel`.
pub fn battery_level_result(level: Option<u8>) -> MethodResult {
    match level {
        Some(level) => MethodResult::Success(Value::from(level)),
        None => MethodResult::error(UNAVAILABLE, "Battery level not available."),
    }
}

/// Event pushed for a charging status change.
pub fn charging_event(status: BatteryStatus) -> EventPayload {
    match status {
        BatteryStatus::Unknown => EventPayload::error(UNAVAILABLE, "Charging status unavailable"),
        BatteryStatus::Charging | BatteryStatus::Full => EventPayload::Success("charging".into()),
        _ => EventPayload::Success("discharging".into()),
    }
}

/// Data handed between the UI and the second screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferRecord {
    pub name: Option<String>,
}

impl TransferRecord {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }

    /// Lenient: a missing map, missing key or non-string value leaves
    /// `name` unset.
    pub fn from_map(map: Option<&ValueMap>) -> Self {
        let name = map
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string);
        Self { name }
    }

    pub fn to_map(&self) -> ValueMap {
        let mut map = ValueMap::new();
        map.insert(
            "name".to_string(),
            self.name.clone().map_or(Value::Null, Value::String),
        );
        map
    }
}

impl Parcelable for TransferRecord {
    fn write_to_parcel(&self, parcel: &mut Parcel) -> Result<(), ParcelError> {
        parcel.write_string(self.name.as_deref())
    }

    fn read_from_parcel(parcel: &mut Parcel) -> Result<Self, ParcelError> {
        Ok(Self {
            name: parcel.read_string()?,
        })
    }
}
