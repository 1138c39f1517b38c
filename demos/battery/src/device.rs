//! Device battery capability and a simulated device behind it.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Charging state as reported by the battery broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryStatus {
    Unknown,
    Charging,
    Discharging,
    NotCharging,
    Full,
    /// Any code outside the known set, including "missing" (-1).
    #[serde(skip)]
    Other(i32),
}

impl BatteryStatus {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::Unknown,
            2 => Self::Charging,
            3 => Self::Discharging,
            4 => Self::NotCharging,
            5 => Self::Full,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Unknown => 1,
            Self::Charging => 2,
            Self::Discharging => 3,
            Self::NotCharging => 4,
            Self::Full => 5,
            Self::Other(code) => code,
        }
    }
}

/// Percentage from a raw `level`/`scale` pair, or `None` when either is
/// missing.
pub fn level_from_scale(level: i32, scale: i32) -> Option<u8> {
    if level < 0 || scale <= 0 {
        return None;
    }
    let percent = i64::from(level) * 100 / i64::from(scale);
    Some(percent.clamp(0, 100) as u8)
}

/// Battery level query.
pub trait BatteryService: Send + Sync {
    fn battery_level(&self) -> Option<u8>;
}

pub type StatusListener = Arc<dyn Fn(BatteryStatus) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

/// Charging status change source.
pub trait ChargingSource: Send + Sync {
    /// Registers `listener`. The current status is delivered right away.
    fn subscribe(&self, listener: StatusListener) -> SubscriptionHandle;

    /// Removes a listener. Unknown handles are ignored.
    fn unsubscribe(&self, handle: SubscriptionHandle);
}

struct DeviceState {
    level: i32,
    scale: i32,
    status: BatteryStatus,
    listeners: HashMap<SubscriptionHandle, StatusListener>,
    next_id: u64,
}

/// In-memory battery with scriptable level and status.
pub struct SimulatedDevice {
    state: Mutex<DeviceState>,
}

impl SimulatedDevice {
    pub fn new(level: i32, scale: i32, status: BatteryStatus) -> Self {
        Self {
            state: Mutex::new(DeviceState {
                level,
                scale,
                status,
                listeners: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Changes the status and notifies every listener.
    pub fn set_status(&self, status: BatteryStatus) {
        let listeners: Vec<StatusListener> = {
            let mut state = self.state();
            state.status = status;
            state.listeners.values().cloned().collect()
        };
        tracing::debug!(
            "Battery status -> {:?} (code {}, {} listeners)",
            status,
            status.code(),
            listeners.len()
        );
        for listener in listeners {
            listener(status);
        }
    }

    pub fn status(&self) -> BatteryStatus {
        self.state().status
    }

    pub fn subscriber_count(&self) -> usize {
        self.state().listeners.len()
    }
}

impl BatteryService for SimulatedDevice {
    fn battery_level(&self) -> Option<u8> {
        let state = self.state();
        level_from_scale(state.level, state.scale)
    }
}

impl ChargingSource for SimulatedDevice {
    fn subscribe(&self, listener: StatusListener) -> SubscriptionHandle {
        let (handle, status) = {
            let mut state = self.state();
            let handle = SubscriptionHandle(state.next_id);
            state.next_id += 1;
            state.listeners.insert(handle, listener.clone());
            (handle, state.status)
        };
        listener(status);
        handle
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        if self.state().listeners.remove(&handle).is_none() {
            tracing::debug!("Unsubscribe for unknown handle {:?}", handle);
        }
    }
}
