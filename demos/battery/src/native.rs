//! Native end of the demo: the three channel handlers.

use crate::device::{BatteryService, BatteryStatus, ChargingSource, SubscriptionHandle};
use crate::protocol::{battery_level_result, charging_event, Channels, GET_BATTERY_LEVEL, OPEN_PAGE};
use crate::screen::{ScreenCoordinator, ScreenLauncher, Toast};
use platform_channel_core::{
    BinaryMessenger, EventChannel, EventSink, MethodChannel, MethodRouter, PlatformError,
    StreamHandler,
};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};

/// Answers `getBatteryLevel` from the battery service.
pub fn battery_router(service: Arc<dyn BatteryService>) -> MethodRouter {
    MethodRouter::new().route(GET_BATTERY_LEVEL, move |_, result| {
        result.send(battery_level_result(service.battery_level()));
    })
}

/// Bridges the charging status source to the charging event channel.
///
/// Holds at most one subscription; a new listen replaces the old one.
pub struct ChargingStreamHandler {
    source: Arc<dyn ChargingSource>,
    subscription: Mutex<Option<SubscriptionHandle>>,
}

impl ChargingStreamHandler {
    pub fn new(source: Arc<dyn ChargingSource>) -> Self {
        Self {
            source,
            subscription: Mutex::new(None),
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn release(&self) {
        let previous = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = previous {
            self.source.unsubscribe(handle);
            tracing::debug!("Charging receiver unregistered");
        }
    }
}

impl StreamHandler for ChargingStreamHandler {
    fn on_listen(&self, _arguments: Option<Value>, events: EventSink) -> Result<(), PlatformError> {
        self.release();
        let handle = self.source.subscribe(Arc::new(move |status: BatteryStatus| {
            events.push(charging_event(status));
        }));
        *self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        tracing::debug!("Charging receiver registered");
        Ok(())
    }

    fn on_cancel(&self, _arguments: Option<Value>) -> Result<(), PlatformError> {
        self.release();
        Ok(())
    }
}

/// The native host: binds every channel on creation, unbinds on destroy.
pub struct NativeHost {
    battery: MethodChannel,
    charging: EventChannel,
    intent: MethodChannel,
    charging_handler: Arc<ChargingStreamHandler>,
}

impl NativeHost {
    pub fn create(
        messenger: Arc<dyn BinaryMessenger>,
        channels: &Channels,
        battery: Arc<dyn BatteryService>,
        charging_source: Arc<dyn ChargingSource>,
        launcher: Arc<dyn ScreenLauncher>,
        toast: Arc<dyn Toast>,
    ) -> Self {
        let charging_handler = Arc::new(ChargingStreamHandler::new(charging_source));
        let charging = EventChannel::new(messenger.clone(), channels.charging.clone());
        charging.set_stream_handler(Some(charging_handler.clone()));

        let intent = MethodChannel::new(messenger.clone(), channels.intent.clone());
        let coordinator = Arc::new(ScreenCoordinator::new(intent.clone(), launcher, toast));
        intent.set_method_call_handler(Some(Arc::new(MethodRouter::new().route(
            OPEN_PAGE,
            move |arguments, result| coordinator.open_page(arguments, result),
        ))));

        let battery_channel = MethodChannel::new(messenger, channels.battery.clone());
        battery_channel.set_method_call_handler(Some(Arc::new(battery_router(battery))));

        tracing::info!(
            "Native host bound {}, {}, {}",
            channels.battery,
            channels.charging,
            channels.intent
        );
        Self {
            battery: battery_channel,
            charging,
            intent,
            charging_handler,
        }
    }

    pub fn is_charging_subscribed(&self) -> bool {
        self.charging_handler.is_subscribed()
    }

    /// Tears down the charging subscription and unbinds every handler.
    pub fn destroy(self) {
        if let Err(e) = self.charging_handler.on_cancel(None) {
            tracing::warn!("Charging teardown failed: {}", e);
        }
        self.battery.set_method_call_handler(None);
        self.charging.set_stream_handler(None);
        self.intent.set_method_call_handler(None);
        tracing::info!("Native host destroyed");
    }
}
