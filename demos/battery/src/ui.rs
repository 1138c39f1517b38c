//! UI end of the demo.

use crate::protocol::{Channels, TransferRecord, GET_BATTERY_LEVEL, ON_RESULT, OPEN_PAGE};
use platform_channel_core::{
    BinaryMessenger, ChannelError, EventChannel, EventPayload, EventStream, MethodChannel,
    MethodResult, MethodRouter,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct UiClient {
    battery: MethodChannel,
    charging: EventChannel,
    intent: MethodChannel,
}

impl UiClient {
    /// Binds `onResult` and returns the client together with the records the
    /// native end sends back.
    pub fn new(
        messenger: Arc<dyn BinaryMessenger>,
        channels: &Channels,
    ) -> (Self, mpsc::UnboundedReceiver<TransferRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let intent = MethodChannel::new(messenger.clone(), channels.intent.clone());
        intent.set_method_call_handler(Some(Arc::new(MethodRouter::new().route(
            ON_RESULT,
            move |arguments, result| {
                let record = TransferRecord::from_map(arguments.as_ref().and_then(Value::as_object));
                tracing::info!("onResult: {:?}", record.name);
                if tx.send(record).is_err() {
                    tracing::debug!("onResult arrived after the UI stopped reading");
                }
                result.success(Value::Null);
            },
        ))));

        let client = Self {
            battery: MethodChannel::new(messenger.clone(), channels.battery.clone()),
            charging: EventChannel::new(messenger, channels.charging.clone()),
            intent,
        };
        (client, rx)
    }

    pub async fn battery_level(&self) -> Result<MethodResult, ChannelError> {
        self.battery.invoke_method(GET_BATTERY_LEVEL, None).await
    }

    pub async fn charging_stream(&self) -> Result<EventStream, ChannelError> {
        self.charging.receive_stream(None).await
    }

    /// Asks the native end to open the second screen with `name`.
    pub async fn open_page(&self, name: Option<&str>) -> Result<(), ChannelError> {
        let arguments = name.map(|name| json!({ "name": name }));
        self.intent.invoke(OPEN_PAGE, arguments).await.map(|_| ())
    }

    /// Stops handling `onResult`.
    pub fn close(&self) {
        self.intent.set_method_call_handler(None);
    }
}

/// Text shown for a `getBatteryLevel` answer.
pub fn battery_label(answer: &Result<MethodResult, ChannelError>) -> String {
    match answer {
        Ok(MethodResult::Success(level)) => format!("Battery level: {level}%."),
        Ok(MethodResult::Error(e)) => format!("Failed to get battery level: '{}'.", e.message),
        Ok(MethodResult::NotImplemented) => "Battery level query not implemented.".to_string(),
        Err(e) => format!("Failed to get battery level: '{e}'."),
    }
}

/// Text shown for a charging event.
pub fn charging_label(event: &EventPayload) -> String {
    match event {
        EventPayload::Success(Value::String(status)) => format!("Battery status: {status}."),
        EventPayload::Success(other) => format!("Battery status: {other}."),
        EventPayload::Error(_) => "Battery status: unknown.".to_string(),
    }
}
