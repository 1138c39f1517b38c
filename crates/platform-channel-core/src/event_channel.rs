//! Push channels.
//!
//! The UI end subscribes by calling `listen` on the channel name and tears
//! down with `cancel`. Between the two, the native end pushes success or
//! error envelopes as plain messages on the same name; an empty message
//! ends the stream.

use crate::codec::JsonMethodCodec;
use crate::error::ChannelError;
use crate::messenger::{BinaryMessageHandler, BinaryMessenger, BinaryReply};
use crate::method_channel::MethodChannel;
use crate::{EventPayload, MethodCall, PlatformError};
use futures_util::Stream;
use serde_json::Value;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc;

const LISTEN: &str = "listen";
const CANCEL: &str = "cancel";

/// Native-side owner of the underlying event source.
pub trait StreamHandler: Send + Sync {
    /// Activate the event source and push into `events` until cancelled.
    fn on_listen(&self, arguments: Option<Value>, events: EventSink) -> Result<(), PlatformError>;

    /// Deactivate the event source. Must tolerate having nothing to tear down.
    fn on_cancel(&self, arguments: Option<Value>) -> Result<(), PlatformError>;
}

/// Pushes events to the current UI listener.
///
/// A sink stops delivering the moment its subscription is cancelled or
/// replaced; later pushes are dropped.
#[derive(Clone)]
pub struct EventSink {
    channel: String,
    messenger: Arc<dyn BinaryMessenger>,
    active: Arc<AtomicBool>,
}

impl EventSink {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn success(&self, value: Value) {
        self.push(EventPayload::Success(value));
    }

    pub fn error(&self, code: impl Into<String>, message: impl Into<String>, details: Option<Value>) {
        self.push(EventPayload::Error(PlatformError {
            code: code.into(),
            message: message.into(),
            details,
        }));
    }

    pub fn push(&self, event: EventPayload) {
        if !self.is_active() {
            tracing::debug!("Dropping event on {}: no active listener", self.channel);
            return;
        }
        match JsonMethodCodec::encode_event(&event) {
            Ok(bytes) => self.emit(Some(bytes)),
            Err(e) => tracing::warn!("Failed to encode event on {}: {}", self.channel, e),
        }
    }

    /// Closes the UI stream. Further pushes are dropped.
    pub fn end_of_stream(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.emit(None);
        }
    }

    fn emit(&self, message: Option<Vec<u8>>) {
        // Queued on send; the reply carries nothing of interest.
        drop(self.messenger.send(&self.channel, message));
    }
}

/// Native-side adapter tracking the one active subscription.
struct StreamHandlerAdapter {
    channel: String,
    messenger: Arc<dyn BinaryMessenger>,
    handler: Arc<dyn StreamHandler>,
    active: Mutex<Option<Arc<AtomicBool>>>,
}

impl StreamHandlerAdapter {
    fn on_listen(&self, arguments: Option<Value>) -> Option<Vec<u8>> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = active.take() {
            previous.store(false, Ordering::SeqCst);
            tracing::debug!("{}: listen while active, cancelling previous", self.channel);
            if let Err(e) = self.handler.on_cancel(None) {
                tracing::warn!("{}: cancelling previous listener failed: {}", self.channel, e);
            }
        }

        let flag = Arc::new(AtomicBool::new(true));
        let sink = EventSink {
            channel: self.channel.clone(),
            messenger: self.messenger.clone(),
            active: flag.clone(),
        };
        match self.handler.on_listen(arguments, sink) {
            Ok(()) => {
                *active = Some(flag);
                tracing::info!("{}: listening", self.channel);
                JsonMethodCodec::encode_success_envelope(&Value::Null).ok()
            }
            Err(error) => {
                flag.store(false, Ordering::SeqCst);
                tracing::warn!("{}: listen failed: {}", self.channel, error);
                JsonMethodCodec::encode_error_envelope(&error).ok()
            }
        }
    }

    fn on_cancel(&self, arguments: Option<Value>) -> Option<Vec<u8>> {
        let previous = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(flag) = previous else {
            let error = PlatformError::new("error", "No active stream to cancel");
            return JsonMethodCodec::encode_error_envelope(&error).ok();
        };

        flag.store(false, Ordering::SeqCst);
        match self.handler.on_cancel(arguments) {
            Ok(()) => {
                tracing::info!("{}: cancelled", self.channel);
                JsonMethodCodec::encode_success_envelope(&Value::Null).ok()
            }
            Err(error) => {
                tracing::warn!("{}: cancel failed: {}", self.channel, error);
                JsonMethodCodec::encode_error_envelope(&error).ok()
            }
        }
    }
}

impl BinaryMessageHandler for StreamHandlerAdapter {
    fn on_message(&self, message: Option<Vec<u8>>, reply: BinaryReply) {
        let call = match message.as_deref().map(JsonMethodCodec::decode_method_call) {
            Some(Ok(call)) => call,
            Some(Err(e)) => {
                tracing::warn!("Undecodable call on {}: {}", self.channel, e);
                let error = PlatformError::new("codec-error", e.to_string());
                reply.send(JsonMethodCodec::encode_error_envelope(&error).ok());
                return;
            }
            None => {
                reply.send(None);
                return;
            }
        };

        let MethodCall { method, arguments } = call;
        let answer = match method.as_str() {
            LISTEN => self.on_listen(arguments),
            CANCEL => self.on_cancel(arguments),
            _ => None,
        };
        reply.send(answer);
    }
}

/// UI-side receiver for pushed events.
struct EventForwarder {
    channel: String,
    events: mpsc::UnboundedSender<Option<EventPayload>>,
}

impl BinaryMessageHandler for EventForwarder {
    fn on_message(&self, message: Option<Vec<u8>>, reply: BinaryReply) {
        let item = match message {
            Some(bytes) => match JsonMethodCodec::decode_event(&bytes) {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!("Undecodable event on {}: {}", self.channel, e);
                    reply.send(None);
                    return;
                }
            },
            None => None,
        };
        let _ = self.events.send(item);
        reply.send(None);
    }
}

/// A named push endpoint on one end of a bridge.
#[derive(Clone)]
pub struct EventChannel {
    name: String,
    messenger: Arc<dyn BinaryMessenger>,
}

impl EventChannel {
    pub fn new(messenger: Arc<dyn BinaryMessenger>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            messenger,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Native side: binds the handler that owns the event source. `None`
    /// unbinds.
    pub fn set_stream_handler(&self, handler: Option<Arc<dyn StreamHandler>>) {
        let adapter = handler.map(|handler| {
            Arc::new(StreamHandlerAdapter {
                channel: self.name.clone(),
                messenger: self.messenger.clone(),
                handler,
                active: Mutex::new(None),
            }) as Arc<dyn BinaryMessageHandler>
        });
        self.messenger.set_message_handler(&self.name, adapter);
    }

    /// UI side: subscribes and returns the event stream.
    ///
    /// Listening again on the same channel supersedes the earlier stream,
    /// which then ends.
    pub async fn receive_stream(&self, arguments: Option<Value>) -> Result<EventStream, ChannelError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let forwarder = Arc::new(EventForwarder {
            channel: self.name.clone(),
            events: tx,
        });
        let listener = Arc::downgrade(&forwarder);
        self.messenger
            .set_message_handler(&self.name, Some(forwarder as Arc<dyn BinaryMessageHandler>));

        let mut stream = EventStream {
            channel: self.clone(),
            listener,
            rx,
            finished: false,
            cancelled: false,
        };
        let calls = MethodChannel::new(self.messenger.clone(), self.name.clone());
        if let Err(e) = calls.invoke(LISTEN, arguments).await {
            stream.cancelled = true;
            stream.unbind();
            return Err(e);
        }
        Ok(stream)
    }
}

/// Events pushed by the native end, in order.
///
/// Ends when the native end closes the stream or a later
/// [`EventChannel::receive_stream`] supersedes this one. Dropping the
/// stream cancels the subscription in the background.
pub struct EventStream {
    channel: EventChannel,
    listener: Weak<EventForwarder>,
    rx: mpsc::UnboundedReceiver<Option<EventPayload>>,
    finished: bool,
    cancelled: bool,
}

impl EventStream {
    /// Unbinds the UI listener and asks the native end to tear down.
    ///
    /// Events already in flight are discarded. A stream that has been
    /// superseded by a newer listen cancels nothing.
    pub async fn cancel(mut self, arguments: Option<Value>) -> Result<(), ChannelError> {
        self.cancelled = true;
        if !self.unbind() {
            return Ok(());
        }
        let calls = MethodChannel::new(self.channel.messenger.clone(), self.channel.name.clone());
        calls.invoke(CANCEL, arguments).await.map(|_| ())
    }

    /// Removes the forwarder if it is still the bound listener. Returns
    /// whether it was.
    fn unbind(&self) -> bool {
        if self.listener.upgrade().is_none() {
            return false;
        }
        self.channel
            .messenger
            .set_message_handler(&self.channel.name, None);
        true
    }
}

impl Stream for EventStream {
    type Item = EventPayload;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(Some(event))) => Poll::Ready(Some(event)),
            Poll::Ready(Some(None)) | Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if self.cancelled || !self.unbind() {
            return;
        }
        // Queued here, before any later listen on the same name.
        let bytes = match JsonMethodCodec::encode_method_call(&MethodCall::new(CANCEL, None)) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Failed to encode cancel on {}: {}", self.channel.name, e);
                return;
            }
        };
        let reply = self.channel.messenger.send(&self.channel.name, Some(bytes));
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let channel = self.channel.name.clone();
        runtime.spawn(async move {
            if let Err(e) = reply.await {
                tracing::debug!("Background cancel on {} failed: {}", channel, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::local::LocalBridge;
    use futures_util::StreamExt;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Counts activations and keeps the latest sink for tests to push into.
    #[derive(Default)]
    struct Recorder {
        listens: AtomicUsize,
        cancels: AtomicUsize,
        sink: Mutex<Option<EventSink>>,
    }

    impl Recorder {
        fn push(&self, value: Value) {
            if let Some(sink) = self.sink.lock().unwrap().as_ref() {
                sink.success(value);
            }
        }
    }

    impl StreamHandler for Recorder {
        fn on_listen(&self, _: Option<Value>, events: EventSink) -> Result<(), PlatformError> {
            self.listens.fetch_add(1, Ordering::SeqCst);
            *self.sink.lock().unwrap() = Some(events);
            Ok(())
        }

        fn on_cancel(&self, _: Option<Value>) -> Result<(), PlatformError> {
            self.cancels.fetch_add(1, Ordering::SeqCst);
            *self.sink.lock().unwrap() = None;
            Ok(())
        }
    }

    fn setup() -> (LocalBridge, EventChannel, Arc<Recorder>) {
        let bridge = LocalBridge::new(&BridgeConfig::default());
        let native = EventChannel::new(Arc::new(bridge.native.clone()), "test/events");
        let recorder = Arc::new(Recorder::default());
        native.set_stream_handler(Some(recorder.clone()));
        let ui = EventChannel::new(Arc::new(bridge.ui.clone()), "test/events");
        (bridge, ui, recorder)
    }

    #[tokio::test]
    async fn listen_push_cancel() {
        let (bridge, ui, recorder) = setup();
        let mut stream = ui.receive_stream(None).await.unwrap();
        assert_eq!(recorder.listens.load(Ordering::SeqCst), 1);

        recorder.push(json!("charging"));
        recorder.push(json!("discharging"));
        assert_eq!(stream.next().await, Some(EventPayload::Success(json!("charging"))));
        assert_eq!(stream.next().await, Some(EventPayload::Success(json!("discharging"))));

        stream.cancel(None).await.unwrap();
        assert_eq!(recorder.cancels.load(Ordering::SeqCst), 1);
        assert!(!bridge.ui.is_bound("test/events"));
    }

    #[tokio::test]
    async fn listening_twice_keeps_one_subscription() {
        let (_bridge, ui, recorder) = setup();
        let mut first = ui.receive_stream(None).await.unwrap();
        let mut second = ui.receive_stream(None).await.unwrap();
        assert_eq!(recorder.listens.load(Ordering::SeqCst), 2);
        assert_eq!(recorder.cancels.load(Ordering::SeqCst), 1);

        recorder.push(json!(1));
        assert_eq!(second.next().await, Some(EventPayload::Success(json!(1))));
        assert_eq!(first.next().await, None);

        // The superseded stream must not tear down the live one.
        first.cancel(None).await.unwrap();
        assert_eq!(recorder.cancels.load(Ordering::SeqCst), 1);
        recorder.push(json!(2));
        assert_eq!(second.next().await, Some(EventPayload::Success(json!(2))));
    }

    #[tokio::test]
    async fn stale_sink_is_inert() {
        let (_bridge, ui, recorder) = setup();
        let stream = ui.receive_stream(None).await.unwrap();
        let stale = recorder.sink.lock().unwrap().clone().unwrap();
        stream.cancel(None).await.unwrap();
        assert!(!stale.is_active());
        stale.success(json!("late"));
    }

    #[tokio::test]
    async fn cancel_without_listener_is_an_error() {
        let (bridge, _ui, _recorder) = setup();
        let calls = MethodChannel::new(Arc::new(bridge.ui.clone()), "test/events");
        let err = calls.invoke(CANCEL, None).await.unwrap_err();
        assert_eq!(err.code(), "error");
        let result = calls.invoke_method("pause", None).await.unwrap();
        assert_eq!(result, crate::MethodResult::NotImplemented);
    }

    #[tokio::test]
    async fn end_of_stream_and_errors() {
        let (_bridge, ui, recorder) = setup();
        let mut stream = ui.receive_stream(None).await.unwrap();
        let sink = recorder.sink.lock().unwrap().clone().unwrap();
        sink.error("UNAVAILABLE", "Charging status unavailable", None);
        sink.end_of_stream();
        sink.success(json!("ignored"));

        assert_eq!(
            stream.next().await,
            Some(EventPayload::error("UNAVAILABLE", "Charging status unavailable"))
        );
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn listen_rejected_by_handler() {
        struct Refuse;
        impl StreamHandler for Refuse {
            fn on_listen(&self, _: Option<Value>, _: EventSink) -> Result<(), PlatformError> {
                Err(PlatformError::new("DENIED", "no"))
            }
            fn on_cancel(&self, _: Option<Value>) -> Result<(), PlatformError> {
                Ok(())
            }
        }

        let bridge = LocalBridge::new(&BridgeConfig::default());
        EventChannel::new(Arc::new(bridge.native.clone()), "test/events")
            .set_stream_handler(Some(Arc::new(Refuse)));
        let ui = EventChannel::new(Arc::new(bridge.ui.clone()), "test/events");
        let err = ui.receive_stream(None).await.err().unwrap();
        assert_eq!(err.code(), "DENIED");
        assert!(!bridge.ui.is_bound("test/events"));
    }

    #[tokio::test]
    async fn dropping_the_stream_cancels() {
        let (_bridge, ui, recorder) = setup();
        let stream = ui.receive_stream(None).await.unwrap();
        drop(stream);
        for _ in 0..50 {
            if recorder.cancels.load(Ordering::SeqCst) == 1 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("background cancel never reached the handler");
    }

    #[tokio::test]
    async fn listen_after_drop_keeps_the_new_subscription() {
        let (_bridge, ui, recorder) = setup();
        let first = ui.receive_stream(None).await.unwrap();
        drop(first);
        let mut second = ui.receive_stream(None).await.unwrap();
        assert_eq!(recorder.listens.load(Ordering::SeqCst), 2);
        assert_eq!(recorder.cancels.load(Ordering::SeqCst), 1);

        recorder.push(json!("charging"));
        let event = tokio::time::timeout(Duration::from_millis(500), second.next())
            .await
            .unwrap();
        assert_eq!(event, Some(EventPayload::Success(json!("charging"))));
    }
}
