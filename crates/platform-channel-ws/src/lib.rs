//! WebSocket transport for platform channels.
//!
//! Carries the same byte messages as the in-process bridge between two
//! processes. Each outgoing message gets a connection-unique id; the peer
//! echoes it in its answer frame, so any number of sends can be in flight.

mod frame;

pub use frame::Frame;

use futures_util::future::BoxFuture;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{FutureExt, SinkExt, StreamExt};
use platform_channel_core::messenger::{
    await_reply, BinaryMessageHandler, BinaryMessenger, Delivery, Dispatcher, HandlerRegistry,
    Inbound,
};
use platform_channel_core::{BridgeConfig, ChannelError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// Errors from the WebSocket transport.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    #[error("websocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("frame encoding: {0}")]
    Frame(#[from] serde_json::Error),
    #[error("connection task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Sends waiting for an answer. Once `closed`, nothing new is registered.
#[derive(Default)]
struct PendingReplies {
    replies: HashMap<u64, oneshot::Sender<Delivery>>,
    closed: bool,
}

type Pending = Arc<Mutex<PendingReplies>>;

/// How long [`Connection::close`] waits for the peer to acknowledge.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// What the writer task sends next.
enum Outgoing {
    Frame(Frame),
    Close,
}

fn lock(pending: &Pending) -> MutexGuard<'_, PendingReplies> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registers a reply slot. Fails once the connection has shut down.
fn register(pending: &Pending, id: u64, tx: oneshot::Sender<Delivery>) -> Result<(), ChannelError> {
    let mut pending = lock(pending);
    if pending.closed {
        return Err(ChannelError::TransportClosed);
    }
    pending.replies.insert(id, tx);
    Ok(())
}

/// Marks the connection closed and fails every waiting send.
fn fail_pending(pending: &Pending) {
    let orphaned: Vec<_> = {
        let mut pending = lock(pending);
        pending.closed = true;
        pending.replies.drain().collect()
    };
    if !orphaned.is_empty() {
        tracing::debug!("Failing {} pending sends", orphaned.len());
    }
    for (_, tx) in orphaned {
        let _ = tx.send(Err(ChannelError::TransportClosed));
    }
}

/// One end of a bridge over a WebSocket connection.
#[derive(Clone)]
pub struct WsMessenger {
    handlers: Arc<HandlerRegistry>,
    outbound: mpsc::UnboundedSender<Outgoing>,
    pending: Pending,
    next_id: Arc<AtomicU64>,
    timeout: Option<Duration>,
}

/// The running connection. Resolves when the peer goes away.
pub struct Connection {
    task: JoinHandle<Result<(), WsError>>,
    outbound: mpsc::UnboundedSender<Outgoing>,
}

impl Connection {
    pub async fn closed(self) -> Result<(), WsError> {
        self.task.await?
    }

    /// Sends a close frame and waits briefly for the peer to hang up.
    /// Pending sends fail with `TransportClosed`.
    pub async fn close(mut self) {
        if self.outbound.send(Outgoing::Close).is_err() {
            return;
        }
        match tokio::time::timeout(CLOSE_GRACE, &mut self.task).await {
            Ok(Ok(Err(e))) => tracing::debug!("Connection ended during close: {}", e),
            Ok(_) => {}
            Err(_) => {
                tracing::debug!("Peer did not acknowledge close");
                self.task.abort();
            }
        }
    }
}

impl WsMessenger {
    /// Connects to a host at `url` (e.g. `ws://127.0.0.1:8001`).
    pub async fn connect(url: &str, config: &BridgeConfig) -> Result<(Self, Connection), WsError> {
        let (ws, _) = tokio_tungstenite::connect_async(url).await?;
        tracing::info!("Connected to {}", url);
        Ok(Self::spawn(ws, config))
    }

    /// Completes the server side handshake on an accepted socket.
    pub async fn accept(stream: TcpStream, config: &BridgeConfig) -> Result<(Self, Connection), WsError> {
        let ws = tokio_tungstenite::accept_async(stream).await?;
        Ok(Self::spawn(ws, config))
    }

    /// Starts the reader, writer and dispatch tasks for an open socket.
    pub fn spawn<S>(ws: WebSocketStream<S>, config: &BridgeConfig) -> (Self, Connection)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = ws.split();
        let handlers = Arc::new(HandlerRegistry::new());
        let dispatcher = Dispatcher::spawn(handlers.clone());
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let pending: Pending = Arc::new(Mutex::new(PendingReplies::default()));

        let writer = tokio::spawn(write_frames(sink, outbound_rx));
        let task = tokio::spawn(read_frames(
            stream,
            dispatcher,
            outbound.clone(),
            pending.clone(),
            writer,
        ));

        let connection = Connection {
            task,
            outbound: outbound.clone(),
        };
        let messenger = Self {
            handlers,
            outbound,
            pending,
            next_id: Arc::new(AtomicU64::new(1)),
            timeout: config.call_timeout(),
        };
        (messenger, connection)
    }

    /// Number of sends still waiting for an answer.
    pub fn pending_replies(&self) -> usize {
        lock(&self.pending).replies.len()
    }
}

impl BinaryMessenger for WsMessenger {
    fn send(&self, channel: &str, message: Option<Vec<u8>>) -> BoxFuture<'static, Delivery> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        if let Err(e) = register(&self.pending, id, tx) {
            return futures_util::future::ready(Err(e)).boxed();
        }

        let frame = Frame::Message {
            id,
            channel: channel.to_string(),
            payload: message,
        };
        if self.outbound.send(Outgoing::Frame(frame)).is_err() {
            lock(&self.pending).replies.remove(&id);
            return futures_util::future::ready(Err(ChannelError::TransportClosed)).boxed();
        }

        let pending = self.pending.clone();
        let channel = channel.to_string();
        let timeout = self.timeout;
        async move {
            let delivery = await_reply(channel, rx, timeout).await;
            if matches!(delivery, Err(ChannelError::Timeout { .. })) {
                lock(&pending).replies.remove(&id);
            }
            delivery
        }
        .boxed()
    }

    fn set_message_handler(&self, channel: &str, handler: Option<Arc<dyn BinaryMessageHandler>>) {
        self.handlers.set(channel, handler);
    }
}

async fn write_frames<S>(
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut frames: mpsc::UnboundedReceiver<Outgoing>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(next) = frames.recv().await {
        let frame = match next {
            Outgoing::Frame(frame) => frame,
            Outgoing::Close => {
                if let Err(e) = sink.close().await {
                    tracing::debug!("WebSocket close failed: {}", e);
                }
                break;
            }
        };
        let text = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Failed to encode frame {}: {}", frame.id(), e);
                continue;
            }
        };
        if let Err(e) = sink.send(Message::Text(text.into())).await {
            tracing::warn!("WebSocket write failed: {}", e);
            break;
        }
    }
}

async fn read_frames<S>(
    mut stream: SplitStream<WebSocketStream<S>>,
    dispatcher: Dispatcher,
    outbound: mpsc::UnboundedSender<Outgoing>,
    pending: Pending,
    writer: JoinHandle<()>,
) -> Result<(), WsError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let result = loop {
        let msg = match stream.next().await {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => break Err(WsError::from(e)),
            None => break Ok(()),
        };
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break Ok(()),
            _ => continue,
        };
        match serde_json::from_str::<Frame>(&text) {
            Ok(frame) => handle_frame(frame, &dispatcher, &outbound, &pending),
            Err(e) => tracing::warn!("Invalid frame: {}", e),
        }
    };

    writer.abort();
    fail_pending(&pending);
    tracing::info!("Connection closed");
    result
}

fn handle_frame(
    frame: Frame,
    dispatcher: &Dispatcher,
    outbound: &mpsc::UnboundedSender<Outgoing>,
    pending: &Pending,
) {
    match frame {
        Frame::Message {
            id,
            channel,
            payload,
        } => {
            let (tx, rx) = oneshot::channel();
            let inbound = Inbound {
                channel: channel.clone(),
                message: payload,
                reply: tx,
            };
            if dispatcher.deliver(inbound).is_err() {
                return;
            }
            let outbound = outbound.clone();
            tokio::spawn(async move {
                let answer = match rx.await {
                    Ok(Ok(payload)) => Frame::Reply { id, payload },
                    Ok(Err(ChannelError::NoHandlerBound { .. })) => Frame::Unhandled { id, channel },
                    Ok(Err(_)) | Err(_) => Frame::Dropped { id, channel },
                };
                let _ = outbound.send(Outgoing::Frame(answer));
            });
        }
        Frame::Reply { id, payload } => resolve(pending, id, Ok(payload)),
        Frame::Unhandled { id, channel } => {
            resolve(pending, id, Err(ChannelError::NoHandlerBound { channel }))
        }
        Frame::Dropped { id, channel } => {
            resolve(pending, id, Err(ChannelError::ReplyDropped { channel }))
        }
    }
}

fn resolve(pending: &Pending, id: u64, delivery: Delivery) {
    let slot = lock(pending).replies.remove(&id);
    match slot {
        Some(tx) => {
            let _ = tx.send(delivery);
        }
        None => tracing::debug!("Answer for unknown send {}", id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform_channel_core::{
        EventChannel, EventPayload, EventSink, MethodChannel, MethodResult, MethodRouter,
        PlatformError, StreamHandler,
    };
    use serde_json::{json, Value};
    use tokio::net::TcpListener;

    async fn connected_pair(config: BridgeConfig) -> (WsMessenger, WsMessenger) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let host_config = config.clone();
        let host = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            WsMessenger::accept(stream, &host_config).await.unwrap().0
        });
        let (ui, _) = WsMessenger::connect(&format!("ws://{addr}"), &config)
            .await
            .unwrap();
        (ui, host.await.unwrap())
    }

    #[tokio::test]
    async fn method_calls_cross_the_socket() {
        let (ui, native) = connected_pair(BridgeConfig::default()).await;
        MethodChannel::new(Arc::new(native), "test/calls").set_method_call_handler(Some(
            Arc::new(MethodRouter::new().route("ping", |_, r| r.success(json!("pong")))),
        ));

        let calls = MethodChannel::new(Arc::new(ui.clone()), "test/calls");
        assert_eq!(
            calls.invoke_method("ping", None).await.unwrap(),
            MethodResult::Success(json!("pong"))
        );
        assert_eq!(
            calls.invoke_method("other", None).await.unwrap(),
            MethodResult::NotImplemented
        );

        let unbound = MethodChannel::new(Arc::new(ui.clone()), "test/none");
        let err = unbound.invoke_method("ping", None).await.unwrap_err();
        assert!(matches!(err, ChannelError::NoHandlerBound { .. }));
        assert_eq!(ui.pending_replies(), 0);
    }

    #[tokio::test]
    async fn concurrent_calls_match_their_replies() {
        let (ui, native) = connected_pair(BridgeConfig::default()).await;
        MethodChannel::new(Arc::new(native), "test/calls").set_method_call_handler(Some(
            Arc::new(MethodRouter::new().route("echo", |args, result| {
                let delay = args.as_ref().and_then(Value::as_u64).unwrap_or(0);
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(30 - delay * 10)).await;
                    result.success(args.unwrap_or(Value::Null));
                });
            })),
        ));

        let calls = MethodChannel::new(Arc::new(ui), "test/calls");
        let (a, b, c) = tokio::join!(
            calls.invoke("echo", Some(json!(0))),
            calls.invoke("echo", Some(json!(1))),
            calls.invoke("echo", Some(json!(2))),
        );
        assert_eq!(a.unwrap(), json!(0));
        assert_eq!(b.unwrap(), json!(1));
        assert_eq!(c.unwrap(), json!(2));
    }

    #[tokio::test]
    async fn events_cross_the_socket() {
        struct Ticker;
        impl StreamHandler for Ticker {
            fn on_listen(&self, _: Option<Value>, events: EventSink) -> Result<(), PlatformError> {
                events.success(json!("charging"));
                events.end_of_stream();
                Ok(())
            }
            fn on_cancel(&self, _: Option<Value>) -> Result<(), PlatformError> {
                Ok(())
            }
        }

        let (ui, native) = connected_pair(BridgeConfig::default()).await;
        EventChannel::new(Arc::new(native), "test/events").set_stream_handler(Some(Arc::new(Ticker)));
        let mut stream = EventChannel::new(Arc::new(ui), "test/events")
            .receive_stream(None)
            .await
            .unwrap();
        assert_eq!(stream.next().await, Some(EventPayload::Success(json!("charging"))));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn close_ends_both_sides() {
        let config = BridgeConfig::default();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let host_config = config.clone();
        let host = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (_native, connection) = WsMessenger::accept(stream, &host_config).await.unwrap();
            connection.closed().await
        });

        let (ui, connection) = WsMessenger::connect(&format!("ws://{addr}"), &config)
            .await
            .unwrap();
        connection.close().await;
        host.await.unwrap().unwrap();
        let err = ui.send("test/after", None).await.unwrap_err();
        assert!(matches!(err, ChannelError::TransportClosed));
    }

    #[tokio::test]
    async fn no_reply_slot_after_shutdown() {
        let pending: Pending = Arc::new(Mutex::new(PendingReplies::default()));
        let (tx, waiting) = oneshot::channel();
        register(&pending, 1, tx).unwrap();
        fail_pending(&pending);
        assert!(matches!(waiting.await.unwrap(), Err(ChannelError::TransportClosed)));

        // A send racing the shutdown is refused instead of parked.
        let (tx, _rx) = oneshot::channel();
        assert!(matches!(register(&pending, 2, tx), Err(ChannelError::TransportClosed)));
        assert!(lock(&pending).replies.is_empty());
    }

    #[tokio::test]
    async fn peer_disconnect_fails_pending_sends() {
        let config = BridgeConfig::default();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            // Read the first frame and hang up without answering.
            let _ = ws.next().await;
        });

        let (ui, connection) = WsMessenger::connect(&format!("ws://{addr}"), &config)
            .await
            .unwrap();
        let err = ui.send("test/stall", None).await.unwrap_err();
        assert!(matches!(err, ChannelError::TransportClosed));
        let _ = connection.closed().await;
        let err = ui.send("test/after", None).await.unwrap_err();
        assert!(matches!(err, ChannelError::TransportClosed));
    }
}
