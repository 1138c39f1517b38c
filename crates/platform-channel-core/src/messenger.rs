//! Byte-level transport between the two ends of a bridge.
//!
//! A [`BinaryMessenger`] routes opaque messages by channel name. Each end
//! owns a [`HandlerRegistry`] and a [`Dispatcher`] task that hands incoming
//! messages to handlers one at a time, in arrival order.

use crate::error::ChannelError;
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// What travels back to a sender: the reply bytes, or a transport failure
/// decided on the receiving end.
pub type Delivery = Result<Option<Vec<u8>>, ChannelError>;

/// Single-use reply handle given to a handler with each message.
///
/// Dropping it without calling [`BinaryReply::send`] is reported to the
/// sender as [`ChannelError::ReplyDropped`].
#[derive(Debug)]
pub struct BinaryReply {
    tx: oneshot::Sender<Delivery>,
}

impl BinaryReply {
    pub fn new(tx: oneshot::Sender<Delivery>) -> Self {
        Self { tx }
    }

    pub fn send(self, reply: Option<Vec<u8>>) {
        // The sender may have given up (timeout); nothing to do then.
        let _ = self.tx.send(Ok(reply));
    }
}

/// Receives raw messages for one channel name.
pub trait BinaryMessageHandler: Send + Sync {
    fn on_message(&self, message: Option<Vec<u8>>, reply: BinaryReply);
}

impl<F> BinaryMessageHandler for F
where
    F: Fn(Option<Vec<u8>>, BinaryReply) + Send + Sync,
{
    fn on_message(&self, message: Option<Vec<u8>>, reply: BinaryReply) {
        self(message, reply)
    }
}

/// One end of a bridge.
pub trait BinaryMessenger: Send + Sync {
    /// Sends `message` to the handler bound to `channel` on the other end.
    ///
    /// The message is queued before this returns; dropping the future only
    /// discards the reply.
    fn send(&self, channel: &str, message: Option<Vec<u8>>) -> BoxFuture<'static, Delivery>;

    /// Binds `handler` to `channel` on this end, replacing any previous
    /// handler. `None` unbinds.
    fn set_message_handler(&self, channel: &str, handler: Option<Arc<dyn BinaryMessageHandler>>);
}

/// Channel name to handler map for one end.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn BinaryMessageHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, channel: &str, handler: Option<Arc<dyn BinaryMessageHandler>>) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        match handler {
            Some(handler) => {
                if handlers.insert(channel.to_string(), handler).is_some() {
                    tracing::debug!("Replaced handler on {}", channel);
                }
            }
            None => {
                handlers.remove(channel);
            }
        }
    }

    pub fn get(&self, channel: &str) -> Option<Arc<dyn BinaryMessageHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .cloned()
    }

    pub fn is_bound(&self, channel: &str) -> bool {
        self.get(channel).is_some()
    }
}

/// A message waiting for the dispatch task.
#[derive(Debug)]
pub struct Inbound {
    pub channel: String,
    pub message: Option<Vec<u8>>,
    pub reply: oneshot::Sender<Delivery>,
}

/// Serial dispatch queue for one end.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Inbound>,
}

impl Dispatcher {
    /// Spawns the dispatch task. Must be called inside a Tokio runtime.
    pub fn spawn(registry: Arc<HandlerRegistry>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_dispatch(registry, rx));
        Self { tx }
    }

    /// Queues a message. Fails only if the dispatch task is gone.
    pub fn deliver(&self, inbound: Inbound) -> Result<(), ChannelError> {
        self.tx
            .send(inbound)
            .map_err(|_| ChannelError::TransportClosed)
    }
}

async fn run_dispatch(registry: Arc<HandlerRegistry>, mut rx: mpsc::UnboundedReceiver<Inbound>) {
    while let Some(inbound) = rx.recv().await {
        match registry.get(&inbound.channel) {
            Some(handler) => {
                tracing::trace!("Dispatching message on {}", inbound.channel);
                handler.on_message(inbound.message, BinaryReply::new(inbound.reply));
            }
            None => {
                tracing::debug!("No handler bound on {}", inbound.channel);
                let _ = inbound.reply.send(Err(ChannelError::NoHandlerBound {
                    channel: inbound.channel,
                }));
            }
        }
    }
    tracing::debug!("Dispatch queue closed");
}

/// Waits for the reply to one send, applying the transport timeout.
pub async fn await_reply(
    channel: String,
    rx: oneshot::Receiver<Delivery>,
    timeout: Option<Duration>,
) -> Delivery {
    let received = match timeout {
        Some(limit) => match tokio::time::timeout(limit, rx).await {
            Ok(received) => received,
            Err(_) => {
                tracing::warn!("Call on {} timed out after {:?}", channel, limit);
                return Err(ChannelError::Timeout { channel });
            }
        },
        None => rx.await,
    };
    received.unwrap_or(Err(ChannelError::ReplyDropped { channel }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo() -> Arc<dyn BinaryMessageHandler> {
        Arc::new(|message: Option<Vec<u8>>, reply: BinaryReply| reply.send(message))
    }

    #[test]
    fn registry_replaces_and_unbinds() {
        let registry = HandlerRegistry::new();
        assert!(!registry.is_bound("a/b"));
        registry.set("a/b", Some(echo()));
        registry.set("a/b", Some(echo()));
        assert!(registry.is_bound("a/b"));
        registry.set("a/b", None);
        assert!(!registry.is_bound("a/b"));
    }

    #[tokio::test]
    async fn dispatcher_reports_missing_handler() {
        let registry = Arc::new(HandlerRegistry::new());
        let dispatcher = Dispatcher::spawn(registry);
        let (tx, rx) = oneshot::channel();
        dispatcher
            .deliver(Inbound {
                channel: "a/b".into(),
                message: None,
                reply: tx,
            })
            .unwrap();
        let err = await_reply("a/b".into(), rx, None).await.unwrap_err();
        assert!(matches!(err, ChannelError::NoHandlerBound { channel } if channel == "a/b"));
    }

    #[tokio::test]
    async fn dispatcher_delivers_in_order() {
        let registry = Arc::new(HandlerRegistry::new());
        registry.set("a/b", Some(echo()));
        let dispatcher = Dispatcher::spawn(registry);

        let mut pending = Vec::new();
        for i in 0..5u8 {
            let (tx, rx) = oneshot::channel();
            dispatcher
                .deliver(Inbound {
                    channel: "a/b".into(),
                    message: Some(vec![i]),
                    reply: tx,
                })
                .unwrap();
            pending.push(rx);
        }
        for (i, rx) in pending.into_iter().enumerate() {
            let reply = await_reply("a/b".into(), rx, None).await.unwrap();
            assert_eq!(reply, Some(vec![i as u8]));
        }
    }

    #[tokio::test]
    async fn dropped_reply_and_timeout() {
        let (tx, rx) = oneshot::channel::<Delivery>();
        drop(BinaryReply::new(tx));
        let err = await_reply("a/b".into(), rx, None).await.unwrap_err();
        assert!(matches!(err, ChannelError::ReplyDropped { .. }));

        let (_tx, rx) = oneshot::channel::<Delivery>();
        let err = await_reply("a/b".into(), rx, Some(Duration::from_millis(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Timeout { .. }));
    }
}
