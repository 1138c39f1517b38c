//! In-process bridge: two messengers wired back to back.

use crate::config::BridgeConfig;
use crate::messenger::{
    await_reply, BinaryMessageHandler, BinaryMessenger, Delivery, Dispatcher, HandlerRegistry,
    Inbound,
};
use crate::Side;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// One end of a [`LocalBridge`].
#[derive(Clone)]
pub struct LocalMessenger {
    side: Side,
    handlers: Arc<HandlerRegistry>,
    peer: Dispatcher,
    timeout: Option<Duration>,
}

impl LocalMessenger {
    /// Whether a handler is bound on this end.
    pub fn is_bound(&self, channel: &str) -> bool {
        self.handlers.is_bound(channel)
    }
}

impl BinaryMessenger for LocalMessenger {
    fn send(&self, channel: &str, message: Option<Vec<u8>>) -> BoxFuture<'static, Delivery> {
        let (tx, rx) = oneshot::channel();
        let queued = self.peer.deliver(Inbound {
            channel: channel.to_string(),
            message,
            reply: tx,
        });
        if let Err(e) = queued {
            return futures_util::future::ready(Err(e)).boxed();
        }
        tracing::trace!("{:?} sent on {}", self.side, channel);
        await_reply(channel.to_string(), rx, self.timeout).boxed()
    }

    fn set_message_handler(&self, channel: &str, handler: Option<Arc<dyn BinaryMessageHandler>>) {
        self.handlers.set(channel, handler);
    }
}

/// A UI end and a native end in the same process.
///
/// Messages sent from one end are dispatched on the other end's serial
/// dispatch task.
pub struct LocalBridge {
    pub ui: LocalMessenger,
    pub native: LocalMessenger,
}

impl LocalBridge {
    /// Must be called inside a Tokio runtime.
    pub fn new(config: &BridgeConfig) -> Self {
        let ui_handlers = Arc::new(HandlerRegistry::new());
        let native_handlers = Arc::new(HandlerRegistry::new());
        let ui_dispatch = Dispatcher::spawn(ui_handlers.clone());
        let native_dispatch = Dispatcher::spawn(native_handlers.clone());
        let timeout = config.call_timeout();

        Self {
            ui: LocalMessenger {
                side: Side::Ui,
                handlers: ui_handlers,
                peer: native_dispatch,
                timeout,
            },
            native: LocalMessenger {
                side: Side::Native,
                handlers: native_handlers,
                peer: ui_dispatch,
                timeout,
            },
        }
    }
}
