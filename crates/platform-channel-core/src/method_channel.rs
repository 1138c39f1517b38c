//! Request/response channels.

use crate::codec::JsonMethodCodec;
use crate::error::ChannelError;
use crate::messenger::{BinaryMessageHandler, BinaryMessenger, BinaryReply};
use crate::{MethodCall, MethodResult, PlatformError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Single-use answer handle for one method call.
///
/// Consuming `self` guarantees at most one answer. Dropping it unanswered
/// reports [`ChannelError::ReplyDropped`] to the caller.
#[derive(Debug)]
pub struct MethodResultSink {
    channel: String,
    method: String,
    reply: BinaryReply,
}

impl MethodResultSink {
    pub fn success(self, value: Value) {
        self.send(MethodResult::Success(value));
    }

    pub fn error(self, code: impl Into<String>, message: impl Into<String>, details: Option<Value>) {
        self.send(MethodResult::Error(PlatformError {
            code: code.into(),
            message: message.into(),
            details,
        }));
    }

    pub fn not_implemented(self) {
        self.send(MethodResult::NotImplemented);
    }

    pub fn send(self, result: MethodResult) {
        match JsonMethodCodec::encode_result(&result) {
            Ok(bytes) => self.reply.send(bytes),
            Err(e) => {
                tracing::warn!(
                    "Failed to encode result of {} on {}: {}",
                    self.method,
                    self.channel,
                    e
                );
            }
        }
    }
}

/// Answers method calls arriving on a channel.
pub trait MethodCallHandler: Send + Sync {
    fn on_method_call(&self, call: MethodCall, result: MethodResultSink);
}

impl<F> MethodCallHandler for F
where
    F: Fn(MethodCall, MethodResultSink) + Send + Sync,
{
    fn on_method_call(&self, call: MethodCall, result: MethodResultSink) {
        self(call, result)
    }
}

type Route = Box<dyn Fn(Option<Value>, MethodResultSink) + Send + Sync>;

/// Method name to handler map. Unknown names answer
/// [`MethodResult::NotImplemented`].
#[derive(Default)]
pub struct MethodRouter {
    routes: HashMap<String, Route>,
}

impl MethodRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a route, replacing an existing one with the same name.
    pub fn route<F>(mut self, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Option<Value>, MethodResultSink) + Send + Sync + 'static,
    {
        self.routes.insert(method.into(), Box::new(handler));
        self
    }
}

impl MethodCallHandler for MethodRouter {
    fn on_method_call(&self, call: MethodCall, result: MethodResultSink) {
        match self.routes.get(&call.method) {
            Some(route) => route(call.arguments, result),
            None => {
                tracing::debug!("No route for {}", call.method);
                result.not_implemented();
            }
        }
    }
}

/// Decodes raw messages into calls for a [`MethodCallHandler`].
struct MethodCallAdapter {
    channel: String,
    handler: Arc<dyn MethodCallHandler>,
}

impl BinaryMessageHandler for MethodCallAdapter {
    fn on_message(&self, message: Option<Vec<u8>>, reply: BinaryReply) {
        let decoded = match message {
            Some(bytes) => JsonMethodCodec::decode_method_call(&bytes),
            None => Err(crate::error::CodecError::Empty),
        };
        let call = match decoded {
            Ok(call) => call,
            Err(e) => {
                tracing::warn!("Undecodable call on {}: {}", self.channel, e);
                let error = PlatformError::new("codec-error", e.to_string());
                reply.send(JsonMethodCodec::encode_error_envelope(&error).ok());
                return;
            }
        };

        tracing::debug!("{} <- {}", self.channel, call.method);
        let result = MethodResultSink {
            channel: self.channel.clone(),
            method: call.method.clone(),
            reply,
        };
        self.handler.on_method_call(call, result);
    }
}

/// A named request/response endpoint on one end of a bridge.
#[derive(Clone)]
pub struct MethodChannel {
    name: String,
    messenger: Arc<dyn BinaryMessenger>,
}

impl MethodChannel {
    pub fn new(messenger: Arc<dyn BinaryMessenger>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            messenger,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Binds `handler` for calls from the other end. Rebinding replaces;
    /// `None` unbinds.
    pub fn set_method_call_handler(&self, handler: Option<Arc<dyn MethodCallHandler>>) {
        let adapter = handler.map(|handler| {
            Arc::new(MethodCallAdapter {
                channel: self.name.clone(),
                handler,
            }) as Arc<dyn BinaryMessageHandler>
        });
        self.messenger.set_message_handler(&self.name, adapter);
    }

    /// Calls `method` on the other end and returns its three-way answer.
    pub async fn invoke_method(
        &self,
        method: &str,
        arguments: Option<Value>,
    ) -> Result<MethodResult, ChannelError> {
        let call = MethodCall::new(method, arguments);
        let bytes = JsonMethodCodec::encode_method_call(&call)?;
        tracing::debug!("{} -> {}", self.name, method);
        let reply = self.messenger.send(&self.name, Some(bytes)).await?;
        Ok(JsonMethodCodec::decode_result(reply.as_deref())?)
    }

    /// Like [`invoke_method`](Self::invoke_method), folding `Error` and
    /// `NotImplemented` answers into [`ChannelError`].
    pub async fn invoke(&self, method: &str, arguments: Option<Value>) -> Result<Value, ChannelError> {
        match self.invoke_method(method, arguments).await? {
            MethodResult::Success(value) => Ok(value),
            MethodResult::Error(error) => Err(ChannelError::Platform {
                channel: self.name.clone(),
                error,
            }),
            MethodResult::NotImplemented => Err(ChannelError::NotImplemented {
                channel: self.name.clone(),
                method: method.to_string(),
            }),
        }
    }
}
