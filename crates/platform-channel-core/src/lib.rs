//! Core types for platform channels.
//!
//! A bridge has two ends, a UI end and a native end. Each end exposes a
//! [`BinaryMessenger`] that routes byte messages by channel name. On top of
//! it sit [`MethodChannel`] (request/response with a three-way answer) and
//! [`EventChannel`] (listen, push, cancel). Records that cross a screen or
//! process boundary use the [`Parcel`] byte form.

mod codec;
mod config;
mod error;
mod event_channel;
mod local;
mod message;
pub mod messenger;
mod method_channel;
mod parcel;

pub use codec::JsonMethodCodec;
pub use config::{BridgeConfig, DEFAULT_DOMAIN};
pub use error::{ChannelError, CodecError, ParcelError};
pub use event_channel::{EventChannel, EventSink, EventStream, StreamHandler};
pub use local::{LocalBridge, LocalMessenger};
pub use message::{EventPayload, MethodCall, MethodResult, PlatformError};
pub use messenger::{BinaryMessageHandler, BinaryMessenger, BinaryReply};
pub use method_channel::{MethodCallHandler, MethodChannel, MethodResultSink, MethodRouter};
pub use parcel::{Parcel, Parcelable};

/// Map type used for structured arguments.
pub type ValueMap = serde_json::Map<String, serde_json::Value>;

/// Which end of a bridge a component lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The UI layer.
    Ui,
    /// Native platform code.
    Native,
}
