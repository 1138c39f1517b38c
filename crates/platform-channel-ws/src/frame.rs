//! Frames exchanged over the socket.
//!
//! Every message carries a per-connection id chosen by the sender; the
//! answer frame echoes it so replies can be matched to pending sends.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// A channel message waiting for a reply.
    Message {
        id: u64,
        channel: String,
        payload: Option<Vec<u8>>,
    },
    /// The handler's reply.
    Reply { id: u64, payload: Option<Vec<u8>> },
    /// Nothing was bound to the channel on the receiving end.
    Unhandled { id: u64, channel: String },
    /// The handler dropped its reply handle.
    Dropped { id: u64, channel: String },
}

impl Frame {
    pub fn id(&self) -> u64 {
        match self {
            Self::Message { id, .. }
            | Self::Reply { id, .. }
            | Self::Unhandled { id, .. }
            | Self::Dropped { id, .. } => *id,
        }
    }
}
