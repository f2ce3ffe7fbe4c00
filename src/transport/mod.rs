//! Publish/subscribe transport abstraction.
//!
//! The relay publishes packets and receives subscriber commands over two
//! named logical channels. The channels are independent and unordered
//! relative to each other. How payloads travel (sockets, wire encoding,
//! subscriber bookkeeping) is the transport's concern; the core only sees
//! this trait.

pub mod tcp;

use thiserror::Error;
use tokio::sync::mpsc;

/// Logical channel names used by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Device → subscriber measurement packets
    Stream,
    /// Subscriber → device control commands
    Control,
}

impl Channel {
    pub fn name(&self) -> &'static str {
        match self {
            Channel::Stream => "stream",
            Channel::Control => "control",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stream" => Ok(Channel::Stream),
            "control" => Ok(Channel::Control),
            _ => Err(format!("Unknown channel: {}", s)),
        }
    }
}

/// Error type for transport operations.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Could not bind the subscriber listener
    #[error("failed to listen on {address}: {source}")]
    Listen {
        address: String,
        source: std::io::Error,
    },
    /// Could not reach the upstream publish endpoint
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        source: std::io::Error,
    },
    /// Emit called on a channel nobody can deliver right now
    #[error("transport is not running")]
    NotRunning,
    /// Payload could not be encoded into a frame
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Buffer size for per-channel inbound payload queues.
pub const INBOUND_CHANNEL_BUFFER_SIZE: usize = 64;

/// Seam between the relay and the concrete pub/sub mechanism.
///
/// `emit` must be non-blocking: it is called on the packet path and may
/// only enqueue. Delivery to one subscriber never delays delivery to
/// another; a subscriber that cannot keep up loses messages instead of
/// slowing the rest down.
pub trait Transport: Send + Sync {
    /// Publish a payload to every connected subscriber of `channel`.
    fn emit(&self, channel: Channel, payload: serde_json::Value) -> Result<(), TransportError>;

    /// Receive payloads arriving on `channel`. May be called once per
    /// channel; later calls replace the earlier receiver.
    fn on_receive(&self, channel: Channel) -> mpsc::Receiver<serde_json::Value>;
}
