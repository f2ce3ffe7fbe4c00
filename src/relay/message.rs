//! Typed wire payloads for the stream and control channels.
//!
//! Both directions use fixed-shape records validated at the transport
//! boundary. Malformed inbound JSON never reaches the session logic.

use crate::packet::MeasurementPacket;
use serde::{Deserialize, Serialize};

/// Outbound payload published on the `stream` channel, one per accepted
/// measurement packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketMessage {
    /// Bluetooth address of the originating sensor
    pub address: String,
    /// Per-device sequence number (diagnostic, strictly increasing)
    pub sequence: u64,
    pub euler_x: f64,
    pub euler_y: f64,
    pub euler_z: f64,
}

impl From<&MeasurementPacket> for PacketMessage {
    fn from(packet: &MeasurementPacket) -> Self {
        Self {
            address: packet.address.to_string(),
            sequence: packet.sequence,
            euler_x: packet.euler.x,
            euler_y: packet.euler.y,
            euler_z: packet.euler.z,
        }
    }
}

/// Inbound command received on the `control` channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlCommand {
    /// Stop the running session and tear down.
    Stop,
    /// Start streaming. Ignored when a session is already streaming.
    Start,
}
