//! Relay between the session and remote subscribers.
//!
//! Two independent loops: the stream loop publishes every accepted packet
//! on the `stream` channel, the control loop validates inbound `control`
//! payloads and forwards well-formed commands to the session. Neither loop
//! waits on the other, and neither ever takes the bridge down on bad input.

pub mod message;

use crate::packet::MeasurementPacket;
use crate::transport::{Channel, Transport, TransportError};
use log::{debug, warn};
use message::{ControlCommand, PacketMessage};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Buffer size for the accepted-packet queue between gate and bridge.
pub const PACKET_CHANNEL_BUFFER_SIZE: usize = 256;

/// Fans packets out to subscribers and feeds subscriber commands back.
pub struct RelayBridge {
    transport: Arc<dyn Transport>,
}

impl RelayBridge {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Publish one packet to every connected subscriber.
    ///
    /// Per-subscriber isolation (a slow subscriber never delays the rest)
    /// is the transport's contract; from here a publish is a single
    /// non-blocking emit.
    pub fn publish(&self, packet: &MeasurementPacket) -> Result<(), TransportError> {
        let payload = serde_json::to_value(PacketMessage::from(packet))?;
        self.transport.emit(Channel::Stream, payload)
    }

    /// Spawn the stream and control loops.
    ///
    /// `packet_rx` carries accepted packets from the session's gate;
    /// validated subscriber commands go out through `command_tx`. Consumes
    /// the bridge: both loops run until their channels close.
    pub fn start(
        self,
        mut packet_rx: mpsc::Receiver<MeasurementPacket>,
        command_tx: mpsc::Sender<ControlCommand>,
    ) {
        let mut inbound = self.transport.on_receive(Channel::Control);

        tokio::spawn(async move {
            while let Some(raw) = inbound.recv().await {
                match serde_json::from_value::<ControlCommand>(raw) {
                    Ok(command) => {
                        debug!("Forwarding subscriber command: {:?}", command);
                        if command_tx.send(command).await.is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        warn!("Dropping malformed control message: {}", error);
                    }
                }
            }
        });

        tokio::spawn(async move {
            while let Some(packet) = packet_rx.recv().await {
                if let Err(error) = self.publish(&packet) {
                    debug!("Publish failed for {}: {}", packet.address, error);
                }
            }
        });
    }
}
