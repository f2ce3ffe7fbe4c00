//! TCP implementation of the pub/sub transport.
//!
//! Wire format: one JSON envelope `{"channel": ..., "payload": ...}` per
//! line, both directions. Each subscriber gets its own bounded queue and
//! writer task, so a slow subscriber loses messages instead of delaying the
//! others. Inbound lines are routed to per-channel receivers by envelope
//! channel name.

use super::{Channel, INBOUND_CHANNEL_BUFFER_SIZE, Transport, TransportError};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Outbound queue depth per subscriber. A subscriber that falls this far
/// behind starts losing messages.
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 256;

/// On-the-wire frame.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    channel: String,
    payload: Value,
}

struct SubscriberHandle {
    peer: SocketAddr,
    line_tx: mpsc::Sender<Arc<str>>,
}

#[derive(Default)]
struct Shared {
    subscribers: Mutex<Vec<SubscriberHandle>>,
    upstream: Mutex<Option<mpsc::Sender<Arc<str>>>>,
    inbound: Mutex<HashMap<Channel, mpsc::Sender<Value>>>,
    listen_addr: Mutex<Option<SocketAddr>>,
}

impl Shared {
    /// Hand an inbound payload to whoever registered for its channel.
    fn route_inbound(&self, raw: &str, source: SocketAddr) {
        let envelope: Envelope = match serde_json::from_str(raw) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!("Dropping malformed frame from {}: {}", source, error);
                return;
            }
        };
        let Ok(channel) = Channel::from_str(&envelope.channel) else {
            warn!(
                "Dropping frame from {} for unknown channel '{}'",
                source, envelope.channel
            );
            return;
        };
        let inbound = self.inbound.lock().unwrap();
        match inbound.get(&channel) {
            Some(tx) => {
                if tx.try_send(envelope.payload).is_err() {
                    warn!("Inbound {} queue full, dropping frame from {}", channel, source);
                }
            }
            None => debug!("No receiver registered for {} frames", channel),
        }
    }
}

/// TCP pub/sub endpoint covering both transport roles: a listener that
/// fans out to subscribers, and an optional upstream client connection
/// that also receives everything emitted.
pub struct TcpTransport {
    shared: Arc<Shared>,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpTransport {
    pub fn new() -> Self {
        Self { shared: Arc::new(Shared::default()) }
    }

    /// Server role: accept subscriber connections on `host:port`.
    ///
    /// Returns the bound address (useful with port 0).
    pub async fn listen(&self, host: &str, port: u16) -> Result<SocketAddr, TransportError> {
        let address = format!("{host}:{port}");
        let listener = TcpListener::bind(address.as_str())
            .await
            .map_err(|source| TransportError::Listen { address: address.clone(), source })?;
        let local = listener
            .local_addr()
            .map_err(|source| TransportError::Listen { address, source })?;
        *self.shared.listen_addr.lock().unwrap() = Some(local);
        info!("Listening for subscribers on {}", local);

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        info!("Subscriber connected: {}", peer);
                        attach_connection(&shared, stream, peer, true);
                    }
                    Err(error) => {
                        warn!("Error accepting subscriber: {}", error);
                    }
                }
            }
        });
        Ok(local)
    }

    /// Client role: connect to the upstream publish endpoint.
    pub async fn connect(&self, host: &str, port: u16) -> Result<(), TransportError> {
        let address = format!("{host}:{port}");
        let stream = TcpStream::connect(address.as_str())
            .await
            .map_err(|source| TransportError::Connect { address: address.clone(), source })?;
        let peer = stream
            .peer_addr()
            .map_err(|source| TransportError::Connect { address, source })?;
        info!("Connected to publish endpoint {}", peer);
        let line_tx = attach_connection(&self.shared, stream, peer, false);
        *self.shared.upstream.lock().unwrap() = Some(line_tx);
        Ok(())
    }

    /// Number of currently attached subscribers (diagnostics and tests).
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.lock().unwrap().len()
    }
}

/// Wire a connection up with its own writer queue and reader task.
/// Returns the writer-queue sender.
fn attach_connection(
    shared: &Arc<Shared>,
    stream: TcpStream,
    peer: SocketAddr,
    is_subscriber: bool,
) -> mpsc::Sender<Arc<str>> {
    let (read_half, mut write_half) = stream.into_split();
    let (line_tx, mut line_rx) = mpsc::channel::<Arc<str>>(SUBSCRIBER_QUEUE_CAPACITY);

    // Writer: drains this connection's queue only. Nothing here can be
    // slowed down by any other connection.
    tokio::spawn(async move {
        while let Some(line) = line_rx.recv().await {
            if write_half.write_all(line.as_bytes()).await.is_err()
                || write_half.write_all(b"\n").await.is_err()
            {
                debug!("Write to {} failed, dropping connection", peer);
                break;
            }
        }
    });

    // Reader: routes inbound frames until the peer hangs up.
    let reader_shared = Arc::clone(shared);
    tokio::spawn(async move {
        read_frames(read_half, peer, &reader_shared).await;
        if is_subscriber {
            info!("Subscriber disconnected: {}", peer);
            reader_shared
                .subscribers
                .lock()
                .unwrap()
                .retain(|s| s.peer != peer);
        } else {
            warn!("Publish endpoint {} closed the connection", peer);
        }
    });

    if is_subscriber {
        shared
            .subscribers
            .lock()
            .unwrap()
            .push(SubscriberHandle { peer, line_tx: line_tx.clone() });
    }
    line_tx
}

async fn read_frames(read_half: OwnedReadHalf, peer: SocketAddr, shared: &Shared) {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    shared.route_inbound(trimmed, peer);
                }
            }
            Ok(None) => break,
            Err(error) => {
                debug!("Read from {} failed: {}", peer, error);
                break;
            }
        }
    }
}

impl Transport for TcpTransport {
    fn emit(&self, channel: Channel, payload: Value) -> Result<(), TransportError> {
        let line: Arc<str> = serde_json::to_string(&Envelope {
            channel: channel.name().to_string(),
            payload,
        })?
        .into();

        let upstream = self.shared.upstream.lock().unwrap().clone();
        if self.shared.listen_addr.lock().unwrap().is_none() && upstream.is_none() {
            return Err(TransportError::NotRunning);
        }

        if let Some(upstream) = upstream
            && upstream.try_send(Arc::clone(&line)).is_err()
        {
            debug!("Upstream queue unavailable, dropping {} frame", channel);
        }

        // Fan out. Queue-full drops the frame for that subscriber only;
        // a closed queue means the writer died, prune the subscriber.
        let mut subscribers = self.shared.subscribers.lock().unwrap();
        subscribers.retain(|subscriber| {
            match subscriber.line_tx.try_send(Arc::clone(&line)) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    debug!("Subscriber {} lagging, dropping {} frame", subscriber.peer, channel);
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            }
        });
        Ok(())
    }

    fn on_receive(&self, channel: Channel) -> mpsc::Receiver<Value> {
        let (tx, rx) = mpsc::channel(INBOUND_CHANNEL_BUFFER_SIZE);
        self.shared.inbound.lock().unwrap().insert(channel, tx);
        rx
    }
}
