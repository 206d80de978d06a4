//! The UDP gossip channel.
//!
//! One socket per node. Exactly one receive is outstanding at any time; a
//! new receive is posted when the previous one completes, so per-peer
//! processing is FIFO. Sends are fire-and-forget tasks; a failed send is
//! counted and logged, and the periodic loops retry on their own cadence.

use raze_messages::{Message, MessageParser, ParseError};
use raze_types::{Endpoint, NetworkId};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::debug;

use crate::reserved::reserved_address;
use crate::stats::NetworkStats;

/// Largest datagram we accept; comfortably above the biggest message.
const BUFFER_SIZE: usize = 512;

/// Receives parsed messages from the channel. Implemented by the node.
pub trait InboundHandler: Send + Sync {
    fn receive(&self, message: Message, sender: Endpoint);
}

/// A bound UDP socket plus the network's parser and counters.
pub struct UdpChannel {
    socket: Arc<UdpSocket>,
    network: NetworkId,
    parser: MessageParser,
    on: AtomicBool,
    pub stats: NetworkStats,
}

impl UdpChannel {
    /// Bind the socket on `port` (0 for an ephemeral test port).
    pub async fn bind(network: NetworkId, port: u16) -> io::Result<Arc<Self>> {
        let socket = UdpSocket::bind(("::", port)).await?;
        Ok(Arc::new(Self {
            socket: Arc::new(socket),
            network,
            parser: MessageParser::new(network),
            on: AtomicBool::new(true),
            stats: NetworkStats::default(),
        }))
    }

    /// The locally bound endpoint.
    pub fn local_endpoint(&self) -> io::Result<Endpoint> {
        Ok(Endpoint::from_socket_addr(self.socket.local_addr()?))
    }

    pub fn network(&self) -> NetworkId {
        self.network
    }

    /// Serialize and send asynchronously. Errors are counted, not raised.
    pub fn send(self: &Arc<Self>, message: &Message, target: Endpoint) {
        if !self.on.load(Ordering::SeqCst) {
            return;
        }
        let counter = match message {
            Message::Keepalive(_) => &self.stats.outgoing.keepalive,
            Message::Publish(_) => &self.stats.outgoing.publish,
            Message::ConfirmReq(_) => &self.stats.outgoing.confirm_req,
            Message::ConfirmAck(_) => &self.stats.outgoing.confirm_ack,
        };
        NetworkStats::bump(counter);
        let bytes = message.serialize(self.network);
        let channel = self.clone();
        tokio::spawn(async move {
            if let Err(error) = channel.socket.send_to(&bytes, channel_target(target)).await {
                NetworkStats::bump(&channel.stats.send_error);
                debug!(%target, %error, "udp send failed");
            }
        });
    }

    /// Run the receive loop until `stop`. Reserved senders and unparsable
    /// datagrams are counted and dropped; everything else goes to `handler`.
    pub async fn run(self: Arc<Self>, handler: Arc<dyn InboundHandler>) {
        let mut buffer = [0u8; BUFFER_SIZE];
        while self.on.load(Ordering::SeqCst) {
            let (size, sender) = match self.socket.recv_from(&mut buffer).await {
                Ok(received) => received,
                Err(error) => {
                    if self.on.load(Ordering::SeqCst) {
                        debug!(%error, "udp receive error");
                        continue;
                    }
                    break;
                }
            };
            let sender = Endpoint::from_socket_addr(sender);
            if reserved_address(&sender, self.network) {
                NetworkStats::bump(&self.stats.bad_sender);
                debug!(%sender, "reserved sender");
                continue;
            }
            match self.parser.parse(&buffer[..size]) {
                Ok(message) => {
                    let counter = match &message {
                        Message::Keepalive(_) => &self.stats.incoming.keepalive,
                        Message::Publish(_) => &self.stats.incoming.publish,
                        Message::ConfirmReq(_) => &self.stats.incoming.confirm_req,
                        Message::ConfirmAck(_) => &self.stats.incoming.confirm_ack,
                    };
                    NetworkStats::bump(counter);
                    handler.receive(message, sender);
                }
                Err(ParseError::InsufficientWork) => {
                    NetworkStats::bump(&self.stats.insufficient_work);
                    debug!(%sender, "insufficient work in message");
                }
                Err(error) => {
                    NetworkStats::bump(&self.stats.parse_error);
                    debug!(%sender, %error, "dropped unparsable datagram");
                }
            }
        }
    }

    /// Idempotent: stops the receive loop and suppresses further sends.
    pub fn stop(&self) {
        self.on.store(false, Ordering::SeqCst);
        // Unblock a pending receive with an empty datagram to ourselves.
        if let Ok(endpoint) = self.local_endpoint() {
            let port = endpoint.port();
            let socket = self.socket.clone();
            tokio::spawn(async move {
                let _ = socket.send_to(&[], ("::1", port)).await;
            });
        }
    }
}

fn channel_target(endpoint: Endpoint) -> std::net::SocketAddr {
    endpoint.to_socket_addr()
}
