//! The message kinds carried over UDP.

use raze_ledger::{Block, BlockType, Vote};
use raze_types::{Endpoint, NetworkId};

use crate::header::{MessageHeader, MessageType};

/// Endpoints carried in a keepalive payload.
pub const KEEPALIVE_PEERS: usize = 8;

/// A fully-formed wire message.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    /// Peer exchange: eight endpoints, unspecified slots padding the tail.
    Keepalive([Endpoint; KEEPALIVE_PEERS]),
    /// Flood a block.
    Publish(Block),
    /// Ask the receiver to vote on a block.
    ConfirmReq(Block),
    /// A representative's vote.
    ConfirmAck(Vote),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Keepalive(_) => MessageType::Keepalive,
            Self::Publish(_) => MessageType::Publish,
            Self::ConfirmReq(_) => MessageType::ConfirmReq,
            Self::ConfirmAck(_) => MessageType::ConfirmAck,
        }
    }

    fn block_type(&self) -> BlockType {
        match self {
            Self::Keepalive(_) => BlockType::NotABlock,
            Self::Publish(block) | Self::ConfirmReq(block) => block.block_type(),
            Self::ConfirmAck(vote) => vote.block.block_type(),
        }
    }

    /// The block whose proof-of-work gates relaying this message, if any.
    pub fn contained_block(&self) -> Option<&Block> {
        match self {
            Self::Keepalive(_) => None,
            Self::Publish(block) | Self::ConfirmReq(block) => Some(block),
            Self::ConfirmAck(vote) => Some(&vote.block),
        }
    }

    /// Serialize header + payload for `network`.
    pub fn serialize(&self, network: NetworkId) -> Vec<u8> {
        let mut out = Vec::with_capacity(256);
        MessageHeader::new(network, self.message_type(), self.block_type()).serialize(&mut out);
        match self {
            Self::Keepalive(peers) => {
                for peer in peers {
                    out.extend_from_slice(&peer.to_wire());
                }
            }
            Self::Publish(block) | Self::ConfirmReq(block) => block.serialize(&mut out),
            Self::ConfirmAck(vote) => vote.serialize(&mut out),
        }
        out
    }
}
