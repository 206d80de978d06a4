//! Datagram parsing.
//!
//! The parser is the first gate on inbound traffic: it rejects datagrams
//! with the wrong network magic, unknown or TCP-only message types,
//! malformed payloads, and blocks whose proof-of-work misses the network
//! threshold. Callers count rejections and drop the datagram silently.

use raze_ledger::{Block, Vote};
use raze_types::{Endpoint, NetworkId};
use thiserror::Error;

use crate::header::{MessageHeader, MessageType, HEADER_SIZE};
use crate::message::{Message, KEEPALIVE_PEERS};

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("datagram magic does not match this network")]
    BadMagic,

    #[error("unknown message type {0}")]
    UnknownMessageType(u8),

    #[error("message type is TCP-only")]
    TcpOnly,

    #[error("datagram shorter than its layout")]
    Truncated,

    #[error("malformed payload")]
    Malformed,

    #[error("block proof-of-work below threshold")]
    InsufficientWork,
}

/// Stateless parser bound to one network's magic and work threshold.
#[derive(Clone, Copy)]
pub struct MessageParser {
    network: NetworkId,
}

impl MessageParser {
    pub fn new(network: NetworkId) -> Self {
        Self { network }
    }

    /// Parse one datagram. The work check applies to any contained block.
    pub fn parse(&self, bytes: &[u8]) -> Result<Message, ParseError> {
        let header = MessageHeader::deserialize(self.network, bytes)?;
        if header.message_type.tcp_only() {
            return Err(ParseError::TcpOnly);
        }
        let payload = &bytes[HEADER_SIZE..];
        let message = match header.message_type {
            MessageType::Keepalive => Self::parse_keepalive(payload)?,
            MessageType::Publish => {
                let (block, consumed) = Block::deserialize(header.block_type, payload)
                    .map_err(|_| ParseError::Malformed)?;
                if consumed != payload.len() {
                    return Err(ParseError::Malformed);
                }
                Message::Publish(block)
            }
            MessageType::ConfirmReq => {
                let (block, consumed) = Block::deserialize(header.block_type, payload)
                    .map_err(|_| ParseError::Malformed)?;
                if consumed != payload.len() {
                    return Err(ParseError::Malformed);
                }
                Message::ConfirmReq(block)
            }
            MessageType::ConfirmAck => {
                let (vote, consumed) = Vote::deserialize(header.block_type, payload)
                    .map_err(|_| ParseError::Malformed)?;
                if consumed != payload.len() {
                    return Err(ParseError::Malformed);
                }
                Message::ConfirmAck(vote)
            }
            MessageType::Invalid | MessageType::NotAType => {
                return Err(ParseError::UnknownMessageType(
                    header.message_type.to_wire(),
                ))
            }
            MessageType::BulkPull | MessageType::BulkPush | MessageType::FrontierReq => {
                unreachable!("tcp_only checked above")
            }
        };
        if let Some(block) = message.contained_block() {
            if !raze_work::work_validate(&block.root(), block.work(), self.network.work_threshold())
            {
                return Err(ParseError::InsufficientWork);
            }
        }
        Ok(message)
    }

    fn parse_keepalive(payload: &[u8]) -> Result<Message, ParseError> {
        const SLOT: usize = 18;
        if payload.len() != KEEPALIVE_PEERS * SLOT {
            return Err(ParseError::Truncated);
        }
        let mut peers = [Endpoint::UNSPECIFIED; KEEPALIVE_PEERS];
        for (index, slot) in peers.iter_mut().enumerate() {
            let mut bytes = [0u8; SLOT];
            bytes.copy_from_slice(&payload[index * SLOT..(index + 1) * SLOT]);
            *slot = Endpoint::from_wire(&bytes);
        }
        Ok(Message::Keepalive(peers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raze_crypto::keypair_from_seed;
    use raze_ledger::{BlockType, SendBlock};
    use raze_types::{Account, Amount, BlockHash};

    fn parser() -> MessageParser {
        MessageParser::new(NetworkId::Test)
    }

    fn mined_block() -> Block {
        let kp = keypair_from_seed(&[1u8; 32]);
        let mut block = Block::Send(SendBlock::new(
            BlockHash::new([3u8; 32]),
            Account::new([4u8; 32]),
            Amount::new(1000),
            &kp.private,
            0,
        ));
        let threshold = NetworkId::Test.work_threshold();
        let mut nonce = 0u64;
        while !raze_work::work_validate(&block.root(), nonce, threshold) {
            nonce += 1;
        }
        block.set_work(nonce);
        block
    }

    #[test]
    fn keepalive_roundtrip() {
        let mut peers = [Endpoint::UNSPECIFIED; KEEPALIVE_PEERS];
        peers[0] = "[::ffff:10.0.0.1]:54000".parse().unwrap();
        peers[1] = "[2001:db8::2]:54000".parse().unwrap();
        let bytes = Message::Keepalive(peers).serialize(NetworkId::Test);
        match parser().parse(&bytes).unwrap() {
            Message::Keepalive(decoded) => assert_eq!(decoded, peers),
            other => panic!("expected keepalive, got {other:?}"),
        }
    }

    #[test]
    fn publish_roundtrip_with_valid_work() {
        let block = mined_block();
        let bytes = Message::Publish(block.clone()).serialize(NetworkId::Test);
        match parser().parse(&bytes).unwrap() {
            Message::Publish(decoded) => assert_eq!(decoded.hash(), block.hash()),
            other => panic!("expected publish, got {other:?}"),
        }
    }

    #[test]
    fn confirm_req_roundtrip() {
        let block = mined_block();
        let bytes = Message::ConfirmReq(block.clone()).serialize(NetworkId::Test);
        match parser().parse(&bytes).unwrap() {
            Message::ConfirmReq(decoded) => assert_eq!(decoded.hash(), block.hash()),
            other => panic!("expected confirm_req, got {other:?}"),
        }
    }

    #[test]
    fn confirm_ack_roundtrip() {
        let kp = keypair_from_seed(&[5u8; 32]);
        let vote = Vote::new(Account::new(kp.public.0), &kp.private, 3, mined_block());
        let bytes = Message::ConfirmAck(vote.clone()).serialize(NetworkId::Test);
        match parser().parse(&bytes).unwrap() {
            Message::ConfirmAck(decoded) => {
                assert_eq!(decoded.sequence, 3);
                assert_eq!(decoded.account, vote.account);
            }
            other => panic!("expected confirm_ack, got {other:?}"),
        }
    }

    #[test]
    fn insufficient_work_rejected() {
        let kp = keypair_from_seed(&[1u8; 32]);
        // Live-network threshold is unreachable for an unmined block.
        let block = Block::Send(SendBlock::new(
            BlockHash::new([3u8; 32]),
            Account::new([4u8; 32]),
            Amount::new(1000),
            &kp.private,
            0,
        ));
        let live = MessageParser::new(NetworkId::Live);
        let bytes = Message::Publish(block).serialize(NetworkId::Live);
        assert_eq!(live.parse(&bytes), Err(ParseError::InsufficientWork));
    }

    #[test]
    fn keepalive_needs_no_work() {
        let peers = [Endpoint::UNSPECIFIED; KEEPALIVE_PEERS];
        let bytes = Message::Keepalive(peers).serialize(NetworkId::Live);
        assert!(MessageParser::new(NetworkId::Live).parse(&bytes).is_ok());
    }

    #[test]
    fn wrong_magic_rejected() {
        let peers = [Endpoint::UNSPECIFIED; KEEPALIVE_PEERS];
        let bytes = Message::Keepalive(peers).serialize(NetworkId::Live);
        assert_eq!(parser().parse(&bytes), Err(ParseError::BadMagic));
    }

    #[test]
    fn tcp_only_types_rejected() {
        let mut bytes = Vec::new();
        MessageHeader::new(NetworkId::Test, MessageType::BulkPull, BlockType::NotABlock)
            .serialize(&mut bytes);
        assert_eq!(parser().parse(&bytes), Err(ParseError::TcpOnly));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let block = mined_block();
        let mut bytes = Message::Publish(block).serialize(NetworkId::Test);
        bytes.push(0);
        assert_eq!(parser().parse(&bytes), Err(ParseError::Malformed));
    }

    #[test]
    fn truncated_keepalive_rejected() {
        let peers = [Endpoint::UNSPECIFIED; KEEPALIVE_PEERS];
        let bytes = Message::Keepalive(peers).serialize(NetworkId::Test);
        assert_eq!(
            parser().parse(&bytes[..bytes.len() - 1]),
            Err(ParseError::Truncated)
        );
    }

    #[test]
    fn empty_datagram_rejected() {
        assert_eq!(parser().parse(&[]), Err(ParseError::Truncated));
    }
}
