//! The 9-byte wire header.

use raze_ledger::BlockType;
use raze_types::NetworkId;

use crate::parser::ParseError;

/// Header size on the wire: magic(2) + versions(3) + type(1) +
/// extensions(2) + block_type(1).
pub const HEADER_SIZE: usize = 9;

/// Protocol version this node speaks.
pub const PROTOCOL_VERSION: u8 = 1;

/// Message kind codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageType {
    Invalid,
    NotAType,
    Keepalive,
    Publish,
    ConfirmReq,
    ConfirmAck,
    /// TCP bootstrap only; rejected on the UDP socket.
    BulkPull,
    /// TCP bootstrap only; rejected on the UDP socket.
    BulkPush,
    /// TCP bootstrap only; rejected on the UDP socket.
    FrontierReq,
}

impl MessageType {
    pub fn to_wire(self) -> u8 {
        match self {
            Self::Invalid => 0,
            Self::NotAType => 1,
            Self::Keepalive => 2,
            Self::Publish => 3,
            Self::ConfirmReq => 4,
            Self::ConfirmAck => 5,
            Self::BulkPull => 6,
            Self::BulkPush => 7,
            Self::FrontierReq => 8,
        }
    }

    pub fn from_wire(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Invalid),
            1 => Some(Self::NotAType),
            2 => Some(Self::Keepalive),
            3 => Some(Self::Publish),
            4 => Some(Self::ConfirmReq),
            5 => Some(Self::ConfirmAck),
            6 => Some(Self::BulkPull),
            7 => Some(Self::BulkPush),
            8 => Some(Self::FrontierReq),
            _ => None,
        }
    }

    /// Whether this kind is only valid on the TCP bootstrap channel.
    pub fn tcp_only(self) -> bool {
        matches!(self, Self::BulkPull | Self::BulkPush | Self::FrontierReq)
    }
}

/// Parsed wire header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageHeader {
    pub magic: [u8; 2],
    pub version_max: u8,
    pub version_using: u8,
    pub version_min: u8,
    pub message_type: MessageType,
    pub extensions: u16,
    pub block_type: BlockType,
}

impl MessageHeader {
    pub fn new(network: NetworkId, message_type: MessageType, block_type: BlockType) -> Self {
        Self {
            magic: network.magic(),
            version_max: PROTOCOL_VERSION,
            version_using: PROTOCOL_VERSION,
            version_min: PROTOCOL_VERSION,
            message_type,
            extensions: 0,
            block_type,
        }
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.magic);
        out.push(self.version_max);
        out.push(self.version_using);
        out.push(self.version_min);
        out.push(self.message_type.to_wire());
        out.extend_from_slice(&self.extensions.to_le_bytes());
        out.push(self.block_type.to_wire());
    }

    /// Decode a header, checking the magic against `network`.
    pub fn deserialize(network: NetworkId, bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ParseError::Truncated);
        }
        let magic = [bytes[0], bytes[1]];
        if magic != network.magic() {
            return Err(ParseError::BadMagic);
        }
        let message_type =
            MessageType::from_wire(bytes[5]).ok_or(ParseError::UnknownMessageType(bytes[5]))?;
        let block_type = BlockType::from_wire(bytes[8]).map_err(|_| ParseError::Malformed)?;
        Ok(Self {
            magic,
            version_max: bytes[2],
            version_using: bytes[3],
            version_min: bytes[4],
            message_type,
            extensions: u16::from_le_bytes([bytes[6], bytes[7]]),
            block_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let header = MessageHeader::new(NetworkId::Test, MessageType::Publish, BlockType::Send);
        let mut bytes = Vec::new();
        header.serialize(&mut bytes);
        assert_eq!(bytes.len(), HEADER_SIZE);
        let decoded = MessageHeader::deserialize(NetworkId::Test, &bytes).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn wrong_network_magic_rejected() {
        let header = MessageHeader::new(NetworkId::Live, MessageType::Keepalive, BlockType::NotABlock);
        let mut bytes = Vec::new();
        header.serialize(&mut bytes);
        assert!(matches!(
            MessageHeader::deserialize(NetworkId::Test, &bytes),
            Err(ParseError::BadMagic)
        ));
    }

    #[test]
    fn short_buffer_rejected() {
        assert!(matches!(
            MessageHeader::deserialize(NetworkId::Test, &[0u8; 4]),
            Err(ParseError::Truncated)
        ));
    }

    #[test]
    fn unknown_type_code_rejected() {
        let mut bytes = Vec::new();
        MessageHeader::new(NetworkId::Test, MessageType::Keepalive, BlockType::NotABlock)
            .serialize(&mut bytes);
        bytes[5] = 0x7F;
        assert!(matches!(
            MessageHeader::deserialize(NetworkId::Test, &bytes),
            Err(ParseError::UnknownMessageType(0x7F))
        ));
    }

    #[test]
    fn tcp_only_kinds() {
        assert!(MessageType::BulkPull.tcp_only());
        assert!(MessageType::BulkPush.tcp_only());
        assert!(MessageType::FrontierReq.tcp_only());
        assert!(!MessageType::ConfirmAck.tcp_only());
    }
}
