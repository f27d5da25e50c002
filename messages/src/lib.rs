//! Network message types for Chratos node-to-node communication.
//!
//! Every datagram starts with a fixed 8-byte header:
//!
//! ```text
//! magic (2) | version_max (1) | version_using (1) | version_min (1)
//!           | kind (1) | extensions (2, LE)
//! ```
//!
//! Bodies are bincode-encoded. Parse failures are typed per message kind so
//! the receive loop can count them individually and keep running.

use chratos_ledger::{validate_work, Block, Vote};
use chratos_types::{Account, Endpoint, Signature};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Magic prefix on every datagram ("Chratos Live").
pub const MAGIC: [u8; 2] = *b"CL";
/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 0x0C;
/// Oldest version we still talk to.
pub const PROTOCOL_VERSION_MIN: u8 = 0x07;
/// First version that performs the node-id handshake.
pub const NODE_ID_VERSION: u8 = 0x0C;
/// Number of endpoints a keepalive always carries.
pub const KEEPALIVE_PEERS: usize = 8;
/// Fixed header length in bytes.
pub const HEADER_LEN: usize = 8;

/// Message kind discriminants as they appear on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    Invalid = 0,
    NotAType = 1,
    Keepalive = 2,
    Publish = 3,
    ConfirmReq = 4,
    ConfirmAck = 5,
    BulkPull = 6,
    BulkPush = 7,
    FrontierReq = 8,
    BulkPullBlocks = 9,
    NodeIdHandshake = 10,
    BulkPullAccount = 11,
}

impl MessageKind {
    pub fn from_wire(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::Invalid,
            1 => Self::NotAType,
            2 => Self::Keepalive,
            3 => Self::Publish,
            4 => Self::ConfirmReq,
            5 => Self::ConfirmAck,
            6 => Self::BulkPull,
            7 => Self::BulkPush,
            8 => Self::FrontierReq,
            9 => Self::BulkPullBlocks,
            10 => Self::NodeIdHandshake,
            11 => Self::BulkPullAccount,
            _ => return None,
        })
    }

    /// Kinds that are only meaningful on the TCP bootstrap channel.
    pub fn is_tcp_only(&self) -> bool {
        matches!(
            self,
            Self::BulkPull
                | Self::BulkPush
                | Self::FrontierReq
                | Self::BulkPullBlocks
                | Self::BulkPullAccount
        )
    }
}

/// The fixed per-datagram header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageHeader {
    pub version_max: u8,
    pub version_using: u8,
    pub version_min: u8,
    pub kind: MessageKind,
    pub extensions: u16,
}

impl MessageHeader {
    pub fn new(kind: MessageKind) -> Self {
        Self {
            version_max: PROTOCOL_VERSION,
            version_using: PROTOCOL_VERSION,
            version_min: PROTOCOL_VERSION_MIN,
            kind,
            extensions: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let ext = self.extensions.to_le_bytes();
        [
            MAGIC[0],
            MAGIC[1],
            self.version_max,
            self.version_using,
            self.version_min,
            self.kind as u8,
            ext[0],
            ext[1],
        ]
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < HEADER_LEN {
            return Err(ParseError::InvalidHeader);
        }
        if bytes[0..2] != MAGIC {
            return Err(ParseError::BadMagic);
        }
        let kind = MessageKind::from_wire(bytes[5]).ok_or(ParseError::UnknownKind(bytes[5]))?;
        Ok(Self {
            version_max: bytes[2],
            version_using: bytes[3],
            version_min: bytes[4],
            kind,
            extensions: u16::from_le_bytes([bytes[6], bytes[7]]),
        })
    }
}

/// Node-id handshake payload: a cookie challenge, a signed response, or both.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakePayload {
    /// A cookie this node wants the peer to sign.
    pub query: Option<[u8; 32]>,
    /// The peer's (node id, signature-over-our-cookie) response.
    pub response: Option<(Account, Signature)>,
}

/// A parsed message body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Gossip: exactly 8 peer endpoints (unspecified entries pad short lists).
    Keepalive([Endpoint; KEEPALIVE_PEERS]),
    Publish(Block),
    ConfirmReq(Block),
    ConfirmAck(Vote),
    NodeIdHandshake(HandshakePayload),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Keepalive(_) => MessageKind::Keepalive,
            Message::Publish(_) => MessageKind::Publish,
            Message::ConfirmReq(_) => MessageKind::ConfirmReq,
            Message::ConfirmAck(_) => MessageKind::ConfirmAck,
            Message::NodeIdHandshake(_) => MessageKind::NodeIdHandshake,
        }
    }

    /// Serialize header + body into a datagram.
    pub fn to_datagram(&self) -> Vec<u8> {
        let header = MessageHeader::new(self.kind());
        let mut buffer = header.to_bytes().to_vec();
        let body = bincode::serialize(self).expect("message bodies are always serializable");
        buffer.extend_from_slice(&body);
        buffer
    }

    /// Parse a datagram: header validation, kind dispatch, body decode, and
    /// proof-of-work screening for block-bearing messages.
    pub fn from_datagram(buffer: &[u8], work_threshold: u64) -> Result<(MessageHeader, Self), ParseError> {
        let header = MessageHeader::from_bytes(buffer)?;
        if header.kind.is_tcp_only() {
            return Err(ParseError::TcpOnlyKind(header.kind));
        }
        if matches!(header.kind, MessageKind::Invalid | MessageKind::NotAType) {
            return Err(ParseError::UnknownKind(header.kind as u8));
        }
        let body = &buffer[HEADER_LEN..];
        let message: Message = bincode::deserialize(body).map_err(|_| match header.kind {
            MessageKind::Keepalive => ParseError::InvalidKeepalive,
            MessageKind::Publish => ParseError::InvalidPublish,
            MessageKind::ConfirmReq => ParseError::InvalidConfirmReq,
            MessageKind::ConfirmAck => ParseError::InvalidConfirmAck,
            MessageKind::NodeIdHandshake => ParseError::InvalidNodeIdHandshake,
            _ => ParseError::InvalidHeader,
        })?;
        if message.kind() != header.kind {
            return Err(ParseError::KindMismatch);
        }
        match &message {
            Message::Publish(block) | Message::ConfirmReq(block) => {
                if !validate_work(&block.root(), block.work(), work_threshold) {
                    return Err(ParseError::InsufficientWork);
                }
            }
            Message::ConfirmAck(vote) => {
                for block in vote.blocks.iter().filter_map(|b| b.as_block()) {
                    if !validate_work(&block.root(), block.work(), work_threshold) {
                        return Err(ParseError::InsufficientWork);
                    }
                }
            }
            _ => {}
        }
        Ok((header, message))
    }
}

/// Typed parse failures, one per countable error class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("datagram shorter than the fixed header")]
    InvalidHeader,
    #[error("bad magic")]
    BadMagic,
    #[error("unknown message kind {0}")]
    UnknownKind(u8),
    #[error("message kind {0:?} is not valid on UDP")]
    TcpOnlyKind(MessageKind),
    #[error("header kind does not match body")]
    KindMismatch,
    #[error("malformed keepalive")]
    InvalidKeepalive,
    #[error("malformed publish")]
    InvalidPublish,
    #[error("malformed confirm_req")]
    InvalidConfirmReq,
    #[error("malformed confirm_ack")]
    InvalidConfirmAck,
    #[error("malformed node_id_handshake")]
    InvalidNodeIdHandshake,
    #[error("insufficient work")]
    InsufficientWork,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chratos_ledger::{generate_work, BlockOrHash, StateBlock, DEV_WORK_THRESHOLD};
    use chratos_types::{Amount, BlockHash};

    fn sample_block(with_work: bool) -> Block {
        let mut block = Block::State(StateBlock {
            account: Account::new([1; 32]),
            previous: BlockHash::new([2; 32]),
            representative: Account::new([3; 32]),
            balance: Amount::new(500),
            link: BlockHash::new([4; 32]),
            dividend: BlockHash::ZERO,
            work: 0,
            signature: Signature([0xFF; 64]),
            hash: BlockHash::ZERO,
        });
        block.compute_hash();
        if with_work {
            let work = generate_work(&block.root(), DEV_WORK_THRESHOLD);
            if let Block::State(ref mut inner) = block {
                inner.work = work;
            }
        }
        block
    }

    fn sample_vote() -> Vote {
        let kp = chratos_crypto::keypair_from_seed(&[9u8; 32]);
        Vote::new(
            Account::from(kp.public),
            &kp.private,
            1,
            vec![BlockOrHash::Hash(BlockHash::new([0xAA; 32]))],
        )
    }

    #[test]
    fn header_roundtrip() {
        let header = MessageHeader::new(MessageKind::Publish);
        let decoded = MessageHeader::from_bytes(&header.to_bytes()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn bad_magic_rejected() {
        let mut bytes = MessageHeader::new(MessageKind::Keepalive).to_bytes();
        bytes[0] = b'X';
        assert_eq!(MessageHeader::from_bytes(&bytes), Err(ParseError::BadMagic));
    }

    #[test]
    fn truncated_header_rejected() {
        assert_eq!(
            MessageHeader::from_bytes(&[b'C', b'L', 1]),
            Err(ParseError::InvalidHeader)
        );
    }

    #[test]
    fn unknown_kind_rejected() {
        let mut bytes = MessageHeader::new(MessageKind::Keepalive).to_bytes();
        bytes[5] = 42;
        assert_eq!(
            MessageHeader::from_bytes(&bytes),
            Err(ParseError::UnknownKind(42))
        );
    }

    #[test]
    fn keepalive_roundtrip() {
        let peers = [Endpoint::unspecified(); KEEPALIVE_PEERS];
        let message = Message::Keepalive(peers);
        let datagram = message.to_datagram();
        let (header, decoded) = Message::from_datagram(&datagram, DEV_WORK_THRESHOLD).unwrap();
        assert_eq!(header.kind, MessageKind::Keepalive);
        assert_eq!(decoded, message);
    }

    #[test]
    fn publish_roundtrip_with_valid_work() {
        let message = Message::Publish(sample_block(true));
        let datagram = message.to_datagram();
        let (_, decoded) = Message::from_datagram(&datagram, DEV_WORK_THRESHOLD).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn publish_without_work_rejected() {
        let message = Message::Publish(sample_block(false));
        let datagram = message.to_datagram();
        // An unattainable threshold guarantees the zero nonce fails.
        assert_eq!(
            Message::from_datagram(&datagram, u64::MAX),
            Err(ParseError::InsufficientWork)
        );
    }

    #[test]
    fn confirm_ack_roundtrip() {
        let message = Message::ConfirmAck(sample_vote());
        let datagram = message.to_datagram();
        let (header, decoded) = Message::from_datagram(&datagram, DEV_WORK_THRESHOLD).unwrap();
        assert_eq!(header.kind, MessageKind::ConfirmAck);
        assert_eq!(decoded, message);
    }

    #[test]
    fn handshake_roundtrip() {
        let message = Message::NodeIdHandshake(HandshakePayload {
            query: Some([0xCC; 32]),
            response: Some((Account::new([5; 32]), Signature([0xDD; 64]))),
        });
        let datagram = message.to_datagram();
        let (_, decoded) = Message::from_datagram(&datagram, DEV_WORK_THRESHOLD).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn tcp_only_kind_rejected() {
        let mut datagram = Message::Keepalive([Endpoint::unspecified(); KEEPALIVE_PEERS]).to_datagram();
        datagram[5] = MessageKind::BulkPull as u8;
        assert_eq!(
            Message::from_datagram(&datagram, DEV_WORK_THRESHOLD),
            Err(ParseError::TcpOnlyKind(MessageKind::BulkPull))
        );
    }

    #[test]
    fn garbage_body_rejected_per_kind() {
        let mut datagram = MessageHeader::new(MessageKind::ConfirmAck).to_bytes().to_vec();
        datagram.extend_from_slice(&[0xFF, 0xFE, 0xFD]);
        assert_eq!(
            Message::from_datagram(&datagram, DEV_WORK_THRESHOLD),
            Err(ParseError::InvalidConfirmAck)
        );
    }

    #[test]
    fn kind_mismatch_rejected() {
        let mut datagram = Message::Keepalive([Endpoint::unspecified(); KEEPALIVE_PEERS]).to_datagram();
        datagram[5] = MessageKind::NodeIdHandshake as u8;
        assert_eq!(
            Message::from_datagram(&datagram, DEV_WORK_THRESHOLD),
            Err(ParseError::KindMismatch)
        );
    }
}
