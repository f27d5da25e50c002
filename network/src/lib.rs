//! Peer set, SYN-cookie handshake, and address screening for the Chratos
//! UDP overlay.

pub mod peer_set;
pub mod reserved;
pub mod syn_cookies;

pub use peer_set::{
    InsertResult, PeerInfo, PeerSet, MAX_LEGACY_PEERS, MAX_LEGACY_PEERS_PER_IP, MAX_PEERS_PER_IP,
};
pub use reserved::reserved_address;
pub use syn_cookies::SynCookieTable;
