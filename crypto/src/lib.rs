//! Cryptographic primitives for the Chratos protocol.
//!
//! - **Ed25519** for block, vote, and handshake signatures
//! - **Blake2b** for block hashes and vote digests
//! - Account address codec with `chr_` prefix, base32 encoding, and a
//!   Blake2b-5 checksum

pub mod address;
pub mod hash;
pub mod keys;
pub mod sign;

pub use address::{decode_address, encode_address, validate_address};
pub use hash::{blake2b_256, blake2b_256_multi};
pub use keys::{generate_keypair, keypair_from_seed, public_from_private};
pub use sign::{sign_message, verify_signature};
