//! Proof-of-work validation.
//!
//! The 64-bit work nonce is valid for a block when
//! `blake2b_64(nonce_le || root)` interpreted little-endian meets the
//! network threshold. Work is computed over the *root*, so a re-published
//! fork of the same position reuses the same nonce.

use blake2::digest::consts::U8;
use blake2::{Blake2b, Digest};
use chratos_types::BlockHash;

type Blake2b64 = Blake2b<U8>;

/// Live network threshold.
pub const WORK_THRESHOLD: u64 = 0xFFFF_FFC0_0000_0000;

/// Development/test threshold, cheap enough to brute-force in-process.
pub const DEV_WORK_THRESHOLD: u64 = 0xF000_0000_0000_0000;

/// The work value of a nonce against a root.
pub fn work_value(root: &BlockHash, work: u64) -> u64 {
    let mut hasher = Blake2b64::new();
    hasher.update(work.to_le_bytes());
    hasher.update(root.as_bytes());
    let digest = hasher.finalize();
    u64::from_le_bytes(digest.as_slice().try_into().expect("8-byte digest"))
}

/// Whether `work` meets `threshold` for `root`.
pub fn validate_work(root: &BlockHash, work: u64, threshold: u64) -> bool {
    work_value(root, work) >= threshold
}

/// Brute-force a nonce meeting `threshold`. Development and test use only;
/// production work generation is an external collaborator.
pub fn generate_work(root: &BlockHash, threshold: u64) -> u64 {
    let mut nonce: u64 = 0;
    loop {
        if validate_work(root, nonce, threshold) {
            return nonce;
        }
        nonce = nonce.wrapping_add(1);
    }
}
