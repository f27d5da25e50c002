//! Representative votes.
//!
//! A vote carries up to 12 items, each either a full block or a bare hash.
//! The signature covers `blake2b(sequence_le || hash_0 || … || hash_n)`;
//! sequence numbers are monotone per representative account.

use crate::block::Block;
use chratos_crypto::{blake2b_256, sign_message, verify_signature};
use chratos_types::{Account, BlockHash, PrivateKey, PublicKey, Signature};
use serde::{Deserialize, Serialize};

/// Maximum number of blocks or hashes a single vote may carry.
pub const MAX_VOTE_BLOCKS: usize = 12;

/// A vote element: either a full block or just its hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockOrHash {
    Block(Block),
    Hash(BlockHash),
}

impl BlockOrHash {
    pub fn hash(&self) -> BlockHash {
        match self {
            BlockOrHash::Block(block) => block.hash(),
            BlockOrHash::Hash(hash) => *hash,
        }
    }

    pub fn as_block(&self) -> Option<&Block> {
        match self {
            BlockOrHash::Block(block) => Some(block),
            BlockOrHash::Hash(_) => None,
        }
    }
}

/// A representative's vote on one or more blocks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub account: Account,
    pub sequence: u64,
    pub signature: Signature,
    pub blocks: Vec<BlockOrHash>,
}

impl Vote {
    /// Build and sign a vote over the given items.
    pub fn new(
        account: Account,
        private_key: &PrivateKey,
        sequence: u64,
        blocks: Vec<BlockOrHash>,
    ) -> Self {
        let mut vote = Self {
            account,
            sequence,
            signature: Signature::ZERO,
            blocks,
        };
        vote.signature = sign_message(&vote.digest(), private_key);
        vote
    }

    /// The digest the signature covers.
    pub fn digest(&self) -> [u8; 32] {
        let mut message = Vec::with_capacity(8 + self.blocks.len() * 32);
        message.extend_from_slice(&self.sequence.to_le_bytes());
        for item in &self.blocks {
            message.extend_from_slice(item.hash().as_bytes());
        }
        blake2b_256(&message)
    }

    /// Verify the signature against the voting account.
    pub fn validate(&self) -> bool {
        if self.blocks.is_empty() || self.blocks.len() > MAX_VOTE_BLOCKS {
            return false;
        }
        verify_signature(
            &self.digest(),
            &self.signature,
            &PublicKey::from(self.account),
        )
    }

    /// The hashes this vote covers, in order.
    pub fn hashes(&self) -> impl Iterator<Item = BlockHash> + '_ {
        self.blocks.iter().map(BlockOrHash::hash)
    }

    /// Comma-separated hash list for log lines.
    pub fn hashes_string(&self) -> String {
        self.hashes()
            .map(|h| h.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chratos_crypto::keypair_from_seed;

    fn make_vote(seed: u8, sequence: u64, hashes: &[u8]) -> Vote {
        let kp = keypair_from_seed(&[seed; 32]);
        let items = hashes
            .iter()
            .map(|&b| BlockOrHash::Hash(BlockHash::new([b; 32])))
            .collect();
        Vote::new(Account::from(kp.public), &kp.private, sequence, items)
    }

    #[test]
    fn signed_vote_validates() {
        let vote = make_vote(1, 7, &[0xAA]);
        assert!(vote.validate());
    }

    #[test]
    fn tampered_sequence_fails_validation() {
        let mut vote = make_vote(1, 7, &[0xAA]);
        vote.sequence = 8;
        assert!(!vote.validate());
    }

    #[test]
    fn tampered_hash_fails_validation() {
        let mut vote = make_vote(1, 7, &[0xAA]);
        vote.blocks[0] = BlockOrHash::Hash(BlockHash::new([0xBB; 32]));
        assert!(!vote.validate());
    }

    #[test]
    fn wrong_account_fails_validation() {
        let mut vote = make_vote(1, 7, &[0xAA]);
        let other = keypair_from_seed(&[2; 32]);
        vote.account = Account::from(other.public);
        assert!(!vote.validate());
    }

    #[test]
    fn empty_vote_is_invalid() {
        let kp = keypair_from_seed(&[3; 32]);
        let vote = Vote::new(Account::from(kp.public), &kp.private, 1, Vec::new());
        assert!(!vote.validate());
    }

    #[test]
    fn oversized_vote_is_invalid() {
        let hashes: Vec<u8> = (0..13).collect();
        let vote = make_vote(4, 1, &hashes);
        assert!(!vote.validate());
    }

    #[test]
    fn hashes_preserve_order() {
        let vote = make_vote(5, 1, &[1, 2, 3]);
        let hashes: Vec<BlockHash> = vote.hashes().collect();
        assert_eq!(hashes[0], BlockHash::new([1; 32]));
        assert_eq!(hashes[2], BlockHash::new([3; 32]));
    }

    #[test]
    fn digest_depends_on_sequence() {
        let a = make_vote(6, 1, &[9]);
        let b = make_vote(6, 2, &[9]);
        assert_ne!(a.digest(), b.digest());
    }
}
