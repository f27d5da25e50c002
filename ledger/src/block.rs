//! Block variants.
//!
//! Blocks are polymorphic over {state, dividend, claim}, expressed as a
//! tagged sum with per-variant dispatch for hash, root, previous, and
//! dividend. Only the ledger oracle branches on full variant behaviour;
//! everything else in the core goes through the accessors here.
//!
//! Blocks are content-addressed: the hash is Blake2b-256 over the canonical
//! encoding (variant tag plus fixed-width fields, work and signature
//! excluded). The hash is cached in the struct and recomputed with
//! [`Block::compute_hash`] after field edits in tests.

use chratos_crypto::blake2b_256_multi;
use chratos_types::{Account, Amount, BlockHash, Signature};
use serde::{Deserialize, Serialize};

/// A state block: the general account-chain transition (send, receive,
/// open, change representative) in one shape.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateBlock {
    pub account: Account,
    pub previous: BlockHash,
    pub representative: Account,
    pub balance: Amount,
    /// Destination account or source block, depending on direction.
    pub link: BlockHash,
    /// The dividend epoch this block was created under.
    pub dividend: BlockHash,
    pub work: u64,
    pub signature: Signature,
    pub hash: BlockHash,
}

/// A dividend block: declares a distribution on the issuing account's chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DividendBlock {
    pub account: Account,
    pub previous: BlockHash,
    pub representative: Account,
    pub balance: Amount,
    /// The preceding dividend block (chain of dividend epochs).
    pub dividend: BlockHash,
    pub work: u64,
    pub signature: Signature,
    pub hash: BlockHash,
}

/// A claim block: an account claiming its share of a declared dividend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimBlock {
    pub account: Account,
    pub previous: BlockHash,
    pub representative: Account,
    pub balance: Amount,
    /// The dividend block being claimed.
    pub dividend: BlockHash,
    pub work: u64,
    pub signature: Signature,
    pub hash: BlockHash,
}

/// The block sum type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Block {
    State(StateBlock),
    Dividend(DividendBlock),
    Claim(ClaimBlock),
}

impl StateBlock {
    pub fn compute_hash(&self) -> BlockHash {
        BlockHash::new(blake2b_256_multi(&[
            &[0x01],
            self.account.as_bytes(),
            self.previous.as_bytes(),
            self.representative.as_bytes(),
            &self.balance.raw().to_be_bytes(),
            self.link.as_bytes(),
            self.dividend.as_bytes(),
        ]))
    }
}

impl DividendBlock {
    pub fn compute_hash(&self) -> BlockHash {
        BlockHash::new(blake2b_256_multi(&[
            &[0x02],
            self.account.as_bytes(),
            self.previous.as_bytes(),
            self.representative.as_bytes(),
            &self.balance.raw().to_be_bytes(),
            self.dividend.as_bytes(),
        ]))
    }
}

impl ClaimBlock {
    pub fn compute_hash(&self) -> BlockHash {
        BlockHash::new(blake2b_256_multi(&[
            &[0x03],
            self.account.as_bytes(),
            self.previous.as_bytes(),
            self.representative.as_bytes(),
            &self.balance.raw().to_be_bytes(),
            self.dividend.as_bytes(),
        ]))
    }
}

impl Block {
    pub fn hash(&self) -> BlockHash {
        match self {
            Block::State(b) => b.hash,
            Block::Dividend(b) => b.hash,
            Block::Claim(b) => b.hash,
        }
    }

    /// Recompute and store the content hash. Call after editing fields.
    pub fn compute_hash(&mut self) {
        match self {
            Block::State(b) => b.hash = b.compute_hash(),
            Block::Dividend(b) => b.hash = b.compute_hash(),
            Block::Claim(b) => b.hash = b.compute_hash(),
        }
    }

    pub fn account(&self) -> Account {
        match self {
            Block::State(b) => b.account,
            Block::Dividend(b) => b.account,
            Block::Claim(b) => b.account,
        }
    }

    pub fn previous(&self) -> BlockHash {
        match self {
            Block::State(b) => b.previous,
            Block::Dividend(b) => b.previous,
            Block::Claim(b) => b.previous,
        }
    }

    /// The election root: `previous` if nonzero, otherwise the account.
    pub fn root(&self) -> BlockHash {
        let previous = self.previous();
        if previous.is_zero() {
            self.account().into_root()
        } else {
            previous
        }
    }

    pub fn representative(&self) -> Account {
        match self {
            Block::State(b) => b.representative,
            Block::Dividend(b) => b.representative,
            Block::Claim(b) => b.representative,
        }
    }

    pub fn balance(&self) -> Amount {
        match self {
            Block::State(b) => b.balance,
            Block::Dividend(b) => b.balance,
            Block::Claim(b) => b.balance,
        }
    }

    /// The dividend reference carried by every variant.
    pub fn dividend(&self) -> BlockHash {
        match self {
            Block::State(b) => b.dividend,
            Block::Dividend(b) => b.dividend,
            Block::Claim(b) => b.dividend,
        }
    }

    pub fn work(&self) -> u64 {
        match self {
            Block::State(b) => b.work,
            Block::Dividend(b) => b.work,
            Block::Claim(b) => b.work,
        }
    }

    pub fn signature(&self) -> Signature {
        match self {
            Block::State(b) => b.signature,
            Block::Dividend(b) => b.signature,
            Block::Claim(b) => b.signature,
        }
    }

    pub fn is_open(&self) -> bool {
        self.previous().is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_block(account: u8, previous: BlockHash) -> Block {
        let mut block = Block::State(StateBlock {
            account: Account::new([account; 32]),
            previous,
            representative: Account::new([0xEE; 32]),
            balance: Amount::new(1000),
            link: BlockHash::ZERO,
            dividend: BlockHash::ZERO,
            work: 0,
            signature: Signature::ZERO,
            hash: BlockHash::ZERO,
        });
        block.compute_hash();
        block
    }

    #[test]
    fn hash_is_content_addressed() {
        let a = state_block(1, BlockHash::ZERO);
        let b = state_block(1, BlockHash::ZERO);
        let c = state_block(2, BlockHash::ZERO);
        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn hash_excludes_work_and_signature() {
        let mut a = state_block(1, BlockHash::ZERO);
        let expected = a.hash();
        if let Block::State(ref mut inner) = a {
            inner.work = 0xDEADBEEF;
            inner.signature = Signature([0x77; 64]);
        }
        a.compute_hash();
        assert_eq!(a.hash(), expected);
    }

    #[test]
    fn root_of_open_block_is_account() {
        let open = state_block(5, BlockHash::ZERO);
        assert!(open.is_open());
        assert_eq!(open.root(), Account::new([5; 32]).into_root());
    }

    #[test]
    fn root_of_chained_block_is_previous() {
        let previous = BlockHash::new([9; 32]);
        let block = state_block(5, previous);
        assert!(!block.is_open());
        assert_eq!(block.root(), previous);
    }

    #[test]
    fn variants_hash_differently() {
        let account = Account::new([1; 32]);
        let mut dividend = Block::Dividend(DividendBlock {
            account,
            previous: BlockHash::new([2; 32]),
            representative: Account::new([3; 32]),
            balance: Amount::new(50),
            dividend: BlockHash::ZERO,
            work: 0,
            signature: Signature::ZERO,
            hash: BlockHash::ZERO,
        });
        dividend.compute_hash();
        let mut claim = Block::Claim(ClaimBlock {
            account,
            previous: BlockHash::new([2; 32]),
            representative: Account::new([3; 32]),
            balance: Amount::new(50),
            dividend: BlockHash::ZERO,
            work: 0,
            signature: Signature::ZERO,
            hash: BlockHash::ZERO,
        });
        claim.compute_hash();
        assert_ne!(dividend.hash(), claim.hash());
    }

    #[test]
    fn bincode_roundtrip() {
        let block = state_block(4, BlockHash::new([8; 32]));
        let bytes = bincode::serialize(&block).unwrap();
        let decoded: Block = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, block);
    }
}
