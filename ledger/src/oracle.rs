//! Collaborator contracts.
//!
//! The consensus core never validates ledger rules itself: it hands each
//! candidate block to a [`Ledger`] oracle and dispatches on the returned
//! [`ProcessOutcome`]. Storage, bootstrap, and wallet behaviour are likewise
//! trait-typed so the node can be wired against the real subsystems or the
//! deterministic stubs in [`crate::stub`].
//!
//! Transaction scoping is owned by the implementations: the block processor
//! is the only writer and bounds its write batches by duration, so the
//! oracle methods take `&self` and the implementation decides how to scope
//! its own read/write transactions.

use crate::block::Block;
use crate::vote::Vote;
use chratos_types::{Account, Amount, BlockHash, PrivateKey};

/// Outcome of offering one block to the ledger oracle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProcessOutcome {
    /// Block applied to the ledger.
    Progress,
    /// Block already present.
    Old,
    /// `previous` is unknown.
    GapPrevious,
    /// The linked source block is unknown.
    GapSource,
    BadSignature,
    NegativeSpend,
    Unreceivable,
    /// Another block already occupies this chain position.
    Fork,
    OpenedBurnAccount,
    BalanceMismatch,
    RepresentativeMismatch,
    BlockPosition,
    /// A dividend cannot be declared while pendings are outstanding.
    OutstandingPendings,
    DividendTooSmall,
    /// The account must claim the current dividend before this block.
    IncorrectDividend,
    /// Competing dividend declaration.
    DividendFork,
    InvalidDividendAccount,
}

/// The ledger oracle consumed by the block processor and elections engine.
pub trait Ledger: Send + Sync {
    /// Offer a block; the sole writer is the block processor worker.
    fn process(&self, block: &Block) -> ProcessOutcome;

    /// Voting weight delegated to a representative.
    fn weight(&self, representative: &Account) -> Amount;

    /// The block currently occupying `root`'s chain position, if any.
    fn successor(&self, root: &BlockHash) -> Option<Block>;

    /// The source block hash a receive-style block links to.
    fn block_source(&self, block: &Block) -> BlockHash;

    /// Undo a block (and its dependents) from the ledger.
    fn rollback(&self, hash: &BlockHash);

    /// Whether the block could be applied on top of the current ledger
    /// (its dependencies exist and its position is open).
    fn could_fit(&self, block: &Block) -> bool;

    /// The ledger's block occupying the same position as a fork candidate.
    fn forked_block(&self, block: &Block) -> Option<Block>;

    /// The amount transferred by the block with this hash.
    fn amount(&self, hash: &BlockHash) -> Amount;

    /// The account owning the block with this hash.
    fn account(&self, hash: &BlockHash) -> Option<Account>;

    /// Whether a state block is a send.
    fn is_send(&self, block: &Block) -> bool;

    fn block_exists(&self, hash: &BlockHash) -> bool;

    fn root_exists(&self, root: &BlockHash) -> bool;

    /// A random ledger block, used for representative crawling queries.
    fn random_block(&self) -> Option<Block>;
}

/// Transactional side-store: unchecked blocks keyed by missing dependency,
/// and the per-representative vote high-water marks.
pub trait Store: Send + Sync {
    /// Store a block under the dependency hash it is waiting for.
    fn unchecked_put(&self, dependency: BlockHash, block: &Block);

    /// All blocks waiting for `dependency`.
    fn unchecked_get(&self, dependency: &BlockHash) -> Vec<Block>;

    /// Remove one waiting block.
    fn unchecked_del(&self, dependency: &BlockHash, hash: &BlockHash);

    fn unchecked_count(&self) -> usize;

    /// Record `vote` if it advances the account's stored maximum and return
    /// the lex-greatest vote seen for the account (which may be `vote`).
    fn vote_max(&self, vote: &Vote) -> Vote;

    /// Produce the next vote for `account`, advancing its stored sequence.
    fn vote_generate(&self, account: Account, key: &PrivateKey, hashes: Vec<BlockHash>) -> Vote;
}

/// Bootstrap/pull-synchronization collaborator.
pub trait BootstrapInitiator: Send + Sync {
    /// Kick off a bootstrap run (idempotent while one is in progress).
    fn bootstrap(&self);

    fn in_progress(&self) -> bool;

    /// Ask the current attempt to re-pull an account chain, typically after
    /// fork resolution.
    fn requeue_pull(&self, account: Account, head: BlockHash);
}

/// Wallet collaborator: local representative keys and auto-receive hooks.
pub trait Wallets: Send + Sync {
    /// Invoke `action` for every representative key this node controls.
    fn foreach_representative(&self, action: &mut dyn FnMut(Account, &PrivateKey));

    /// Begin receiving a confirmed send into a local account.
    fn receive_async(&self, block: &Block, representative: Account, amount: Amount);

    /// Begin claiming a confirmed dividend for a local account.
    fn claim_dividend_async(&self, dividend: &Block, account: Account, representative: Account);
}
