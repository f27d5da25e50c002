//! Deterministic collaborator implementations for tests.
//!
//! All external dependencies of the consensus core (ledger oracle, side
//! store, bootstrap, wallets) are abstracted behind traits. This module
//! provides programmable implementations that return configured values,
//! record every interaction, and never touch the filesystem or network.
//! Swap them in wherever a test needs to script collaborator behaviour.

use crate::block::Block;
use crate::oracle::{BootstrapInitiator, Ledger, ProcessOutcome, Store, Wallets};
use crate::vote::{BlockOrHash, Vote};
use chratos_crypto::keypair_from_seed;
use chratos_types::{Account, Amount, BlockHash, PrivateKey};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
struct StubLedgerState {
    /// Programmed outcome per block hash; `Progress` when absent.
    outcomes: HashMap<BlockHash, ProcessOutcome>,
    /// Every block the oracle has applied, by hash.
    blocks: HashMap<BlockHash, Block>,
    /// Root → applied block occupying that position.
    successors: HashMap<BlockHash, Block>,
    /// Programmed source hash per block hash.
    sources: HashMap<BlockHash, BlockHash>,
    /// Hashes whose `could_fit` is forced to false.
    unfit: HashMap<BlockHash, ()>,
    /// Rolled-back hashes, in order.
    rollbacks: Vec<BlockHash>,
    /// Number of `process` calls per block hash.
    process_calls: HashMap<BlockHash, usize>,
}

/// A programmable ledger oracle.
pub struct StubLedger {
    state: Mutex<StubLedgerState>,
    weights: Mutex<HashMap<Account, Amount>>,
}

impl Default for StubLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl StubLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StubLedgerState::default()),
            weights: Mutex::new(HashMap::new()),
        }
    }

    /// Program the outcome returned for a specific block hash.
    pub fn set_outcome(&self, hash: BlockHash, outcome: ProcessOutcome) {
        self.state.lock().unwrap().outcomes.insert(hash, outcome);
    }

    /// Set a representative's delegated weight.
    pub fn set_weight(&self, representative: Account, weight: Amount) {
        self.weights.lock().unwrap().insert(representative, weight);
    }

    /// Program the source hash reported for a block.
    pub fn set_source(&self, block: BlockHash, source: BlockHash) {
        self.state.lock().unwrap().sources.insert(block, source);
    }

    /// Force `could_fit` to false for a block hash.
    pub fn set_unfit(&self, hash: BlockHash) {
        self.state.lock().unwrap().unfit.insert(hash, ());
    }

    /// Pre-seed an applied block (and its successor slot) without a
    /// `process` call.
    pub fn insert_applied(&self, block: Block) {
        let mut state = self.state.lock().unwrap();
        state.successors.insert(block.root(), block.clone());
        state.blocks.insert(block.hash(), block);
    }

    /// How many times `process` has been invoked for a hash.
    pub fn process_calls(&self, hash: &BlockHash) -> usize {
        self.state
            .lock()
            .unwrap()
            .process_calls
            .get(hash)
            .copied()
            .unwrap_or(0)
    }

    /// Hashes rolled back, in order.
    pub fn rollbacks(&self) -> Vec<BlockHash> {
        self.state.lock().unwrap().rollbacks.clone()
    }
}

impl Ledger for StubLedger {
    fn process(&self, block: &Block) -> ProcessOutcome {
        let mut state = self.state.lock().unwrap();
        let hash = block.hash();
        *state.process_calls.entry(hash).or_insert(0) += 1;

        if state.blocks.contains_key(&hash) {
            return ProcessOutcome::Old;
        }
        let outcome = state
            .outcomes
            .get(&hash)
            .copied()
            .unwrap_or(ProcessOutcome::Progress);
        if outcome == ProcessOutcome::Progress {
            state.successors.insert(block.root(), block.clone());
            state.blocks.insert(hash, block.clone());
        }
        outcome
    }

    fn weight(&self, representative: &Account) -> Amount {
        self.weights
            .lock()
            .unwrap()
            .get(representative)
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    fn successor(&self, root: &BlockHash) -> Option<Block> {
        self.state.lock().unwrap().successors.get(root).cloned()
    }

    fn block_source(&self, block: &Block) -> BlockHash {
        self.state
            .lock()
            .unwrap()
            .sources
            .get(&block.hash())
            .copied()
            .unwrap_or(BlockHash::ZERO)
    }

    fn rollback(&self, hash: &BlockHash) {
        let mut state = self.state.lock().unwrap();
        if let Some(block) = state.blocks.remove(hash) {
            state.successors.remove(&block.root());
        }
        state.rollbacks.push(*hash);
    }

    fn could_fit(&self, block: &Block) -> bool {
        !self.state.lock().unwrap().unfit.contains_key(&block.hash())
    }

    fn forked_block(&self, block: &Block) -> Option<Block> {
        self.successor(&block.root())
    }

    fn amount(&self, hash: &BlockHash) -> Amount {
        self.state
            .lock()
            .unwrap()
            .blocks
            .get(hash)
            .map(|b| b.balance())
            .unwrap_or(Amount::ZERO)
    }

    fn account(&self, hash: &BlockHash) -> Option<Account> {
        self.state
            .lock()
            .unwrap()
            .blocks
            .get(hash)
            .map(|b| b.account())
    }

    fn is_send(&self, block: &Block) -> bool {
        matches!(block, Block::State(b) if !b.link.is_zero())
    }

    fn block_exists(&self, hash: &BlockHash) -> bool {
        self.state.lock().unwrap().blocks.contains_key(hash)
    }

    fn root_exists(&self, root: &BlockHash) -> bool {
        self.state.lock().unwrap().successors.contains_key(root)
    }

    fn random_block(&self) -> Option<Block> {
        self.state
            .lock()
            .unwrap()
            .blocks
            .values()
            .next()
            .cloned()
    }
}

/// In-memory side store: unchecked map plus vote high-water marks.
#[derive(Default)]
pub struct MemoryStore {
    unchecked: Mutex<HashMap<BlockHash, Vec<Block>>>,
    votes: Mutex<HashMap<Account, Vote>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn unchecked_put(&self, dependency: BlockHash, block: &Block) {
        let mut unchecked = self.unchecked.lock().unwrap();
        let entries = unchecked.entry(dependency).or_default();
        if entries.iter().all(|b| b.hash() != block.hash()) {
            entries.push(block.clone());
        }
    }

    fn unchecked_get(&self, dependency: &BlockHash) -> Vec<Block> {
        self.unchecked
            .lock()
            .unwrap()
            .get(dependency)
            .cloned()
            .unwrap_or_default()
    }

    fn unchecked_del(&self, dependency: &BlockHash, hash: &BlockHash) {
        let mut unchecked = self.unchecked.lock().unwrap();
        if let Some(entries) = unchecked.get_mut(dependency) {
            entries.retain(|b| b.hash() != *hash);
            if entries.is_empty() {
                unchecked.remove(dependency);
            }
        }
    }

    fn unchecked_count(&self) -> usize {
        self.unchecked.lock().unwrap().values().map(Vec::len).sum()
    }

    fn vote_max(&self, vote: &Vote) -> Vote {
        let mut votes = self.votes.lock().unwrap();
        match votes.get_mut(&vote.account) {
            Some(existing) if existing.sequence >= vote.sequence => existing.clone(),
            _ => {
                votes.insert(vote.account, vote.clone());
                vote.clone()
            }
        }
    }

    fn vote_generate(&self, account: Account, key: &PrivateKey, hashes: Vec<BlockHash>) -> Vote {
        let mut votes = self.votes.lock().unwrap();
        let sequence = votes.get(&account).map(|v| v.sequence + 1).unwrap_or(1);
        let vote = Vote::new(
            account,
            key,
            sequence,
            hashes.into_iter().map(BlockOrHash::Hash).collect(),
        );
        votes.insert(account, vote.clone());
        vote
    }
}

/// Bootstrap collaborator that records invocations.
#[derive(Default)]
pub struct NullBootstrap {
    in_progress: AtomicBool,
    bootstrap_calls: AtomicUsize,
    requeues: Mutex<Vec<(Account, BlockHash)>>,
}

impl NullBootstrap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_in_progress(&self, value: bool) {
        self.in_progress.store(value, Ordering::SeqCst);
    }

    pub fn bootstrap_calls(&self) -> usize {
        self.bootstrap_calls.load(Ordering::SeqCst)
    }

    pub fn requeues(&self) -> Vec<(Account, BlockHash)> {
        self.requeues.lock().unwrap().clone()
    }
}

impl BootstrapInitiator for NullBootstrap {
    fn bootstrap(&self) {
        self.bootstrap_calls.fetch_add(1, Ordering::SeqCst);
        self.in_progress.store(true, Ordering::SeqCst);
    }

    fn in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    fn requeue_pull(&self, account: Account, head: BlockHash) {
        self.requeues.lock().unwrap().push((account, head));
    }
}

/// Wallet collaborator holding deterministic representative keys.
#[derive(Default)]
pub struct NullWallets {
    rep_seeds: Vec<[u8; 32]>,
    received: Mutex<Vec<(BlockHash, Account, Amount)>>,
    claimed: Mutex<Vec<(BlockHash, Account)>>,
}

impl NullWallets {
    pub fn new() -> Self {
        Self::default()
    }

    /// A wallet controlling representative keys derived from `seeds`.
    pub fn with_representatives(seeds: Vec<[u8; 32]>) -> Self {
        Self {
            rep_seeds: seeds,
            ..Self::default()
        }
    }

    pub fn received(&self) -> Vec<(BlockHash, Account, Amount)> {
        self.received.lock().unwrap().clone()
    }

    pub fn claimed(&self) -> Vec<(BlockHash, Account)> {
        self.claimed.lock().unwrap().clone()
    }
}

impl Wallets for NullWallets {
    fn foreach_representative(&self, action: &mut dyn FnMut(Account, &PrivateKey)) {
        for seed in &self.rep_seeds {
            let kp = keypair_from_seed(seed);
            action(Account::from(kp.public), &kp.private);
        }
    }

    fn receive_async(&self, block: &Block, _representative: Account, amount: Amount) {
        self.received
            .lock()
            .unwrap()
            .push((block.hash(), block.account(), amount));
    }

    fn claim_dividend_async(&self, dividend: &Block, account: Account, _representative: Account) {
        self.claimed.lock().unwrap().push((dividend.hash(), account));
    }
}
