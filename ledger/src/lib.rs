//! Ledger-facing types for the Chratos consensus core.
//!
//! This crate holds everything the consensus and propagation subsystems need
//! to talk about blocks without owning ledger validation itself:
//!
//! - [`block`] — the block sum type (`state` / `dividend` / `claim`) with
//!   per-variant hash, root, and dividend dispatch.
//! - [`vote`] — representative votes carrying up to 12 blocks or bare hashes.
//! - [`work`] — proof-of-work validation over a block's root.
//! - [`oracle`] — the `Ledger` process oracle and its outcome set, plus the
//!   store, bootstrap, and wallet collaborator traits.
//! - [`stub`] — deterministic, programmable collaborator implementations for
//!   tests.

pub mod block;
pub mod oracle;
pub mod stub;
pub mod vote;
pub mod work;

pub use block::{Block, ClaimBlock, DividendBlock, StateBlock};
pub use oracle::{BootstrapInitiator, Ledger, ProcessOutcome, Store, Wallets};
pub use stub::{MemoryStore, NullBootstrap, NullWallets, StubLedger};
pub use vote::{BlockOrHash, Vote, MAX_VOTE_BLOCKS};
pub use work::{generate_work, validate_work, work_value, DEV_WORK_THRESHOLD, WORK_THRESHOLD};
