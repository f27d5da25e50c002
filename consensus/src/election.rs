//! Election state machine.
//!
//! An election tracks the competing blocks for one root, the latest vote
//! from each representative, and the running tally. Votes are admitted per
//! representative under a weight-banded cooldown so a single rep cannot
//! flood an election, and quorum requires the leading block to clear the
//! runner-up by the quorum delta.

use chratos_ledger::Block;
use chratos_types::{Account, Amount, BlockHash, Timestamp};
use std::collections::HashMap;

/// Maximum number of competing blocks one election will hold.
pub const MAX_ELECTION_BLOCKS: usize = 10;

/// The latest admitted vote from one representative.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VoteInfo {
    pub time: Timestamp,
    pub sequence: u64,
    pub hash: BlockHash,
}

/// Per-vote admission result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ElectionVoteResult {
    /// The (sequence, hash) pair did not advance past the stored vote.
    pub replay: bool,
    /// The vote was admitted and recorded. Republish gating depends on
    /// this, so it reflects the actual admission decision.
    pub processed: bool,
}

/// Snapshot of an election's result.
#[derive(Clone, Debug)]
pub struct ElectionStatus {
    pub winner: Block,
    pub tally: Amount,
}

/// Tally environment supplied by the caller on each vote.
pub struct TallyContext<'a> {
    /// Current online stake (quorum denominator).
    pub online_stake: Amount,
    /// Percentage (0–100) used for the quorum delta.
    pub quorum_percent: u8,
    /// Floor below which a tally cannot force a winner change.
    pub online_weight_minimum: Amount,
    /// Ledger weight lookup per representative.
    pub weight_of: &'a dyn Fn(&Account) -> Amount,
}

impl TallyContext<'_> {
    /// The margin by which the top tally must exceed the runner-up.
    pub fn quorum_delta(&self) -> Amount {
        Amount::new(self.online_stake.raw() / 100 * self.quorum_percent as u128)
    }
}

/// What a single admitted vote did to the election.
#[derive(Default)]
pub struct VoteOutcome {
    pub result: ElectionVoteResult,
    /// Set when this vote flipped the leading block; the new winner must be
    /// forced through the block processor.
    pub winner_changed: Option<Block>,
    /// Set exactly once, when quorum is first reached.
    pub confirmed: Option<ElectionStatus>,
}

/// A single consensus election for one root.
pub struct Election {
    pub root: BlockHash,
    /// Current winner and its tally at the last evaluation.
    pub status: ElectionStatus,
    /// Competing blocks by hash, capped at [`MAX_ELECTION_BLOCKS`].
    pub blocks: HashMap<BlockHash, Block>,
    /// Latest admitted vote per representative.
    pub last_votes: HashMap<Account, VoteInfo>,
    /// Tally from the last evaluation, including blocks we don't hold.
    pub last_tally: HashMap<BlockHash, Amount>,
    pub confirmed: bool,
    pub aborted: bool,
    confirmation_action: Box<dyn Fn(&Block) + Send + Sync>,
}

impl Election {
    /// Create an election seeded with `block` as the presumptive winner and
    /// the `not_an_account` sentinel vote.
    pub fn new(
        block: Block,
        now: Timestamp,
        confirmation_action: Box<dyn Fn(&Block) + Send + Sync>,
    ) -> Self {
        let hash = block.hash();
        let mut last_votes = HashMap::new();
        last_votes.insert(
            Account::ZERO,
            VoteInfo {
                time: now,
                sequence: 0,
                hash,
            },
        );
        let mut blocks = HashMap::new();
        blocks.insert(hash, block.clone());
        Self {
            root: block.root(),
            status: ElectionStatus {
                winner: block,
                tally: Amount::ZERO,
            },
            blocks,
            last_votes,
            last_tally: HashMap::new(),
            confirmed: false,
            aborted: false,
            confirmation_action,
        }
    }

    /// Admit a vote from `rep` for `hash` at `sequence`.
    ///
    /// Representatives below 0.1% of online stake are ignored. Others are
    /// admitted when (a) they have no recorded vote, or (b) the new
    /// (sequence, hash) is lexicographically greater than the stored one and
    /// the band cooldown has elapsed. A non-advancing pair is a replay.
    pub fn vote(
        &mut self,
        rep: Account,
        sequence: u64,
        hash: BlockHash,
        now: Timestamp,
        ctx: &TallyContext<'_>,
    ) -> VoteOutcome {
        let mut outcome = VoteOutcome::default();
        let supply = ctx.online_stake.raw();
        let weight = (ctx.weight_of)(&rep).raw();
        if weight <= supply / 1000 {
            return outcome;
        }

        let cooldown_ms = if weight < supply / 100 {
            15_000 // 0.1% to 1%
        } else if weight < supply / 20 {
            5_000 // 1% to 5%
        } else {
            1_000 // 5% or above
        };

        let should_process = match self.last_votes.get(&rep) {
            None => true,
            Some(last) => {
                if (sequence, hash) > (last.sequence, last.hash) {
                    last.time.has_expired(cooldown_ms, now)
                } else {
                    outcome.result.replay = true;
                    false
                }
            }
        };

        if should_process {
            self.last_votes.insert(
                rep,
                VoteInfo {
                    time: now,
                    sequence,
                    hash,
                },
            );
            outcome.result.processed = true;
            if !self.confirmed {
                self.confirm_if_quorum(ctx, &mut outcome);
            }
        }
        outcome
    }

    /// Recompute the tally from `last_votes`, store it in `last_tally`, and
    /// return (weight, hash) pairs for blocks this election holds, sorted
    /// descending by weight.
    pub fn tally(&mut self, weight_of: &dyn Fn(&Account) -> Amount) -> Vec<(Amount, BlockHash)> {
        let mut block_weights: HashMap<BlockHash, Amount> = HashMap::new();
        for (rep, info) in &self.last_votes {
            let entry = block_weights.entry(info.hash).or_insert(Amount::ZERO);
            *entry = entry.saturating_add(weight_of(rep));
        }
        self.last_tally = block_weights.clone();

        let mut result: Vec<(Amount, BlockHash)> = block_weights
            .into_iter()
            .filter(|(hash, _)| self.blocks.contains_key(hash))
            .map(|(hash, weight)| (weight, hash))
            .collect();
        result.sort_by(|a, b| b.cmp(a));
        result
    }

    fn confirm_if_quorum(&mut self, ctx: &TallyContext<'_>, outcome: &mut VoteOutcome) {
        let tally = self.tally(ctx.weight_of);
        let Some(&(winner_weight, winner_hash)) = tally.first() else {
            return;
        };
        self.status.tally = winner_weight;

        let sum = tally
            .iter()
            .fold(Amount::ZERO, |acc, (w, _)| acc.saturating_add(*w));
        if sum >= ctx.online_weight_minimum && winner_hash != self.status.winner.hash() {
            if let Some(block) = self.blocks.get(&winner_hash) {
                self.status.winner = block.clone();
                outcome.winner_changed = Some(block.clone());
            }
        }

        if Self::have_quorum(&tally, ctx.quorum_delta()) {
            if self.blocks.len() > 1 {
                self.log_votes(&tally);
            }
            self.confirm_once(outcome);
        }
    }

    fn have_quorum(tally: &[(Amount, BlockHash)], delta: Amount) -> bool {
        let first = tally.first().map(|(w, _)| *w).unwrap_or(Amount::ZERO);
        let second = tally.get(1).map(|(w, _)| *w).unwrap_or(Amount::ZERO);
        first > second.saturating_add(delta)
    }

    // Confirmed and aborted are mutually exclusive terminal states.
    fn confirm_once(&mut self, outcome: &mut VoteOutcome) {
        if !self.confirmed && !self.aborted {
            self.confirmed = true;
            outcome.confirmed = Some(self.status.clone());
            (self.confirmation_action)(&self.status.winner);
        }
    }

    pub fn abort(&mut self) {
        if !self.confirmed {
            self.aborted = true;
        }
    }

    /// Add an alternative block. Returns `true` (rejected) when the election
    /// already holds [`MAX_ELECTION_BLOCKS`] and the proposed block's tally
    /// share is below 10% of online stake.
    pub fn publish(&mut self, block: Block, online_stake: Amount) -> bool {
        if self.blocks.len() >= MAX_ELECTION_BLOCKS {
            let tallied = self
                .last_tally
                .get(&block.hash())
                .copied()
                .unwrap_or(Amount::ZERO);
            if tallied.raw() < online_stake.raw() / 10 {
                return true;
            }
        }
        self.blocks.insert(block.hash(), block);
        false
    }

    /// Dump the tally and per-representative votes to the log.
    pub fn log_votes(&self, tally: &[(Amount, BlockHash)]) {
        tracing::info!(root = %self.root, "vote tally");
        for (weight, hash) in tally {
            tracing::info!(block = %hash, weight = weight.raw(), "tally entry");
        }
        for (rep, info) in &self.last_votes {
            tracing::info!(rep = %rep, block = %info.hash, sequence = info.sequence, "last vote");
        }
    }
}

impl std::fmt::Debug for Election {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Election")
            .field("root", &self.root)
            .field("winner", &self.status.winner.hash())
            .field("blocks", &self.blocks.len())
            .field("confirmed", &self.confirmed)
            .field("aborted", &self.aborted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chratos_ledger::StateBlock;
    use chratos_types::Signature;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn make_block(account: u8, previous: u8) -> Block {
        let previous = if previous == 0 {
            BlockHash::ZERO
        } else {
            BlockHash::new([previous; 32])
        };
        let mut block = Block::State(StateBlock {
            account: Account::new([account; 32]),
            previous,
            representative: Account::new([0xEE; 32]),
            balance: Amount::new(100),
            link: BlockHash::ZERO,
            dividend: BlockHash::ZERO,
            work: 0,
            signature: Signature::ZERO,
            hash: BlockHash::ZERO,
        });
        block.compute_hash();
        block
    }

    fn rep(byte: u8) -> Account {
        Account::new([byte; 32])
    }

    fn ms(v: u64) -> Timestamp {
        Timestamp::from_millis(v)
    }

    /// Context with a 1000-stake supply, 50% quorum, and uniform weights.
    fn ctx<'a>(weight_of: &'a dyn Fn(&Account) -> Amount) -> TallyContext<'a> {
        TallyContext {
            online_stake: Amount::new(1000),
            quorum_percent: 50,
            online_weight_minimum: Amount::new(600),
            weight_of,
        }
    }

    fn noop_election(block: Block) -> Election {
        Election::new(block, ms(0), Box::new(|_| {}))
    }

    #[test]
    fn new_election_has_sentinel_vote() {
        let block = make_block(1, 0);
        let election = noop_election(block.clone());
        assert_eq!(election.root, block.root());
        assert_eq!(election.last_votes.len(), 1);
        let sentinel = election.last_votes.get(&Account::ZERO).unwrap();
        assert_eq!(sentinel.sequence, 0);
        assert_eq!(sentinel.hash, block.hash());
        assert!(!election.confirmed);
        assert!(!election.aborted);
    }

    #[test]
    fn dust_weight_rep_ignored() {
        let block = make_block(1, 0);
        let mut election = noop_election(block.clone());
        // 1/1000 of stake = 1; weight must be strictly above.
        let weight_of = |_: &Account| Amount::new(1);
        let outcome = election.vote(rep(9), 1, block.hash(), ms(10), &ctx(&weight_of));
        assert!(!outcome.result.processed);
        assert!(!outcome.result.replay);
        assert_eq!(election.last_votes.len(), 1);
    }

    #[test]
    fn first_vote_is_processed() {
        let block = make_block(1, 0);
        let mut election = noop_election(block.clone());
        let weight_of = |_: &Account| Amount::new(100);
        let outcome = election.vote(rep(9), 1, block.hash(), ms(10), &ctx(&weight_of));
        assert!(outcome.result.processed);
        assert!(!outcome.result.replay);
        assert_eq!(election.last_votes.len(), 2);
    }

    #[test]
    fn non_advancing_vote_is_replay() {
        let block = make_block(1, 0);
        let mut election = noop_election(block.clone());
        let weight_of = |_: &Account| Amount::new(100);
        election.vote(rep(9), 2, block.hash(), ms(10), &ctx(&weight_of));

        let outcome = election.vote(rep(9), 2, block.hash(), ms(20_000), &ctx(&weight_of));
        assert!(outcome.result.replay);
        assert!(!outcome.result.processed);

        let outcome = election.vote(rep(9), 1, block.hash(), ms(20_000), &ctx(&weight_of));
        assert!(outcome.result.replay);
    }

    #[test]
    fn cooldown_band_one_percent() {
        // Weight 2 out of 1000 = 0.2%: 15 s cooldown.
        let block = make_block(1, 0);
        let mut election = noop_election(block.clone());
        let weight_of = |_: &Account| Amount::new(2);
        let c = ctx(&weight_of);
        assert!(election.vote(rep(9), 1, block.hash(), ms(0), &c).result.processed);
        // 14.99 s later: advancing pair but cooldown not elapsed.
        let outcome = election.vote(rep(9), 2, block.hash(), ms(14_990), &c);
        assert!(!outcome.result.processed);
        assert!(!outcome.result.replay);
        // 15.00 s: accepted.
        let outcome = election.vote(rep(9), 2, block.hash(), ms(15_000), &c);
        assert!(outcome.result.processed);
    }

    #[test]
    fn cooldown_band_five_percent() {
        // Weight 30/1000 = 3%: 5 s cooldown.
        let block = make_block(1, 0);
        let mut election = noop_election(block.clone());
        let weight_of = |_: &Account| Amount::new(30);
        let c = ctx(&weight_of);
        election.vote(rep(9), 1, block.hash(), ms(0), &c);
        assert!(!election.vote(rep(9), 2, block.hash(), ms(4_999), &c).result.processed);
        assert!(election.vote(rep(9), 2, block.hash(), ms(5_000), &c).result.processed);
    }

    #[test]
    fn cooldown_band_large_rep() {
        // Weight 100/1000 = 10%: 1 s cooldown.
        let block = make_block(1, 0);
        let mut election = noop_election(block.clone());
        let weight_of = |_: &Account| Amount::new(100);
        let c = ctx(&weight_of);
        election.vote(rep(9), 1, block.hash(), ms(0), &c);
        assert!(!election.vote(rep(9), 2, block.hash(), ms(999), &c).result.processed);
        assert!(election.vote(rep(9), 2, block.hash(), ms(1_000), &c).result.processed);
    }

    #[test]
    fn quorum_requires_margin_over_runner_up() {
        let ours = make_block(1, 5);
        let theirs = make_block(2, 5);
        let mut election = noop_election(ours.clone());
        election.publish(theirs.clone(), Amount::new(1000));

        // Stake 1000, quorum 50% → delta 500. 600 vs 0: 600 > 0 + 500 → quorum.
        let weights: HashMap<Account, Amount> =
            [(rep(9), Amount::new(600)), (rep(8), Amount::new(90))].into();
        let weight_of = move |a: &Account| weights.get(a).copied().unwrap_or(Amount::ZERO);
        let c = ctx(&weight_of);

        let outcome = election.vote(rep(8), 1, theirs.hash(), ms(0), &c);
        assert!(outcome.confirmed.is_none());

        let outcome = election.vote(rep(9), 1, ours.hash(), ms(10), &c);
        // 600 > 90 + 500 is false (590 + margin); delta = 500 → 600 > 590 → quorum.
        assert!(outcome.confirmed.is_some());
        assert!(election.confirmed);
        assert_eq!(outcome.confirmed.unwrap().winner.hash(), ours.hash());
    }

    #[test]
    fn quorum_boundary_exact() {
        // first must be strictly greater than second + delta.
        let block = make_block(1, 5);
        let mut election = noop_election(block.clone());
        // Stake 1000, quorum 50% → delta 500. Single block, tally 500: not quorum.
        let weights: HashMap<Account, Amount> = [(rep(9), Amount::new(500))].into();
        let weight_of = move |a: &Account| weights.get(a).copied().unwrap_or(Amount::ZERO);
        let c = ctx(&weight_of);
        let outcome = election.vote(rep(9), 1, block.hash(), ms(0), &c);
        assert!(outcome.confirmed.is_none());

        // 501 > 500: quorum.
        let weights: HashMap<Account, Amount> = [(rep(8), Amount::new(501))].into();
        let weight_of = move |a: &Account| weights.get(a).copied().unwrap_or(Amount::ZERO);
        let c = ctx(&weight_of);
        let outcome = election.vote(rep(8), 1, block.hash(), ms(2_000), &c);
        assert!(outcome.confirmed.is_some());
    }

    #[test]
    fn winner_flips_when_tally_sum_clears_minimum() {
        let ours = make_block(1, 5);
        let theirs = make_block(2, 5);
        let mut election = noop_election(ours.clone());
        election.publish(theirs.clone(), Amount::new(1000));

        // 70% vs 30% split: sum 1000 ≥ minimum 600, top block differs from
        // the seeded winner → winner change.
        let weights: HashMap<Account, Amount> =
            [(rep(7), Amount::new(700)), (rep(3), Amount::new(300))].into();
        let weight_of = move |a: &Account| weights.get(a).copied().unwrap_or(Amount::ZERO);
        let c = ctx(&weight_of);

        election.vote(rep(3), 1, ours.hash(), ms(0), &c);
        let outcome = election.vote(rep(7), 1, theirs.hash(), ms(10), &c);
        assert_eq!(
            outcome.winner_changed.as_ref().map(|b| b.hash()),
            Some(theirs.hash())
        );
        assert_eq!(election.status.winner.hash(), theirs.hash());
    }

    #[test]
    fn confirmation_action_fires_exactly_once() {
        let block = make_block(1, 0);
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        let mut election = Election::new(
            block.clone(),
            ms(0),
            Box::new(move |_| {
                fired_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let weight_of = |_: &Account| Amount::new(800);
        let c = ctx(&weight_of);
        election.vote(rep(9), 1, block.hash(), ms(0), &c);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // Further advancing votes do not re-fire the action.
        election.vote(rep(9), 2, block.hash(), ms(2_000), &c);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn publish_caps_alternatives() {
        let seed = make_block(1, 5);
        let mut election = noop_election(seed);
        let stake = Amount::new(1000);
        for i in 10..19 {
            assert!(!election.publish(make_block(i, 5), stake));
        }
        assert_eq!(election.blocks.len(), MAX_ELECTION_BLOCKS);
        // Eleventh distinct block with no tally share: rejected.
        assert!(election.publish(make_block(99, 5), stake));
    }

    #[test]
    fn publish_admits_heavy_alternative_past_cap() {
        let seed = make_block(1, 5);
        let mut election = noop_election(seed);
        let stake = Amount::new(1000);
        for i in 10..19 {
            election.publish(make_block(i, 5), stake);
        }
        let heavy = make_block(99, 5);
        // Pretend a prior tally credited it with ≥10% of stake.
        election.last_tally.insert(heavy.hash(), Amount::new(100));
        assert!(!election.publish(heavy, stake));
        assert_eq!(election.blocks.len(), MAX_ELECTION_BLOCKS + 1);
    }

    #[test]
    fn abort_does_not_override_confirmed() {
        let block = make_block(1, 0);
        let mut election = noop_election(block.clone());
        let weight_of = |_: &Account| Amount::new(800);
        election.vote(rep(9), 1, block.hash(), ms(0), &ctx(&weight_of));
        assert!(election.confirmed);
        election.abort();
        assert!(!election.aborted);
    }

    #[test]
    fn tally_includes_unheld_blocks_in_last_tally_only() {
        let block = make_block(1, 5);
        let mut election = noop_election(block.clone());
        let phantom = BlockHash::new([0x77; 32]);
        election.last_votes.insert(
            rep(9),
            VoteInfo {
                time: ms(0),
                sequence: 1,
                hash: phantom,
            },
        );
        let weight_of = |a: &Account| {
            if a.is_zero() {
                Amount::ZERO
            } else {
                Amount::new(50)
            }
        };
        let sorted = election.tally(&weight_of);
        // The phantom hash is tallied but not returned (we don't hold it).
        assert!(election.last_tally.contains_key(&phantom));
        assert!(sorted.iter().all(|(_, h)| *h != phantom));
    }

    #[test]
    fn last_votes_keys_are_reps_or_sentinel() {
        let block = make_block(1, 0);
        let mut election = noop_election(block.clone());
        let weight_of = |_: &Account| Amount::new(100);
        let c = ctx(&weight_of);
        election.vote(rep(4), 1, block.hash(), ms(0), &c);
        election.vote(rep(5), 3, block.hash(), ms(1), &c);
        for key in election.last_votes.keys() {
            assert!(key.is_zero() || *key == rep(4) || *key == rep(5));
        }
        // Stored pair per rep is the lex-greatest observed.
        election.vote(rep(5), 2, block.hash(), ms(10_000), &c);
        assert_eq!(election.last_votes.get(&rep(5)).unwrap().sequence, 3);
    }
}
