//! Active elections container.
//!
//! Holds every ongoing election keyed by root, with a secondary index from
//! block hash to root so votes carrying bare hashes can be routed. The
//! announcement tick walks all elections and emits declarative actions
//! (broadcast the winner, solicit non-voting representatives, give up) that
//! the network layer executes; keeping the tick free of I/O makes the whole
//! engine drivable from tests.

use crate::election::{Election, ElectionStatus, TallyContext};
use crate::error::ConsensusError;
use chratos_ledger::{Block, Vote};
use chratos_types::{Account, Amount, BlockHash, Endpoint, Timestamp};
use std::collections::{HashMap, HashSet, VecDeque};

/// Announcements a finished election lingers for before removal.
pub const ANNOUNCEMENT_MIN: u32 = 4;
/// Announcements after which an election counts as long-unconfirmed.
pub const ANNOUNCEMENT_LONG: u32 = 20;
/// Default announcement cadence.
pub const ANNOUNCE_INTERVAL_MS: u64 = 16;
/// Confirmed-election history ring capacity.
pub const ELECTION_HISTORY_CAP: usize = 128;

/// A peer known (or suspected) to be a representative.
#[derive(Clone, Debug)]
pub struct PeerRep {
    pub endpoint: Endpoint,
    pub account: Account,
    pub weight: Amount,
}

/// Environment for one announcement tick.
pub struct AnnounceContext<'a> {
    /// Representative peers, best weight first.
    pub representatives: Vec<PeerRep>,
    pub online_weight_minimum: Amount,
    /// Whether the ledger could still accept a block.
    pub could_fit: &'a dyn Fn(&Block) -> bool,
}

/// One transmission the network layer should perform for an election.
#[derive(Clone, Debug)]
pub enum AnnounceAction {
    /// Re-publish the current winner (bundled into rep votes when voting is
    /// enabled).
    BroadcastWinner(Block),
    /// Send confirm_req only to representatives that have not voted yet.
    SolicitRepresentatives {
        block: Block,
        endpoints: Vec<Endpoint>,
    },
    /// Fall back to requesting confirmation from every peer.
    SolicitAllPeers(Block),
}

/// Result of one announcement tick.
#[derive(Debug, Default)]
pub struct AnnounceSummary {
    pub actions: Vec<AnnounceAction>,
    /// Elections past [`ANNOUNCEMENT_LONG`] announcements.
    pub unconfirmed_count: usize,
    pub unconfirmed_announcements: u32,
    /// Roots removed this tick.
    pub erased: Vec<BlockHash>,
}

impl AnnounceSummary {
    fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.erased.is_empty() && self.unconfirmed_count == 0
    }
}

/// Result of routing one vote through the container.
#[derive(Debug, Default)]
pub struct VoteRouting {
    /// True when any election reported the vote as a replay.
    pub replay: bool,
    /// True when any election admitted the vote.
    pub processed: bool,
    /// New winners that must be forced through the block processor.
    pub winner_changes: Vec<Block>,
    /// Elections confirmed by this vote.
    pub confirmations: Vec<ElectionStatus>,
}

struct ElectionEntry {
    election: Election,
    announcements: u32,
}

/// All ongoing elections.
pub struct ActiveElections {
    roots: HashMap<BlockHash, ElectionEntry>,
    /// Block hash → root, for routing votes by hash.
    successors: HashMap<BlockHash, BlockHash>,
    /// Recently confirmed election results.
    confirmed: VecDeque<ElectionStatus>,
}

impl Default for ActiveElections {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveElections {
    pub fn new() -> Self {
        Self {
            roots: HashMap::new(),
            successors: HashMap::new(),
            confirmed: VecDeque::with_capacity(ELECTION_HISTORY_CAP),
        }
    }

    /// Start an election for `block`. Errors when one already exists for
    /// the root.
    pub fn start(
        &mut self,
        block: Block,
        now: Timestamp,
        confirmation_action: Box<dyn Fn(&Block) + Send + Sync>,
    ) -> Result<(), ConsensusError> {
        let root = block.root();
        if self.roots.contains_key(&root) {
            return Err(ConsensusError::ElectionExists(root.to_string()));
        }
        let hash = block.hash();
        let election = Election::new(block, now, confirmation_action);
        self.roots.insert(
            root,
            ElectionEntry {
                election,
                announcements: 0,
            },
        );
        self.successors.insert(hash, root);
        Ok(())
    }

    /// Start a fork-resolution election between our ledger block and a
    /// competing peer block sharing the same root.
    pub fn start_fork(
        &mut self,
        ledger_block: Block,
        peer_block: Block,
        online_stake: Amount,
        now: Timestamp,
        confirmation_action: Box<dyn Fn(&Block) + Send + Sync>,
    ) -> Result<(), ConsensusError> {
        self.start(ledger_block, now, confirmation_action)?;
        self.publish(&peer_block, online_stake);
        Ok(())
    }

    /// Offer an alternative block to the election for its root. Returns
    /// `true` when no election exists or the election rejected the block.
    pub fn publish(&mut self, block: &Block, online_stake: Amount) -> bool {
        let root = block.root();
        let Some(entry) = self.roots.get_mut(&root) else {
            return true;
        };
        let rejected = entry.election.publish(block.clone(), online_stake);
        if !rejected {
            self.successors.insert(block.hash(), root);
        }
        rejected
    }

    /// Route a vote to the election(s) covering its blocks.
    pub fn vote(&mut self, vote: &Vote, now: Timestamp, ctx: &TallyContext<'_>) -> VoteRouting {
        let mut routing = VoteRouting::default();
        for item in &vote.blocks {
            let hash = item.hash();
            let root = match item.as_block() {
                Some(block) => block.root(),
                None => match self.successors.get(&hash) {
                    Some(root) => *root,
                    None => continue,
                },
            };
            if let Some(entry) = self.roots.get_mut(&root) {
                let outcome = entry
                    .election
                    .vote(vote.account, vote.sequence, hash, now, ctx);
                routing.replay |= outcome.result.replay;
                routing.processed |= outcome.result.processed;
                if let Some(block) = outcome.winner_changed {
                    routing.winner_changes.push(block);
                }
                if let Some(status) = outcome.confirmed {
                    routing.confirmations.push(status);
                }
            }
        }
        routing
    }

    /// Whether an election is running for this block's root.
    pub fn active(&self, block: &Block) -> bool {
        self.roots.contains_key(&block.root())
    }

    /// Current winners of all elections.
    pub fn list_blocks(&self) -> Vec<Block> {
        self.roots
            .values()
            .map(|entry| entry.election.status.winner.clone())
            .collect()
    }

    /// Drop the election for this block's root, if any.
    pub fn erase(&mut self, block: &Block) {
        if let Some(entry) = self.roots.remove(&block.root()) {
            for hash in entry.election.blocks.keys() {
                self.successors.remove(hash);
            }
            tracing::info!(block = %block.hash(), root = %block.root(), "election erased");
        }
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Recently confirmed election results, oldest first.
    pub fn recently_confirmed(&self) -> &VecDeque<ElectionStatus> {
        &self.confirmed
    }

    /// One pass of the announcement loop.
    pub fn announce_tick(&mut self, ctx: &AnnounceContext<'_>) -> AnnounceSummary {
        let mut summary = AnnounceSummary::default();
        let mut inactive: Vec<BlockHash> = Vec::new();
        let mut mass_request_count = 0u32;

        for (root, entry) in self.roots.iter_mut() {
            let election = &mut entry.election;
            if (election.confirmed || election.aborted)
                && entry.announcements >= ANNOUNCEMENT_MIN - 1
            {
                if election.confirmed {
                    if self.confirmed.len() >= ELECTION_HISTORY_CAP {
                        self.confirmed.pop_front();
                    }
                    self.confirmed.push_back(election.status.clone());
                }
                inactive.push(*root);
            } else {
                if entry.announcements > ANNOUNCEMENT_LONG {
                    summary.unconfirmed_count += 1;
                    summary.unconfirmed_announcements += entry.announcements;
                    // Periodic tally dump for elections stuck a long time.
                    if entry.announcements % 50 == 1 {
                        let tally = election.tally(&|rep| {
                            ctx.representatives
                                .iter()
                                .find(|r| r.account == *rep)
                                .map(|r| r.weight)
                                .unwrap_or(Amount::ZERO)
                        });
                        election.log_votes(&tally);
                    }
                }

                if entry.announcements < ANNOUNCEMENT_LONG
                    || entry.announcements % ANNOUNCEMENT_LONG == 1
                {
                    if (ctx.could_fit)(&election.status.winner) {
                        summary
                            .actions
                            .push(AnnounceAction::BroadcastWinner(election.status.winner.clone()));
                    } else if entry.announcements > 3 {
                        // The winner can no longer fit on the ledger; the
                        // conflict was resolved another way.
                        election.abort();
                    }
                }

                if entry.announcements % 4 == 1 {
                    let mut probable_reps: HashSet<Account> = HashSet::new();
                    let mut total_weight = Amount::ZERO;
                    let mut non_voting: Vec<Endpoint> = Vec::new();
                    for rep in &ctx.representatives {
                        if probable_reps.insert(rep.account) {
                            total_weight = total_weight.saturating_add(rep.weight);
                        }
                        if !election.last_votes.contains_key(&rep.account) {
                            non_voting.push(rep.endpoint);
                        }
                    }
                    let block = election.status.winner.clone();
                    if !non_voting.is_empty()
                        && (total_weight > ctx.online_weight_minimum || mass_request_count > 20)
                    {
                        summary.actions.push(AnnounceAction::SolicitRepresentatives {
                            block,
                            endpoints: non_voting,
                        });
                    } else {
                        summary.actions.push(AnnounceAction::SolicitAllPeers(block));
                        mass_request_count += 1;
                    }
                }
            }
            entry.announcements += 1;
        }

        for root in &inactive {
            if let Some(entry) = self.roots.remove(root) {
                for hash in entry.election.blocks.keys() {
                    self.successors.remove(hash);
                }
            }
            summary.erased.push(*root);
        }

        if summary.unconfirmed_count > 0 {
            tracing::info!(
                count = summary.unconfirmed_count,
                average_announcements =
                    summary.unconfirmed_announcements / summary.unconfirmed_count as u32,
                "blocks remain unconfirmed"
            );
        }
        if !summary.is_empty() {
            tracing::trace!(
                actions = summary.actions.len(),
                erased = summary.erased.len(),
                "announcement tick"
            );
        }
        summary
    }
}
