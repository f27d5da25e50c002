//! Consensus — fork resolution via weighted representative voting.
//!
//! Each account delegates its balance to a representative. When two blocks
//! compete for the same chain position, representatives vote and the block
//! whose tally clears the quorum margin over the runner-up wins.
//!
//! ## Module overview
//!
//! - [`election`] — per-conflict election state machine: vote admission with
//!   weight-banded cooldowns, tally, quorum, winner replacement.
//! - [`active_elections`] — root-keyed election container with the periodic
//!   announcement tick.
//! - [`online_reps`] — rolling set of actively-voting representatives; the
//!   quorum denominator.
//! - [`rep_crawler`] — hashes whose vote responses identify a peer as a
//!   representative.
//! - [`error`] — consensus error types.

pub mod active_elections;
pub mod election;
pub mod error;
pub mod online_reps;
pub mod rep_crawler;

pub use active_elections::{
    ActiveElections, AnnounceAction, AnnounceContext, AnnounceSummary, PeerRep, VoteRouting,
    ANNOUNCEMENT_LONG, ANNOUNCEMENT_MIN, ANNOUNCE_INTERVAL_MS, ELECTION_HISTORY_CAP,
};
pub use election::{
    Election, ElectionStatus, ElectionVoteResult, TallyContext, VoteInfo, VoteOutcome,
    MAX_ELECTION_BLOCKS,
};
pub use error::ConsensusError;
pub use online_reps::OnlineReps;
pub use rep_crawler::RepCrawler;
