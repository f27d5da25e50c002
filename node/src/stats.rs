//! Statistics counters.
//!
//! Every countable event is keyed by (type, detail, direction). The table
//! is the node's user-visible failure surface: parse errors, dropped
//! senders, vote dispositions, and ledger outcomes all land here.

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatType {
    Traffic,
    Error,
    Message,
    Vote,
    Ledger,
    Bootstrap,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatDetail {
    All,
    // messages
    Keepalive,
    Publish,
    ConfirmReq,
    ConfirmAck,
    NodeIdHandshake,
    // errors
    BadSender,
    InvalidMessage,
    InsufficientWork,
    HandshakeFailed,
    // votes
    VoteValid,
    VoteReplay,
    VoteInvalid,
    // ledger outcomes
    Progress,
    Old,
    Gap,
    Fork,
    Rejected,
    // bootstrap
    Initiated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
}

/// Counter table keyed by (type, detail, direction).
#[derive(Default)]
pub struct Stats {
    counters: Mutex<HashMap<(StatType, StatDetail, Direction), u64>>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self, stat_type: StatType, detail: StatDetail, direction: Direction) {
        self.add(stat_type, detail, direction, 1);
    }

    pub fn add(&self, stat_type: StatType, detail: StatDetail, direction: Direction, value: u64) {
        let mut counters = self.counters.lock().unwrap();
        *counters.entry((stat_type, detail, direction)).or_insert(0) += value;
    }

    pub fn count(&self, stat_type: StatType, detail: StatDetail, direction: Direction) -> u64 {
        self.counters
            .lock()
            .unwrap()
            .get(&(stat_type, detail, direction))
            .copied()
            .unwrap_or(0)
    }

    /// Copy of the whole table, for logging or RPC export.
    pub fn snapshot(&self) -> HashMap<(StatType, StatDetail, Direction), u64> {
        self.counters.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_accumulate() {
        let stats = Stats::new();
        stats.inc(StatType::Message, StatDetail::Keepalive, Direction::In);
        stats.inc(StatType::Message, StatDetail::Keepalive, Direction::In);
        assert_eq!(
            stats.count(StatType::Message, StatDetail::Keepalive, Direction::In),
            2
        );
    }

    #[test]
    fn directions_are_distinct() {
        let stats = Stats::new();
        stats.inc(StatType::Message, StatDetail::Publish, Direction::In);
        assert_eq!(
            stats.count(StatType::Message, StatDetail::Publish, Direction::Out),
            0
        );
    }

    #[test]
    fn add_bulk() {
        let stats = Stats::new();
        stats.add(StatType::Traffic, StatDetail::All, Direction::In, 1024);
        assert_eq!(stats.count(StatType::Traffic, StatDetail::All, Direction::In), 1024);
    }

    #[test]
    fn snapshot_contains_all_entries() {
        let stats = Stats::new();
        stats.inc(StatType::Vote, StatDetail::VoteValid, Direction::In);
        stats.inc(StatType::Error, StatDetail::BadSender, Direction::In);
        assert_eq!(stats.snapshot().len(), 2);
    }
}
