//! Gap cache.
//!
//! Blocks that arrived with a missing dependency wait here while votes
//! accumulate. Once the voters behind a missing block represent enough
//! weight, the node schedules a bootstrap to fetch it: a gap that heavy
//! representatives are voting on is a gap worth closing.

use chratos_types::{Account, Amount, BlockHash, Timestamp};
use std::collections::{HashMap, HashSet};

/// Maximum tracked gaps; eviction is oldest-arrival-first.
const MAX_GAPS: usize = 256;
/// Entries idle longer than this are purged.
const PURGE_AGE_MS: u64 = 10_000;

struct GapInfo {
    arrival: Timestamp,
    voters: HashSet<Account>,
}

/// Blocks awaiting a missing dependency, with voter-weight tracking.
#[derive(Default)]
pub struct GapCache {
    blocks: HashMap<BlockHash, GapInfo>,
}

impl GapCache {
    /// Delay before the scheduled bootstrap check fires.
    pub const BOOTSTRAP_CHECK_DELAY_MS: u64 = 5_000;

    pub fn new() -> Self {
        Self::default()
    }

    /// Track a missing dependency, refreshing the arrival time when it is
    /// already present. At capacity the oldest entry is evicted.
    pub fn add(&mut self, hash: BlockHash, now: Timestamp) {
        if let Some(info) = self.blocks.get_mut(&hash) {
            info.arrival = now;
            return;
        }
        if self.blocks.len() >= MAX_GAPS {
            if let Some(oldest) = self
                .blocks
                .iter()
                .min_by_key(|(_, info)| info.arrival)
                .map(|(hash, _)| *hash)
            {
                self.blocks.remove(&oldest);
            }
        }
        self.blocks.insert(
            hash,
            GapInfo {
                arrival: now,
                voters: HashSet::new(),
            },
        );
    }

    /// Record the voters of a vote against any tracked gaps. Returns the
    /// hashes whose accumulated voter weight just crossed `threshold`.
    pub fn vote(
        &mut self,
        voter: Account,
        hashes: impl Iterator<Item = BlockHash>,
        weight_of: &dyn Fn(&Account) -> Amount,
        threshold: Amount,
    ) -> Vec<BlockHash> {
        let mut triggered = Vec::new();
        for hash in hashes {
            let Some(info) = self.blocks.get_mut(&hash) else {
                continue;
            };
            if !info.voters.insert(voter) {
                continue;
            }
            let tally = info
                .voters
                .iter()
                .fold(Amount::ZERO, |acc, account| acc.saturating_add(weight_of(account)));
            if tally > threshold {
                triggered.push(hash);
            }
        }
        triggered
    }

    /// The bootstrap trigger level: `online_stake / 256` scaled by the
    /// configured numerator.
    pub fn bootstrap_threshold(online_stake: Amount, fraction_numerator: u32) -> Amount {
        Amount::new(online_stake.raw() / 256 * fraction_numerator as u128)
    }

    /// Remove the entry for a dependency that has been satisfied.
    pub fn erase(&mut self, hash: &BlockHash) {
        self.blocks.remove(hash);
    }

    /// Drop entries idle for longer than the purge age.
    pub fn purge_old(&mut self, now: Timestamp) {
        self.blocks
            .retain(|_, info| !info.arrival.has_expired(PURGE_AGE_MS, now));
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.blocks.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(byte: u8, tail: u8) -> BlockHash {
        let mut bytes = [byte; 32];
        bytes[31] = tail;
        BlockHash::new(bytes)
    }

    fn rep(byte: u8) -> Account {
        Account::new([byte; 32])
    }

    fn ms(v: u64) -> Timestamp {
        Timestamp::from_millis(v)
    }

    fn weights(pairs: &[(Account, u128)]) -> impl Fn(&Account) -> Amount + '_ {
        move |account| {
            pairs
                .iter()
                .find(|(a, _)| a == account)
                .map(|(_, w)| Amount::new(*w))
                .unwrap_or(Amount::ZERO)
        }
    }

    #[test]
    fn add_and_contains() {
        let mut cache = GapCache::new();
        cache.add(hash(1, 0), ms(0));
        assert!(cache.contains(&hash(1, 0)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn re_add_refreshes_arrival() {
        let mut cache = GapCache::new();
        cache.add(hash(1, 0), ms(0));
        cache.add(hash(1, 0), ms(9_000));
        // Fresh arrival: survives a purge that would have removed the old one.
        cache.purge_old(ms(10_500));
        assert!(cache.contains(&hash(1, 0)));
    }

    #[test]
    fn capacity_evicts_oldest_first() {
        let mut cache = GapCache::new();
        for i in 0..MAX_GAPS {
            cache.add(hash((i % 251) as u8, (i / 251) as u8), ms(i as u64));
        }
        assert_eq!(cache.len(), MAX_GAPS);
        cache.add(hash(0xFF, 0xFF), ms(99_999));
        assert_eq!(cache.len(), MAX_GAPS);
        // The oldest (arrival 0) was evicted, the second-oldest survives.
        assert!(!cache.contains(&hash(0, 0)));
        assert!(cache.contains(&hash(1, 0)));
    }

    #[test]
    fn vote_triggers_on_threshold_crossing() {
        let mut cache = GapCache::new();
        cache.add(hash(1, 0), ms(0));
        let table = [(rep(1), 300u128), (rep(2), 300u128), (rep(3), 300u128)];
        let weight_of = weights(&table);
        let threshold = Amount::new(500);

        let t1 = cache.vote(rep(1), std::iter::once(hash(1, 0)), &weight_of, threshold);
        assert!(t1.is_empty()); // 300 ≤ 500

        let t2 = cache.vote(rep(2), std::iter::once(hash(1, 0)), &weight_of, threshold);
        assert_eq!(t2, vec![hash(1, 0)]); // 600 > 500
    }

    #[test]
    fn duplicate_voter_does_not_retrigger() {
        let mut cache = GapCache::new();
        cache.add(hash(1, 0), ms(0));
        let table = [(rep(1), 600u128)];
        let weight_of = weights(&table);
        let threshold = Amount::new(500);

        let t1 = cache.vote(rep(1), std::iter::once(hash(1, 0)), &weight_of, threshold);
        assert_eq!(t1.len(), 1);
        // The same voter again adds nothing: no re-trigger.
        let t2 = cache.vote(rep(1), std::iter::once(hash(1, 0)), &weight_of, threshold);
        assert!(t2.is_empty());
    }

    #[test]
    fn vote_for_untracked_hash_is_ignored() {
        let mut cache = GapCache::new();
        let weight_of = |_: &Account| Amount::new(1_000);
        let triggered = cache.vote(
            rep(1),
            std::iter::once(hash(9, 9)),
            &weight_of,
            Amount::ZERO,
        );
        assert!(triggered.is_empty());
    }

    #[test]
    fn purge_removes_idle_entries() {
        let mut cache = GapCache::new();
        cache.add(hash(1, 0), ms(0));
        cache.add(hash(2, 0), ms(8_000));
        cache.purge_old(ms(12_000));
        assert!(!cache.contains(&hash(1, 0)));
        assert!(cache.contains(&hash(2, 0)));
    }

    #[test]
    fn erase_on_dependency_arrival() {
        let mut cache = GapCache::new();
        cache.add(hash(1, 0), ms(0));
        cache.erase(&hash(1, 0));
        assert!(cache.is_empty());
    }

    #[test]
    fn bootstrap_threshold_scales() {
        assert_eq!(
            GapCache::bootstrap_threshold(Amount::new(2560), 1),
            Amount::new(10)
        );
        assert_eq!(
            GapCache::bootstrap_threshold(Amount::new(2560), 4),
            Amount::new(40)
        );
    }
}
