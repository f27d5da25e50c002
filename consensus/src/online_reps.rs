//! Online representative tracking.
//!
//! Quorum is computed against *online* voting weight, not total delegated
//! weight: a representative counts only while it has voted within the
//! cutoff window. The running total is maintained incrementally on each
//! vote and rebuilt periodically to correct drift from weight changes
//! between a rep's insertion and its eviction.

use chratos_types::{Account, Amount, Timestamp};
use std::collections::HashMap;

/// Representatives seen voting within the cutoff window.
pub struct OnlineReps {
    /// Representative → time of its most recent vote.
    reps: HashMap<Account, Timestamp>,
    /// Incrementally maintained sum of online weights.
    online_stake_total: Amount,
    /// Window within which a vote keeps a rep online.
    cutoff_ms: u64,
    /// Floor for `online_stake()`.
    minimum: Amount,
}

impl OnlineReps {
    /// Default cutoff: five minutes.
    pub const DEFAULT_CUTOFF_MS: u64 = 5 * 60 * 1000;

    pub fn new(cutoff_ms: u64, minimum: Amount) -> Self {
        Self {
            reps: HashMap::new(),
            online_stake_total: Amount::ZERO,
            cutoff_ms,
            minimum,
        }
    }

    /// Record a vote from `rep`: evict stale reps (subtracting their weight,
    /// saturating at zero) and upsert the voter (adding its weight on first
    /// insertion, saturating at the maximum).
    pub fn vote(&mut self, rep: Account, now: Timestamp, weight_of: &dyn Fn(&Account) -> Amount) {
        let cutoff_ms = self.cutoff_ms;
        let stale: Vec<Account> = self
            .reps
            .iter()
            .filter(|(_, last_heard)| last_heard.has_expired(cutoff_ms, now))
            .map(|(account, _)| *account)
            .collect();
        for account in stale {
            self.reps.remove(&account);
            self.online_stake_total = self.online_stake_total.saturating_sub(weight_of(&account));
        }

        if self.reps.insert(rep, now).is_none() {
            self.online_stake_total = self.online_stake_total.saturating_add(weight_of(&rep));
        }
    }

    /// Rebuild the running total from the surviving set.
    pub fn recalculate_stake(&mut self, weight_of: &dyn Fn(&Account) -> Amount) {
        self.online_stake_total = self
            .reps
            .keys()
            .fold(Amount::ZERO, |acc, rep| acc.saturating_add(weight_of(rep)));
    }

    /// The quorum denominator: the running total, floored by the configured
    /// minimum.
    pub fn online_stake(&self) -> Amount {
        self.online_stake_total.max(self.minimum)
    }

    /// The raw running total (no floor), exposed for invariant checks.
    pub fn online_stake_total(&self) -> Amount {
        self.online_stake_total
    }

    /// Accounts currently considered online.
    pub fn list(&self) -> Vec<Account> {
        self.reps.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.reps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn first_vote_adds_weight() {
        let mut online = OnlineReps::new(OnlineReps::DEFAULT_CUTOFF_MS, Amount::ZERO);
        let table = [(rep(1), 500u128)];
        online.vote(rep(1), ms(1000), &weights(&table));
        assert_eq!(online.online_stake(), Amount::new(500));
        assert_eq!(online.len(), 1);
    }

    #[test]
    fn repeat_vote_does_not_double_count() {
        let mut online = OnlineReps::new(OnlineReps::DEFAULT_CUTOFF_MS, Amount::ZERO);
        let table = [(rep(1), 500u128)];
        online.vote(rep(1), ms(1000), &weights(&table));
        online.vote(rep(1), ms(2000), &weights(&table));
        assert_eq!(online.online_stake(), Amount::new(500));
    }

    #[test]
    fn stale_rep_evicted_with_weight() {
        let mut online = OnlineReps::new(10_000, Amount::ZERO);
        let table = [(rep(1), 500u128), (rep(2), 300u128)];
        online.vote(rep(1), ms(0), &weights(&table));
        // rep(1)'s last vote at 0 expires at 10_000.
        online.vote(rep(2), ms(10_000), &weights(&table));
        assert_eq!(online.len(), 1);
        assert_eq!(online.online_stake(), Amount::new(300));
    }

    #[test]
    fn eviction_saturates_at_zero() {
        let mut online = OnlineReps::new(10_000, Amount::ZERO);
        // Weight grows between insertion and eviction: the subtraction would
        // underflow without saturation.
        let small = [(rep(1), 100u128)];
        online.vote(rep(1), ms(0), &weights(&small));
        let grown = [(rep(1), 900u128), (rep(2), 50u128)];
        online.vote(rep(2), ms(20_000), &weights(&grown));
        assert_eq!(online.online_stake_total(), Amount::new(50));
    }

    #[test]
    fn minimum_floors_online_stake() {
        let online = OnlineReps::new(10_000, Amount::new(60_000));
        assert_eq!(online.online_stake(), Amount::new(60_000));
        assert_eq!(online.online_stake_total(), Amount::ZERO);
    }

    #[test]
    fn recalculate_corrects_drift() {
        let mut online = OnlineReps::new(OnlineReps::DEFAULT_CUTOFF_MS, Amount::ZERO);
        let before = [(rep(1), 100u128), (rep(2), 200u128)];
        online.vote(rep(1), ms(0), &weights(&before));
        online.vote(rep(2), ms(1), &weights(&before));
        assert_eq!(online.online_stake_total(), Amount::new(300));

        // Delegations changed; the incremental total is now stale.
        let after = [(rep(1), 150u128), (rep(2), 250u128)];
        online.recalculate_stake(&weights(&after));
        assert_eq!(online.online_stake_total(), Amount::new(400));

        // Invariant: total equals the sum over the surviving set.
        let expected: u128 = online
            .list()
            .iter()
            .map(|r| weights(&after)(r).raw())
            .sum();
        assert_eq!(online.online_stake_total().raw(), expected);
    }

    #[test]
    fn list_returns_online_accounts() {
        let mut online = OnlineReps::new(OnlineReps::DEFAULT_CUTOFF_MS, Amount::ZERO);
        let table = [(rep(1), 10u128), (rep(2), 20u128)];
        online.vote(rep(1), ms(0), &weights(&table));
        online.vote(rep(2), ms(1), &weights(&table));
        let mut list = online.list();
        list.sort();
        assert_eq!(list, vec![rep(1), rep(2)]);
    }
}
