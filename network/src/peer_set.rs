//! Peer tracking.
//!
//! A keyed table of every reachable peer with contact, representative, and
//! version metadata. Enforces a per-IP cap plus global and per-IP caps for
//! legacy peers (protocol versions predating the node-id handshake), and
//! provides the sampling primitives the rest of the node uses: uniform
//! random sets for keepalive gossip, √N fanout for publishes, top-weight
//! representative lists for confirm_req targeting, and stalest-first lists
//! for representative crawling.

use crate::reserved::reserved_address;
use chratos_types::{Account, Amount, Endpoint, Timestamp};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::net::Ipv6Addr;

/// Maximum peers sharing one IP address.
pub const MAX_PEERS_PER_IP: usize = 10;
/// Maximum pre-handshake peers in total.
pub const MAX_LEGACY_PEERS: usize = 500;
/// Maximum pre-handshake peers per IP.
pub const MAX_LEGACY_PEERS_PER_IP: usize = 5;

/// Everything tracked per peer.
#[derive(Clone, Debug)]
pub struct PeerInfo {
    pub endpoint: Endpoint,
    pub last_contact: Timestamp,
    pub last_attempt: Timestamp,
    pub last_bootstrap_attempt: Timestamp,
    pub last_rep_request: Timestamp,
    pub last_rep_response: Timestamp,
    pub rep_weight: Amount,
    pub probable_rep_account: Account,
    pub network_version: u8,
    pub node_id: Option<Account>,
}

impl PeerInfo {
    fn new(endpoint: Endpoint, version: u8, now: Timestamp) -> Self {
        Self {
            endpoint,
            last_contact: now,
            last_attempt: now,
            last_bootstrap_attempt: Timestamp::EPOCH,
            last_rep_request: Timestamp::EPOCH,
            last_rep_response: Timestamp::EPOCH,
            rep_weight: Amount::ZERO,
            probable_rep_account: Account::ZERO,
            network_version: version,
            node_id: None,
        }
    }
}

/// Result of offering an endpoint to the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertResult {
    /// New peer added.
    Inserted,
    /// Known peer; `last_contact` refreshed.
    Updated,
    /// Reserved/self/over-cap/below-minimum-version endpoint.
    Rejected,
}

/// The peer table.
pub struct PeerSet {
    self_endpoint: Endpoint,
    peers: HashMap<Endpoint, PeerInfo>,
    /// Endpoints we recently sent an unsolicited keepalive to.
    attempts: HashMap<Endpoint, Timestamp>,
    legacy_peers: usize,
    protocol_version_min: u8,
    node_id_version: u8,
    rng: StdRng,
}

impl PeerSet {
    pub fn new(
        self_endpoint: Endpoint,
        protocol_version_min: u8,
        node_id_version: u8,
    ) -> Self {
        Self::with_seed(
            self_endpoint,
            protocol_version_min,
            node_id_version,
            rand::rngs::OsRng.gen(),
        )
    }

    /// Deterministic construction for tests.
    pub fn with_seed(
        self_endpoint: Endpoint,
        protocol_version_min: u8,
        node_id_version: u8,
        seed: [u8; 32],
    ) -> Self {
        Self {
            self_endpoint,
            peers: HashMap::new(),
            attempts: HashMap::new(),
            legacy_peers: 0,
            protocol_version_min,
            node_id_version,
            rng: StdRng::from_seed(seed),
        }
    }

    /// Endpoints we refuse to track: unspecified, reserved, or ourselves.
    pub fn not_a_peer(&self, endpoint: &Endpoint, blacklist_loopback: bool) -> bool {
        endpoint.is_unspecified()
            || reserved_address(endpoint, blacklist_loopback)
            || *endpoint == self.self_endpoint
    }

    /// Offer a peer to the table.
    pub fn insert(&mut self, endpoint: Endpoint, version: u8, now: Timestamp) -> InsertResult {
        if self.not_a_peer(&endpoint, false) || version < self.protocol_version_min {
            return InsertResult::Rejected;
        }
        if let Some(info) = self.peers.get_mut(&endpoint) {
            // Version deliberately left unchanged: a version bump would have
            // to re-run the handshake and re-balance the legacy caps.
            info.last_contact = now;
            return InsertResult::Updated;
        }

        let is_legacy = version < self.node_id_version;
        if is_legacy && self.legacy_peers >= MAX_LEGACY_PEERS {
            return InsertResult::Rejected;
        }

        let ip = endpoint.ip();
        let mut ip_peers = 0usize;
        let mut legacy_ip_peers = 0usize;
        for info in self.peers.values().filter(|p| p.endpoint.ip() == ip) {
            ip_peers += 1;
            if info.network_version < self.node_id_version {
                legacy_ip_peers += 1;
            }
        }
        if ip_peers >= MAX_PEERS_PER_IP || (is_legacy && legacy_ip_peers >= MAX_LEGACY_PEERS_PER_IP)
        {
            return InsertResult::Rejected;
        }

        if is_legacy {
            self.legacy_peers += 1;
        }
        self.peers.insert(endpoint, PeerInfo::new(endpoint, version, now));
        InsertResult::Inserted
    }

    /// Register an inbound contact. Returns `true` when the sender should be
    /// challenged with a node-id handshake: its version supports one, we do
    /// not know it yet, and its IP has headroom.
    pub fn contacted(&mut self, endpoint: Endpoint, version: u8, now: Timestamp) -> bool {
        if version < self.node_id_version {
            self.insert(endpoint, version, now);
            return false;
        }
        if let Some(info) = self.peers.get_mut(&endpoint) {
            info.last_contact = now;
            return false;
        }
        let ip = endpoint.ip();
        let ip_peers = self.peers.values().filter(|p| p.endpoint.ip() == ip).count();
        ip_peers < MAX_PEERS_PER_IP
    }

    pub fn known_peer(&self, endpoint: &Endpoint) -> bool {
        self.peers.contains_key(endpoint)
    }

    /// Record the peer's node identity after a validated handshake.
    pub fn set_node_id(&mut self, endpoint: &Endpoint, node_id: Account) {
        if let Some(info) = self.peers.get_mut(endpoint) {
            info.node_id = Some(node_id);
        }
    }

    /// Whether we should reach out (keepalive) to a gossiped endpoint.
    /// Returns `true` (skip) for invalid endpoints, peers we already know,
    /// and endpoints we already tried; otherwise records the attempt.
    pub fn reachout(&mut self, endpoint: Endpoint, now: Timestamp) -> bool {
        if self.not_a_peer(&endpoint, false) {
            return true;
        }
        if self.known_peer(&endpoint) {
            return true;
        }
        if self.attempts.contains_key(&endpoint) {
            return true;
        }
        self.attempts.insert(endpoint, now);
        false
    }

    /// A uniform random sample of up to `count` endpoints, topped up with
    /// the most recently contacted peers when sampling leaves gaps.
    pub fn random_set(&mut self, count: usize) -> Vec<Endpoint> {
        let mut result: HashSet<Endpoint> = HashSet::with_capacity(count);
        let endpoints: Vec<Endpoint> = self.peers.keys().copied().collect();
        if !endpoints.is_empty() {
            let random_cutoff = count * 2;
            for _ in 0..random_cutoff {
                if result.len() >= count {
                    break;
                }
                let index = self.rng.gen_range(0..endpoints.len());
                result.insert(endpoints[index]);
            }
        }
        if result.len() < count {
            let mut by_contact: Vec<&PeerInfo> = self.peers.values().collect();
            by_contact.sort_by_key(|info| std::cmp::Reverse(info.last_contact));
            for info in by_contact {
                if result.len() >= count {
                    break;
                }
                result.insert(info.endpoint);
            }
        }
        result.into_iter().collect()
    }

    /// Fill a keepalive payload: sampled endpoints, padded with the
    /// unspecified endpoint.
    pub fn random_fill(&mut self, target: &mut [Endpoint]) {
        let sample = self.random_set(target.len());
        for slot in target.iter_mut() {
            *slot = Endpoint::unspecified();
        }
        for (slot, endpoint) in target.iter_mut().zip(sample) {
            *slot = endpoint;
        }
    }

    /// Top `count` representatives by weight (non-zero only).
    pub fn representatives(&self, count: usize) -> Vec<PeerInfo> {
        let mut reps: Vec<PeerInfo> = self
            .peers
            .values()
            .filter(|info| !info.rep_weight.is_zero())
            .cloned()
            .collect();
        reps.sort_by_key(|info| std::cmp::Reverse(info.rep_weight));
        reps.truncate(count);
        reps
    }

    /// Peers most overdue for a representative check, stalest first.
    pub fn rep_crawl(&self, count: usize) -> Vec<Endpoint> {
        let mut peers: Vec<&PeerInfo> = self.peers.values().collect();
        peers.sort_by_key(|info| info.last_rep_request);
        peers.iter().take(count).map(|info| info.endpoint).collect()
    }

    /// Mark that a confirm_req probe was sent to this peer.
    pub fn rep_request(&mut self, endpoint: &Endpoint, now: Timestamp) {
        if let Some(info) = self.peers.get_mut(endpoint) {
            info.last_rep_request = now;
        }
    }

    /// Record a vote response observed from a peer. Returns `true` when the
    /// response upgraded the peer to a (heavier) representative.
    pub fn rep_response(
        &mut self,
        endpoint: &Endpoint,
        rep_account: Account,
        weight: Amount,
        now: Timestamp,
    ) -> bool {
        let Some(info) = self.peers.get_mut(endpoint) else {
            return false;
        };
        info.last_rep_response = now;
        if info.rep_weight < weight {
            info.rep_weight = weight;
            info.probable_rep_account = rep_account;
            return true;
        }
        false
    }

    /// Remove peers whose `last_contact` fell behind `cutoff`; prune stale
    /// reachout attempts; return the survivors.
    pub fn purge(&mut self, cutoff: Timestamp) -> Vec<PeerInfo> {
        let stale: Vec<Endpoint> = self
            .peers
            .values()
            .filter(|info| info.last_contact < cutoff)
            .map(|info| info.endpoint)
            .collect();
        for endpoint in &stale {
            if let Some(info) = self.peers.remove(endpoint) {
                if info.network_version < self.node_id_version {
                    debug_assert!(self.legacy_peers > 0, "legacy peer count underflow");
                    self.legacy_peers = self.legacy_peers.saturating_sub(1);
                }
            }
        }
        self.attempts.retain(|_, attempted| *attempted >= cutoff);
        self.peers.values().cloned().collect()
    }

    /// Sum of representative weights, deduplicated by probable account.
    pub fn total_weight(&self) -> Amount {
        let mut seen: HashSet<Account> = HashSet::new();
        let mut total = Amount::ZERO;
        for info in self.peers.values() {
            if info.rep_weight.is_zero() {
                continue;
            }
            if seen.insert(info.probable_rep_account) {
                total = total.saturating_add(info.rep_weight);
            }
        }
        total
    }

    /// All peer endpoints in random order.
    pub fn list(&mut self) -> Vec<Endpoint> {
        let mut endpoints: Vec<Endpoint> = self.peers.keys().copied().collect();
        for i in (1..endpoints.len()).rev() {
            let j = self.rng.gen_range(0..=i);
            endpoints.swap(i, j);
        }
        endpoints
    }

    /// √N random peers: the publish fanout.
    pub fn list_fanout(&mut self) -> Vec<Endpoint> {
        let count = (self.peers.len() as f64).sqrt().ceil() as usize;
        self.random_set(count)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn get(&self, endpoint: &Endpoint) -> Option<&PeerInfo> {
        self.peers.get(endpoint)
    }

    /// Number of tracked legacy (pre-handshake) peers.
    pub fn legacy_count(&self) -> usize {
        self.legacy_peers
    }
}
