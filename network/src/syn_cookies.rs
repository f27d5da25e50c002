//! SYN-cookie handshake table.
//!
//! Binding an endpoint to a node identity: we hand the endpoint a one-time
//! random 32-byte challenge, and the peer proves its claimed node id by
//! signing the challenge with the matching key. Cookies are capped per IP
//! so one address cannot exhaust the table, and validation consumes the
//! cookie so a captured response cannot be replayed.

use crate::peer_set::MAX_PEERS_PER_IP;
use chratos_crypto::verify_signature;
use chratos_types::{Account, Endpoint, PublicKey, Signature, Timestamp};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::net::Ipv6Addr;

struct CookieInfo {
    cookie: [u8; 32],
    created_at: Timestamp,
}

/// Outstanding handshake challenges.
pub struct SynCookieTable {
    cookies: HashMap<Endpoint, CookieInfo>,
    cookies_per_ip: HashMap<Ipv6Addr, usize>,
    rng: StdRng,
}

impl SynCookieTable {
    /// Cookies older than this are purged.
    pub const CUTOFF_MS: u64 = 5_000;

    pub fn new() -> Self {
        Self::with_seed(rand::rngs::OsRng.gen())
    }

    /// Deterministic construction for tests.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self {
            cookies: HashMap::new(),
            cookies_per_ip: HashMap::new(),
            rng: StdRng::from_seed(seed),
        }
    }

    /// Issue a challenge for `endpoint`. Returns `None` when the endpoint
    /// already holds one or its IP is at the cookie cap.
    pub fn assign(&mut self, endpoint: Endpoint, now: Timestamp) -> Option<[u8; 32]> {
        let ip = endpoint.ip();
        let ip_cookies = self.cookies_per_ip.entry(ip).or_insert(0);
        if *ip_cookies >= MAX_PEERS_PER_IP {
            return None;
        }
        if self.cookies.contains_key(&endpoint) {
            return None;
        }
        let cookie: [u8; 32] = self.rng.gen();
        *ip_cookies += 1;
        self.cookies.insert(
            endpoint,
            CookieInfo {
                cookie,
                created_at: now,
            },
        );
        Some(cookie)
    }

    /// Validate a handshake response: the signature must cover the stored
    /// cookie under the claimed node id. Success consumes the cookie.
    pub fn validate(&mut self, endpoint: &Endpoint, node_id: Account, signature: &Signature) -> bool {
        let Some(info) = self.cookies.get(endpoint) else {
            return false;
        };
        if !verify_signature(&info.cookie, signature, &PublicKey::from(node_id)) {
            return false;
        }
        self.cookies.remove(endpoint);
        self.decrement_ip(endpoint.ip());
        true
    }

    /// Drop challenges issued before `cutoff`, releasing per-IP capacity.
    pub fn purge(&mut self, cutoff: Timestamp) {
        let stale: Vec<Endpoint> = self
            .cookies
            .iter()
            .filter(|(_, info)| info.created_at < cutoff)
            .map(|(endpoint, _)| *endpoint)
            .collect();
        for endpoint in stale {
            self.cookies.remove(&endpoint);
            self.decrement_ip(endpoint.ip());
        }
    }

    fn decrement_ip(&mut self, ip: Ipv6Addr) {
        match self.cookies_per_ip.get_mut(&ip) {
            Some(count) if *count > 0 => {
                *count -= 1;
                if *count == 0 {
                    self.cookies_per_ip.remove(&ip);
                }
            }
            _ => debug_assert!(false, "more SYN cookies deleted than created for IP"),
        }
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

impl Default for SynCookieTable {
    fn default() -> Self {
        Self::new()
    }
}
