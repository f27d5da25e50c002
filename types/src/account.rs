//! Account identifiers.
//!
//! An account is a 256-bit Ed25519 public key. The all-zero account is the
//! burn account, and doubles as the `not_an_account` sentinel used to seed
//! election vote tables.

use crate::hash::BlockHash;
use crate::keys::PublicKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte account (Ed25519 public key).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Account([u8; 32]);

impl Account {
    /// The burn account / `not_an_account` sentinel.
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Interpret this account as an election root (opening blocks are keyed
    /// by account).
    pub fn into_root(self) -> BlockHash {
        BlockHash::new(self.0)
    }
}

impl From<PublicKey> for Account {
    fn from(key: PublicKey) -> Self {
        Self(key.0)
    }
}

impl From<Account> for PublicKey {
    fn from(account: Account) -> Self {
        PublicKey(account.0)
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Account(")?;
        for b in &self.0[..4] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}
