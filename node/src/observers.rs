//! Typed observer bus.
//!
//! Independent consumers subscribe to block, vote, and endpoint events.
//! Registration happens once at wiring time; there is no unsubscribe and no
//! ordering guarantee between observers. Callbacks must not re-enter the
//! elections container.

use chratos_ledger::{Block, Vote};
use chratos_types::{Account, Amount, Endpoint};
use std::sync::Mutex;

/// One event's list of registered callbacks.
pub struct ObserverList<T> {
    callbacks: Mutex<Vec<Box<dyn Fn(&T) + Send + Sync>>>,
}

impl<T> Default for ObserverList<T> {
    fn default() -> Self {
        Self {
            callbacks: Mutex::new(Vec::new()),
        }
    }
}

impl<T> ObserverList<T> {
    pub fn add(&self, callback: impl Fn(&T) + Send + Sync + 'static) {
        self.callbacks.lock().unwrap().push(Box::new(callback));
    }

    pub fn notify(&self, event: &T) {
        for callback in self.callbacks.lock().unwrap().iter() {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.lock().unwrap().is_empty()
    }
}

/// A confirmed block event.
pub struct BlockEvent {
    pub block: Block,
    pub account: Account,
    pub amount: Amount,
    pub is_send: bool,
}

/// A processed (non-replay) vote event.
pub struct VoteEvent {
    pub vote: Vote,
    pub endpoint: Endpoint,
}

/// All node-level event channels.
#[derive(Default)]
pub struct Observers {
    pub blocks: ObserverList<BlockEvent>,
    pub votes: ObserverList<VoteEvent>,
    pub endpoints: ObserverList<Endpoint>,
    pub disconnect: ObserverList<()>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }
}
