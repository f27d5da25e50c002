//! Vote processing queue.
//!
//! A FIFO of (vote, sender) pairs drained by a single worker thread. The
//! dispatch routine validates the signature, checks for sequence replays,
//! feeds the elections engine, and emits the amplification-safe replay
//! reply.

use chratos_ledger::Vote;
use chratos_types::Endpoint;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// Disposition of one processed vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteCode {
    /// Bad signature or malformed vote.
    Invalid,
    /// Sequence did not advance anywhere.
    Replay,
    /// Fresh vote; observers were notified.
    Vote,
}

struct VoteQueue {
    votes: VecDeque<(Vote, Endpoint)>,
    active: bool,
    stopped: bool,
}

/// Serialized intake for incoming votes.
pub struct VoteProcessor {
    state: Mutex<VoteQueue>,
    condition: Condvar,
}

impl Default for VoteProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl VoteProcessor {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(VoteQueue {
                votes: VecDeque::new(),
                active: false,
                stopped: false,
            }),
            condition: Condvar::new(),
        }
    }

    /// Enqueue a vote received from `endpoint`.
    pub fn vote(&self, vote: Vote, endpoint: Endpoint) {
        let mut state = self.state.lock().unwrap();
        if state.stopped {
            return;
        }
        state.votes.push_back((vote, endpoint));
        self.condition.notify_all();
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().unwrap().votes.is_empty()
    }

    /// Block until the queue is empty and no drain is mid-flight.
    pub fn flush(&self) {
        let mut state = self.state.lock().unwrap();
        while !state.stopped && (state.active || !state.votes.is_empty()) {
            state = self.condition.wait(state).unwrap();
        }
    }

    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        state.stopped = true;
        self.condition.notify_all();
    }

    /// Worker loop: swap out the queued votes and dispatch them in order.
    pub fn run(&self, dispatch: impl Fn(Vote, Endpoint) -> VoteCode) {
        let mut state = self.state.lock().unwrap();
        while !state.stopped {
            if !state.votes.is_empty() {
                let mut batch = VecDeque::new();
                std::mem::swap(&mut batch, &mut state.votes);
                state.active = true;
                drop(state);
                for (vote, endpoint) in batch {
                    dispatch(vote, endpoint);
                }
                state = self.state.lock().unwrap();
                state.active = false;
                self.condition.notify_all();
            } else {
                state = self.condition.wait(state).unwrap();
            }
        }
        self.condition.notify_all();
    }
}
