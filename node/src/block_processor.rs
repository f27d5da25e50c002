//! Block processing queue.
//!
//! A bounded FIFO with a priority lane for forced blocks (fork-winner
//! replacement). The single worker thread drains batches and hands each
//! block to the node's dispatch routine, making the worker the only ledger
//! writer in the process. Queue membership is deduplicated by hash so a
//! block flooding in from many peers reaches the ledger oracle once.

use chratos_ledger::{validate_work, Block};
use chratos_types::{BlockHash, Timestamp};
use std::collections::{HashSet, VecDeque};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Maximum blocks drained per batch.
const BATCH_MAX: usize = 16_384;
/// Queue depth at which `full()` reports backpressure.
const FULL_THRESHOLD: usize = 16_384;
/// Upper bound on one batch's duration, so the writer cannot starve
/// readers of the ledger.
const TRANSACTION_TIMEOUT: Duration = Duration::from_millis(500);

struct ProcessorState {
    blocks: VecDeque<(Block, Timestamp)>,
    forced: VecDeque<Block>,
    hashes: HashSet<BlockHash>,
    active: bool,
    stopped: bool,
}

impl ProcessorState {
    fn have_blocks(&self) -> bool {
        !self.blocks.is_empty() || !self.forced.is_empty()
    }
}

/// One queued unit of work for the dispatch routine.
pub struct BlockItem {
    pub block: Block,
    pub origination: Timestamp,
    pub forced: bool,
}

/// Serialized block intake for the ledger.
pub struct BlockProcessor {
    state: Mutex<ProcessorState>,
    condition: Condvar,
    work_threshold: u64,
}

impl BlockProcessor {
    pub fn new(work_threshold: u64) -> Self {
        Self {
            state: Mutex::new(ProcessorState {
                blocks: VecDeque::new(),
                forced: VecDeque::new(),
                hashes: HashSet::new(),
                active: false,
                stopped: false,
            }),
            condition: Condvar::new(),
            work_threshold,
        }
    }

    /// Enqueue a block for processing. The caller must have screened the
    /// proof-of-work already; an invalid nonce here is a programmer error.
    /// Duplicates already queued (by hash) are ignored.
    pub fn add(&self, block: Block, origination: Timestamp) {
        debug_assert!(
            validate_work(&block.root(), block.work(), self.work_threshold),
            "block with invalid work offered to the processor"
        );
        if !validate_work(&block.root(), block.work(), self.work_threshold) {
            return;
        }
        let mut state = self.state.lock().unwrap();
        if state.stopped {
            return;
        }
        let hash = block.hash();
        if state.hashes.contains(&hash) {
            return;
        }
        state.hashes.insert(hash);
        state.blocks.push_back((block, origination));
        self.condition.notify_all();
    }

    /// Enqueue a block ahead of normal traffic; used to replace a fork
    /// loser with the election winner.
    pub fn force(&self, block: Block) {
        let mut state = self.state.lock().unwrap();
        if state.stopped {
            return;
        }
        state.forced.push_back(block);
        self.condition.notify_all();
    }

    /// Whether the queue is deep enough that callers should shed load.
    pub fn full(&self) -> bool {
        self.state.lock().unwrap().blocks.len() > FULL_THRESHOLD
    }

    pub fn len(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.blocks.len() + state.forced.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.state.lock().unwrap().have_blocks()
    }

    /// Block until the queue is empty and no batch is mid-flight.
    pub fn flush(&self) {
        let mut state = self.state.lock().unwrap();
        while !state.stopped && (state.active || state.have_blocks()) {
            state = self.condition.wait(state).unwrap();
        }
    }

    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        state.stopped = true;
        self.condition.notify_all();
    }

    /// Worker loop: drains batches, invoking `dispatch` for every block.
    /// Forced blocks are drained before normal ones; each batch is bounded
    /// by [`BATCH_MAX`] items and [`TRANSACTION_TIMEOUT`] wall time.
    pub fn run(&self, dispatch: impl Fn(BlockItem)) {
        let mut state = self.state.lock().unwrap();
        while !state.stopped {
            if state.have_blocks() {
                state.active = true;
                let deadline = Instant::now() + TRANSACTION_TIMEOUT;
                let mut count = 0usize;
                while state.have_blocks() && count < BATCH_MAX && Instant::now() < deadline {
                    let item = if let Some(block) = state.forced.pop_front() {
                        BlockItem {
                            block,
                            origination: Timestamp::now(),
                            forced: true,
                        }
                    } else {
                        let (block, origination) = state.blocks.pop_front().expect("have_blocks");
                        state.hashes.remove(&block.hash());
                        BlockItem {
                            block,
                            origination,
                            forced: false,
                        }
                    };
                    drop(state);
                    dispatch(item);
                    state = self.state.lock().unwrap();
                    count += 1;
                }
                state.active = false;
                self.condition.notify_all();
            } else {
                state = self.condition.wait(state).unwrap();
            }
        }
        // Unblock any flush() waiting on shutdown.
        self.condition.notify_all();
    }
}
