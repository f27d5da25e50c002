//! Timer service.
//!
//! A min-heap of (wakeup, task) drained by a dedicated thread. Components
//! schedule one-shot callbacks with [`Alarm::add`]; recurring maintenance
//! re-arms itself from inside its own callback through a weak node handle.
//! `stop()` cancels everything still pending.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

type Task = Box<dyn FnOnce() + Send>;

struct Operation {
    wakeup: Instant,
    /// Tie-breaker preserving insertion order for equal wakeups.
    sequence: u64,
    task: Task,
}

impl PartialEq for Operation {
    fn eq(&self, other: &Self) -> bool {
        self.wakeup == other.wakeup && self.sequence == other.sequence
    }
}

impl Eq for Operation {}

impl PartialOrd for Operation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Operation {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want the earliest wakeup.
        other
            .wakeup
            .cmp(&self.wakeup)
            .then(other.sequence.cmp(&self.sequence))
    }
}

struct AlarmState {
    operations: BinaryHeap<Operation>,
    next_sequence: u64,
    stopped: bool,
}

/// Shared timer queue with a worker thread.
pub struct Alarm {
    state: Mutex<AlarmState>,
    condition: Condvar,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Alarm {
    pub fn new() -> Arc<Self> {
        let alarm = Arc::new(Self {
            state: Mutex::new(AlarmState {
                operations: BinaryHeap::new(),
                next_sequence: 0,
                stopped: false,
            }),
            condition: Condvar::new(),
            thread: Mutex::new(None),
        });
        let runner = alarm.clone();
        let handle = std::thread::Builder::new()
            .name("alarm".to_string())
            .spawn(move || runner.run())
            .expect("failed to spawn alarm thread");
        *alarm.thread.lock().unwrap() = Some(handle);
        alarm
    }

    /// Schedule `task` to run at `wakeup`.
    pub fn add(&self, wakeup: Instant, task: impl FnOnce() + Send + 'static) {
        let mut state = self.state.lock().unwrap();
        if state.stopped {
            return;
        }
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.operations.push(Operation {
            wakeup,
            sequence,
            task: Box::new(task),
        });
        self.condition.notify_all();
    }

    fn run(&self) {
        let mut state = self.state.lock().unwrap();
        while !state.stopped {
            let now = Instant::now();
            match state.operations.peek() {
                Some(operation) if operation.wakeup <= now => {
                    let operation = state.operations.pop().expect("peeked");
                    drop(state);
                    (operation.task)();
                    state = self.state.lock().unwrap();
                }
                Some(operation) => {
                    let wait = operation.wakeup - now;
                    let (guard, _) = self
                        .condition
                        .wait_timeout(state, wait)
                        .expect("alarm mutex poisoned");
                    state = guard;
                }
                None => {
                    state = self.condition.wait(state).expect("alarm mutex poisoned");
                }
            }
        }
    }

    /// Cancel pending tasks and join the worker.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock().unwrap();
            state.stopped = true;
            state.operations.clear();
            self.condition.notify_all();
        }
        if let Some(handle) = self.thread.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    /// Number of tasks still queued.
    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().operations.len()
    }
}
