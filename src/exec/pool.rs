// src/exec/pool.rs

//! Worker pool that hands a freed worker to the highest-priority waiter.
//!
//! Waiters with equal priority are served in arrival order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

/// A fixed number of workers shared by every step of one named queue.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    state: Arc<Mutex<PoolState>>,
}

#[derive(Debug)]
struct PoolState {
    free: usize,
    next_seq: u64,
    waiters: BinaryHeap<Waiter>,
}

#[derive(Debug)]
struct Waiter {
    priority: i64,
    seq: u64,
    tx: oneshot::Sender<WorkerPermit>,
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Waiter {}

impl Ord for Waiter {
    /// Max-heap order: higher priority first, then earlier arrival.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A claimed worker. Dropping it frees the worker.
#[derive(Debug)]
pub struct WorkerPermit {
    state: Option<Arc<Mutex<PoolState>>>,
}

impl Drop for WorkerPermit {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            release(&state);
        }
    }
}

fn lock(state: &Mutex<PoolState>) -> MutexGuard<'_, PoolState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Pass a freed worker to the best live waiter, or return it to the pool.
fn release(state: &Arc<Mutex<PoolState>>) {
    let mut guard = lock(state);
    while let Some(waiter) = guard.waiters.pop() {
        let permit = WorkerPermit {
            state: Some(Arc::clone(state)),
        };
        match waiter.tx.send(permit) {
            Ok(()) => return,
            // Waiter gave up (revoked). Disarm so the drop does not release.
            Err(mut permit) => permit.state = None,
        }
    }
    guard.free += 1;
}

impl WorkerPool {
    /// `workers` is clamped to at least 1.
    pub fn new(workers: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(PoolState {
                free: workers.max(1),
                next_seq: 0,
                waiters: BinaryHeap::new(),
            })),
        }
    }

    /// Wait for a free worker. Returns `None` if the pool went away.
    ///
    /// Dropping the returned future before it resolves abandons the place in
    /// line; a worker handed to it afterwards goes back to the pool.
    pub async fn acquire(&self, priority: i64) -> Option<WorkerPermit> {
        let rx = {
            let mut guard = lock(&self.state);
            if guard.free > 0 {
                guard.free -= 1;
                return Some(WorkerPermit {
                    state: Some(Arc::clone(&self.state)),
                });
            }
            let (tx, rx) = oneshot::channel();
            let seq = guard.next_seq;
            guard.next_seq += 1;
            guard.waiters.push(Waiter { priority, seq, tx });
            rx
        };
        rx.await.ok()
    }

    /// Workers not currently claimed.
    pub fn available(&self) -> usize {
        lock(&self.state).free
    }
}
