//! Local proof-of-work pool.
//!
//! A fixed set of worker threads cooperates on one job at a time: each scans
//! nonces from a random offset and the first hit wins. Remaining threads
//! observe the completion flag between batches and move on. Jobs queue FIFO;
//! `cancel` resolves a job with `None` without wasting further cycles on it.

use rand::{Rng, SeedableRng};
use raze_types::BlockHash;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use crate::work_value;

/// Nonces scanned between completion-flag checks.
const BATCH: u64 = 4096;

type Callback = Box<dyn FnOnce(Option<u64>) + Send>;

struct Job {
    id: u64,
    root: BlockHash,
    threshold: u64,
    completed: Arc<AtomicBool>,
    callback: Option<Callback>,
}

#[derive(Default)]
struct PoolState {
    jobs: VecDeque<Job>,
    stopped: bool,
}

struct Shared {
    state: Mutex<PoolState>,
    condition: Condvar,
}

/// Threaded nonce search, one job at a time, first hit wins.
pub struct WorkPool {
    shared: Arc<Shared>,
    threads: Mutex<Vec<thread::JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl WorkPool {
    /// Spin up `count` worker threads (typically one per hardware thread).
    pub fn new(count: usize) -> Arc<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState::default()),
            condition: Condvar::new(),
        });
        let pool = Arc::new(Self {
            shared: shared.clone(),
            threads: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        });
        let mut threads = pool.threads.lock().unwrap_or_else(|e| e.into_inner());
        for index in 0..count.max(1) {
            let shared = shared.clone();
            threads.push(
                thread::Builder::new()
                    .name(format!("work {index}"))
                    .spawn(move || worker_loop(shared, index as u64))
                    .expect("spawning a named thread only fails on OOM"),
            );
        }
        drop(threads);
        pool
    }

    /// Queue a generation request; `callback` fires with the nonce, or with
    /// `None` if the job is cancelled or the pool stops.
    pub fn generate(&self, root: BlockHash, threshold: u64, callback: impl FnOnce(Option<u64>) + Send + 'static) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.stopped {
            drop(state);
            callback(None);
            return;
        }
        state.jobs.push_back(Job {
            id,
            root,
            threshold,
            completed: Arc::new(AtomicBool::new(false)),
            callback: Some(Box::new(callback)),
        });
        self.shared.condition.notify_all();
    }

    /// Generate synchronously on the calling thread's behalf.
    pub fn generate_blocking(&self, root: BlockHash, threshold: u64) -> Option<u64> {
        let (tx, rx) = std::sync::mpsc::channel();
        self.generate(root, threshold, move |nonce| {
            let _ = tx.send(nonce);
        });
        rx.recv().ok().flatten()
    }

    /// Abandon any queued or in-flight job for `root`; its callback resolves
    /// with `None`.
    pub fn cancel(&self, root: &BlockHash) {
        let mut cancelled = Vec::new();
        {
            let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
            let mut index = 0;
            while index < state.jobs.len() {
                if state.jobs[index].root == *root {
                    let mut job = state.jobs.remove(index).expect("index checked");
                    job.completed.store(true, Ordering::SeqCst);
                    if let Some(callback) = job.callback.take() {
                        cancelled.push(callback);
                    }
                } else {
                    index += 1;
                }
            }
        }
        for callback in cancelled {
            callback(None);
        }
    }

    /// Stop the pool: pending jobs resolve with `None`, threads join.
    pub fn stop(&self) {
        let mut pending = Vec::new();
        {
            let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.stopped {
                return;
            }
            state.stopped = true;
            while let Some(mut job) = state.jobs.pop_front() {
                job.completed.store(true, Ordering::SeqCst);
                if let Some(callback) = job.callback.take() {
                    pending.push(callback);
                }
            }
            self.shared.condition.notify_all();
        }
        for callback in pending {
            callback(None);
        }
        let mut threads = self.threads.lock().unwrap_or_else(|e| e.into_inner());
        for handle in threads.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(shared: Arc<Shared>, thread_index: u64) {
    let mut rng = rand::rngs::StdRng::from_entropy();
    loop {
        // Snapshot the front job, or sleep until one arrives.
        let (id, root, threshold, completed) = {
            let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
            loop {
                if state.stopped {
                    return;
                }
                if let Some(job) = state.jobs.front() {
                    break (job.id, job.root, job.threshold, job.completed.clone());
                }
                state = shared
                    .condition
                    .wait(state)
                    .unwrap_or_else(|e| e.into_inner());
            }
        };

        let mut nonce: u64 = rng.gen::<u64>().wrapping_add(thread_index);
        while !completed.load(Ordering::SeqCst) {
            let mut found = None;
            for _ in 0..BATCH {
                if work_value(&root, nonce) >= threshold {
                    found = Some(nonce);
                    break;
                }
                nonce = nonce.wrapping_add(1);
            }
            if let Some(nonce) = found {
                if !completed.swap(true, Ordering::SeqCst) {
                    let callback = {
                        let mut state =
                            shared.state.lock().unwrap_or_else(|e| e.into_inner());
                        match state.jobs.front_mut() {
                            Some(job) if job.id == id => {
                                let callback = job.callback.take();
                                state.jobs.pop_front();
                                shared.condition.notify_all();
                                callback
                            }
                            _ => None,
                        }
                    };
                    if let Some(callback) = callback {
                        callback(Some(nonce));
                    }
                }
                break;
            }
        }
        // Job finished or cancelled; make sure it left the queue before the
        // next iteration picks a job.
        let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(job) = state.jobs.front() {
            if job.id == id && job.completed.load(Ordering::SeqCst) {
                state.jobs.pop_front();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raze_types::NetworkId;

    const TEST_THRESHOLD: u64 = 0xff00_0000_0000_0000;

    #[test]
    fn test_threshold_matches_network() {
        assert_eq!(TEST_THRESHOLD, NetworkId::Test.work_threshold());
    }

    #[test]
    fn blocking_generation_meets_threshold() {
        let pool = WorkPool::new(2);
        let root = BlockHash::new([1u8; 32]);
        let nonce = pool.generate_blocking(root, TEST_THRESHOLD).unwrap();
        assert!(crate::work_validate(&root, nonce, TEST_THRESHOLD));
        pool.stop();
    }

    #[test]
    fn async_callback_fires() {
        let pool = WorkPool::new(2);
        let root = BlockHash::new([2u8; 32]);
        let (tx, rx) = std::sync::mpsc::channel();
        pool.generate(root, TEST_THRESHOLD, move |nonce| {
            let _ = tx.send(nonce);
        });
        let nonce = rx
            .recv_timeout(std::time::Duration::from_secs(30))
            .unwrap()
            .unwrap();
        assert!(crate::work_validate(&root, nonce, TEST_THRESHOLD));
        pool.stop();
    }

    #[test]
    fn stop_resolves_pending_jobs_with_none() {
        let pool = WorkPool::new(1);
        // An impossible job keeps the worker busy scanning.
        let (tx, rx) = std::sync::mpsc::channel();
        pool.generate(BlockHash::new([3u8; 32]), u64::MAX, move |nonce| {
            let _ = tx.send(nonce);
        });
        pool.stop();
        assert_eq!(
            rx.recv_timeout(std::time::Duration::from_secs(30)).unwrap(),
            None
        );
    }

    #[test]
    fn cancel_resolves_queued_job() {
        let pool = WorkPool::new(1);
        let root = BlockHash::new([4u8; 32]);
        // Occupy the single worker with an impossible job, then queue and
        // cancel a second one.
        pool.generate(BlockHash::new([5u8; 32]), u64::MAX, |_| {});
        let (tx, rx) = std::sync::mpsc::channel();
        pool.generate(root, TEST_THRESHOLD, move |nonce| {
            let _ = tx.send(nonce);
        });
        pool.cancel(&root);
        assert_eq!(
            rx.recv_timeout(std::time::Duration::from_secs(30)).unwrap(),
            None
        );
        pool.stop();
    }

    #[test]
    fn stop_is_idempotent() {
        let pool = WorkPool::new(1);
        pool.stop();
        pool.stop();
    }
}
