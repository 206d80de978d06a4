//! The alarm scheduler.
//!
//! One thread drains a min-heap of `(wakeup, task)` timers; due tasks are
//! posted onto the tokio runtime so they run on I/O workers, never on the
//! alarm thread itself. Every periodic loop in the node (keepalives, rep
//! crawl, bootstrap retries, election announcements) runs through here.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Instant;
use tokio::runtime::Handle;

type Task = Box<dyn FnOnce() + Send + 'static>;

struct Operation {
    wakeup: Instant,
    /// Insertion order; stabilizes equal wakeups.
    sequence: u64,
    /// `None` terminates the alarm thread.
    task: Option<Task>,
}

// Min-heap on wakeup: reverse the comparison.
impl Ord for Operation {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .wakeup
            .cmp(&self.wakeup)
            .then(other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for Operation {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Operation {
    fn eq(&self, other: &Self) -> bool {
        self.wakeup == other.wakeup && self.sequence == other.sequence
    }
}

impl Eq for Operation {}

#[derive(Default)]
struct AlarmState {
    operations: BinaryHeap<Operation>,
    next_sequence: u64,
}

struct Shared {
    state: Mutex<AlarmState>,
    condition: Condvar,
    runtime: Handle,
}

/// Min-heap timer thread feeding the I/O executor.
pub struct Alarm {
    shared: Arc<Shared>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Alarm {
    pub fn new(runtime: Handle) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(AlarmState::default()),
            condition: Condvar::new(),
            runtime,
        });
        let run_shared = shared.clone();
        let thread = thread::Builder::new()
            .name("alarm".to_string())
            .spawn(move || run(run_shared))
            .expect("spawning a named thread only fails on OOM");
        Self {
            shared,
            thread: Mutex::new(Some(thread)),
        }
    }

    /// Schedule `task` to run at `wakeup`.
    pub fn add(&self, wakeup: Instant, task: impl FnOnce() + Send + 'static) {
        self.push(wakeup, Some(Box::new(task)));
    }

    /// Terminate the alarm thread; tasks already due still run. Idempotent.
    pub fn stop(&self) {
        self.push(Instant::now(), None);
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    fn push(&self, wakeup: Instant, task: Option<Task>) {
        let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.operations.push(Operation {
            wakeup,
            sequence,
            task,
        });
        self.shared.condition.notify_all();
    }
}

fn run(shared: Arc<Shared>) {
    let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
    loop {
        let now = Instant::now();
        match state.operations.peek() {
            Some(operation) if operation.task.is_none() && operation.wakeup <= now => {
                return;
            }
            Some(operation) if operation.wakeup <= now => {
                let operation = state.operations.pop().expect("peeked above");
                if let Some(task) = operation.task {
                    shared.runtime.spawn(async move { task() });
                }
            }
            Some(operation) => {
                let wait = operation.wakeup - now;
                let (next, _) = shared
                    .condition
                    .wait_timeout(state, wait)
                    .unwrap_or_else(|e| e.into_inner());
                state = next;
            }
            None => {
                state = shared
                    .condition
                    .wait(state)
                    .unwrap_or_else(|e| e.into_inner());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn wait_for(flag: &Arc<AtomicUsize>, target: usize) {
        for _ in 0..200 {
            if flag.load(Ordering::SeqCst) >= target {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("alarm task never fired");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn due_task_runs() {
        let alarm = Alarm::new(Handle::current());
        let fired = Arc::new(AtomicUsize::new(0));
        let task_fired = fired.clone();
        alarm.add(Instant::now(), move || {
            task_fired.fetch_add(1, Ordering::SeqCst);
        });
        tokio::task::spawn_blocking(move || wait_for(&fired, 1))
            .await
            .unwrap();
        alarm.stop();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn tasks_fire_in_wakeup_order() {
        let alarm = Alarm::new(Handle::current());
        let order = Arc::new(Mutex::new(Vec::new()));
        let count = Arc::new(AtomicUsize::new(0));

        let now = Instant::now();
        for (label, delay_ms) in [(2u8, 60u64), (1, 20)] {
            let order = order.clone();
            let count = count.clone();
            alarm.add(now + Duration::from_millis(delay_ms), move || {
                order.lock().unwrap().push(label);
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        let waiter = count.clone();
        tokio::task::spawn_blocking(move || wait_for(&waiter, 2))
            .await
            .unwrap();
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
        alarm.stop();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn future_task_does_not_block_stop() {
        let alarm = Alarm::new(Handle::current());
        alarm.add(Instant::now() + Duration::from_secs(3600), || {
            panic!("far-future task must not run");
        });
        alarm.stop();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_is_idempotent() {
        let alarm = Alarm::new(Handle::current());
        alarm.stop();
        alarm.stop();
    }
}
