// Copyright 2025 Dustin McAfee
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Compression worker pool.
//!
//! A fixed set of worker threads executes index-addressed jobs: a
//! dispatch hands the pool a closure and a count `n`, and each worker
//! repeatedly claims the next index in `[0, n)` from an atomic counter
//! until the range is exhausted. Dispatch blocks until a completion
//! counter reaches `n` (barrier-style), so the closure may freely borrow
//! the caller's stack.
//!
//! Workers are identified by a slot index, letting callers keep
//! per-worker scratch (the compressor's match table) without sharing.
//! If no worker thread could be spawned the pool degrades to inline
//! single-threaded execution on the dispatching thread.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, warn};

/// Erased job closure. The fat pointer is only dereferenced while the
/// originating `dispatch` call is still blocked on the barrier.
#[derive(Clone, Copy)]
struct RawJob(*const (dyn Fn(usize, usize) + Sync));

// SAFETY: the referent is `Sync` and outlives every dereference (the
// dispatcher blocks until `completed == n`, and stale claims bail out on
// the per-job counters before touching the pointer).
unsafe impl Send for RawJob {}
unsafe impl Sync for RawJob {}

/// One dispatched job with its own claim and completion counters, so a
/// worker that wakes late can only drain an exhausted range.
struct Job {
    f: RawJob,
    n: usize,
    next: AtomicUsize,
    completed: AtomicUsize,
}

struct State {
    job: Option<Arc<Job>>,
    seq: u64,
    shutdown: bool,
}

struct Shared {
    state: Mutex<State>,
    wake: Condvar,
    done: Condvar,
}

/// Fixed-size pool of compression workers.
///
/// Only one thread may call [`dispatch`](WorkerPool::dispatch) at a time;
/// in this crate that is the send thread.
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Default worker count: `max(1, min(16, online_cpus / 2))`.
    pub fn default_workers() -> usize {
        let online = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        (online / 2).clamp(1, 16)
    }

    /// Spawn `threads` workers. Spawn failure is not fatal: the pool
    /// keeps whatever threads came up, and with none it runs jobs inline.
    pub fn new(threads: usize) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                job: None,
                seq: 0,
                shutdown: false,
            }),
            wake: Condvar::new(),
            done: Condvar::new(),
        });
        let mut workers = Vec::with_capacity(threads);
        for slot in 0..threads {
            let shared = Arc::clone(&shared);
            match thread::Builder::new()
                .name(format!("compress-{slot}"))
                .spawn(move || worker_loop(&shared, slot))
            {
                Ok(h) => workers.push(h),
                Err(e) => {
                    warn!("worker {slot} failed to spawn, continuing with {}: {e}", workers.len());
                    break;
                }
            }
        }
        debug!("worker pool running with {} threads", workers.len());
        WorkerPool { shared, workers }
    }

    /// Number of worker slots callers should provision scratch for: the
    /// dispatching thread claims indices as slot 0 and each spawned
    /// worker as `1 + its index`. At least 1 (the inline fallback).
    pub fn slots(&self) -> usize {
        self.workers.len() + 1
    }

    /// Run `f(index, worker_slot)` for every index in `[0, n)` across the
    /// pool and block until all have completed.
    pub fn dispatch(&self, n: usize, f: &(dyn Fn(usize, usize) + Sync)) {
        if n == 0 {
            return;
        }
        if self.workers.is_empty() {
            for i in 0..n {
                f(i, 0);
            }
            return;
        }
        // SAFETY: the borrow of `f` is erased to 'static but this call
        // does not return until `completed == n`, after which no worker
        // dereferences the pointer again.
        let raw = RawJob(unsafe {
            std::mem::transmute::<
                &(dyn Fn(usize, usize) + Sync),
                &'static (dyn Fn(usize, usize) + Sync),
            >(f) as *const _
        });
        let job = Arc::new(Job {
            f: raw,
            n,
            next: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        });
        {
            let mut st = self.shared.state.lock().unwrap();
            st.job = Some(Arc::clone(&job));
            st.seq += 1;
            self.shared.wake.notify_all();
        }
        // The dispatching thread pulls indices too rather than idling.
        run_job(&self.shared, &job, 0);
        let mut st = self.shared.state.lock().unwrap();
        while job.completed.load(Ordering::Acquire) < n {
            st = self.shared.done.wait(st).unwrap();
        }
        st.job = None;
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        {
            let mut st = self.shared.state.lock().unwrap();
            st.shutdown = true;
            self.shared.wake.notify_all();
        }
        for h in self.workers.drain(..) {
            let _ = h.join();
        }
    }
}

fn worker_loop(shared: &Shared, slot: usize) {
    let mut last_seq = 0u64;
    loop {
        let job = {
            let mut st = shared.state.lock().unwrap();
            loop {
                if st.shutdown {
                    return;
                }
                if st.seq != last_seq {
                    last_seq = st.seq;
                    if let Some(job) = st.job.as_ref() {
                        break Arc::clone(job);
                    }
                }
                st = shared.wake.wait(st).unwrap();
            }
        };
        run_job(shared, &job, slot + 1);
    }
}

/// Claim and run indices until the job range is exhausted.
fn run_job(shared: &Shared, job: &Job, slot: usize) {
    loop {
        let i = job.next.fetch_add(1, Ordering::Relaxed);
        if i >= job.n {
            return;
        }
        // SAFETY: `i < n`, so the dispatcher is still blocked on the
        // barrier and the closure is alive.
        unsafe { (*job.f.0)(i, slot) };
        let done = job.completed.fetch_add(1, Ordering::AcqRel) + 1;
        if done == job.n {
            let _guard = shared.state.lock().unwrap();
            shared.done.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn dispatch_covers_every_index_once() {
        let pool = WorkerPool::new(4);
        let hits: Vec<AtomicU32> = (0..1000).map(|_| AtomicU32::new(0)).collect();
        pool.dispatch(hits.len(), &|i, _slot| {
            hits[i].fetch_add(1, Ordering::Relaxed);
        });
        assert!(hits.iter().all(|h| h.load(Ordering::Relaxed) == 1));
    }

    #[test]
    fn inline_fallback_with_zero_workers() {
        let pool = WorkerPool::new(0);
        assert_eq!(pool.slots(), 1);
        let hits: Vec<AtomicU32> = (0..17).map(|_| AtomicU32::new(0)).collect();
        pool.dispatch(hits.len(), &|i, slot| {
            assert_eq!(slot, 0);
            hits[i].fetch_add(1, Ordering::Relaxed);
        });
        assert!(hits.iter().all(|h| h.load(Ordering::Relaxed) == 1));
    }

    #[test]
    fn slots_bound_worker_ids() {
        let pool = WorkerPool::new(3);
        let max_slot = AtomicUsize::new(0);
        pool.dispatch(64, &|_i, slot| {
            max_slot.fetch_max(slot, Ordering::Relaxed);
        });
        assert!(max_slot.load(Ordering::Relaxed) < pool.slots());
    }

    #[test]
    fn consecutive_dispatches_reuse_the_pool() {
        let pool = WorkerPool::new(2);
        for round in 0..10usize {
            let sum = AtomicUsize::new(0);
            pool.dispatch(round + 1, &|i, _| {
                sum.fetch_add(i + 1, Ordering::Relaxed);
            });
            assert_eq!(sum.load(Ordering::Relaxed), (round + 1) * (round + 2) / 2);
        }
    }

    #[test]
    fn default_worker_count_is_bounded() {
        let n = WorkerPool::default_workers();
        assert!((1..=16).contains(&n));
    }
}
