//! The bounded worker pool: at most `max_threads` execution contexts, reused across
//! requests, with idle workers reaped after `thread_keepalive`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Notify;

/// One reusable execution context. Carries no state of its own today, since the sandbox is
/// created fresh per request, but exists as a distinct type so the free list has
/// something concrete to hand out and reap by age.
pub struct Worker {
    pub id: u64,
    last_released_at: Instant,
}

struct Inner {
    free: Mutex<VecDeque<Worker>>,
    live: AtomicUsize,
    next_id: AtomicUsize,
    notify: Notify,
    max_threads: usize,
    min_threads: usize,
    thread_keepalive: Duration,
}

/// A bounded pool of workers. Internals: a `Mutex`-guarded free list, an `AtomicUsize` live
/// count, and a `Notify` for wake-on-release, realizing the "shared mutable free-list with
/// condition variables" pattern as native async primitives rather than a literal channel.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<Inner>,
}

impl WorkerPool {
    pub fn new(max_threads: usize, min_threads: usize, thread_keepalive: Duration) -> WorkerPool {
        WorkerPool {
            inner: Arc::new(Inner {
                free: Mutex::new(VecDeque::new()),
                live: AtomicUsize::new(0),
                next_id: AtomicUsize::new(0),
                notify: Notify::new(),
                max_threads,
                min_threads,
                thread_keepalive,
            }),
        }
    }

    /// Acquires a worker, suspending (never blocking a thread) while the pool is
    /// saturated. This runs as an ordinary async task per connection, so suspension here
    /// never stalls the acceptor's ability to service other connections.
    pub async fn acquire(&self) -> WorkerLease {
        loop {
            if let Some(worker) = self.inner.free.lock().unwrap().pop_back() {
                return WorkerLease {
                    worker: Some(worker),
                    pool: self.clone(),
                };
            }
            let live = self.inner.live.load(Ordering::SeqCst);
            if live < self.inner.max_threads {
                if self
                    .inner
                    .live
                    .compare_exchange(live, live + 1, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) as u64;
                    tracing::debug!(worker_id = id, "created new worker");
                    return WorkerLease {
                        worker: Some(Worker {
                            id,
                            last_released_at: Instant::now(),
                        }),
                        pool: self.clone(),
                    };
                }
                continue;
            }
            self.inner.notify.notified().await;
        }
    }

    fn release(&self, mut worker: Worker) {
        worker.last_released_at = Instant::now();
        self.inner.free.lock().unwrap().push_back(worker);
        self.inner.notify.notify_one();
        self.reap();
    }

    /// Opportunistic reclamation, run after every release: drops free workers older than
    /// `thread_keepalive`, while always keeping at least `min_threads` alive in total.
    fn reap(&self) {
        let mut free = self.inner.free.lock().unwrap();
        let now = Instant::now();
        let live = self.inner.live.load(Ordering::SeqCst);
        let mut reclaimable = live.saturating_sub(self.inner.min_threads);
        if reclaimable == 0 {
            return;
        }
        let mut i = 0;
        while i < free.len() && reclaimable > 0 {
            if now.duration_since(free[i].last_released_at) >= self.inner.thread_keepalive {
                free.remove(i);
                self.inner.live.fetch_sub(1, Ordering::SeqCst);
                reclaimable -= 1;
            } else {
                i += 1;
            }
        }
    }

    #[cfg(test)]
    fn live_count(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    fn free_count(&self) -> usize {
        self.inner.free.lock().unwrap().len()
    }
}

/// An RAII lease on a `Worker`. Dropping it releases the worker back to the pool, so a
/// worker task that panics or returns early still frees its slot.
pub struct WorkerLease {
    worker: Option<Worker>,
    pool: WorkerPool,
}

impl WorkerLease {
    pub fn id(&self) -> u64 {
        self.worker.as_ref().expect("worker present until drop").id
    }
}

impl Drop for WorkerLease {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.pool.release(worker);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_creates_up_to_max() {
        let pool = WorkerPool::new(2, 0, Duration::from_secs(60));
        let a = pool.acquire().await;
        let b = pool.acquire().await;
        assert_eq!(pool.live_count(), 2);
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn release_returns_worker_to_free_list() {
        let pool = WorkerPool::new(2, 0, Duration::from_secs(60));
        let lease = pool.acquire().await;
        let id = lease.id();
        drop(lease);
        assert_eq!(pool.free_count(), 1);
        let reused = pool.acquire().await;
        assert_eq!(reused.id(), id);
    }

    #[tokio::test]
    async fn acquire_suspends_until_release_when_saturated() {
        let pool = WorkerPool::new(1, 0, Duration::from_secs(60));
        let lease = pool.acquire().await;
        let pool2 = pool.clone();
        let handle = tokio::spawn(async move { pool2.acquire().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        drop(lease);
        let second = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("did not deadlock")
            .unwrap();
        assert_eq!(pool.live_count(), 1);
        drop(second);
    }

    #[tokio::test]
    async fn reap_keeps_min_threads_alive() {
        let pool = WorkerPool::new(4, 1, Duration::from_millis(0));
        let a = pool.acquire().await;
        let b = pool.acquire().await;
        drop(a);
        drop(b);
        assert_eq!(pool.live_count(), 1);
    }
}
