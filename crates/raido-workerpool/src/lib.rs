//! A bounded-size dynamic pool for per-stream tasks (spec §4.4), ported
//! from the original `proxy.WorkerPool`: a bounded task queue, a floor of
//! persistent workers, and burst workers above the floor that exit after
//! sitting idle.
//!
//! Go's `select` over a full channel becomes, here, a `try_send` that
//! falls back to spawning a worker and then blocking on `send`. Go's
//! `time.After` idle-timeout branch of the worker `select` becomes
//! `tokio::time::timeout` around the next `recv`.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinSet;
use tracing::{debug, trace};

pub const DEFAULT_QUEUE_DEPTH: usize = 1000;
pub const DEFAULT_MIN_WORKERS: usize = 2;
pub const DEFAULT_MAX_WORKERS: usize = 100;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

type Task = Pin<Box<dyn Future<Output = ()> + Send>>;

struct Shared {
    min_workers: usize,
    max_workers: usize,
    idle_timeout: Duration,
    active_workers: AtomicUsize,
    stopping: Notify,
}

/// A handle to the pool. Cloning shares the same queue and worker set —
/// clone it into every task that needs to submit work.
#[derive(Clone)]
pub struct WorkerPool {
    shared: Arc<Shared>,
    tx: mpsc::Sender<Task>,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Task>>>,
    joins: Arc<SyncMutex<JoinSet<()>>>,
}

pub struct WorkerPoolConfig {
    pub queue_depth: usize,
    pub min_workers: usize,
    pub max_workers: usize,
    pub idle_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            queue_depth: DEFAULT_QUEUE_DEPTH,
            min_workers: DEFAULT_MIN_WORKERS,
            max_workers: DEFAULT_MAX_WORKERS,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_depth);
        let pool = Self {
            shared: Arc::new(Shared {
                min_workers: config.min_workers,
                max_workers: config.max_workers,
                idle_timeout: config.idle_timeout,
                active_workers: AtomicUsize::new(0),
                stopping: Notify::new(),
            }),
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
            joins: Arc::new(SyncMutex::new(JoinSet::new())),
        };
        pool.start();
        pool
    }

    /// Spin up `min_workers` persistent workers.
    fn start(&self) {
        for _ in 0..self.shared.min_workers {
            self.start_worker();
        }
    }

    fn start_worker(&self) {
        self.shared.active_workers.fetch_add(1, Ordering::SeqCst);
        let shared = self.shared.clone();
        let rx = self.rx.clone();

        self.joins.lock().spawn(async move {
            loop {
                let next = {
                    let mut rx = rx.lock().await;
                    tokio::select! {
                        biased;
                        _ = shared.stopping.notified() => None,
                        task = rx.recv() => task.map(Ok),
                        _ = tokio::time::sleep(shared.idle_timeout) => Some(Err(())),
                    }
                };

                match next {
                    Some(Ok(task)) => task.await,
                    Some(Err(())) => {
                        // Idle-timeout fired; exit only if above the floor.
                        if shared.active_workers.load(Ordering::SeqCst) > shared.min_workers {
                            trace!("worker idle-timeout, exiting above floor");
                            break;
                        }
                    }
                    None => break,
                }
            }
            shared.active_workers.fetch_sub(1, Ordering::SeqCst);
        });
    }

    /// Enqueue `task`. Mirrors the original's `select`: try a non-blocking
    /// send first; if the queue is full, start a burst worker (if under
    /// `max_workers`) and then block until the task is accepted.
    pub async fn submit<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let boxed: Task = Box::pin(task);
        match self.tx.try_send(boxed) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(task)) => {
                if self.shared.active_workers.load(Ordering::SeqCst) < self.shared.max_workers {
                    debug!("queue full, starting burst worker");
                    self.start_worker();
                }
                // Either the new worker or an existing one will drain
                // the queue; block until there's room.
                let _ = self.tx.send(task).await;
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("submit on a stopped worker pool, dropping task");
            }
        }
    }

    /// Drain and join all workers. Queued-but-unstarted tasks are
    /// dropped; in-flight tasks run to completion.
    pub async fn stop(&self) {
        self.shared.stopping.notify_waiters();
        // Swap the JoinSet out from under the sync lock so the actual
        // awaiting happens without holding it across a suspension point.
        let mut joins = std::mem::replace(&mut *self.joins.lock(), JoinSet::new());
        while joins.join_next().await.is_some() {}
    }

    pub fn active_workers(&self) -> usize {
        self.shared.active_workers.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[tokio::test]
    async fn runs_submitted_tasks() {
        let pool = WorkerPool::new(WorkerPoolConfig {
            queue_depth: 8,
            min_workers: 1,
            max_workers: 4,
            idle_timeout: Duration::from_millis(50),
        });

        let counter = Arc::new(AtomicU32::new(0));
        for _ in 0..5 {
            let counter = counter.clone();
            pool.submit(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn starts_with_min_workers() {
        let pool = WorkerPool::new(WorkerPoolConfig {
            queue_depth: 8,
            min_workers: 3,
            max_workers: 10,
            idle_timeout: Duration::from_secs(30),
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(pool.active_workers(), 3);
    }
}
