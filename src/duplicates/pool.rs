use crossbeam_channel::unbounded;
use indicatif::ProgressBar;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::common::errors::EngineError;

/// Run-level cancellation request, shared by clones
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Fixed-size thread pool for feature extraction
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Result<Self, EngineError> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("adsweep-worker-{}", i))
            .build()
            .map_err(|e| EngineError::Pool(e.to_string()))?;
        tracing::debug!("Worker pool started with {} threads", workers);
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Apply `work` to every task and return the results in task order.
    ///
    /// Results come back over a channel tagged with their index, so
    /// completion order never leaks into the output. Cancellation stops new
    /// tasks from starting; tasks already running finish, and everything
    /// collected so far is dropped.
    pub fn run<T, R, F>(
        &self,
        tasks: &[T],
        cancel: &CancelFlag,
        progress: Option<&ProgressBar>,
        work: F,
    ) -> Result<Vec<R>, EngineError>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync,
    {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        let (tx, rx) = unbounded::<(usize, R)>();
        self.pool.install(|| {
            tasks
                .par_iter()
                .enumerate()
                .for_each_with(tx, |tx, (index, task)| {
                    if cancel.is_cancelled() {
                        return;
                    }
                    let result = work(task);
                    if let Some(pb) = progress {
                        pb.inc(1);
                    }
                    // The receiver outlives the pool scope
                    let _ = tx.send((index, result));
                });
        });

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let mut slots: Vec<Option<R>> = (0..tasks.len()).map(|_| None).collect();
        for (index, result) in rx.iter() {
            slots[index] = Some(result);
        }
        slots
            .into_iter()
            .collect::<Option<Vec<R>>>()
            .ok_or_else(|| EngineError::Pool("a worker exited without a result".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_results_follow_task_order() {
        let pool = WorkerPool::new(4).unwrap();
        let tasks: Vec<u64> = (0..200).collect();
        let results = pool
            .run(&tasks, &CancelFlag::new(), None, |n| {
                // Uneven work so completion order differs from task order
                std::thread::sleep(std::time::Duration::from_micros((200 - n) * 10));
                n * 2
            })
            .unwrap();
        assert_eq!(results, tasks.iter().map(|n| n * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_cancel_stops_dispatch_and_discards_results() {
        let pool = WorkerPool::new(2).unwrap();
        let cancel = CancelFlag::new();
        let started = AtomicUsize::new(0);
        let tasks: Vec<usize> = (0..1_000).collect();

        let result = pool.run(&tasks, &cancel, None, |n| {
            started.fetch_add(1, Ordering::SeqCst);
            if *n == 3 {
                cancel.cancel();
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
            *n
        });

        assert!(matches!(result, Err(EngineError::Cancelled)));
        assert!(started.load(Ordering::SeqCst) < tasks.len());
    }
}
