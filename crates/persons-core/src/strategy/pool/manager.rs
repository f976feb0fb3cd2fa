//! Worker pool for offloaded units of work.
//!
//! This module defines the [`WorkerPool`] struct, which owns a fixed set of
//! named OS threads, each draining its own bounded [`mpsc`] queue. Work is
//! distributed round-robin and the pool supports coordinated shutdown via a
//! shared [`CancellationToken`].
//!
//! Bounded queues give backpressure: once every queue is full, submitters wait
//! for room instead of piling up unbounded work.

use super::{Job, WorkRequest, worker::worker_loop};
use crate::{Error, Result};
use core::time::Duration;
use std::{
    sync::atomic::{AtomicUsize, Ordering},
    thread,
};
use tokio::{
    sync::{mpsc, oneshot},
    time::timeout,
};
use tokio_util::sync::CancellationToken;

/// A pool of OS threads that run [`Job`]s.
pub struct WorkerPool {
    workers: Vec<mpsc::Sender<WorkRequest>>,
    next_worker: AtomicUsize,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl WorkerPool {
    /// Spawns `num_workers` threads, each with a queue of `queue_depth` jobs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if either size is zero, or
    /// [`Error::WorkerUnavailable`] if the OS refuses to spawn a thread.
    pub fn spawn(num_workers: usize, queue_depth: usize, shutdown_timeout: Duration) -> Result<Self> {
        if num_workers == 0 {
            return Err(Error::validation("worker pool needs at least one worker"));
        }
        if queue_depth == 0 {
            return Err(Error::validation("worker queue depth must be greater than 0"));
        }

        let mut workers = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let (tx, rx) = mpsc::channel(queue_depth);
            thread::Builder::new()
                .name(format!("persons-worker-{worker_id}"))
                .spawn(move || worker_loop(worker_id, rx))
                .map_err(|e| Error::worker_unavailable(format!("failed to spawn worker {worker_id}: {e}")))?;
            workers.push(tx);
        }

        Ok(Self {
            workers,
            next_worker: AtomicUsize::new(0),
            shutdown_token: CancellationToken::new(),
            shutdown_timeout,
        })
    }

    /// Returns the index of the next worker to receive work (round-robin).
    ///
    /// Uses a relaxed atomic increment to minimize contention.
    pub fn next_worker_index(&self) -> usize {
        self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len()
    }

    /// Queues `job` on the next worker, waiting for room if its queue is full.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The pool is shutting down (`shutdown_token` was cancelled).
    /// - The worker's channel is closed.
    pub async fn submit(&self, job: Job) -> Result<()> {
        if self.shutdown_token.is_cancelled() {
            return Err(Error::ServiceShutdown);
        }

        let worker_idx = self.next_worker_index();
        let worker = &self.workers[worker_idx];

        match worker.send(WorkRequest::Run { job }).await {
            Ok(()) => Ok(()),
            Err(_) => Err(Error::worker_unavailable(format!(
                "Worker {worker_idx} channel closed"
            ))),
        }
    }

    /// Gracefully shuts down all workers in the pool.
    ///
    /// - Cancels the shared [`CancellationToken`] so new submissions fail.
    /// - Sends a [`WorkRequest::Shutdown`] to each worker, behind any jobs
    ///   already queued.
    /// - Waits (up to `shutdown_timeout` per worker) for acknowledgements.
    pub async fn shutdown(&self) -> Result<()> {
        // === Phase 0: Stop accepting new work ===
        tracing::info!("Worker pool refusing new work");
        self.shutdown_token.cancel();

        // === Phase 1: Notify workers to shut down ===
        tracing::debug!("Notifying all workers to shut down");
        let mut shutdown_handles = Vec::with_capacity(self.workers.len());

        for (i, worker) in self.workers.iter().enumerate() {
            let (tx, rx) = oneshot::channel();
            if let Err(e) = worker.send(WorkRequest::Shutdown { response: tx }).await {
                tracing::error!("Failed to send shutdown to worker {i}: {e}");
            } else {
                shutdown_handles.push((i, rx));
            }
        }

        // === Phase 2: Wait for acknowledgements ===
        tracing::debug!(
            "Waiting for up to {:?} per worker for shutdown acknowledgements",
            self.shutdown_timeout
        );

        let shutdown_timeout = self.shutdown_timeout;
        let timeout_futures = shutdown_handles.into_iter().map(|(i, rx)| async move {
            match timeout(shutdown_timeout, rx).await {
                Ok(Ok(())) => {
                    tracing::trace!("Worker {i} shutdown acknowledged");
                }
                Ok(Err(e)) => {
                    tracing::error!("Worker {i} returned error: {e}");
                }
                Err(_) => {
                    tracing::warn!("Worker {i} shutdown timed out");
                }
            }
        });

        futures::future::join_all(timeout_futures).await;

        tracing::info!("Worker pool shutdown complete");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn zero_workers_is_rejected() {
        assert!(matches!(
            WorkerPool::spawn(0, 1, Duration::from_secs(1)),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn round_robin_wraps_around() {
        let pool = WorkerPool::spawn(3, 1, Duration::from_secs(1)).unwrap();
        let picked: Vec<_> = (0..7).map(|_| pool.next_worker_index()).collect();
        assert_eq!(picked, [0, 1, 2, 0, 1, 2, 0]);
    }

    #[tokio::test]
    async fn jobs_are_spread_across_named_threads() {
        let pool = WorkerPool::spawn(2, 4, Duration::from_secs(1)).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut done = Vec::new();
        for _ in 0..4 {
            let seen = Arc::clone(&seen);
            let (tx, rx) = oneshot::channel();
            pool.submit(Box::new(move || {
                let name = thread::current().name().map(str::to_owned);
                seen.lock().unwrap().push(name);
                let _ = tx.send(());
            }))
            .await
            .unwrap();
            done.push(rx);
        }
        for rx in done {
            rx.await.unwrap();
        }

        let mut names: Vec<_> = seen.lock().unwrap().iter().flatten().cloned().collect();
        names.sort();
        names.dedup();
        assert_eq!(names, ["persons-worker-0", "persons-worker-1"]);
        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn queued_jobs_finish_before_shutdown_completes() {
        let pool = WorkerPool::spawn(1, 4, Duration::from_secs(2)).unwrap();
        let (tx, rx) = oneshot::channel();
        pool.submit(Box::new(move || {
            thread::sleep(Duration::from_millis(20));
            let _ = tx.send(42);
        }))
        .await
        .unwrap();

        pool.shutdown().await.unwrap();
        assert_eq!(rx.await.unwrap(), 42);
        assert!(matches!(
            pool.submit(Box::new(|| {})).await,
            Err(Error::ServiceShutdown)
        ));
    }
}
