//! Single-threaded cooperative scheduler and the strategy built on it.
//!
//! The scheduler is a [`LocalExecutor`] driven by one dedicated thread. Tasks
//! on it interleave only at their `.await` points. A synchronous unit of work
//! becomes such a task by crossing the sync bridge ([`smol::unblock`]): the
//! task suspends while the closure runs on the bridge's thread and resumes
//! when it returns. Completed tasks resume in completion order, not in
//! submission order.
//!
//! The submitting side never blocks a thread either. It awaits a completion
//! channel, which lets the caller's own runtime keep polling other tasks.

use super::{Execute, StrategyConfig, StrategyKind};
use crate::{Error, Result};
use core::{cell::Cell, pin::Pin, time::Duration};
use smol::{LocalExecutor, Timer};
use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    rc::Rc,
    thread,
};
use tokio::{
    sync::{mpsc, oneshot},
    time::timeout,
};
use tokio_util::sync::CancellationToken;

type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

enum SchedulerRequest {
    Spawn { task: BoxedTask },
    Shutdown { response: oneshot::Sender<()> },
}

/// Handle to the cooperative scheduler thread.
pub struct CooperativeScheduler {
    inbox: mpsc::Sender<SchedulerRequest>,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl CooperativeScheduler {
    /// Starts the scheduler thread with an inbox of `queue_depth` requests.
    pub fn start(queue_depth: usize, shutdown_timeout: Duration) -> Result<Self> {
        if queue_depth == 0 {
            return Err(Error::validation("scheduler queue depth must be greater than 0"));
        }

        let (inbox, rx) = mpsc::channel(queue_depth);
        thread::Builder::new()
            .name("persons-cooperative".to_string())
            .spawn(move || scheduler_loop(rx))
            .map_err(|e| Error::worker_unavailable(format!("failed to spawn scheduler: {e}")))?;

        Ok(Self {
            inbox,
            shutdown_token: CancellationToken::new(),
            shutdown_timeout,
        })
    }

    /// Registers `task` with the scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] after [`Self::shutdown`], or
    /// [`Error::WorkerUnavailable`] if the scheduler thread is gone.
    pub async fn spawn<Fut>(&self, task: Fut) -> Result<()>
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.shutdown_token.is_cancelled() {
            return Err(Error::ServiceShutdown);
        }

        self.inbox
            .send(SchedulerRequest::Spawn {
                task: Box::pin(task),
            })
            .await
            .map_err(|_| {
                if self.shutdown_token.is_cancelled() {
                    Error::ServiceShutdown
                } else {
                    Error::worker_unavailable("cooperative scheduler inbox closed")
                }
            })
    }

    /// Refuses new tasks, then waits (up to `shutdown_timeout`) for the tasks
    /// already registered to finish and the scheduler to acknowledge.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Cooperative scheduler refusing new tasks");
        self.shutdown_token.cancel();

        let (tx, rx) = oneshot::channel();
        if let Err(e) = self
            .inbox
            .send(SchedulerRequest::Shutdown { response: tx })
            .await
        {
            tracing::error!("Failed to send shutdown to cooperative scheduler: {e}");
            return Ok(());
        }

        match timeout(self.shutdown_timeout, rx).await {
            Ok(Ok(())) => tracing::info!("Cooperative scheduler shutdown complete"),
            Ok(Err(e)) => tracing::error!("Cooperative scheduler returned error: {e}"),
            Err(_) => tracing::warn!("Cooperative scheduler shutdown timed out"),
        }

        Ok(())
    }
}

fn scheduler_loop(mut inbox: mpsc::Receiver<SchedulerRequest>) {
    tracing::trace!("Cooperative scheduler started");

    let executor = LocalExecutor::new();
    let inflight = Rc::new(Cell::new(0_usize));

    let spawn = |task: BoxedTask| {
        inflight.set(inflight.get() + 1);
        let inflight = Rc::clone(&inflight);
        executor
            .spawn(async move {
                task.await;
                inflight.set(inflight.get() - 1);
            })
            .detach();
    };

    smol::block_on(executor.run(async {
        while let Some(request) = inbox.recv().await {
            match request {
                SchedulerRequest::Spawn { task } => spawn(task),
                SchedulerRequest::Shutdown { response } => {
                    // Tasks that passed the shutdown check before the
                    // token was cancelled may still sit behind this request.
                    inbox.close();
                    while let Ok(request) = inbox.try_recv() {
                        if let SchedulerRequest::Spawn { task } = request {
                            spawn(task);
                        }
                    }

                    tracing::debug!("Cooperative scheduler draining {} tasks", inflight.get());
                    while inflight.get() > 0 {
                        Timer::after(Duration::from_millis(5)).await;
                    }
                    if response.send(()).is_err() {
                        tracing::error!("Cooperative scheduler failed to acknowledge shutdown");
                    }
                    break;
                }
            }
        }
    }));

    tracing::trace!("Cooperative scheduler stopped");
}

/// Runs the unit of work as a task on the [`CooperativeScheduler`].
///
/// The task's only suspension point is the sync bridge around the unit of
/// work. The caller awaits completion without blocking its thread.
pub struct Cooperative {
    scheduler: CooperativeScheduler,
}

impl Cooperative {
    pub fn start(config: &StrategyConfig) -> Result<Self> {
        let scheduler = CooperativeScheduler::start(config.queue_depth, config.shutdown_timeout)?;
        Ok(Self { scheduler })
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.scheduler.shutdown().await
    }
}

impl Execute for Cooperative {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Cooperative
    }

    fn run<T, F>(&self, work: F) -> impl Future<Output = Result<T>> + Send
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        async move {
            let (done_tx, done_rx) = oneshot::channel();
            self.scheduler
                .spawn(async move {
                    match smol::unblock(move || catch_unwind(AssertUnwindSafe(work))).await {
                        Ok(result) => {
                            let _ = done_tx.send(result);
                        }
                        Err(_) => tracing::error!("Cooperative unit of work panicked"),
                    }
                })
                .await?;
            done_rx
                .await
                .map_err(|_| Error::worker_unavailable("cooperative task dropped the unit of work"))?
        }
    }
}
