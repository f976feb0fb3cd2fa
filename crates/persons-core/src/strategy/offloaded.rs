use super::{Execute, StrategyConfig, StrategyKind, pool::WorkerPool};
use crate::{Error, Result};
use tokio::{
    runtime::{Handle, RuntimeFlavor},
    sync::oneshot,
    task,
};

/// Runs the unit of work on a bounded pool of OS threads.
///
/// The caller's thread does not execute the work, but it does wait for it:
/// after queueing the job it parks on the pool's completion signal. Inside a
/// multi-threaded tokio runtime the wait goes through
/// [`task::block_in_place`], so the runtime moves its other tasks to another
/// worker first.
pub struct Offloaded {
    pool: WorkerPool,
}

impl Offloaded {
    pub fn start(config: &StrategyConfig) -> Result<Self> {
        let pool = WorkerPool::spawn(
            config.num_workers,
            config.queue_depth,
            config.shutdown_timeout,
        )?;
        Ok(Self { pool })
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.pool.shutdown().await
    }
}

impl Execute for Offloaded {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Offloaded
    }

    fn run<T, F>(&self, work: F) -> impl Future<Output = Result<T>> + Send
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        async move {
            let (done_tx, done_rx) = oneshot::channel();
            self.pool
                .submit(Box::new(move || {
                    // The submitter may have given up; nothing to report to.
                    let _ = done_tx.send(work());
                }))
                .await?;
            wait_for_completion(done_rx)?
        }
    }
}

/// Parks the current thread until the worker reports back.
fn wait_for_completion<T>(done_rx: oneshot::Receiver<T>) -> Result<T> {
    let received = match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => task::block_in_place(|| done_rx.blocking_recv()),
        // `block_in_place` is not available here; the only runtime thread
        // parks and resumes once the worker thread sends.
        Ok(_) => futures::executor::block_on(done_rx),
        Err(_) => done_rx.blocking_recv(),
    };
    received.map_err(|_| Error::worker_unavailable("worker dropped the unit of work"))
}
