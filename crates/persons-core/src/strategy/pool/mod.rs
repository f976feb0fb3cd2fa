//! Bounded pool of OS worker threads backing the [`Offloaded`] strategy.
//!
//! ## Structure
//!
//! - [`manager`] - [`WorkerPool`]: round-robin dispatch and shutdown.
//! - [`worker`] - the per-thread receive loop.
//!
//! [`Offloaded`]: crate::strategy::Offloaded

pub mod manager;
pub mod worker;

pub use manager::WorkerPool;

use tokio::sync::oneshot;

/// A type-erased unit of work. It reports its own result through whatever
/// channel it captured.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Message delivered to a worker thread.
pub enum WorkRequest {
    /// Run a job.
    Run { job: Job },
    /// Stop after acknowledging on `response`.
    Shutdown { response: oneshot::Sender<()> },
}
