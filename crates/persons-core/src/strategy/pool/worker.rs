use super::WorkRequest;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tokio::sync::mpsc;

/// Receive loop of a single pool thread.
///
/// The worker drains its queue in order, running each job to completion
/// before taking the next one, and exits after acknowledging a
/// [`WorkRequest::Shutdown`]. Jobs queued ahead of the shutdown request still
/// run.
///
/// A panicking job is contained: its completion channel is dropped (the
/// submitter sees the work as lost) and the worker keeps serving.
pub fn worker_loop(worker_id: usize, mut rx: mpsc::Receiver<WorkRequest>) {
    tracing::trace!("Worker {worker_id} started");

    while let Some(request) = rx.blocking_recv() {
        match request {
            WorkRequest::Run { job } => {
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    tracing::error!("Worker {worker_id} recovered from a panicking job");
                }
            }
            WorkRequest::Shutdown { response } => {
                tracing::debug!("Worker {worker_id} received shutdown signal");

                if response.send(()).is_err() {
                    tracing::error!("Worker {worker_id} failed to acknowledge shutdown");
                }
                break;
            }
        }
    }

    tracing::trace!("Worker {worker_id} stopped");
}
