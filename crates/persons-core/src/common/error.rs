//! Error types for the persons service core.
//!
//! This module defines the central [`Error`] enum returned by the bulk
//! creation engine, the execution strategies and the store-facing operations,
//! along with the two narrower error types raised by collaborators:
//!
//! - [`StoreError`]: raised by [`PersonStore`](crate::store::PersonStore)
//!   implementations.
//! - [`FetchError`]: the failure recorded in a single fan-out fetch slot. It
//!   never aborts a batch and is never surfaced as a request failure.
//!
//! ## Error Cases
//! - `Validation`: the caller's input was missing, malformed or out of bounds.
//! - `NotFound`: a lookup by key matched nothing.
//! - `Store`: the store rejected a write. Carries the number of entities
//!   committed by earlier batches of the same operation.
//! - `WorkerUnavailable`: a worker or scheduler channel closed, or a pending
//!   unit of work lost its completion signal.
//! - `ServiceShutdown`: work arrived after shutdown began.

use crate::types::PersonId;
use core::time::Duration;

pub type Result<T> = core::result::Result<T, Error>;

/// Result type used by [`PersonStore`](crate::store::PersonStore)
/// implementations.
pub type StoreResult<T> = core::result::Result<T, StoreError>;

/// Unified error type for the persons service core.
#[derive(Clone, thiserror::Error, Debug)]
pub enum Error {
    /// The request was invalid or exceeded constraints.
    #[error("Invalid request: {reason}")]
    Validation { reason: String },

    /// No person exists under the requested key.
    #[error("Person {id} not found")]
    NotFound { id: PersonId },

    /// The store rejected a write after `committed` entities were persisted.
    #[error("Store error after {committed} committed: {source}")]
    Store {
        committed: usize,
        #[source]
        source: StoreError,
    },

    /// A worker, the cooperative scheduler, or a completion channel went away.
    #[error("Worker unavailable: {context}")]
    WorkerUnavailable { context: String },

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl Error {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    pub fn worker_unavailable(context: impl Into<String>) -> Self {
        Self::WorkerUnavailable {
            context: context.into(),
        }
    }
}

impl From<StoreError> for Error {
    fn from(source: StoreError) -> Self {
        Self::Store {
            committed: 0,
            source,
        }
    }
}

/// Failure raised by a person store.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// The write violated a store constraint and was rolled back as a whole.
    #[error("write rejected: {reason}")]
    Rejected { reason: String },

    /// The backing storage failed.
    #[error("backend failure: {reason}")]
    Backend { reason: String },
}

/// Failure of a single fan-out fetch target.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum FetchError {
    /// The target did not answer within its timeout.
    #[error("timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },

    /// The request could not be sent or the response could not be read.
    #[error("transport error: {reason}")]
    Transport { reason: String },

    /// The target answered with a non-success HTTP status.
    #[error("unexpected status {code}")]
    Status { code: u16 },

    /// The payload was not valid JSON.
    #[error("undecodable payload: {reason}")]
    Decode { reason: String },

    /// The fetch task ended without producing a result.
    #[error("fetch task aborted: {reason}")]
    Aborted { reason: String },
}
