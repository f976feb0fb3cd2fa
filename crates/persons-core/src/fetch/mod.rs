//! Fan-out fetch engine.
//!
//! [`FanOut::fetch_all`] fetches every target concurrently, one tokio task per
//! target, and returns one [`FetchResult`] per target in input order. A target
//! that times out, fails in transport, answers with an error status or sends
//! an undecodable payload only fails its own slot.

mod http;

pub use http::HttpFetcher;

use crate::{DEFAULT_FETCH_TIMEOUT, FetchError};
use core::time::Duration;
use futures::FutureExt;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::{panic::AssertUnwindSafe, sync::Arc};
use tokio::{sync::Semaphore, task::JoinSet, time::timeout};

/// Retrieves the JSON payload behind a URL.
pub trait Fetch: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Value, FetchError>> + Send;
}

/// A URL to fetch and how long to wait for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTarget {
    pub url: String,
    pub timeout: Duration,
}

impl FetchTarget {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }

    /// A target with the default 10 second timeout.
    pub fn with_default_timeout(url: impl Into<String>) -> Self {
        Self::new(url, DEFAULT_FETCH_TIMEOUT)
    }
}

/// What a single target produced.
///
/// Serializes as `{"status": "ok", "data": ...}` or
/// `{"status": "error", "error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status")]
pub enum FetchOutcome {
    #[serde(rename = "ok")]
    Success { data: Value },
    #[serde(rename = "error")]
    Failure {
        #[serde(serialize_with = "serialize_display")]
        error: FetchError,
    },
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl From<Result<Value, FetchError>> for FetchOutcome {
    fn from(result: Result<Value, FetchError>) -> Self {
        match result {
            Ok(data) => Self::Success { data },
            Err(error) => Self::Failure { error },
        }
    }
}

fn serialize_display<S: Serializer>(error: &FetchError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchResult {
    pub url: String,
    #[serde(flatten)]
    pub outcome: FetchOutcome,
}

/// Concurrent fetcher over a [`Fetch`] transport.
pub struct FanOut<F> {
    fetcher: Arc<F>,
    admission: Option<Arc<Semaphore>>,
}

impl<F: Fetch> FanOut<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            admission: None,
        }
    }

    /// Caps the number of fetches in flight. `0` removes the cap.
    ///
    /// The per-target timeout starts once a fetch is admitted.
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.admission = (limit > 0).then(|| Arc::new(Semaphore::new(limit)));
        self
    }

    /// Fetches all `targets` concurrently.
    ///
    /// The returned vector has one entry per target, at the target's index.
    #[tracing::instrument(skip_all, fields(targets = targets.len()))]
    pub async fn fetch_all(&self, targets: Vec<FetchTarget>) -> Vec<FetchResult> {
        let mut tasks = JoinSet::new();
        let mut slots: Vec<(String, Option<Result<Value, FetchError>>)> =
            Vec::with_capacity(targets.len());

        for (index, target) in targets.into_iter().enumerate() {
            slots.push((target.url.clone(), None));

            let fetcher = Arc::clone(&self.fetcher);
            let admission = self.admission.clone();
            tasks.spawn(async move {
                let _permit = match admission {
                    Some(semaphore) => match semaphore.acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(_) => {
                            let closed = FetchError::Aborted {
                                reason: "admission closed".to_string(),
                            };
                            return (index, Err(closed));
                        }
                    },
                    None => None,
                };

                let fetch = timeout(target.timeout, async {
                    fetcher.fetch(&target.url).await
                });
                let outcome = match AssertUnwindSafe(fetch).catch_unwind().await {
                    Ok(Ok(result)) => result,
                    Ok(Err(_)) => Err(FetchError::Timeout {
                        after: target.timeout,
                    }),
                    Err(_) => Err(FetchError::Aborted {
                        reason: "fetch task panicked".to_string(),
                    }),
                };
                (index, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    if let Err(e) = &outcome {
                        tracing::warn!(url = %slots[index].0, "Fetch failed: {e}");
                    }
                    slots[index].1 = Some(outcome);
                }
                Err(e) => tracing::error!("Fetch task did not complete: {e}"),
            }
        }

        slots
            .into_iter()
            .map(|(url, outcome)| FetchResult {
                url,
                outcome: outcome
                    .unwrap_or_else(|| {
                        Err(FetchError::Aborted {
                            reason: "fetch task did not complete".to_string(),
                        })
                    })
                    .into(),
            })
            .collect()
    }
}
