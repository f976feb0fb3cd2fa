//! Execution strategies: how a unit of work is scheduled relative to the
//! request that asked for it.
//!
//! A unit of work is a `FnOnce() -> Result<T>` closure, typically a sequence of
//! blocking store calls. Every strategy runs it exactly once and hands back
//! its result unchanged. They differ only in which thread burns the CPU time
//! and what the caller's thread does meanwhile:
//!
//! | Strategy        | Runs the work on            | Caller's thread while pending |
//! |-----------------|-----------------------------|-------------------------------|
//! | [`Blocking`]    | the caller's thread         | busy running it               |
//! | [`Offloaded`]   | a bounded OS worker pool    | parked on the completion signal |
//! | [`Cooperative`] | the sync bridge of a single-threaded cooperative scheduler | free; the caller's task is suspended |
//!
//! ## Structure
//!
//! - [`Execute`] - the strategy interface.
//! - [`Strategy`] - one strategy chosen at construction time.
//! - [`Strategies`] - all three, built once and selected per request by
//!   [`StrategyKind`].

mod blocking;
mod cooperative;
mod offloaded;
pub mod pool;

pub use blocking::Blocking;
pub use cooperative::{Cooperative, CooperativeScheduler};
pub use offloaded::Offloaded;

use crate::{Error, Result};
use core::{fmt, str::FromStr, time::Duration};
use serde::{Deserialize, Serialize};

/// Schedules a unit of work and resolves to its result.
pub trait Execute: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Runs `work` once and returns what it returned.
    ///
    /// # Errors
    ///
    /// Returns the unit of work's own error unchanged. Strategies that hand
    /// work to another thread additionally fail with
    /// [`Error::ServiceShutdown`] once shut down and with
    /// [`Error::WorkerUnavailable`] if the work never reports back.
    fn run<T, F>(&self, work: F) -> impl Future<Output = Result<T>> + Send
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static;
}

/// Names one of the three execution strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Blocking,
    Offloaded,
    Cooperative,
}

impl StrategyKind {
    pub const ALL: [Self; 3] = [Self::Blocking, Self::Offloaded, Self::Cooperative];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blocking => "blocking",
            Self::Offloaded => "offloaded",
            Self::Cooperative => "cooperative",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                Error::validation(format!(
                    "unknown strategy `{s}` (expected blocking, offloaded or cooperative)"
                ))
            })
    }
}

/// Sizing and shutdown settings for the strategies that own threads.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// Number of OS threads in the offload pool.
    pub num_workers: usize,
    /// Capacity of each worker's queue and of the cooperative scheduler's
    /// inbox.
    pub queue_depth: usize,
    /// How long shutdown waits for each worker to acknowledge.
    pub shutdown_timeout: Duration,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            queue_depth: 16,
            shutdown_timeout: Duration::from_secs(3),
        }
    }
}

/// A single execution strategy selected at construction time.
pub enum Strategy {
    Blocking(Blocking),
    Offloaded(Offloaded),
    Cooperative(Cooperative),
}

impl Strategy {
    /// Builds the strategy named by `kind`, spawning whatever threads it owns.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Validation`] on a zero-sized configuration and with
    /// [`Error::WorkerUnavailable`] if a thread cannot be spawned.
    pub fn start(kind: StrategyKind, config: &StrategyConfig) -> Result<Self> {
        Ok(match kind {
            StrategyKind::Blocking => Self::Blocking(Blocking),
            StrategyKind::Offloaded => Self::Offloaded(Offloaded::start(config)?),
            StrategyKind::Cooperative => Self::Cooperative(Cooperative::start(config)?),
        })
    }

    /// Stops accepting work and waits for owned threads to wind down.
    pub async fn shutdown(&self) -> Result<()> {
        match self {
            Self::Blocking(_) => Ok(()),
            Self::Offloaded(strategy) => strategy.shutdown().await,
            Self::Cooperative(strategy) => strategy.shutdown().await,
        }
    }
}

impl Execute for Strategy {
    fn kind(&self) -> StrategyKind {
        match self {
            Self::Blocking(strategy) => strategy.kind(),
            Self::Offloaded(strategy) => strategy.kind(),
            Self::Cooperative(strategy) => strategy.kind(),
        }
    }

    fn run<T, F>(&self, work: F) -> impl Future<Output = Result<T>> + Send
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        async move {
            match self {
                Self::Blocking(strategy) => strategy.run(work).await,
                Self::Offloaded(strategy) => strategy.run(work).await,
                Self::Cooperative(strategy) => strategy.run(work).await,
            }
        }
    }
}

/// One instance of every strategy, selectable per call.
pub struct Strategies {
    blocking: Strategy,
    offloaded: Strategy,
    cooperative: Strategy,
}

impl Strategies {
    pub fn start(config: &StrategyConfig) -> Result<Self> {
        Ok(Self {
            blocking: Strategy::start(StrategyKind::Blocking, config)?,
            offloaded: Strategy::start(StrategyKind::Offloaded, config)?,
            cooperative: Strategy::start(StrategyKind::Cooperative, config)?,
        })
    }

    pub fn get(&self, kind: StrategyKind) -> &Strategy {
        match kind {
            StrategyKind::Blocking => &self.blocking,
            StrategyKind::Offloaded => &self.offloaded,
            StrategyKind::Cooperative => &self.cooperative,
        }
    }

    /// Shuts down the worker pool and the cooperative scheduler.
    ///
    /// Both are always attempted; the first error is returned.
    pub async fn shutdown(&self) -> Result<()> {
        let (offloaded, cooperative) =
            futures::join!(self.offloaded.shutdown(), self.cooperative.shutdown());
        offloaded.and(cooperative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    fn small_config() -> StrategyConfig {
        StrategyConfig {
            num_workers: 2,
            queue_depth: 4,
            shutdown_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!(
            "Cooperative".parse::<StrategyKind>().unwrap(),
            StrategyKind::Cooperative
        );
        assert_eq!(
            " offloaded ".parse::<StrategyKind>().unwrap(),
            StrategyKind::Offloaded
        );
        assert!("threaded".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn kind_round_trips_through_display() {
        for kind in StrategyKind::ALL {
            assert_eq!(kind.to_string().parse::<StrategyKind>().unwrap(), kind);
        }
    }

    #[test]
    fn kind_serializes_lowercase() {
        let json = serde_json::to_string(&StrategyKind::Offloaded).unwrap();
        assert_eq!(json, r#""offloaded""#);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn every_strategy_returns_the_same_value() {
        let strategies = Strategies::start(&small_config()).unwrap();
        for kind in StrategyKind::ALL {
            let strategy = strategies.get(kind);
            assert_eq!(strategy.kind(), kind);

            let value = strategy
                .run(|| Ok((1..=10).map(|n| n * n).sum::<u64>()))
                .await
                .unwrap();
            assert_eq!(value, 385, "strategy {kind}");
        }
        strategies.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn every_strategy_surfaces_the_same_error() {
        let strategies = Strategies::start(&small_config()).unwrap();
        for kind in StrategyKind::ALL {
            let err = strategies
                .get(kind)
                .run(|| -> Result<()> { Err(Error::validation("boom")) })
                .await
                .unwrap_err();
            assert_eq!(err.to_string(), "Invalid request: boom", "strategy {kind}");
        }
        strategies.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn every_strategy_runs_the_work_exactly_once() {
        let strategies = Strategies::start(&small_config()).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        for kind in StrategyKind::ALL {
            let calls = Arc::clone(&calls);
            strategies
                .get(kind)
                .run(move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        strategies.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shut_down_strategies_refuse_work() {
        let strategies = Strategies::start(&small_config()).unwrap();
        strategies.shutdown().await.unwrap();

        for kind in [StrategyKind::Offloaded, StrategyKind::Cooperative] {
            let err = strategies.get(kind).run(|| Ok(())).await.unwrap_err();
            assert!(matches!(err, Error::ServiceShutdown), "strategy {kind}");
        }
        // Blocking owns no threads and keeps working.
        strategies
            .get(StrategyKind::Blocking)
            .run(|| Ok(()))
            .await
            .unwrap();
    }
}
