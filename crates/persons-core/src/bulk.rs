//! Bulk creation engine.
//!
//! [`BulkCreator::create_bulk`] validates the requested count, builds that many
//! persons from a deterministic [`NamingRule`], and writes them through
//! [`PersonStore::create_many`] in sequential batches. The batch loop is a
//! single unit of work handed to the caller's chosen [`Execute`] strategy, so
//! the strategy decides where the CPU time goes but never what gets written.
//!
//! Each `create_many` call is atomic. The first rejected batch stops the loop;
//! the error reports how many persons earlier batches already committed.

use crate::{
    DEFAULT_BATCH_SIZE, Error, MAX_BULK_COUNT, NewPerson, Result,
    store::{PersonStore, SharedStore},
    strategy::Execute,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::Instrument;

/// Produces the `index`-th person of a bulk run.
///
/// Implementations must be deterministic: the same index always yields the
/// same person.
pub trait NamingRule: Send + Sync {
    fn person(&self, index: usize) -> NewPerson;
}

/// `"{prefix} {index}"`, aged `index % age_modulus`.
#[derive(Debug, Clone)]
pub struct SequentialNames {
    prefix: String,
    age_modulus: u32,
}

impl SequentialNames {
    /// # Panics
    ///
    /// Panics if `age_modulus` is zero.
    pub fn new(prefix: impl Into<String>, age_modulus: u32) -> Self {
        assert!(age_modulus > 0, "age modulus must be greater than 0");
        Self {
            prefix: prefix.into(),
            age_modulus,
        }
    }
}

impl Default for SequentialNames {
    fn default() -> Self {
        Self::new("Person", 100)
    }
}

impl NamingRule for SequentialNames {
    fn person(&self, index: usize) -> NewPerson {
        let age = (index % self.age_modulus as usize) as u32;
        NewPerson::new(format!("{} {index}", self.prefix), age)
    }
}

/// One committed `create_many` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub index: usize,
    pub size: usize,
}

/// Result of a successful bulk run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOutcome {
    pub created_count: usize,
    pub batches: Vec<BatchReport>,
}

/// Creates persons in bulk through a [`PersonStore`].
pub struct BulkCreator {
    store: SharedStore,
    naming: Arc<dyn NamingRule>,
    batch_size: usize,
    max_count: usize,
}

impl BulkCreator {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            naming: Arc::new(SequentialNames::default()),
            batch_size: DEFAULT_BATCH_SIZE,
            max_count: MAX_BULK_COUNT,
        }
    }

    pub fn with_naming(mut self, naming: impl NamingRule + 'static) -> Self {
        self.naming = Arc::new(naming);
        self
    }

    /// Sets the number of persons per `create_many` call. Zero is treated as
    /// one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_count(mut self, max_count: usize) -> Self {
        self.max_count = max_count;
        self
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    /// Checks that `count` lies in `1..=max_count`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] describing the violated bound.
    pub fn validate_count(&self, count: i64) -> Result<usize> {
        if count < 1 {
            return Err(Error::validation("Count must be greater than 0"));
        }
        match usize::try_from(count) {
            Ok(count) if count <= self.max_count => Ok(count),
            _ => Err(Error::validation(format!(
                "Count {count} exceeds maximum allowed ({})",
                self.max_count
            ))),
        }
    }

    /// Creates `count` persons under `strategy`.
    ///
    /// Validation happens before anything is scheduled, so a rejected count
    /// never reaches the store.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if `count` is out of range.
    /// - [`Error::Store`] if a batch is rejected; `committed` counts the
    ///   persons written by earlier batches.
    /// - Any scheduling error raised by the strategy itself.
    pub fn create_bulk<'a, E>(
        &self,
        count: i64,
        strategy: &'a E,
    ) -> impl Future<Output = Result<BulkOutcome>> + Send + 'a
    where
        E: Execute,
    {
        let span = tracing::info_span!("create_bulk", count, strategy = %strategy.kind());

        // Built outside the returned future, which then only holds the
        // strategy's `Send` future.
        let run = self.validate_count(count).map(|count| {
            let store = Arc::clone(&self.store);
            let naming = Arc::clone(&self.naming);
            let batch_size = self.batch_size;
            strategy.run(move || insert_batches(store.as_ref(), naming.as_ref(), count, batch_size))
        });

        async move {
            let outcome = match run {
                Ok(run) => run.await,
                Err(e) => Err(e),
            };

            match &outcome {
                Ok(outcome) => tracing::info!(
                    created = outcome.created_count,
                    batches = outcome.batches.len(),
                    "Bulk creation finished"
                ),
                Err(e) => tracing::error!("Bulk creation failed: {e}"),
            }
            outcome
        }
        .instrument(span)
    }
}

fn insert_batches(
    store: &dyn PersonStore,
    naming: &dyn NamingRule,
    count: usize,
    batch_size: usize,
) -> Result<BulkOutcome> {
    let mut committed = 0;
    let mut batches = Vec::with_capacity(count.div_ceil(batch_size));

    for (index, start) in (0..count).step_by(batch_size).enumerate() {
        let end = (start + batch_size).min(count);
        let batch: Vec<_> = (start..end).map(|i| naming.person(i)).collect();

        let size = store
            .create_many(batch)
            .map_err(|source| Error::Store { committed, source })?;
        committed += size;
        batches.push(BatchReport { index, size });

        tracing::debug!(index, size, committed, "Batch committed");
    }

    Ok(BulkOutcome {
        created_count: committed,
        batches,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        StoreError,
        store::MemoryStore,
        strategy::{Blocking, Strategies, StrategyConfig, StrategyKind},
    };
    use core::time::Duration;
    use std::collections::HashSet;

    fn assert_send<T: Send>(_: &T) {}

    fn creator(store: &Arc<MemoryStore>) -> BulkCreator {
        BulkCreator::new(Arc::clone(store) as SharedStore)
    }

    #[tokio::test]
    async fn creates_persons_in_index_order() {
        let store = Arc::new(MemoryStore::new());
        let outcome = creator(&store).create_bulk(3, &Blocking).await.unwrap();
        assert_eq!(outcome.created_count, 3);

        let persons = store.list().unwrap();
        let rows: Vec<_> = persons.iter().map(|p| (p.name.as_str(), p.age)).collect();
        assert_eq!(rows, [("Person 0", 0), ("Person 1", 1), ("Person 2", 2)]);

        let ids: HashSet<_> = persons.iter().map(|p| p.id).collect();
        assert_eq!(ids.len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn bulk_future_can_be_spawned() {
        let strategies = Arc::new(Strategies::start(&StrategyConfig::default()).unwrap());
        let store = Arc::new(MemoryStore::new());
        let creator = Arc::new(creator(&store));

        let pending = creator.create_bulk(1, &Blocking);
        assert_send(&pending);
        pending.await.unwrap();

        let mut handles = Vec::new();
        for kind in StrategyKind::ALL {
            let strategies = Arc::clone(&strategies);
            let creator = Arc::clone(&creator);
            handles.push(tokio::spawn(async move {
                creator.create_bulk(10, strategies.get(kind)).await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().created_count, 10);
        }
        assert_eq!(store.count().unwrap(), 31);
        strategies.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn ages_cycle_every_hundred() {
        let store = Arc::new(MemoryStore::new());
        creator(&store).create_bulk(205, &Blocking).await.unwrap();

        let persons = store.list().unwrap();
        assert_eq!(persons[99].age, 99);
        assert_eq!(persons[100].age, 0);
        assert_eq!(persons[204].name, "Person 204");
        assert_eq!(persons[204].age, 4);
    }

    #[tokio::test]
    async fn out_of_range_counts_persist_nothing() {
        let store = Arc::new(MemoryStore::new());
        let creator = creator(&store);

        for count in [0, -5, 20_000, i64::MAX] {
            let err = creator.create_bulk(count, &Blocking).await.unwrap_err();
            assert!(matches!(err, Error::Validation { .. }), "count {count}");
        }
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn bounds_are_inclusive() {
        let store = Arc::new(MemoryStore::new());
        let creator = creator(&store);

        assert_eq!(creator.create_bulk(1, &Blocking).await.unwrap().created_count, 1);
        let max = creator.max_count() as i64;
        assert_eq!(
            creator.create_bulk(max, &Blocking).await.unwrap().created_count,
            MAX_BULK_COUNT
        );
        assert_eq!(store.count().unwrap(), MAX_BULK_COUNT + 1);
    }

    #[tokio::test]
    async fn splits_work_into_batches() {
        let store = Arc::new(MemoryStore::new());
        let outcome = creator(&store)
            .with_batch_size(500)
            .create_bulk(1_200, &Blocking)
            .await
            .unwrap();

        let sizes: Vec<_> = outcome.batches.iter().map(|b| b.size).collect();
        assert_eq!(sizes, [500, 500, 200]);
        assert_eq!(outcome.created_count, 1_200);
    }

    #[tokio::test]
    async fn rejected_batch_reports_committed_count() {
        let store = Arc::new(MemoryStore::with_max_rows(700));
        let err = creator(&store)
            .with_batch_size(500)
            .create_bulk(1_000, &Blocking)
            .await
            .unwrap_err();

        match err {
            Error::Store { committed, source } => {
                assert_eq!(committed, 500);
                assert!(matches!(source, StoreError::Rejected { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.count().unwrap(), 500);
    }

    #[tokio::test]
    async fn custom_naming_rule_is_used() {
        struct Fixed;
        impl NamingRule for Fixed {
            fn person(&self, index: usize) -> NewPerson {
                NewPerson::new(format!("Guest #{}", index + 1), 18)
            }
        }

        let store = Arc::new(MemoryStore::new());
        creator(&store)
            .with_naming(Fixed)
            .create_bulk(2, &Blocking)
            .await
            .unwrap();

        let names: Vec<_> = store.list().unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, ["Guest #1", "Guest #2"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn strategies_are_observably_equivalent() {
        let strategies = Strategies::start(&StrategyConfig {
            num_workers: 2,
            queue_depth: 4,
            shutdown_timeout: Duration::from_secs(1),
        })
        .unwrap();

        let mut snapshots = Vec::new();
        for kind in StrategyKind::ALL {
            let store = Arc::new(MemoryStore::new());
            let outcome = creator(&store)
                .with_batch_size(64)
                .create_bulk(300, strategies.get(kind))
                .await
                .unwrap();
            let rows: Vec<_> = store
                .list()
                .unwrap()
                .into_iter()
                .map(|p| (p.id, p.name, p.age))
                .collect();
            snapshots.push((kind, outcome, rows));
        }

        let (_, first_outcome, first_rows) = &snapshots[0];
        for (kind, outcome, rows) in &snapshots[1..] {
            assert_eq!(outcome, first_outcome, "strategy {kind}");
            assert_eq!(rows, first_rows, "strategy {kind}");
        }
        strategies.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn strategies_surface_the_same_store_failure() {
        let strategies = Strategies::start(&StrategyConfig::default()).unwrap();

        for kind in StrategyKind::ALL {
            let store = Arc::new(MemoryStore::with_max_rows(150));
            let err = creator(&store)
                .with_batch_size(100)
                .create_bulk(250, strategies.get(kind))
                .await
                .unwrap_err();
            assert!(
                matches!(err, Error::Store { committed: 100, .. }),
                "strategy {kind}: {err:?}"
            );
            assert_eq!(store.count().unwrap(), 100);
        }
        strategies.shutdown().await.unwrap();
    }
}
