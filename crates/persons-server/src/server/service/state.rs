use crate::server::config::ServerConfig;
use anyhow::Context;
use persons_core::{
    bulk::BulkCreator,
    fetch::{FanOut, FetchTarget, HttpFetcher},
    store::{MemoryStore, SharedStore},
    strategy::{Strategies, Strategy, StrategyKind},
};
use std::sync::Arc;

/// Shared state behind every handler.
///
/// Built once at startup; cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    store: SharedStore,
    bulk: BulkCreator,
    strategies: Strategies,
    default_strategy: StrategyKind,
    fan_out: FanOut<HttpFetcher>,
    fetch_targets: Vec<FetchTarget>,
}

impl AppState {
    /// Opens the configured store and starts the execution strategies.
    ///
    /// # Errors
    ///
    /// Fails if the database cannot be opened, a strategy thread cannot be
    /// spawned, or the HTTP client cannot be built.
    pub fn new(config: &ServerConfig) -> anyhow::Result<Self> {
        Self::with_store(config, open_store(config)?)
    }

    /// Like [`Self::new`], with an explicit store.
    pub fn with_store(config: &ServerConfig, store: SharedStore) -> anyhow::Result<Self> {
        let strategies =
            Strategies::start(&config.strategy).context("failed to start execution strategies")?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("persons-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        let fan_out =
            FanOut::new(HttpFetcher::new(client)).with_concurrency_limit(config.fetch_concurrency);

        let bulk = BulkCreator::new(Arc::clone(&store))
            .with_batch_size(config.batch_size)
            .with_max_count(config.max_bulk_count);

        Ok(Self {
            inner: Arc::new(Inner {
                store,
                bulk,
                strategies,
                default_strategy: config.bulk_strategy,
                fan_out,
                fetch_targets: config.fetch_targets.clone(),
            }),
        })
    }

    pub fn store(&self) -> &SharedStore {
        &self.inner.store
    }

    pub fn bulk(&self) -> &BulkCreator {
        &self.inner.bulk
    }

    /// The strategy named by `requested`, or the configured default.
    pub fn strategy(&self, requested: Option<StrategyKind>) -> &Strategy {
        self.inner
            .strategies
            .get(requested.unwrap_or(self.inner.default_strategy))
    }

    pub fn fan_out(&self) -> &FanOut<HttpFetcher> {
        &self.inner.fan_out
    }

    pub fn fetch_targets(&self) -> &[FetchTarget] {
        &self.inner.fetch_targets
    }

    /// Stops the worker pool and the cooperative scheduler.
    pub async fn shutdown(&self) -> persons_core::Result<()> {
        self.inner.strategies.shutdown().await
    }
}

#[cfg(feature = "sqlite")]
fn open_store(config: &ServerConfig) -> anyhow::Result<SharedStore> {
    use persons_core::store::SqliteStore;

    match &config.database_path {
        Some(path) => {
            let store = SqliteStore::open(path)
                .with_context(|| format!("failed to open database {}", path.display()))?;
            tracing::info!("Using SQLite store at {}", path.display());
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryStore::new())),
    }
}

#[cfg(not(feature = "sqlite"))]
fn open_store(_config: &ServerConfig) -> anyhow::Result<SharedStore> {
    Ok(Arc::new(MemoryStore::new()))
}
