use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use persons_core::{
    DEFAULT_BATCH_SIZE, MAX_BULK_COUNT,
    fetch::FetchTarget,
    strategy::{StrategyConfig, StrategyKind},
};
use std::path::PathBuf;

const DEFAULT_FETCH_TARGETS: &str = concat!(
    "https://jsonplaceholder.typicode.com/posts/1,",
    "https://jsonplaceholder.typicode.com/posts/2,",
    "https://jsonplaceholder.typicode.com/posts/3,",
    "https://jsonplaceholder.typicode.com/posts/4,",
    "https://jsonplaceholder.typicode.com/posts/5,",
    "https://jsonplaceholder.typicode.com/posts/6,",
    "https://jsonplaceholder.typicode.com/posts/7,",
    "https://jsonplaceholder.typicode.com/posts/8,",
    "https://jsonplaceholder.typicode.com/posts/9,",
    "https://jsonplaceholder.typicode.com/posts/10",
);

/// Runtime configuration for the `persons-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first when present).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "persons-server",
    version,
    about = "An HTTP service for persons with strategy-selectable bulk creation"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:8000"))]
    pub server_addr: String,

    /// Number of OS threads in the offload worker pool.
    ///
    /// Defaults to the number of logical CPUs.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS", default_value_t = num_cpus::get())]
    pub num_workers: usize,

    /// Capacity of each worker queue and of the cooperative scheduler inbox.
    ///
    /// Once every queue is full, new bulk requests wait for room.
    ///
    /// Environment variable: `QUEUE_DEPTH`
    #[arg(long, env = "QUEUE_DEPTH", default_value_t = 16)]
    pub queue_depth: usize,

    /// Strategy used by `create_bulk` when the request does not name one:
    /// `blocking`, `offloaded` or `cooperative`.
    ///
    /// Environment variable: `BULK_STRATEGY`
    #[arg(long, env = "BULK_STRATEGY", default_value_t = String::from("offloaded"))]
    pub bulk_strategy: String,

    /// Persons written per store call during bulk creation.
    ///
    /// Environment variable: `BATCH_SIZE`
    #[arg(long, env = "BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Largest `count` a bulk request may ask for.
    ///
    /// Environment variable: `MAX_BULK_COUNT`
    #[arg(long, env = "MAX_BULK_COUNT", default_value_t = MAX_BULK_COUNT)]
    pub max_bulk_count: usize,

    /// Comma-separated URLs fetched by `fetch_data`.
    ///
    /// Environment variable: `FETCH_TARGETS`
    #[arg(
        long,
        env = "FETCH_TARGETS",
        value_delimiter = ',',
        default_value = DEFAULT_FETCH_TARGETS
    )]
    pub fetch_targets: Vec<String>,

    /// Per-target fetch timeout, in seconds.
    ///
    /// Environment variable: `FETCH_TIMEOUT_SECS`
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = 10)]
    pub fetch_timeout_secs: u64,

    /// Maximum number of fetches in flight. `0` means unbounded.
    ///
    /// Environment variable: `FETCH_CONCURRENCY`
    #[arg(long, env = "FETCH_CONCURRENCY", default_value_t = 0)]
    pub fetch_concurrency: usize,

    /// How long shutdown waits for each worker to acknowledge, in seconds.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_SECS`
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 3)]
    pub shutdown_timeout_secs: u64,

    /// SQLite database file. When unset, persons are kept in memory.
    ///
    /// Requires the `sqlite` feature.
    ///
    /// Environment variable: `DATABASE_PATH`
    #[arg(long, env = "DATABASE_PATH")]
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub strategy: StrategyConfig,
    pub bulk_strategy: StrategyKind,
    pub batch_size: usize,
    pub max_bulk_count: usize,
    pub fetch_targets: Vec<FetchTarget>,
    pub fetch_concurrency: usize,
    pub database_path: Option<PathBuf>,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.num_workers == 0 {
            bail!("NUM_WORKERS must be greater than 0");
        }

        if args.queue_depth == 0 {
            bail!("QUEUE_DEPTH must be greater than 0");
        }

        if args.batch_size == 0 {
            bail!("BATCH_SIZE must be greater than 0");
        }

        if args.max_bulk_count == 0 {
            bail!("MAX_BULK_COUNT must be greater than 0");
        }

        if args.fetch_timeout_secs == 0 {
            bail!("FETCH_TIMEOUT_SECS must be greater than 0");
        }

        let bulk_strategy = match args.bulk_strategy.parse::<StrategyKind>() {
            Ok(kind) => kind,
            Err(e) => bail!("BULK_STRATEGY is invalid: {e}"),
        };

        let fetch_timeout = Duration::from_secs(args.fetch_timeout_secs);
        let fetch_targets: Vec<_> = args
            .fetch_targets
            .iter()
            .map(|url| url.trim())
            .filter(|url| !url.is_empty())
            .map(|url| FetchTarget::new(url, fetch_timeout))
            .collect();

        if fetch_targets.is_empty() {
            bail!("FETCH_TARGETS must name at least one URL");
        }

        if args.database_path.is_some() && !cfg!(feature = "sqlite") {
            bail!("DATABASE_PATH requires the `sqlite` feature");
        }

        Ok(Self {
            server_addr: args.server_addr,
            strategy: StrategyConfig {
                num_workers: args.num_workers,
                queue_depth: args.queue_depth,
                shutdown_timeout: Duration::from_secs(args.shutdown_timeout_secs),
            },
            bulk_strategy,
            batch_size: args.batch_size,
            max_bulk_count: args.max_bulk_count,
            fetch_targets,
            fetch_concurrency: args.fetch_concurrency,
            database_path: args.database_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> anyhow::Result<ServerConfig> {
        let args = CliArgs::try_parse_from(["persons-server"].iter().chain(extra))?;
        ServerConfig::try_from(args)
    }

    #[test]
    fn defaults_are_valid() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.server_addr, "0.0.0.0:8000");
        assert_eq!(config.bulk_strategy, StrategyKind::Offloaded);
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.max_bulk_count, 10_000);
        assert_eq!(config.fetch_targets.len(), 10);
        assert_eq!(config.fetch_targets[0].timeout, Duration::from_secs(10));
        assert!(config.strategy.num_workers > 0);
    }

    #[test]
    fn fetch_targets_are_split_on_commas() {
        let config = parse(&["--fetch-targets", "http://a/1, http://b/2,,"]).unwrap();
        let urls: Vec<_> = config.fetch_targets.iter().map(|t| t.url.as_str()).collect();
        assert_eq!(urls, ["http://a/1", "http://b/2"]);
    }

    #[test]
    fn strategy_names_are_case_insensitive() {
        let config = parse(&["--bulk-strategy", "Cooperative"]).unwrap();
        assert_eq!(config.bulk_strategy, StrategyKind::Cooperative);
    }

    #[test]
    fn invalid_values_are_rejected() {
        for extra in [
            &["--num-workers", "0"][..],
            &["--queue-depth", "0"],
            &["--batch-size", "0"],
            &["--max-bulk-count", "0"],
            &["--fetch-timeout-secs", "0"],
            &["--bulk-strategy", "eventually"],
            &["--fetch-targets", " , "],
        ] {
            assert!(parse(extra).is_err(), "{extra:?}");
        }
    }
}
