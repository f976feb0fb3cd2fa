use super::{Execute, StrategyKind};
use crate::Result;

/// Runs the unit of work inline, on whichever thread polls the future.
///
/// Nothing else scheduled on that thread can make progress until the work
/// returns. This is the baseline the other strategies are measured against.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blocking;

impl Execute for Blocking {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Blocking
    }

    fn run<T, F>(&self, work: F) -> impl Future<Output = Result<T>> + Send
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        async move { work() }
    }
}
