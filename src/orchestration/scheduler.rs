use crate::core::capability::{CapabilitySet, CapsetCounts};
use crate::core::error::ExchangeError;
use crate::exchange::engine::CapsetExchange;
use crate::orchestration::pool::{PoolError, PoolReconciler, SyncReport, WorkerPool};
use log::{debug, error};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Single coordination point between a task queue, the exchange and a pool.
///
/// The scheduler only tracks how many tasks of each requirement are queued.
/// Every [`reorganize`](Scheduler::reorganize) hands that snapshot to the
/// exchange and applies the resulting targets to the pool.
pub struct Scheduler<P: WorkerPool> {
    exchange: CapsetExchange,
    pool: P,
    reconciler: PoolReconciler,
    queued: CapsetCounts,
}

impl<P: WorkerPool> Scheduler<P> {
    pub fn new(exchange: CapsetExchange, pool: P) -> Self {
        Self {
            exchange,
            pool,
            reconciler: PoolReconciler::new(),
            queued: CapsetCounts::new(),
        }
    }

    /// Queue `count` tasks that need `requirement`.
    pub fn enqueue(&mut self, requirement: CapabilitySet, count: u64) {
        if count > 0 {
            *self.queued.entry(requirement).or_insert(0) += count;
        }
    }

    /// Remove up to `count` queued tasks of `requirement`; returns how many were removed.
    pub fn take(&mut self, requirement: &CapabilitySet, count: u64) -> u64 {
        let Some(queued) = self.queued.get_mut(requirement) else {
            return 0;
        };
        let taken = count.min(*queued);
        *queued -= taken;
        if *queued == 0 {
            self.queued.remove(requirement);
        }
        taken
    }

    /// Rebalance against the current queue and bring the pool in line.
    ///
    /// On a dead end (tasks queued, nothing can run) the pool is still synced
    /// to the engine state before the error is returned.
    pub fn reorganize(&mut self) -> Result<SyncReport, SchedulerError> {
        debug!(
            "reorganizing: {} queued, {} workers",
            self.queued_total(),
            self.worker_total()
        );
        match self.exchange.rebalance(&self.queued) {
            Ok(targets) => Ok(self.reconciler.sync(&mut self.pool, &targets)?),
            Err(err) => {
                error!("reorganize failed: {}", err);
                let targets = self.exchange.actors_running();
                self.reconciler.sync(&mut self.pool, &targets)?;
                Err(err.into())
            }
        }
    }

    /// Lightest running variant able to serve `requirement`.
    pub fn route(&self, requirement: &CapabilitySet) -> Option<&CapabilitySet> {
        self.exchange
            .roster()
            .iter()
            .find(|variant| self.reconciler.running(variant) > 0 && variant.covers(requirement))
    }

    /// Stop every worker. Queued counts are kept.
    pub fn shutdown(&mut self) -> Result<SyncReport, SchedulerError> {
        self.exchange.rebalance(&CapsetCounts::new())?;
        let targets = self.exchange.actors_running();
        Ok(self.reconciler.sync(&mut self.pool, &targets)?)
    }

    pub fn queued(&self) -> &CapsetCounts {
        &self.queued
    }

    pub fn queued_total(&self) -> u64 {
        self.queued.values().sum()
    }

    /// Physical workers per variant.
    pub fn workers(&self) -> &CapsetCounts {
        self.reconciler.physical()
    }

    pub fn worker_total(&self) -> u64 {
        self.reconciler.physical().values().sum()
    }

    pub fn exchange(&self) -> &CapsetExchange {
        &self.exchange
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut P {
        &mut self.pool
    }

    pub fn into_pool(self) -> P {
        self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::capability::Capability;
    use crate::core::resource::Source;
    use crate::orchestration::pool::InMemoryPool;
    use rust_decimal_macros::dec;

    fn cpu(name: &str, amount: rust_decimal::Decimal) -> CapabilitySet {
        CapabilitySet::new(vec![Capability::named(name, [("cpu", amount)])])
    }

    fn scheduler(variants: Vec<CapabilitySet>, capacity: rust_decimal::Decimal) -> Scheduler<InMemoryPool> {
        let exchange = CapsetExchange::new(variants, vec![Source::new("cpu", capacity)]).unwrap();
        Scheduler::new(exchange, InMemoryPool::new())
    }

    #[test]
    fn test_enqueue_and_take() {
        let small = cpu("small", dec!(1));
        let mut s = scheduler(vec![small.clone()], dec!(2));
        s.enqueue(small.clone(), 3);
        s.enqueue(small.clone(), 0);
        assert_eq!(s.queued_total(), 3);

        assert_eq!(s.take(&small, 2), 2);
        assert_eq!(s.take(&small, 5), 1);
        assert_eq!(s.take(&small, 1), 0);
        assert!(s.queued().is_empty());
    }

    #[test]
    fn test_reorganize_starts_workers_in_pool() {
        let small = cpu("small", dec!(1));
        let mut s = scheduler(vec![small.clone()], dec!(2));
        s.enqueue(small.clone(), 5);

        let report = s.reorganize().unwrap();
        assert_eq!(report.started, 2);
        assert_eq!(s.pool().running(&small), 2);
        assert_eq!(s.worker_total(), 2);
        assert_eq!(s.route(&small), Some(&small));
    }

    #[test]
    fn test_route_picks_lightest_running_coverer() {
        let small = cpu("small", dec!(1));
        let large = cpu("large", dec!(2));
        let mut s = scheduler(vec![small.clone(), large.clone()], dec!(3));
        s.enqueue(small.clone(), 1);
        s.enqueue(large.clone(), 1);
        s.reorganize().unwrap();

        assert_eq!(s.route(&small), Some(&small));
        assert_eq!(s.route(&large), Some(&large));
        assert_eq!(s.route(&cpu("huge", dec!(5))), None);
    }

    #[test]
    fn test_dead_end_is_reported() {
        let small = cpu("small", dec!(1));
        let mut s = scheduler(vec![small], dec!(2));
        s.enqueue(cpu("huge", dec!(2)), 1);

        let err = s.reorganize().unwrap_err();
        assert_eq!(
            err,
            SchedulerError::Exchange(ExchangeError::NotEnoughResourcesToContinue { queued: 1 })
        );
        assert_eq!(s.worker_total(), 0);
    }

    #[test]
    fn test_shutdown_stops_everything() {
        let small = cpu("small", dec!(1));
        let mut s = scheduler(vec![small.clone()], dec!(4));
        s.enqueue(small.clone(), 4);
        s.reorganize().unwrap();

        let report = s.shutdown().unwrap();
        assert_eq!(report.stopped, 4);
        assert_eq!(s.pool().total_running(), 0);
        assert!(s.exchange().is_idle());
        assert_eq!(s.queued_total(), 4);
    }
}
