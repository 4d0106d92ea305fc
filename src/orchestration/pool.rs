use crate::core::capability::{CapabilitySet, CapsetCounts};
use log::{debug, info};
use thiserror::Error;

/// Errors raised by a worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("failed to start worker {capset}: {reason}")]
    StartFailed { capset: CapabilitySet, reason: String },

    #[error("failed to stop worker {capset}: {reason}")]
    StopFailed { capset: CapabilitySet, reason: String },

    /// A stop was requested for a variant with no physical worker.
    #[error("no running worker of {0} to stop")]
    NotRunning(CapabilitySet),
}

/// Starts and stops physical workers of a given variant.
///
/// Implementations wrap whatever actually runs workers: threads, processes,
/// remote actors.
pub trait WorkerPool {
    fn start_worker(&mut self, capset: &CapabilitySet) -> Result<(), PoolError>;

    fn stop_worker(&mut self, capset: &CapabilitySet) -> Result<(), PoolError>;
}

/// One start or stop issued to a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    Started(CapabilitySet),
    Stopped(CapabilitySet),
}

/// Pool that only counts workers and records every call.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPool {
    running: CapsetCounts,
    events: Vec<PoolEvent>,
}

impl InMemoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn running(&self, capset: &CapabilitySet) -> u64 {
        self.running.get(capset).copied().unwrap_or(0)
    }

    pub fn total_running(&self) -> u64 {
        self.running.values().sum()
    }

    pub fn events(&self) -> &[PoolEvent] {
        &self.events
    }

    /// Hand back the recorded events and start a fresh log.
    pub fn drain_events(&mut self) -> Vec<PoolEvent> {
        std::mem::take(&mut self.events)
    }
}

impl WorkerPool for InMemoryPool {
    fn start_worker(&mut self, capset: &CapabilitySet) -> Result<(), PoolError> {
        *self.running.entry(capset.clone()).or_insert(0) += 1;
        self.events.push(PoolEvent::Started(capset.clone()));
        Ok(())
    }

    fn stop_worker(&mut self, capset: &CapabilitySet) -> Result<(), PoolError> {
        match self.running.get_mut(capset) {
            Some(count) if *count > 0 => {
                *count -= 1;
                if *count == 0 {
                    self.running.remove(capset);
                }
                self.events.push(PoolEvent::Stopped(capset.clone()));
                Ok(())
            }
            _ => Err(PoolError::NotRunning(capset.clone())),
        }
    }
}

/// Starts and stops issued by one [`PoolReconciler::sync`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub started: u64,
    pub stopped: u64,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        self.started == 0 && self.stopped == 0
    }
}

/// Keeps a pool's physical worker counts in line with engine targets.
#[derive(Debug, Clone, Default)]
pub struct PoolReconciler {
    physical: CapsetCounts,
}

impl PoolReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Physical workers of `capset` as last synced.
    pub fn running(&self, capset: &CapabilitySet) -> u64 {
        self.physical.get(capset).copied().unwrap_or(0)
    }

    pub fn physical(&self) -> &CapsetCounts {
        &self.physical
    }

    /// Bring the pool to `targets`. All stops are issued before any start so
    /// freed resources are available to the new workers.
    ///
    /// Variants missing from `targets` are left alone. On failure the
    /// recorded counts reflect every call that succeeded.
    pub fn sync<P: WorkerPool>(
        &mut self,
        pool: &mut P,
        targets: &CapsetCounts,
    ) -> Result<SyncReport, PoolError> {
        let mut report = SyncReport::default();

        for (capset, &target) in targets {
            let current = self.running(capset);
            if target < current {
                debug!("stopping {} of {} ({} -> {})", current - target, capset, current, target);
                for _ in target..current {
                    pool.stop_worker(capset)?;
                    self.record(capset, -1);
                    report.stopped += 1;
                }
            }
        }

        for (capset, &target) in targets {
            let current = self.running(capset);
            if target > current {
                debug!("starting {} of {} ({} -> {})", target - current, capset, current, target);
                for _ in current..target {
                    pool.start_worker(capset)?;
                    self.record(capset, 1);
                    report.started += 1;
                }
            }
        }

        if !report.is_noop() {
            info!("pool synced: {} started, {} stopped", report.started, report.stopped);
        }
        Ok(report)
    }

    fn record(&mut self, capset: &CapabilitySet, delta: i64) {
        let count = self.physical.entry(capset.clone()).or_insert(0);
        *count = (*count as i64 + delta) as u64;
        if *count == 0 {
            self.physical.remove(capset);
        }
    }
}
