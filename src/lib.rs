//! # capset-exchange
//!
//! Incremental resource-bartering allocation engine for task-queue worker pools.
//!
//! Given a roster of worker variants (each with a resource profile) and a set
//! of finite resource sources, the engine decides how many workers of each
//! variant should run so that queued tasks are served. Every decision is an
//! elementary trade from a precomputed market: launch a worker from idle
//! supply, stop one, or barter one running worker for others.
//!
//! ## Architecture
//!
//! - **core** — Resource kinds, sources, granule arithmetic, capability profiles, errors
//! - **market** — Sparse exchange vectors and launch/barter trade enumeration
//! - **exchange** — Demand matching, trade valuation and the rebalance loop
//! - **orchestration** — Worker pool trait, count reconciliation, scheduler
//! - **simulation** — Random workload generation

pub mod core;
pub mod exchange;
pub mod market;
pub mod orchestration;
pub mod simulation;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::core::capability::{Capability, CapabilitySet, CapsetCounts};
    pub use crate::core::error::ExchangeError;
    pub use crate::core::quantity::{ConfigurationError, GranuleTable};
    pub use crate::core::resource::{ResourceKind, Source};
    pub use crate::exchange::config::ExchangeConfig;
    pub use crate::exchange::engine::{CapsetExchange, RebalanceOutcome};
    pub use crate::market::builder::{Market, Placement};
    pub use crate::market::vector::{ExchangeVector, Trade, TradeKey};
    pub use crate::orchestration::pool::{InMemoryPool, PoolError, PoolReconciler, WorkerPool};
    pub use crate::orchestration::scheduler::{Scheduler, SchedulerError};
}
