//! The allocation engine: configuration, demand matching and valuation,
//! and the hill-climbing rebalance loop.

pub mod config;
pub mod engine;
pub mod state;
