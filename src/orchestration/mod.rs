//! Glue between the exchange and whatever runs workers: a pluggable pool,
//! count reconciliation and a queue-driven scheduler.

pub mod pool;
pub mod scheduler;
