//! Synthetic workloads for exercising the exchange.

pub mod workload;
