//! Random workload generation for benchmarks, demos and the CLI.
//!
//! Every generated roster is launchable against its generated sources: each
//! source of a kind is at least as large as the heaviest per-kind demand.

use crate::core::capability::{Capability, CapabilitySet, CapsetCounts};
use crate::core::resource::{ResourceKind, Source};
use rand::seq::SliceRandom;
use rand::Rng;
use rust_decimal::Decimal;

/// Shape of a random workload.
#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    /// Resource kinds to draw from.
    pub kinds: Vec<ResourceKind>,
    /// Number of worker variants in the roster.
    pub variant_count: usize,
    /// Largest per-kind demand of one variant, in units.
    pub max_units: u32,
    /// Natural-unit size of one unit (e.g. `0.5` CPU).
    pub unit: Decimal,
    /// Sources per kind.
    pub sources_per_kind: usize,
    /// Source capacity range, in units. The lower bound is raised to
    /// `max_units` if needed.
    pub min_source_units: u32,
    pub max_source_units: u32,
    /// Largest queued count per requirement in one snapshot.
    pub max_queued: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            kinds: vec![ResourceKind::new("cpu"), ResourceKind::new("mem")],
            variant_count: 4,
            max_units: 4,
            unit: Decimal::ONE,
            sources_per_kind: 1,
            min_source_units: 8,
            max_source_units: 16,
            max_queued: 10,
        }
    }
}

/// A roster, its sources and a sequence of queue snapshots.
#[derive(Debug, Clone)]
pub struct Workload {
    pub roster: Vec<CapabilitySet>,
    pub sources: Vec<Source>,
    pub snapshots: Vec<CapsetCounts>,
}

/// Random roster of distinct, named variants. Each variant uses at least one kind.
pub fn generate_roster<R: Rng + ?Sized>(config: &WorkloadConfig, rng: &mut R) -> Vec<CapabilitySet> {
    if config.kinds.is_empty() {
        return Vec::new();
    }
    let max_units = config.max_units.max(1);
    (0..config.variant_count)
        .map(|i| {
            let used = rng.gen_range(1..=config.kinds.len());
            let kinds: Vec<&ResourceKind> = config.kinds.choose_multiple(rng, used).collect();
            let resources: Vec<(ResourceKind, Decimal)> = kinds
                .into_iter()
                .map(|kind| {
                    let units = rng.gen_range(1..=max_units);
                    (kind.clone(), config.unit * Decimal::from(units))
                })
                .collect();
            CapabilitySet::new(vec![Capability::named(format!("v{:02}", i), resources)])
        })
        .collect()
}

/// Random sources, `sources_per_kind` for every configured kind.
pub fn generate_sources<R: Rng + ?Sized>(config: &WorkloadConfig, rng: &mut R) -> Vec<Source> {
    let low = config.min_source_units.max(config.max_units).max(1);
    let high = config.max_source_units.max(low);
    config
        .kinds
        .iter()
        .flat_map(|kind| std::iter::repeat(kind).take(config.sources_per_kind))
        .map(|kind| {
            let units = rng.gen_range(low..=high);
            Source::new(kind.clone(), config.unit * Decimal::from(units))
        })
        .collect()
}

/// Random queue snapshot over requirements taken from `roster`.
pub fn generate_queue<R: Rng + ?Sized>(
    roster: &[CapabilitySet],
    config: &WorkloadConfig,
    rng: &mut R,
) -> CapsetCounts {
    let mut queue = CapsetCounts::new();
    for capset in roster {
        if !rng.gen_bool(0.7) {
            continue;
        }
        let count = rng.gen_range(0..=config.max_queued);
        if count > 0 {
            queue.insert(capset.clone(), count);
        }
    }
    queue
}

/// Full workload with `ticks` queue snapshots.
pub fn generate_workload<R: Rng + ?Sized>(config: &WorkloadConfig, ticks: usize, rng: &mut R) -> Workload {
    let roster = generate_roster(config, rng);
    let sources = generate_sources(config, rng);
    let snapshots = (0..ticks)
        .map(|_| generate_queue(&roster, config, rng))
        .collect();
    Workload {
        roster,
        sources,
        snapshots,
    }
}
