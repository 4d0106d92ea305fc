use crate::core::capability::{CapabilitySet, CapsetCounts};
use crate::core::error::ExchangeError;
use crate::core::quantity::GranuleTable;
use crate::core::resource::{ResourceKind, Source};
use crate::exchange::config::ExchangeConfig;
use crate::exchange::state::{DemandProfile, ExchangeState, TradeEffect, TradeValue};
use crate::market::builder::{Demand, Market, MarketBuilder, Placement, SourceCapacity};
use crate::market::vector::{ExchangeVector, Trade, TradeKey};
use log::{debug, trace, warn};
use rust_decimal::Decimal;
use std::collections::BTreeSet;

/// What one call to [`CapsetExchange::rebalance_detailed`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebalanceOutcome {
    /// Target worker counts for every roster variant, zeros included.
    pub running: CapsetCounts,
    /// Number of trades applied.
    pub steps: usize,
    /// Unserved queued tasks before and after the rebalance.
    pub unmet_before: u64,
    pub unmet_after: u64,
    /// Running workers with no queued task to serve, after the rebalance.
    pub slack_after: u64,
}

/// The allocation engine.
///
/// Holds idle supply per source (in granules) and a running count per
/// placement, that is per roster variant and the sources its workers draw
/// from. Each [`rebalance`](CapsetExchange::rebalance) takes a fresh queue
/// snapshot and hill-climbs through the precomputed market until no feasible
/// trade improves the match between running workers and queued tasks.
///
/// # Examples
///
/// ```
/// use capset_exchange::prelude::*;
/// use rust_decimal_macros::dec;
///
/// let small = CapabilitySet::new(vec![Capability::new([("cpu", dec!(1))])]);
/// let large = CapabilitySet::new(vec![Capability::new([("cpu", dec!(2))])]);
///
/// let mut exchange = CapsetExchange::new(
///     vec![small.clone(), large.clone()],
///     vec![Source::new("cpu", dec!(4))],
/// ).unwrap();
///
/// let mut queue = CapsetCounts::new();
/// queue.insert(large.clone(), 1);
/// queue.insert(small.clone(), 5);
///
/// let running = exchange.rebalance(&queue).unwrap();
/// assert_eq!(running[&small] + 2 * running[&large], 4);
/// assert!(!exchange.is_idle());
/// ```
#[derive(Debug, Clone)]
pub struct CapsetExchange {
    roster: Vec<CapabilitySet>,
    sources: Vec<Source>,
    granules: GranuleTable,
    demands: Vec<Demand>,
    capacities: Vec<SourceCapacity>,
    market: Market,
    effects: Vec<TradeEffect>,
    idle: Vec<i64>,
    running: Vec<i64>,
    config: ExchangeConfig,
}

impl CapsetExchange {
    /// Build an engine with the default configuration.
    ///
    /// Fails with [`ExchangeError::NotEnoughResources`] if some variant can
    /// never be started from the given sources.
    pub fn new(
        variants: impl IntoIterator<Item = CapabilitySet>,
        sources: impl IntoIterator<Item = Source>,
    ) -> Result<Self, ExchangeError> {
        Self::with_config(variants, sources, ExchangeConfig::default())
    }

    pub fn with_config(
        variants: impl IntoIterator<Item = CapabilitySet>,
        sources: impl IntoIterator<Item = Source>,
        config: ExchangeConfig,
    ) -> Result<Self, ExchangeError> {
        let roster: Vec<CapabilitySet> = variants
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let sources: Vec<Source> = sources.into_iter().collect();

        let amounts = sources
            .iter()
            .map(|s| (s.kind.clone(), s.capacity))
            .chain(roster.iter().flat_map(|variant| {
                variant
                    .total_resource_use()
                    .iter()
                    .map(|(kind, amount)| (kind.clone(), *amount))
            }));
        let granules = GranuleTable::build(amounts)?;

        let demands = roster
            .iter()
            .map(|variant| granules.scale(variant.total_resource_use()))
            .collect::<Result<Vec<_>, _>>()?;
        let capacities = sources
            .iter()
            .map(|s| {
                Ok(SourceCapacity {
                    kind: s.kind.clone(),
                    capacity: granules.to_granules(&s.kind, s.capacity)?,
                })
            })
            .collect::<Result<Vec<_>, ExchangeError>>()?;

        let market = MarketBuilder::new(&roster, &demands, &capacities, &config).build()?;
        let effects = market
            .iter()
            .map(|trade| TradeEffect::of(trade, market.placements()))
            .collect();
        debug!(
            "exchange ready: {} variants, {} placements, {} sources, {} granule kinds, {} trades",
            roster.len(),
            market.placements().len(),
            sources.len(),
            granules.len(),
            market.len()
        );

        let idle = capacities.iter().map(|c| c.capacity).collect();
        let running = vec![0; market.placements().len()];
        Ok(Self {
            roster,
            sources,
            granules,
            demands,
            capacities,
            market,
            effects,
            idle,
            running,
            config,
        })
    }

    /// Replace the queue snapshot and converge. Returns the target worker counts.
    pub fn rebalance(&mut self, queued: &CapsetCounts) -> Result<CapsetCounts, ExchangeError> {
        self.rebalance_detailed(queued).map(|outcome| outcome.running)
    }

    /// Like [`rebalance`](CapsetExchange::rebalance), with step and demand statistics.
    ///
    /// Returns [`ExchangeError::NotEnoughResourcesToContinue`] when tasks stay
    /// queued while no worker runs. Trades applied before that point are kept.
    ///
    /// # Panics
    ///
    /// Panics if the loop exceeds `max_rebalance_steps`: every applied trade
    /// strictly improves the valuation, so that means the valuation is broken.
    pub fn rebalance_detailed(&mut self, queued: &CapsetCounts) -> Result<RebalanceOutcome, ExchangeError> {
        let profile = DemandProfile::new(&self.roster, queued);
        for (requirement, count) in profile.uncovered() {
            warn!("{} queued tasks need {}, which no worker variant covers", count, requirement);
        }

        let mut state = profile.evaluate(&self.variant_counts());
        let unmet_before = state.unmet_total();
        let mut steps = 0;

        while let Some((index, value)) = self.best_trade(&profile, &state) {
            assert!(
                steps < self.config.max_rebalance_steps,
                "rebalance did not converge within {} steps (last value {:?})",
                self.config.max_rebalance_steps,
                value
            );
            let trade = self.market.trades()[index].clone();
            trace!("applying {} valued {:?}", trade, value);
            self.apply(&trade);
            steps += 1;
            state = profile.evaluate(&self.variant_counts());
        }

        let outcome = RebalanceOutcome {
            running: self.actors_running(),
            steps,
            unmet_before: unmet_before as u64,
            unmet_after: state.unmet_total() as u64,
            slack_after: state.slack_total() as u64,
        };
        debug!(
            "rebalanced in {} steps: unmet {} -> {}, slack {}, {} workers running",
            outcome.steps,
            outcome.unmet_before,
            outcome.unmet_after,
            outcome.slack_after,
            self.total_running()
        );

        let queued_total = profile.queued_total();
        if queued_total > 0 && self.is_idle() {
            return Err(ExchangeError::NotEnoughResourcesToContinue {
                queued: queued_total,
            });
        }
        Ok(outcome)
    }

    /// The feasible trade with the highest positive value; first in market order on ties.
    fn best_trade(&self, profile: &DemandProfile, state: &ExchangeState) -> Option<(usize, TradeValue)> {
        let running = self.variant_counts();
        let mut best: Option<(usize, TradeValue)> = None;
        for (index, (trade, effect)) in self.market.iter().zip(&self.effects).enumerate() {
            if !self.can_apply(trade) {
                continue;
            }
            let value = match state.valuation(profile, &running, effect) {
                Some(value) if value.is_positive() => value,
                _ => continue,
            };
            if best.map_or(true, |(_, current)| value > current) {
                best = Some((index, value));
            }
        }
        best
    }

    /// True iff applying `trade` keeps every source within `[0, capacity]`
    /// and every placement count non-negative.
    pub fn can_apply(&self, trade: &Trade) -> bool {
        trade.iter().all(|(key, delta)| match key {
            TradeKey::Source(i) => {
                let next = self.idle[*i] + delta;
                next >= 0 && next <= self.capacities[*i].capacity
            }
            TradeKey::Placement(p) => self.running[*p] + delta >= 0,
        })
    }

    fn apply(&mut self, trade: &Trade) {
        debug_assert!(self.can_apply(trade));
        for (key, delta) in trade.iter() {
            match key {
                TradeKey::Source(i) => self.idle[*i] += delta,
                TradeKey::Placement(p) => self.running[*p] += delta,
            }
        }
    }

    /// Running workers per roster variant, summed over placements.
    fn variant_counts(&self) -> Vec<i64> {
        let mut counts = vec![0; self.roster.len()];
        for (placement, count) in self.market.placements().iter().zip(&self.running) {
            counts[placement.variant] += count;
        }
        counts
    }

    // --- Queries ---

    /// True iff no worker is running.
    pub fn is_idle(&self) -> bool {
        self.running.iter().all(|count| *count == 0)
    }

    /// Target counts for every roster variant, zeros included.
    pub fn actors_running(&self) -> CapsetCounts {
        self.roster
            .iter()
            .zip(self.variant_counts())
            .map(|(variant, count)| (variant.clone(), count as u64))
            .collect()
    }

    pub fn running_count(&self, capset: &CapabilitySet) -> u64 {
        self.position(capset)
            .map(|v| self.variant_counts()[v] as u64)
            .unwrap_or(0)
    }

    /// Running workers per placement, in the order of [`Market::placements`].
    pub fn placement_counts(&self) -> &[i64] {
        &self.running
    }

    /// Placements of one variant that currently run workers, with their counts.
    pub fn placements_running(&self, capset: &CapabilitySet) -> Vec<(&Placement, i64)> {
        match self.position(capset) {
            Some(variant) => self
                .market
                .placements_of(variant)
                .filter(|p| self.running[*p] > 0)
                .map(|p| (&self.market.placements()[p], self.running[p]))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Granules held by running workers per source, in source order.
    pub fn held(&self) -> Vec<i64> {
        let mut held = vec![0; self.capacities.len()];
        for (placement, count) in self.market.placements().iter().zip(&self.running) {
            for (key, amount) in placement.draw.scaled(*count).iter() {
                if let TradeKey::Source(i) = key {
                    held[*i] += amount;
                }
            }
        }
        held
    }

    pub fn total_running(&self) -> u64 {
        self.running.iter().map(|count| *count as u64).sum()
    }

    /// Remaining granules per source, in source order.
    pub fn idle_sources(&self) -> &[i64] {
        &self.idle
    }

    /// Remaining supply of one source in natural units.
    pub fn idle_amount(&self, source: usize) -> Option<Decimal> {
        let kind = &self.sources.get(source)?.kind;
        // a kind with no granule only ever had zero supply
        Some(
            self.granules
                .to_amount(kind, self.idle[source])
                .unwrap_or(Decimal::ZERO),
        )
    }

    /// Source capacities in granules, in source order.
    pub fn capacities(&self) -> Vec<i64> {
        self.capacities.iter().map(|c| c.capacity).collect()
    }

    /// Granules of `kind` held by running workers.
    pub fn consumed(&self, kind: &ResourceKind) -> i64 {
        self.demands
            .iter()
            .zip(self.variant_counts())
            .map(|(demand, count)| demand.get(kind) * count)
            .sum()
    }

    /// Share of the total supply of `kind` held by running workers, in `[0, 1]`.
    pub fn utilization(&self, kind: &ResourceKind) -> f64 {
        let total: i64 = self
            .capacities
            .iter()
            .filter(|c| c.kind == *kind)
            .map(|c| c.capacity)
            .sum();
        if total == 0 {
            return 0.0;
        }
        self.consumed(kind) as f64 / total as f64
    }

    /// Engine state as one non-negative vector: idle granules and running
    /// counts per placement.
    pub fn snapshot(&self) -> ExchangeVector<TradeKey> {
        let idle = self
            .idle
            .iter()
            .enumerate()
            .map(|(i, v)| (TradeKey::Source(i), *v));
        let running = self
            .running
            .iter()
            .enumerate()
            .map(|(p, count)| (TradeKey::Placement(p), *count));
        idle.chain(running).collect()
    }

    /// Matching of `queued` against the current running counts, without trading.
    pub fn exchange_state(&self, queued: &CapsetCounts) -> ExchangeState {
        DemandProfile::new(&self.roster, queued).evaluate(&self.variant_counts())
    }

    /// Position of a variant in the sorted roster.
    pub fn position(&self, capset: &CapabilitySet) -> Option<usize> {
        self.roster.binary_search(capset).ok()
    }

    pub fn roster(&self) -> &[CapabilitySet] {
        &self.roster
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn granules(&self) -> &GranuleTable {
        &self.granules
    }

    /// Granule-scaled demand of a roster variant.
    pub fn demand(&self, variant: usize) -> &Demand {
        &self.demands[variant]
    }

    pub fn market(&self) -> &Market {
        &self.market
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }
}
