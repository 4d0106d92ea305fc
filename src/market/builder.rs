use crate::core::capability::CapabilitySet;
use crate::core::error::ExchangeError;
use crate::core::resource::ResourceKind;
use crate::exchange::config::ExchangeConfig;
use crate::market::vector::{ExchangeVector, Trade, TradeKey};
use log::debug;
use std::collections::{BTreeSet, HashMap};

/// Granule-scaled demand of one worker variant, keyed by resource kind.
pub type Demand = ExchangeVector<ResourceKind>;

/// A source's kind and capacity, expressed in granules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCapacity {
    pub kind: ResourceKind,
    pub capacity: i64,
}

/// One way of running a roster variant: the variant and the granules it holds
/// in each source it draws from.
///
/// Running workers are counted per placement, so a stopped or bartered worker
/// returns its supply to exactly the sources that paid for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub variant: usize,
    /// Non-negative, keyed by `TradeKey::Source`.
    pub draw: Trade,
}

/// The immutable set of every elementary reallocation, with inverses.
///
/// Trades are stored in the total order of [`ExchangeVector`], so two markets
/// built from the same roster and sources list their trades identically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Market {
    placements: Vec<Placement>,
    trades: Vec<Trade>,
}

impl Market {
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trade> {
        self.trades.iter()
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn contains(&self, trade: &Trade) -> bool {
        self.trades.binary_search(trade).is_ok()
    }

    /// Every placement, grouped by variant in roster order.
    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    /// Indices of the placements of one roster variant.
    pub fn placements_of(&self, variant: usize) -> impl Iterator<Item = usize> + '_ {
        self.placements
            .iter()
            .enumerate()
            .filter(move |(_, placement)| placement.variant == variant)
            .map(|(p, _)| p)
    }
}

struct SearchFrame {
    next: usize,
    chosen: usize,
    trade: Trade,
}

/// Enumerates placements, launch trades and barter trades for a sorted roster.
///
/// `demands[i]` is the granule-scaled `total_resource_use` of `roster[i]`.
pub struct MarketBuilder<'a> {
    roster: &'a [CapabilitySet],
    demands: &'a [Demand],
    sources: &'a [SourceCapacity],
    config: &'a ExchangeConfig,
    combinations: HashMap<Demand, Vec<Trade>>,
    placements: Vec<Placement>,
    by_variant: Vec<Vec<usize>>,
}

impl<'a> MarketBuilder<'a> {
    pub fn new(
        roster: &'a [CapabilitySet],
        demands: &'a [Demand],
        sources: &'a [SourceCapacity],
        config: &'a ExchangeConfig,
    ) -> Self {
        Self {
            roster,
            demands,
            sources,
            config,
            combinations: HashMap::new(),
            placements: Vec::new(),
            by_variant: Vec::new(),
        }
    }

    /// Every way of drawing `demand` from the sources, one source per kind.
    ///
    /// Each combination is a non-negative vector over `TradeKey::Source`. A
    /// source smaller than the requirement for its kind is never used for it.
    /// The result is empty when some kind has no qualifying source, and holds
    /// the single zero vector for an empty demand.
    pub fn source_combinations(&mut self, demand: &Demand) -> Vec<Trade> {
        if let Some(cached) = self.combinations.get(demand) {
            return cached.clone();
        }

        let mut combos = vec![Trade::new()];
        for (kind, need) in demand.iter() {
            if need <= 0 {
                continue;
            }
            let candidates: Vec<usize> = self
                .sources
                .iter()
                .enumerate()
                .filter(|(_, s)| s.kind == *kind && s.capacity >= need)
                .map(|(i, _)| i)
                .collect();
            if candidates.is_empty() {
                combos.clear();
                break;
            }
            combos = combos
                .iter()
                .flat_map(|combo| {
                    candidates.iter().map(move |&i| {
                        let mut next = combo.clone();
                        next.shift(TradeKey::Source(i), need);
                        next
                    })
                })
                .collect();
        }

        self.combinations.insert(demand.clone(), combos.clone());
        combos
    }

    /// One placement per variant and source combination, in roster order.
    ///
    /// Fails with [`ExchangeError::NotEnoughResources`] naming the first
    /// variant that no source combination can pay for.
    pub fn place(&mut self) -> Result<&[Placement], ExchangeError> {
        let demands = self.demands;
        self.placements.clear();
        self.by_variant = vec![Vec::new(); self.roster.len()];
        for (variant, demand) in demands.iter().enumerate() {
            let combos = self.source_combinations(demand);
            if combos.is_empty() {
                return Err(ExchangeError::NotEnoughResources {
                    capset: self.roster[variant].clone(),
                });
            }
            for draw in combos {
                self.by_variant[variant].push(self.placements.len());
                self.placements.push(Placement { variant, draw });
            }
        }
        Ok(&self.placements)
    }

    /// `{placement: +1}` minus what the placement draws from idle supply.
    pub fn launch_trade(&self, placement: usize) -> Trade {
        let mut trade = -&self.placements[placement].draw;
        trade.shift(TradeKey::Placement(placement), 1);
        trade
    }

    /// Retire one worker and start a set of distinct other variants in its place.
    ///
    /// The retired worker's draw goes back to its own sources; each started
    /// worker takes its whole per-kind demand from one source of some
    /// placement. The net source delta is the refund (positive) or the
    /// top-up from idle supply (negative).
    ///
    /// Depth-first over the roster with an explicit stack. Since draws are
    /// non-negative, a combination that cannot be settled prunes all of its
    /// supersets.
    pub fn barter_trades(&self, placement: usize) -> Vec<Trade> {
        let retired = &self.placements[placement];
        let limit = self.config.max_barter_size.unwrap_or(self.roster.len());
        let mut base = retired.draw.clone();
        base.shift(TradeKey::Placement(placement), -1);

        let mut trades = Vec::new();
        let mut stack = vec![SearchFrame {
            next: 0,
            chosen: 0,
            trade: base,
        }];

        while let Some(frame) = stack.pop() {
            if frame.chosen >= limit {
                continue;
            }
            for other in frame.next..self.roster.len() {
                if other == retired.variant {
                    continue;
                }
                for &candidate in &self.by_variant[other] {
                    let mut trade = &frame.trade - &self.placements[candidate].draw;
                    trade.shift(TradeKey::Placement(candidate), 1);
                    if !self.settleable(&trade) {
                        continue;
                    }
                    trades.push(trade.clone());
                    stack.push(SearchFrame {
                        next: other + 1,
                        chosen: frame.chosen + 1,
                        trade,
                    });
                }
            }
        }
        trades
    }

    /// A shortfall may be drawn from idle supply only when top-ups are
    /// enabled and each source's share fits its capacity.
    fn settleable(&self, trade: &Trade) -> bool {
        let top_up = (-trade)
            .filtered(|key| matches!(key, TradeKey::Source(_)))
            .pos_part();
        if top_up.is_empty() {
            return true;
        }
        self.config.barter_top_up
            && top_up.iter().all(|(key, d)| match key {
                TradeKey::Source(i) => d <= self.sources[*i].capacity,
                TradeKey::Placement(_) => true,
            })
    }

    /// The full market: launches and barters of every placement plus their inverses.
    ///
    /// Fails with [`ExchangeError::NotEnoughResources`] naming the first
    /// variant (in roster order) that no source combination can pay for.
    pub fn build(mut self) -> Result<Market, ExchangeError> {
        self.place()?;
        let mut trades: BTreeSet<Trade> = BTreeSet::new();
        for placement in 0..self.placements.len() {
            let launch = self.launch_trade(placement);
            let barters = self.barter_trades(placement);
            debug!(
                "placement {} of {} yields {} barter trades",
                placement,
                self.roster[self.placements[placement].variant],
                barters.len()
            );
            for trade in std::iter::once(launch).chain(barters) {
                trades.insert(-&trade);
                trades.insert(trade);
            }
        }

        debug!(
            "market built: {} trades over {} placements of {} variants and {} sources ({} memoized demands)",
            trades.len(),
            self.placements.len(),
            self.roster.len(),
            self.sources.len(),
            self.combinations.len()
        );
        Ok(Market {
            placements: self.placements,
            trades: trades.into_iter().collect(),
        })
    }
}
