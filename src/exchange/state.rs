use crate::core::capability::{CapabilitySet, CapsetCounts};
use crate::market::builder::Placement;
use crate::market::vector::{Trade, TradeKey};
use std::cmp::Reverse;

/// Queued requirements of one rebalance, with the roster variants able to serve each.
///
/// Requirements are matched most constrained first: fewest covering variants,
/// then heaviest capability set. The covering variants of each requirement are
/// listed in roster order, lightest first. `covers` is evaluated once here
/// rather than per trade.
#[derive(Debug, Clone)]
pub struct DemandProfile {
    requirements: Vec<(CapabilitySet, u64)>,
    coverers: Vec<Vec<usize>>,
}

impl DemandProfile {
    pub fn new(roster: &[CapabilitySet], queued: &CapsetCounts) -> Self {
        let mut entries: Vec<((CapabilitySet, u64), Vec<usize>)> = queued
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(requirement, count)| {
                let coverers = roster
                    .iter()
                    .enumerate()
                    .filter(|(_, variant)| variant.covers(requirement))
                    .map(|(i, _)| i)
                    .collect();
                ((requirement.clone(), *count), coverers)
            })
            .collect();
        entries.sort_by(|((a, _), ca), ((b, _), cb)| {
            (ca.len(), Reverse(a)).cmp(&(cb.len(), Reverse(b)))
        });
        let (requirements, coverers): (Vec<_>, Vec<_>) = entries.into_iter().unzip();
        Self {
            requirements,
            coverers,
        }
    }

    /// Requirements in matching order.
    pub fn requirements(&self) -> &[(CapabilitySet, u64)] {
        &self.requirements
    }

    /// Queued requirements no roster variant covers, with their counts.
    pub fn uncovered(&self) -> impl Iterator<Item = (&CapabilitySet, u64)> {
        self.requirements
            .iter()
            .zip(&self.coverers)
            .filter(|(_, coverers)| coverers.is_empty())
            .map(|((capset, count), _)| (capset, *count))
    }

    pub fn queued_total(&self) -> u64 {
        self.requirements.iter().map(|(_, count)| count).sum()
    }

    /// First-fit matching of queued tasks onto `running` (indexed by roster position).
    pub fn evaluate(&self, running: &[i64]) -> ExchangeState {
        let mut available = running.to_vec();
        let mut unmet = Vec::with_capacity(self.requirements.len());
        for ((_, count), coverers) in self.requirements.iter().zip(&self.coverers) {
            let mut remaining = *count as i64;
            for &variant in coverers {
                if remaining == 0 {
                    break;
                }
                let take = remaining.min(available[variant].max(0));
                available[variant] -= take;
                remaining -= take;
            }
            unmet.push(remaining);
        }
        ExchangeState {
            slack: available,
            unmet,
        }
    }

    /// Residual per capability set: positive = slack, negative = unmet demand.
    pub fn residuals(&self, roster: &[CapabilitySet], state: &ExchangeState) -> CapsetResiduals {
        let mut residuals = CapsetResiduals::new();
        for (variant, slack) in roster.iter().zip(&state.slack) {
            if *slack != 0 {
                *residuals.entry(variant.clone()).or_insert(0) += slack;
            }
        }
        for ((requirement, _), unmet) in self.requirements.iter().zip(&state.unmet) {
            if *unmet != 0 {
                *residuals.entry(requirement.clone()).or_insert(0) -= unmet;
            }
        }
        residuals.retain(|_, r| *r != 0);
        residuals
    }
}

/// Signed residuals keyed by capability set.
pub type CapsetResiduals = std::collections::BTreeMap<CapabilitySet, i64>;

/// A trade seen from the matcher: net running-count change per roster
/// variant, and net granules returned to idle supply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradeEffect {
    variants: Vec<(usize, i64)>,
    resource_relief: i64,
}

impl TradeEffect {
    pub fn new(variants: Vec<(usize, i64)>, resource_relief: i64) -> Self {
        Self {
            variants,
            resource_relief,
        }
    }

    /// Fold a placement-keyed trade down to its variants.
    pub fn of(trade: &Trade, placements: &[Placement]) -> Self {
        let mut variants: Vec<(usize, i64)> = Vec::new();
        let mut resource_relief = 0;
        for (key, delta) in trade.iter() {
            match key {
                TradeKey::Source(_) => resource_relief += delta,
                TradeKey::Placement(p) => {
                    let variant = placements[*p].variant;
                    match variants.iter_mut().find(|(v, _)| *v == variant) {
                        Some((_, total)) => *total += delta,
                        None => variants.push((variant, delta)),
                    }
                }
            }
        }
        variants.retain(|(_, delta)| *delta != 0);
        Self {
            variants,
            resource_relief,
        }
    }

    pub fn variants(&self) -> &[(usize, i64)] {
        &self.variants
    }

    pub fn resource_relief(&self) -> i64 {
        self.resource_relief
    }
}

/// Outcome of one matching pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeState {
    /// Unmatched running workers, per roster position.
    slack: Vec<i64>,
    /// Unserved queued tasks, per requirement of the profile.
    unmet: Vec<i64>,
}

impl ExchangeState {
    pub fn slack(&self) -> &[i64] {
        &self.slack
    }

    pub fn unmet(&self) -> &[i64] {
        &self.unmet
    }

    pub fn slack_total(&self) -> i64 {
        self.slack.iter().sum()
    }

    pub fn unmet_total(&self) -> i64 {
        self.unmet.iter().sum()
    }

    /// Running workers of a variant currently matched to queued tasks.
    pub fn matched(&self, variant: usize, running: &[i64]) -> i64 {
        running[variant] - self.slack[variant]
    }

    /// Score a trade against this state by re-matching the post-trade counts.
    ///
    /// Returns `None` when some requirement would end up with more unserved
    /// tasks than it has now. Such a trade strips capacity matched to that
    /// requirement, whatever it does for the others.
    pub fn valuation(
        &self,
        profile: &DemandProfile,
        running: &[i64],
        effect: &TradeEffect,
    ) -> Option<TradeValue> {
        let mut next = running.to_vec();
        for (variant, delta) in effect.variants() {
            next[*variant] += delta;
        }
        let after = profile.evaluate(&next);
        if self.unmet.iter().zip(&after.unmet).any(|(before, after)| after > before) {
            return None;
        }
        Some(TradeValue {
            unmet_relief: self.unmet_total() - after.unmet_total(),
            slack_relief: self.slack_total() - after.slack_total(),
            resource_relief: effect.resource_relief(),
        })
    }
}

/// Lexicographic trade score: unmet demand relieved first, then slack
/// relieved, then idle granules released.
///
/// Only values strictly above [`TradeValue::ZERO`] are worth applying.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct TradeValue {
    pub unmet_relief: i64,
    pub slack_relief: i64,
    pub resource_relief: i64,
}

impl TradeValue {
    pub const ZERO: TradeValue = TradeValue {
        unmet_relief: 0,
        slack_relief: 0,
        resource_relief: 0,
    };

    pub fn is_positive(&self) -> bool {
        *self > Self::ZERO
    }
}
