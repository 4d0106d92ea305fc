use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

/// Key space of engine state and trades: a source by index, or a placement
/// (a roster variant drawing from fixed sources) by its index in the market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TradeKey {
    Source(usize),
    Placement(usize),
}

impl fmt::Display for TradeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeKey::Source(i) => write!(f, "source#{}", i),
            TradeKey::Placement(i) => write!(f, "placement#{}", i),
        }
    }
}

/// A signed reallocation over idle supply and running-worker counts.
pub type Trade = ExchangeVector<TradeKey>;

/// Sparse integer vector. Missing keys read as zero and zero entries are
/// never stored, so structurally equal vectors compare equal.
///
/// The same type serves as a state snapshot (all entries non-negative), as a
/// trade (signed delta) and, keyed by resource kind, as a granule-scaled
/// demand.
///
/// # Examples
///
/// ```
/// use capset_exchange::market::vector::ExchangeVector;
///
/// let state: ExchangeVector<&str> = [("idle", 2), ("x", 1)].into_iter().collect();
/// let trade: ExchangeVector<&str> = [("idle", -3), ("y", 1)].into_iter().collect();
///
/// let next = &state + &trade;
/// assert_eq!(next.get(&"idle"), -1);
/// assert_eq!(next.min_value(), -1);
/// assert_eq!(next.pos_part().get(&"idle"), 0);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExchangeVector<K: Ord> {
    entries: BTreeMap<K, i64>,
}

impl<K: Ord> Default for ExchangeVector<K> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone> ExchangeVector<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> i64 {
        self.entries.get(key).copied().unwrap_or(0)
    }

    pub fn set(&mut self, key: K, value: i64) {
        if value == 0 {
            self.entries.remove(&key);
        } else {
            self.entries.insert(key, value);
        }
    }

    /// Add `delta` to one entry.
    pub fn shift(&mut self, key: K, delta: i64) {
        let value = self.get(&key) + delta;
        self.set(key, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, i64)> {
        self.entries.iter().map(|(k, v)| (k, *v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    /// Number of non-zero entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True for the zero vector.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Smallest stored value, zero for the empty vector.
    pub fn min_value(&self) -> i64 {
        self.entries.values().copied().min().unwrap_or(0)
    }

    /// Sum of all entries.
    pub fn total(&self) -> i64 {
        self.entries.values().sum()
    }

    /// Negative entries clamped to zero.
    pub fn pos_part(&self) -> Self {
        self.entries
            .iter()
            .filter(|(_, v)| **v > 0)
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    pub fn scaled(&self, factor: i64) -> Self {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v * factor))
            .collect()
    }

    /// Entries whose key satisfies `keep`.
    pub fn filtered(&self, mut keep: impl FnMut(&K) -> bool) -> Self {
        self.entries
            .iter()
            .filter(|(k, _)| keep(k))
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    /// True iff every entry of `self` is at most the matching entry of `other`.
    pub fn fits_within(&self, other: &Self) -> bool {
        (other - self).min_value() >= 0
    }
}

impl<K: Ord + Clone> FromIterator<(K, i64)> for ExchangeVector<K> {
    /// Entries for a repeated key are summed.
    fn from_iter<T: IntoIterator<Item = (K, i64)>>(iter: T) -> Self {
        let mut out = Self::new();
        for (k, v) in iter {
            out.shift(k, v);
        }
        out
    }
}

impl<K: Ord + Clone> AddAssign<&ExchangeVector<K>> for ExchangeVector<K> {
    fn add_assign(&mut self, rhs: &ExchangeVector<K>) {
        for (k, v) in &rhs.entries {
            self.shift(k.clone(), *v);
        }
    }
}

impl<K: Ord + Clone> Add for &ExchangeVector<K> {
    type Output = ExchangeVector<K>;

    fn add(self, rhs: Self) -> ExchangeVector<K> {
        let mut out = self.clone();
        out += rhs;
        out
    }
}

impl<K: Ord + Clone> Sub for &ExchangeVector<K> {
    type Output = ExchangeVector<K>;

    fn sub(self, rhs: Self) -> ExchangeVector<K> {
        let mut out = self.clone();
        for (k, v) in &rhs.entries {
            out.shift(k.clone(), -*v);
        }
        out
    }
}

impl<K: Ord + Clone> Mul<i64> for &ExchangeVector<K> {
    type Output = ExchangeVector<K>;

    fn mul(self, factor: i64) -> ExchangeVector<K> {
        self.scaled(factor)
    }
}

impl<K: Ord + Clone> Neg for &ExchangeVector<K> {
    type Output = ExchangeVector<K>;

    fn neg(self) -> ExchangeVector<K> {
        self.scaled(-1)
    }
}

impl<K: Ord + fmt::Display> fmt::Display for ExchangeVector<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .entries
            .iter()
            .map(|(k, v)| format!("{}: {:+}", k, v))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(entries: &[(&'static str, i64)]) -> ExchangeVector<&'static str> {
        entries.iter().copied().collect()
    }

    #[test]
    fn test_zero_entries_not_stored() {
        let mut v = vector(&[("a", 1), ("b", 0)]);
        assert_eq!(v.len(), 1);
        v.shift("a", -1);
        assert!(v.is_empty());
        assert_eq!(v, ExchangeVector::new());
    }

    #[test]
    fn test_arithmetic() {
        let a = vector(&[("x", 2), ("y", -1)]);
        let b = vector(&[("y", 1), ("z", 3)]);

        assert_eq!(&a + &b, vector(&[("x", 2), ("z", 3)]));
        assert_eq!(&a - &b, vector(&[("x", 2), ("y", -2), ("z", -3)]));
        assert_eq!(&a * 3, vector(&[("x", 6), ("y", -3)]));
        assert_eq!(-&a, vector(&[("x", -2), ("y", 1)]));
        assert_eq!(&(&a + &-&a), &ExchangeVector::new());
    }

    #[test]
    fn test_min_value_and_pos_part() {
        assert_eq!(ExchangeVector::<&str>::new().min_value(), 0);
        assert_eq!(vector(&[("a", 4), ("b", 2)]).min_value(), 2);

        let v = vector(&[("a", -4), ("b", 2)]);
        assert_eq!(v.min_value(), -4);
        assert_eq!(v.pos_part(), vector(&[("b", 2)]));
        assert_eq!(v.total(), -2);
    }

    #[test]
    fn test_componentwise_le() {
        let small = vector(&[("a", 1)]);
        let large = vector(&[("a", 2), ("b", 1)]);
        assert!(small.fits_within(&large));
        assert!(!large.fits_within(&small));
        assert!(ExchangeVector::new().fits_within(&small));
    }

    #[test]
    fn test_trade_display() {
        let trade: Trade = [(TradeKey::Placement(1), 1), (TradeKey::Source(0), -2)]
            .into_iter()
            .collect();
        assert_eq!(trade.to_string(), "{source#0: -2, placement#1: +1}");
    }
}
