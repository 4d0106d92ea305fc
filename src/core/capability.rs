use crate::core::quantity::ConfigurationError;
use crate::core::resource::ResourceKind;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Queued-task or running-worker counts keyed by capability set.
pub type CapsetCounts = BTreeMap<CapabilitySet, u64>;

/// A single resource requirement profile, optionally labelled.
///
/// The label takes part in equality and ordering, so two capabilities with
/// identical resource use but different names (say a CUDA and a ROCm driver)
/// stay distinct.
///
/// # Examples
///
/// ```
/// use capset_exchange::core::capability::Capability;
/// use rust_decimal_macros::dec;
///
/// let cap = Capability::new([("cpu", dec!(2)), ("mem", dec!(4))]);
/// assert_eq!(cap.amount(&"cpu".into()), dec!(2));
/// assert_eq!(cap.to_string(), "{cpu=2, mem=4}");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Capability {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    resources: BTreeMap<ResourceKind, Decimal>,
}

impl Capability {
    /// Create an unnamed capability.
    ///
    /// # Panics
    ///
    /// Panics if any amount is negative. Use [`Capability::try_new`] for
    /// untrusted input.
    pub fn new<K: Into<ResourceKind>>(resources: impl IntoIterator<Item = (K, Decimal)>) -> Self {
        match Self::try_new(None, resources) {
            Ok(cap) => cap,
            Err(e) => panic!("invalid capability: {}", e),
        }
    }

    /// Create a labelled capability.
    ///
    /// # Panics
    ///
    /// Panics if any amount is negative.
    pub fn named<K: Into<ResourceKind>>(
        name: impl Into<String>,
        resources: impl IntoIterator<Item = (K, Decimal)>,
    ) -> Self {
        match Self::try_new(Some(name.into()), resources) {
            Ok(cap) => cap,
            Err(e) => panic!("invalid capability: {}", e),
        }
    }

    /// Validating constructor. Zero amounts are dropped, amounts for a
    /// repeated kind are summed.
    pub fn try_new<K: Into<ResourceKind>>(
        name: Option<String>,
        resources: impl IntoIterator<Item = (K, Decimal)>,
    ) -> Result<Self, ConfigurationError> {
        let mut map: BTreeMap<ResourceKind, Decimal> = BTreeMap::new();
        for (kind, amount) in resources {
            let kind = kind.into();
            if amount < Decimal::ZERO {
                return Err(ConfigurationError::NegativeAmount { kind, amount });
            }
            *map.entry(kind).or_insert(Decimal::ZERO) += amount;
        }
        map.retain(|_, amount| !amount.is_zero());
        for amount in map.values_mut() {
            *amount = amount.normalize();
        }
        Ok(Self {
            name,
            resources: map,
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn resources(&self) -> &BTreeMap<ResourceKind, Decimal> {
        &self.resources
    }

    pub fn amount(&self, kind: &ResourceKind) -> Decimal {
        self.resources.get(kind).copied().unwrap_or(Decimal::ZERO)
    }

    // Deserialized input bypasses `try_new`.
    fn validated(self) -> Result<Self, ConfigurationError> {
        Self::try_new(self.name, self.resources)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            write!(f, "{}:", name)?;
        }
        let parts: Vec<String> = self
            .resources
            .iter()
            .map(|(kind, amount)| format!("{}={}", kind, amount))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// The full requirement profile of one worker variant (or of one task).
///
/// Capabilities are kept sorted and de-duplicated, so two sets built from the
/// same capabilities in a different order are equal.
///
/// # Ordering
///
/// Sets are compared first by [`total_resource_use`](CapabilitySet::total_resource_use),
/// read as a sorted `(kind, amount)` sequence and compared lexicographically,
/// then by their sorted capability lists. Lighter profiles sort first: the
/// roster order is the order in which the greedy matcher tries workers.
///
/// # Examples
///
/// ```
/// use capset_exchange::core::capability::{Capability, CapabilitySet};
/// use rust_decimal_macros::dec;
///
/// let small = CapabilitySet::new(vec![Capability::new([("cpu", dec!(1))])]);
/// let large = CapabilitySet::new(vec![
///     Capability::new([("cpu", dec!(2))]),
///     Capability::new([("gpu", dec!(1))]),
/// ]);
///
/// assert!(large.covers(&small));
/// assert!(!small.covers(&large));
/// assert!(small < large);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Capability>", into = "Vec<Capability>")]
pub struct CapabilitySet {
    capabilities: Vec<Capability>,
    total: BTreeMap<ResourceKind, Decimal>,
}

impl CapabilitySet {
    pub fn new(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        let mut capabilities: Vec<Capability> = capabilities.into_iter().collect();
        capabilities.sort();
        capabilities.dedup();

        let mut total: BTreeMap<ResourceKind, Decimal> = BTreeMap::new();
        for cap in &capabilities {
            for (kind, amount) in cap.resources() {
                *total.entry(kind.clone()).or_insert(Decimal::ZERO) += *amount;
            }
        }
        for amount in total.values_mut() {
            *amount = amount.normalize();
        }

        Self {
            capabilities,
            total,
        }
    }

    /// A set with no requirements at all; every set covers it.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    /// Per-kind sum across all capabilities, in natural units.
    pub fn total_resource_use(&self) -> &BTreeMap<ResourceKind, Decimal> {
        &self.total
    }

    pub fn uses(&self, kind: &ResourceKind) -> Decimal {
        self.total.get(kind).copied().unwrap_or(Decimal::ZERO)
    }

    /// True iff for every kind `other` requires, this set uses at least as much.
    pub fn covers(&self, other: &CapabilitySet) -> bool {
        other
            .total
            .iter()
            .all(|(kind, needed)| self.uses(kind) >= *needed)
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

impl Ord for CapabilitySet {
    fn cmp(&self, other: &Self) -> Ordering {
        self.total
            .iter()
            .cmp(other.total.iter())
            .then_with(|| self.capabilities.cmp(&other.capabilities))
    }
}

impl PartialOrd for CapabilitySet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl TryFrom<Vec<Capability>> for CapabilitySet {
    type Error = ConfigurationError;

    fn try_from(capabilities: Vec<Capability>) -> Result<Self, Self::Error> {
        let validated = capabilities
            .into_iter()
            .map(Capability::validated)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(validated))
    }
}

impl From<CapabilitySet> for Vec<Capability> {
    fn from(set: CapabilitySet) -> Self {
        set.capabilities
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        Self::new(iter)
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.capabilities.iter().map(|c| c.to_string()).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}
