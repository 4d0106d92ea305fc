use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a fungible, constrained resource (CPU slots, memory, a license).
///
/// # Examples
///
/// ```
/// use capset_exchange::core::resource::ResourceKind;
///
/// let cpu = ResourceKind::new("cpu");
/// let mem = ResourceKind::new("mem");
/// assert_ne!(cpu, mem);
/// assert!(cpu < mem);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKind(String);

impl ResourceKind {
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ResourceKind {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// One finite supply pool of a single resource kind.
///
/// Several sources may carry the same kind (two machines each offering CPU).
/// A worker's demand for a kind is always drawn from a single source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Source {
    pub kind: ResourceKind,
    pub capacity: Decimal,
}

impl Source {
    pub fn new(kind: impl Into<ResourceKind>, capacity: Decimal) -> Self {
        Self {
            kind: kind.into(),
            capacity,
        }
    }

    /// One source per kind, from a plain limits table.
    pub fn from_limits(limits: &BTreeMap<ResourceKind, Decimal>) -> Vec<Source> {
        limits
            .iter()
            .map(|(kind, capacity)| Source::new(kind.clone(), *capacity))
            .collect()
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.kind, self.capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_resource_kind_equality() {
        assert_eq!(ResourceKind::new("cpu"), ResourceKind::from("cpu"));
        assert_ne!(ResourceKind::new("cpu"), ResourceKind::new("gpu"));
    }

    #[test]
    fn test_sources_from_limits() {
        let mut limits = BTreeMap::new();
        limits.insert(ResourceKind::new("mem"), dec!(16));
        limits.insert(ResourceKind::new("cpu"), dec!(4));

        let sources = Source::from_limits(&limits);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0], Source::new("cpu", dec!(4)));
        assert_eq!(sources[1].to_string(), "mem=16");
    }
}
