use crate::core::resource::ResourceKind;
use crate::market::vector::ExchangeVector;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors arising from converting natural-unit amounts into granules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("amount of {kind} must not be negative, got {amount}")]
    NegativeAmount { kind: ResourceKind, amount: Decimal },
    #[error("no granule registered for resource kind {0}")]
    UnknownResourceKind(ResourceKind),
    #[error("{amount} of {kind} is not a multiple of its granule {granule}")]
    NotAMultiple {
        kind: ResourceKind,
        amount: Decimal,
        granule: Decimal,
    },
    #[error("{amount} of {kind} is too large to count in granules of {granule}")]
    Overflow {
        kind: ResourceKind,
        amount: Decimal,
        granule: Decimal,
    },
}

/// Per-kind accounting unit: the gcd of every amount observed for that kind.
///
/// Once built, all bookkeeping for a kind happens in integer multiples of its
/// granule, so the market search runs over small integers whatever the natural
/// unit of the resource is (bytes, millicores, licenses).
///
/// # Examples
///
/// ```
/// use capset_exchange::core::quantity::GranuleTable;
/// use capset_exchange::core::resource::ResourceKind;
/// use rust_decimal_macros::dec;
///
/// let mem = ResourceKind::new("mem");
/// let table = GranuleTable::build(vec![
///     (mem.clone(), dec!(16)),
///     (mem.clone(), dec!(1.5)),
/// ]).unwrap();
///
/// assert_eq!(table.granule(&mem), Some(dec!(0.5)));
/// assert_eq!(table.to_granules(&mem, dec!(16)).unwrap(), 32);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GranuleTable {
    granules: BTreeMap<ResourceKind, Decimal>,
}

impl GranuleTable {
    /// Derive granules from every `(kind, amount)` pair the roster and sources mention.
    ///
    /// Zero amounts do not constrain the gcd; a kind seen only with zero
    /// amounts gets no granule.
    pub fn build(
        amounts: impl IntoIterator<Item = (ResourceKind, Decimal)>,
    ) -> Result<Self, ConfigurationError> {
        let mut granules: BTreeMap<ResourceKind, Decimal> = BTreeMap::new();
        for (kind, amount) in amounts {
            if amount < Decimal::ZERO {
                return Err(ConfigurationError::NegativeAmount { kind, amount });
            }
            if amount.is_zero() {
                continue;
            }
            let next = match granules.get(&kind) {
                Some(current) => decimal_gcd(*current, amount).ok_or_else(|| {
                    ConfigurationError::Overflow {
                        kind: kind.clone(),
                        amount,
                        granule: *current,
                    }
                })?,
                None => amount.normalize(),
            };
            granules.insert(kind, next);
        }
        Ok(Self { granules })
    }

    pub fn granule(&self, kind: &ResourceKind) -> Option<Decimal> {
        self.granules.get(kind).copied()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &ResourceKind> {
        self.granules.keys()
    }

    pub fn len(&self) -> usize {
        self.granules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.granules.is_empty()
    }

    /// Express a natural-unit amount as a whole number of granules.
    pub fn to_granules(&self, kind: &ResourceKind, amount: Decimal) -> Result<i64, ConfigurationError> {
        if amount < Decimal::ZERO {
            return Err(ConfigurationError::NegativeAmount {
                kind: kind.clone(),
                amount,
            });
        }
        if amount.is_zero() {
            return Ok(0);
        }
        let granule = self
            .granule(kind)
            .ok_or_else(|| ConfigurationError::UnknownResourceKind(kind.clone()))?;
        let count = amount / granule;
        if !count.fract().is_zero() {
            return Err(ConfigurationError::NotAMultiple {
                kind: kind.clone(),
                amount,
                granule,
            });
        }
        i64::try_from(count).map_err(|_| ConfigurationError::Overflow {
            kind: kind.clone(),
            amount,
            granule,
        })
    }

    /// Convert a granule count back into natural units.
    pub fn to_amount(&self, kind: &ResourceKind, granules: i64) -> Option<Decimal> {
        self.granule(kind).map(|g| g * Decimal::from(granules))
    }

    /// Scale a whole per-kind usage map into an integer demand vector.
    pub fn scale(
        &self,
        usage: &BTreeMap<ResourceKind, Decimal>,
    ) -> Result<ExchangeVector<ResourceKind>, ConfigurationError> {
        let mut demand = ExchangeVector::new();
        for (kind, amount) in usage {
            demand.set(kind.clone(), self.to_granules(kind, *amount)?);
        }
        Ok(demand)
    }
}

/// Greatest common divisor of two positive decimals.
///
/// Both values are lifted to a shared scale so the gcd can be taken over
/// their integer mantissas. Returns `None` when a lifted mantissa does not
/// fit in an `i128`.
pub fn decimal_gcd(a: Decimal, b: Decimal) -> Option<Decimal> {
    let a = a.normalize();
    let b = b.normalize();
    let scale = a.scale().max(b.scale());
    let ma = rescaled_mantissa(a, scale)?;
    let mb = rescaled_mantissa(b, scale)?;
    Decimal::try_from_i128_with_scale(integer_gcd(ma, mb), scale)
        .ok()
        .map(|gcd| gcd.normalize())
}

fn rescaled_mantissa(value: Decimal, scale: u32) -> Option<i128> {
    let shift = scale - value.scale();
    10i128
        .checked_pow(shift)
        .and_then(|factor| value.mantissa().abs().checked_mul(factor))
}

fn integer_gcd(mut a: i128, mut b: i128) -> i128 {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}
