use serde::{Deserialize, Serialize};

/// Tuning knobs for market construction and the rebalance loop.
///
/// Every field has a default, so a partial JSON object is a valid config.
///
/// # Examples
///
/// ```
/// use capset_exchange::exchange::config::ExchangeConfig;
///
/// let config: ExchangeConfig = serde_json::from_str(r#"{"max_barter_size": 2}"#).unwrap();
/// assert_eq!(config.max_barter_size, Some(2));
/// assert!(config.barter_top_up);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Upper bound on trades applied by one rebalance. Every applied trade
    /// strictly improves the valuation, so hitting this bound is a bug.
    pub max_rebalance_steps: usize,
    /// Most worker variants a single barter may produce. `None` = no limit.
    pub max_barter_size: Option<usize>,
    /// Whether a barter may draw extra idle supply on top of the freed resource.
    pub barter_top_up: bool,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            max_rebalance_steps: 10_000,
            max_barter_size: None,
            barter_top_up: true,
        }
    }
}
