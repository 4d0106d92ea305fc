use crate::core::capability::CapabilitySet;
use crate::core::quantity::ConfigurationError;
use thiserror::Error;

/// Errors raised by the allocation engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    /// A declared worker variant can never be started with the declared sources.
    #[error("not enough resources to ever start {capset}")]
    NotEnoughResources { capset: CapabilitySet },
    /// Tasks remain queued but nothing can run to serve them.
    #[error("{queued} tasks remaining and no launchable actors")]
    NotEnoughResourcesToContinue { queued: u64 },
}
