//! Error types for meshemu-links.

use thiserror::Error;

/// Result type for model construction.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Invalid model parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// Ranges and thresholds must be positive numbers.
    #[error("invalid range {0}, expected a positive number")]
    InvalidRange(f64),

    /// Loss must lie within 0..=100 percent.
    #[error("invalid loss {0}%, expected 0..=100")]
    InvalidLoss(f64),

    /// A tiered model needs at least one tier.
    #[error("tiered model has no tiers")]
    NoTiers,

    /// Tier bounds must be strictly ascending.
    #[error("tier {index} does not extend beyond the previous tier")]
    UnorderedTiers { index: usize },

    /// Farther tiers may not offer better quality.
    #[error("tier {index} offers better quality than a nearer tier")]
    NonMonotonicTier { index: usize },
}
