//! Link shaping parameters.

use serde::{Deserialize, Serialize};

/// Shaping parameters for one link.
///
/// Absent fields mean "leave as is". A model fills in what it controls; the
/// initial link quality fills in the rest on first activation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct QualityParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth_kbit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loss_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<f64>,
}

impl QualityParams {
    /// Parameters with only a bandwidth set.
    pub const fn bandwidth(kbit: u64) -> Self {
        Self {
            bandwidth_kbit: Some(kbit),
            loss_percent: None,
            delay_ms: None,
        }
    }

    #[must_use]
    pub fn with_loss(mut self, percent: f64) -> Self {
        self.loss_percent = Some(percent);
        self
    }

    #[must_use]
    pub fn with_delay(mut self, ms: f64) -> Self {
        self.delay_ms = Some(ms);
        self
    }

    /// Fill every absent field from `defaults`. Present fields win.
    #[must_use]
    pub fn merged_over(self, defaults: &QualityParams) -> Self {
        Self {
            bandwidth_kbit: self.bandwidth_kbit.or(defaults.bandwidth_kbit),
            loss_percent: self.loss_percent.or(defaults.loss_percent),
            delay_ms: self.delay_ms.or(defaults.delay_ms),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bandwidth_kbit.is_none() && self.loss_percent.is_none() && self.delay_ms.is_none()
    }
}

/// Outcome of asking a model about one distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkDecision {
    pub connected: bool,
    pub params: QualityParams,
}

impl LinkDecision {
    pub const fn connected(params: QualityParams) -> Self {
        Self {
            connected: true,
            params,
        }
    }

    /// A disconnected link: total loss.
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            params: QualityParams::default().with_loss(100.0),
        }
    }
}
