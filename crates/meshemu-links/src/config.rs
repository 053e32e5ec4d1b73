//! Model selection from configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::{LinearLoss, LinkQualityModel, QualityParams, StepFunction, Tier, Tiered, Unshaped};

fn default_max_loss() -> f64 {
    100.0
}

/// Serializable identifier plus parameters of a link-quality model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum ModelConfig {
    /// See [`StepFunction`].
    Step { threshold: f64 },
    /// See [`LinearLoss`].
    LinearLoss {
        max_range: f64,
        #[serde(default = "default_max_loss")]
        max_loss_percent: f64,
    },
    /// See [`Tiered`].
    Tiered { tiers: Vec<Tier> },
    /// See [`Unshaped`].
    Unshaped,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::Step { threshold: 30.0 }
    }
}

impl ModelConfig {
    /// Instantiate the model. `initial` is the quality applied on first activation.
    pub fn build(&self, initial: QualityParams) -> Result<Box<dyn LinkQualityModel>> {
        Ok(match self {
            Self::Step { threshold } => Box::new(StepFunction::new(*threshold, initial)?),
            Self::LinearLoss {
                max_range,
                max_loss_percent,
            } => Box::new(LinearLoss::new(*max_range, *max_loss_percent, initial)?),
            Self::Tiered { tiers } => Box::new(Tiered::new(tiers.clone(), initial)?),
            Self::Unshaped => Box::new(Unshaped::new(initial)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ModelError;

    #[test]
    fn parse_tagged_config() {
        let config: ModelConfig =
            serde_json::from_str(r#"{"model":"linear_loss","max_range":120.0}"#).unwrap();
        assert_eq!(
            config,
            ModelConfig::LinearLoss {
                max_range: 120.0,
                max_loss_percent: 100.0
            }
        );

        let model = config.build(QualityParams::bandwidth(100)).unwrap();
        assert_eq!(model.name(), "linear_loss");
    }

    #[test]
    fn parse_tiered_config() {
        let json = r#"{
            "model": "tiered",
            "tiers": [
                {"max_distance": 20.0, "bandwidth_kbit": 54000, "loss_percent": 0.0},
                {"max_distance": 50.0, "bandwidth_kbit": 11000, "loss_percent": 3.0}
            ]
        }"#;
        let config: ModelConfig = serde_json::from_str(json).unwrap();
        let model = config.build(QualityParams::default()).unwrap();
        assert_eq!(model.name(), "tiered");
    }

    #[test]
    fn invalid_parameters_surface_on_build() {
        let config = ModelConfig::Step { threshold: -1.0 };
        assert_eq!(
            config.build(QualityParams::default()).unwrap_err(),
            ModelError::InvalidRange(-1.0)
        );
    }
}
