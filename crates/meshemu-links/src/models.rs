//! Concrete link-quality models.

use meshemu_topology::Distance;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::{LinkDecision, LinkQualityModel, QualityParams};

fn check_range(value: f64) -> Result<f64> {
    if value.is_nan() || value <= 0.0 {
        return Err(ModelError::InvalidRange(value));
    }
    Ok(value)
}

fn check_loss(value: f64) -> Result<f64> {
    if !(0.0..=100.0).contains(&value) {
        return Err(ModelError::InvalidLoss(value));
    }
    Ok(value)
}

/// Connected below a threshold, disconnected at or beyond it.
///
/// Connected links always get the full initial quality.
#[derive(Debug, Clone)]
pub struct StepFunction {
    threshold: f64,
    initial: QualityParams,
}

impl StepFunction {
    pub fn new(threshold: f64, initial: QualityParams) -> Result<Self> {
        Ok(Self {
            threshold: check_range(threshold)?,
            initial,
        })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl LinkQualityModel for StepFunction {
    fn name(&self) -> &'static str {
        "step"
    }

    fn distance_to_link_quality(&self, distance: Distance) -> LinkDecision {
        if distance.value() < self.threshold {
            LinkDecision::connected(self.initial)
        } else {
            LinkDecision::disconnected()
        }
    }

    fn initial_link_quality(&self) -> LinkDecision {
        LinkDecision::connected(self.initial)
    }
}

/// Loss grows linearly with distance up to `max_range`.
///
/// At distance zero the loss is 0%, just below `max_range` it approaches
/// `max_loss_percent`. Only the loss is derived from distance; bandwidth
/// comes from the initial quality.
#[derive(Debug, Clone)]
pub struct LinearLoss {
    max_range: f64,
    max_loss_percent: f64,
    initial: QualityParams,
}

impl LinearLoss {
    pub fn new(max_range: f64, max_loss_percent: f64, initial: QualityParams) -> Result<Self> {
        Ok(Self {
            max_range: check_range(max_range)?,
            max_loss_percent: check_loss(max_loss_percent)?,
            initial,
        })
    }
}

impl LinkQualityModel for LinearLoss {
    fn name(&self) -> &'static str {
        "linear_loss"
    }

    fn distance_to_link_quality(&self, distance: Distance) -> LinkDecision {
        let d = distance.value();
        if d >= self.max_range {
            return LinkDecision::disconnected();
        }
        let loss = self.max_loss_percent * d / self.max_range;
        LinkDecision::connected(QualityParams::default().with_loss(loss))
    }

    fn initial_link_quality(&self) -> LinkDecision {
        LinkDecision::connected(self.initial.merged_over(&QualityParams::default().with_loss(0.0)))
    }
}

/// One distance band of a [`Tiered`] model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    /// Exclusive upper bound of the band.
    pub max_distance: f64,
    #[serde(flatten)]
    pub params: QualityParams,
}

/// Ordered distance bands, each with its own shaping.
///
/// A distance falls into the first band whose bound exceeds it. Beyond the
/// last band the link is disconnected.
#[derive(Debug, Clone)]
pub struct Tiered {
    tiers: Vec<Tier>,
    initial: QualityParams,
}

impl Tiered {
    /// Build a tiered model. Bounds must ascend strictly, bandwidth must not
    /// grow and loss must not shrink from one tier to the next.
    pub fn new(tiers: Vec<Tier>, initial: QualityParams) -> Result<Self> {
        if tiers.is_empty() {
            return Err(ModelError::NoTiers);
        }
        // Strictest values set by any nearer tier; unset fields do not reset them.
        let mut most_loss: Option<f64> = None;
        let mut least_bandwidth: Option<u64> = None;
        for (index, tier) in tiers.iter().enumerate() {
            check_range(tier.max_distance)?;
            if let Some(loss) = tier.params.loss_percent {
                check_loss(loss)?;
            }
            if index > 0 && tier.max_distance <= tiers[index - 1].max_distance {
                return Err(ModelError::UnorderedTiers { index });
            }
            if let Some(kbit) = tier.params.bandwidth_kbit {
                if least_bandwidth.is_some_and(|least| kbit > least) {
                    return Err(ModelError::NonMonotonicTier { index });
                }
                least_bandwidth = Some(kbit);
            }
            if let Some(loss) = tier.params.loss_percent {
                if most_loss.is_some_and(|most| loss < most) {
                    return Err(ModelError::NonMonotonicTier { index });
                }
                most_loss = Some(loss);
            }
        }
        Ok(Self { tiers, initial })
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }
}

impl LinkQualityModel for Tiered {
    fn name(&self) -> &'static str {
        "tiered"
    }

    fn distance_to_link_quality(&self, distance: Distance) -> LinkDecision {
        self.tiers
            .iter()
            .find(|tier| distance.value() < tier.max_distance)
            .map(|tier| LinkDecision::connected(tier.params))
            .unwrap_or_else(LinkDecision::disconnected)
    }

    fn initial_link_quality(&self) -> LinkDecision {
        LinkDecision::connected(self.initial)
    }
}

/// Connected at any finite distance, never shaped by distance.
#[derive(Debug, Clone, Default)]
pub struct Unshaped {
    initial: QualityParams,
}

impl Unshaped {
    pub fn new(initial: QualityParams) -> Self {
        Self { initial }
    }
}

impl LinkQualityModel for Unshaped {
    fn name(&self) -> &'static str {
        "unshaped"
    }

    fn distance_to_link_quality(&self, distance: Distance) -> LinkDecision {
        if distance.is_unlimited() {
            LinkDecision::disconnected()
        } else {
            LinkDecision::connected(QualityParams::default())
        }
    }

    fn initial_link_quality(&self) -> LinkDecision {
        LinkDecision::connected(self.initial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(v: f64) -> Distance {
        Distance::new(v).unwrap()
    }

    fn tier(max_distance: f64, kbit: u64, loss: f64) -> Tier {
        Tier {
            max_distance,
            params: QualityParams::bandwidth(kbit).with_loss(loss),
        }
    }

    fn sample_tiers() -> Vec<Tier> {
        vec![tier(30.0, 54_000, 0.0), tier(60.0, 11_000, 5.0), tier(100.0, 1_000, 20.0)]
    }

    #[test]
    fn step_threshold_is_exclusive() {
        let model = StepFunction::new(10.0, QualityParams::bandwidth(500)).unwrap();
        assert!(model.distance_to_link_quality(d(5.0)).connected);
        assert!(model.distance_to_link_quality(d(9.999)).connected);
        assert!(!model.distance_to_link_quality(d(10.0)).connected);
        assert!(!model.distance_to_link_quality(d(50.0)).connected);
        assert_eq!(
            model.distance_to_link_quality(d(5.0)).params.bandwidth_kbit,
            Some(500)
        );
    }

    #[test]
    fn step_rejects_non_positive_threshold() {
        assert_eq!(
            StepFunction::new(0.0, QualityParams::default()).unwrap_err(),
            ModelError::InvalidRange(0.0)
        );
        assert!(StepFunction::new(f64::NAN, QualityParams::default()).is_err());
    }

    #[test]
    fn linear_loss_scales_with_distance() {
        let model = LinearLoss::new(100.0, 50.0, QualityParams::bandwidth(1_000)).unwrap();

        let near = model.distance_to_link_quality(d(0.0));
        let mid = model.distance_to_link_quality(d(50.0));
        assert_eq!(near.params.loss_percent, Some(0.0));
        assert_eq!(mid.params.loss_percent, Some(25.0));
        assert_eq!(mid.params.bandwidth_kbit, None);
        assert!(!model.distance_to_link_quality(d(100.0)).connected);

        let initial = model.initial_link_quality();
        assert_eq!(initial.params.bandwidth_kbit, Some(1_000));
        assert_eq!(initial.params.loss_percent, Some(0.0));
    }

    #[test]
    fn linear_loss_rejects_bad_loss() {
        assert_eq!(
            LinearLoss::new(10.0, 120.0, QualityParams::default()).unwrap_err(),
            ModelError::InvalidLoss(120.0)
        );
    }

    #[test]
    fn tiered_picks_first_matching_band() {
        let model = Tiered::new(sample_tiers(), QualityParams::bandwidth(54_000)).unwrap();

        assert_eq!(
            model.distance_to_link_quality(d(10.0)).params.bandwidth_kbit,
            Some(54_000)
        );
        assert_eq!(
            model.distance_to_link_quality(d(30.0)).params.bandwidth_kbit,
            Some(11_000)
        );
        assert_eq!(
            model.distance_to_link_quality(d(99.0)).params.loss_percent,
            Some(20.0)
        );
        assert!(!model.distance_to_link_quality(d(100.0)).connected);
    }

    #[test]
    fn tiered_validates_ordering() {
        assert_eq!(
            Tiered::new(vec![], QualityParams::default()).unwrap_err(),
            ModelError::NoTiers
        );
        assert_eq!(
            Tiered::new(vec![tier(50.0, 10, 0.0), tier(40.0, 5, 1.0)], QualityParams::default())
                .unwrap_err(),
            ModelError::UnorderedTiers { index: 1 }
        );
        assert_eq!(
            Tiered::new(vec![tier(10.0, 10, 0.0), tier(40.0, 50, 1.0)], QualityParams::default())
                .unwrap_err(),
            ModelError::NonMonotonicTier { index: 1 }
        );
        assert_eq!(
            Tiered::new(vec![tier(10.0, 10, 5.0), tier(40.0, 10, 1.0)], QualityParams::default())
                .unwrap_err(),
            ModelError::NonMonotonicTier { index: 1 }
        );
    }

    #[test]
    fn unshaped_connects_any_finite_distance() {
        let model = Unshaped::new(QualityParams::bandwidth(10));
        assert!(model.distance_to_link_quality(d(1e9)).connected);
        assert!(model.distance_to_link_quality(d(1e9)).params.is_empty());
        assert!(!model.distance_to_link_quality(Distance::UNLIMITED).connected);
    }

    fn sparse_tiers() -> Vec<Tier> {
        vec![
            Tier {
                max_distance: 10.0,
                params: QualityParams::default().with_loss(5.0),
            },
            Tier {
                max_distance: 20.0,
                params: QualityParams::bandwidth(1_000),
            },
            Tier {
                max_distance: 30.0,
                params: QualityParams::default().with_loss(8.0),
            },
            Tier {
                max_distance: 40.0,
                params: QualityParams::bandwidth(500).with_loss(12.0),
            },
        ]
    }

    #[test]
    fn tiered_compares_against_earlier_tiers_that_set_a_field() {
        let mut tiers = sparse_tiers();
        tiers[2].params = QualityParams::default().with_loss(1.0);
        assert_eq!(
            Tiered::new(tiers, QualityParams::default()).unwrap_err(),
            ModelError::NonMonotonicTier { index: 2 }
        );

        let mut tiers = sparse_tiers();
        tiers[3].params = QualityParams::bandwidth(2_000).with_loss(12.0);
        assert_eq!(
            Tiered::new(tiers, QualityParams::default()).unwrap_err(),
            ModelError::NonMonotonicTier { index: 3 }
        );

        assert!(Tiered::new(sparse_tiers(), QualityParams::default()).is_ok());
    }

    fn all_models() -> Vec<Box<dyn LinkQualityModel>> {
        let initial = QualityParams::bandwidth(54_000);
        vec![
            Box::new(StepFunction::new(10.0, initial).unwrap()),
            Box::new(LinearLoss::new(80.0, 100.0, initial).unwrap()),
            Box::new(Tiered::new(sample_tiers(), initial).unwrap()),
            Box::new(Tiered::new(sparse_tiers(), initial).unwrap()),
            Box::new(Unshaped::new(initial)),
        ]
    }

    proptest! {
        #[test]
        fn connectivity_is_monotonic(a in 0.0f64..500.0, b in 0.0f64..500.0) {
            let (near, far) = if a <= b { (a, b) } else { (b, a) };
            for model in all_models() {
                let name = model.name();
                let near_decision = model.distance_to_link_quality(d(near));
                let far_decision = model.distance_to_link_quality(d(far));
                if !near_decision.connected {
                    prop_assert!(!far_decision.connected, "{} reconnected at {}", name, far);
                }
                let (nq, fq) = (near_decision.params, far_decision.params);
                if let (Some(l1), Some(l2)) = (nq.loss_percent, fq.loss_percent) {
                    prop_assert!(l1 <= l2, "{} lost less at {} than at {}", name, far, near);
                }
                if let (Some(b1), Some(b2)) = (nq.bandwidth_kbit, fq.bandwidth_kbit) {
                    prop_assert!(b1 >= b2, "{} gained bandwidth at {} over {}", name, far, near);
                }
            }
        }

        #[test]
        fn decisions_are_deterministic(x in 0.0f64..500.0) {
            for model in all_models() {
                prop_assert_eq!(
                    model.distance_to_link_quality(d(x)),
                    model.distance_to_link_quality(d(x))
                );
            }
        }
    }
}
