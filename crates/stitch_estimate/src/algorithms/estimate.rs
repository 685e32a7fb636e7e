use crate::{config::PricingConfig, error::Result, types::EstimateResult};

/// Converts an area into a stitch count and a price.
///
/// `stitch_count = area · stitch_density`,
/// `cost = stitch_count / 1000 · price_per_thousand`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StitchEstimator {
    pricing: PricingConfig,
}

impl StitchEstimator {
    pub fn new(pricing: PricingConfig) -> Result<Self> {
        pricing.validate()?;
        Ok(Self { pricing })
    }

    pub fn pricing(&self) -> &PricingConfig {
        &self.pricing
    }

    pub fn estimate(&self, area_sq_inches: f64) -> EstimateResult {
        let area_sq_inches = area_sq_inches.max(0.0);
        let stitch_count = area_sq_inches * self.pricing.stitch_density;
        let cost = stitch_count / 1000.0 * self.pricing.price_per_thousand;
        EstimateResult {
            area_sq_inches,
            stitch_count,
            cost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_constants() {
        let result = StitchEstimator::default().estimate(2.0);
        assert_eq!(result.stitch_count, 4000.0);
        assert!((result.cost - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_overridden_constants() {
        let estimator = StitchEstimator::new(PricingConfig {
            stitch_density: 1500.0,
            price_per_thousand: 2.0,
        })
        .unwrap();
        let result = estimator.estimate(3.0);
        assert_eq!(result.stitch_count, 4500.0);
        assert!((result.cost - 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_area_is_zero_result() {
        assert!(StitchEstimator::default().estimate(0.0).is_zero());
    }

    #[test]
    fn test_stitches_and_cost_scale_with_area() {
        let estimator = StitchEstimator::default();
        let small = estimator.estimate(1.25);
        let large = estimator.estimate(5.0);
        assert!((large.stitch_count / small.stitch_count - 4.0).abs() < 1e-12);
        assert!((large.cost / small.cost - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_negative_density() {
        let pricing = PricingConfig {
            stitch_density: -2000.0,
            ..Default::default()
        };
        assert!(matches!(
            StitchEstimator::new(pricing),
            Err(crate::EstimateError::InvalidConfig(_))
        ));
    }
}
