use std::str::FromStr;
use ndarray::Array2;
use crate::feedback::{BandPowerEstimator, FeedbackError};
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeatureMode {
    /// Relative theta power alone.
    Theta,
    /// Relative alpha power over relative theta power.
    AlphaTheta,
}
impl FromStr for FeatureMode {
    type Err = FeedbackError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "THETA" => Ok(FeatureMode::Theta),
            "ALPHA_THETA" => Ok(FeatureMode::AlphaTheta),
            other => Err(FeedbackError::UnsupportedFeatureMode(other.to_string())),
        }
    }
}
/// Turns a window into the single scalar the feedback follows.
pub enum FeatureExtractor {
    Single(BandPowerEstimator),
    Ratio {
        numerator: BandPowerEstimator,
        denominator: BandPowerEstimator,
    },
}
impl FeatureExtractor {
    pub fn new(mode: FeatureMode, alpha: BandPowerEstimator, theta: BandPowerEstimator) -> Self {
        match mode {
            FeatureMode::Theta => FeatureExtractor::Single(theta),
            FeatureMode::AlphaTheta => FeatureExtractor::Ratio {
                numerator: alpha,
                denominator: theta,
            },
        }
    }
    pub fn mode(&self) -> FeatureMode {
        match self {
            FeatureExtractor::Single(_) => FeatureMode::Theta,
            FeatureExtractor::Ratio { .. } => FeatureMode::AlphaTheta,
        }
    }
    pub fn check_channels(&self, available: usize) -> Result<(), FeedbackError> {
        match self {
            FeatureExtractor::Single(band) => band.check_channels(available),
            FeatureExtractor::Ratio {
                numerator,
                denominator,
            } => {
                numerator.check_channels(available)?;
                denominator.check_channels(available)
            }
        }
    }
    /// Fails with [`FeedbackError::DegenerateFeature`] when the value is NaN,
    /// infinite or negative (e.g. a flat theta band in ratio mode).
    pub fn extract(&self, window: &Array2<f64>) -> Result<f64, FeedbackError> {
        let value = match self {
            FeatureExtractor::Single(band) => band.estimate(window)?,
            FeatureExtractor::Ratio {
                numerator,
                denominator,
            } => numerator.estimate(window)? / denominator.estimate(window)?,
        };
        if value.is_finite() && value >= 0.0 {
            Ok(value)
        } else {
            Err(FeedbackError::DegenerateFeature { value })
        }
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::BandSpec;
    fn estimator(min: f64, max: f64, reference: f64) -> BandPowerEstimator {
        let band = BandSpec {
            min,
            max,
            reference,
            channels: None,
        };
        BandPowerEstimator::new(band, 256.0, 1).unwrap()
    }
    fn mixture(alpha_amp: f64, theta_amp: f64) -> Array2<f64> {
        let data = (0..256)
            .map(|i| {
                let t = i as f64 / 256.0;
                alpha_amp * (2.0 * std::f64::consts::PI * 10.0 * t).sin()
                    + theta_amp * (2.0 * std::f64::consts::PI * 6.0 * t).sin()
            })
            .collect();
        Array2::from_shape_vec((1, 256), data).unwrap()
    }
    #[test]
    fn parses_known_modes_only() {
        assert_eq!("THETA".parse::<FeatureMode>().unwrap(), FeatureMode::Theta);
        assert_eq!("ALPHA_THETA".parse::<FeatureMode>().unwrap(), FeatureMode::AlphaTheta);
        assert!(matches!(
            "BETA".parse::<FeatureMode>(),
            Err(FeedbackError::UnsupportedFeatureMode(s)) if s == "BETA"
        ));
    }
    #[test]
    fn ratio_mode_divides_alpha_by_theta() {
        let window = mixture(2.0, 1.0);
        let alpha = estimator(8.0, 12.0, 1.0).estimate(&window).unwrap();
        let theta = estimator(4.0, 7.0, 1.0).estimate(&window).unwrap();
        let extractor = FeatureExtractor::new(
            FeatureMode::AlphaTheta,
            estimator(8.0, 12.0, 1.0),
            estimator(4.0, 7.0, 1.0),
        );
        let feature = extractor.extract(&window).unwrap();
        assert!((feature - alpha / theta).abs() < 1e-9);
        assert!(feature > 1.0);
    }
    #[test]
    fn theta_mode_ignores_alpha_band() {
        let window = mixture(2.0, 1.0);
        let extractor = FeatureExtractor::new(
            FeatureMode::Theta,
            estimator(8.0, 12.0, 1.0),
            estimator(4.0, 7.0, 5.0),
        );
        let expected = estimator(4.0, 7.0, 5.0).estimate(&window).unwrap();
        assert_eq!(extractor.extract(&window).unwrap(), expected);
        assert_eq!(extractor.mode(), FeatureMode::Theta);
    }
    #[test]
    fn empty_theta_band_is_degenerate_in_ratio_mode() {
        let window = Array2::zeros((1, 256));
        let extractor = FeatureExtractor::new(
            FeatureMode::AlphaTheta,
            estimator(8.0, 12.0, 1.0),
            estimator(4.0, 7.0, 1.0),
        );
        assert!(matches!(
            extractor.extract(&window),
            Err(FeedbackError::DegenerateFeature { .. })
        ));
    }
}
