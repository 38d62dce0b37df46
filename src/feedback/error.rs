use thiserror::Error;
use crate::drivers::AcquisitionError;
#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("feature value {value} is not a finite non-negative number")]
    DegenerateFeature { value: f64 },
    #[error("channel {channel} out of range for a {available}-channel window")]
    ChannelOutOfRange { channel: usize, available: usize },
    #[error("unsupported mix policy '{0}' (expected REPLACING, ADDITIVE_NEGATIVE or ADDITIVE_POSITIVE)")]
    UnsupportedPolicy(String),
    #[error("unsupported feature mode '{0}' (expected THETA or ALPHA_THETA)")]
    UnsupportedFeatureMode(String),
    #[error("unsupported spatial filter '{0}' (expected NONE or CAR)")]
    UnsupportedSpatialFilter(String),
    #[error("cannot load sound '{path}': {reason}")]
    Sound { path: String, reason: String },
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
}
