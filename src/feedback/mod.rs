// src/feedback/mod.rs
// Per-cycle pipeline: band power -> feature -> normalisation -> smoothing -> mix.
pub mod band_power;
pub mod error;
pub mod feature;
pub mod history;
pub mod mixer;
pub mod normalizer;
pub mod smoother;
pub mod sound;
pub mod spatial;
pub use band_power::{BandPowerEstimator, BandSpec};
pub use error::FeedbackError;
pub use feature::{FeatureExtractor, FeatureMode};
pub use history::RingHistory;
pub use mixer::{mix_volumes, FeedbackMixer, MixPolicy};
pub use normalizer::{normalize, AdaptiveNormalizer, FALLBACK_RATIO};
pub use smoother::{smooth, TemporalSmoother, DEFAULT_SMOOTHING_ALPHA};
pub use sound::{AudioOutput, DeviceSound, MemorySound, SoundChannel};
pub use spatial::SpatialFilter;
