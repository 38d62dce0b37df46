use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use crate::drivers::PsdEstimator;
use crate::feedback::FeedbackError;
/// Frequency band plus the calibrated baseline power it is normalised against.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BandSpec {
    pub min: f64,
    pub max: f64,
    pub reference: f64,
    /// Channels averaged for this band; all channels when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<usize>>,
}
/// Relative band power of a window: PSD summed over the band, averaged over
/// channels, divided by the band reference.
pub struct BandPowerEstimator {
    band: BandSpec,
    psd: PsdEstimator,
}
impl BandPowerEstimator {
    pub fn new(band: BandSpec, sample_rate_hz: f64, worker_count: usize) -> Result<Self, FeedbackError> {
        let psd = PsdEstimator::new(sample_rate_hz, band.min, band.max, worker_count)?;
        Ok(Self { band, psd })
    }
    /// Fails if a configured band channel does not exist in a window of
    /// `available` channels.
    pub fn check_channels(&self, available: usize) -> Result<(), FeedbackError> {
        if let Some(channels) = &self.band.channels {
            if let Some(&channel) = channels.iter().find(|&&ch| ch >= available) {
                return Err(FeedbackError::ChannelOutOfRange { channel, available });
            }
        }
        Ok(())
    }
    pub fn estimate(&self, window: &Array2<f64>) -> Result<f64, FeedbackError> {
        self.check_channels(window.nrows())?;
        let psd = self.psd.estimate(window)?;
        let per_channel = psd.power.sum_axis(Axis(1)); // energy in band
        let mean = match &self.band.channels {
            Some(channels) => {
                channels.iter().map(|&ch| per_channel[ch]).sum::<f64>() / channels.len() as f64
            }
            None => per_channel.mean().unwrap_or(0.0),
        };
        Ok(mean / self.band.reference)
    }
}
