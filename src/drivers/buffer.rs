use std::collections::VecDeque;
use ndarray::Array2;
use crate::drivers::{AcquisitionError, SignalBatch, SignalWindow};
/// Rolling buffer that stores recent samples per channel, plus the
/// acquisition time of every sample column.
pub struct SignalBuffer {
    per_channel: Vec<VecDeque<f64>>, // channel -> samples
    timestamps: VecDeque<f64>,
    channel_labels: Vec<String>,
    sample_rate_hz: f64,
    capacity: usize,
}
impl SignalBuffer {
    pub fn with_history_seconds(
        channel_labels: Vec<String>,
        sample_rate_hz: f64,
        history_seconds: f64,
    ) -> Result<Self, AcquisitionError> {
        if sample_rate_hz <= 0.0 {
            return Err(AcquisitionError::InvalidSampleRate);
        }
        let capacity = (sample_rate_hz * history_seconds).ceil() as usize;
        Self::with_capacity(channel_labels, sample_rate_hz, capacity)
    }
    pub fn with_capacity(
        channel_labels: Vec<String>,
        sample_rate_hz: f64,
        capacity: usize,
    ) -> Result<Self, AcquisitionError> {
        if sample_rate_hz <= 0.0 {
            return Err(AcquisitionError::InvalidSampleRate);
        }
        let capacity = capacity.max(1);
        let per_channel = channel_labels
            .iter()
            .map(|_| VecDeque::with_capacity(capacity))
            .collect();
        Ok(Self {
            per_channel,
            timestamps: VecDeque::with_capacity(capacity),
            channel_labels,
            sample_rate_hz,
            capacity,
        })
    }
    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }
    pub fn channel_labels(&self) -> &[String] {
        &self.channel_labels
    }
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
    pub fn push_batch(&mut self, batch: &SignalBatch) -> Result<(), AcquisitionError> {
        batch.validate()?;
        if batch.sample_rate_hz != self.sample_rate_hz {
            return Err(AcquisitionError::InvalidSampleRate);
        }
        if batch.num_channels() != self.per_channel.len() {
            return Err(AcquisitionError::ChannelMismatch {
                expected: self.per_channel.len(),
                actual: batch.num_channels(),
            });
        }
        self.push_columns(&batch.samples, &batch.timestamps);
        Ok(())
    }
    /// Appends sample columns without batch metadata. Callers guarantee that
    /// `samples` has one row per channel, each as long as `timestamps`.
    pub fn push_columns(&mut self, samples: &[Vec<f64>], timestamps: &[f64]) {
        for (channel_queue, new_samples) in self.per_channel.iter_mut().zip(samples) {
            for &sample in new_samples {
                if channel_queue.len() == self.capacity {
                    channel_queue.pop_front();
                }
                channel_queue.push_back(sample);
            }
        }
        for &ts in timestamps {
            if self.timestamps.len() == self.capacity {
                self.timestamps.pop_front();
            }
            self.timestamps.push_back(ts);
        }
    }
    /// Returns the most recent `samples` columns (or everything held, if fewer).
    pub fn window(&self, samples: usize) -> SignalWindow {
        let take = samples.min(self.timestamps.len());
        let skip = self.timestamps.len() - take;
        let mut data = Array2::zeros((self.per_channel.len(), take));
        for (mut row, channel) in data.rows_mut().into_iter().zip(&self.per_channel) {
            for (dst, &src) in row.iter_mut().zip(channel.iter().skip(skip)) {
                *dst = src;
            }
        }
        SignalWindow {
            samples: data,
            timestamps: self.timestamps.iter().skip(skip).copied().collect(),
        }
    }
    pub fn window_seconds(&self, seconds: f64) -> SignalWindow {
        self.window((self.sample_rate_hz * seconds).ceil() as usize)
    }
}
