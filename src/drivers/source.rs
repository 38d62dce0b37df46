use std::collections::VecDeque;
use ndarray::Array2;
use crate::drivers::{AcquisitionError, SignalBuffer};
/// Single batch of multi-channel EEG samples with per-sample timestamps.
#[derive(Clone, Debug)]
pub struct SignalBatch {
    pub sample_rate_hz: f64,
    pub samples: Vec<Vec<f64>>, // channels x samples
    pub timestamps: Vec<f64>,
    pub channel_labels: Vec<String>,
}
impl SignalBatch {
    pub fn validate(&self) -> Result<(), AcquisitionError> {
        if self.sample_rate_hz <= 0.0 {
            return Err(AcquisitionError::InvalidSampleRate);
        }
        let channel_count = self.samples.len();
        if channel_count != self.channel_labels.len() {
            return Err(AcquisitionError::ChannelMismatch {
                expected: self.channel_labels.len(),
                actual: channel_count,
            });
        }
        for channel in &self.samples {
            if channel.len() != self.timestamps.len() {
                return Err(AcquisitionError::TimestampMismatch {
                    samples: channel.len(),
                    timestamps: self.timestamps.len(),
                });
            }
        }
        Ok(())
    }
    pub fn num_channels(&self) -> usize {
        self.samples.len()
    }
}
/// Most recent stretch of the stream, as handed to the feedback pipeline.
#[derive(Clone, Debug)]
pub struct SignalWindow {
    pub samples: Array2<f64>, // channels x samples
    pub timestamps: Vec<f64>,
}
impl SignalWindow {
    pub fn num_channels(&self) -> usize {
        self.samples.nrows()
    }
    pub fn num_samples(&self) -> usize {
        self.samples.ncols()
    }
    pub fn latest_timestamp(&self) -> Option<f64> {
        self.timestamps.last().copied()
    }
    /// True when at least one timestamp is strictly newer than `last_seen`.
    pub fn has_samples_after(&self, last_seen: Option<f64>) -> bool {
        match last_seen {
            Some(last) => self.timestamps.iter().any(|&ts| ts > last),
            None => !self.timestamps.is_empty(),
        }
    }
}
/// Acquisition client the session loop pulls from.
///
/// `acquire` must not block for longer than it takes to drain what the
/// device has already delivered; it is allowed to do nothing.
pub trait StreamReceiver {
    fn acquire(&mut self) -> Result<(), AcquisitionError>;
    fn get_window(&self) -> Result<SignalWindow, AcquisitionError>;
    fn sample_rate(&self) -> f64;
    fn trigger_channel(&self) -> Option<usize>;
    fn channel_labels(&self) -> &[String];
}
impl<R: StreamReceiver + ?Sized> StreamReceiver for Box<R> {
    fn acquire(&mut self) -> Result<(), AcquisitionError> {
        (**self).acquire()
    }
    fn get_window(&self) -> Result<SignalWindow, AcquisitionError> {
        (**self).get_window()
    }
    fn sample_rate(&self) -> f64 {
        (**self).sample_rate()
    }
    fn trigger_channel(&self) -> Option<usize> {
        (**self).trigger_channel()
    }
    fn channel_labels(&self) -> &[String] {
        (**self).channel_labels()
    }
}
/// In-memory source useful for tests and deterministic playback.
///
/// Each `acquire` moves at most one queued batch into the rolling buffer, so
/// an exhausted queue behaves like a stream that stopped delivering.
pub struct ManualSource {
    queue: VecDeque<SignalBatch>,
    buffer: SignalBuffer,
    window_samples: usize,
    trigger_channel: Option<usize>,
}
impl ManualSource {
    pub fn new(
        channel_labels: Vec<String>,
        sample_rate_hz: f64,
        window_samples: usize,
        batches: impl IntoIterator<Item = SignalBatch>,
    ) -> Result<Self, AcquisitionError> {
        let capacity = window_samples.max(1);
        Ok(Self {
            queue: batches.into_iter().collect(),
            buffer: SignalBuffer::with_capacity(channel_labels, sample_rate_hz, capacity)?,
            window_samples: capacity,
            trigger_channel: None,
        })
    }
    pub fn with_trigger_channel(mut self, channel: usize) -> Self {
        self.trigger_channel = Some(channel);
        self
    }
}
impl StreamReceiver for ManualSource {
    fn acquire(&mut self) -> Result<(), AcquisitionError> {
        if let Some(batch) = self.queue.pop_front() {
            self.buffer.push_batch(&batch)?;
        }
        Ok(())
    }
    fn get_window(&self) -> Result<SignalWindow, AcquisitionError> {
        Ok(self.buffer.window(self.window_samples))
    }
    fn sample_rate(&self) -> f64 {
        self.buffer.sample_rate_hz()
    }
    fn trigger_channel(&self) -> Option<usize> {
        self.trigger_channel
    }
    fn channel_labels(&self) -> &[String] {
        self.buffer.channel_labels()
    }
}
/// Lightweight helper to produce a batch from owned sample data.
pub fn make_batch(
    sample_rate_hz: f64,
    samples: Vec<Vec<f64>>,
    timestamps: Vec<f64>,
    channel_labels: Vec<String>,
) -> SignalBatch {
    SignalBatch {
        sample_rate_hz,
        samples,
        timestamps,
        channel_labels,
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("C{}", i + 1)).collect()
    }
    #[test]
    fn batch_validation_catches_timestamp_mismatch() {
        let batch = make_batch(250.0, vec![vec![0.0; 4]], vec![0.0; 3], labels(1));
        assert!(matches!(
            batch.validate(),
            Err(AcquisitionError::TimestampMismatch { samples: 4, timestamps: 3 })
        ));
    }
    #[test]
    fn manual_source_releases_one_batch_per_acquire() {
        let first = make_batch(100.0, vec![vec![1.0, 2.0]], vec![0.00, 0.01], labels(1));
        let second = make_batch(100.0, vec![vec![3.0, 4.0]], vec![0.02, 0.03], labels(1));
        let mut source = ManualSource::new(labels(1), 100.0, 3, vec![first, second]).unwrap();
        source.acquire().unwrap();
        assert_eq!(source.get_window().unwrap().num_samples(), 2);
        source.acquire().unwrap();
        let window = source.get_window().unwrap();
        assert_eq!(window.num_samples(), 3);
        assert_eq!(window.timestamps, vec![0.01, 0.02, 0.03]);
        assert_eq!(window.samples[[0, 0]], 2.0);
        // queue drained: acquire is a no-op and the window stays put
        source.acquire().unwrap();
        assert_eq!(source.get_window().unwrap().latest_timestamp(), Some(0.03));
    }
    #[test]
    fn freshness_is_strictly_newer() {
        let window = SignalWindow {
            samples: Array2::zeros((1, 2)),
            timestamps: vec![1.0, 2.0],
        };
        assert!(window.has_samples_after(None));
        assert!(window.has_samples_after(Some(1.5)));
        assert!(!window.has_samples_after(Some(2.0)));
    }
}
