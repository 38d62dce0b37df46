use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use rustfft::{num_complex::Complex64, FftPlanner};
use crate::drivers::AcquisitionError;
/// In-band power spectral density for each channel.
#[derive(Clone, Debug)]
pub struct BandPsd {
    pub frequencies_hz: Vec<f64>,
    pub power: Array2<f64>, // channel -> bins
}
/// Hann-windowed, one-sided periodogram restricted to `[fmin, fmax]`.
///
/// Channels are transformed in parallel on a private pool of `worker_count`
/// threads; the result does not depend on the worker count.
pub struct PsdEstimator {
    sample_rate_hz: f64,
    fmin: f64,
    fmax: f64,
    pool: ThreadPool,
}
impl PsdEstimator {
    pub fn new(
        sample_rate_hz: f64,
        fmin: f64,
        fmax: f64,
        worker_count: usize,
    ) -> Result<Self, AcquisitionError> {
        if sample_rate_hz <= 0.0 {
            return Err(AcquisitionError::InvalidSampleRate);
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(worker_count.max(1))
            .thread_name(|i| format!("psd-worker-{i}"))
            .build()
            .map_err(|e| AcquisitionError::Backend(e.to_string()))?;
        Ok(Self {
            sample_rate_hz,
            fmin,
            fmax,
            pool,
        })
    }
    pub fn estimate(&self, window: &Array2<f64>) -> Result<BandPsd, AcquisitionError> {
        let n = window.ncols();
        if n == 0 {
            return Err(AcquisitionError::EmptyWindow);
        }
        let bins: Vec<usize> = (0..=n / 2)
            .filter(|&k| {
                let f = self.bin_frequency(k, n);
                f >= self.fmin && f <= self.fmax
            })
            .collect();
        let frequencies_hz = bins.iter().map(|&k| self.bin_frequency(k, n)).collect();
        let taper = hann(n);
        let taper_power: f64 = taper.iter().map(|w| w * w).sum();
        let scale = 1.0 / (self.sample_rate_hz * taper_power);
        let fft = FftPlanner::<f64>::new().plan_fft_forward(n);
        let rows: Vec<ArrayView1<f64>> = window.rows().into_iter().collect();
        let per_channel: Vec<Vec<f64>> = self.pool.install(|| {
            rows.par_iter()
                .map(|channel| {
                    let mut buffer: Vec<Complex64> = channel
                        .iter()
                        .zip(&taper)
                        .map(|(&v, &w)| Complex64::new(v * w, 0.0))
                        .collect();
                    fft.process(&mut buffer);
                    bins.iter()
                        .map(|&k| {
                            // one-sided: fold the negative frequencies except DC/Nyquist
                            let fold = if k == 0 || (n % 2 == 0 && k == n / 2) {
                                1.0
                            } else {
                                2.0
                            };
                            buffer[k].norm_sqr() * scale * fold
                        })
                        .collect()
                })
                .collect()
        });
        let mut power = Array2::zeros((per_channel.len(), bins.len()));
        for (mut row, values) in power.rows_mut().into_iter().zip(per_channel) {
            for (dst, v) in row.iter_mut().zip(values) {
                *dst = v;
            }
        }
        Ok(BandPsd {
            frequencies_hz,
            power,
        })
    }
    fn bin_frequency(&self, k: usize, n: usize) -> f64 {
        k as f64 * self.sample_rate_hz / n as f64
    }
}
fn hann(n: usize) -> Vec<f64> {
    // too short to taper meaningfully
    if n < 4 {
        return vec![1.0; n];
    }
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / n as f64).cos())
        .collect()
}
