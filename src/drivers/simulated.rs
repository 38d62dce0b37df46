use std::time::Instant;
use rand::{rngs::StdRng, Rng, SeedableRng};
use crate::drivers::{AcquisitionError, SignalBuffer, SignalWindow, StreamReceiver};
pub const SIMULATED_DEVICE_NAME: &str = "simulated";
const SAMPLE_RATE_HZ: f64 = 256.0;
const EEG_CHANNELS: [&str; 8] = ["Fz", "F3", "F4", "Cz", "C3", "C4", "P3", "Pz"];
/// Slow drift of the alpha/theta balance so the feedback has something to follow.
const BALANCE_DRIFT_HZ: f64 = 1.0 / 90.0;
struct SignalGen {
    freq_hz: f64,
    phase: f64,
    amp_uv: f64,
}
impl SignalGen {
    fn sample(&self, t: f64, gain: f64) -> f64 {
        (2.0 * std::f64::consts::PI * self.freq_hz * t + self.phase).sin() * self.amp_uv * gain
    }
}
/// Synthetic EEG stream: per channel an alpha and a theta oscillator whose
/// amplitudes trade off slowly, plus uniform noise. Row 0 is a trigger
/// channel that stays at zero.
pub struct SimulatedSource {
    buffer: SignalBuffer,
    window_samples: usize,
    started_at: Instant,
    produced: u64,
    rng: StdRng,
    alpha: Vec<SignalGen>,
    theta: Vec<SignalGen>,
    noise_uv: f64,
}
impl SimulatedSource {
    pub fn new(window_sec: f64, buffer_sec: f64, seed: Option<u64>) -> Result<Self, AcquisitionError> {
        let mut labels = vec!["TRIGGER".to_string()];
        labels.extend(EEG_CHANNELS.iter().map(|s| s.to_string()));
        let buffer =
            SignalBuffer::with_history_seconds(labels, SAMPLE_RATE_HZ, buffer_sec.max(window_sec))?;
        let alpha = (0..EEG_CHANNELS.len())
            .map(|idx| SignalGen {
                freq_hz: 10.0,
                phase: idx as f64 * 0.6,
                amp_uv: 30.0,
            })
            .collect();
        let theta = (0..EEG_CHANNELS.len())
            .map(|idx| SignalGen {
                freq_hz: 6.0,
                phase: idx as f64 * 0.4,
                amp_uv: 25.0,
            })
            .collect();
        Ok(Self {
            buffer,
            window_samples: (window_sec * SAMPLE_RATE_HZ).ceil() as usize,
            started_at: Instant::now(),
            produced: 0,
            rng: match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            },
            alpha,
            theta,
            noise_uv: 8.0,
        })
    }
    /// Appends `count` samples regardless of wall-clock time.
    pub fn generate(&mut self, count: usize) {
        let dt = 1.0 / SAMPLE_RATE_HZ;
        let mut columns = vec![Vec::with_capacity(count); EEG_CHANNELS.len() + 1];
        let mut timestamps = Vec::with_capacity(count);
        for _ in 0..count {
            let t = self.produced as f64 * dt;
            let balance = 0.5 + 0.5 * (2.0 * std::f64::consts::PI * BALANCE_DRIFT_HZ * t).sin();
            columns[0].push(0.0);
            for (ch, column) in columns.iter_mut().skip(1).enumerate() {
                let noise = self.rng.gen_range(-self.noise_uv..self.noise_uv);
                let value = self.alpha[ch].sample(t, 0.3 + balance)
                    + self.theta[ch].sample(t, 1.3 - balance)
                    + noise;
                column.push(value);
            }
            timestamps.push(t);
            self.produced += 1;
        }
        self.buffer.push_columns(&columns, &timestamps);
    }
}
impl StreamReceiver for SimulatedSource {
    fn acquire(&mut self) -> Result<(), AcquisitionError> {
        let due = (self.started_at.elapsed().as_secs_f64() * SAMPLE_RATE_HZ) as u64;
        if due > self.produced {
            self.generate((due - self.produced) as usize);
        }
        Ok(())
    }
    fn get_window(&self) -> Result<SignalWindow, AcquisitionError> {
        Ok(self.buffer.window(self.window_samples))
    }
    fn sample_rate(&self) -> f64 {
        SAMPLE_RATE_HZ
    }
    fn trigger_channel(&self) -> Option<usize> {
        Some(0)
    }
    fn channel_labels(&self) -> &[String] {
        self.buffer.channel_labels()
    }
}
