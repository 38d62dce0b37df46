// src/engine.rs
use std::io::Write;
use std::sync::mpsc::Sender;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use ndarray::{Array2, Axis};

use crate::config::FeedbackConfig;
use crate::drivers::StreamReceiver;
use crate::feedback::{
    AdaptiveNormalizer, BandPowerEstimator, FeatureExtractor, FeedbackError, FeedbackMixer,
    SoundChannel, SpatialFilter, TemporalSmoother,
};
use crate::recorder::TraceRecorder;
use crate::types::*;

/// Poll interval while the controller holds the session in WAIT.
pub const WAIT_POLL: Duration = Duration::from_millis(10);

#[derive(Clone, Copy, Debug)]
pub struct LoopTiming {
    pub cycle_period: Duration,
    pub stale_backoff: Duration,
    pub wait_poll: Duration,
    pub time_budget: Duration,
}

impl LoopTiming {
    fn from_config(config: &FeedbackConfig) -> Self {
        Self {
            cycle_period: config.cycle_period,
            stale_backoff: config.stale_backoff,
            wait_poll: WAIT_POLL,
            time_budget: config.global_time_budget,
        }
    }
}

/// What a single pass through the cycle body did.
#[derive(Clone, Debug, PartialEq)]
pub enum CycleOutcome {
    /// Feedback was updated.
    Applied(CycleReport),
    /// No sample newer than the last one processed.
    Stale,
    /// Acquisition or feature computation failed; volumes were left alone.
    Skipped,
}

/// Closed-loop neurofeedback session: pulls windows from the receiver,
/// turns them into a feature, and drives the two feedback sounds.
///
/// All per-cycle state (history, previous smoothed value, last timestamp)
/// lives here and is only touched from the thread running the loop.
pub struct SessionLoop<R: StreamReceiver, S: SoundChannel> {
    receiver: R,
    spatial_filter: SpatialFilter,
    spatial_channels: Option<Vec<usize>>,
    extractor: FeatureExtractor,
    normalizer: AdaptiveNormalizer,
    smoother: TemporalSmoother,
    mixer: FeedbackMixer<S>,
    signal: SessionSignal,
    timing: LoopTiming,
    last_ts: Option<f64>,
    started_at: Option<Instant>,
    summary: SessionSummary,
    outbox: Option<Sender<SessionMessage>>,
    recorder: Option<TraceRecorder<Box<dyn Write>>>,
}

impl<R: StreamReceiver, S: SoundChannel> SessionLoop<R, S> {
    /// Builds the pipeline for `receiver`'s sample rate and sets the starting
    /// volumes; the sounds stay silent until [`run`](Self::run) sees RUN.
    ///
    /// Band and spatial channel indices refer to the window after the trigger
    /// channel has been removed; out-of-range indices are rejected here.
    pub fn new(
        receiver: R,
        config: &FeedbackConfig,
        sounds: (S, S),
        signal: SessionSignal,
    ) -> Result<Self, FeedbackError> {
        let sample_rate = receiver.sample_rate();
        let alpha = BandPowerEstimator::new(config.alpha.clone(), sample_rate, config.worker_count)?;
        let theta = BandPowerEstimator::new(config.theta.clone(), sample_rate, config.worker_count)?;
        let extractor = FeatureExtractor::new(config.feature_mode, alpha, theta);
        let eeg_channels = receiver
            .channel_labels()
            .len()
            .saturating_sub(usize::from(receiver.trigger_channel().is_some()));
        extractor.check_channels(eeg_channels)?;
        if let Some(channels) = &config.spatial_channels {
            if let Some(&channel) = channels.iter().find(|&&ch| ch >= eeg_channels) {
                return Err(FeedbackError::ChannelOutOfRange {
                    channel,
                    available: eeg_channels,
                });
            }
        }
        let mixer = FeedbackMixer::new(config.mix_policy, sounds.0, sounds.1);
        info!(
            "Session ready: {:?} feature, {:?} mix, {} Hz, {} EEG channels",
            config.feature_mode, config.mix_policy, sample_rate, eeg_channels
        );
        Ok(Self {
            receiver,
            spatial_filter: config.spatial_filter,
            spatial_channels: config.spatial_channels.clone(),
            extractor,
            normalizer: AdaptiveNormalizer::new(config.normalization_window_len),
            smoother: TemporalSmoother::new(config.smoothing_alpha),
            mixer,
            signal,
            timing: LoopTiming::from_config(config),
            last_ts: None,
            started_at: None,
            summary: SessionSummary::default(),
            outbox: None,
            recorder: None,
        })
    }

    pub fn with_outbox(mut self, outbox: Sender<SessionMessage>) -> Self {
        self.outbox = Some(outbox);
        self
    }

    pub fn with_recorder(mut self, recorder: TraceRecorder<Box<dyn Write>>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn with_timing(mut self, timing: LoopTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn summary(&self) -> SessionSummary {
        self.summary
    }

    pub fn normalizer(&self) -> &AdaptiveNormalizer {
        &self.normalizer
    }

    pub fn smoother(&self) -> &TemporalSmoother {
        &self.smoother
    }

    pub fn mixer(&self) -> &FeedbackMixer<S> {
        &self.mixer
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.last_ts
    }

    fn notify(&self, message: SessionMessage) {
        if let Some(tx) = &self.outbox {
            tx.send(message).ok();
        }
    }

    /// Runs the session until the controller leaves RUN or the time budget
    /// is spent. A cycle in progress always completes first. The feedback
    /// loops only start once RUN has been seen.
    pub fn run(&mut self) -> SessionOutcome {
        let state = wait_for_controller(&self.signal, self.timing.wait_poll, self.outbox.as_ref());
        if state == SessionState::Stop {
            info!("Stop requested before the session started");
            return self.finish(SessionOutcome::Aborted);
        }
        self.notify(SessionMessage::State(SessionState::Run));
        self.mixer.start();
        let started = *self.started_at.get_or_insert_with(Instant::now);
        self.notify(SessionMessage::Log(format!(
            "Session running (budget {:.0}s)",
            self.timing.time_budget.as_secs_f64()
        )));

        let outcome = loop {
            if self.signal.get() != SessionState::Run {
                break SessionOutcome::Stopped;
            }
            if started.elapsed() >= self.timing.time_budget {
                break SessionOutcome::Completed;
            }
            let cycle_start = Instant::now();
            if self.run_cycle() == CycleOutcome::Stale {
                thread::sleep(self.timing.stale_backoff);
                continue;
            }
            sleep_at_least(cycle_start, self.timing.cycle_period);
        };
        self.finish(outcome)
    }

    /// One pass of the cycle body, without pacing.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        let started = *self.started_at.get_or_insert_with(Instant::now);
        if let Err(e) = self.receiver.acquire() {
            warn!("Acquisition failed: {e}");
            self.summary.skipped_cycles += 1;
            return CycleOutcome::Skipped;
        }
        let window = match self.receiver.get_window() {
            Ok(window) => window,
            Err(e) => {
                warn!("Could not read window: {e}");
                self.summary.skipped_cycles += 1;
                return CycleOutcome::Skipped;
            }
        };
        if !window.has_samples_after(self.last_ts) {
            warn!("There seems to be delay in receiving data.");
            self.notify(SessionMessage::Stale {
                last_seen: self.last_ts,
            });
            self.summary.stale_cycles += 1;
            return CycleOutcome::Stale;
        }
        let latest = window.latest_timestamp();
        let feature = self.compute_feature(window.samples);
        // the window has been consumed either way
        self.last_ts = latest.or(self.last_ts);
        let feature = match feature {
            Ok(feature) => feature,
            Err(e) => {
                warn!("Feedback held this cycle: {e}");
                self.summary.skipped_cycles += 1;
                return CycleOutcome::Skipped;
            }
        };

        let ratio = self.normalizer.normalize(feature);
        let smoothed = self.smoother.smooth(ratio);
        let volumes = self.mixer.mix(smoothed);
        let report = CycleReport {
            elapsed: started.elapsed(),
            last_timestamp: self.last_ts.unwrap_or_default(),
            feature,
            ratio,
            smoothed,
            volumes,
        };
        debug!(
            "feature={:.4} ratio={:.4} smoothed={:.4} volumes=({:.3}, {:.3})",
            feature, ratio, smoothed, volumes.0, volumes.1
        );
        if let Some(recorder) = &mut self.recorder {
            if let Err(e) = recorder.write_record(&report) {
                warn!("Failed to write trace row: {e}");
            }
        }
        self.notify(SessionMessage::Feedback(report));
        self.summary.applied_cycles += 1;
        CycleOutcome::Applied(report)
    }

    fn compute_feature(&self, samples: Array2<f64>) -> Result<f64, FeedbackError> {
        let mut eeg = match self.receiver.trigger_channel() {
            Some(trigger) if trigger < samples.nrows() => {
                let keep: Vec<usize> = (0..samples.nrows()).filter(|&r| r != trigger).collect();
                samples.select(Axis(0), &keep)
            }
            _ => samples,
        };
        self.spatial_filter
            .apply(&mut eeg, self.spatial_channels.as_deref())?;
        self.extractor.extract(&eeg)
    }

    fn finish(&mut self, outcome: SessionOutcome) -> SessionOutcome {
        if let Some(recorder) = self.recorder.take() {
            let rows = recorder.rows();
            match recorder.finish() {
                Ok(_) => info!("Feedback trace closed ({rows} rows)"),
                Err(e) => warn!("Failed to flush feedback trace: {e}"),
            }
        }
        self.summary.elapsed = self
            .started_at
            .map(|t| t.elapsed())
            .unwrap_or_default();
        info!(
            "Session finished ({:?}): {} applied, {} stale, {} skipped cycles in {:.1}s",
            outcome,
            self.summary.applied_cycles,
            self.summary.stale_cycles,
            self.summary.skipped_cycles,
            self.summary.elapsed.as_secs_f64()
        );
        self.notify(SessionMessage::State(SessionState::Stop));
        self.notify(SessionMessage::Finished(outcome, self.summary));
        outcome
    }
}

/// Blocks (polling every `poll`) while `signal` says WAIT; returns the first
/// other state seen.
pub fn wait_for_controller(
    signal: &SessionSignal,
    poll: Duration,
    outbox: Option<&Sender<SessionMessage>>,
) -> SessionState {
    let mut announced = false;
    loop {
        match signal.get() {
            SessionState::Wait => {
                if !announced {
                    info!("Waiting for the controller to start the session");
                    if let Some(tx) = outbox {
                        tx.send(SessionMessage::State(SessionState::Wait)).ok();
                    }
                    announced = true;
                }
                thread::sleep(poll);
            }
            state => return state,
        }
    }
}

/// Sleeps out the rest of `period` measured from `start`; returns at once if
/// the period has already passed. Overruns are not made up later.
pub fn sleep_at_least(start: Instant, period: Duration) {
    if let Some(remaining) = period.checked_sub(start.elapsed()) {
        thread::sleep(remaining);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::source::make_batch;
    use crate::drivers::{ManualSource, SignalBatch};
    use crate::feedback::{BandSpec, FeatureMode, MemorySound, MixPolicy};
    use crate::testlog::{capture, count};
    use log::Level;
    use std::path::PathBuf;
    use std::sync::mpsc::channel;

    const FS: f64 = 256.0;
    const N: usize = 256;

    fn config(mode: FeatureMode, theta_reference: f64) -> FeedbackConfig {
        FeedbackConfig {
            alpha: BandSpec {
                min: 8.0,
                max: 12.0,
                reference: 1.0,
                channels: None,
            },
            theta: BandSpec {
                min: 4.0,
                max: 8.0,
                reference: theta_reference,
                channels: None,
            },
            feature_mode: mode,
            mix_policy: MixPolicy::Replacing,
            window_size_sec: 1.0,
            buffer_size_sec: 1.0,
            cycle_period: Duration::from_millis(5),
            normalization_window_len: 8,
            sound_state_1_path: PathBuf::from("one.wav"),
            sound_state_2_path: PathBuf::from("two.wav"),
            smoothing_alpha: 0.25,
            global_time_budget: Duration::from_secs(60),
            worker_count: 1,
            stale_backoff: Duration::from_millis(1),
            device_name: None,
            device_serial: None,
            spatial_filter: SpatialFilter::None,
            spatial_channels: None,
            trace_path: None,
        }
    }

    /// Centred unit impulse: its Hann-windowed spectrum is flat.
    fn impulse_batch(start_ts: f64) -> SignalBatch {
        let mut channel = vec![0.0; N];
        channel[N / 2] = 1.0;
        let timestamps = (0..N).map(|i| start_ts + i as f64 / FS).collect();
        make_batch(FS, vec![channel], timestamps, vec!["Pz".into()])
    }

    fn tone_batch(start_ts: f64, amplitude: f64) -> SignalBatch {
        let channel = (0..N)
            .map(|i| amplitude * (2.0 * std::f64::consts::PI * 6.0 * i as f64 / FS).sin())
            .collect();
        let timestamps = (0..N).map(|i| start_ts + i as f64 / FS).collect();
        make_batch(FS, vec![channel], timestamps, vec!["Pz".into()])
    }

    fn source(batches: Vec<SignalBatch>) -> ManualSource {
        ManualSource::new(vec!["Pz".into()], FS, N, batches).unwrap()
    }

    fn sounds() -> (MemorySound, MemorySound) {
        (MemorySound::default(), MemorySound::default())
    }

    fn flat_theta_power() -> f64 {
        let band = BandSpec {
            min: 4.0,
            max: 8.0,
            reference: 1.0,
            channels: None,
        };
        let estimator = BandPowerEstimator::new(band, FS, 1).unwrap();
        let batch = impulse_batch(0.0);
        let window = Array2::from_shape_vec((1, N), batch.samples[0].clone()).unwrap();
        estimator.estimate(&window).unwrap()
    }

    #[test]
    fn flat_spectrum_first_cycle_end_to_end() {
        let cfg = config(FeatureMode::Theta, flat_theta_power());
        let mut session = SessionLoop::new(
            source(vec![impulse_batch(0.0)]),
            &cfg,
            sounds(),
            SessionSignal::new(SessionState::Run),
        )
        .unwrap();
        let CycleOutcome::Applied(report) = session.run_cycle() else {
            panic!("first cycle should apply feedback");
        };
        assert_eq!(report.feature, 1.0);
        assert_eq!(report.ratio, 1.0);
        assert_eq!(report.smoothed, 1.0);
        assert_eq!(report.volumes, (1.0, 0.0));
        assert_eq!(session.mixer().volumes(), (1.0, 0.0));
        assert_eq!(session.last_timestamp(), Some(255.0 / FS));
    }

    #[test]
    fn stale_cycles_leave_state_untouched_and_warn_once_each() {
        let (tx, rx) = channel();
        let cfg = config(FeatureMode::Theta, 1.0);
        let mut session = SessionLoop::new(
            source(vec![tone_batch(0.0, 1.0)]),
            &cfg,
            sounds(),
            SessionSignal::new(SessionState::Run),
        )
        .unwrap()
        .with_outbox(tx);
        assert!(matches!(session.run_cycle(), CycleOutcome::Applied(_)));
        let filled = session.normalizer().history().filled();
        let previous = session.smoother().previous();
        let last_ts = session.last_timestamp();
        rx.try_iter().count();

        let ((), records) = capture(|| {
            for _ in 0..3 {
                assert_eq!(session.run_cycle(), CycleOutcome::Stale);
            }
        });
        assert_eq!(count(&records, Level::Warn), 3);
        let stale: Vec<SessionMessage> = rx.try_iter().collect();
        assert_eq!(stale.len(), 3);
        assert!(stale
            .iter()
            .all(|m| matches!(m, SessionMessage::Stale { last_seen } if *last_seen == last_ts)));
        assert_eq!(session.normalizer().history().filled(), filled);
        assert_eq!(session.smoother().previous(), previous);
        assert_eq!(session.last_timestamp(), last_ts);
        assert_eq!(session.summary().stale_cycles, 3);
        assert_eq!(session.summary().applied_cycles, 1);
    }

    #[test]
    fn empty_stream_is_stale() {
        let cfg = config(FeatureMode::Theta, 1.0);
        let mut session = SessionLoop::new(
            source(Vec::new()),
            &cfg,
            sounds(),
            SessionSignal::new(SessionState::Run),
        )
        .unwrap();
        assert_eq!(session.run_cycle(), CycleOutcome::Stale);
        assert_eq!(session.last_timestamp(), None);
    }

    #[test]
    fn ratio_follows_history_and_smoothing() {
        let cfg = config(FeatureMode::Theta, 1.0);
        let mut session = SessionLoop::new(
            source(vec![tone_batch(0.0, 2.0), tone_batch(1.0, 1.0)]),
            &cfg,
            sounds(),
            SessionSignal::new(SessionState::Run),
        )
        .unwrap();
        let CycleOutcome::Applied(first) = session.run_cycle() else {
            panic!("expected feedback");
        };
        let CycleOutcome::Applied(second) = session.run_cycle() else {
            panic!("expected feedback");
        };
        // power scales with amplitude squared
        assert!((second.ratio - 0.25).abs() < 1e-9);
        assert!((second.smoothed - (1.0 + (0.25 - 1.0) * 0.25)).abs() < 1e-9);
        assert!((second.feature / first.feature - 0.25).abs() < 1e-9);
        assert_eq!(session.normalizer().history().filled(), 2);
    }

    #[test]
    fn degenerate_feature_holds_volumes() {
        let cfg = config(FeatureMode::AlphaTheta, 1.0);
        let silent = make_batch(
            FS,
            vec![vec![0.0; N]],
            (0..N).map(|i| i as f64 / FS).collect(),
            vec!["Pz".into()],
        );
        let mut session = SessionLoop::new(
            source(vec![silent]),
            &cfg,
            sounds(),
            SessionSignal::new(SessionState::Run),
        )
        .unwrap();
        assert_eq!(session.run_cycle(), CycleOutcome::Skipped);
        assert_eq!(session.mixer().volumes(), (1.0, 0.0));
        assert_eq!(session.normalizer().history().filled(), 0);
        assert_eq!(session.smoother().previous(), None);
        assert_eq!(session.summary().skipped_cycles, 1);
        // the silent window was consumed, so the next cycle is stale, not a retry
        assert_eq!(session.run_cycle(), CycleOutcome::Stale);
    }

    #[test]
    fn trigger_channel_is_excluded_from_the_feature() {
        let cfg = config(FeatureMode::Theta, 1.0);
        let tone = tone_batch(0.0, 1.0);
        let with_trigger = make_batch(
            FS,
            vec![vec![500.0; N], tone.samples[0].clone()],
            tone.timestamps.clone(),
            vec!["TRIGGER".into(), "Pz".into()],
        );
        let receiver = ManualSource::new(vec!["TRIGGER".into(), "Pz".into()], FS, N, vec![with_trigger])
            .unwrap()
            .with_trigger_channel(0);
        let mut triggered =
            SessionLoop::new(receiver, &cfg, sounds(), SessionSignal::new(SessionState::Run)).unwrap();
        let mut plain =
            SessionLoop::new(source(vec![tone]), &cfg, sounds(), SessionSignal::new(SessionState::Run))
                .unwrap();
        let (CycleOutcome::Applied(a), CycleOutcome::Applied(b)) =
            (triggered.run_cycle(), plain.run_cycle())
        else {
            panic!("expected feedback from both sessions");
        };
        assert_eq!(a.feature, b.feature);
    }

    #[test]
    fn out_of_range_band_channel_is_rejected_up_front() {
        let mut cfg = config(FeatureMode::Theta, 1.0);
        cfg.theta.channels = Some(vec![3]);
        let result = SessionLoop::new(
            source(Vec::new()),
            &cfg,
            sounds(),
            SessionSignal::new(SessionState::Run),
        );
        assert!(matches!(
            result,
            Err(FeedbackError::ChannelOutOfRange { channel: 3, available: 1 })
        ));
    }

    #[test]
    fn stop_before_start_aborts_without_cycles() {
        let (tx, rx) = channel();
        let cfg = config(FeatureMode::Theta, 1.0);
        let mut session = SessionLoop::new(
            source(vec![tone_batch(0.0, 1.0)]),
            &cfg,
            sounds(),
            SessionSignal::new(SessionState::Stop),
        )
        .unwrap()
        .with_outbox(tx);
        assert_eq!(session.run(), SessionOutcome::Aborted);
        assert_eq!(session.summary().applied_cycles, 0);
        let (first, second) = session.mixer().sounds();
        assert!(!first.playing && !second.playing);
        assert!(rx
            .try_iter()
            .any(|m| matches!(m, SessionMessage::Finished(SessionOutcome::Aborted, _))));
    }

    #[test]
    fn time_budget_ends_the_session() {
        let cfg = config(FeatureMode::Theta, 1.0);
        let batches = (0..50).map(|i| tone_batch(i as f64, 1.0)).collect();
        let mut session = SessionLoop::new(
            source(batches),
            &cfg,
            sounds(),
            SessionSignal::new(SessionState::Run),
        )
        .unwrap()
        .with_timing(LoopTiming {
            cycle_period: Duration::from_millis(5),
            stale_backoff: Duration::from_millis(1),
            wait_poll: Duration::from_millis(1),
            time_budget: Duration::from_millis(60),
        });
        assert_eq!(session.run(), SessionOutcome::Completed);
        let summary = session.summary();
        assert!(summary.applied_cycles >= 1);
        assert!(summary.elapsed >= Duration::from_millis(60));
        let (first, second) = session.mixer().sounds();
        assert!(first.playing && second.playing);
    }

    #[test]
    fn controller_start_then_stop() {
        let cfg = config(FeatureMode::Theta, 1.0);
        let signal = SessionSignal::new(SessionState::Wait);
        let controller = signal.clone();
        let batches = (0..1000).map(|i| tone_batch(i as f64, 1.0)).collect();
        let mut session = SessionLoop::new(source(batches), &cfg, sounds(), signal).unwrap();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            controller.set(SessionState::Run);
            thread::sleep(Duration::from_millis(50));
            controller.set(SessionState::Stop);
        });
        assert_eq!(session.run(), SessionOutcome::Stopped);
        handle.join().unwrap();
        assert!(session.summary().applied_cycles >= 1);
    }

    #[test]
    fn pacing_sleeps_only_the_remainder() {
        let start = Instant::now();
        sleep_at_least(start, Duration::from_millis(20));
        assert!(start.elapsed() >= Duration::from_millis(20));
        let late = Instant::now() - Duration::from_millis(50);
        let before = Instant::now();
        sleep_at_least(late, Duration::from_millis(20));
        assert!(before.elapsed() < Duration::from_millis(20));
    }
}
