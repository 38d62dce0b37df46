// src/config.rs
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::feedback::{BandSpec, FeatureMode, MixPolicy, SpatialFilter, DEFAULT_SMOOTHING_ALPHA};

pub const DEFAULT_GLOBAL_TIME_BUDGET_SEC: f64 = 30.0 * 60.0;
pub const DEFAULT_WORKER_COUNT: usize = 1;
pub const DEFAULT_STALE_BACKOFF_SEC: f64 = 1.0;

/// One missing or invalid configuration key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub key: String,
    pub problem: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.problem)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration ({} issue(s)): {}", .0.len(), join_issues(.0))]
    Invalid(Vec<ConfigIssue>),
}

fn join_issues(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawBand {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub reference: Option<f64>,
    pub channels: Option<Vec<usize>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawBandSpecs {
    pub alpha: Option<RawBand>,
    pub theta: Option<RawBand>,
}

/// Configuration file as written; every key optional so that validation can
/// report all problems at once.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub band_specs: Option<RawBandSpecs>,
    pub feature_mode: Option<String>,
    pub mix_policy: Option<String>,
    pub window_size_sec: Option<f64>,
    pub buffer_size_sec: Option<f64>,
    pub cycle_period_sec: Option<f64>,
    pub normalization_window_len: Option<usize>,
    pub sound_state_1_path: Option<PathBuf>,
    pub sound_state_2_path: Option<PathBuf>,
    pub smoothing_alpha: Option<f64>,
    pub global_time_budget_sec: Option<f64>,
    pub worker_count: Option<usize>,
    pub stale_backoff_sec: Option<f64>,
    pub device_name: Option<String>,
    pub device_serial: Option<String>,
    pub spatial_filter: Option<String>,
    pub spatial_channels: Option<Vec<usize>>,
    pub trace_path: Option<PathBuf>,
}

/// Validated session configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackConfig {
    pub alpha: BandSpec,
    pub theta: BandSpec,
    pub feature_mode: FeatureMode,
    pub mix_policy: MixPolicy,
    pub window_size_sec: f64,
    pub buffer_size_sec: f64,
    pub cycle_period: Duration,
    pub normalization_window_len: usize,
    pub sound_state_1_path: PathBuf,
    pub sound_state_2_path: PathBuf,
    pub smoothing_alpha: f64,
    pub global_time_budget: Duration,
    pub worker_count: usize,
    pub stale_backoff: Duration,
    pub device_name: Option<String>,
    pub device_serial: Option<String>,
    pub spatial_filter: SpatialFilter,
    pub spatial_channels: Option<Vec<usize>>,
    pub trace_path: Option<PathBuf>,
}

struct Issues(Vec<ConfigIssue>);

impl Issues {
    fn push(&mut self, key: &str, problem: impl Into<String>) {
        self.0.push(ConfigIssue {
            key: key.to_string(),
            problem: problem.into(),
        });
    }

    fn required<T>(&mut self, key: &str, value: Option<T>) -> Option<T> {
        if value.is_none() {
            self.push(key, "is a required parameter");
        }
        value
    }

    fn positive(&mut self, key: &str, value: Option<f64>) -> Option<f64> {
        let value = self.required(key, value)?;
        if value.is_finite() && value > 0.0 {
            Some(value)
        } else {
            self.push(key, format!("must be a positive number, got {value}"));
            None
        }
    }

    fn band(&mut self, name: &str, raw: Option<RawBand>) -> Option<BandSpec> {
        let key = format!("band_specs.{name}");
        let raw = self.required(&key, raw)?;
        let min = self.required(&format!("{key}.min"), raw.min);
        let max = self.required(&format!("{key}.max"), raw.max);
        let reference = self.positive(&format!("{key}.reference"), raw.reference);
        if raw.channels.as_ref().is_some_and(Vec::is_empty) {
            self.push(&format!("{key}.channels"), "must list at least one channel");
        }
        let (min, max) = (min?, max?);
        if !(min >= 0.0 && min < max) {
            self.push(&key, format!("needs 0 <= min < max, got min={min} max={max}"));
            return None;
        }
        Some(BandSpec {
            min,
            max,
            reference: reference?,
            channels: raw.channels,
        })
    }

    /// `secs` must already be known to be finite and non-negative.
    fn duration(&mut self, key: &str, secs: f64) -> Option<Duration> {
        match Duration::try_from_secs_f64(secs) {
            Ok(duration) => Some(duration),
            Err(e) => {
                self.push(key, format!("{secs} s is not a usable duration: {e}"));
                None
            }
        }
    }

    fn parsed<T: std::str::FromStr>(&mut self, key: &str, value: Option<String>) -> Option<T>
    where
        T::Err: fmt::Display,
    {
        let value = self.required(key, value)?;
        match value.parse() {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                self.push(key, e.to_string());
                None
            }
        }
    }
}

fn defaulted<T: fmt::Debug>(key: &str, value: Option<T>, default: T) -> T {
    value.unwrap_or_else(|| {
        warn!("Setting undefined parameter {key}={default:?}");
        default
    })
}

impl RawConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Checks every key and returns either the typed configuration or the
    /// complete list of problems.
    pub fn validate(self) -> Result<FeedbackConfig, ConfigError> {
        let mut issues = Issues(Vec::new());
        let specs = issues
            .required("band_specs", self.band_specs)
            .unwrap_or_default();
        let alpha = issues.band("alpha", specs.alpha);
        let theta = issues.band("theta", specs.theta);
        let feature_mode = issues.parsed::<FeatureMode>("feature_mode", self.feature_mode);
        let mix_policy = issues.parsed::<MixPolicy>("mix_policy", self.mix_policy);
        let window_size_sec = issues.positive("window_size_sec", self.window_size_sec);
        let buffer_size_sec = issues.positive("buffer_size_sec", self.buffer_size_sec);
        if let (Some(window), Some(buffer)) = (window_size_sec, buffer_size_sec) {
            if buffer < window {
                issues.push(
                    "buffer_size_sec",
                    format!("must be at least window_size_sec ({window}), got {buffer}"),
                );
            }
        }
        let cycle_period = issues
            .positive("cycle_period_sec", self.cycle_period_sec)
            .and_then(|secs| issues.duration("cycle_period_sec", secs));
        let normalization_window_len =
            issues.required("normalization_window_len", self.normalization_window_len);
        if normalization_window_len == Some(0) {
            issues.push("normalization_window_len", "must be at least 1");
        }
        let sound_state_1_path = issues.required("sound_state_1_path", self.sound_state_1_path);
        let sound_state_2_path = issues.required("sound_state_2_path", self.sound_state_2_path);

        let smoothing_alpha =
            defaulted("smoothing_alpha", self.smoothing_alpha, DEFAULT_SMOOTHING_ALPHA);
        if !(smoothing_alpha > 0.0 && smoothing_alpha <= 1.0) {
            issues.push(
                "smoothing_alpha",
                format!("must be in (0, 1], got {smoothing_alpha}"),
            );
        }
        let global_time_budget_sec = defaulted(
            "global_time_budget_sec",
            self.global_time_budget_sec,
            DEFAULT_GLOBAL_TIME_BUDGET_SEC,
        );
        let global_time_budget =
            if global_time_budget_sec.is_finite() && global_time_budget_sec > 0.0 {
                issues.duration("global_time_budget_sec", global_time_budget_sec)
            } else {
                issues.push("global_time_budget_sec", "must be a positive number");
                None
            };
        let worker_count = defaulted("worker_count", self.worker_count, DEFAULT_WORKER_COUNT);
        if worker_count == 0 {
            issues.push("worker_count", "must be at least 1");
        }
        let stale_backoff_sec = defaulted(
            "stale_backoff_sec",
            self.stale_backoff_sec,
            DEFAULT_STALE_BACKOFF_SEC,
        );
        let stale_backoff = if stale_backoff_sec.is_finite() && stale_backoff_sec >= 0.0 {
            issues.duration("stale_backoff_sec", stale_backoff_sec)
        } else {
            issues.push("stale_backoff_sec", "must be a non-negative number");
            None
        };
        let spatial_filter = match self.spatial_filter {
            Some(name) => issues
                .parsed::<SpatialFilter>("spatial_filter", Some(name))
                .unwrap_or_default(),
            None => SpatialFilter::None,
        };
        if self.spatial_channels.as_ref().is_some_and(Vec::is_empty) {
            issues.push("spatial_channels", "must list at least one channel");
        }

        if !issues.0.is_empty() {
            return Err(ConfigError::Invalid(issues.0));
        }
        // every required value is present once no issue was recorded
        match (
            alpha,
            theta,
            feature_mode,
            mix_policy,
            window_size_sec,
            buffer_size_sec,
            cycle_period,
            normalization_window_len,
            sound_state_1_path,
            sound_state_2_path,
            global_time_budget,
            stale_backoff,
        ) {
            (
                Some(alpha),
                Some(theta),
                Some(feature_mode),
                Some(mix_policy),
                Some(window_size_sec),
                Some(buffer_size_sec),
                Some(cycle_period),
                Some(normalization_window_len),
                Some(sound_state_1_path),
                Some(sound_state_2_path),
                Some(global_time_budget),
                Some(stale_backoff),
            ) => Ok(FeedbackConfig {
                alpha,
                theta,
                feature_mode,
                mix_policy,
                window_size_sec,
                buffer_size_sec,
                cycle_period,
                normalization_window_len,
                sound_state_1_path,
                sound_state_2_path,
                smoothing_alpha,
                global_time_budget,
                worker_count,
                stale_backoff,
                device_name: self.device_name,
                device_serial: self.device_serial,
                spatial_filter,
                spatial_channels: self.spatial_channels,
                trace_path: self.trace_path,
            }),
            _ => Err(ConfigError::Invalid(vec![ConfigIssue {
                key: "<config>".into(),
                problem: "incomplete configuration".into(),
            }])),
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<FeedbackConfig, ConfigError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    RawConfig::from_json(&text)?.validate()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"{
        "band_specs": {
            "alpha": {"min": 8.0, "max": 12.0, "reference": 239550.0},
            "theta": {"min": 4.0, "max": 8.0, "reference": 702870.0, "channels": [7]}
        },
        "feature_mode": "ALPHA_THETA",
        "mix_policy": "REPLACING",
        "window_size_sec": 2.0,
        "buffer_size_sec": 2.0,
        "cycle_period_sec": 0.25,
        "normalization_window_len": 120,
        "sound_state_1_path": "brook.wav",
        "sound_state_2_path": "waves.wav"
    }"#;

    fn keys(err: ConfigError) -> Vec<String> {
        match err {
            ConfigError::Invalid(issues) => issues.into_iter().map(|i| i.key).collect(),
            other => panic!("expected validation issues, got {other}"),
        }
    }

    #[test]
    fn full_config_validates_with_defaults() {
        let cfg = RawConfig::from_json(FULL).unwrap().validate().unwrap();
        assert_eq!(cfg.feature_mode, FeatureMode::AlphaTheta);
        assert_eq!(cfg.mix_policy, MixPolicy::Replacing);
        assert_eq!(cfg.smoothing_alpha, 0.25);
        assert_eq!(cfg.global_time_budget, Duration::from_secs(1800));
        assert_eq!(cfg.worker_count, 1);
        assert_eq!(cfg.stale_backoff, Duration::from_secs(1));
        assert_eq!(cfg.cycle_period, Duration::from_millis(250));
        assert_eq!(cfg.theta.channels, Some(vec![7]));
        assert_eq!(cfg.spatial_filter, SpatialFilter::None);
        assert!(cfg.device_name.is_none());
    }

    #[test]
    fn every_missing_key_is_reported() {
        let err = RawConfig::from_json("{}").unwrap().validate().unwrap_err();
        let keys = keys(err);
        for key in [
            "band_specs",
            "band_specs.alpha",
            "band_specs.theta",
            "feature_mode",
            "mix_policy",
            "window_size_sec",
            "buffer_size_sec",
            "cycle_period_sec",
            "normalization_window_len",
            "sound_state_1_path",
            "sound_state_2_path",
        ] {
            assert!(keys.iter().any(|k| k == key), "missing issue for {key}");
        }
    }

    #[test]
    fn unrecognised_enumerations_are_configuration_errors() {
        let text = FULL
            .replace("\"REPLACING\"", "\"SHUFFLE\"")
            .replace("\"ALPHA_THETA\"", "\"GAMMA\"");
        let err = RawConfig::from_json(&text).unwrap().validate().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("unsupported mix policy 'SHUFFLE'"));
        assert_eq!(keys(err), vec!["feature_mode", "mix_policy"]);
    }

    #[test]
    fn inconsistent_values_are_rejected() {
        let text = FULL
            .replace("\"min\": 8.0, \"max\": 12.0", "\"min\": 12.0, \"max\": 8.0")
            .replace("\"buffer_size_sec\": 2.0", "\"buffer_size_sec\": 1.0")
            .replace("\"normalization_window_len\": 120", "\"normalization_window_len\": 0");
        let err = RawConfig::from_json(&text).unwrap().validate().unwrap_err();
        assert_eq!(
            keys(err),
            vec!["band_specs.alpha", "buffer_size_sec", "normalization_window_len"]
        );
    }

    #[test]
    fn oversized_durations_are_reported_not_panicked_on() {
        let text = FULL.replacen(
            '{',
            "{\"global_time_budget_sec\": 1e20, \"stale_backoff_sec\": 1e300,",
            1,
        );
        let text = text.replace("\"cycle_period_sec\": 0.25", "\"cycle_period_sec\": 1e25");
        let err = RawConfig::from_json(&text).unwrap().validate().unwrap_err();
        assert_eq!(
            keys(err),
            vec!["cycle_period_sec", "global_time_budget_sec", "stale_backoff_sec"]
        );
    }

    #[test]
    fn empty_channel_lists_are_rejected() {
        let text = FULL
            .replace("\"channels\": [7]", "\"channels\": []")
            .replacen('{', "{\"spatial_filter\": \"CAR\", \"spatial_channels\": [],", 1);
        let err = RawConfig::from_json(&text).unwrap().validate().unwrap_err();
        assert_eq!(keys(err), vec!["band_specs.theta.channels", "spatial_channels"]);
    }

    #[test]
    fn misspelt_band_keys_fail_to_parse() {
        let text = FULL.replace("\"reference\": 239550.0", "\"refrence\": 239550.0");
        let err = RawConfig::from_json(&text).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("refrence"));
    }

    #[test]
    fn unknown_keys_fail_to_parse() {
        let text = FULL.replacen('{', "{\"TIMER_SLEEP\": 15,", 1);
        assert!(matches!(
            RawConfig::from_json(&text),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_config_reports_missing_file() {
        assert!(matches!(
            load_config("/no/such/config.json"),
            Err(ConfigError::Io { .. })
        ));
    }
}
