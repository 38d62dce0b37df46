use std::str::FromStr;
use crate::feedback::{FeedbackError, SoundChannel};
/// How the smoothed ratio is spread over the two feedback sounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MixPolicy {
    /// Crossfade: sound 1 follows the ratio, sound 2 its complement.
    Replacing,
    /// Sound 1 stays as is, sound 2 fades out as the ratio grows.
    AdditiveNegative,
    /// Sound 1 stays as is, sound 2 fades in as the ratio grows.
    AdditivePositive,
}
impl FromStr for MixPolicy {
    type Err = FeedbackError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REPLACING" => Ok(MixPolicy::Replacing),
            "ADDITIVE_NEGATIVE" => Ok(MixPolicy::AdditiveNegative),
            "ADDITIVE_POSITIVE" => Ok(MixPolicy::AdditivePositive),
            other => Err(FeedbackError::UnsupportedPolicy(other.to_string())),
        }
    }
}
fn unit(v: f64) -> f32 {
    v.clamp(0.0, 1.0) as f32
}
/// Volumes for `ratio` under `policy`, given the volumes currently applied.
/// Every output is clamped to `[0, 1]`; the ratio itself may exceed one.
pub fn mix_volumes(policy: MixPolicy, ratio: f64, current: (f32, f32)) -> (f32, f32) {
    match policy {
        MixPolicy::Replacing => (unit(ratio), unit(1.0 - ratio)),
        MixPolicy::AdditiveNegative => (current.0, unit(1.0 - ratio)),
        MixPolicy::AdditivePositive => (current.0, unit(ratio)),
    }
}
/// Owns the two looping sounds and applies the mix policy to them.
pub struct FeedbackMixer<S: SoundChannel> {
    policy: MixPolicy,
    sounds: (S, S),
}
impl<S: SoundChannel> FeedbackMixer<S> {
    /// Sets the starting volumes (1.0 and 0.0). Nothing plays until
    /// [`start`](Self::start).
    pub fn new(policy: MixPolicy, mut first: S, mut second: S) -> Self {
        first.set_volume(1.0);
        second.set_volume(0.0);
        Self {
            policy,
            sounds: (first, second),
        }
    }
    /// Starts both loops; calling it again is a no-op.
    pub fn start(&mut self) {
        if !self.sounds.0.is_playing() {
            self.sounds.0.play_looped();
        }
        if !self.sounds.1.is_playing() {
            self.sounds.1.play_looped();
        }
    }
    pub fn volumes(&self) -> (f32, f32) {
        (self.sounds.0.volume(), self.sounds.1.volume())
    }
    pub fn mix(&mut self, ratio: f64) -> (f32, f32) {
        let (v1, v2) = mix_volumes(self.policy, ratio, self.volumes());
        if self.policy == MixPolicy::Replacing {
            self.sounds.0.set_volume(v1);
        }
        self.sounds.1.set_volume(v2);
        (v1, v2)
    }
    pub fn sounds(&self) -> &(S, S) {
        &self.sounds
    }
}
