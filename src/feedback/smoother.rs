/// Default blending factor between consecutive cycles.
pub const DEFAULT_SMOOTHING_ALPHA: f64 = 0.25;
/// Exponential blend of `current` into `previous`; passes `current` through
/// when there is no previous value.
pub fn smooth(previous: Option<f64>, current: f64, alpha: f64) -> f64 {
    match previous {
        Some(previous) => previous + (current - previous) * alpha,
        None => current,
    }
}
/// Keeps the previous output between cycles.
#[derive(Clone, Debug)]
pub struct TemporalSmoother {
    alpha: f64,
    previous: Option<f64>,
}
impl TemporalSmoother {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            previous: None,
        }
    }
    pub fn smooth(&mut self, current: f64) -> f64 {
        let output = smooth(self.previous, current, self.alpha);
        self.previous = Some(output);
        output
    }
    pub fn previous(&self) -> Option<f64> {
        self.previous
    }
}
impl Default for TemporalSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING_ALPHA)
    }
}
