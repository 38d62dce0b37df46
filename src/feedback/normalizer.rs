use crate::feedback::RingHistory;
/// Mix ratio used while the history has no usable maximum yet.
pub const FALLBACK_RATIO: f64 = 1.0;
/// Ratio of `feature` to the largest value already in `history`, then
/// records `feature`. The current value never takes part in its own maximum.
///
/// Without a finite positive maximum (first cycle, or an all-zero history)
/// the ratio is [`FALLBACK_RATIO`].
pub fn normalize(history: &mut RingHistory, feature: f64) -> f64 {
    let current_max = history.max();
    let ratio = match current_max {
        Some(max) if max.is_finite() && max > 0.0 => feature / max,
        _ => FALLBACK_RATIO,
    };
    history.push(feature);
    ratio
}
/// Owns the history window for a session.
pub struct AdaptiveNormalizer {
    history: RingHistory,
}
impl AdaptiveNormalizer {
    pub fn new(window_len: usize) -> Self {
        Self {
            history: RingHistory::new(window_len),
        }
    }
    pub fn normalize(&mut self, feature: f64) -> f64 {
        normalize(&mut self.history, feature)
    }
    pub fn history(&self) -> &RingHistory {
        &self.history
    }
}
