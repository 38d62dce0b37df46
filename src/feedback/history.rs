use std::collections::VecDeque;
/// Fixed-size FIFO of the most recent feature values.
///
/// Slots that have not been filled yet hold `None`. The length never changes:
/// every push evicts the front slot, filled or not.
#[derive(Clone, Debug)]
pub struct RingHistory {
    slots: VecDeque<Option<f64>>,
}
impl RingHistory {
    pub fn new(len: usize) -> Self {
        let len = len.max(1);
        Self {
            slots: std::iter::repeat(None).take(len).collect(),
        }
    }
    pub fn len(&self) -> usize {
        self.slots.len()
    }
    pub fn filled(&self) -> usize {
        self.slots.iter().flatten().count()
    }
    pub fn push(&mut self, value: f64) {
        self.slots.pop_front();
        self.slots.push_back(Some(value));
    }
    pub fn newest(&self) -> Option<f64> {
        self.slots.back().copied().flatten()
    }
    /// Largest filled value, `None` while nothing has been pushed.
    pub fn max(&self) -> Option<f64> {
        self.slots.iter().flatten().copied().reduce(f64::max)
    }
    pub fn iter(&self) -> impl Iterator<Item = Option<f64>> + '_ {
        self.slots.iter().copied()
    }
}
