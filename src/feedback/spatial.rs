use std::str::FromStr;
use ndarray::{Array2, Axis};
use crate::feedback::FeedbackError;
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SpatialFilter {
    #[default]
    None,
    /// Common average reference.
    Car,
}
impl FromStr for SpatialFilter {
    type Err = FeedbackError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NONE" => Ok(SpatialFilter::None),
            "CAR" => Ok(SpatialFilter::Car),
            other => Err(FeedbackError::UnsupportedSpatialFilter(other.to_string())),
        }
    }
}
impl SpatialFilter {
    /// Filters `window` in place. With `channels`, only those rows take part
    /// in (and are changed by) the reference; other rows are left untouched.
    pub fn apply(
        &self,
        window: &mut Array2<f64>,
        channels: Option<&[usize]>,
    ) -> Result<(), FeedbackError> {
        match self {
            SpatialFilter::None => Ok(()),
            SpatialFilter::Car => {
                let available = window.nrows();
                let rows: Vec<usize> = match channels {
                    Some(channels) => channels.to_vec(),
                    None => (0..available).collect(),
                };
                if let Some(&channel) = rows.iter().find(|&&ch| ch >= available) {
                    return Err(FeedbackError::ChannelOutOfRange { channel, available });
                }
                if rows.is_empty() {
                    return Ok(());
                }
                let reference = match window.select(Axis(0), &rows).mean_axis(Axis(0)) {
                    Some(reference) => reference,
                    None => return Ok(()),
                };
                for &ch in &rows {
                    let mut row = window.row_mut(ch);
                    row -= &reference;
                }
                Ok(())
            }
        }
    }
}
