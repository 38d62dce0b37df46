use thiserror::Error;
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("sample rate must be greater than zero")]
    InvalidSampleRate,
    #[error("channel count mismatch: expected {expected}, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },
    #[error("timestamp count mismatch: {samples} samples but {timestamps} timestamps")]
    TimestampMismatch { samples: usize, timestamps: usize },
    #[error("window must hold at least one sample")]
    EmptyWindow,
    #[error("device backend failed: {0}")]
    Backend(String),
}
impl From<anyhow::Error> for AcquisitionError {
    fn from(value: anyhow::Error) -> Self {
        AcquisitionError::Backend(format!("{value:#}"))
    }
}
