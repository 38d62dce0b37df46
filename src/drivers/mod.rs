// src/drivers/mod.rs
// Acquisition side: stream receivers, rolling buffers and spectral estimation.
pub mod brainflow;
pub mod buffer;
pub mod discovery;
pub mod error;
pub mod psd;
pub mod simulated;
pub mod source;
pub use buffer::SignalBuffer;
pub use discovery::{connect, resolve_device, DeviceId};
pub use error::AcquisitionError;
pub use psd::{BandPsd, PsdEstimator};
pub use simulated::SimulatedSource;
pub use source::{ManualSource, SignalBatch, SignalWindow, StreamReceiver};
