pub mod cpal_source;
pub mod estimator;
pub mod meter_loop;
pub mod source;
pub mod wav_source;

pub use cpal_source::CpalSource;
pub use meter_loop::{CancelToken, MeterLoop, MeterState};
pub use source::{AudioConfig, CaptureSource};
pub use wav_source::WavSource;
