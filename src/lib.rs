pub mod audio;
pub mod display;
pub mod error;
pub mod stream;

pub use audio::{AudioConfig, CancelToken, CaptureSource, CpalSource, MeterLoop, MeterState, WavSource};
pub use display::{classify, Band, Classification, TerminalMeter};
pub use error::{MeterError, MeterResult};
pub use stream::{LevelServer, StreamConfig};
