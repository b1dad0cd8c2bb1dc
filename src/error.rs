use thiserror::Error;

pub type MeterResult<T> = Result<T, MeterError>;

/// Everything that can go wrong between a capture device and the meter.
///
/// Zero-sample reads are deliberately not represented here. An empty read
/// is a transient the loop skips, not a failure.
#[derive(Debug, Error)]
pub enum MeterError {
    /// No usable device, or buffer size negotiation came back invalid.
    /// Fatal at startup, the loop never runs.
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Device exists but the stream could not be built or started.
    #[error("capture device failed to initialize: {0}")]
    DeviceInitFailed(String),

    /// A frame read failed mid-run. Fatal for the current run, no retry.
    #[error("frame read failed: {0}")]
    ReadError(String),

    /// The source has nothing more to give (file ended, capture thread gone).
    #[error("capture source ended")]
    EndOfStream,

    #[error("invalid audio config: {0}")]
    InvalidConfig(String),
}
