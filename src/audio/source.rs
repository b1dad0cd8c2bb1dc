use serde::{Deserialize, Serialize};

use crate::error::{MeterError, MeterResult};

/// Capture format the meter asks its source for.
///
/// The meter itself only understands mono 16-bit PCM, so `channels` and
/// `bits_per_sample` exist for validation rather than choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    /// Requested frame length in samples. Sources may negotiate a
    /// different size, see `CaptureSource::buffer_size`.
    pub buffer_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 8000,
            channels: 1, // Mono
            bits_per_sample: 16,
            buffer_size: 1024,
        }
    }
}

impl AudioConfig {
    pub fn validate(&self) -> MeterResult<()> {
        if self.sample_rate < 8000 || self.sample_rate > 192_000 {
            return Err(MeterError::InvalidConfig(format!(
                "sample rate must be between 8000 and 192000, got {}",
                self.sample_rate
            )));
        }
        if self.channels != 1 {
            return Err(MeterError::InvalidConfig(
                "only mono capture is supported".into(),
            ));
        }
        if self.bits_per_sample != 16 {
            return Err(MeterError::InvalidConfig(
                "only 16-bit PCM is supported".into(),
            ));
        }
        if self.buffer_size == 0 {
            return Err(MeterError::InvalidConfig("buffer size must be > 0".into()));
        }
        Ok(())
    }
}

/// Pull-side contract for anything that can feed the meter loop.
///
/// Implementors: the microphone adapter (`CpalSource`) and the WAV file
/// source (`WavSource`). Construction plays the role of `open`, so a value
/// of this trait is always a successfully opened source.
pub trait CaptureSource {
    /// Fill `buf` with the next frame and return how many samples landed.
    /// May block until data is available. `Ok(0)` means nothing arrived
    /// yet; the caller should simply loop again without publishing.
    fn read_frame(&mut self, buf: &mut [i16]) -> MeterResult<usize>;

    /// Stop capturing. Safe to call more than once.
    fn stop(&mut self) -> MeterResult<()>;

    /// Release the underlying device or file. Safe to call more than once.
    fn close(&mut self) -> MeterResult<()>;

    /// Negotiated frame length in samples. Always > 0.
    fn buffer_size(&self) -> usize;

    fn sample_rate(&self) -> u32;
}
