//! WAV file playback through the capture contract.
//!
//! Lets the meter run without a microphone, for demos and offline checks.
//! Reads are paced to real time so the display behaves like live capture.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use hound::WavReader;
use tracing::info;

use super::source::CaptureSource;
use crate::error::{MeterError, MeterResult};

pub struct WavSource {
    /// None once closed or fully drained
    reader: Option<WavReader<BufReader<File>>>,
    buffer_size: usize,
    sample_rate: u32,
    /// Real-time pacing can be switched off for tests
    paced: bool,
}

impl WavSource {
    /// Open a 16-bit mono WAV file. Anything else is rejected up front,
    /// the meter only understands the one format.
    pub fn open(path: impl AsRef<Path>, buffer_size: usize) -> MeterResult<Self> {
        if buffer_size == 0 {
            return Err(MeterError::InvalidConfig("buffer size must be > 0".into()));
        }

        let reader = WavReader::open(path.as_ref())
            .map_err(|e| MeterError::DeviceUnavailable(e.to_string()))?;
        let spec = reader.spec();

        if spec.channels != 1 {
            return Err(MeterError::InvalidConfig(format!(
                "expected mono, file has {} channels",
                spec.channels
            )));
        }
        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            return Err(MeterError::InvalidConfig(
                "expected 16-bit integer samples".into(),
            ));
        }

        info!(
            path = %path.as_ref().display(),
            sample_rate = spec.sample_rate,
            "opened wav source"
        );

        Ok(Self {
            reader: Some(reader),
            buffer_size,
            sample_rate: spec.sample_rate,
            paced: true,
        })
    }

    #[cfg(test)]
    fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }
}

impl CaptureSource for WavSource {
    fn read_frame(&mut self, buf: &mut [i16]) -> MeterResult<usize> {
        let reader = self.reader.as_mut().ok_or(MeterError::EndOfStream)?;

        let mut read = 0;
        for slot in buf.iter_mut() {
            match reader.samples::<i16>().next() {
                Some(Ok(sample)) => {
                    *slot = sample;
                    read += 1;
                }
                Some(Err(e)) => return Err(MeterError::ReadError(e.to_string())),
                None => break,
            }
        }

        if read == 0 {
            // file drained, same surfacing as a lost device
            self.reader = None;
            return Err(MeterError::EndOfStream);
        }

        if self.paced {
            std::thread::sleep(Duration::from_secs_f64(
                read as f64 / self.sample_rate as f64,
            ));
        }
        Ok(read)
    }

    fn stop(&mut self) -> MeterResult<()> {
        // nothing to pause on a file
        Ok(())
    }

    fn close(&mut self) -> MeterResult<()> {
        self.reader = None;
        Ok(())
    }

    fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use std::path::PathBuf;

    fn write_wav(name: &str, channels: u16, bits: u16, samples: &[i16]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}_{}.wav", name, uuid::Uuid::new_v4()));
        let spec = WavSpec {
            channels,
            sample_rate: 8000,
            bits_per_sample: bits,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).expect("test wav create");
        for &s in samples {
            writer.write_sample(s).expect("test wav write");
        }
        writer.finalize().expect("test wav finalize");
        path
    }

    #[test]
    fn test_rejects_stereo_files() {
        let path = write_wav("stereo", 2, 16, &[0, 0, 100, 100]);
        let result = WavSource::open(&path, 8);
        assert!(
            matches!(result, Err(MeterError::InvalidConfig(_))),
            "stereo input must be rejected at open"
        );
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_missing_file_is_device_unavailable() {
        let result = WavSource::open("/no/such/file.wav", 8);
        assert!(matches!(result, Err(MeterError::DeviceUnavailable(_))));
    }

    #[test]
    fn test_reads_frames_then_ends() {
        let samples: Vec<i16> = (0..12).map(|i| i * 100).collect();
        let path = write_wav("frames", 1, 16, &samples);
        let mut source = WavSource::open(&path, 8).expect("open").unpaced();

        let mut buf = vec![0i16; source.buffer_size()];
        assert_eq!(source.read_frame(&mut buf).expect("first frame"), 8);
        assert_eq!(&buf[..4], &[0, 100, 200, 300]);

        assert_eq!(source.read_frame(&mut buf).expect("tail frame"), 4);
        assert_eq!(&buf[..4], &[800, 900, 1000, 1100]);

        assert!(
            matches!(source.read_frame(&mut buf), Err(MeterError::EndOfStream)),
            "a drained file must end the stream, not report empty reads forever"
        );
        let _ = std::fs::remove_file(path);
    }
}
