//! Microphone adapter over cpal.
//!
//! cpal pushes buffers at us from its own audio thread; the meter loop
//! wants to pull fixed frames. A dedicated capture thread owns the cpal
//! stream (it is not Send) and the callback forwards converted frames
//! through a small bounded channel that `read_frame` drains.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, Stream, StreamConfig, SupportedBufferSize};
use tracing::{info, warn};

use super::source::{AudioConfig, CaptureSource};
use crate::error::{MeterError, MeterResult};

/// How long `read_frame` waits before reporting an empty read. Keeps the
/// meter loop responsive to cancellation even when the device stalls.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Frames buffered between the cpal callback and the meter loop. Only the
/// newest value matters downstream, so the callback just drops frames
/// when the reader falls behind.
const CHANNEL_DEPTH: usize = 4;

enum Ctl {
    Stop,
    Close,
}

pub struct CpalSource {
    frames: Receiver<Vec<i16>>,
    ctl: Sender<Ctl>,
    capture_thread: Option<JoinHandle<()>>,
    failed: Arc<AtomicBool>,
    buffer_size: usize,
    sample_rate: u32,
}

impl CpalSource {
    /// Open the default input device. Fatal errors here are startup
    /// errors, the meter loop never runs.
    pub fn open(config: &AudioConfig) -> MeterResult<Self> {
        config.validate()?;

        let failed = Arc::new(AtomicBool::new(false));
        let (frame_tx, frame_rx) = mpsc::sync_channel(CHANNEL_DEPTH);
        let (ctl_tx, ctl_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread_config = config.clone();
        let thread_failed = Arc::clone(&failed);
        let handle = std::thread::spawn(move || {
            capture_thread(thread_config, frame_tx, ctl_rx, ready_tx, thread_failed)
        });

        let (sample_rate, buffer_size) = ready_rx
            .recv()
            .map_err(|_| MeterError::DeviceInitFailed("capture thread died during setup".into()))??;

        if sample_rate != config.sample_rate {
            warn!(
                requested = config.sample_rate,
                negotiated = sample_rate,
                "device does not run at the requested sample rate"
            );
        }

        Ok(Self {
            frames: frame_rx,
            ctl: ctl_tx,
            capture_thread: Some(handle),
            failed,
            buffer_size,
            sample_rate,
        })
    }
}

impl CaptureSource for CpalSource {
    fn read_frame(&mut self, buf: &mut [i16]) -> MeterResult<usize> {
        if self.failed.load(Ordering::Relaxed) {
            return Err(MeterError::ReadError(
                "capture stream reported an error".into(),
            ));
        }

        match self.frames.recv_timeout(READ_TIMEOUT) {
            Ok(frame) => {
                let n = frame.len().min(buf.len());
                buf[..n].copy_from_slice(&frame[..n]);
                Ok(n)
            }
            // nothing captured within the window, transient
            Err(RecvTimeoutError::Timeout) => Ok(0),
            Err(RecvTimeoutError::Disconnected) => Err(MeterError::EndOfStream),
        }
    }

    fn stop(&mut self) -> MeterResult<()> {
        // the capture thread may already be gone, that is fine
        let _ = self.ctl.send(Ctl::Stop);
        Ok(())
    }

    fn close(&mut self) -> MeterResult<()> {
        let _ = self.ctl.send(Ctl::Close);
        if let Some(handle) = self.capture_thread.take() {
            if handle.join().is_err() {
                warn!("capture thread panicked during close");
            }
        }
        Ok(())
    }

    fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Owns the cpal stream for its whole lifetime and parks on the control
/// channel. Exits when told to close or when the source is dropped.
fn capture_thread(
    config: AudioConfig,
    frame_tx: SyncSender<Vec<i16>>,
    ctl_rx: Receiver<Ctl>,
    ready_tx: Sender<MeterResult<(u32, usize)>>,
    failed: Arc<AtomicBool>,
) {
    let stream = match build_stream(&config, frame_tx, Arc::clone(&failed)) {
        Ok((stream, negotiated)) => {
            let _ = ready_tx.send(Ok(negotiated));
            stream
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    loop {
        match ctl_rx.recv() {
            Ok(Ctl::Stop) => {
                if let Err(e) = stream.pause() {
                    warn!("stream pause failed: {e}");
                }
            }
            Ok(Ctl::Close) | Err(_) => break,
        }
    }
    // dropping the stream releases the device
    drop(stream);
}

fn build_stream(
    config: &AudioConfig,
    frame_tx: SyncSender<Vec<i16>>,
    failed: Arc<AtomicBool>,
) -> MeterResult<(Stream, (u32, usize))> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| MeterError::DeviceUnavailable("no input device available".into()))?;

    let device_name = device
        .name()
        .unwrap_or_else(|_| "<unknown>".to_string());

    let supported = device
        .default_input_config()
        .map_err(|e| MeterError::DeviceUnavailable(e.to_string()))?;

    let buffer_size = negotiate_buffer_size(config.buffer_size, supported.buffer_size())?;
    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels() as usize;
    info!(
        device = %device_name,
        sample_rate,
        channels,
        buffer_size,
        format = ?supported.sample_format(),
        "opening input device"
    );

    let stream_config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: BufferSize::Default,
    };

    let err_failed = Arc::clone(&failed);
    let err_fn = move |e: cpal::StreamError| {
        warn!("audio stream error: {e}");
        err_failed.store(true, Ordering::Relaxed);
    };

    let stream = match supported.sample_format() {
        SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                // mono downmix: take the first channel of each interleaved frame
                let frame: Vec<i16> = data.chunks(channels).map(|c| c[0]).collect();
                // full queue means the reader is behind; dropping is fine,
                // only the latest level is ever displayed
                let _ = frame_tx.try_send(frame);
            },
            err_fn,
            None,
        ),
        SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let frame: Vec<i16> = data
                    .chunks(channels)
                    .map(|c| (c[0].clamp(-1.0, 1.0) * 32767.0) as i16)
                    .collect();
                let _ = frame_tx.try_send(frame);
            },
            err_fn,
            None,
        ),
        other => {
            return Err(MeterError::DeviceInitFailed(format!(
                "unsupported sample format {other:?}"
            )));
        }
    }
    .map_err(|e| MeterError::DeviceInitFailed(e.to_string()))?;

    stream
        .play()
        .map_err(|e| MeterError::DeviceInitFailed(e.to_string()))?;

    Ok((stream, (sample_rate, buffer_size)))
}

/// Clamp the requested frame length into the range the device supports.
/// An empty negotiated size is a fatal startup condition.
fn negotiate_buffer_size(hint: usize, supported: &SupportedBufferSize) -> MeterResult<usize> {
    let negotiated = match *supported {
        SupportedBufferSize::Range { min, max } => {
            if max == 0 {
                return Err(MeterError::DeviceUnavailable(
                    "device reported a zero buffer size".into(),
                ));
            }
            hint.clamp(min as usize, max as usize)
        }
        SupportedBufferSize::Unknown => hint,
    };
    if negotiated == 0 {
        return Err(MeterError::DeviceUnavailable(
            "buffer size negotiation produced zero".into(),
        ));
    }
    Ok(negotiated)
}
