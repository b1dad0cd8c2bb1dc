//! The capture-to-level loop and the shared cell it publishes into.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use super::estimator;
use super::source::CaptureSource;
use crate::display::classifier::{self, Classification};
use crate::error::MeterResult;

/// Most recent level estimate, shared between the meter loop and anything
/// that wants to display it. Single writer (the loop), any number of
/// readers. Writes are whole-value overwrites, so readers always see the
/// newest published value and never a torn one.
#[derive(Clone, Default)]
pub struct MeterState {
    level: Arc<Mutex<f32>>,
}

impl MeterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite-latest publish. Only the meter loop calls this.
    fn publish(&self, level: f32) {
        if let Ok(mut current) = self.level.lock() {
            *current = level;
        }
    }

    /// Raw latest estimate. `0.0` before the first frame arrives.
    pub fn latest_level(&self) -> f32 {
        self.level.lock().map(|level| *level).unwrap_or(0.0)
    }

    /// Latest classification, ready for display. Before the first frame
    /// this is the quiet default (level 0, green, "Quiet • Safe").
    pub fn latest_classification(&self) -> Classification {
        classifier::classify(self.latest_level())
    }
}

/// Cooperative cancellation flag, checked at the top of every loop
/// iteration. Clone freely, all clones share the flag.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Drives a `CaptureSource` until cancelled or until the source dies,
/// publishing one level estimate per non-empty frame into a `MeterState`.
pub struct MeterLoop {
    state: MeterState,
    cancel: CancelToken,
}

/// Releases the source when the loop exits, whatever the exit path.
/// Stop first, then close, both attempted even if stop fails.
struct ReleaseGuard(Box<dyn CaptureSource + Send>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if let Err(e) = self.0.stop() {
            warn!("source stop failed: {e}");
        }
        if let Err(e) = self.0.close() {
            warn!("source close failed: {e}");
        }
    }
}

impl MeterLoop {
    pub fn new(state: MeterState, cancel: CancelToken) -> Self {
        Self { state, cancel }
    }

    /// Run until the token is cancelled or the source fails.
    ///
    /// Cancellation returns `Ok(())`. A fatal read error is returned to
    /// the caller after the source has been released. The source is
    /// stopped and closed exactly once on every exit path.
    pub fn run(&self, source: Box<dyn CaptureSource + Send>) -> MeterResult<()> {
        let mut guard = ReleaseGuard(source);
        let mut buf = vec![0i16; guard.0.buffer_size()];
        info!(
            sample_rate = guard.0.sample_rate(),
            frame_len = buf.len(),
            "meter loop started"
        );

        loop {
            if self.cancel.is_cancelled() {
                info!("meter loop cancelled");
                return Ok(());
            }

            let read = match guard.0.read_frame(&mut buf) {
                Ok(read) => read,
                Err(e) => {
                    warn!("meter loop stopping on read error: {e}");
                    return Err(e);
                }
            };
            if read == 0 {
                // transient empty read, nothing to publish
                continue;
            }

            self.state.publish(estimator::estimate(&buf[..read]));
        }
    }

    /// Convenience wrapper: run the loop on its own background thread.
    pub fn spawn(
        state: MeterState,
        cancel: CancelToken,
        source: Box<dyn CaptureSource + Send>,
    ) -> std::thread::JoinHandle<MeterResult<()>> {
        std::thread::spawn(move || MeterLoop::new(state, cancel).run(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::classifier::Band;
    use crate::error::MeterError;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    /// Plays back a fixed script of read results, then cancels the token
    /// so the loop winds down deterministically.
    struct ScriptedSource {
        steps: VecDeque<MeterResult<Vec<i16>>>,
        when_empty: CancelToken,
        stop_calls: Arc<AtomicUsize>,
        close_calls: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn new(
            steps: Vec<MeterResult<Vec<i16>>>,
            when_empty: CancelToken,
        ) -> (Self, Arc<AtomicUsize>, Arc<AtomicUsize>) {
            let stop_calls = Arc::new(AtomicUsize::new(0));
            let close_calls = Arc::new(AtomicUsize::new(0));
            let source = Self {
                steps: steps.into(),
                when_empty,
                stop_calls: Arc::clone(&stop_calls),
                close_calls: Arc::clone(&close_calls),
            };
            (source, stop_calls, close_calls)
        }
    }

    impl CaptureSource for ScriptedSource {
        fn read_frame(&mut self, buf: &mut [i16]) -> MeterResult<usize> {
            match self.steps.pop_front() {
                Some(Ok(frame)) => {
                    let n = frame.len().min(buf.len());
                    buf[..n].copy_from_slice(&frame[..n]);
                    Ok(n)
                }
                Some(Err(e)) => Err(e),
                None => {
                    self.when_empty.cancel();
                    Ok(0)
                }
            }
        }

        fn stop(&mut self) -> MeterResult<()> {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn close(&mut self) -> MeterResult<()> {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn buffer_size(&self) -> usize {
            8
        }

        fn sample_rate(&self) -> u32 {
            8000
        }
    }

    #[test]
    fn test_default_classification_before_first_frame() {
        let state = MeterState::new();
        let c = state.latest_classification();
        assert_eq!(c.clamped_level, 0.0);
        assert_eq!(c.band, Band::Quiet);
        assert_eq!(c.color, "#4CAF50");
        assert_eq!(c.message, "Quiet • Safe");
        assert!(c.warning.is_none());
    }

    #[test]
    fn test_publishes_latest_frame_level() {
        let state = MeterState::new();
        let cancel = CancelToken::new();
        let (source, stops, closes) = ScriptedSource::new(
            vec![Ok(vec![3277i16; 8]), Ok(vec![0, 32767, 0, 0])],
            cancel.clone(),
        );

        let result = MeterLoop::new(state.clone(), cancel).run(Box::new(source));

        assert!(result.is_ok(), "cancellation is a clean exit");
        assert!(
            (state.latest_level() - 90.0).abs() < 1e-4,
            "latest frame wins, expected 90.0 got {}",
            state.latest_level()
        );
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_length_reads_never_change_state() {
        let state = MeterState::new();
        let cancel = CancelToken::new();
        let (source, _, _) = ScriptedSource::new(
            vec![Ok(vec![0, 32767]), Ok(vec![]), Ok(vec![])],
            cancel.clone(),
        );

        MeterLoop::new(state.clone(), cancel)
            .run(Box::new(source))
            .expect("clean exit");

        assert!(
            (state.latest_level() - 90.0).abs() < 1e-4,
            "empty reads must not overwrite the published level"
        );
    }

    #[test]
    fn test_cancellation_releases_exactly_once() {
        let state = MeterState::new();
        let cancel = CancelToken::new();
        // script runs dry immediately, which cancels the token
        let (source, stops, closes) = ScriptedSource::new(vec![], cancel.clone());

        let result = MeterLoop::new(state, cancel).run(Box::new(source));

        assert!(result.is_ok());
        assert_eq!(
            stops.load(Ordering::SeqCst),
            1,
            "stop must run exactly once on cancellation"
        );
        assert_eq!(
            closes.load(Ordering::SeqCst),
            1,
            "close must run exactly once on cancellation"
        );
    }

    #[test]
    fn test_read_error_propagates_after_release() {
        let state = MeterState::new();
        let cancel = CancelToken::new();
        let (source, stops, closes) = ScriptedSource::new(
            vec![
                Ok(vec![100i16; 8]),
                Err(MeterError::ReadError("device unplugged".into())),
            ],
            cancel.clone(),
        );

        let result = MeterLoop::new(state.clone(), cancel).run(Box::new(source));

        assert!(matches!(result, Err(MeterError::ReadError(_))));
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        // last successful publish survives the failure
        assert!(state.latest_level() > 0.0);
    }

    #[test]
    fn test_error_racing_cancellation_still_releases_once() {
        struct RacingSource {
            cancel: CancelToken,
            stop_calls: Arc<AtomicUsize>,
            close_calls: Arc<AtomicUsize>,
        }

        impl CaptureSource for RacingSource {
            fn read_frame(&mut self, _buf: &mut [i16]) -> MeterResult<usize> {
                // cancel lands while the read is failing
                self.cancel.cancel();
                Err(MeterError::ReadError("lost device".into()))
            }
            fn stop(&mut self) -> MeterResult<()> {
                self.stop_calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            fn close(&mut self) -> MeterResult<()> {
                self.close_calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            fn buffer_size(&self) -> usize {
                8
            }
            fn sample_rate(&self) -> u32 {
                8000
            }
        }

        let cancel = CancelToken::new();
        let stop_calls = Arc::new(AtomicUsize::new(0));
        let close_calls = Arc::new(AtomicUsize::new(0));
        let source = RacingSource {
            cancel: cancel.clone(),
            stop_calls: Arc::clone(&stop_calls),
            close_calls: Arc::clone(&close_calls),
        };

        let result = MeterLoop::new(MeterState::new(), cancel).run(Box::new(source));

        assert!(result.is_err(), "the error side of the race still surfaces");
        assert_eq!(stop_calls.load(Ordering::SeqCst), 1);
        assert_eq!(close_calls.load(Ordering::SeqCst), 1);
    }
}
